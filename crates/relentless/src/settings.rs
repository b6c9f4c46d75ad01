//! `--config` file loading.
//!
//! ```toml
//! [retry]
//! max_attempts = 5
//! min_wait_ms = 250
//!
//! [log]
//! level = "debug"
//! format = "json"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use relentless_core::RetryOptions;
use relentless_core::logging::LogConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub retry: RetryOptions,
    pub log: LogConfig,
}

impl FileConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in config file {}", path.display()))
    }
}
