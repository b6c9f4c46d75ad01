//! Error types for relentless-core

use thiserror::Error;

use crate::classify::AttemptError;
use crate::context::RetryContext;

/// Result type alias using the crate's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum Error {
    /// Options were rejected before any attempt ran
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The engine terminated without a success
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),
}

impl Error {
    /// The final execution context, when the engine ran at all.
    #[must_use]
    pub fn context(&self) -> Option<&RetryContext> {
        match self {
            Self::Config(_) => None,
            Self::Exhausted(err) => Some(err.context()),
        }
    }
}

/// Option validation errors. Every variant names the offending field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("'{field}' should be a number")]
    NotANumber { field: &'static str },

    #[error("'{field}' should be >= {min}")]
    BelowMinimum { field: &'static str, min: f64 },

    #[error("'{field}' should be > 0")]
    NotPositive { field: &'static str },

    #[error("'{field}' should be finite")]
    NotFinite { field: &'static str },

    #[error("'{field}' should be an integer")]
    NotAnInteger { field: &'static str },

    #[error("'{field}' is too large: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("'min_wait_ms' ({min_wait_ms}) cannot be greater than 'max_wait_ms' ({max_wait_ms})")]
    WaitBoundsInverted { min_wait_ms: f64, max_wait_ms: f64 },

    #[error("Failed to parse options: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Name of the option that failed validation.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::NotANumber { field }
            | Self::BelowMinimum { field, .. }
            | Self::NotPositive { field }
            | Self::NotFinite { field }
            | Self::NotAnInteger { field }
            | Self::OutOfRange { field, .. } => Some(field),
            Self::WaitBoundsInverted { .. } => Some("min_wait_ms"),
            Self::Parse(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.message().to_string())
    }
}

/// Terminal failure of the throwing convention, carrying the final context.
#[derive(Error, Debug, Clone)]
#[error("Retry failed: {}", describe_last(.context.last_error()))]
pub struct ExhaustedError {
    context: RetryContext,
}

impl ExhaustedError {
    pub(crate) const fn new(context: RetryContext) -> Self {
        Self { context }
    }

    /// Snapshot of the execution context at termination.
    #[must_use]
    pub const fn context(&self) -> &RetryContext {
        &self.context
    }

    #[must_use]
    pub fn into_context(self) -> RetryContext {
        self.context
    }

    /// The most recently recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<&AttemptError> {
        self.context.last_error()
    }
}

fn describe_last(error: Option<&AttemptError>) -> String {
    error.map_or_else(|| "no error recorded".to_string(), ToString::to_string)
}
