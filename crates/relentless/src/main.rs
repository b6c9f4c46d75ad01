//! relentless CLI - retry an external command until it succeeds
//!
//! ```text
//! relentless --max-attempts 5 --min-wait-ms 200 -- curl -fsS https://example.com
//! ```
//!
//! Exit status: 0 on success, 130 when interrupted, 1 otherwise.

mod command;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use relentless_core::logging::{LogFormat, init_logging};
use relentless_core::{
    AttemptError, CancelSignal, RetryContext, RetryOptions, RetryState, execute,
};
use tracing::info;

use command::CommandSpec;
use settings::FileConfig;

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

/// Retry a command with backoff until it succeeds or its budget runs out
#[derive(Parser, Debug)]
#[command(name = "relentless")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file with [retry] and [log] tables; flags override its values
    #[arg(short, long, env = "RELENTLESS_CONFIG")]
    config: Option<PathBuf>,

    /// Total permitted attempts (`inf` for unlimited)
    #[arg(long, value_name = "N")]
    max_attempts: Option<f64>,

    /// Wall-clock budget in milliseconds (`inf` for unlimited)
    #[arg(long, value_name = "MS")]
    max_elapsed_ms: Option<f64>,

    /// Base wait between attempts in milliseconds
    #[arg(long, value_name = "MS")]
    min_wait_ms: Option<f64>,

    /// Upper bound on any single wait in milliseconds
    #[arg(long, value_name = "MS")]
    max_wait_ms: Option<f64>,

    /// Exponential growth factor per consumed retry
    #[arg(long, value_name = "FACTOR")]
    factor: Option<f64>,

    /// Disable linear growth of the wait with the retry count
    #[arg(long)]
    no_linear: bool,

    /// Randomize each wait within [1x, 2x)
    #[arg(long)]
    jitter: bool,

    /// Record repeated identical failures instead of collapsing them
    #[arg(long)]
    allow_duplicate_errors: bool,

    /// Wait between attempts even when a retry was not consumed
    #[arg(long)]
    wait_if_not_consumed: bool,

    /// Copies of the command raced per attempt
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Exit codes that stop retrying immediately
    #[arg(long, value_name = "CODE", value_delimiter = ',')]
    stop_on_exit: Vec<i32>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Result report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,

    /// Command to run, after `--`
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

impl Cli {
    /// Retry options given on the command line. Flags left unset do not
    /// override the config file.
    fn retry_options(&self) -> RetryOptions {
        let mut options = RetryOptions::new();
        options.max_attempts = self.max_attempts;
        options.max_elapsed_ms = self.max_elapsed_ms;
        options.min_wait_ms = self.min_wait_ms;
        options.max_wait_ms = self.max_wait_ms;
        options.growth_factor = self.factor;
        options.concurrency = self.concurrency;
        if self.no_linear {
            options.linear_growth = Some(false);
        }
        if self.jitter {
            options.jitter = Some(true);
        }
        if self.allow_duplicate_errors {
            options.allow_duplicate_errors = Some(true);
        }
        if self.wait_if_not_consumed {
            options.wait_if_not_consumed = Some(true);
        }
        options
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("relentless: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let mut log = file.log;
    if let Some(level) = &cli.log_level {
        log.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        log.format = format;
    }
    init_logging(&log).context("failed to initialize logging")?;

    let signal = CancelSignal::new();
    let config = file
        .retry
        .merge(cli.retry_options())
        .with_signal(signal.clone())
        .resolve()
        .context("invalid retry options")?;

    let command = CommandSpec::new(cli.command.clone(), cli.stop_on_exit.clone())
        .context("no command given")?;

    tokio::spawn({
        let signal = signal.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel_with(AttemptError::with_category("Interrupted", "received Ctrl-C"));
            }
        }
    });

    info!(program = command.program(), "Running command");
    let result = execute(&config, |ctx| {
        let command = command.clone();
        let attempt = ctx.attempts();
        async move { command.run(attempt).await }
    })
    .await;

    report(cli.format, result.context())?;

    Ok(match result.context().state() {
        RetryState::Succeeded => ExitCode::SUCCESS,
        RetryState::Cancelled => ExitCode::from(EXIT_INTERRUPTED),
        _ => ExitCode::from(EXIT_FAILURE),
    })
}

fn report(format: OutputFormat, context: &RetryContext) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let summary = serde_json::to_string_pretty(&context.summary())?;
            println!("{summary}");
        }
        OutputFormat::Plain => {
            if context.state() != RetryState::Succeeded {
                let last = context
                    .last_error()
                    .map_or_else(|| "no error recorded".to_string(), ToString::to_string);
                eprintln!(
                    "relentless: {} after {} attempt(s): {last}",
                    context.state(),
                    context.attempts()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("relentless").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_follows_double_dash() {
        let cli = parse(&["--max-attempts", "3", "--", "sh", "-c", "exit 1"]);
        assert_eq!(cli.command, vec!["sh", "-c", "exit 1"]);
        assert_eq!(cli.max_attempts, Some(3.0));
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["relentless", "--jitter"]).is_err());
    }

    #[test]
    fn infinite_attempts_parse() {
        let cli = parse(&["--max-attempts", "inf", "--", "true"]);
        assert_eq!(cli.max_attempts, Some(f64::INFINITY));
        assert_eq!(cli.retry_options().resolve().unwrap().max_attempts(), None);
    }

    #[test]
    fn stop_codes_accept_lists() {
        let cli = parse(&["--stop-on-exit", "2,4", "--stop-on-exit", "9", "--", "true"]);
        assert_eq!(cli.stop_on_exit, vec![2, 4, 9]);
    }

    #[test]
    fn unset_flags_leave_file_values() {
        let file = RetryOptions::from_toml_str("max_attempts = 7\njitter = true\n").unwrap();
        let cli = parse(&["--min-wait-ms", "5", "--", "true"]);
        let config = file.merge(cli.retry_options()).resolve().unwrap();
        assert_eq!(config.max_attempts(), Some(7));
        assert!(config.jitter());
        assert_eq!(config.min_wait(), std::time::Duration::from_millis(5));
    }

    #[test]
    fn flags_override_file_values() {
        let file = RetryOptions::from_toml_str("max_attempts = 7\nlinear_growth = true\n").unwrap();
        let cli = parse(&["--max-attempts", "2", "--no-linear", "--", "true"]);
        let config = file.merge(cli.retry_options()).resolve().unwrap();
        assert_eq!(config.max_attempts(), Some(2));
        assert!(!config.linear_growth());
    }

    #[test]
    fn log_format_parses() {
        let cli = parse(&["--log-format", "json", "--format", "json", "--", "true"]);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
