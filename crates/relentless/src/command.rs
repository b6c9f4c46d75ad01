//! Running the wrapped command as one retry attempt.

use std::io;
use std::process::ExitStatus;

use relentless_core::Failure;
use tokio::process::Command;
use tracing::debug;

/// Why a single run of the wrapped command did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with status {code}")]
    Exit { program: String, code: i32 },

    #[error("'{program}' was terminated by a signal")]
    Terminated { program: String },
}

impl CommandError {
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// The command line to retry, plus the exit codes that end the run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    stop_on_exit: Vec<i32>,
}

impl CommandSpec {
    /// Split `argv` into program and arguments. Returns `None` when empty.
    pub fn new(argv: Vec<String>, stop_on_exit: Vec<i32>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
            stop_on_exit,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the command once, mapping its outcome onto the engine's failure
    /// model.
    ///
    /// A command that cannot be started will not start on a later attempt
    /// either, so spawn errors stop the run. The child is killed if this
    /// future is dropped, which happens when the runtime shuts down with a
    /// detached racer still running.
    pub async fn run(&self, attempt: u32) -> Result<(), Failure> {
        debug!(attempt, program = %self.program, "Starting command");

        let status = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| {
                Failure::stop(CommandError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            })?;

        self.check(status)
    }

    fn check(&self, status: ExitStatus) -> Result<(), Failure> {
        if status.success() {
            return Ok(());
        }

        let error = status.code().map_or_else(
            || CommandError::Terminated {
                program: self.program.clone(),
            },
            |code| CommandError::Exit {
                program: self.program.clone(),
                code,
            },
        );

        match error.code() {
            Some(code) if self.stop_on_exit.contains(&code) => Err(Failure::stop(error)),
            _ => Err(Failure::error(error)),
        }
    }
}
