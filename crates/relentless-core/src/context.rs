//! Execution context for a single engine invocation.
//!
//! The context is created when the engine starts, mutated only by the retry
//! loop, and handed to hooks as a shared reference. Once the engine returns,
//! the caller owns the final snapshot.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::classify::{self, AttemptError};

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryState {
    Running,
    Succeeded,
    /// The attempt or time budget ran out.
    Exhausted,
    /// A stop request or a fatal `NotAnError` ended the run.
    Stopped,
    /// `should_retry` declined (or failed).
    Gated,
    Cancelled,
}

impl RetryState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Stopped => "stopped",
            Self::Gated => "gated",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record of one execution: attempt counters, recorded errors and
/// timing markers.
#[derive(Debug, Clone)]
pub struct RetryContext {
    attempts: u32,
    retries_consumed: u32,
    errors: Vec<AttemptError>,
    start: Instant,
    end: Option<Instant>,
    state: RetryState,
}

impl RetryContext {
    pub(crate) fn new() -> Self {
        Self {
            attempts: 0,
            retries_consumed: 0,
            errors: Vec::new(),
            start: Instant::now(),
            end: None,
            state: RetryState::Running,
        }
    }

    /// Attempts started so far, including the current one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts that counted against the retry budget.
    #[must_use]
    pub const fn retries_consumed(&self) -> u32 {
        self.retries_consumed
    }

    /// Recorded errors, oldest first.
    #[must_use]
    pub fn errors(&self) -> &[AttemptError] {
        &self.errors
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&AttemptError> {
        self.errors.last()
    }

    #[must_use]
    pub const fn start(&self) -> Instant {
        self.start
    }

    /// Set once the engine reaches a terminal state.
    #[must_use]
    pub const fn end(&self) -> Option<Instant> {
        self.end
    }

    /// Time from start to termination, or to now while still running.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.end
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.start)
    }

    #[must_use]
    pub const fn state(&self) -> RetryState {
        self.state
    }

    /// Serializable summary of this context.
    #[must_use]
    pub fn summary(&self) -> ContextSummary {
        ContextSummary::from(self)
    }

    pub(crate) const fn begin_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub(crate) const fn consume_retry(&mut self) {
        self.retries_consumed = self.retries_consumed.saturating_add(1);
    }

    /// Record errors, applying deduplication. Returns how many were appended.
    pub(crate) fn record(
        &mut self,
        incoming: impl IntoIterator<Item = AttemptError>,
        allow_duplicates: bool,
    ) -> usize {
        classify::record(&mut self.errors, incoming, allow_duplicates)
    }

    pub(crate) fn finish(&mut self, state: RetryState) {
        debug_assert!(state.is_terminal());
        if self.end.is_none() {
            self.end = Some(Instant::now());
        }
        self.state = state;
    }
}

/// One recorded error in a [`ContextSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub category: String,
    pub message: String,
}

/// Serializable view of a [`RetryContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub state: RetryState,
    pub attempts: u32,
    pub retries_consumed: u32,
    pub elapsed_ms: u64,
    pub errors: Vec<ErrorSummary>,
}

impl From<&RetryContext> for ContextSummary {
    fn from(context: &RetryContext) -> Self {
        Self {
            state: context.state,
            attempts: context.attempts,
            retries_consumed: context.retries_consumed,
            elapsed_ms: u64::try_from(context.elapsed().as_millis()).unwrap_or(u64::MAX),
            errors: context
                .errors
                .iter()
                .map(|error| ErrorSummary {
                    category: error.category().to_string(),
                    message: error.message().to_string(),
                })
                .collect(),
        }
    }
}
