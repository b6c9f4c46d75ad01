//! Cancellation signal shared between a caller and the retry engine.
//!
//! A [`CancelSignal`] is a cloneable handle over a `tokio::sync::watch`
//! channel. Any clone may fire it; the engine only reads it, checking
//! before every suspension point and racing it against waits and hook
//! evaluations. The first reason supplied wins.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::classify::AttemptError;

/// Category of the reason recorded when a signal fires without one.
pub const CANCELLED: &str = "Cancelled";

/// Returned by [`CancelSignal::guard`] when the signal fires first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled: {reason}")]
pub struct Cancelled {
    pub reason: AttemptError,
}

/// Cloneable cancellation capability.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<Option<AttemptError>>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire with the default reason.
    pub fn cancel(&self) {
        self.cancel_with(AttemptError::with_category(CANCELLED, "operation was cancelled"));
    }

    /// Fire with `reason`. Ignored if the signal already fired.
    pub fn cancel_with(&self, reason: impl Into<AttemptError>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The reason the signal fired with, if it has.
    #[must_use]
    pub fn reason(&self) -> Option<AttemptError> {
        self.tx.borrow().clone()
    }

    /// Resolve once the signal fires, yielding its reason.
    pub async fn cancelled(&self) -> AttemptError {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `future` unless the signal fires first.
    pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        race(Some(self), future).await
    }
}

/// Fail fast if `signal` already fired.
pub(crate) fn check(signal: Option<&CancelSignal>) -> Result<(), Cancelled> {
    match signal.and_then(CancelSignal::reason) {
        Some(reason) => Err(Cancelled { reason }),
        None => Ok(()),
    }
}

/// Race `future` against `signal`, preferring the signal when both are ready.
pub(crate) async fn race<F: Future>(
    signal: Option<&CancelSignal>,
    future: F,
) -> Result<F::Output, Cancelled> {
    let Some(signal) = signal else {
        return Ok(future.await);
    };
    check(Some(signal))?;
    tokio::select! {
        biased;
        reason = signal.cancelled() => Err(Cancelled { reason }),
        output = future => Ok(output),
    }
}
