//! relentless-core: a resilient execution engine for async operations
//!
//! Given an operation, the engine invokes it repeatedly until it succeeds,
//! exhausts its attempt or time budget, is gated by a user predicate, asks to
//! stop, or is cancelled.
//!
//! # Architecture
//!
//! ```text
//! RetryOptions ──resolve──▶ RetryConfig
//!                               │
//!                               ▼
//!          ┌──────────── engine::execute ◀──── CancelSignal
//!          │                    │
//!    classify (errors)    backoff (waits)
//!          │                    │
//!          └────▶ RetryContext ◀┘ ──▶ RetryResult / ExhaustedError
//! ```
//!
//! # Modules
//!
//! - `config`: option resolution, validation and hooks
//! - `context`: per-run execution context and terminal states
//! - `backoff`: inter-attempt delay calculation
//! - `classify`: error normalization, stop requests and deduplication
//! - `cancel`: cancellation signal and suspension-point racing
//! - `engine`: the retry loop
//! - `retry`: calling conventions and the `retryify` adapter
//! - `logging`: `tracing` subscriber setup for binaries
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod backoff;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod retry;

pub use cancel::{CancelSignal, Cancelled};
pub use classify::{AttemptError, Failure};
pub use config::{RetryConfig, RetryDefaults, RetryOptions};
pub use context::{ContextSummary, RetryContext, RetryState};
pub use engine::{RetryResult, execute};
pub use error::{ConfigError, Error, ExhaustedError, Result};
pub use retry::{Retryified, retry, retry_safe, retry_with, retryify};
