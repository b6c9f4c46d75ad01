//! The retry loop.
//!
//! [`execute`] drives an operation through repeated attempts until it
//! succeeds, a budget runs out, a hook declines, the operation asks to stop,
//! or the cancellation signal fires. Each call owns a fresh
//! [`RetryContext`]; the caller receives the final snapshot in the
//! [`RetryResult`].
//!
//! # Failure handling order
//!
//! After a failed attempt the loop:
//!
//! 1. records the classified errors; a stop request ends the run here,
//! 2. runs `on_catch` and records anything it returns as an error,
//! 3. asks `should_consume_retry` whether this failure uses up a slot,
//! 4. ends the run if a `NotAnError` would consume a slot, or skips straight
//!    to the next attempt if it would not,
//! 5. ends the run if the time budget or attempt budget is spent,
//! 6. asks `should_retry` whether to go on,
//! 7. waits (unless no slot was consumed and waiting is not forced),
//!    runs `after_wait` if the wait was non-zero, then charges the slot.
//!
//! # Logging
//!
//! Failed attempts and waits are logged at debug level; terminal failures
//! at warn level.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::backoff;
use crate::cancel::{self, CancelSignal, Cancelled};
use crate::classify::{AttemptError, Failure, classify};
use crate::config::RetryConfig;
use crate::context::{RetryContext, RetryState};
use crate::error::ExhaustedError;

/// Terminal value of one engine invocation.
#[derive(Debug, Clone)]
pub enum RetryResult<T> {
    Ok { value: T, context: RetryContext },
    Failed { context: RetryContext },
}

impl<T> RetryResult<T> {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    #[must_use]
    pub const fn context(&self) -> &RetryContext {
        match self {
            Self::Ok { context, .. } | Self::Failed { context } => context,
        }
    }

    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Ok { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// Convert to the throwing convention.
    pub fn into_result(self) -> Result<T, ExhaustedError> {
        match self {
            Self::Ok { value, .. } => Ok(value),
            Self::Failed { context } => Err(ExhaustedError::new(context)),
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (Option<T>, RetryContext) {
        match self {
            Self::Ok { value, context } => (Some(value), context),
            Self::Failed { context } => (None, context),
        }
    }
}

/// Run `operation` under `config` until it succeeds or the run terminates.
///
/// The operation receives a read-only view of the context on every call.
/// A panic inside the operation (or inside a hook) is caught and recorded as
/// a `NotAnError` failure.
pub async fn execute<T, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T>
where
    F: FnMut(&RetryContext) -> Fut,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    T: Send + 'static,
{
    let mut context = RetryContext::new();
    let signal = config.signal();
    let hooks = config.hooks();
    let allow_duplicates = config.allow_duplicate_errors();

    loop {
        context.begin_attempt();
        if let Err(cancelled) = cancel::check(signal) {
            return cancel_out(context, cancelled, allow_duplicates);
        }

        let failure = match invoke(&mut operation, &context, config.concurrency()).await {
            Ok(value) => {
                if let Err(cancelled) = cancel::check(signal) {
                    return cancel_out(context, cancelled, allow_duplicates);
                }
                context.finish(RetryState::Succeeded);
                if context.attempts() > 1 {
                    debug!(
                        total_attempts = context.attempts(),
                        retries_consumed = context.retries_consumed(),
                        "Operation succeeded after retries"
                    );
                }
                return RetryResult::Ok { value, context };
            }
            Err(failure) => failure,
        };

        let classified = classify(failure);
        let stopped = classified.stopped;
        let not_an_error = classified.not_an_error();
        let error = classified
            .primary()
            .map_or_else(String::new, ToString::to_string);
        context.record(classified.errors, allow_duplicates);
        debug!(attempt = context.attempts(), error = %error, "Attempt failed");

        if stopped {
            return fail(context, RetryState::Stopped);
        }

        let time_remaining = config
            .max_elapsed()
            .map(|budget| budget.saturating_sub(context.elapsed()));

        if let Some(hook) = &hooks.on_catch {
            match evaluate(hook.as_ref(), &context, signal).await {
                Ok(Ok(())) => {}
                Ok(Err(hook_error)) => {
                    context.record([hook_error], allow_duplicates);
                }
                Err(cancelled) => return cancel_out(context, cancelled, allow_duplicates),
            }
        }

        let consume = match &hooks.should_consume_retry {
            None => true,
            Some(hook) => match evaluate(hook.as_ref(), &context, signal).await {
                Ok(Ok(consume)) => consume,
                Ok(Err(hook_error)) => {
                    context.record([hook_error], allow_duplicates);
                    false
                }
                Err(cancelled) => return cancel_out(context, cancelled, allow_duplicates),
            },
        };

        let out_of_time = time_remaining.is_some_and(|remaining| remaining.is_zero());

        if not_an_error {
            if consume {
                return fail(context, RetryState::Stopped);
            }
            if out_of_time {
                return fail(context, RetryState::Exhausted);
            }
            continue;
        }

        let out_of_attempts = config.max_attempts().is_some_and(|max| {
            context.retries_consumed().saturating_add(u32::from(consume)) >= max
        });
        if out_of_time || out_of_attempts {
            if consume {
                context.consume_retry();
            }
            return fail(context, RetryState::Exhausted);
        }

        if let Some(hook) = &hooks.should_retry {
            let proceed = match evaluate(hook.as_ref(), &context, signal).await {
                Ok(Ok(proceed)) => proceed,
                Ok(Err(hook_error)) => {
                    context.record([hook_error], allow_duplicates);
                    false
                }
                Err(cancelled) => return cancel_out(context, cancelled, allow_duplicates),
            };
            if !proceed {
                return fail(context, RetryState::Gated);
            }
        }

        if !consume && !config.wait_if_not_consumed() {
            continue;
        }

        let delay = backoff::compute_wait(time_remaining, context.retries_consumed(), config);
        debug!(
            attempt = context.attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            consumed = consume,
            error = %error,
            "Retrying operation after failure"
        );

        if !delay.is_zero() {
            if let Err(cancelled) = cancel::race(signal, tokio::time::sleep(delay)).await {
                return cancel_out(context, cancelled, allow_duplicates);
            }

            if let Some(hook) = &hooks.after_wait {
                if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| hook(&context)))
                {
                    context.record([AttemptError::from_panic(payload)], allow_duplicates);
                }
            }
        }

        if consume {
            context.consume_retry();
        }
    }
}

/// Invoke the operation once, or race `concurrency` invocations.
///
/// Racers run as tasks. Once one succeeds the others are detached: they run
/// to completion and their results are ignored.
async fn invoke<T, F, Fut>(
    operation: &mut F,
    context: &RetryContext,
    concurrency: u32,
) -> Result<T, Failure>
where
    F: FnMut(&RetryContext) -> Fut,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    T: Send + 'static,
{
    if concurrency <= 1 {
        return settle(start(operation, context)).await;
    }

    let mut racers = JoinSet::new();
    for _ in 0..concurrency {
        racers.spawn(settle(start(operation, context)));
    }

    let mut failures = Vec::with_capacity(racers.len());
    while let Some(joined) = racers.join_next().await {
        match joined.unwrap_or_else(|err| Err(join_failure(err))) {
            Ok(value) => {
                debug!(losers = racers.len(), "Race won, detaching remaining invocations");
                racers.detach_all();
                return Ok(value);
            }
            Err(failure) => failures.push(failure),
        }
    }
    Err(Failure::Aggregate(failures))
}

/// Call the operation, converting a synchronous panic into a failure.
fn start<F, Fut>(operation: &mut F, context: &RetryContext) -> Result<Fut, Failure>
where
    F: FnMut(&RetryContext) -> Fut,
{
    std::panic::catch_unwind(AssertUnwindSafe(|| operation(context))).map_err(Failure::from_panic)
}

/// Drive a started invocation, converting a panic while polling into a
/// failure.
async fn settle<T, Fut>(started: Result<Fut, Failure>) -> Result<T, Failure>
where
    Fut: Future<Output = Result<T, Failure>>,
{
    AssertUnwindSafe(started?)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(Failure::from_panic(payload)))
}

fn join_failure(err: JoinError) -> Failure {
    match err.try_into_panic() {
        Ok(payload) => Failure::from_panic(payload),
        Err(err) => Failure::error(err),
    }
}

type Hook<R> = dyn Fn(&RetryContext) -> BoxFuture<'static, Result<R, AttemptError>> + Send + Sync;

/// Evaluate a hook, racing it against the signal.
async fn evaluate<R>(
    hook: &Hook<R>,
    context: &RetryContext,
    signal: Option<&CancelSignal>,
) -> Result<Result<R, AttemptError>, Cancelled> {
    cancel::check(signal)?;
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| hook(context))) {
        Ok(future) => future,
        Err(payload) => return Ok(Err(AttemptError::from_panic(payload))),
    };
    let outcome = cancel::race(signal, AssertUnwindSafe(future).catch_unwind()).await?;
    Ok(outcome.unwrap_or_else(|payload| Err(AttemptError::from_panic(payload))))
}

fn cancel_out<T>(
    mut context: RetryContext,
    cancelled: Cancelled,
    allow_duplicates: bool,
) -> RetryResult<T> {
    context.record([cancelled.reason], allow_duplicates);
    fail(context, RetryState::Cancelled)
}

fn fail<T>(mut context: RetryContext, state: RetryState) -> RetryResult<T> {
    context.finish(state);
    let error = context
        .last_error()
        .map_or_else(String::new, ToString::to_string);
    warn!(
        state = %state,
        attempts = context.attempts(),
        retries_consumed = context.retries_consumed(),
        elapsed_ms = duration_ms(context.elapsed()),
        error = %error,
        "Operation failed"
    );
    RetryResult::Failed { context }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
