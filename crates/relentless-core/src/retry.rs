//! Calling conventions over the engine.
//!
//! - [`retry`]: yields the value, or an [`ExhaustedError`] carrying the final
//!   context.
//! - [`retry_safe`]: never fails; always yields a [`RetryResult`].
//! - [`retry_with`]: resolves options first, so configuration errors and
//!   exhaustion share the crate [`Error`](crate::Error) type.
//! - [`retryify`]: binds a function and a configuration into a reusable
//!   callable that retries every call.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relentless_core::{RetryOptions, retry_with};
//!
//! let body = retry_with(RetryOptions::new().with_max_attempts(3), |_ctx| async {
//!     fetch_page().await.map_err(Into::into)
//! })
//! .await?;
//! ```

use std::future::Future;

use crate::classify::Failure;
use crate::config::{RetryConfig, RetryOptions};
use crate::context::RetryContext;
use crate::engine::{RetryResult, execute};
use crate::error::ExhaustedError;

/// Retry `operation`, failing with the final context on exhaustion.
pub async fn retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, ExhaustedError>
where
    F: FnMut(&RetryContext) -> Fut,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    T: Send + 'static,
{
    execute(config, operation).await.into_result()
}

/// Retry `operation`, always returning the observable result.
pub async fn retry_safe<T, F, Fut>(config: &RetryConfig, operation: F) -> RetryResult<T>
where
    F: FnMut(&RetryContext) -> Fut,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    T: Send + 'static,
{
    execute(config, operation).await
}

/// Resolve `options` and retry `operation`.
///
/// Invalid options fail before the operation is ever invoked.
pub async fn retry_with<T, F, Fut>(options: RetryOptions, operation: F) -> crate::Result<T>
where
    F: FnMut(&RetryContext) -> Fut,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    T: Send + 'static,
{
    let config = options.resolve()?;
    Ok(retry(&config, operation).await?)
}

/// A function bound to a retry configuration. See [`retryify`].
#[derive(Debug, Clone)]
pub struct Retryified<F> {
    function: F,
    config: RetryConfig,
}

/// Bind `function` to `config`.
///
/// Arguments passed to [`Retryified::call`] are cloned into every attempt.
/// To bind a receiver, capture it in `function`.
pub const fn retryify<F>(function: F, config: RetryConfig) -> Retryified<F> {
    Retryified { function, config }
}

impl<F> Retryified<F> {
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Call with retries, failing with the final context on exhaustion.
    pub async fn call<A, T, Fut>(&self, args: A) -> Result<T, ExhaustedError>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
        T: Send + 'static,
    {
        retry(&self.config, |_| (self.function)(args.clone())).await
    }

    /// Call with retries, always returning the observable result.
    pub async fn call_safe<A, T, Fut>(&self, args: A) -> RetryResult<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
        T: Send + 'static,
    {
        retry_safe(&self.config, |_| (self.function)(args.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::AttemptError;
    use crate::context::RetryState;
    use crate::error::{ConfigError, Error};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick(attempts: u32) -> RetryConfig {
        RetryOptions::new()
            .with_max_attempts(attempts)
            .with_min_wait(Duration::from_millis(1))
            .resolve()
            .expect("valid options")
    }

    // ── retry / retry_safe ──────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn retry_returns_value() {
        let value = retry(&quick(3), |_| async { Ok::<_, Failure>("done") })
            .await
            .expect("success");
        assert_eq!(value, "done");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_fails_with_context() {
        let err = retry(&quick(3), |_| async {
            Err::<(), _>(Failure::from(AttemptError::msg("nope")))
        })
        .await
        .unwrap_err();
        assert_eq!(err.context().attempts(), 3);
        assert_eq!(err.context().state(), RetryState::Exhausted);
        assert_eq!(err.last_error(), Some(&AttemptError::msg("nope")));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_safe_never_raises() {
        let result = retry_safe(&quick(2), |_| async {
            Err::<(), _>(Failure::from(AttemptError::msg("nope")))
        })
        .await;
        assert!(!result.is_ok());
        let (value, context) = result.into_parts();
        assert!(value.is_none());
        assert_eq!(context.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_can_use_question_mark() {
        async fn parse(input: &str) -> Result<i32, Failure> {
            Ok(input.parse::<i32>()?)
        }

        let value = retry(&quick(1), |_| parse("17")).await.expect("parses");
        assert_eq!(value, 17);

        let err = retry(&quick(1), |_| parse("x")).await.unwrap_err();
        assert_eq!(err.last_error().map(AttemptError::category), Some("ParseIntError"));
    }

    // ── retry_with ──────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn retry_with_rejects_invalid_options_before_invoking() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = retry_with(RetryOptions::new().with_growth_factor(0.0), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Failure>(()) }
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::NotPositive {
                field: "growth_factor"
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_surfaces_exhaustion() {
        let err = retry_with(RetryOptions::new().with_max_attempts(2), |_| async {
            Err::<(), _>(Failure::from(AttemptError::msg("down")))
        })
        .await
        .unwrap_err();
        let context = err.context().expect("engine ran");
        assert_eq!(context.attempts(), 2);
    }

    // ── retryify ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn retryify_forwards_arguments_every_attempt() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        let add = retryify(
            move |(a, b): (i32, i32)| {
                let mut log = log.lock().expect("lock");
                log.push((a, b));
                let attempt = log.len();
                async move {
                    if attempt < 3 {
                        Err(Failure::from(AttemptError::msg("flaky")))
                    } else {
                        Ok(a + b)
                    }
                }
            },
            quick(5),
        );

        assert_eq!(add.call((2, 3)).await.expect("sum"), 5);
        assert_eq!(*seen.lock().expect("lock"), vec![(2, 3); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn retryify_binds_receiver_by_capture() {
        struct Counter {
            base: u32,
        }

        let receiver = Arc::new(Counter { base: 10 });
        let bound = {
            let receiver = receiver.clone();
            retryify(
                move |n: u32| {
                    let base = receiver.base;
                    async move { Ok::<_, Failure>(base + n) }
                },
                quick(1),
            )
        };

        assert_eq!(bound.call(5).await.expect("value"), 15);
        let result = bound.call_safe(1).await;
        assert_eq!(result.value(), Some(&11));
        assert_eq!(bound.config().max_attempts(), Some(1));
    }
}
