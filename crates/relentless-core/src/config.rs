//! Option resolution and validation.
//!
//! [`RetryOptions`] is the partial, caller-facing configuration. Absent
//! fields are filled from a [`RetryDefaults`] value and every numeric field
//! is validated before the frozen [`RetryConfig`] is produced. Numeric
//! options are carried as `f64` so values read from files (`inf`, `nan`,
//! negatives, fractions) are checked by the same rules as values set in code.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use relentless_core::config::RetryOptions;
//!
//! let config = RetryOptions::new()
//!     .with_max_attempts(3)
//!     .with_min_wait(Duration::from_millis(50))
//!     .with_growth_factor(2.0)
//!     .resolve()
//!     .expect("valid options");
//!
//! assert_eq!(config.max_attempts(), Some(3));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::classify::AttemptError;
use crate::context::RetryContext;
use crate::error::ConfigError;

/// Async gate evaluated after a failure. An `Err` counts as `false` and is recorded.
pub type PredicateFn =
    Arc<dyn Fn(&RetryContext) -> BoxFuture<'static, Result<bool, AttemptError>> + Send + Sync>;

/// Async observer invoked after each failure. Failures are recorded, never fatal.
pub type ObserverFn =
    Arc<dyn Fn(&RetryContext) -> BoxFuture<'static, Result<(), AttemptError>> + Send + Sync>;

/// Observer invoked after each completed inter-attempt wait.
pub type AfterWaitFn = Arc<dyn Fn(&RetryContext) + Send + Sync>;

/// User-supplied callbacks. Absent hooks behave as no-ops / always-true.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_catch: Option<ObserverFn>,
    pub(crate) should_consume_retry: Option<PredicateFn>,
    pub(crate) should_retry: Option<PredicateFn>,
    pub(crate) after_wait: Option<AfterWaitFn>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_catch", &self.on_catch.is_some())
            .field("should_consume_retry", &self.should_consume_retry.is_some())
            .field("should_retry", &self.should_retry.is_some())
            .field("after_wait", &self.after_wait.is_some())
            .finish()
    }
}

/// Documented defaults, applied to every option the caller leaves unset.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryDefaults {
    pub max_attempts: f64,
    pub max_elapsed_ms: f64,
    pub min_wait_ms: f64,
    pub max_wait_ms: f64,
    pub growth_factor: f64,
    pub linear_growth: bool,
    pub jitter: bool,
    pub allow_duplicate_errors: bool,
    pub wait_if_not_consumed: bool,
    pub concurrency: u32,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 5.0,
            max_elapsed_ms: f64::INFINITY,
            min_wait_ms: 100.0,
            max_wait_ms: f64::INFINITY,
            growth_factor: 1.0,
            linear_growth: true,
            jitter: false,
            allow_duplicate_errors: false,
            wait_if_not_consumed: false,
            concurrency: 1,
        }
    }
}

/// Partial configuration for one engine invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryOptions {
    /// Total permitted attempts; `inf` for unlimited.
    pub max_attempts: Option<f64>,
    /// Wall-clock budget from the first attempt; `inf` for unlimited.
    pub max_elapsed_ms: Option<f64>,
    pub min_wait_ms: Option<f64>,
    pub max_wait_ms: Option<f64>,
    /// Exponential base applied per consumed retry.
    pub growth_factor: Option<f64>,
    /// Multiply the wait by the consumed-retry count.
    pub linear_growth: Option<bool>,
    /// Randomize the wait within `[1x, 2x)`.
    pub jitter: Option<bool>,
    pub allow_duplicate_errors: Option<bool>,
    /// Pause between attempts even when no retry was consumed.
    pub wait_if_not_consumed: Option<bool>,
    /// Invocations raced per attempt.
    pub concurrency: Option<u32>,
    #[serde(skip)]
    hooks: Hooks,
    #[serde(skip)]
    signal: Option<CancelSignal>,
}

impl RetryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a TOML document. Validation happens on resolve.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(f64::from(attempts));
        self
    }

    #[must_use]
    pub fn with_unlimited_attempts(mut self) -> Self {
        self.max_attempts = Some(f64::INFINITY);
        self
    }

    #[must_use]
    pub fn with_max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed_ms = Some(duration_to_ms(budget));
        self
    }

    #[must_use]
    pub fn with_min_wait(mut self, wait: Duration) -> Self {
        self.min_wait_ms = Some(duration_to_ms(wait));
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait_ms = Some(duration_to_ms(wait));
        self
    }

    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = Some(factor);
        self
    }

    #[must_use]
    pub fn with_linear_growth(mut self, enabled: bool) -> Self {
        self.linear_growth = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_allow_duplicate_errors(mut self, enabled: bool) -> Self {
        self.allow_duplicate_errors = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_wait_if_not_consumed(mut self, enabled: bool) -> Self {
        self.wait_if_not_consumed = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Bind an external cancellation signal.
    #[must_use]
    pub fn with_signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Observe every failure. Errors returned by the hook are recorded.
    #[must_use]
    pub fn on_catch<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AttemptError>> + Send + 'static,
    {
        self.hooks.on_catch = Some(Arc::new(move |ctx: &RetryContext| hook(ctx).boxed()));
        self
    }

    /// Decide whether the current failure counts against the attempt budget.
    #[must_use]
    pub fn should_consume_retry<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, AttemptError>> + Send + 'static,
    {
        self.hooks.should_consume_retry = Some(Arc::new(move |ctx: &RetryContext| hook(ctx).boxed()));
        self
    }

    /// Decide whether to keep going after a failure.
    #[must_use]
    pub fn should_retry<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, AttemptError>> + Send + 'static,
    {
        self.hooks.should_retry = Some(Arc::new(move |ctx: &RetryContext| hook(ctx).boxed()));
        self
    }

    /// Synchronous form of [`should_consume_retry`](Self::should_consume_retry).
    #[must_use]
    pub fn consume_retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&RetryContext) -> bool + Send + Sync + 'static,
    {
        self.should_consume_retry(move |ctx| std::future::ready(Ok::<_, AttemptError>(predicate(ctx))))
    }

    /// Synchronous form of [`should_retry`](Self::should_retry).
    #[must_use]
    pub fn retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&RetryContext) -> bool + Send + Sync + 'static,
    {
        self.should_retry(move |ctx| std::future::ready(Ok::<_, AttemptError>(predicate(ctx))))
    }

    /// Observe the context after each completed inter-attempt wait.
    #[must_use]
    pub fn after_wait<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryContext) + Send + Sync + 'static,
    {
        self.hooks.after_wait = Some(Arc::new(hook));
        self
    }

    /// Overlay `other` on top of `self`: every field set in `other` wins.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.max_attempts = other.max_attempts.or(self.max_attempts);
        self.max_elapsed_ms = other.max_elapsed_ms.or(self.max_elapsed_ms);
        self.min_wait_ms = other.min_wait_ms.or(self.min_wait_ms);
        self.max_wait_ms = other.max_wait_ms.or(self.max_wait_ms);
        self.growth_factor = other.growth_factor.or(self.growth_factor);
        self.linear_growth = other.linear_growth.or(self.linear_growth);
        self.jitter = other.jitter.or(self.jitter);
        self.allow_duplicate_errors = other.allow_duplicate_errors.or(self.allow_duplicate_errors);
        self.wait_if_not_consumed = other.wait_if_not_consumed.or(self.wait_if_not_consumed);
        self.concurrency = other.concurrency.or(self.concurrency);
        self.hooks = Hooks {
            on_catch: other.hooks.on_catch.or(self.hooks.on_catch),
            should_consume_retry: other
                .hooks
                .should_consume_retry
                .or(self.hooks.should_consume_retry),
            should_retry: other.hooks.should_retry.or(self.hooks.should_retry),
            after_wait: other.hooks.after_wait.or(self.hooks.after_wait),
        };
        self.signal = other.signal.or(self.signal);
        self
    }

    /// Resolve against the documented defaults.
    pub fn resolve(self) -> Result<RetryConfig, ConfigError> {
        self.resolve_with(&RetryDefaults::default())
    }

    /// Resolve against an explicit defaults value.
    pub fn resolve_with(self, defaults: &RetryDefaults) -> Result<RetryConfig, ConfigError> {
        let max_attempts = attempts_limit(
            "max_attempts",
            self.max_attempts.unwrap_or(defaults.max_attempts),
        )?;

        let max_elapsed = {
            let field = "max_elapsed_ms";
            let ms = at_least(field, self.max_elapsed_ms.unwrap_or(defaults.max_elapsed_ms), 0.0)?;
            millis(field, ms)?
        };

        let min_wait_ms = {
            let field = "min_wait_ms";
            let ms = at_least(field, self.min_wait_ms.unwrap_or(defaults.min_wait_ms), 0.0)?;
            finite(field, ms)?
        };
        let min_wait = millis("min_wait_ms", min_wait_ms)?.unwrap_or(Duration::MAX);

        let max_wait_ms = at_least(
            "max_wait_ms",
            self.max_wait_ms.unwrap_or(defaults.max_wait_ms),
            0.0,
        )?;
        let max_wait = millis("max_wait_ms", max_wait_ms)?;

        let growth_factor = {
            let field = "growth_factor";
            let factor = number(field, self.growth_factor.unwrap_or(defaults.growth_factor))?;
            if factor <= 0.0 {
                return Err(ConfigError::NotPositive { field });
            }
            finite(field, factor)?
        };

        let concurrency = self.concurrency.unwrap_or(defaults.concurrency);
        if concurrency == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "concurrency",
                min: 1.0,
            });
        }

        if max_wait_ms.is_finite() && min_wait_ms > max_wait_ms {
            return Err(ConfigError::WaitBoundsInverted {
                min_wait_ms,
                max_wait_ms,
            });
        }

        Ok(RetryConfig {
            max_attempts,
            max_elapsed,
            min_wait,
            max_wait,
            growth_factor,
            linear_growth: self.linear_growth.unwrap_or(defaults.linear_growth),
            jitter: self.jitter.unwrap_or(defaults.jitter),
            allow_duplicate_errors: self
                .allow_duplicate_errors
                .unwrap_or(defaults.allow_duplicate_errors),
            wait_if_not_consumed: self
                .wait_if_not_consumed
                .unwrap_or(defaults.wait_if_not_consumed),
            concurrency,
            hooks: self.hooks,
            signal: self.signal,
        })
    }
}

/// Frozen, validated configuration for one engine invocation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    max_attempts: Option<u32>,
    max_elapsed: Option<Duration>,
    min_wait: Duration,
    max_wait: Option<Duration>,
    growth_factor: f64,
    linear_growth: bool,
    jitter: bool,
    allow_duplicate_errors: bool,
    wait_if_not_consumed: bool,
    concurrency: u32,
    hooks: Hooks,
    signal: Option<CancelSignal>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            max_elapsed: None,
            min_wait: Duration::from_millis(100),
            max_wait: None,
            growth_factor: 1.0,
            linear_growth: true,
            jitter: false,
            allow_duplicate_errors: false,
            wait_if_not_consumed: false,
            concurrency: 1,
            hooks: Hooks::default(),
            signal: None,
        }
    }
}

impl RetryConfig {
    /// Total permitted attempts; `None` means unlimited.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Wall-clock budget; `None` means unlimited.
    #[must_use]
    pub const fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed
    }

    #[must_use]
    pub const fn min_wait(&self) -> Duration {
        self.min_wait
    }

    /// Upper bound on a single wait; `None` means uncapped.
    #[must_use]
    pub const fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    #[must_use]
    pub const fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    #[must_use]
    pub const fn linear_growth(&self) -> bool {
        self.linear_growth
    }

    #[must_use]
    pub const fn jitter(&self) -> bool {
        self.jitter
    }

    #[must_use]
    pub const fn allow_duplicate_errors(&self) -> bool {
        self.allow_duplicate_errors
    }

    #[must_use]
    pub const fn wait_if_not_consumed(&self) -> bool {
        self.wait_if_not_consumed
    }

    #[must_use]
    pub const fn concurrency(&self) -> u32 {
        self.concurrency
    }

    #[must_use]
    pub const fn signal(&self) -> Option<&CancelSignal> {
        self.signal.as_ref()
    }

    pub(crate) const fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn number(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_nan() {
        Err(ConfigError::NotANumber { field })
    } else {
        Ok(value)
    }
}

fn at_least(field: &'static str, value: f64, min: f64) -> Result<f64, ConfigError> {
    let value = number(field, value)?;
    if value < min {
        Err(ConfigError::BelowMinimum { field, min })
    } else {
        Ok(value)
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NotFinite { field })
    }
}

/// Milliseconds to a duration; infinity maps to `None`.
fn millis(field: &'static str, ms: f64) -> Result<Option<Duration>, ConfigError> {
    if ms.is_infinite() {
        return Ok(None);
    }
    let out_of_range = ConfigError::OutOfRange { field, value: ms };
    if ms >= u64::MAX as f64 {
        return Err(out_of_range);
    }
    let whole = Duration::from_millis(ms.trunc() as u64);
    let fraction = Duration::from_nanos((ms.fract() * 1_000_000.0).round() as u64);
    whole.checked_add(fraction).map(Some).ok_or(out_of_range)
}

fn attempts_limit(field: &'static str, value: f64) -> Result<Option<u32>, ConfigError> {
    let value = at_least(field, value, 1.0)?;
    if value.is_infinite() {
        return Ok(None);
    }
    if value.fract() != 0.0 {
        return Err(ConfigError::NotAnInteger { field });
    }
    if value > f64::from(u32::MAX) {
        return Err(ConfigError::OutOfRange { field, value });
    }
    Ok(Some(value as u32))
}
