//! Error normalization, classification and deduplication.
//!
//! Every failure produced by an operation (or by one of the user hooks) is
//! normalized into an [`AttemptError`] before it reaches the execution
//! context. Operations report failure through the [`Failure`] tagged outcome:
//!
//! - [`Failure::Error`]: a retryable failure, recorded and fed to the gates.
//! - [`Failure::Stop`]: stop retrying now; the wrapped cause is recorded and
//!   the loop terminates without consulting any predicate.
//! - [`Failure::Aggregate`]: several failures observed together (for example
//!   every racer of one concurrent attempt lost). Expanded before recording.
//!
//! A panic escaping an operation is the closest Rust analogue of "throwing a
//! value that is not an error". Panics are caught by the engine and turned
//! into a `NotAnError` failure carrying a description of the payload type.
//!
//! # Deduplication
//!
//! Unless duplicates are allowed, an incoming error that is structurally
//! equal (same category, same message) to the most recently recorded error is
//! dropped. Only the error log is deduplicated; attempt counting is not.

use std::any::Any;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Category assigned to values that were raised without being errors.
pub const NOT_AN_ERROR: &str = "NotAnError";

/// Category used when the caller supplies only a message.
pub const GENERIC_CATEGORY: &str = "Error";

type SharedSource = Arc<dyn StdError + Send + Sync + 'static>;

/// A normalized error as recorded in the execution context.
///
/// Cheap to clone: the original error, when there is one, is shared.
#[derive(Clone)]
pub struct AttemptError {
    category: Cow<'static, str>,
    message: String,
    source: Option<SharedSource>,
}

impl AttemptError {
    /// Normalize a typed error. The category is the error's type name.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            category: Cow::Borrowed(short_type_name(std::any::type_name::<E>())),
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    /// Normalize an already boxed error.
    #[must_use]
    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self {
            category: Cow::Borrowed(GENERIC_CATEGORY),
            message: error.to_string(),
            source: Some(Arc::from(error)),
        }
    }

    /// An error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::with_category(GENERIC_CATEGORY, message)
    }

    /// An error with an explicit category.
    pub fn with_category(
        category: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            source: None,
        }
    }

    /// The contract-violation error for a raised value that is not an error.
    #[must_use]
    pub fn not_an_error(type_description: &str) -> Self {
        Self::with_category(
            NOT_AN_ERROR,
            format!("expected an error value, got: \"{type_description}\""),
        )
    }

    /// Normalize a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let (type_description, detail) = if let Some(text) = payload.downcast_ref::<&'static str>()
        {
            ("&str", Some((*text).to_string()))
        } else if let Some(text) = payload.downcast_ref::<String>() {
            ("String", Some(text.clone()))
        } else {
            ("unknown", None)
        };

        let mut error = Self::not_an_error(type_description);
        if let Some(detail) = detail {
            error.message = format!("{} (panic: {detail})", error.message);
        }
        error
    }

    /// Error category used for structural equality.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The original error, when one was supplied.
    #[must_use]
    pub fn source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Downcast the original error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.as_deref()?.downcast_ref::<E>()
    }

    /// Whether this records a raised value that was not an error.
    #[must_use]
    pub fn is_not_an_error(&self) -> bool {
        self.category == NOT_AN_ERROR
    }
}

impl PartialEq for AttemptError {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.message == other.message
    }
}

impl Eq for AttemptError {}

impl fmt::Debug for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptError")
            .field("category", &self.category)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl<E> From<E> for AttemptError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

/// Tagged outcome of a failed invocation.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Retryable failure.
    Error(AttemptError),
    /// Stop retrying immediately, surfacing the wrapped cause.
    Stop(AttemptError),
    /// Several failures observed together.
    Aggregate(Vec<Failure>),
}

impl Failure {
    /// A retryable failure.
    pub fn error(cause: impl Into<AttemptError>) -> Self {
        Self::Error(cause.into())
    }

    /// Request immediate termination with `cause`.
    pub fn stop(cause: impl Into<AttemptError>) -> Self {
        Self::Stop(cause.into())
    }

    /// Report a raised value that is not an error.
    pub fn non_error<T: ?Sized>(_value: &T) -> Self {
        Self::Error(AttemptError::not_an_error(std::any::type_name::<T>()))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Error(AttemptError::from_panic(payload))
    }

    /// Whether this failure (or any aggregated member) requests a stop.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        match self {
            Self::Error(_) => false,
            Self::Stop(_) => true,
            Self::Aggregate(failures) => failures.iter().any(Self::is_stop),
        }
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Error(AttemptError::new(error))
    }
}

impl From<AttemptError> for Failure {
    fn from(error: AttemptError) -> Self {
        Self::Error(error)
    }
}

/// A failure expanded into the errors it contributes to the log.
#[derive(Debug, Default)]
pub struct Classified {
    /// Normalized errors in observation order.
    pub errors: Vec<AttemptError>,
    /// A stop was requested.
    pub stopped: bool,
}

impl Classified {
    /// Whether any of the expanded errors is a `NotAnError`.
    #[must_use]
    pub fn not_an_error(&self) -> bool {
        self.errors.iter().any(AttemptError::is_not_an_error)
    }

    /// The error that best represents this failure.
    #[must_use]
    pub fn primary(&self) -> Option<&AttemptError> {
        self.errors.last()
    }
}

/// Expand aggregates and unwrap stop requests.
#[must_use]
pub fn classify(failure: Failure) -> Classified {
    let mut out = Classified::default();
    flatten(failure, &mut out);
    if out.errors.is_empty() {
        out.errors
            .push(AttemptError::msg("operation failed without reporting an error"));
    }
    out
}

fn flatten(failure: Failure, out: &mut Classified) {
    match failure {
        Failure::Error(error) => out.errors.push(error),
        Failure::Stop(cause) => {
            out.stopped = true;
            out.errors.push(cause);
        }
        Failure::Aggregate(failures) => {
            for failure in failures {
                flatten(failure, out);
            }
        }
    }
}

/// Whether `error` duplicates the most recently recorded entry of `log`.
#[must_use]
pub fn is_duplicate(log: &[AttemptError], error: &AttemptError) -> bool {
    log.last() == Some(error)
}

/// Append `incoming` to `log`, dropping consecutive duplicates unless allowed.
///
/// Returns the number of errors appended.
pub fn record(
    log: &mut Vec<AttemptError>,
    incoming: impl IntoIterator<Item = AttemptError>,
    allow_duplicates: bool,
) -> usize {
    let mut appended = 0;
    for error in incoming {
        if !allow_duplicates && is_duplicate(log, &error) {
            continue;
        }
        log.push(error);
        appended += 1;
    }
    appended
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
