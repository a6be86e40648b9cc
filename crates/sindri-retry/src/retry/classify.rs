//! Error classification
//!
//! Normalizes whatever an attempt produced on failure into the closed
//! [`ClassifiedError`] taxonomy. This is the only place that inspects the
//! concrete type of a failure; the loop works purely on the classified form.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use super::ledger::{ErrorKind, RecordedError};

/// Signal that the run should cease retrying immediately
///
/// Return this (converted into the operation's error type) from an attempt
/// to end the run. Hooks and backoff are bypassed and the ledger records the
/// original cause, not this wrapper.
///
/// # Example
///
/// ```rust
/// use sindri_retry::StopRetry;
///
/// fn check(status: u16) -> anyhow::Result<()> {
///     if status == 404 {
///         return Err(StopRetry::msg("resource does not exist").into());
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct StopRetry {
    cause: anyhow::Error,
}

impl StopRetry {
    /// Stop with the given cause
    pub fn new(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    /// Stop with a plain message as the cause
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            cause: anyhow::Error::msg(message),
        }
    }

    /// The original cause
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Take the original cause
    pub fn into_cause(self) -> anyhow::Error {
        self.cause
    }
}

/// A bundle of failures from several invocations
///
/// Produced by concurrent fan-out when every invocation of a round fails;
/// operations may also return one themselves.
#[derive(Debug, Error)]
#[error("{} invocations failed", .errors.len())]
pub struct AggregateError {
    errors: Vec<anyhow::Error>,
}

impl AggregateError {
    /// Bundle the given errors, preserving their order
    pub fn new(errors: Vec<anyhow::Error>) -> Self {
        Self { errors }
    }

    /// The bundled errors
    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// Take the bundled errors
    pub fn into_errors(self) -> Vec<anyhow::Error> {
        self.errors
    }
}

/// The operation produced something that is not an error value
///
/// Raised for panics unwinding out of an attempt. Operations may also return
/// it explicitly. A type mismatch is never retried through `retry_if`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatchError {
    type_name: String,
    detail: Option<String>,
}

impl TypeMismatchError {
    /// Create a mismatch for a value of the named type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            detail: None,
        }
    }

    /// Attach the offending value's rendering
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Build a mismatch from a panic payload
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            Self::new("&str").with_detail(*message)
        } else if let Some(message) = payload.downcast_ref::<String>() {
            Self::new("String").with_detail(message.clone())
        } else {
            Self::new("unknown")
        }
    }

    /// Name of the offending value's type
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expected an error value, got {}", self.type_name)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for TypeMismatchError {}

/// Anything an attempt can fail with, before classification
pub enum Thrown {
    /// The attempt returned an error
    Error(anyhow::Error),
    /// The attempt panicked; the payload is not an error value
    Panic(Box<dyn Any + Send>),
    /// Every invocation of a fan-out round failed, in issue order
    Aggregate(Vec<Thrown>),
}

impl fmt::Debug for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thrown::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Thrown::Panic(_) => f.write_str("Panic(..)"),
            Thrown::Aggregate(members) => f.debug_tuple("Aggregate").field(members).finish(),
        }
    }
}

impl From<anyhow::Error> for Thrown {
    fn from(err: anyhow::Error) -> Self {
        Thrown::Error(err)
    }
}

/// A failure normalized into the closed taxonomy
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedError {
    /// Ordinary operation failure
    Plain(RecordedError),
    /// The operation produced a non-error value
    TypeMismatch(RecordedError),
    /// Explicit request to stop, carrying the classified original cause
    Stop(Box<ClassifiedError>),
    /// Classified members of a bundle, in issue order
    Aggregate(Vec<ClassifiedError>),
}

impl ClassifiedError {
    /// Whether the run must stop now
    ///
    /// An aggregate stops the run when any of its members is a stop signal.
    pub fn is_stop(&self) -> bool {
        match self {
            ClassifiedError::Stop(_) => true,
            ClassifiedError::Aggregate(members) => members.iter().any(Self::is_stop),
            _ => false,
        }
    }

    /// Whether this is (or bundles) a type mismatch
    pub fn is_type_mismatch(&self) -> bool {
        match self {
            ClassifiedError::TypeMismatch(_) => true,
            ClassifiedError::Aggregate(members) => members.iter().any(Self::is_type_mismatch),
            _ => false,
        }
    }

    /// Whether this is an ordinary failure
    pub fn is_plain(&self) -> bool {
        matches!(self, ClassifiedError::Plain(_))
    }

    /// Whether this is a bundle
    pub fn is_aggregate(&self) -> bool {
        matches!(self, ClassifiedError::Aggregate(_))
    }

    /// Ledger entries this failure expands to
    ///
    /// Entries follow issue order, except that the first stop signal's
    /// original cause always comes last.
    pub fn entries(&self) -> Vec<RecordedError> {
        let mut out = Vec::new();
        let mut cause = None;
        self.collect_stop_last(&mut out, &mut cause);
        out.extend(cause.into_iter().flatten());
        out
    }

    /// Original cause of the first stop signal, in issue order
    ///
    /// A cause that expands to several entries yields its last one.
    pub fn stop_cause(&self) -> Option<RecordedError> {
        let mut cause = None;
        self.collect_stop_last(&mut Vec::new(), &mut cause);
        cause.and_then(|entries| entries.last().cloned())
    }

    /// Collect entries, setting aside the first stop signal's cause
    pub(crate) fn collect_stop_last(
        &self,
        out: &mut Vec<RecordedError>,
        cause: &mut Option<Vec<RecordedError>>,
    ) {
        match self {
            ClassifiedError::Stop(inner) if cause.is_none() => {
                let mut entries = Vec::new();
                inner.collect_entries(&mut entries);
                *cause = Some(entries);
            }
            ClassifiedError::Aggregate(members) => {
                for member in members {
                    member.collect_stop_last(out, cause);
                }
            }
            other => other.collect_entries(out),
        }
    }

    pub(crate) fn collect_entries(&self, out: &mut Vec<RecordedError>) {
        match self {
            ClassifiedError::Plain(entry) | ClassifiedError::TypeMismatch(entry) => {
                out.push(entry.clone())
            }
            ClassifiedError::Stop(cause) => cause.collect_entries(out),
            ClassifiedError::Aggregate(members) => {
                for member in members {
                    member.collect_entries(out);
                }
            }
        }
    }
}

/// Classify a failure
pub fn classify(thrown: Thrown) -> ClassifiedError {
    match thrown {
        Thrown::Error(err) => classify_error(err),
        Thrown::Panic(payload) => {
            let mismatch = TypeMismatchError::from_panic(payload.as_ref());
            ClassifiedError::TypeMismatch(RecordedError::new(
                ErrorKind::TypeMismatch,
                anyhow::Error::new(mismatch),
            ))
        }
        Thrown::Aggregate(members) => {
            ClassifiedError::Aggregate(members.into_iter().map(classify).collect())
        }
    }
}

fn classify_error(err: anyhow::Error) -> ClassifiedError {
    let err = match err.downcast::<StopRetry>() {
        Ok(stop) => return ClassifiedError::Stop(Box::new(classify_error(stop.into_cause()))),
        Err(err) => err,
    };

    let err = match err.downcast::<AggregateError>() {
        Ok(aggregate) => {
            return ClassifiedError::Aggregate(
                aggregate
                    .into_errors()
                    .into_iter()
                    .map(classify_error)
                    .collect(),
            )
        }
        Err(err) => err,
    };

    if err.is::<TypeMismatchError>() {
        ClassifiedError::TypeMismatch(RecordedError::new(ErrorKind::TypeMismatch, err))
    } else {
        ClassifiedError::Plain(RecordedError::plain(err))
    }
}
