//! Error ledger for a retry run
//!
//! Every failure the loop observes ends up here as a [`RecordedError`], in the
//! order the causing rounds completed. Consecutive structurally-equal entries
//! are collapsed unless the policy disables the check.

use std::fmt;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::classify::ClassifiedError;

/// Category of a recorded error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Ordinary failure returned by the operation or a hook
    Plain,
    /// The operation produced something that is not an error value
    TypeMismatch,
    /// Reason supplied when the run's cancellation token fired
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Plain => "plain",
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A classified error as stored in the run context
///
/// The underlying error is shared, so cloning an entry (and therefore a
/// context snapshot) never copies the error itself. Two entries are equal
/// when their kind and full display chain match, regardless of identity.
#[derive(Clone)]
pub struct RecordedError {
    kind: ErrorKind,
    message: String,
    error: Arc<anyhow::Error>,
}

impl RecordedError {
    /// Record an error under the given kind
    pub fn new(kind: ErrorKind, error: anyhow::Error) -> Self {
        Self {
            kind,
            message: format!("{:#}", error),
            error: Arc::new(error),
        }
    }

    /// Record an ordinary failure
    pub fn plain(error: anyhow::Error) -> Self {
        Self::new(ErrorKind::Plain, error)
    }

    /// The entry's category
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Full display chain of the underlying error
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying error
    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// Attempt to view the underlying error as a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether both entries refer to the very same error value
    pub fn ptr_eq(&self, other: &RecordedError) -> bool {
        Arc::ptr_eq(&self.error, &other.error)
    }
}

impl PartialEq for RecordedError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl Eq for RecordedError {}

impl fmt::Debug for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordedError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RecordedError {}

impl Serialize for RecordedError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RecordedError", 2)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

/// Append a classified failure to the ledger
///
/// A stop signal contributes only its original cause, an aggregate
/// contributes each of its flattened members in issue order, anything else
/// contributes itself. The first stop signal's cause is appended after every
/// other entry of the batch, so the ledger ends on it. Unless `skip_same_error_check` is set, an entry equal
/// to the ledger's current last entry is dropped, which also collapses
/// adjacent duplicates inside the incoming batch.
///
/// Returns the number of entries appended.
pub fn record(
    classified: &ClassifiedError,
    ledger: &mut Vec<RecordedError>,
    skip_same_error_check: bool,
) -> usize {
    let mut incoming = Vec::new();
    let mut cause = None;
    classified.collect_stop_last(&mut incoming, &mut cause);
    incoming.extend(cause.into_iter().flatten());

    let mut appended = 0;
    for entry in incoming {
        if record_entry(entry, ledger, skip_same_error_check) {
            appended += 1;
        }
    }
    appended
}

/// Append a single entry, applying the same-error check
///
/// Returns whether the entry was appended.
pub fn record_entry(
    entry: RecordedError,
    ledger: &mut Vec<RecordedError>,
    skip_same_error_check: bool,
) -> bool {
    if !skip_same_error_check && ledger.last() == Some(&entry) {
        return false;
    }
    ledger.push(entry);
    true
}
