//! Run outcomes and terminal errors
//!
//! The safe entry point returns a [`RetryOutcome`]; the unsafe one converts
//! it into a `Result` whose error side is a [`RetryFailure`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::context::RetryContext;
use super::ledger::RecordedError;

/// Why a run ended without a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailReason {
    /// The retry budget was used up
    TriesExhausted,
    /// The wall-clock budget ran out
    TimeBudgetExhausted,
    /// `retry_if` answered no (or failed)
    Declined,
    /// A type mismatch was charged to the budget
    TypeMismatch,
    /// The operation raised a stop signal
    Stopped,
    /// The cancellation token fired
    Cancelled,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FailReason::TriesExhausted => "tries exhausted",
            FailReason::TimeBudgetExhausted => "time budget exhausted",
            FailReason::Declined => "retry declined",
            FailReason::TypeMismatch => "type mismatch",
            FailReason::Stopped => "stopped",
            FailReason::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

/// Result of a retry run
///
/// The context is a snapshot taken when the run terminated.
#[derive(Debug, Clone)]
pub enum RetryOutcome<T> {
    /// The operation succeeded
    Ok {
        /// Value produced by the winning invocation
        value: T,
        /// Closed run context
        context: RetryContext,
    },
    /// The run gave up
    Failed {
        /// Why the run ended
        reason: FailReason,
        /// Closed run context
        context: RetryContext,
    },
}

impl<T> RetryOutcome<T> {
    /// Whether the run produced a value
    pub fn is_ok(&self) -> bool {
        matches!(self, RetryOutcome::Ok { .. })
    }

    /// Whether the run gave up
    pub fn is_failed(&self) -> bool {
        !self.is_ok()
    }

    /// The closed run context
    pub fn context(&self) -> &RetryContext {
        match self {
            RetryOutcome::Ok { context, .. } | RetryOutcome::Failed { context, .. } => context,
        }
    }

    /// The produced value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            RetryOutcome::Ok { value, .. } => Some(value),
            RetryOutcome::Failed { .. } => None,
        }
    }

    /// Take the produced value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Ok { value, .. } => Some(value),
            RetryOutcome::Failed { .. } => None,
        }
    }

    /// Why the run gave up, if it did
    pub fn reason(&self) -> Option<FailReason> {
        match self {
            RetryOutcome::Ok { .. } => None,
            RetryOutcome::Failed { reason, .. } => Some(*reason),
        }
    }

    /// Convert into the unsafe form
    ///
    /// A stopped run surfaces the stop's original cause directly, which the
    /// ledger always ends on; every other failure becomes a
    /// [`TerminalFailure`].
    pub fn into_result(self) -> Result<T, RetryFailure> {
        match self {
            RetryOutcome::Ok { value, .. } => Ok(value),
            RetryOutcome::Failed {
                reason: FailReason::Stopped,
                context,
            } => match context.last_error().cloned() {
                Some(cause) => Err(RetryFailure::Stopped { cause, context }),
                None => Err(RetryFailure::Terminal(TerminalFailure::new(
                    FailReason::Stopped,
                    context,
                ))),
            },
            RetryOutcome::Failed { reason, context } => {
                Err(RetryFailure::Terminal(TerminalFailure::new(reason, context)))
            }
        }
    }
}

/// Terminal error carrying the full history of a failed run
#[derive(Debug, Clone)]
pub struct TerminalFailure {
    reason: FailReason,
    context: RetryContext,
}

impl TerminalFailure {
    /// Create a terminal failure
    pub fn new(reason: FailReason, context: RetryContext) -> Self {
        Self { reason, context }
    }

    /// Why the run ended
    pub fn reason(&self) -> FailReason {
        self.reason
    }

    /// The closed run context
    pub fn context(&self) -> &RetryContext {
        &self.context
    }

    /// Take the closed run context
    pub fn into_context(self) -> RetryContext {
        self.context
    }

    /// Most recently recorded error
    pub fn last_error(&self) -> Option<&RecordedError> {
        self.context.last_error()
    }
}

impl fmt::Display for TerminalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attempts = self.context.attempts();
        write!(
            f,
            "retry failed after {} attempt{} ({})",
            attempts,
            if attempts == 1 { "" } else { "s" },
            self.reason
        )?;
        if let Some(last) = self.context.last_error() {
            write!(f, ": {}", last)?;
        }
        Ok(())
    }
}

impl std::error::Error for TerminalFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.context
            .last_error()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Error raised by the unsafe entry points
#[derive(Debug, Clone, Error)]
pub enum RetryFailure {
    /// The operation raised a stop signal; displays as the original cause
    #[error("{cause}")]
    Stopped {
        /// The stop signal's original cause
        cause: RecordedError,
        /// Closed run context
        context: RetryContext,
    },

    /// Any other terminal path
    #[error(transparent)]
    Terminal(TerminalFailure),
}

impl RetryFailure {
    /// The closed run context
    pub fn context(&self) -> &RetryContext {
        match self {
            RetryFailure::Stopped { context, .. } => context,
            RetryFailure::Terminal(failure) => failure.context(),
        }
    }

    /// Why the run ended
    pub fn reason(&self) -> FailReason {
        match self {
            RetryFailure::Stopped { .. } => FailReason::Stopped,
            RetryFailure::Terminal(failure) => failure.reason(),
        }
    }

    /// Check if this is a stop signal's cause
    pub fn is_stopped(&self) -> bool {
        matches!(self, RetryFailure::Stopped { .. })
    }

    /// Check if the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.reason() == FailReason::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn failed_context(messages: &[&str]) -> RetryContext {
        let mut ctx = RetryContext::new();
        for message in messages {
            ctx.begin_attempt();
            ctx.errors_mut()
                .push(RecordedError::plain(anyhow!(message.to_string())));
        }
        ctx.close()
    }

    #[test]
    fn test_outcome_accessors() {
        let ok: RetryOutcome<u32> = RetryOutcome::Ok {
            value: 7,
            context: RetryContext::new().close(),
        };
        assert!(ok.is_ok());
        assert_eq!(ok.value(), Some(&7));
        assert_eq!(ok.reason(), None);

        let failed: RetryOutcome<u32> = RetryOutcome::Failed {
            reason: FailReason::TriesExhausted,
            context: failed_context(&["e1"]),
        };
        assert!(failed.is_failed());
        assert_eq!(failed.reason(), Some(FailReason::TriesExhausted));
        assert_eq!(failed.into_value(), None);
    }

    #[test]
    fn test_stopped_surfaces_original_cause() {
        let outcome: RetryOutcome<()> = RetryOutcome::Failed {
            reason: FailReason::Stopped,
            context: failed_context(&["orig"]),
        };

        let err = outcome.into_result().unwrap_err();
        assert!(err.is_stopped());
        assert_eq!(err.to_string(), "orig");
        assert_eq!(err.context().errors().len(), 1);
    }

    #[test]
    fn test_terminal_failure_display() {
        let outcome: RetryOutcome<()> = RetryOutcome::Failed {
            reason: FailReason::TriesExhausted,
            context: failed_context(&["e1", "e2"]),
        };

        let err = outcome.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "retry failed after 2 attempts (tries exhausted): e2"
        );
        assert_eq!(err.reason(), FailReason::TriesExhausted);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fail_reason_serializes_kebab_case() {
        let json = serde_json::to_value(FailReason::TimeBudgetExhausted).unwrap();
        assert_eq!(json, "time-budget-exhausted");
    }
}
