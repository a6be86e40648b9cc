//! Cooperative cancellation
//!
//! The loop only looks at the token at fixed checkpoints: before each attempt,
//! after each attempt settles, around every hook and while waiting between
//! attempts. An in-flight invocation of the operation is never interrupted.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::ledger::{ErrorKind, RecordedError};

const DEFAULT_REASON: &str = "operation cancelled";

/// Cancellation handle shared between a run and whoever may cancel it
///
/// Clones share state. The first reason supplied wins; cancelling through
/// [`CancelToken::cancel`] or through the wrapped tokio-util token records a
/// generic reason.
///
/// # Example
///
/// ```rust
/// use sindri_retry::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
///
/// handle.cancel_with(anyhow::anyhow!("shutting down"));
/// assert!(token.is_cancelled());
/// assert_eq!(token.reason().unwrap().message(), "shutting down");
/// ```
#[derive(Clone, Default)]
pub struct CancelToken {
    token: CancellationToken,
    reason: Arc<OnceLock<RecordedError>>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing tokio-util token
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::default(),
        }
    }

    /// Cancel with the default reason
    pub fn cancel(&self) {
        self.cancel_with(anyhow::Error::msg(DEFAULT_REASON));
    }

    /// Cancel with the given reason
    pub fn cancel_with(&self, reason: impl Into<anyhow::Error>) {
        let _ = self
            .reason
            .set(RecordedError::new(ErrorKind::Cancelled, reason.into()));
        self.token.cancel();
    }

    /// Whether the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The cancellation reason, once cancelled
    pub fn reason(&self) -> Option<RecordedError> {
        if !self.is_cancelled() {
            return None;
        }
        Some(self.reason.get().cloned().unwrap_or_else(|| {
            RecordedError::new(ErrorKind::Cancelled, anyhow::Error::msg(DEFAULT_REASON))
        }))
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The wrapped tokio-util token
    pub fn inner(&self) -> &CancellationToken {
        &self.token
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason.get())
            .finish()
    }
}

impl From<CancellationToken> for CancelToken {
    fn from(token: CancellationToken) -> Self {
        Self::from_token(token)
    }
}

/// Abort if the token has been cancelled
///
/// Returns the cancellation reason as the error.
pub fn checkpoint(token: Option<&CancelToken>) -> Result<(), RecordedError> {
    match token.and_then(CancelToken::reason) {
        Some(reason) => {
            tracing::trace!(reason = %reason, "cancellation checkpoint tripped");
            Err(reason)
        }
        None => Ok(()),
    }
}

/// Wait for `delay`, aborting the instant the token is cancelled
///
/// The timer and the cancellation future race; whichever loses is dropped,
/// which deregisters it.
pub async fn sleep(delay: Duration, token: Option<&CancelToken>) -> Result<(), RecordedError> {
    checkpoint(token)?;

    match token {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => checkpoint(Some(token)),
                _ = tokio::time::sleep(delay) => Ok(()),
            }
        }
        None => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }
    }
}
