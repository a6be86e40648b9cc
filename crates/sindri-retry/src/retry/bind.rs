//! Binding a policy to an operation
//!
//! [`bind`] closes a policy over a function of `(args, attempt)` so call
//! sites only pass the arguments.

use std::future::Future;

use super::context::Attempt;
use super::engine::{retry, retry_unsafe};
use super::error::{RetryFailure, RetryOutcome};
use super::policy::RetryPolicy;

/// An operation with a retry policy attached
///
/// # Example
///
/// ```rust
/// use sindri_retry::{bind, Attempt, RetryPolicy};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetch = bind(
///     |url: &'static str, _attempt: Attempt| async move { Ok::<_, anyhow::Error>(url.len()) },
///     RetryPolicy::default(),
/// );
///
/// assert_eq!(fetch.call_unsafe("https://example.com").await.unwrap(), 19);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Retryable<F> {
    op: F,
    policy: RetryPolicy,
}

/// Attach `policy` to `op`
pub fn bind<F>(op: F, policy: RetryPolicy) -> Retryable<F> {
    Retryable { op, policy }
}

impl<F> Retryable<F> {
    /// The attached policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the operation with `args` under the attached policy
    ///
    /// Every attempt receives its own clone of `args`.
    pub async fn call<A, Fut, T, E>(&self, args: A) -> RetryOutcome<T>
    where
        F: Fn(A, Attempt) -> Fut,
        A: Clone,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        retry(|attempt| (self.op)(args.clone(), attempt), &self.policy).await
    }

    /// Like [`call`](Self::call), returning the value directly
    pub async fn call_unsafe<A, Fut, T, E>(&self, args: A) -> Result<T, RetryFailure>
    where
        F: Fn(A, Attempt) -> Fut,
        A: Clone,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        retry_unsafe(|attempt| (self.op)(args.clone(), attempt), &self.policy).await
    }
}
