//! Retry engine with policy-based configuration
//!
//! This module runs a fallible async operation repeatedly under a sealed
//! [`RetryPolicy`] until it succeeds, is explicitly stopped, is cancelled or
//! exhausts its budget.
//!
//! # Features
//!
//! - Attempt and wall-clock budgets, both optionally unbounded
//! - Fixed, linear and exponential backoff with optional jitter and ceiling
//! - Concurrent fan-out of several invocations per attempt
//! - Decision hooks (`on_catch`, `consume_if`, `retry_if`) via `RetryHooks`
//! - Cooperative cancellation that interrupts backoff waits immediately
//! - Observable runs via the `RetryObserver` trait
//! - A full error history in the returned `RetryContext`
//!
//! # Example
//!
//! ```rust,no_run
//! use sindri_retry::retry::{retry, RetryOutcome, RetryPolicy};
//!
//! async fn example() -> Option<String> {
//!     let policy = RetryPolicy::default();
//!
//!     let outcome = retry(|_attempt| async {
//!         // Your fallible operation here
//!         Ok::<_, anyhow::Error>("success".to_string())
//!     }, &policy).await;
//!
//!     match outcome {
//!         RetryOutcome::Ok { value, .. } => Some(value),
//!         RetryOutcome::Failed { reason, context } => {
//!             eprintln!("gave up ({reason}) after {} attempts", context.attempts());
//!             None
//!         }
//!     }
//! }
//! ```

mod bind;
mod cancel;
mod classify;
mod context;
mod engine;
mod error;
mod executor;
mod hooks;
mod ledger;
mod observer;
mod policy;
mod strategies;

pub use bind::{bind, Retryable};
pub use cancel::{checkpoint, sleep as cancellable_sleep, CancelToken};
pub use classify::{
    classify, AggregateError, ClassifiedError, StopRetry, Thrown, TypeMismatchError,
};
pub use context::{Attempt, RetryContext};
pub use engine::{retry, retry_unsafe};
pub use error::{FailReason, RetryFailure, RetryOutcome, TerminalFailure};
pub use hooks::{ClosureHooks, DefaultHooks, RetryHooks};
pub use ledger::{record, record_entry, ErrorKind, RecordedError};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use policy::{
    validate_numeric_option, NumericBounds, RetryOptions, RetryPolicy, RetryPolicyBuilder,
};
pub use strategies::{wait_time, wait_time_with_jitter, Backoff};
