//! # sindri-retry
//!
//! Policy-driven retry engine for Sindri providing:
//! - Attempt and time budgets with fixed, linear or exponential backoff
//! - Error classification and a de-duplicated per-run error history
//! - Concurrent fan-out and cooperative cancellation
//! - Retry policy files (retry-policies.yaml) with per-operation overrides

pub mod config;
pub mod error;
pub mod retry;

pub use config::RetryPoliciesConfig;
pub use error::{Error, Result};
pub use retry::{
    bind, retry, retry_unsafe, Attempt, CancelToken, ClosureHooks, DefaultHooks, FailReason,
    RecordedError, RetryContext, RetryFailure, RetryHooks, RetryObserver, RetryOptions,
    RetryOutcome, RetryPolicy, RetryPolicyBuilder, Retryable, StatsObserver, StopRetry,
    TerminalFailure, TracingObserver,
};
