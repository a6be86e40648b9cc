//! Retry observation and logging
//!
//! This module provides the `RetryObserver` trait for monitoring a run and a
//! `TracingObserver` implementation that logs using the `tracing` crate.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::context::RetryContext;
use super::error::FailReason;
use super::ledger::RecordedError;

/// Observer trait for retry run events
///
/// Implement this trait to receive callbacks during a run. This is useful for
/// logging, metrics collection, or debugging. Observers cannot influence the
/// run; use [`RetryHooks`](super::RetryHooks) for that.
///
/// # Example
///
/// ```rust
/// use sindri_retry::{FailReason, RecordedError, RetryContext, RetryObserver};
/// use std::time::Duration;
///
/// struct MetricsObserver;
///
/// impl RetryObserver for MetricsObserver {
///     fn on_attempt_start(&self, attempt: u32, max_tries: Option<u32>) {}
///
///     fn on_attempt_failed(&self, attempt: u32, error: Option<&RecordedError>, delay: Duration) {}
///
///     fn on_success(&self, attempt: u32, total_duration: Duration) {}
///
///     fn on_exhausted(&self, reason: FailReason, context: &RetryContext) {}
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    /// Called when an attempt is about to start
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt number (1-indexed)
    /// * `max_tries` - The retry budget, `None` when unbounded
    fn on_attempt_start(&self, attempt: u32, max_tries: Option<u32>);

    /// Called when an attempt failed and the run will continue
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt number that failed (1-indexed)
    /// * `error` - The most recent ledger entry
    /// * `delay` - The wait before the next attempt (zero when skipped)
    fn on_attempt_failed(&self, attempt: u32, error: Option<&RecordedError>, delay: Duration);

    /// Called when the operation succeeds
    fn on_success(&self, attempt: u32, total_duration: Duration);

    /// Called when the run gives up for any reason other than a stop signal
    /// or cancellation
    fn on_exhausted(&self, reason: FailReason, context: &RetryContext);

    /// Called when an attempt raised a stop signal
    fn on_stopped(&self, attempt: u32, cause: Option<&RecordedError>) {
        let _ = (attempt, cause);
    }

    /// Called when the run's cancellation token fired
    fn on_cancelled(&self, attempt: u32, reason: &RecordedError) {
        let _ = (attempt, reason);
    }
}

/// A no-op observer that does nothing
///
/// This is the observer a policy carries unless another one is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_tries: Option<u32>) {}

    fn on_attempt_failed(&self, _attempt: u32, _error: Option<&RecordedError>, _delay: Duration) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _reason: FailReason, _context: &RetryContext) {}
}

/// An observer that logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_attempt_failed`: WARN
/// - `on_success`: INFO (if > 1 attempt) or DEBUG (first attempt)
/// - `on_exhausted`: ERROR
/// - `on_stopped`, `on_cancelled`: WARN
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Name of the operation being retried (for log context)
    operation: String,
}

impl TracingObserver {
    /// Create a new tracing observer
    ///
    /// # Arguments
    ///
    /// * `operation` - A descriptive name for the operation being retried
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Get the operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_tries: Option<u32>) {
        tracing::debug!(
            operation = %self.operation,
            attempt = attempt,
            max_tries = ?max_tries,
            "starting attempt"
        );
    }

    fn on_attempt_failed(&self, attempt: u32, error: Option<&RecordedError>, delay: Duration) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            error = error.map(RecordedError::message).unwrap_or("<none>"),
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt = attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, reason: FailReason, context: &RetryContext) {
        tracing::error!(
            operation = %self.operation,
            reason = %reason,
            attempts = context.attempts(),
            tries_consumed = context.tries_consumed(),
            error = context.last_error().map(RecordedError::message).unwrap_or("<none>"),
            "retry gave up"
        );
    }

    fn on_stopped(&self, attempt: u32, cause: Option<&RecordedError>) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            cause = cause.map(RecordedError::message).unwrap_or("<none>"),
            "retry stopped by stop signal"
        );
    }

    fn on_cancelled(&self, attempt: u32, reason: &RecordedError) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            reason = %reason,
            "retry cancelled"
        );
    }
}

/// An observer that collects statistics about a run
///
/// Useful for testing and metrics collection.
#[derive(Debug, Default)]
pub struct StatsObserver {
    /// Attempt start events
    pub attempt_starts: AtomicU32,
    /// Failed attempt events
    pub failures: AtomicU32,
    /// Success events
    pub successes: AtomicU32,
    /// Exhaustion events
    pub exhaustions: AtomicU32,
    /// Stop events
    pub stops: AtomicU32,
    /// Cancellation events
    pub cancellations: AtomicU32,
}

impl StatsObserver {
    /// Create a new stats observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of attempt starts
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Get the number of failures
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Get the number of successes
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Get the number of exhaustions
    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    /// Get the number of stops
    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Get the number of cancellations
    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_tries: Option<u32>) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_attempt_failed(&self, _attempt: u32, _error: Option<&RecordedError>, _delay: Duration) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _reason: FailReason, _context: &RetryContext) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stopped(&self, _attempt: u32, _cause: Option<&RecordedError>) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _attempt: u32, _reason: &RecordedError) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Implement RetryObserver for Arc<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, attempt: u32, max_tries: Option<u32>) {
        (**self).on_attempt_start(attempt, max_tries)
    }

    fn on_attempt_failed(&self, attempt: u32, error: Option<&RecordedError>, delay: Duration) {
        (**self).on_attempt_failed(attempt, error, delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, reason: FailReason, context: &RetryContext) {
        (**self).on_exhausted(reason, context)
    }

    fn on_stopped(&self, attempt: u32, cause: Option<&RecordedError>) {
        (**self).on_stopped(attempt, cause)
    }

    fn on_cancelled(&self, attempt: u32, reason: &RecordedError) {
        (**self).on_cancelled(attempt, reason)
    }
}

/// Implement RetryObserver for Box<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for Box<T> {
    fn on_attempt_start(&self, attempt: u32, max_tries: Option<u32>) {
        (**self).on_attempt_start(attempt, max_tries)
    }

    fn on_attempt_failed(&self, attempt: u32, error: Option<&RecordedError>, delay: Duration) {
        (**self).on_attempt_failed(attempt, error, delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, reason: FailReason, context: &RetryContext) {
        (**self).on_exhausted(reason, context)
    }

    fn on_stopped(&self, attempt: u32, cause: Option<&RecordedError>) {
        (**self).on_stopped(attempt, cause)
    }

    fn on_cancelled(&self, attempt: u32, reason: &RecordedError) {
        (**self).on_cancelled(attempt, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_noop_observer() {
        let observer = NoOpObserver;
        let error = RecordedError::plain(anyhow!("test"));
        let ctx = RetryContext::new();

        // These should all be no-ops
        observer.on_attempt_start(1, Some(3));
        observer.on_attempt_failed(1, Some(&error), Duration::from_millis(100));
        observer.on_success(2, Duration::from_millis(500));
        observer.on_exhausted(FailReason::TriesExhausted, &ctx);
        observer.on_stopped(2, Some(&error));
        observer.on_cancelled(2, &error);
    }

    #[test]
    fn test_stats_observer() {
        let observer = StatsObserver::new();
        let error = RecordedError::plain(anyhow!("test"));

        observer.on_attempt_start(1, Some(3));
        observer.on_attempt_start(2, Some(3));
        observer.on_attempt_failed(1, Some(&error), Duration::from_millis(100));
        observer.on_success(2, Duration::from_millis(500));

        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.failures(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.exhaustions(), 0);
    }

    #[test]
    fn test_stats_observer_terminal_events() {
        let observer = StatsObserver::new();
        let error = RecordedError::plain(anyhow!("test"));
        let ctx = RetryContext::new();

        observer.on_exhausted(FailReason::TimeBudgetExhausted, &ctx);
        observer.on_stopped(1, None);
        observer.on_cancelled(1, &error);

        assert_eq!(observer.exhaustions(), 1);
        assert_eq!(observer.stops(), 1);
        assert_eq!(observer.cancellations(), 1);
    }

    #[test]
    fn test_tracing_observer_creation() {
        let observer = TracingObserver::new("test_operation");
        assert_eq!(observer.operation, "test_operation");

        let default_observer = TracingObserver::default();
        assert_eq!(default_observer.operation, "retry");
    }

    #[test]
    fn test_tracing_observer_logs_under_subscriber() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        let observer = TracingObserver::new("download");
        let error = RecordedError::plain(anyhow!("connection reset"));

        tracing::subscriber::with_default(subscriber, || {
            observer.on_attempt_start(1, None);
            observer.on_attempt_failed(1, Some(&error), Duration::from_millis(10));
            observer.on_success(2, Duration::from_millis(30));
            observer.on_exhausted(FailReason::Declined, &RetryContext::new());
            observer.on_stopped(3, Some(&error));
            observer.on_cancelled(3, &error);
        });
    }

    #[test]
    fn test_arc_observer() {
        let observer = std::sync::Arc::new(StatsObserver::new());
        let error = RecordedError::plain(anyhow!("test"));

        observer.on_attempt_start(1, Some(3));
        observer.on_attempt_failed(1, Some(&error), Duration::from_millis(100));

        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.failures(), 1);
    }
}
