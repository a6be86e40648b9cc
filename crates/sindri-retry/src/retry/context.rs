//! Per-run bookkeeping
//!
//! A [`RetryContext`] is created when a run starts and is owned exclusively by
//! the loop. Hooks see it through a shared reference; callers receive an
//! immutable snapshot taken when the run terminates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::ledger::RecordedError;

/// Mutable record of a single retry run
///
/// Invariants: `attempts >= tries_consumed`, `end >= start`, and `errors` is
/// append-only for the lifetime of the run.
#[derive(Debug, Clone, Serialize)]
pub struct RetryContext {
    errors: Vec<RecordedError>,
    attempts: u32,
    tries_consumed: u32,
    started_at: DateTime<Utc>,
    #[serde(skip)]
    start: Instant,
    #[serde(skip)]
    end: Instant,
    #[serde(skip)]
    closed: bool,
    elapsed_ms: u64,
}

impl RetryContext {
    pub(crate) fn new() -> Self {
        let start = Instant::now();
        Self {
            errors: Vec::new(),
            attempts: 0,
            tries_consumed: 0,
            started_at: Utc::now(),
            start,
            end: start,
            closed: false,
            elapsed_ms: 0,
        }
    }

    /// Recorded errors, oldest first
    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    /// Most recently recorded error
    pub fn last_error(&self) -> Option<&RecordedError> {
        self.errors.last()
    }

    /// Number of attempts made, including ones that did not count against
    /// the retry budget
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of attempts whose failure was charged to the retry budget
    pub fn tries_consumed(&self) -> u32 {
        self.tries_consumed
    }

    /// Wall-clock time the run started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Monotonic start of the run
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Monotonic end of the run; equal to `start` until the run terminates
    pub fn end(&self) -> Instant {
        self.end
    }

    /// Whether the run has terminated
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Time spent so far, or the run's total duration once it has ended
    pub fn elapsed(&self) -> Duration {
        if self.closed {
            self.end - self.start
        } else {
            self.start.elapsed()
        }
    }

    pub(crate) fn errors_mut(&mut self) -> &mut Vec<RecordedError> {
        &mut self.errors
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub(crate) fn consume_try(&mut self) -> u32 {
        self.tries_consumed += 1;
        debug_assert!(self.attempts >= self.tries_consumed);
        self.tries_consumed
    }

    /// Close the run and take the snapshot handed to the caller
    pub(crate) fn close(mut self) -> Self {
        self.end = Instant::now();
        self.closed = true;
        self.elapsed_ms = (self.end - self.start).as_millis() as u64;
        self
    }

    /// View handed to one invocation of the operation
    pub(crate) fn attempt(&self, lane: usize) -> Attempt {
        Attempt {
            number: self.attempts,
            lane,
            tries_consumed: self.tries_consumed,
            elapsed: self.start.elapsed(),
            last_error: self.errors.last().cloned(),
        }
    }
}

/// Read-only view of the run passed to each invocation of the operation
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Attempt number (1-indexed); every lane of a fan-out round shares it
    pub number: u32,
    /// Index of this invocation within its round (always 0 without fan-out)
    pub lane: usize,
    /// Attempts charged to the retry budget so far
    pub tries_consumed: u32,
    /// Time since the run started
    pub elapsed: Duration,
    /// Most recently recorded error, if any
    pub last_error: Option<RecordedError>,
}

impl Attempt {
    /// Whether this is the first attempt of the run
    pub fn is_first(&self) -> bool {
        self.number == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test(start_paused = true)]
    async fn test_close_sets_end_after_start() {
        let ctx = RetryContext::new();
        tokio::time::advance(Duration::from_millis(250)).await;

        let snapshot = ctx.close();

        assert!(snapshot.end() >= snapshot.start());
        assert_eq!(snapshot.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_attempt_and_consumption_counters() {
        let mut ctx = RetryContext::new();
        assert_eq!(ctx.begin_attempt(), 1);
        assert_eq!(ctx.begin_attempt(), 2);
        assert_eq!(ctx.consume_try(), 1);

        assert_eq!(ctx.attempts(), 2);
        assert_eq!(ctx.tries_consumed(), 1);
    }

    #[test]
    fn test_attempt_view() {
        let mut ctx = RetryContext::new();
        ctx.begin_attempt();
        ctx.errors_mut().push(RecordedError::plain(anyhow!("boom")));

        let attempt = ctx.attempt(2);

        assert!(attempt.is_first());
        assert_eq!(attempt.lane, 2);
        assert_eq!(attempt.last_error.unwrap().message(), "boom");
    }

    #[test]
    fn test_serialize_snapshot() {
        let mut ctx = RetryContext::new();
        ctx.begin_attempt();
        ctx.errors_mut().push(RecordedError::plain(anyhow!("boom")));

        let json = serde_json::to_value(ctx.close()).unwrap();

        assert_eq!(json["attempts"], 1);
        assert_eq!(json["tries_consumed"], 0);
        assert_eq!(json["errors"][0]["message"], "boom");
        assert!(json.get("start").is_none());
    }
}
