//! Common test utilities for sindri-retry
//!
//! This module provides shared test infrastructure including:
//! - A scripted flaky service standing in for a remote dependency
//! - Policy helpers with short waits
//! - Assertion helpers for run contexts

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use sindri_retry::{RetryContext, RetryPolicy, RetryPolicyBuilder, StopRetry};

/// One scripted response of a [`FlakyService`]
#[derive(Debug, Clone)]
pub enum Step {
    /// Fail with the given message
    Fail(&'static str),
    /// Fail with a stop signal wrapping the given message
    Stop(&'static str),
    /// Succeed with the given payload
    Succeed(&'static str),
}

/// A service that answers from a script, then keeps failing
#[derive(Debug, Clone, Default)]
pub struct FlakyService {
    script: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<AtomicU32>,
}

impl FlakyService {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            calls: Arc::default(),
        }
    }

    pub async fn fetch(&self) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Succeed(payload)) => Ok(payload.to_string()),
            Some(Step::Fail(message)) => Err(anyhow!(message)),
            Some(Step::Stop(message)) => Err(StopRetry::msg(message).into()),
            None => Err(anyhow!("service unavailable")),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Policy builder with 10ms fixed waits
pub fn quick_policy(tries: u32) -> RetryPolicyBuilder {
    RetryPolicy::builder()
        .tries(tries)
        .wait_min(Duration::from_millis(10))
}

/// Assert the ledger's messages, oldest first
pub fn assert_error_messages(context: &RetryContext, expected: &[&str]) {
    let messages: Vec<&str> = context.errors().iter().map(|e| e.message()).collect();
    assert_eq!(messages, expected, "unexpected error history");
}
