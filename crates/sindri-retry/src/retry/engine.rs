//! The retry loop
//!
//! One round per iteration: checkpoint, attempt, classify, record, consult
//! hooks, then either terminate or wait and go again. All bookkeeping lives
//! in the run's [`RetryContext`]; the policy is never mutated.

use std::future::Future;
use std::time::Duration;

use super::cancel::{self, checkpoint};
use super::classify::{classify, Thrown};
use super::context::{Attempt, RetryContext};
use super::error::{FailReason, RetryFailure, RetryOutcome};
use super::executor::execute_round;
use super::ledger::{record, record_entry, RecordedError};
use super::policy::RetryPolicy;
use super::strategies::{duration_to_ms, wait_time};

/// Retry an operation until it succeeds or the policy gives up
///
/// Operation failures never surface as a panic or an `Err`; they end up in
/// the returned outcome's context. A panic inside the operation is captured
/// and recorded as a type mismatch.
///
/// # Example
///
/// ```rust
/// use sindri_retry::{retry, RetryPolicy};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = RetryPolicy::builder()
///     .tries(3)
///     .wait_min(Duration::from_millis(1))
///     .build()
///     .unwrap();
///
/// let outcome = retry(
///     |attempt| async move {
///         if attempt.number < 2 {
///             anyhow::bail!("not yet");
///         }
///         Ok(attempt.number)
///     },
///     &policy,
/// )
/// .await;
///
/// assert_eq!(outcome.value(), Some(&2));
/// assert_eq!(outcome.context().errors().len(), 1);
/// # }
/// ```
pub async fn retry<F, Fut, T, E>(mut op: F, policy: &RetryPolicy) -> RetryOutcome<T>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let mut context = RetryContext::new();
    let exit = run(&mut op, policy, &mut context).await;
    finish(exit, context, policy)
}

/// Retry an operation, returning the value directly
///
/// Runs the same loop as [`retry`]. A stop signal surfaces its original
/// cause; every other terminal path raises a
/// [`TerminalFailure`](super::TerminalFailure) carrying the context.
pub async fn retry_unsafe<F, Fut, T, E>(op: F, policy: &RetryPolicy) -> Result<T, RetryFailure>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    retry(op, policy).await.into_result()
}

/// How the loop left
enum Exit {
    Failed(FailReason),
    Stopped(Option<RecordedError>),
    Cancelled(RecordedError),
}

impl From<RecordedError> for Exit {
    fn from(reason: RecordedError) -> Self {
        Exit::Cancelled(reason)
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    OnCatch,
    ConsumeIf,
    RetryIf,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Hook::OnCatch => "on_catch",
            Hook::ConsumeIf => "consume_if",
            Hook::RetryIf => "retry_if",
        }
    }
}

async fn run<F, Fut, T, E>(
    op: &mut F,
    policy: &RetryPolicy,
    context: &mut RetryContext,
) -> Result<T, Exit>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let token = policy.cancellation();
    let observer = policy.observer();

    loop {
        checkpoint(token)?;
        let attempt = context.begin_attempt();
        observer.on_attempt_start(attempt, policy.tries());
        tracing::debug!(
            attempt,
            tries_consumed = context.tries_consumed(),
            "starting attempt"
        );

        let thrown = match execute_round(op, context.attempt(0), policy.concurrency()).await {
            Ok(value) => {
                checkpoint(token)?;
                return Ok(value);
            }
            Err(thrown) => thrown,
        };

        let classified = classify(thrown);
        record(
            &classified,
            context.errors_mut(),
            policy.skip_same_error_check(),
        );
        if classified.is_stop() {
            return Err(Exit::Stopped(classified.stop_cause()));
        }
        checkpoint(token)?;

        consult(Hook::OnCatch, policy, context).await?;

        let time_remaining_ms = time_remaining_ms(policy, context);
        if time_remaining_ms <= 0.0 {
            return Err(Exit::Failed(FailReason::TimeBudgetExhausted));
        }

        if classified.is_type_mismatch() {
            if consult(Hook::ConsumeIf, policy, context).await? {
                context.consume_try();
                return Err(Exit::Failed(FailReason::TypeMismatch));
            }
            observer.on_attempt_failed(attempt, context.last_error(), Duration::ZERO);
            continue;
        }

        if !consult(Hook::RetryIf, policy, context).await? {
            return Err(Exit::Failed(FailReason::Declined));
        }

        let consumed = consult(Hook::ConsumeIf, policy, context).await?;
        if !consumed && !policy.wait_if_not_consumed() {
            tracing::debug!(attempt, "failure not consumed, retrying immediately");
            observer.on_attempt_failed(attempt, context.last_error(), Duration::ZERO);
            continue;
        }

        let delay = wait_time(time_remaining_ms, context.tries_consumed(), policy.backoff());
        if consumed {
            let tries_consumed = context.consume_try();
            if policy.tries().is_some_and(|tries| tries_consumed >= tries) {
                return Err(Exit::Failed(FailReason::TriesExhausted));
            }
        }

        observer.on_attempt_failed(attempt, context.last_error(), delay);
        tracing::debug!(
            attempt,
            consumed,
            delay_ms = delay.as_millis() as u64,
            "waiting before next attempt"
        );
        cancel::sleep(delay, token).await?;
    }
}

/// Ask a hook, recording its failure and treating it as "no"
///
/// The cancellation token is checked on both sides of the call.
async fn consult(
    hook: Hook,
    policy: &RetryPolicy,
    context: &mut RetryContext,
) -> Result<bool, RecordedError> {
    checkpoint(policy.cancellation())?;

    let hooks = policy.hooks();
    let answer = match hook {
        Hook::OnCatch => hooks.on_catch(context).await.map(|()| true),
        Hook::ConsumeIf => hooks.consume_if(context).await,
        Hook::RetryIf => hooks.retry_if(context).await,
    };

    let answer = answer.unwrap_or_else(|err| {
        tracing::debug!(hook = hook.name(), error = %format!("{err:#}"), "hook failed");
        record(
            &classify(Thrown::Error(err)),
            context.errors_mut(),
            policy.skip_same_error_check(),
        );
        false
    });

    checkpoint(policy.cancellation())?;
    Ok(answer)
}

fn time_remaining_ms(policy: &RetryPolicy, context: &RetryContext) -> f64 {
    match policy.time_max() {
        Some(time_max) => duration_to_ms(time_max) - duration_to_ms(context.elapsed()),
        None => f64::INFINITY,
    }
}

fn finish<T>(
    exit: Result<T, Exit>,
    mut context: RetryContext,
    policy: &RetryPolicy,
) -> RetryOutcome<T> {
    let observer = policy.observer();
    let attempt = context.attempts();

    match exit {
        Ok(value) => {
            let context = context.close();
            observer.on_success(attempt, context.elapsed());
            tracing::debug!(attempt, "operation succeeded");
            RetryOutcome::Ok { value, context }
        }
        Err(Exit::Cancelled(reason)) => {
            observer.on_cancelled(attempt, &reason);
            record_entry(reason, context.errors_mut(), policy.skip_same_error_check());
            let context = context.close();
            tracing::debug!(attempt, "run cancelled");
            RetryOutcome::Failed {
                reason: FailReason::Cancelled,
                context,
            }
        }
        Err(Exit::Stopped(cause)) => {
            observer.on_stopped(attempt, cause.as_ref());
            let context = context.close();
            tracing::debug!(attempt, "run stopped");
            RetryOutcome::Failed {
                reason: FailReason::Stopped,
                context,
            }
        }
        Err(Exit::Failed(reason)) => {
            let context = context.close();
            observer.on_exhausted(reason, &context);
            tracing::debug!(attempt, reason = %reason, "run failed");
            RetryOutcome::Failed { reason, context }
        }
    }
}
