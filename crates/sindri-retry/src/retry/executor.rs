//! Attempt execution
//!
//! Runs one round of the operation. With a concurrency of one the single
//! invocation is awaited directly; otherwise every lane is started up front
//! and they are polled together on the caller's task until one succeeds or
//! all have failed.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use super::classify::Thrown;
use super::context::Attempt;

/// Run one round of `op`
///
/// A panic while creating or polling an invocation is captured as
/// [`Thrown::Panic`] instead of unwinding through the loop. When several
/// lanes run and all fail, their failures are returned as a
/// [`Thrown::Aggregate`] ordered by lane, not by completion. Once a lane
/// succeeds the others are dropped without being polled further.
pub(crate) async fn execute_round<F, Fut, T, E>(
    op: &mut F,
    attempt: Attempt,
    concurrency: usize,
) -> Result<T, Thrown>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    if concurrency <= 1 {
        let invocation = start(op, attempt)?;
        return settle(invocation).await;
    }

    let mut failures: Vec<Option<Thrown>> = (0..concurrency).map(|_| None).collect();
    let mut pending = FuturesUnordered::new();

    for lane in 0..concurrency {
        let lane_attempt = Attempt {
            lane,
            ..attempt.clone()
        };
        match start(op, lane_attempt) {
            Ok(invocation) => pending.push(async move { (lane, settle(invocation).await) }),
            Err(thrown) => failures[lane] = Some(thrown),
        }
    }

    while let Some((lane, result)) = pending.next().await {
        match result {
            Ok(value) => {
                tracing::trace!(lane, "lane won the round");
                return Ok(value);
            }
            Err(thrown) => failures[lane] = Some(thrown),
        }
    }

    Err(Thrown::Aggregate(failures.into_iter().flatten().collect()))
}

fn start<F, Fut>(op: &mut F, attempt: Attempt) -> Result<Fut, Thrown>
where
    F: FnMut(Attempt) -> Fut,
{
    panic::catch_unwind(AssertUnwindSafe(|| op(attempt))).map_err(Thrown::Panic)
}

async fn settle<Fut, T, E>(invocation: Fut) -> Result<T, Thrown>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Thrown::Error(err.into())),
        Err(payload) => Err(Thrown::Panic(payload)),
    }
}
