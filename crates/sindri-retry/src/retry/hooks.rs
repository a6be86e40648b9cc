//! Retry decision hooks
//!
//! Hooks let the caller steer the loop after a failed attempt. They are an
//! injected strategy: a policy always carries an implementation, and
//! [`DefaultHooks`] is the explicit "no opinion" one.

use std::sync::Arc;

use async_trait::async_trait;

use super::context::RetryContext;

/// Decision points consulted after every failed attempt
///
/// Every method receives a read-only view of the live context. An `Err` from
/// any hook is recorded in the context like any other failure and degrades
/// that hook's answer to "no" instead of aborting the run.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use sindri_retry::{RetryContext, RetryHooks};
///
/// struct OnlyTimeouts;
///
/// #[async_trait]
/// impl RetryHooks for OnlyTimeouts {
///     async fn retry_if(&self, context: &RetryContext) -> anyhow::Result<bool> {
///         Ok(context
///             .last_error()
///             .map(|e| e.message().contains("timed out"))
///             .unwrap_or(false))
///     }
/// }
/// ```
#[async_trait]
pub trait RetryHooks: Send + Sync {
    /// Called on every failed attempt (except stop signals), before any
    /// budget check
    async fn on_catch(&self, context: &RetryContext) -> anyhow::Result<()> {
        let _ = context;
        Ok(())
    }

    /// Whether this failure should be charged to the retry budget
    ///
    /// Returning `false` retries immediately without consuming a try.
    async fn consume_if(&self, context: &RetryContext) -> anyhow::Result<bool> {
        let _ = context;
        Ok(true)
    }

    /// Whether the run should keep retrying at all
    async fn retry_if(&self, context: &RetryContext) -> anyhow::Result<bool> {
        let _ = context;
        Ok(true)
    }
}

/// Hooks with no opinion: catch is a no-op, every failure is consumed and
/// retried
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

#[async_trait]
impl RetryHooks for DefaultHooks {}

type CatchFn = Box<dyn Fn(&RetryContext) -> anyhow::Result<()> + Send + Sync>;
type DecideFn = Box<dyn Fn(&RetryContext) -> anyhow::Result<bool> + Send + Sync>;

/// Hooks assembled from synchronous closures
///
/// Any hook left unset behaves like [`DefaultHooks`].
///
/// # Example
///
/// ```rust
/// use sindri_retry::ClosureHooks;
///
/// let hooks = ClosureHooks::new()
///     .with_consume_if(|ctx| Ok(ctx.attempts() > 3))
///     .with_retry_if(|ctx| Ok(ctx.errors().len() < 10));
/// ```
#[derive(Default)]
pub struct ClosureHooks {
    on_catch: Option<CatchFn>,
    consume_if: Option<DecideFn>,
    retry_if: Option<DecideFn>,
}

impl ClosureHooks {
    /// Create hooks with nothing set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the catch hook
    pub fn with_on_catch<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_catch = Some(Box::new(f));
        self
    }

    /// Set the consumption hook
    pub fn with_consume_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.consume_if = Some(Box::new(f));
        self
    }

    /// Set the retry hook
    pub fn with_retry_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.retry_if = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for ClosureHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureHooks")
            .field("on_catch", &self.on_catch.is_some())
            .field("consume_if", &self.consume_if.is_some())
            .field("retry_if", &self.retry_if.is_some())
            .finish()
    }
}

#[async_trait]
impl RetryHooks for ClosureHooks {
    async fn on_catch(&self, context: &RetryContext) -> anyhow::Result<()> {
        match &self.on_catch {
            Some(f) => f(context),
            None => Ok(()),
        }
    }

    async fn consume_if(&self, context: &RetryContext) -> anyhow::Result<bool> {
        match &self.consume_if {
            Some(f) => f(context),
            None => Ok(true),
        }
    }

    async fn retry_if(&self, context: &RetryContext) -> anyhow::Result<bool> {
        match &self.retry_if {
            Some(f) => f(context),
            None => Ok(true),
        }
    }
}

#[async_trait]
impl<T: RetryHooks + ?Sized> RetryHooks for Arc<T> {
    async fn on_catch(&self, context: &RetryContext) -> anyhow::Result<()> {
        (**self).on_catch(context).await
    }

    async fn consume_if(&self, context: &RetryContext) -> anyhow::Result<bool> {
        (**self).consume_if(context).await
    }

    async fn retry_if(&self, context: &RetryContext) -> anyhow::Result<bool> {
        (**self).retry_if(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_default_hooks() {
        let ctx = RetryContext::new();
        let hooks = DefaultHooks;

        assert!(hooks.on_catch(&ctx).await.is_ok());
        assert!(hooks.consume_if(&ctx).await.unwrap());
        assert!(hooks.retry_if(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_closure_hooks_unset_fall_back_to_defaults() {
        let ctx = RetryContext::new();
        let hooks = ClosureHooks::new().with_retry_if(|_| Ok(false));

        assert!(hooks.consume_if(&ctx).await.unwrap());
        assert!(!hooks.retry_if(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_closure_hooks_see_context() {
        let mut ctx = RetryContext::new();
        ctx.begin_attempt();
        ctx.begin_attempt();
        ctx.begin_attempt();
        let hooks = ClosureHooks::new().with_consume_if(|c| Ok(c.attempts() > 2));

        assert!(hooks.consume_if(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_hook_errors_surface() {
        let ctx = RetryContext::new();
        let hooks = ClosureHooks::new().with_on_catch(|_| Err(anyhow!("hook failed")));

        let err = hooks.on_catch(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "hook failed");
    }

    #[tokio::test]
    async fn test_arc_hooks_forward() {
        let ctx = RetryContext::new();
        let hooks: Arc<dyn RetryHooks> =
            Arc::new(ClosureHooks::new().with_retry_if(|_| Ok(false)));

        assert!(!hooks.retry_if(&ctx).await.unwrap());
    }
}
