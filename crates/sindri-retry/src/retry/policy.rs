//! Retry policy options, validation and sealing
//!
//! [`RetryOptions`] is the raw, partially-filled form read from config files
//! or assembled by hand. [`RetryPolicy`] is the immutable, fully-defaulted
//! form the loop runs against; it can only be produced by validating a set of
//! options, so a run never starts with a malformed value.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::cancel::CancelToken;
use super::hooks::{DefaultHooks, RetryHooks};
use super::observer::{NoOpObserver, RetryObserver};
use super::strategies::{duration_to_ms, ms_to_duration, Backoff};

const DEFAULT_TRIES: f64 = 5.0;
const DEFAULT_WAIT_MIN_MS: f64 = 1000.0;
const DEFAULT_FACTOR: f64 = 1.0;
const DEFAULT_CONCURRENCY: f64 = 1.0;
const MAX_CONCURRENCY: f64 = u16::MAX as f64;

/// Constraints applied to a numeric option
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericBounds {
    /// Reject infinite values
    pub finite: bool,
    /// Smallest accepted value
    pub min: f64,
    /// Largest accepted value
    pub max: f64,
    /// Reject values with a fractional part
    pub integer: bool,
}

impl Default for NumericBounds {
    fn default() -> Self {
        Self {
            finite: true,
            min: 0.0,
            max: f64::INFINITY,
            integer: false,
        }
    }
}

/// Validate a single numeric option
///
/// An unset option is always accepted; its default applies later.
///
/// # Example
///
/// ```rust
/// use sindri_retry::retry::{validate_numeric_option, NumericBounds};
///
/// let bounds = NumericBounds { min: 1.0, ..NumericBounds::default() };
///
/// assert!(validate_numeric_option("concurrency", Some(3.0), bounds).is_ok());
/// assert!(validate_numeric_option("concurrency", Some(0.0), bounds).is_err());
/// assert!(validate_numeric_option("concurrency", None, bounds).is_ok());
/// ```
pub fn validate_numeric_option(
    name: &'static str,
    value: Option<f64>,
    bounds: NumericBounds,
) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };

    if value.is_nan() {
        return Err(Error::NotANumber { name });
    }
    if value < bounds.min {
        return Err(Error::OutOfRange {
            name,
            min: bounds.min,
        });
    }
    if bounds.finite && value.is_infinite() {
        return Err(Error::NotFinite { name });
    }
    if value > bounds.max {
        return Err(Error::TooLarge {
            name,
            max: bounds.max,
        });
    }
    if bounds.integer && value.is_finite() && value.fract() != 0.0 {
        return Err(Error::NotInteger { name });
    }
    Ok(())
}

/// Raw retry options, every field optional
///
/// Durations are in milliseconds. Where a field may be unbounded, YAML's
/// `.inf` is accepted.
///
/// # Example
///
/// ```yaml
/// tries: 3
/// wait-min-ms: 200
/// factor: 2
/// random: true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryOptions {
    /// Attempt budget (at least 1, may be infinite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tries: Option<f64>,

    /// Wall-clock budget in milliseconds (may be infinite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_max_ms: Option<f64>,

    /// Base wait between attempts in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_min_ms: Option<f64>,

    /// Ceiling on a single wait in milliseconds (may be infinite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_max_ms: Option<f64>,

    /// Exponential backoff base
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,

    /// Parallel invocations per attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<f64>,

    /// Multiply the wait by the number of consumed tries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear: Option<bool>,

    /// Jitter the wait by a factor in `[1, 2)`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random: Option<bool>,

    /// Record every error, even immediate repeats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_same_error_check: Option<bool>,

    /// Wait the computed backoff even when a failure was not consumed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_if_not_consumed: Option<bool>,
}

impl RetryOptions {
    /// Overlay these options on `base`; fields set here win
    pub fn merged_over(&self, base: &RetryOptions) -> RetryOptions {
        RetryOptions {
            tries: self.tries.or(base.tries),
            time_max_ms: self.time_max_ms.or(base.time_max_ms),
            wait_min_ms: self.wait_min_ms.or(base.wait_min_ms),
            wait_max_ms: self.wait_max_ms.or(base.wait_max_ms),
            factor: self.factor.or(base.factor),
            concurrency: self.concurrency.or(base.concurrency),
            linear: self.linear.or(base.linear),
            random: self.random.or(base.random),
            skip_same_error_check: self.skip_same_error_check.or(base.skip_same_error_check),
            wait_if_not_consumed: self.wait_if_not_consumed.or(base.wait_if_not_consumed),
        }
    }

    /// Validate every numeric field
    pub fn validate(&self) -> Result<()> {
        validate_numeric_option(
            "tries",
            self.tries,
            NumericBounds {
                finite: false,
                min: 1.0,
                max: f64::INFINITY,
                integer: true,
            },
        )?;
        validate_numeric_option(
            "time-max-ms",
            self.time_max_ms,
            NumericBounds {
                finite: false,
                ..NumericBounds::default()
            },
        )?;
        validate_numeric_option("wait-min-ms", self.wait_min_ms, NumericBounds::default())?;
        validate_numeric_option(
            "wait-max-ms",
            self.wait_max_ms,
            NumericBounds {
                finite: false,
                ..NumericBounds::default()
            },
        )?;
        validate_numeric_option("factor", self.factor, NumericBounds::default())?;
        validate_numeric_option(
            "concurrency",
            self.concurrency,
            NumericBounds {
                finite: true,
                min: 1.0,
                max: MAX_CONCURRENCY,
                integer: true,
            },
        )?;
        Ok(())
    }
}

/// Sealed retry policy
///
/// Cheap to clone: hooks and observer are shared.
#[derive(Clone)]
pub struct RetryPolicy {
    tries: Option<u32>,
    time_max: Option<Duration>,
    backoff: Backoff,
    skip_same_error_check: bool,
    wait_if_not_consumed: bool,
    concurrency: usize,
    hooks: Arc<dyn RetryHooks>,
    observer: Arc<dyn RetryObserver>,
    cancellation: Option<CancelToken>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: Some(DEFAULT_TRIES as u32),
            time_max: None,
            backoff: Backoff::default(),
            skip_same_error_check: false,
            wait_if_not_consumed: false,
            concurrency: DEFAULT_CONCURRENCY as usize,
            hooks: Arc::new(DefaultHooks),
            observer: Arc::new(NoOpObserver),
            cancellation: None,
        }
    }
}

impl RetryPolicy {
    /// Start building a policy from the defaults
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Validate raw options and seal them with default hooks and observer
    pub fn from_options(options: &RetryOptions) -> Result<Self> {
        options.validate()?;

        let tries = options.tries.unwrap_or(DEFAULT_TRIES);
        let tries = if tries.is_infinite() {
            None
        } else {
            // `as` saturates for budgets beyond u32
            Some(tries as u32)
        };

        let time_max = options
            .time_max_ms
            .filter(|ms| ms.is_finite())
            .map(ms_to_duration);

        Ok(Self {
            tries,
            time_max,
            backoff: Backoff {
                wait_min_ms: options.wait_min_ms.unwrap_or(DEFAULT_WAIT_MIN_MS),
                wait_max_ms: options.wait_max_ms.unwrap_or(f64::INFINITY),
                factor: options.factor.unwrap_or(DEFAULT_FACTOR),
                linear: options.linear.unwrap_or(false),
                random: options.random.unwrap_or(false),
            },
            skip_same_error_check: options.skip_same_error_check.unwrap_or(false),
            wait_if_not_consumed: options.wait_if_not_consumed.unwrap_or(false),
            concurrency: options.concurrency.unwrap_or(DEFAULT_CONCURRENCY) as usize,
            ..Self::default()
        })
    }

    /// Attempt budget, `None` when unbounded
    pub fn tries(&self) -> Option<u32> {
        self.tries
    }

    /// Wall-clock budget, `None` when unbounded
    pub fn time_max(&self) -> Option<Duration> {
        self.time_max
    }

    /// Backoff parameters
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether consecutive identical errors are all recorded
    pub fn skip_same_error_check(&self) -> bool {
        self.skip_same_error_check
    }

    /// Whether declined consumption still waits
    pub fn wait_if_not_consumed(&self) -> bool {
        self.wait_if_not_consumed
    }

    /// Parallel invocations per attempt
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Decision hooks
    pub fn hooks(&self) -> &dyn RetryHooks {
        self.hooks.as_ref()
    }

    /// Event observer
    pub fn observer(&self) -> &dyn RetryObserver {
        self.observer.as_ref()
    }

    /// Cancellation token, if any
    pub fn cancellation(&self) -> Option<&CancelToken> {
        self.cancellation.as_ref()
    }

    /// Same policy, bound to a different cancellation token
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("tries", &self.tries)
            .field("time_max", &self.time_max)
            .field("backoff", &self.backoff)
            .field("skip_same_error_check", &self.skip_same_error_check)
            .field("wait_if_not_consumed", &self.wait_if_not_consumed)
            .field("concurrency", &self.concurrency)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryPolicy`]
///
/// Numeric settings are validated together in [`build`](Self::build).
///
/// # Example
///
/// ```rust
/// use sindri_retry::{RetryPolicy, TracingObserver};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder()
///     .tries(3)
///     .wait_min(Duration::from_millis(200))
///     .factor(2.0)
///     .with_observer(TracingObserver::new("download"))
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.tries(), Some(3));
/// ```
#[derive(Default)]
pub struct RetryPolicyBuilder {
    options: RetryOptions,
    hooks: Option<Arc<dyn RetryHooks>>,
    observer: Option<Arc<dyn RetryObserver>>,
    cancellation: Option<CancelToken>,
}

impl RetryPolicyBuilder {
    /// Create a builder with every option unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay raw options; fields set in `options` win
    pub fn options(mut self, options: &RetryOptions) -> Self {
        self.options = options.merged_over(&self.options);
        self
    }

    /// Set the attempt budget
    pub fn tries(mut self, tries: u32) -> Self {
        self.options.tries = Some(f64::from(tries));
        self
    }

    /// Retry until success, stop, decline, cancellation or time budget
    pub fn unbounded_tries(mut self) -> Self {
        self.options.tries = Some(f64::INFINITY);
        self
    }

    /// Set the wall-clock budget
    pub fn time_max(mut self, time_max: Duration) -> Self {
        self.options.time_max_ms = Some(duration_to_ms(time_max));
        self
    }

    /// Set the base wait
    pub fn wait_min(mut self, wait: Duration) -> Self {
        self.options.wait_min_ms = Some(duration_to_ms(wait));
        self
    }

    /// Set the ceiling on a single wait
    pub fn wait_max(mut self, wait: Duration) -> Self {
        self.options.wait_max_ms = Some(duration_to_ms(wait));
        self
    }

    /// Set the exponential backoff base
    pub fn factor(mut self, factor: f64) -> Self {
        self.options.factor = Some(factor);
        self
    }

    /// Enable or disable linear backoff
    pub fn linear(mut self, linear: bool) -> Self {
        self.options.linear = Some(linear);
        self
    }

    /// Enable or disable jitter
    pub fn random(mut self, random: bool) -> Self {
        self.options.random = Some(random);
        self
    }

    /// Record every error, even immediate repeats
    pub fn skip_same_error_check(mut self, skip: bool) -> Self {
        self.options.skip_same_error_check = Some(skip);
        self
    }

    /// Wait the computed backoff even when a failure was not consumed
    pub fn wait_if_not_consumed(mut self, wait: bool) -> Self {
        self.options.wait_if_not_consumed = Some(wait);
        self
    }

    /// Set the number of parallel invocations per attempt
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = Some(concurrency as f64);
        self
    }

    /// Set the decision hooks
    pub fn with_hooks<H: RetryHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Set the observer
    ///
    /// The observer receives callbacks during the run.
    pub fn with_observer<O: RetryObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Set the cancellation token
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Validate and seal the policy
    pub fn build(self) -> Result<RetryPolicy> {
        let mut policy = RetryPolicy::from_options(&self.options)?;
        if let Some(hooks) = self.hooks {
            policy.hooks = hooks;
        }
        if let Some(observer) = self.observer {
            policy.observer = observer;
        }
        policy.cancellation = self.cancellation;
        Ok(policy)
    }
}

impl fmt::Debug for RetryPolicyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicyBuilder")
            .field("options", &self.options)
            .field("hooks", &self.hooks.is_some())
            .field("observer", &self.observer.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.tries(), Some(5));
        assert_eq!(policy.time_max(), None);
        assert_eq!(policy.backoff(), &Backoff::default());
        assert_eq!(policy.concurrency(), 1);
        assert!(!policy.skip_same_error_check());
        assert!(!policy.wait_if_not_consumed());
        assert!(policy.cancellation().is_none());
    }

    #[test]
    fn test_empty_options_match_default() {
        let policy = RetryPolicy::from_options(&RetryOptions::default()).unwrap();
        assert_eq!(policy.tries(), Some(5));
        assert_eq!(policy.backoff().wait_min_ms, 1000.0);
        assert!(policy.backoff().wait_max_ms.is_infinite());
    }

    #[test]
    fn test_validate_skips_unset() {
        assert!(validate_numeric_option("factor", None, NumericBounds::default()).is_ok());
    }

    #[test]
    fn test_validate_nan_is_type_mismatch() {
        let err = validate_numeric_option("factor", Some(f64::NAN), NumericBounds::default())
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(err.to_string(), "'factor' should be a number");
    }

    #[test]
    fn test_validate_below_min_is_range_error() {
        let err =
            validate_numeric_option("wait-min-ms", Some(-1.0), NumericBounds::default()).unwrap_err();
        assert!(err.is_range_error());
        assert_eq!(err.to_string(), "'wait-min-ms' should be >= 0");
    }

    #[test]
    fn test_validate_finiteness() {
        let err = validate_numeric_option("factor", Some(f64::INFINITY), NumericBounds::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFinite { name: "factor" }));

        let unbounded = NumericBounds {
            finite: false,
            ..NumericBounds::default()
        };
        assert!(validate_numeric_option("wait-max-ms", Some(f64::INFINITY), unbounded).is_ok());
        assert!(validate_numeric_option("wait-max-ms", Some(f64::NEG_INFINITY), unbounded).is_err());
    }

    #[test]
    fn test_options_validation_table() {
        let cases = [
            (RetryOptions { tries: Some(0.0), ..Default::default() }, false),
            (RetryOptions { tries: Some(1.5), ..Default::default() }, false),
            (RetryOptions { tries: Some(f64::INFINITY), ..Default::default() }, true),
            (RetryOptions { time_max_ms: Some(f64::INFINITY), ..Default::default() }, true),
            (RetryOptions { time_max_ms: Some(-5.0), ..Default::default() }, false),
            (RetryOptions { wait_min_ms: Some(f64::INFINITY), ..Default::default() }, false),
            (RetryOptions { factor: Some(0.0), ..Default::default() }, true),
            (RetryOptions { concurrency: Some(0.0), ..Default::default() }, false),
            (RetryOptions { concurrency: Some(f64::INFINITY), ..Default::default() }, false),
            (RetryOptions { concurrency: Some(4.0), ..Default::default() }, true),
            (RetryOptions { concurrency: Some(65_535.0), ..Default::default() }, true),
            (RetryOptions { concurrency: Some(65_536.0), ..Default::default() }, false),
            (RetryOptions { concurrency: Some(1e15), ..Default::default() }, false),
        ];

        for (options, valid) in cases {
            assert_eq!(options.validate().is_ok(), valid, "{options:?}");
        }
    }

    #[test]
    fn test_unbounded_budgets() {
        let policy = RetryPolicy::from_options(&RetryOptions {
            tries: Some(f64::INFINITY),
            time_max_ms: Some(f64::INFINITY),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(policy.tries(), None);
        assert_eq!(policy.time_max(), None);
    }

    #[test]
    fn test_merged_over() {
        let base = RetryOptions {
            tries: Some(3.0),
            factor: Some(2.0),
            ..Default::default()
        };
        let overlay = RetryOptions {
            tries: Some(7.0),
            random: Some(true),
            ..Default::default()
        };

        let merged = overlay.merged_over(&base);
        assert_eq!(merged.tries, Some(7.0));
        assert_eq!(merged.factor, Some(2.0));
        assert_eq!(merged.random, Some(true));
    }

    #[test]
    fn test_builder() {
        let policy = RetryPolicy::builder()
            .tries(3)
            .time_max(Duration::from_secs(10))
            .wait_min(Duration::from_millis(100))
            .wait_max(Duration::from_secs(2))
            .factor(2.0)
            .linear(true)
            .random(true)
            .concurrency(2)
            .skip_same_error_check(true)
            .wait_if_not_consumed(true)
            .build()
            .unwrap();

        assert_eq!(policy.tries(), Some(3));
        assert_eq!(policy.time_max(), Some(Duration::from_secs(10)));
        assert_eq!(policy.backoff().wait_min_ms, 100.0);
        assert_eq!(policy.backoff().wait_max_ms, 2000.0);
        assert!(policy.backoff().linear);
        assert!(policy.backoff().random);
        assert_eq!(policy.concurrency(), 2);
        assert!(policy.skip_same_error_check());
        assert!(policy.wait_if_not_consumed());
    }

    #[test]
    fn test_builder_rejects_invalid() {
        let err = RetryPolicy::builder().factor(f64::NAN).build().unwrap_err();
        assert!(err.is_type_mismatch());

        let err = RetryPolicy::builder().concurrency(0).build().unwrap_err();
        assert!(err.is_range_error());

        let err = RetryPolicy::builder().concurrency(100_000).build().unwrap_err();
        assert!(matches!(err, Error::TooLarge { name: "concurrency", .. }));
    }

    #[test]
    fn test_builder_unbounded_tries() {
        let policy = RetryPolicy::builder().unbounded_tries().build().unwrap();
        assert_eq!(policy.tries(), None);
    }

    #[test]
    fn test_builder_options_overlay() {
        let options = RetryOptions {
            tries: Some(9.0),
            ..Default::default()
        };
        let policy = RetryPolicy::builder()
            .tries(2)
            .factor(3.0)
            .options(&options)
            .build()
            .unwrap();

        assert_eq!(policy.tries(), Some(9));
        assert_eq!(policy.backoff().factor, 3.0);
    }

    #[test]
    fn test_options_deserialize_kebab_case() {
        let yaml = "tries: 3\nwait-min-ms: 250\nwait-max-ms: .inf\nskip-same-error-check: true\n";
        let options: RetryOptions = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(options.tries, Some(3.0));
        assert_eq!(options.wait_min_ms, Some(250.0));
        assert_eq!(options.wait_max_ms, Some(f64::INFINITY));
        assert_eq!(options.skip_same_error_check, Some(true));
        assert_eq!(options.factor, None);
    }

    #[test]
    fn test_with_cancellation() {
        let token = CancelToken::new();
        let policy = RetryPolicy::default().with_cancellation(token.clone());

        token.cancel();
        assert!(policy.cancellation().unwrap().is_cancelled());
    }
}
