//! Retry policy files
//!
//! A policy file holds a `default` block and per-operation overrides:
//!
//! ```yaml
//! default:
//!   tries: 5
//!   wait-min-ms: 1000
//! operations:
//!   download:
//!     tries: 3
//!     factor: 2
//!     wait-max-ms: 30000
//! ```
//!
//! An operation's fields are layered over the defaults, so an override only
//! needs the fields it changes.

use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::{RetryOptions, RetryPolicy, RetryPolicyBuilder};

/// Retry policy configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Options applied to every operation
    #[serde(default)]
    pub default: RetryOptions,

    /// Per-operation overrides
    #[serde(default)]
    pub operations: HashMap<String, RetryOptions>,
}

impl RetryPoliciesConfig {
    /// Load a policy file from disk
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.as_str())
            } else {
                Error::Io(e)
            }
        })?;

        let config = match path.extension() {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_yaml_str(&content)?,
        };

        tracing::debug!(
            path = %path,
            operations = config.operations.len(),
            "loaded retry policies"
        );
        Ok(config)
    }

    /// Parse a YAML policy document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON policy document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the defaults and every operation's merged options
    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for name in self.operations.keys() {
            self.operation_options(name).validate()?;
        }
        Ok(())
    }

    /// Effective options for an operation
    ///
    /// Unknown operations get the defaults.
    pub fn operation_options(&self, operation: &str) -> RetryOptions {
        match self.operations.get(operation) {
            Some(options) => options.merged_over(&self.default),
            None => self.default.clone(),
        }
    }

    /// Whether an override exists for the operation
    pub fn has_operation(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Builder preloaded with an operation's effective options
    ///
    /// Attach hooks, an observer or a cancellation token before building.
    pub fn policy_builder(&self, operation: &str) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new().options(&self.operation_options(operation))
    }

    /// Sealed policy for an operation
    pub fn policy(&self, operation: &str) -> Result<RetryPolicy> {
        RetryPolicy::from_options(&self.operation_options(operation))
    }

    /// Sealed policy for an operation that must have an override
    pub fn require_policy(&self, operation: &str) -> Result<RetryPolicy> {
        if !self.has_operation(operation) {
            return Err(Error::unknown_operation(operation));
        }
        self.policy(operation)
    }
}
