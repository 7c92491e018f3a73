//! Serializable engine configuration.
//!
//! Durations are whole milliseconds so config files stay readable:
//!
//! ```json
//! {
//!   "retry": {
//!     "max_attempts": 3,
//!     "backoff": { "kind": "exponential", "base_ms": 200, "factor": 2.0, "max_ms": 5000 },
//!     "jitter": "full",
//!     "retry_on": ["transient"]
//!   },
//!   "wait": { "timeout_ms": 10000, "poll_interval_ms": 250 }
//! }
//! ```
//!
//! Every section has defaults matching the builders, and every conversion goes through the same
//! validation as the builders.

use crate::error::BuildError;
use crate::poller::{
    ConditionPoller, ConditionPollerBuilder, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT,
};
use crate::retry::{RetryPolicy, RetryPolicyBuilder};
use crate::taxonomy::{Classification, ClassificationSet};
use crate::{Backoff, Jitter};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Top-level configuration: one retry policy plus the default readiness wait.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub wait: WaitConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, BuildError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BuildError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section without building anything that needs a runtime.
    pub fn validate(&self) -> Result<(), BuildError> {
        self.retry.to_policy_builder()?.build()?;
        self.wait.to_builder::<()>().build()?;
        Ok(())
    }
}

/// Mirrors [`RetryPolicyBuilder`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub backoff: BackoffConfig,
    pub jitter: JitterConfig,
    pub retry_on: Vec<Classification>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            jitter: JitterConfig::None,
            retry_on: vec![Classification::Transient],
        }
    }
}

impl RetryConfig {
    /// A builder preloaded with this config, for callers that still need to set a sleeper.
    pub fn to_policy_builder(&self) -> Result<RetryPolicyBuilder, BuildError> {
        Ok(RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .backoff(self.backoff.to_backoff()?)
            .with_jitter(self.jitter.into())
            .retryable(self.retry_on.iter().copied().collect::<ClassificationSet>()))
    }

    pub fn to_policy(&self) -> Result<RetryPolicy, BuildError> {
        self.to_policy_builder()?.build()
    }
}

/// Backoff schedule. `max_ms` is only accepted for linear and exponential schedules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum BackoffConfig {
    Fixed {
        delay_ms: u64,
    },
    Linear {
        base_ms: u64,
        #[serde(default)]
        max_ms: Option<u64>,
    },
    Exponential {
        base_ms: u64,
        #[serde(default = "default_factor")]
        factor: f64,
        #[serde(default)]
        max_ms: Option<u64>,
    },
}

fn default_factor() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential { base_ms: 100, factor: default_factor(), max_ms: None }
    }
}

impl BackoffConfig {
    pub fn to_backoff(&self) -> Result<Backoff, BuildError> {
        let backoff = match *self {
            BackoffConfig::Fixed { delay_ms } => Backoff::fixed(millis(delay_ms)),
            BackoffConfig::Linear { base_ms, max_ms } => {
                let backoff = Backoff::linear(millis(base_ms));
                match max_ms {
                    Some(max) => backoff.with_max(millis(max))?,
                    None => backoff,
                }
            }
            BackoffConfig::Exponential { base_ms, factor, max_ms } => {
                let backoff = Backoff::exponential(millis(base_ms)).with_factor(factor)?;
                match max_ms {
                    Some(max) => backoff.with_max(millis(max))?,
                    None => backoff,
                }
            }
        };
        Ok(backoff)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterConfig {
    #[default]
    None,
    Full,
    Equal,
}

impl From<JitterConfig> for Jitter {
    fn from(value: JitterConfig) -> Self {
        match value {
            JitterConfig::None => Jitter::None,
            JitterConfig::Full => Jitter::Full,
            JitterConfig::Equal => Jitter::Equal,
        }
    }
}

/// Mirrors [`ConditionPollerBuilder`] minus the error filter, which is code, not data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            poll_interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl WaitConfig {
    /// A builder preloaded with this config; add `ignoring` or a sleeper before building.
    pub fn to_builder<E>(&self) -> ConditionPollerBuilder<E> {
        ConditionPoller::builder()
            .timeout(millis(self.timeout_ms))
            .poll_interval(millis(self.poll_interval_ms))
    }

    pub fn to_poller<E>(&self) -> Result<ConditionPoller<E>, BuildError> {
        self.to_builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffError;

    #[test]
    fn empty_document_uses_builder_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("defaults are valid");
        assert_eq!(config, EngineConfig::default());

        let policy = config.retry.to_policy().unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), &Backoff::default());
        assert!(policy.permits(Classification::Transient));

        let poller = config.wait.to_poller::<()>().unwrap();
        assert_eq!(poller.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(poller.poll_interval(), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn full_document_round_trips_into_policy() {
        let json = r#"{
            "retry": {
                "max_attempts": 5,
                "backoff": { "kind": "exponential", "base_ms": 200, "factor": 3.0, "max_ms": 1000 },
                "jitter": "equal",
                "retry_on": ["transient", "unknown"]
            },
            "wait": { "timeout_ms": 2000, "poll_interval_ms": 50 }
        }"#;
        let config = EngineConfig::from_json_str(json).unwrap();
        let policy = config.retry.to_policy().unwrap();

        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.jitter(), Jitter::Equal);
        assert!(policy.permits(Classification::Unknown));
        assert_eq!(policy.backoff().delay(2), Duration::from_millis(600));
        assert_eq!(policy.backoff().delay(3), Duration::from_millis(1000));
        assert_eq!(config.wait.poll_interval_ms, 50);
    }

    #[test]
    fn linear_backoff_without_cap() {
        let backoff: BackoffConfig =
            serde_json::from_str(r#"{ "kind": "linear", "base_ms": 100 }"#).unwrap();
        assert_eq!(backoff.to_backoff().unwrap().delay(3), Duration::from_millis(300));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_attempts = r#"{ "retry": { "max_attempts": 0 } }"#;
        assert_eq!(
            EngineConfig::from_json_str(zero_attempts),
            Err(BuildError::InvalidMaxAttempts(0))
        );

        let zero_interval = r#"{ "wait": { "poll_interval_ms": 0 } }"#;
        assert_eq!(EngineConfig::from_json_str(zero_interval), Err(BuildError::ZeroPollInterval));

        let bad_factor = r#"{ "retry": { "backoff":
            { "kind": "exponential", "base_ms": 10, "factor": 0.5 } } }"#;
        assert_eq!(
            EngineConfig::from_json_str(bad_factor),
            Err(BuildError::Backoff(BackoffError::FactorBelowOne))
        );
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "retry": { "attempts": 3 } }"#),
            Err(BuildError::Config(_))
        ));
        assert!(matches!(EngineConfig::from_json_str("not json"), Err(BuildError::Config(_))));
    }

    #[test]
    fn unknown_backoff_fields_are_rejected() {
        let capped_fixed = r#"{ "retry": { "backoff":
            { "kind": "fixed", "delay_ms": 10, "max_ms": 100 } } }"#;
        assert!(matches!(EngineConfig::from_json_str(capped_fixed), Err(BuildError::Config(_))));

        let misspelled_cap = r#"{ "retry": { "backoff":
            { "kind": "exponential", "base_ms": 100, "max_msx": 500 } } }"#;
        assert!(matches!(EngineConfig::from_json_str(misspelled_cap), Err(BuildError::Config(_))));

        assert!(serde_json::from_str::<BackoffConfig>(
            r#"{ "kind": "fixed", "delay_ms": 10, "max_ms": 100 }"#
        )
        .is_err());
    }
}
