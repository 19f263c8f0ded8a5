//! Configuration for the decision point.
//!
//! Every recognised key has a default and a `VERDICT_`-prefixed
//! environment override, so deployments configure the daemon without a
//! file while tests construct configs directly.

#![warn(missing_docs, clippy::pedantic)]

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use verdict_primitives::Environment;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment override could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// The offending environment variable.
        key: String,
        /// The unparseable value.
        value: String,
    },

    /// A validated constraint does not hold.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Why validation failed.
        reason: String,
    },
}

/// Decision cache settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds.
    pub ttl_seconds: u64,
    /// Maximum number of cached decisions.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Returns the TTL as a [`Duration`].
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Governance validator alerting thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Namespace capacity percentage that raises a warning.
    pub warning_threshold_percent: u8,
    /// Namespace capacity percentage that raises a critical finding.
    pub critical_threshold_percent: u8,
    /// Maximum active policies tolerated per namespace.
    pub max_policies_per_namespace: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            warning_threshold_percent: 75,
            critical_threshold_percent: 90,
            max_policies_per_namespace: 200,
        }
    }
}

/// Record sink settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSinkConfig {
    /// Budget for one persistence attempt; on expiry the write degrades
    /// to a warning and the decision still flows back to the caller.
    pub timeout_ms: u64,
}

impl Default for RecordSinkConfig {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

impl RecordSinkConfig {
    /// Returns the timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Telemetry sink settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether spans and events are exported at all.
    pub enabled: bool,
    /// Export endpoint, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
        }
    }
}

/// Approval router settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalsConfig {
    /// UTC offset applied before business-hours auto-approval checks.
    pub utc_offset_hours: i8,
}

impl Default for ApprovalsConfig {
    fn default() -> Self {
        Self { utc_offset_hours: 0 }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment environment embedded in execution references.
    pub env: Environment,
    /// Decision cache settings.
    pub cache: CacheConfig,
    /// Governance thresholds.
    pub governance: GovernanceConfig,
    /// Record sink settings.
    pub record_sink: RecordSinkConfig,
    /// Telemetry settings.
    pub telemetry: TelemetryConfig,
    /// Approval router settings.
    pub approvals: ApprovalsConfig,
}

impl Config {
    /// Loads the defaults, then applies `VERDICT_*` environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when an override cannot be
    /// parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        override_parse(&mut config.env, "VERDICT_ENV")?;
        override_parse(&mut config.cache.ttl_seconds, "VERDICT_CACHE_TTL_SECONDS")?;
        override_parse(&mut config.cache.max_entries, "VERDICT_CACHE_MAX_ENTRIES")?;
        override_parse(
            &mut config.governance.warning_threshold_percent,
            "VERDICT_GOVERNANCE_WARNING_THRESHOLD_PERCENT",
        )?;
        override_parse(
            &mut config.governance.critical_threshold_percent,
            "VERDICT_GOVERNANCE_CRITICAL_THRESHOLD_PERCENT",
        )?;
        override_parse(
            &mut config.governance.max_policies_per_namespace,
            "VERDICT_GOVERNANCE_MAX_POLICIES_PER_NAMESPACE",
        )?;
        override_parse(
            &mut config.record_sink.timeout_ms,
            "VERDICT_RECORD_SINK_TIMEOUT_MS",
        )?;
        override_parse(&mut config.telemetry.enabled, "VERDICT_TELEMETRY_ENABLED")?;
        if let Ok(endpoint) = std::env::var("VERDICT_TELEMETRY_ENDPOINT") {
            if !endpoint.is_empty() {
                config.telemetry.endpoint = Some(endpoint);
            }
        }
        override_parse(
            &mut config.approvals.utc_offset_hours,
            "VERDICT_APPROVALS_UTC_OFFSET_HOURS",
        )?;

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a constraint does not hold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                reason: "cache.max_entries must be at least 1".into(),
            });
        }
        if self.governance.warning_threshold_percent > self.governance.critical_threshold_percent {
            return Err(ConfigError::Invalid {
                reason: "governance warning threshold exceeds the critical threshold".into(),
            });
        }
        if self.governance.critical_threshold_percent > 100 {
            return Err(ConfigError::Invalid {
                reason: "governance thresholds are percentages".into(),
            });
        }
        if self.approvals.utc_offset_hours.abs() > 14 {
            return Err(ConfigError::Invalid {
                reason: "approvals.utc_offset_hours must be within ±14".into(),
            });
        }
        Ok(())
    }
}

fn override_parse<T>(slot: &mut T, key: &str) -> Result<(), ConfigError>
where
    T: FromStr,
{
    if let Ok(raw) = std::env::var(key) {
        if raw.is_empty() {
            return Ok(());
        }
        *slot = raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_owned(),
            value: raw,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.record_sink.timeout(), Duration::from_millis(2_000));
    }

    #[test]
    fn threshold_ordering_is_enforced() {
        let mut config = Config::default();
        config.governance.warning_threshold_percent = 95;
        config.governance.critical_threshold_percent = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cache_capacity_is_rejected() {
        let mut config = Config::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn utc_offset_is_bounded() {
        let mut config = Config::default();
        config.approvals.utc_offset_hours = 15;
        assert!(config.validate().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
