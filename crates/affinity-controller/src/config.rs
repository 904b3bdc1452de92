//! Controller configuration
//!
//! Loaded from environment variables, or deserialized from a config document
//! with durations given in seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use affinity_common::{Error, DESIRED_STATE_REQUEUE_SECS, FIELD_MANAGER};

/// Maximum concurrent reconciles
pub const ENV_MAX_CONCURRENT_RECONCILES: &str = "AFFINITY_MAX_CONCURRENT_RECONCILES";
/// Desired-state requeue backoff in seconds
pub const ENV_REQUEUE_SECONDS: &str = "AFFINITY_REQUEUE_SECONDS";
/// Retry interval in seconds for passes that left failed module operations
pub const ENV_RETRY_SECONDS: &str = "AFFINITY_RETRY_SECONDS";
/// Namespace to watch; all namespaces when unset
pub const ENV_WATCH_NAMESPACE: &str = "AFFINITY_WATCH_NAMESPACE";

const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 10;
const DEFAULT_RETRY_SECS: u64 = 60;

/// Runtime settings for the affinity controller
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Upper bound on VSphereClusters reconciled at once
    pub max_concurrent_reconciles: u16,
    /// Backoff before retrying a pass whose desired state could not be loaded
    #[serde(with = "duration_secs")]
    pub desired_state_requeue: Duration,
    /// Delay before retrying a pass in which a module create or delete failed
    #[serde(with = "duration_secs")]
    pub retry_requeue: Duration,
    /// Restrict watches to one namespace
    pub watch_namespace: Option<String>,
    /// Field manager for patches
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            desired_state_requeue: Duration::from_secs(DESIRED_STATE_REQUEUE_SECS),
            retry_requeue: Duration::from_secs(DEFAULT_RETRY_SECS),
            watch_namespace: None,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_CONCURRENT_RECONCILES) {
            config.max_concurrent_reconciles = raw.trim().parse().map_err(|_| {
                Error::validation(format!(
                    "{} must be an integer between 1 and {}, got {:?}",
                    ENV_MAX_CONCURRENT_RECONCILES,
                    u16::MAX,
                    raw
                ))
            })?;
        }
        if let Some(secs) = seconds(&lookup, ENV_REQUEUE_SECONDS)? {
            config.desired_state_requeue = secs;
        }
        if let Some(secs) = seconds(&lookup, ENV_RETRY_SECONDS)? {
            config.retry_requeue = secs;
        }
        config.watch_namespace = lookup(ENV_WATCH_NAMESPACE)
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_concurrent_reconciles == 0 {
            return Err(Error::validation(
                "max concurrent reconciles must be at least 1",
            ));
        }
        if self.desired_state_requeue.is_zero() {
            return Err(Error::validation(
                "desired state requeue must be at least one second",
            ));
        }
        if self.retry_requeue.is_zero() {
            return Err(Error::validation("retry requeue must be at least one second"));
        }
        if self.field_manager.is_empty() {
            return Err(Error::validation("field manager cannot be empty"));
        }
        Ok(())
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, Error> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let secs: u64 = raw.trim().parse().map_err(|_| {
        Error::validation(format!(
            "{} must be a whole number of seconds, got {:?}",
            key, raw
        ))
    })?;
    Ok(Some(Duration::from_secs(secs)))
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.max_concurrent_reconciles, 10);
        assert_eq!(config.desired_state_requeue, Duration::from_secs(10));
        assert_eq!(config.retry_requeue, Duration::from_secs(60));
        assert_eq!(config.field_manager, "affinity-controller");
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn environment_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            (ENV_MAX_CONCURRENT_RECONCILES, "3"),
            (ENV_REQUEUE_SECONDS, "30"),
            (ENV_RETRY_SECONDS, "120"),
            (ENV_WATCH_NAMESPACE, "capv-system"),
        ]))
        .unwrap();
        assert_eq!(config.max_concurrent_reconciles, 3);
        assert_eq!(config.desired_state_requeue, Duration::from_secs(30));
        assert_eq!(config.retry_requeue, Duration::from_secs(120));
        assert_eq!(config.watch_namespace.as_deref(), Some("capv-system"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for vars in [
            [(ENV_MAX_CONCURRENT_RECONCILES, "0")],
            [(ENV_MAX_CONCURRENT_RECONCILES, "many")],
            [(ENV_MAX_CONCURRENT_RECONCILES, "70000")],
            [(ENV_REQUEUE_SECONDS, "-1")],
            [(ENV_REQUEUE_SECONDS, "0")],
            [(ENV_RETRY_SECONDS, "0")],
            [(ENV_RETRY_SECONDS, "soon")],
        ] {
            let err = ControllerConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "{vars:?}");
        }
    }

    #[test]
    fn blank_namespace_means_all_namespaces() {
        let config = ControllerConfig::from_lookup(lookup(&[(ENV_WATCH_NAMESPACE, "  ")])).unwrap();
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn deserializes_with_second_durations() {
        let config: ControllerConfig = serde_json::from_value(serde_json::json!({
            "maxConcurrentReconciles": 4,
            "desiredStateRequeue": 15
        }))
        .unwrap();
        assert_eq!(config.max_concurrent_reconciles, 4);
        assert_eq!(config.desired_state_requeue, Duration::from_secs(15));
        assert_eq!(config.field_manager, FIELD_MANAGER);
    }
}
