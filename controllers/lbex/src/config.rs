//! Controller configuration.
//!
//! Built once in `main` and handed to every component. Values come from an
//! optional YAML file (`LBEX_CONFIG`) with environment variables layered on
//! top.

use crate::error::ControllerError;
use resources::NodeComparison;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use workqueue::ExponentialBackoff;

/// How the dispatcher maps a queued key to a cached object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyResolution {
    /// Route by the key's kind tag
    #[default]
    KindScoped,
    /// Probe the service cache, then endpoints, then nodes by local name,
    /// ignoring the kind tag. An endpoints object that shares its name with
    /// a service is never reached this way.
    ServiceFirst,
}

impl FromStr for KeyResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kind-scoped" => Ok(Self::KindScoped),
            "service-first" => Ok(Self::ServiceFirst),
            other => Err(format!(
                "unknown key resolution '{other}' (expected kind-scoped or service-first)"
            )),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Interval between full re-enqueues of every cached key (0 disables)
    pub resync_interval_secs: u64,
    /// Number of sync workers draining the queue
    pub workers: usize,
    /// First retry delay after a failed sync
    pub retry_base_delay_ms: u64,
    /// Distinct retry delays before the sequence flattens
    pub retry_max_steps: u32,
    pub retry_max_delay_secs: u64,
    /// First delay before re-opening a terminated watch
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_secs: u64,
    pub key_resolution: KeyResolution,
    pub node_comparison: NodeComparison,
    /// Restrict namespaced kinds to one namespace (`None` = all namespaces)
    pub namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: 30,
            workers: 1,
            retry_base_delay_ms: 1000,
            retry_max_steps: 5,
            retry_max_delay_secs: 300,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_secs: 30,
            key_resolution: KeyResolution::default(),
            node_comparison: NodeComparison::default(),
            namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Loads the configuration from `LBEX_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self, ControllerError> {
        let mut config = match std::env::var("LBEX_CONFIG") {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path)?;
                Self::from_yaml(&contents)?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ControllerError> {
        serde_yaml::from_str(contents)
            .map_err(|e| ControllerError::InvalidConfig(format!("config file: {e}")))
    }

    /// Applies environment-style overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, ControllerError>
        where
            T::Err: std::fmt::Display,
        {
            value.trim().parse().map_err(|e| {
                ControllerError::InvalidConfig(format!("{name}={value}: {e}"))
            })
        }

        if let Some(v) = lookup("LBEX_RESYNC_SECONDS") {
            self.resync_interval_secs = parse("LBEX_RESYNC_SECONDS", &v)?;
        }
        if let Some(v) = lookup("LBEX_WORKERS") {
            self.workers = parse("LBEX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("LBEX_RETRY_BASE_MS") {
            self.retry_base_delay_ms = parse("LBEX_RETRY_BASE_MS", &v)?;
        }
        if let Some(v) = lookup("LBEX_RETRY_MAX_STEPS") {
            self.retry_max_steps = parse("LBEX_RETRY_MAX_STEPS", &v)?;
        }
        if let Some(v) = lookup("LBEX_RETRY_MAX_DELAY_SECONDS") {
            self.retry_max_delay_secs = parse("LBEX_RETRY_MAX_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = lookup("LBEX_RECONNECT_BASE_MS") {
            self.reconnect_base_delay_ms = parse("LBEX_RECONNECT_BASE_MS", &v)?;
        }
        if let Some(v) = lookup("LBEX_RECONNECT_MAX_SECONDS") {
            self.reconnect_max_delay_secs = parse("LBEX_RECONNECT_MAX_SECONDS", &v)?;
        }
        if let Some(v) = lookup("LBEX_KEY_RESOLUTION") {
            self.key_resolution = parse("LBEX_KEY_RESOLUTION", &v)?;
        }
        if let Some(v) = lookup("LBEX_NODE_COMPARISON") {
            self.node_comparison = parse("LBEX_NODE_COMPARISON", &v)?;
        }
        if let Some(ns) = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()) {
            self.namespace = Some(ns);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "at least one sync worker is required".to_string(),
            ));
        }
        if self.retry_max_steps == 0 {
            return Err(ControllerError::InvalidConfig(
                "retry max steps must be at least 1".to_string(),
            ));
        }
        if self.retry_base_delay_ms == 0 || self.reconnect_base_delay_ms == 0 {
            return Err(ControllerError::InvalidConfig(
                "base delays must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Backoff applied to keys whose sync failed.
    pub fn retry_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_secs(self.retry_max_delay_secs),
        )
        .with_max_steps(self.retry_max_steps)
    }

    /// Backoff applied between watch reconnects.
    pub fn reconnect_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_secs(self.reconnect_max_delay_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.resync_interval(), Duration::from_secs(30));
        assert_eq!(config.workers, 1);
        assert_eq!(config.key_resolution, KeyResolution::KindScoped);
        assert_eq!(config.node_comparison, NodeComparison::RelevantFields);
        assert!(config.validate().is_ok());

        let retry = config.retry_backoff();
        assert_eq!(retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for(5), retry.delay_for(4));
    }

    #[test]
    fn test_yaml_overrides_selected_fields() {
        let config = ControllerConfig::from_yaml(
            "resyncIntervalSecs: 10\nworkers: 4\nkeyResolution: service-first\nnodeComparison: full\n",
        )
        .unwrap();
        assert_eq!(config.resync_interval_secs, 10);
        assert_eq!(config.workers, 4);
        assert_eq!(config.key_resolution, KeyResolution::ServiceFirst);
        assert_eq!(config.node_comparison, NodeComparison::Full);
        // untouched fields keep defaults
        assert_eq!(config.retry_base_delay_ms, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LBEX_RESYNC_SECONDS", "45"),
            ("LBEX_RETRY_MAX_STEPS", "3"),
            ("LBEX_KEY_RESOLUTION", "service-first"),
            ("WATCH_NAMESPACE", "edge"),
        ]);
        let mut config = ControllerConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.resync_interval_secs, 45);
        assert_eq!(config.retry_max_steps, 3);
        assert_eq!(config.key_resolution, KeyResolution::ServiceFirst);
        assert_eq!(config.namespace.as_deref(), Some("edge"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = ControllerConfig::default();
        let err = config
            .apply_overrides(|name| (name == "LBEX_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("LBEX_WORKERS")));
    }

    #[test]
    fn test_zero_workers_fails_validation() {
        let config = ControllerConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
