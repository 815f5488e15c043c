//! Grid configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// How fulfiller identity is recorded on task registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillerIdentityKind {
    #[default]
    Participant,
    Component,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Upper bound of each participant's in-memory queue.
    pub max_queue_size: usize,
    /// Queue size above which entries become offload candidates.
    pub onload_threshold: usize,
    /// Number of entries demoted per offload pass.
    pub offload_batch: usize,
    pub maintenance_initial_delay_secs: u64,
    pub maintenance_interval_secs: u64,
    /// Registrations older than this are evicted by the sweep.
    pub eviction_threshold_secs: u64,
    pub persistence_timeout_ms: u64,
    /// Number of shards in the per-task lock table.
    pub lock_shards: usize,
    pub fulfiller_identity: FulfillerIdentityKind,
    /// Name this node uses as cache location on queue entries.
    pub node_name: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 500,
            onload_threshold: 400,
            offload_batch: 50,
            maintenance_initial_delay_secs: 60,
            maintenance_interval_secs: 10,
            eviction_threshold_secs: 120,
            persistence_timeout_ms: 2_000,
            lock_shards: 64,
            fulfiller_identity: FulfillerIdentityKind::default(),
            node_name: "grid-node".to_string(),
        }
    }
}

impl GridConfig {
    pub fn from_file(path: &Path) -> Result<Self, GridError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GridError::Config(format!("read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, GridError> {
        let config: GridConfig =
            toml::from_str(content).map_err(|e| GridError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.max_queue_size == 0 {
            return Err(GridError::Config("max_queue_size must be > 0".into()));
        }
        if self.onload_threshold > self.max_queue_size {
            return Err(GridError::Config(format!(
                "onload_threshold ({}) exceeds max_queue_size ({})",
                self.onload_threshold, self.max_queue_size
            )));
        }
        if self.lock_shards == 0 {
            return Err(GridError::Config("lock_shards must be > 0".into()));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(GridError::Config("maintenance_interval_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }

    pub fn maintenance_initial_delay(&self) -> Duration {
        Duration::from_secs(self.maintenance_initial_delay_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn eviction_threshold(&self) -> Duration {
        Duration::from_secs(self.eviction_threshold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reasonable() {
        let c = GridConfig::default();
        assert_eq!(c.max_queue_size, 500);
        assert_eq!(c.eviction_threshold_secs, 120);
        assert_eq!(c.maintenance_interval(), Duration::from_secs(10));
        assert_eq!(c.maintenance_initial_delay(), Duration::from_secs(60));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let c = GridConfig::parse(
            r#"
            max_queue_size = 10
            onload_threshold = 8
            fulfiller_identity = "component"
            "#,
        )
        .unwrap();
        assert_eq!(c.max_queue_size, 10);
        assert_eq!(c.fulfiller_identity, FulfillerIdentityKind::Component);
        assert_eq!(c.lock_shards, 64);
    }

    #[test]
    fn threshold_above_max_is_rejected() {
        let err = GridConfig::parse("max_queue_size = 5\nonload_threshold = 6").unwrap_err();
        assert!(matches!(err, GridError::Config(_)));
    }
}
