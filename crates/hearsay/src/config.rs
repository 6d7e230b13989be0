//! Node configuration.
//!
//! Every field has a default, so a TOML file only names what it changes:
//!
//! ```toml
//! tree_depth = 12
//! sync_interval_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use hearsay_core::merkle::MAX_DEPTH;
use hearsay_store::LedgerConfig;
use hearsay_sync::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Configuration for a [`crate::Node`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Depth of every author's tree, root level included.
    pub tree_depth: usize,
    /// How long a built tree is reused before rebuilding.
    pub tree_cache_ttl_ms: u64,
    /// Pause between the end of one sync sweep and the start of the next.
    pub sync_interval_ms: u64,
    /// Pubsub topic for message gossip.
    pub gossip_topic: String,
    /// Events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
    /// Maximum requests for one (peer, author) sync branch.
    pub request_budget: usize,
    pub request_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            tree_depth: 15,
            tree_cache_ttl_ms: 60_000,
            sync_interval_ms: 15_000,
            gossip_topic: "hearsay/messages/v1".to_string(),
            event_capacity: 1024,
            request_budget: sync.request_budget,
            request_timeout_ms: sync.request_timeout.as_millis() as u64,
        }
    }
}

impl NodeConfig {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tree_depth == 0 || self.tree_depth > MAX_DEPTH {
            return Err(NodeError::Config(format!(
                "tree_depth must be in 1..={MAX_DEPTH}, got {}",
                self.tree_depth
            )));
        }
        if self.event_capacity == 0 {
            return Err(NodeError::Config("event_capacity must be positive".into()));
        }
        if self.gossip_topic.is_empty() {
            return Err(NodeError::Config("gossip_topic is empty".into()));
        }
        if self.request_budget == 0 {
            return Err(NodeError::Config("request_budget must be positive".into()));
        }
        Ok(())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            depth: self.tree_depth,
            cache_ttl: Duration::from_millis(self.tree_cache_ttl_ms),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            request_budget: self.request_budget,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml_str("tree_depth = 12\nsync_interval_ms = 500\n").unwrap();
        assert_eq!(config.tree_depth, 12);
        assert_eq!(config.sync_interval(), Duration::from_millis(500));
        assert_eq!(config.gossip_topic, NodeConfig::default().gossip_topic);
        assert_eq!(config.sync_config(), SyncConfig::default());
    }

    #[test]
    fn test_invalid_depth_rejected() {
        assert!(matches!(
            NodeConfig::from_toml_str("tree_depth = 0"),
            Err(NodeError::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("tree_depth = 99"),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            NodeConfig::from_toml_str("tree_depth = \"deep\""),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "gossip_topic = \"test/topic\"\n").unwrap();
        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.gossip_topic, "test/topic");
    }
}
