use ledgerlink_common::types::Hash;
use serde::{Deserialize, Serialize};

/// Consensus engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Upper bound on unresolved orphans kept in the store
    #[serde(default = "default_max_orphans")]
    pub max_orphans: usize,

    /// Buffered branch-change events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// When set, only this block may become genesis
    #[serde(default)]
    pub genesis_hash: Option<Hash>,

    /// How far ahead of local time a block timestamp may be (seconds)
    #[serde(default = "default_max_future_drift_secs")]
    pub max_future_drift_secs: i64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_orphans: default_max_orphans(),
            event_capacity: default_event_capacity(),
            genesis_hash: None,
            max_future_drift_secs: default_max_future_drift_secs(),
        }
    }
}

fn default_max_orphans() -> usize { 1024 }
fn default_event_capacity() -> usize { 256 }
fn default_max_future_drift_secs() -> i64 { 2 * 60 * 60 }
