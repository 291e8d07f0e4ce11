//! Queue manager configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the cycle scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum handles in flight across all work classes.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Time between cycle starts (milliseconds).
    /// A cycle that runs longer is followed immediately by the next one.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    60_000 // 1 minute
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}
