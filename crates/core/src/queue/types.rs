//! Types for the queue manager.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four kinds of pending work drained every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkClass {
    /// Orders released by the vendor and not yet picked up.
    NewLoad,
    /// Orders whose load was interrupted.
    StalledLoad,
    /// Orders interrupted while rewriting files.
    StalledTransform,
    /// Orders interrupted while finalizing.
    StalledFinalize,
}

impl WorkClass {
    pub const ALL: [WorkClass; 4] = [
        WorkClass::NewLoad,
        WorkClass::StalledLoad,
        WorkClass::StalledTransform,
        WorkClass::StalledFinalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkClass::NewLoad => "new_load",
            WorkClass::StalledLoad => "stalled_load",
            WorkClass::StalledTransform => "stalled_transform",
            WorkClass::StalledFinalize => "stalled_finalize",
        }
    }
}

impl fmt::Display for WorkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of the queue manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Whether the cycle loop is running.
    pub running: bool,
    /// Handles currently registered.
    pub in_flight: usize,
    /// Highest number of handles registered at once.
    pub peak_in_flight: usize,
    /// Cycles completed since creation.
    pub cycles_completed: u64,
    /// Handles that reached completion after being registered.
    pub handles_completed: u64,
    /// Configured concurrency limit.
    pub max_concurrent: usize,
}
