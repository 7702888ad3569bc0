#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Correlation {
    /// Maximum distance in bytes between a branch-miss address and a
    /// cache-miss address for the two records to count as a pair.
    pub spatial_window_bytes: u64,

    /// Maximum cycle-timestamp gap between the two records. Once the
    /// backward scan walks past this window the candidate branch-miss
    /// record is abandoned.
    pub temporal_window_cycles: u64,
}

impl Default for Correlation {
    fn default() -> Self {
        Self {
            spatial_window_bytes: 16,
            temporal_window_cycles: 300,
        }
    }
}
