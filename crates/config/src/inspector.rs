#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Inspector {
    /// Number of finding slots per core on the handoff ring. Must be a
    /// power of two; index wraparound is a bitmask, not a division.
    pub ring_capacity: usize,

    /// Base idle delay between sweeps when no findings turn up.
    /// **Measured in milliseconds.** The actual sleep grows linearly
    /// with consecutive idle sweeps, up to `max_backoff` times this.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub idle_delay: Duration,

    /// Cap on the idle-delay multiplier. Any discovery resets the
    /// multiplier to zero.
    pub max_backoff: u32,

    /// Whether the background inspector should run. With this off,
    /// findings accumulate on the rings and the oldest are eventually
    /// overwritten.
    pub doinspect: bool,
}

impl Default for Inspector {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            idle_delay: Duration::from_millis(1),
            max_backoff: 10,
            doinspect: true,
        }
    }
}
