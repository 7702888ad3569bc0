#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Sampling {
    /// Size of each per-core sample buffer in bytes. The buffer holds
    /// `buffer_bytes / 64` fixed-width records; a 4 MiB buffer holds
    /// 65536 of them.
    pub buffer_bytes: usize,

    /// Counter reset period. Counters are armed to `-period`, so the
    /// hardware records one sample every `period` qualifying events.
    /// A period of 1 records every event (full-sample collection).
    pub period: u64,

    /// Number of cores to monitor. `None` means every core the host
    /// reports as available.
    pub cores: Option<usize>,

    /// How often the engine polls the per-core buffers for new
    /// samples between scan passes.
    #[serde_as(as = "DurationMilliSeconds")]
    pub poll_interval: Duration,

    /// Whether sampling passes should run at all. Turning this off
    /// leaves the engine idle; the inspector still drains whatever is
    /// already queued on the rings.
    pub dosample: bool,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            buffer_bytes: 4 * 1024 * 1024,
            period: 1,
            cores: None,
            poll_interval: Duration::from_millis(10),
            dosample: true,
        }
    }
}
