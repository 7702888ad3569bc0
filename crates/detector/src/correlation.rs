#![forbid(unsafe_code)]

use crate::domain::{EventKind, Finding};
use crate::sampling::SampleBuffer;
use config::Correlation;
use tracing::trace;

/// Backward scan pairing branch-miss records with earlier cache-miss
/// records that fall inside both the spatial and the temporal window.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationEngine {
    spatial_window: u64,
    temporal_window: u64,
}

impl CorrelationEngine {
    pub fn new(config: &Correlation) -> Self {
        Self {
            spatial_window: config.spatial_window_bytes,
            temporal_window: config.temporal_window_cycles,
        }
    }

    /// Scan the filled portion of `buffer` from the newest record
    /// toward the oldest and emit one finding per correlated pair, in
    /// discovery order. `pid` is the process executing when the
    /// sampling interrupt fired.
    ///
    /// The branch cursor seeks a qualifying branch-miss record; the
    /// cache cursor then walks further back looking for a qualifying
    /// cache-miss record within `spatial_window` bytes. The moment the
    /// timestamp gap exceeds `temporal_window` the branch record is
    /// abandoned, since the gap only grows with older records. On a
    /// match both cursors step past the pair.
    pub fn scan(&self, buffer: &SampleBuffer, pid: u32) -> Vec<Finding> {
        let mut findings = Vec::new();
        let filled = buffer.len();
        if filled < 2 {
            return findings;
        }

        let mut branch = (filled - 1) as isize;
        let mut cache = branch - 1;

        while branch > 0 && cache >= 0 {
            let b = buffer.record(branch as usize);
            if !b.matches(EventKind::BranchMiss) {
                branch -= 1;
                continue;
            }
            // only ever pair with strictly earlier records
            if cache >= branch {
                cache = branch - 1;
            }

            let mut paired = false;
            while cache >= 0 {
                let c = buffer.record(cache as usize);
                let in_window = b
                    .timestamp()
                    .checked_sub(c.timestamp())
                    .is_some_and(|gap| gap <= self.temporal_window);
                if !in_window {
                    break;
                }
                if !c.matches(EventKind::CacheMiss)
                    || b.address().abs_diff(c.address()) > self.spatial_window
                {
                    cache -= 1;
                    continue;
                }

                trace!(
                    pid,
                    cache_addr = format_args!("{:#x}", c.address()),
                    branch_addr = format_args!("{:#x}", b.address()),
                    gap = b.timestamp() - c.timestamp(),
                    "correlated pair"
                );
                findings.push(Finding::new(pid, c.address(), b.address()));
                paired = true;
                break;
            }

            branch -= 1;
            if paired {
                cache -= 1;
            } else {
                // abandoned: restart the cache cursor just before the
                // new branch cursor
                cache = branch - 1;
            }
        }

        findings
    }
}
