#![forbid(unsafe_code)]

use crate::inspect::{MemorySnapshotter, ProcessResolver, SnapshotSink};
use crate::ring::HandoffRing;
use config::Config;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one sweep across every core's ring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Findings popped off the rings.
    pub findings: usize,
    /// Dropped because the pid was gone or no longer running.
    pub stale: usize,
    /// Snapshot attempts that failed; logged and skipped.
    pub snapshot_failures: usize,
    /// Snapshots handed to the sink.
    pub delivered: usize,
}

/// Lifetime totals, exposed at shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct InspectorTotals {
    pub findings: u64,
    pub stale: u64,
    pub snapshot_failures: u64,
    pub delivered: u64,
}

/// Background consumer of the per-core handoff rings. One instance
/// system-wide; it is the single reader of every ring.
pub struct Inspector {
    rings: Vec<Arc<HandoffRing>>,
    resolver: Box<dyn ProcessResolver>,
    snapshotter: Box<dyn MemorySnapshotter>,
    sink: Box<dyn SnapshotSink>,
    idle_delay: Duration,
    max_backoff: u32,
    totals: InspectorTotals,
}

impl Inspector {
    pub fn new(
        config: &Config,
        rings: Vec<Arc<HandoffRing>>,
        resolver: Box<dyn ProcessResolver>,
        snapshotter: Box<dyn MemorySnapshotter>,
        sink: Box<dyn SnapshotSink>,
    ) -> Self {
        Self {
            rings,
            resolver,
            snapshotter,
            sink,
            idle_delay: config.inspector.idle_delay,
            max_backoff: config.inspector.max_backoff,
            totals: InspectorTotals::default(),
        }
    }

    /// Drain every ring until empty, resolving and snapshotting as we
    /// go. Pids already found dead in this sweep are skipped without
    /// another process-table lookup.
    pub async fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut dead: FxHashSet<u32> = FxHashSet::default();

        for (core, ring) in self.rings.iter().enumerate() {
            while let Some(finding) = ring.pop() {
                report.findings += 1;

                if dead.contains(&finding.pid) {
                    report.stale += 1;
                    continue;
                }
                let Some(handle) = self.resolver.resolve(finding.pid) else {
                    debug!(core, pid = finding.pid, "pid gone before inspection");
                    dead.insert(finding.pid);
                    report.stale += 1;
                    continue;
                };
                if !self.resolver.is_alive(&handle) {
                    debug!(core, pid = finding.pid, "process no longer running");
                    dead.insert(finding.pid);
                    report.stale += 1;
                    continue;
                }

                let lo = finding.range_start.min(finding.range_end);
                let hi = finding.range_start.max(finding.range_end);
                match self.snapshotter.snapshot(&handle, lo, hi) {
                    Ok(bytes) => {
                        self.sink.deliver(&finding, bytes).await;
                        report.delivered += 1;
                    }
                    Err(err) => {
                        warn!(core, pid = finding.pid, %err, "snapshot failed");
                        report.snapshot_failures += 1;
                    }
                }
            }
        }

        self.totals.findings += report.findings as u64;
        self.totals.stale += report.stale as u64;
        self.totals.snapshot_failures += report.snapshot_failures as u64;
        self.totals.delivered += report.delivered as u64;
        report
    }

    /// Sweep until cancelled. Idle sweeps back off with a linearly
    /// growing delay capped at `max_backoff * idle_delay`; any
    /// discovery resets the backoff to zero.
    pub async fn run_until(&mut self, cancel: CancellationToken) {
        let mut backoff = 0u32;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let report = self.sweep().await;
            if report.findings == 0 {
                if backoff < self.max_backoff {
                    backoff += 1;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_delay * backoff) => {}
                }
            } else {
                backoff = 0;
            }
        }

        info!(
            findings = self.totals.findings,
            stale = self.totals.stale,
            snapshot_failures = self.totals.snapshot_failures,
            delivered = self.totals.delivered,
            "inspector stopped"
        );
    }

    pub fn totals(&self) -> InspectorTotals {
        self.totals
    }
}
