#![forbid(unsafe_code)]

use std::time::Duration;

/// Per-core scan counters, accumulated across the engine's lifetime and
/// printed on shutdown or on a status dump.
///
/// Minima start at zero and are treated as unset until the first pass
/// lands, so a core that never saw a sample reports all zeros.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreStats {
    pub passes: u64,
    pub skipped_passes: u64,
    pub records_total: u64,
    pub records_min: u64,
    pub records_max: u64,
    pub findings_total: u64,
    pub findings_min: u64,
    pub findings_max: u64,
    pub cost_ns_total: u64,
    pub cost_ns_min: u64,
    pub cost_ns_max: u64,
}

impl CoreStats {
    /// Folds one completed scan pass into the running totals.
    pub fn record_pass(&mut self, records: u64, findings: u64, elapsed: Duration) {
        let cost_ns = elapsed.as_nanos().min(u128::from(u64::MAX)) as u64;

        self.passes += 1;
        self.records_total += records;
        self.findings_total += findings;
        self.cost_ns_total += cost_ns;

        if self.passes == 1 {
            self.records_min = records;
            self.findings_min = findings;
            self.cost_ns_min = cost_ns;
        } else {
            self.records_min = self.records_min.min(records);
            self.findings_min = self.findings_min.min(findings);
            self.cost_ns_min = self.cost_ns_min.min(cost_ns);
        }
        self.records_max = self.records_max.max(records);
        self.findings_max = self.findings_max.max(findings);
        self.cost_ns_max = self.cost_ns_max.max(cost_ns);
    }

    /// A pass that was dropped because the previous one was still running.
    pub fn record_skip(&mut self) {
        self.skipped_passes += 1;
    }

    pub fn mean_records(&self) -> u64 {
        if self.passes == 0 {
            0
        } else {
            self.records_total / self.passes
        }
    }

    pub fn mean_cost_ns(&self) -> u64 {
        if self.passes == 0 {
            0
        } else {
            self.cost_ns_total / self.passes
        }
    }
}
