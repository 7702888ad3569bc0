#![forbid(unsafe_code)]

use crate::correlation::CorrelationEngine;
use crate::domain::{CoreId, EventKind};
use crate::error::Error;
use crate::ring::HandoffRing;
use crate::sampling::{SampleBuffer, SamplingHardware};
use crate::stats::CoreStats;
use config::Config;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resolves which process was running on a core when its samples were
/// taken. Register I/O aside, this is the only host-specific input the
/// engine needs per pass.
pub trait PidSource: Send + Sync {
    fn pid_on_core(&self, core: CoreId) -> Option<u32>;
}

/// Attributes every core's samples to the current process. Suitable
/// for self-profiling setups where the workload under observation is
/// this process itself.
#[derive(Debug, Default)]
pub struct SelfPidSource;

impl PidSource for SelfPidSource {
    fn pid_on_core(&self, _core: CoreId) -> Option<u32> {
        Some(std::process::id())
    }
}

pub struct Services {
    pub hardware: Box<dyn SamplingHardware>,
    pub pids: Box<dyn PidSource>,
}

pub enum ControlEvent {
    DumpStatus,
}

/// Result of one scan pass on a single core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Scanned { records: u64, findings: u64 },
    /// The previous pass on this core was still running.
    Skipped,
}

/// Aggregate of one engine tick across every enabled core.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub scanned_cores: u64,
    pub skipped_cores: u64,
    pub records: u64,
    pub findings: u64,
}

struct CoreState {
    buffer: Option<SampleBuffer>,
    ring: Arc<HandoffRing>,
    scanning: AtomicBool,
    stats: CoreStats,
    enabled: bool,
}

pub struct DetectorEngine {
    config: Config,
    services: Services,
    correlation: CorrelationEngine,
    cores: Vec<CoreState>,
}

impl DetectorEngine {
    /// Build one state per monitored core: a sample buffer, a handoff
    /// ring, and programmed counters. A core whose buffer cannot be
    /// allocated or whose counters cannot be programmed is disabled
    /// and the rest keep running.
    pub fn new(config: Config, mut services: Services) -> Result<Self, Error> {
        config.validate()?;

        let core_count = config.sampling.cores.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        });

        let mut cores = Vec::with_capacity(core_count);
        for core in 0..core_count {
            let buffer = match SampleBuffer::allocate(
                core,
                config.sampling.buffer_bytes,
                config.sampling.period,
            ) {
                Ok(buffer) => buffer,
                Err(err) => {
                    warn!(core, %err, "disabling core");
                    cores.push(CoreState {
                        buffer: None,
                        ring: Arc::new(HandoffRing::new(config.inspector.ring_capacity)),
                        scanning: AtomicBool::new(false),
                        stats: CoreStats::default(),
                        enabled: false,
                    });
                    continue;
                }
            };

            let mut enabled = true;
            if config.sampling.dosample
                && let Err(err) = services.hardware.program(core, &buffer.descriptor())
            {
                warn!(core, %err, "counter programming failed, disabling core");
                enabled = false;
            }

            cores.push(CoreState {
                buffer: Some(buffer),
                ring: Arc::new(HandoffRing::new(config.inspector.ring_capacity)),
                scanning: AtomicBool::new(false),
                stats: CoreStats::default(),
                enabled,
            });
        }

        let correlation = CorrelationEngine::new(&config.correlation);
        Ok(Self {
            config,
            services,
            correlation,
            cores,
        })
    }

    /// Append one sample to a core's buffer, the same record the
    /// hardware would have written. This is the replay path used by
    /// tests and by setups running with sampling disabled.
    pub fn inject_sample(
        &mut self,
        core: CoreId,
        kind: EventKind,
        address: u64,
        timestamp: u64,
    ) -> Result<bool, Error> {
        let state = self.cores.get_mut(core).ok_or(Error::CoreDisabled(core))?;
        let Some(buffer) = state.buffer.as_mut() else {
            return Err(Error::CoreDisabled(core));
        };
        Ok(buffer.record_sample(kind, address, timestamp))
    }

    /// Scan one core's buffer, queue any findings on its ring, then
    /// drain the buffer and re-arm the counters. A pass that arrives
    /// while the previous one is still in flight is dropped, the way
    /// an interrupt handler drops a nested overflow.
    pub fn on_sample(&mut self, core: CoreId, pid: u32) -> Result<ScanOutcome, Error> {
        let state = self.cores.get_mut(core).ok_or(Error::CoreDisabled(core))?;
        if !state.enabled {
            return Err(Error::CoreDisabled(core));
        }
        let Some(buffer) = state.buffer.as_mut() else {
            return Err(Error::CoreDisabled(core));
        };

        if state
            .scanning
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            state.stats.record_skip();
            return Ok(ScanOutcome::Skipped);
        }

        let start = Instant::now();
        let records = buffer.len() as u64;
        let findings = self.correlation.scan(buffer, pid);
        for finding in &findings {
            state.ring.push(*finding);
        }
        buffer.drain();
        self.services.hardware.rearm(core);

        let found = findings.len() as u64;
        state.stats.record_pass(records, found, start.elapsed());
        state.scanning.store(false, Ordering::Release);

        debug!(core, pid, records, findings = found, "scan pass");
        Ok(ScanOutcome::Scanned {
            records,
            findings: found,
        })
    }

    /// Run one scan pass over every enabled core that has pending
    /// samples and a resolvable pid.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        for core in 0..self.cores.len() {
            let state = &self.cores[core];
            if !state.enabled || state.buffer.as_ref().is_none_or(SampleBuffer::is_empty) {
                continue;
            }
            let Some(pid) = self.services.pids.pid_on_core(core) else {
                continue;
            };
            match self.on_sample(core, pid) {
                Ok(ScanOutcome::Scanned { records, findings }) => {
                    report.scanned_cores += 1;
                    report.records += records;
                    report.findings += findings;
                }
                Ok(ScanOutcome::Skipped) => report.skipped_cores += 1,
                Err(err) => warn!(core, %err, "scan pass failed"),
            }
        }
        report
    }

    /// Poll the buffers on the configured interval until the token is
    /// cancelled. Control events are served between ticks.
    pub async fn run_until(
        &mut self,
        cancel: CancellationToken,
        mut control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    ) -> Result<(), Error> {
        let mut interval = tokio::time::interval(self.config.sampling.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                Some(event) = control_rx.recv() => {
                    match event {
                        ControlEvent::DumpStatus => self.dump_status(),
                    }
                }
                _ = interval.tick() => {
                    if self.config.sampling.dosample {
                        let report = self.tick();
                        if report.findings > 0 {
                            debug!(?report, "tick");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Stop sampling, print per-core statistics, and hand the buffers
    /// back. The engine cannot scan after this.
    pub fn shutdown(&mut self) {
        for (core, state) in self.cores.iter_mut().enumerate() {
            if state.buffer.is_none() {
                continue;
            }
            if state.enabled && self.config.sampling.dosample {
                self.services.hardware.quiesce(core);
                self.services.hardware.restore(core);
            }
            let stats = state.stats;
            info!(
                core,
                passes = stats.passes,
                skipped = stats.skipped_passes,
                records = stats.records_total,
                records_min = stats.records_min,
                records_max = stats.records_max,
                records_mean = stats.mean_records(),
                findings = stats.findings_total,
                cost_ns_min = stats.cost_ns_min,
                cost_ns_max = stats.cost_ns_max,
                cost_ns_mean = stats.mean_cost_ns(),
                overflow = state.ring.overflow_count(),
                "core statistics"
            );
            if let Some(buffer) = state.buffer.take() {
                buffer.release();
            }
            state.enabled = false;
        }
    }

    /// One ring per core, shared with the inspector.
    pub fn rings(&self) -> Vec<Arc<HandoffRing>> {
        self.cores.iter().map(|state| Arc::clone(&state.ring)).collect()
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    pub fn is_enabled(&self, core: CoreId) -> bool {
        self.cores.get(core).is_some_and(|state| state.enabled)
    }

    pub fn stats(&self, core: CoreId) -> Option<&CoreStats> {
        self.cores.get(core).map(|state| &state.stats)
    }

    fn dump_status(&self) {
        info!(?self.config, "current config");
        for (core, state) in self.cores.iter().enumerate() {
            info!(
                core,
                enabled = state.enabled,
                passes = state.stats.passes,
                skipped = state.stats.skipped_passes,
                records = state.stats.records_total,
                findings = state.stats.findings_total,
                backlog = state.ring.backlog(),
                overflow = state.ring.overflow_count(),
                "core status"
            );
        }
    }
}
