#![forbid(unsafe_code)]

use async_trait::async_trait;
use config::Config;
use detector::{
    CoreId, DetectorEngine, EventKind, Finding, Inspector, MemorySnapshotter, NoopHardware,
    PidSource, ProcessHandle, ProcessResolver, ScanOutcome, Services, SnapshotError, SnapshotSink,
};
use std::sync::{Arc, Mutex};

struct FixedPid(u32);

impl PidSource for FixedPid {
    fn pid_on_core(&self, _core: CoreId) -> Option<u32> {
        Some(self.0)
    }
}

struct AlwaysAlive;

impl ProcessResolver for AlwaysAlive {
    fn resolve(&self, pid: u32) -> Option<ProcessHandle> {
        Some(ProcessHandle {
            pid,
            comm: "workload".into(),
        })
    }

    fn is_alive(&self, _handle: &ProcessHandle) -> bool {
        true
    }
}

struct MarkerSnapshotter;

impl MemorySnapshotter for MarkerSnapshotter {
    fn snapshot(
        &self,
        _process: &ProcessHandle,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, SnapshotError> {
        Ok(vec![0xAB; (end - start) as usize])
    }
}

#[derive(Clone, Default)]
struct CollectingSink {
    deliveries: Arc<Mutex<Vec<(Finding, Vec<u8>)>>>,
}

#[async_trait]
impl SnapshotSink for CollectingSink {
    async fn deliver(&self, finding: &Finding, bytes: Vec<u8>) {
        self.deliveries.lock().unwrap().push((*finding, bytes));
    }
}

fn build_engine(pid: u32) -> DetectorEngine {
    let mut config = Config::default();
    config.sampling.cores = Some(1);
    config.sampling.buffer_bytes = 4096;
    let services = Services {
        hardware: Box::new(NoopHardware),
        pids: Box::new(FixedPid(pid)),
    };
    DetectorEngine::new(config, services).expect("engine")
}

#[tokio::test]
async fn close_miss_pair_flows_from_samples_to_snapshot_delivery() {
    let mut engine = build_engine(77);

    // A cache miss and a branch miss 8 bytes and 150 cycles apart.
    engine
        .inject_sample(0, EventKind::CacheMiss, 0x1000, 100)
        .expect("inject");
    engine
        .inject_sample(0, EventKind::BranchMiss, 0x1008, 250)
        .expect("inject");

    let report = engine.tick();
    assert_eq!(report.findings, 1);

    let sink = CollectingSink::default();
    let deliveries = Arc::clone(&sink.deliveries);
    let mut inspector = Inspector::new(
        &Config::default(),
        engine.rings(),
        Box::new(AlwaysAlive),
        Box::new(MarkerSnapshotter),
        Box::new(sink),
    );

    let sweep = inspector.sweep().await;
    assert_eq!(sweep.findings, 1);
    assert_eq!(sweep.delivered, 1);

    let deliveries = deliveries.lock().unwrap();
    let (finding, bytes) = &deliveries[0];
    assert_eq!(finding.pid, 77);
    assert_eq!(finding.range_start, 0x1000);
    assert_eq!(finding.range_end, 0x1008);
    assert_eq!(bytes.len(), 8);
    assert!(bytes.iter().all(|byte| *byte == 0xAB));
}

#[tokio::test]
async fn distant_misses_never_reach_the_inspector() {
    let mut engine = build_engine(77);

    // 32 bytes apart: outside the spatial window.
    engine
        .inject_sample(0, EventKind::CacheMiss, 0x1000, 100)
        .expect("inject");
    engine
        .inject_sample(0, EventKind::BranchMiss, 0x1020, 150)
        .expect("inject");
    // 400 cycles apart: outside the temporal window.
    engine
        .inject_sample(0, EventKind::CacheMiss, 0x2000, 1000)
        .expect("inject");
    engine
        .inject_sample(0, EventKind::BranchMiss, 0x2004, 1400)
        .expect("inject");

    let outcome = engine.on_sample(0, 77).expect("scan");
    assert_eq!(
        outcome,
        ScanOutcome::Scanned {
            records: 4,
            findings: 0
        }
    );

    let sink = CollectingSink::default();
    let deliveries = Arc::clone(&sink.deliveries);
    let mut inspector = Inspector::new(
        &Config::default(),
        engine.rings(),
        Box::new(AlwaysAlive),
        Box::new(MarkerSnapshotter),
        Box::new(sink),
    );

    let sweep = inspector.sweep().await;
    assert_eq!(sweep.findings, 0);
    assert!(deliveries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn successive_passes_accumulate_findings_on_the_ring() {
    let mut engine = build_engine(5);

    for pass in 0..3u64 {
        let base = 0x4000 + pass * 0x100;
        engine
            .inject_sample(0, EventKind::CacheMiss, base, pass * 1000 + 10)
            .expect("inject");
        engine
            .inject_sample(0, EventKind::BranchMiss, base + 4, pass * 1000 + 20)
            .expect("inject");
        engine.tick();
    }

    let sink = CollectingSink::default();
    let deliveries = Arc::clone(&sink.deliveries);
    let mut inspector = Inspector::new(
        &Config::default(),
        engine.rings(),
        Box::new(AlwaysAlive),
        Box::new(MarkerSnapshotter),
        Box::new(sink),
    );

    let sweep = inspector.sweep().await;
    assert_eq!(sweep.findings, 3);
    assert_eq!(sweep.delivered, 3);

    let deliveries = deliveries.lock().unwrap();
    let starts: Vec<u64> = deliveries
        .iter()
        .map(|(finding, _)| finding.range_start)
        .collect();
    assert_eq!(starts, vec![0x4000, 0x4100, 0x4200]);
}
