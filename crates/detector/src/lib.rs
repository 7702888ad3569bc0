#![forbid(unsafe_code)]

pub mod correlation;
pub mod domain;
pub mod engine;
pub mod error;
pub mod inspect;
pub mod ring;
pub mod sampling;
pub mod stats;

pub use engine::{
    ControlEvent, DetectorEngine, PidSource, ScanOutcome, SelfPidSource, Services, TickReport,
};
pub use error::Error;
pub use inspect::{
    Inspector, InspectorTotals, MemorySnapshotter, ProcessHandle, ProcessResolver,
    ProcessVmSnapshotter, ProcfsResolver, SnapshotError, SnapshotSink, SweepReport, TracingSink,
};

pub use correlation::CorrelationEngine;
pub use domain::{CoreId, EventKind, Finding, RecordView};
pub use ring::HandoffRing;
pub use sampling::{BufferDescriptor, NoopHardware, SampleBuffer, SamplingHardware};
pub use stats::CoreStats;
