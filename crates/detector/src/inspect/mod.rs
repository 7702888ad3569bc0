#![forbid(unsafe_code)]

mod inspector;
mod resolver;
mod snapshot;

pub use inspector::{Inspector, InspectorTotals, SweepReport};
pub use resolver::{ProcessHandle, ProcessResolver, ProcfsResolver};
pub use snapshot::{
    MemorySnapshotter, ProcessVmSnapshotter, SnapshotError, SnapshotSink, TracingSink,
};
