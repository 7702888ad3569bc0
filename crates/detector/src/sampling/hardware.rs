#![forbid(unsafe_code)]

use crate::domain::CoreId;
use crate::error::Error;
use tracing::debug;

/// What the hardware interface needs to know to point the sampling
/// machinery at a core's buffer: the register values derived from the
/// buffer's layout.
#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor {
    /// Base address programmed into the buffer-area register.
    pub base: u64,
    pub capacity_records: usize,
    /// Record count at which the sampling interrupt fires.
    pub threshold_records: usize,
    /// Counter re-arm values, `-period` each.
    pub counter_reset: [i64; 2],
}

/// Register programming for one core's counters. Exact register
/// addresses and bit layouts live in [`crate::sampling::msr`]; actual
/// register I/O is privileged and sits behind this seam.
pub trait SamplingHardware: Send + Sync {
    /// Program the buffer area, event selects, and counter resets,
    /// then enable sampling on `core`.
    fn program(&mut self, core: CoreId, descriptor: &BufferDescriptor) -> Result<(), Error>;

    /// Re-arm the counters after a drain.
    fn rearm(&mut self, core: CoreId);

    /// Stop sampling on `core`. Must precede buffer release.
    fn quiesce(&mut self, core: CoreId);

    /// Restore whatever register state was saved by `program`.
    fn restore(&mut self, core: CoreId);
}

/// Stand-in used when no privileged backend is wired up; records the
/// calls in the log and nothing else.
#[derive(Debug, Default)]
pub struct NoopHardware;

impl SamplingHardware for NoopHardware {
    fn program(&mut self, core: CoreId, descriptor: &BufferDescriptor) -> Result<(), Error> {
        debug!(
            core,
            base = format_args!("{:#x}", descriptor.base),
            capacity = descriptor.capacity_records,
            "hardware program (noop)"
        );
        Ok(())
    }

    fn rearm(&mut self, _core: CoreId) {}

    fn quiesce(&mut self, core: CoreId) {
        debug!(core, "hardware quiesce (noop)");
    }

    fn restore(&mut self, core: CoreId) {
        debug!(core, "hardware restore (noop)");
    }
}
