#![forbid(unsafe_code)]

/// A correlated (process, address-range) candidate. Immutable once
/// produced; ownership moves to the ring on push and to the inspector
/// on pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finding {
    /// Process executing when the sampling interrupt fired.
    pub pid: u32,
    /// Address of the cache-miss record (the earlier event).
    pub range_start: u64,
    /// Address of the branch-miss record (the later event).
    pub range_end: u64,
}

impl Finding {
    pub fn new(pid: u32, range_start: u64, range_end: u64) -> Self {
        Self {
            pid,
            range_start,
            range_end,
        }
    }
}
