#![forbid(unsafe_code)]

//! Fixed hardware constants for the PEBS-style sampling machinery.
//!
//! These are configuration data, not behavior: register addresses and
//! the bit layout of the event-select control word. A privileged
//! [`super::SamplingHardware`] backend consumes them; nothing here
//! touches a register.

use crate::domain::EventKind;

/// Enables the precise-sampling capability per counter.
pub const MSR_PEBS_ENABLE: u32 = 0x3f1;

/// Event-select registers for the two general-purpose counters.
pub const MSR_PERFEVTSEL0: u32 = 0x186;
pub const MSR_PERFEVTSEL1: u32 = 0x187;

/// The general-purpose counter value registers.
pub const MSR_GP_COUNT_PMC0: u32 = 0xc1;
pub const MSR_GP_COUNT_PMC1: u32 = 0xc2;

/// Batch counter status/control.
pub const MSR_PERF_GLOBAL_STATUS: u32 = 0x38e;
pub const MSR_PERF_GLOBAL_CTRL: u32 = 0x38f;
pub const MSR_PERF_GLOBAL_OVF_CTRL: u32 = 0x390;

/// Holds the buffer-descriptor base address.
pub const MSR_DS_AREA: u32 = 0x600;

/// Record-format selection; bit 0 adds the memory-info group.
pub const MSR_PEBS_DATA_CFG: u32 = 0x3f2;

/// Reports the record format the part implements.
pub const MSR_PERF_CAPABILITIES: u32 = 0x345;

/// Enable precise sampling on PMC0 and PMC1.
pub const PEBS_ENABLE_PMC01: u64 = 0x03;

/// Enable PMC0 and PMC1 in the global control register.
pub const GLOBAL_CTRL_PMC01: u64 = 0x03;

/// Record format: basic group plus memory group.
pub const DATA_CFG_MEMINFO: u64 = 0x01;

/// Event-select control word builder. Field-by-field construction of
/// the PERFEVTSEL layout: event code (0..8), unit mask (8..16), then
/// the user, os, edge, enable, and adaptive-record flag bits.
#[derive(Debug, Clone, Copy)]
pub struct EventSelect {
    pub event: u8,
    pub umask: u8,
    pub user: bool,
    pub os: bool,
    pub edge: bool,
    pub enable: bool,
    pub adaptive: bool,
}

impl EventSelect {
    /// The select word for one of the two monitored conditions:
    /// user-mode, edge-triggered, enabled, adaptive record format.
    pub fn for_kind(kind: EventKind) -> Self {
        let (event, umask) = match kind {
            EventKind::CacheMiss => (0xd1, 0x08),
            EventKind::BranchMiss => (0xc5, 0x20),
        };
        Self {
            event,
            umask,
            user: true,
            os: false,
            edge: true,
            enable: true,
            adaptive: true,
        }
    }

    pub fn value(&self) -> u64 {
        let mut val = 0u64;
        val |= self.event as u64;
        val |= (self.umask as u64) << 8;
        if self.user {
            val |= 1 << 16;
        }
        if self.os {
            val |= 1 << 17;
        }
        if self.edge {
            val |= 1 << 18;
        }
        if self.enable {
            val |= 1 << 22;
        }
        if self.adaptive {
            val |= 1 << 34;
        }
        val
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_miss_select_word() {
        let select = EventSelect::for_kind(EventKind::CacheMiss);
        assert_eq!(select.value(), 0x4_0045_08d1);
    }

    #[test]
    fn branch_miss_select_word() {
        let select = EventSelect::for_kind(EventKind::BranchMiss);
        assert_eq!(select.value(), 0x4_0045_20c5);
    }

    #[test]
    fn os_bit_is_distinct_from_user() {
        let mut select = EventSelect::for_kind(EventKind::CacheMiss);
        select.user = false;
        select.os = true;
        assert_eq!(select.value() & (1 << 16), 0);
        assert_ne!(select.value() & (1 << 17), 0);
    }
}
