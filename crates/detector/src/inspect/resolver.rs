#![forbid(unsafe_code)]

use tracing::trace;

/// A resolved, live-at-resolution-time process. Liveness is rechecked
/// right before snapshotting; a pid can die in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Short command name, for the logs.
    pub comm: String,
}

/// The host's process table, as far as the inspector needs it. Owned
/// and synchronized by the operating environment, not by us.
pub trait ProcessResolver: Send + Sync {
    /// Look up a pid. `None` when the process is gone or unreadable.
    fn resolve(&self, pid: u32) -> Option<ProcessHandle>;

    /// Whether the process behind the handle is still running.
    fn is_alive(&self, handle: &ProcessHandle) -> bool;
}

/// Resolver backed by /proc. Zombies and reaped processes count as
/// dead; there is nothing left to snapshot in either case.
#[derive(Debug, Default)]
pub struct ProcfsResolver;

impl ProcfsResolver {
    fn state_of(pid: u32) -> Option<char> {
        let process = procfs::process::Process::new(pid as i32).ok()?;
        let stat = process.stat().ok()?;
        Some(stat.state)
    }
}

impl ProcessResolver for ProcfsResolver {
    fn resolve(&self, pid: u32) -> Option<ProcessHandle> {
        let process = procfs::process::Process::new(pid as i32).ok()?;
        let stat = process.stat().ok()?;
        trace!(pid, comm = %stat.comm, "resolved pid");
        Some(ProcessHandle {
            pid,
            comm: stat.comm,
        })
    }

    fn is_alive(&self, handle: &ProcessHandle) -> bool {
        matches!(Self::state_of(handle.pid), Some(state) if state != 'Z' && state != 'X')
    }
}
