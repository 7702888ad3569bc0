#![forbid(unsafe_code)]

use crate::domain::Finding;
use crate::inspect::ProcessHandle;
use async_trait::async_trait;
use nix::sys::uio::{RemoteIoVec, process_vm_readv};
use nix::unistd::Pid;
use std::io::IoSliceMut;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Target pages unavailable: {0}")]
    PagesUnavailable(#[source] nix::Error),

    #[error("Failed to allocate a {0}-byte snapshot buffer")]
    AllocationFailed(usize),

    #[error("Refusing a {requested}-byte snapshot (limit {limit})")]
    RangeTooLarge { requested: u64, limit: u64 },

    #[error("Short read: copied {copied} of {expected} bytes")]
    ShortRead { copied: usize, expected: usize },
}

/// Copy `[start, end)` out of another process's address space.
/// External capability as far as the detector core is concerned; the
/// inspector only consumes this contract.
pub trait MemorySnapshotter: Send + Sync {
    fn snapshot(
        &self,
        process: &ProcessHandle,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, SnapshotError>;
}

/// Snapshotter backed by `process_vm_readv`. The remote side is split
/// into per-page chunks honoring the page offset of `start`, so a read
/// failing on one page fails the whole snapshot rather than silently
/// truncating mid-range.
#[derive(Debug)]
pub struct ProcessVmSnapshotter {
    page_size: u64,
    max_bytes: u64,
}

impl ProcessVmSnapshotter {
    /// Flagged regions are a handful of bytes apart; anything larger
    /// than a page's worth of slack is a malformed finding.
    pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024;

    pub fn new() -> Self {
        Self {
            page_size: procfs::page_size(),
            max_bytes: Self::DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            page_size: procfs::page_size(),
            max_bytes,
        }
    }

    /// Page-boundary split of the remote range.
    fn remote_chunks(&self, start: u64, len: usize) -> Vec<RemoteIoVec> {
        let mut chunks = Vec::new();
        let mut addr = start;
        let mut remaining = len;
        while remaining > 0 {
            let page_offset = (addr % self.page_size) as usize;
            let chunk = remaining.min(self.page_size as usize - page_offset);
            chunks.push(RemoteIoVec {
                base: addr as usize,
                len: chunk,
            });
            addr += chunk as u64;
            remaining -= chunk;
        }
        chunks
    }
}

impl Default for ProcessVmSnapshotter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshotter for ProcessVmSnapshotter {
    fn snapshot(
        &self,
        process: &ProcessHandle,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, SnapshotError> {
        let len = end.saturating_sub(start);
        if len == 0 {
            return Ok(Vec::new());
        }
        if len > self.max_bytes {
            return Err(SnapshotError::RangeTooLarge {
                requested: len,
                limit: self.max_bytes,
            });
        }

        let len = len as usize;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| SnapshotError::AllocationFailed(len))?;
        data.resize(len, 0);

        let remote = self.remote_chunks(start, len);
        let mut local = [IoSliceMut::new(&mut data)];
        let copied = process_vm_readv(Pid::from_raw(process.pid as i32), &mut local, &remote)
            .map_err(SnapshotError::PagesUnavailable)?;
        if copied != len {
            return Err(SnapshotError::ShortRead {
                copied,
                expected: len,
            });
        }

        Ok(data)
    }
}

/// Downstream consumer of extracted snapshots. Whether a flagged pair
/// is actually malicious is judged past this seam.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn deliver(&self, finding: &Finding, bytes: Vec<u8>);
}

/// Default sink: log the extraction and drop the bytes.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl SnapshotSink for TracingSink {
    async fn deliver(&self, finding: &Finding, bytes: Vec<u8>) {
        info!(
            pid = finding.pid,
            range_start = format_args!("{:#x}", finding.range_start),
            range_end = format_args!("{:#x}", finding.range_end),
            bytes = bytes.len(),
            "snapshot extracted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_handle() -> ProcessHandle {
        ProcessHandle {
            pid: std::process::id(),
            comm: "self".into(),
        }
    }

    #[test]
    fn snapshot_of_own_memory_returns_the_bytes() {
        let payload: Vec<u8> = (0..64u8).collect();
        let start = payload.as_ptr() as u64;
        let snapshotter = ProcessVmSnapshotter::new();
        let copied = snapshotter
            .snapshot(&own_handle(), start, start + payload.len() as u64)
            .expect("reading our own pages must work");
        assert_eq!(copied, payload);
    }

    #[test]
    fn empty_range_is_an_empty_snapshot() {
        let snapshotter = ProcessVmSnapshotter::new();
        let bytes = snapshotter.snapshot(&own_handle(), 0x1000, 0x1000).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn oversized_range_is_refused() {
        let snapshotter = ProcessVmSnapshotter::with_max_bytes(16);
        let err = snapshotter
            .snapshot(&own_handle(), 0x1000, 0x2000)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::RangeTooLarge { .. }));
    }

    #[test]
    fn unmapped_range_reports_pages_unavailable() {
        let snapshotter = ProcessVmSnapshotter::new();
        // the zero page is never mapped for us
        let err = snapshotter.snapshot(&own_handle(), 0x10, 0x20).unwrap_err();
        assert!(matches!(err, SnapshotError::PagesUnavailable(_)));
    }

    #[test]
    fn chunks_split_at_page_boundaries() {
        let snapshotter = ProcessVmSnapshotter::new();
        let page = snapshotter.page_size;
        // straddle one boundary: 8 bytes before it, 8 after
        let start = page * 3 - 8;
        let chunks = snapshotter.remote_chunks(start, 16);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].base as u64, start);
        assert_eq!(chunks[0].len, 8);
        assert_eq!(chunks[1].base as u64, page * 3);
        assert_eq!(chunks[1].len, 8);
    }
}
