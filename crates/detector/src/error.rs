use crate::inspect::SnapshotError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(#[from] config::Error),

    #[error("Failed to allocate a {bytes}-byte sample buffer for core {core}")]
    AllocationFailure { core: usize, bytes: usize },

    #[error("Core {0} is out of range or was disabled during setup")]
    CoreDisabled(usize),

    #[error("Failed to program sampling hardware: {0}")]
    HardwareProgramFailed(String),

    #[error("Failed to read procfs info: {0}")]
    ProcfsReadFailed(#[from] procfs::ProcError),

    #[error("Snapshot failed: {0}")]
    SnapshotFailed(#[from] SnapshotError),
}
