#![forbid(unsafe_code)]

mod finding;
mod record;

pub use finding::Finding;
pub use record::{
    EventKind, RECORD_BYTES, RECORD_WORDS, RecordView, TAG_MASK, WORD_ADDRESS, WORD_COUNTER,
    WORD_TAG, WORD_TIMESTAMP,
};

/// Index into the engine's per-core table. Dense, assigned at setup.
pub type CoreId = usize;
