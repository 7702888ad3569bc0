#![forbid(unsafe_code)]

/// One hardware sample record is 64 bytes: a basic-info group and a
/// memory-info group of 32 bytes each.
pub const RECORD_BYTES: usize = 64;

/// The same record viewed as 8 little-endian u64 words.
pub const RECORD_WORDS: usize = RECORD_BYTES / 8;

/// Word offsets of the fields the correlation scan reads.
pub const WORD_TAG: usize = 0;
pub const WORD_ADDRESS: usize = 1;
pub const WORD_COUNTER: usize = 2;
pub const WORD_TIMESTAMP: usize = 3;

/// Only the low 12 bits of the tag word identify the event source.
pub const TAG_MASK: u64 = 0x0fff;

/// The two hardware-counted conditions the detector programs. Each
/// carries a fixed counter enum and a low-order tag constant; a record
/// must match both for the scan to trust that it came from the
/// expected counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CacheMiss,
    BranchMiss,
}

impl EventKind {
    /// The counter/event-type enum stored in the record.
    pub fn counter_enum(self) -> u64 {
        match self {
            EventKind::CacheMiss => 1,
            EventKind::BranchMiss => 2,
        }
    }

    /// Expected low-order bits of the record's tag word.
    pub fn addr_tag(self) -> u64 {
        match self {
            EventKind::CacheMiss => 0x01d5,
            EventKind::BranchMiss => 0x01e1,
        }
    }

    pub fn from_counter_enum(value: u64) -> Option<Self> {
        match value {
            1 => Some(EventKind::CacheMiss),
            2 => Some(EventKind::BranchMiss),
            _ => None,
        }
    }
}

/// Borrowed view of one record's words. Field accessors rather than
/// offsets keep the scan free of raw arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    words: &'a [u64],
}

impl<'a> RecordView<'a> {
    /// `words` must be exactly one record wide; the buffer enforces it.
    pub(crate) fn new(words: &'a [u64]) -> Self {
        debug_assert_eq!(words.len(), RECORD_WORDS);
        Self { words }
    }

    pub fn tag(&self) -> u64 {
        self.words[WORD_TAG]
    }

    pub fn address(&self) -> u64 {
        self.words[WORD_ADDRESS]
    }

    pub fn counter_enum(&self) -> u64 {
        self.words[WORD_COUNTER]
    }

    pub fn timestamp(&self) -> u64 {
        self.words[WORD_TIMESTAMP]
    }

    /// Sanity filter: true when both the counter enum and the
    /// low-order tag bits identify `kind`.
    pub fn matches(&self, kind: EventKind) -> bool {
        self.counter_enum() == kind.counter_enum() && (self.tag() & TAG_MASK) == kind.addr_tag()
    }
}
