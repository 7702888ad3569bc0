#![forbid(unsafe_code)]

use crate::domain::{CoreId, EventKind, RECORD_BYTES, RECORD_WORDS, RecordView};
use crate::error::Error;
use crate::sampling::BufferDescriptor;
use tracing::debug;

/// Per-core circular record store fed by the sampling hardware.
///
/// The original descriptor tracked raw addresses (`base`, `index`,
/// `max`, `thresh`); here the region is a `Vec<u64>` with an explicit
/// record stride and the cursors are record indices, so every access
/// is bounds-checked. The invariant `0 <= next_record <= capacity`
/// mirrors `base <= index <= max`.
#[derive(Debug)]
pub struct SampleBuffer {
    words: Vec<u64>,
    /// Next free record slot (the hardware's write cursor).
    next_record: usize,
    /// Total record capacity; also the interrupt threshold.
    capacity: usize,
    threshold: usize,
    /// Armed to `-period` so a sample fires every `period` events.
    counter_reset: [i64; 2],
    period: u64,
}

impl SampleBuffer {
    /// Reserve and zero-fill a region holding `bytes / 64` records.
    /// A failed reservation disables sampling for this core only.
    pub fn allocate(core: CoreId, bytes: usize, period: u64) -> Result<Self, Error> {
        let capacity = bytes / RECORD_BYTES;
        let mut words = Vec::new();
        words
            .try_reserve_exact(capacity * RECORD_WORDS)
            .map_err(|_| Error::AllocationFailure { core, bytes })?;
        words.resize(capacity * RECORD_WORDS, 0);

        debug!(core, capacity, "sample buffer allocated");
        Ok(Self {
            words,
            next_record: 0,
            capacity,
            threshold: capacity,
            counter_reset: [-(period as i64), -(period as i64)],
            period,
        })
    }

    /// Number of records filled since the last drain.
    pub fn len(&self) -> usize {
        self.next_record
    }

    pub fn is_empty(&self) -> bool {
        self.next_record == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counter_reset(&self) -> [i64; 2] {
        self.counter_reset
    }

    /// Typed view of record `index`. Panics past `len()`; the scan
    /// only derives indices from `len()` so the filled region bounds
    /// every access.
    pub fn record(&self, index: usize) -> RecordView<'_> {
        assert!(index < self.next_record, "record index past fill cursor");
        let start = index * RECORD_WORDS;
        RecordView::new(&self.words[start..start + RECORD_WORDS])
    }

    /// Append one well-formed record, standing in for the hardware
    /// fill. Dropped silently once the threshold is reached, as the
    /// hardware stops writing at `thresh`.
    pub fn record_sample(&mut self, kind: EventKind, address: u64, timestamp: u64) -> bool {
        let mut words = [0u64; RECORD_WORDS];
        words[crate::domain::WORD_TAG] = kind.addr_tag();
        words[crate::domain::WORD_ADDRESS] = address;
        words[crate::domain::WORD_COUNTER] = kind.counter_enum();
        words[crate::domain::WORD_TIMESTAMP] = timestamp;
        self.record_raw(words)
    }

    /// Append one raw record without any shaping. Lets tests place
    /// mismatched tags or enums the way a misprogrammed counter would.
    pub fn record_raw(&mut self, record: [u64; RECORD_WORDS]) -> bool {
        if self.next_record >= self.threshold {
            return false;
        }
        let start = self.next_record * RECORD_WORDS;
        self.words[start..start + RECORD_WORDS].copy_from_slice(&record);
        self.next_record += 1;
        true
    }

    /// Reset the fill cursor and re-arm both counters. The buffer is a
    /// "fill since last drain" window, not a FIFO; draining an empty
    /// buffer is a repeatable no-op.
    pub fn drain(&mut self) {
        self.next_record = 0;
        self.counter_reset = [-(self.period as i64), -(self.period as i64)];
    }

    /// Free the region. Only safe once hardware sampling for the core
    /// is quiesced, which the engine enforces by ordering.
    pub fn release(self) {
        drop(self);
    }

    /// Descriptor the hardware interface programs into the buffer
    /// base / threshold registers.
    pub fn descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            base: self.words.as_ptr() as u64,
            capacity_records: self.capacity,
            threshold_records: self.threshold,
            counter_reset: self.counter_reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> SampleBuffer {
        SampleBuffer::allocate(0, 64 * 16, 1).unwrap()
    }

    #[test]
    fn allocate_sizes_from_bytes() {
        let buf = SampleBuffer::allocate(0, 4096, 1).unwrap();
        assert_eq!(buf.capacity(), 64);
        assert!(buf.is_empty());
        assert_eq!(buf.counter_reset(), [-1, -1]);
    }

    #[test]
    fn fill_then_drain_resets_cursor() {
        let mut buf = buffer();
        assert!(buf.record_sample(EventKind::CacheMiss, 0x1000, 100));
        assert!(buf.record_sample(EventKind::BranchMiss, 0x1008, 150));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.record(0).address(), 0x1000);
        assert_eq!(buf.record(1).timestamp(), 150);

        buf.drain();
        assert!(buf.is_empty());
        // idempotent
        buf.drain();
        assert!(buf.is_empty());
    }

    #[test]
    fn records_past_threshold_are_dropped() {
        let mut buf = SampleBuffer::allocate(0, 64 * 2, 1).unwrap();
        assert!(buf.record_sample(EventKind::CacheMiss, 0x10, 1));
        assert!(buf.record_sample(EventKind::CacheMiss, 0x20, 2));
        assert!(!buf.record_sample(EventKind::CacheMiss, 0x30, 3));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    #[should_panic(expected = "past fill cursor")]
    fn reading_past_fill_cursor_panics() {
        let mut buf = buffer();
        buf.record_sample(EventKind::CacheMiss, 0x10, 1);
        let _ = buf.record(1);
    }
}
