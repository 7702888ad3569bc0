#![forbid(unsafe_code)]

use crate::domain::Finding;
use std::sync::atomic::{AtomicU64, Ordering};

/// One finding as the ring stores it: three 64-bit words. All-atomic
/// slots keep the structure free of unsafe code; the index publication
/// below is what actually orders producer and consumer.
#[derive(Debug)]
struct Slot {
    pid: AtomicU64,
    range_start: AtomicU64,
    range_end: AtomicU64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            pid: AtomicU64::new(0),
            range_start: AtomicU64::new(0),
            range_end: AtomicU64::new(0),
        }
    }
}

/// Fixed-capacity single-producer/single-consumer handoff ring, one
/// per core. The core's own sampling pass pushes, the system-wide
/// inspector pops; nothing else may touch it. With that discipline the
/// only synchronization is the wrapped index arithmetic plus a
/// release/acquire pair on `write_index`.
///
/// There is no backpressure: a producer that outpaces the consumer
/// silently overwrites the oldest unread slots. The producer runs in
/// an interrupt-equivalent context and must never block, so the loss
/// is accepted and surfaced through [`overflow_count`].
///
/// [`overflow_count`]: HandoffRing::overflow_count
#[derive(Debug)]
pub struct HandoffRing {
    slots: Box<[Slot]>,
    mask: u64,
    /// Wrapped index of the slot last read; starts at `capacity - 1`,
    /// the wrapped spelling of "-1, nothing read yet".
    read_index: AtomicU64,
    /// Wrapped index of the next slot to write.
    write_index: AtomicU64,
    /// Monotonic totals; their difference is the unread backlog.
    pushed: AtomicU64,
    popped: AtomicU64,
    overflow: AtomicU64,
}

impl HandoffRing {
    /// `capacity` must be a power of two so wraparound is a bitmask.
    /// Config validation enforces this before any ring exists; the
    /// assert keeps direct constructions honest.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a power of two"
        );
        let slots = (0..capacity).map(|_| Slot::empty()).collect();
        Self {
            slots,
            mask: (capacity - 1) as u64,
            read_index: AtomicU64::new((capacity - 1) as u64),
            write_index: AtomicU64::new(0),
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            overflow: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Producer side. Never blocks, never fails; see the type docs for
    /// the overwrite policy.
    pub fn push(&self, finding: Finding) {
        let pushed = self.pushed.fetch_add(1, Ordering::Relaxed);
        let popped = self.popped.load(Ordering::Acquire);
        if pushed.saturating_sub(popped) >= self.slots.len() as u64 {
            // landing on a slot the consumer never saw
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }

        let write = self.write_index.load(Ordering::Relaxed);
        let slot = &self.slots[write as usize];
        slot.pid.store(finding.pid as u64, Ordering::Relaxed);
        slot.range_start.store(finding.range_start, Ordering::Relaxed);
        slot.range_end.store(finding.range_end, Ordering::Relaxed);
        // publish the data before the consumer can see the new index
        self.write_index
            .store((write + 1) & self.mask, Ordering::Release);
    }

    /// Consumer side. Empty exactly when the read index sits one slot
    /// behind the write index (mod capacity). Popping an empty ring is
    /// a repeatable no-op.
    pub fn pop(&self) -> Option<Finding> {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Relaxed);
        if read == (write + self.mask) & self.mask {
            return None;
        }

        let next = (read + 1) & self.mask;
        let slot = &self.slots[next as usize];
        let finding = Finding::new(
            slot.pid.load(Ordering::Relaxed) as u32,
            slot.range_start.load(Ordering::Relaxed),
            slot.range_end.load(Ordering::Relaxed),
        );
        self.read_index.store(next, Ordering::Relaxed);
        self.popped.fetch_add(1, Ordering::Release);
        Some(finding)
    }

    /// Findings pushed onto slots the consumer had not read yet.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Unread backlog as the accounting counters see it.
    pub fn backlog(&self) -> u64 {
        self.pushed
            .load(Ordering::Relaxed)
            .saturating_sub(self.popped.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(n: u64) -> Finding {
        Finding::new(n as u32, n << 4, (n << 4) + 8)
    }

    #[test]
    fn pop_after_push_returns_the_pushed_finding() {
        let ring = HandoffRing::new(8);
        ring.push(finding(1));
        assert_eq!(ring.pop(), Some(finding(1)));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn empty_ring_pops_nothing_repeatedly() {
        let ring = HandoffRing::new(8);
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.overflow_count(), 0);
    }

    #[test]
    fn fifo_order_within_capacity() {
        let ring = HandoffRing::new(16);
        for n in 0..10 {
            ring.push(finding(n));
        }
        for n in 0..10 {
            assert_eq!(ring.pop(), Some(finding(n)));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn saturation_overwrites_the_oldest_slot() {
        let ring = HandoffRing::new(1024);
        for n in 0..1025 {
            ring.push(finding(n));
        }
        // the 1025th push wrapped onto slot 0, replacing finding 0
        assert_eq!(
            ring.slots[0].range_start.load(Ordering::Relaxed),
            finding(1024).range_start
        );
        assert_eq!(ring.overflow_count(), 1);
    }

    #[test]
    fn overflow_stays_zero_up_to_capacity() {
        let ring = HandoffRing::new(1024);
        for n in 0..1024 {
            ring.push(finding(n));
        }
        assert_eq!(ring.overflow_count(), 0);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_pow2_capacity_is_rejected() {
        let _ = HandoffRing::new(1000);
    }

    #[test]
    fn spsc_handoff_across_threads() {
        use std::sync::Arc;

        let ring = Arc::new(HandoffRing::new(1024));
        let producer_ring = Arc::clone(&ring);
        let producer = std::thread::spawn(move || {
            for n in 0..500 {
                producer_ring.push(finding(n));
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 500 {
            if let Some(f) = ring.pop() {
                seen.push(f);
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();

        // consumer stayed behind the producer, so nothing was lost
        // and order is intact
        for (n, f) in seen.iter().enumerate() {
            assert_eq!(*f, finding(n as u64));
        }
        assert_eq!(ring.overflow_count(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // alternating pushes and pops below capacity behave like a
            // plain FIFO queue
            #[test]
            fn behaves_like_a_queue_below_capacity(
                ops in proptest::collection::vec(any::<bool>(), 0..200)
            ) {
                let ring = HandoffRing::new(64);
                let mut model = std::collections::VecDeque::new();
                let mut n = 0u64;
                for push in ops {
                    if push && model.len() < 63 {
                        ring.push(finding(n));
                        model.push_back(finding(n));
                        n += 1;
                    } else {
                        prop_assert_eq!(ring.pop(), model.pop_front());
                    }
                }
            }
        }
    }
}
