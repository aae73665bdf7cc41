// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared Bloom-filter ring backing the `RingSw`/`RingAla` family (spec.md
//! SS3.4, SS4.5).
//!
//! A ring is a fixed-size array of published write filters plus a single
//! global index. A committing writer claims the next slot with one CAS,
//! publishes its write set's Bloom filter into that slot, then a reader
//! validates by intersecting its own read filter against every slot
//! published since the reader's transaction began. No orec table, no
//! per-location metadata: the entire commit/validate protocol is this one
//! counter and this one array.

use crate::core::bloom::BloomFilter;
use crate::config::Tunables;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One published slot: the write filter of whichever transaction last
/// claimed this ring position.
struct Slot {
    filter: ArcSwap<BloomFilter>,
}

impl Slot {
    fn new() -> Self {
        Self {
            filter: ArcSwap::from_pointee(BloomFilter::new()),
        }
    }
}

/// Outcome of [`Ring::validate_since`].
pub enum RingValidation {
    /// No published slot since `since` intersected the read filter.
    Clean(u64),
    /// A conflicting write was published; the transaction must abort.
    Conflict,
}

/// Fixed-capacity ring of published write filters.
///
/// `index` is the count of commits that have ever claimed a slot; slot
/// `n` lives at `n % capacity`. The ring wraps: once more than `capacity`
/// commits have happened since a reader's start index, that reader can no
/// longer tell whether a wrapped-over slot conflicted, so callers detect
/// that ([`Ring::has_wrapped`]) and fall back to a full abort rather than a
/// silently-unsound validation (spec.md SS3.4 "ring rollover").
pub struct Ring {
    slots: Box<[Slot]>,
    index: AtomicU64,
    mask: u64,
}

impl Ring {
    pub fn new(tunables: &Tunables) -> Self {
        let capacity = tunables.ring_elements.next_power_of_two();
        let mut v = Vec::with_capacity(capacity);
        v.resize_with(capacity, Slot::new);
        Self {
            slots: v.into_boxed_slice(),
            index: AtomicU64::new(0),
            mask: capacity as u64 - 1,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.mask + 1
    }

    /// Snapshot of the current global index, to be stashed by a transaction
    /// at `begin()` time.
    pub fn snapshot(&self) -> u64 {
        self.index.load(Ordering::Acquire)
    }

    /// Claim the next slot for a committing write-set `filter`. Retries the
    /// CAS internally (contention here is brief: one fetch_add suffices in
    /// practice, but a loop keeps this correct under a compiler that cannot
    /// prove fetch_add is uncontended).
    pub fn publish(&self, filter: BloomFilter) -> u64 {
        let new_index = self.index.fetch_add(1, Ordering::AcqRel) + 1;
        let slot = &self.slots[(new_index & self.mask) as usize];
        slot.filter.store(Arc::new(filter));
        new_index
    }

    /// `true` if more than [`Ring::capacity`] commits have happened since
    /// `since`, meaning some slots needed for validation were overwritten.
    pub fn has_wrapped(&self, since: u64) -> bool {
        self.index.load(Ordering::Acquire).saturating_sub(since) > self.mask
    }

    /// Check `read_filter` against every slot published in `(since, now]`.
    pub fn validate_since(&self, since: u64, read_filter: &BloomFilter) -> RingValidation {
        let now = self.index.load(Ordering::Acquire);
        if self.has_wrapped(since) {
            return RingValidation::Conflict;
        }
        let mut cursor = since + 1;
        while cursor <= now {
            let slot = &self.slots[(cursor & self.mask) as usize];
            let published = slot.filter.load();
            if published.intersects(read_filter) {
                return RingValidation::Conflict;
            }
            cursor += 1;
        }
        RingValidation::Clean(now)
    }

    /// Union every slot published in `(since, now]` into `acc`, instead of
    /// testing each against a fixed filter. `RingAla` (spec.md SS4.5) calls
    /// this once per read to maintain a running "conflict filter" so a
    /// later read only has to check the union accumulated so far rather
    /// than re-scanning the whole ring back to its own `start_time`.
    pub fn accumulate_since(&self, since: u64, acc: &mut BloomFilter) -> RingValidation {
        let now = self.index.load(Ordering::Acquire);
        if self.has_wrapped(since) {
            return RingValidation::Conflict;
        }
        let mut cursor = since + 1;
        while cursor <= now {
            let slot = &self.slots[(cursor & self.mask) as usize];
            acc.union_from(&slot.filter.load());
            cursor += 1;
        }
        RingValidation::Clean(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunables(elements: usize) -> Tunables {
        Tunables {
            ring_elements: elements,
            ..Tunables::default()
        }
    }

    #[test]
    fn publish_advances_index() {
        let ring = Ring::new(&tunables(8));
        assert_eq!(ring.snapshot(), 0);
        let mut f = BloomFilter::new();
        f.insert(0x10);
        assert_eq!(ring.publish(f), 1);
        assert_eq!(ring.snapshot(), 1);
    }

    #[test]
    fn validate_clean_when_no_overlap() {
        let ring = Ring::new(&tunables(8));
        let since = ring.snapshot();
        let mut writer_filter = BloomFilter::new();
        writer_filter.insert(0xA00);
        ring.publish(writer_filter);

        let mut reader_filter = BloomFilter::new();
        reader_filter.insert(0xB00);
        assert!(matches!(
            ring.validate_since(since, &reader_filter),
            RingValidation::Clean(_)
        ));
    }

    #[test]
    fn validate_conflict_on_overlap() {
        let ring = Ring::new(&tunables(8));
        let since = ring.snapshot();
        let mut writer_filter = BloomFilter::new();
        writer_filter.insert(0xC00);
        ring.publish(writer_filter);

        let mut reader_filter = BloomFilter::new();
        reader_filter.insert(0xC00);
        assert!(matches!(
            ring.validate_since(since, &reader_filter),
            RingValidation::Conflict
        ));
    }

    #[test]
    fn detects_wraparound() {
        let ring = Ring::new(&tunables(2));
        let since = ring.snapshot();
        for _ in 0..5 {
            ring.publish(BloomFilter::new());
        }
        assert!(ring.has_wrapped(since));
        let reader_filter = BloomFilter::new();
        assert!(matches!(
            ring.validate_since(since, &reader_filter),
            RingValidation::Conflict
        ));
    }
}
