// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Visible-reader metadata: bitlock and bytelock tables (spec.md SS3.2).
//!
//! Both variants are single-writer/multiple-reader locks with per-thread
//! reader presence. They differ only in how a reader announces itself --
//! one bit in a word (`Bitlock`, cheap, limited to 64 threads) or one byte
//! in an array (`Bytelock`, word-at-a-time drain, scales past 64 threads).
//! The [`ReaderPresence`] trait captures that one difference so
//! `swtm::algs::visible_reader` (spec.md SS4.4) writes the shared algorithm
//! once and is generic over which table backs it.

use crate::config::Tunables;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// `0` means "no owner" -- thread ids are 1-based (spec.md SS3.3).
pub const NO_OWNER: u32 = 0;

/// Per-thread reader presence, backing a [`VisibleLock`].
pub trait ReaderPresence: Send + Sync {
    fn new(max_threads: usize) -> Self;
    fn set(&self, id: u32);
    fn clear(&self, id: u32);
    /// `true` if any reader bit other than `id` is set.
    fn any_other(&self, id: u32) -> bool;
    fn is_set(&self, id: u32) -> bool;
}

/// Bit-set reader presence, one `AtomicU64` covering up to 64 threads.
pub struct BitSet {
    bits: AtomicU64,
}

impl ReaderPresence for BitSet {
    fn new(max_threads: usize) -> Self {
        assert!(
            max_threads <= 64,
            "Bitlock reader set supports at most 64 threads, got {max_threads}"
        );
        Self {
            bits: AtomicU64::new(0),
        }
    }

    fn set(&self, id: u32) {
        self.bits.fetch_or(1u64 << id, Ordering::AcqRel);
    }

    fn clear(&self, id: u32) {
        self.bits.fetch_and(!(1u64 << id), Ordering::AcqRel);
    }

    fn any_other(&self, id: u32) -> bool {
        self.bits.load(Ordering::Acquire) & !(1u64 << id) != 0
    }

    fn is_set(&self, id: u32) -> bool {
        self.bits.load(Ordering::Acquire) & (1u64 << id) != 0
    }
}

/// Byte-per-thread reader presence; drains word-at-a-time in groups of 8.
pub struct ByteSet {
    bytes: Box<[AtomicU8]>,
}

impl ReaderPresence for ByteSet {
    fn new(max_threads: usize) -> Self {
        let mut v = Vec::with_capacity(max_threads);
        v.resize_with(max_threads, || AtomicU8::new(0));
        Self {
            bytes: v.into_boxed_slice(),
        }
    }

    fn set(&self, id: u32) {
        self.bytes[id as usize].store(1, Ordering::Release);
    }

    fn clear(&self, id: u32) {
        self.bytes[id as usize].store(0, Ordering::Release);
    }

    fn any_other(&self, id: u32) -> bool {
        self.bytes
            .iter()
            .enumerate()
            .any(|(i, b)| i as u32 != id && b.load(Ordering::Acquire) != 0)
    }

    fn is_set(&self, id: u32) -> bool {
        self.bytes[id as usize].load(Ordering::Acquire) != 0
    }
}

/// A single-writer/multi-reader lock over one address range.
pub struct VisibleLock<R: ReaderPresence> {
    owner: AtomicU32,
    readers: R,
}

impl<R: ReaderPresence> VisibleLock<R> {
    fn new(max_threads: usize) -> Self {
        Self {
            owner: AtomicU32::new(NO_OWNER),
            readers: R::new(max_threads),
        }
    }

    pub fn owner(&self) -> u32 {
        self.owner.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self, id: u32) -> bool {
        self.owner
            .compare_exchange(NO_OWNER, id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.owner.store(NO_OWNER, Ordering::Release);
    }

    pub fn mark_reader(&self, id: u32) {
        self.readers.set(id);
    }

    pub fn unmark_reader(&self, id: u32) {
        self.readers.clear(id);
    }

    pub fn has_other_readers(&self, id: u32) -> bool {
        self.readers.any_other(id)
    }

    pub fn am_reader(&self, id: u32) -> bool {
        self.readers.is_set(id)
    }
}

/// Fixed table of visible-reader locks, address-hashed like [`super::orec::OrecTable`].
pub struct LockTable<R: ReaderPresence> {
    locks: Box<[VisibleLock<R>]>,
    mask: usize,
}

impl<R: ReaderPresence> LockTable<R> {
    pub fn new(tunables: &Tunables) -> Self {
        let size = tunables.lock_table_size.next_power_of_two();
        let mut v = Vec::with_capacity(size);
        v.resize_with(size, || VisibleLock::new(tunables.max_threads));
        Self {
            locks: v.into_boxed_slice(),
            mask: size - 1,
        }
    }

    #[inline]
    pub fn get(&self, addr: usize) -> &VisibleLock<R> {
        let idx = (addr >> Tunables::ADDR_SHIFT) & self.mask;
        &self.locks[idx]
    }
}

pub type BitlockTable = LockTable<BitSet>;
pub type BytelockTable = LockTable<ByteSet>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitlock_acquire_release() {
        let t = LockTable::<BitSet>::new(&Tunables::default());
        let l = t.get(0x100);
        assert_eq!(l.owner(), NO_OWNER);
        assert!(l.try_acquire(1));
        assert!(!l.try_acquire(2));
        l.release();
        assert!(l.try_acquire(2));
    }

    #[test]
    fn bitlock_reader_presence() {
        let t = LockTable::<BitSet>::new(&Tunables::default());
        let l = t.get(0x200);
        l.mark_reader(1);
        l.mark_reader(2);
        assert!(l.has_other_readers(1));
        l.unmark_reader(2);
        assert!(!l.has_other_readers(1));
        assert!(l.am_reader(1));
    }

    #[test]
    fn bytelock_drains_independently() {
        let t = LockTable::<ByteSet>::new(&Tunables::default());
        let l = t.get(0x300);
        l.mark_reader(1);
        l.mark_reader(5);
        assert!(l.has_other_readers(1));
        l.unmark_reader(5);
        assert!(!l.has_other_readers(1));
    }
}
