// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Versioned ownership records (orecs), spec.md SS3.1.
//!
//! An orec guards a range of addresses (one orec per cache line's worth of
//! the hashed address space). Its `v` word is either a commit-version
//! number or a lock encoding (owner thread id with the high bit set); `p`
//! holds the pre-lock version while locked, so the lock holder can restore
//! it on rollback.

use crate::config::Tunables;
use std::sync::atomic::{AtomicU64, Ordering};

/// High bit of the orec word: set while the orec is locked. No version
/// number can ever reach this value in a process lifetime, so lock vs.
/// version is an unambiguous test.
pub const LOCK_BIT: u64 = 1 << 63;

#[inline]
pub fn is_locked(v: u64) -> bool {
    v & LOCK_BIT != 0
}

#[inline]
pub fn owner_id(v: u64) -> u32 {
    (v & !LOCK_BIT) as u32
}

#[inline]
pub fn lock_word(id: u32) -> u64 {
    LOCK_BIT | (id as u64)
}

/// Cache-line-aligned ownership record (spec.md SS3.1).
#[repr(align(64))]
pub struct Orec {
    /// Either a commit-version number (unlocked) or `lock_word(owner)`.
    pub v: AtomicU64,
    /// Pre-lock version, valid only while `v` is locked.
    pub p: AtomicU64,
}

impl Orec {
    const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
            p: AtomicU64::new(0),
        }
    }

    /// Attempt to acquire this orec for `my_lock`, expecting its current
    /// unlocked value to be `expected`. On success, stashes `expected` into
    /// `p` so it can be restored on rollback.
    pub fn try_lock(&self, expected: u64, my_lock: u64) -> bool {
        if self
            .v
            .compare_exchange(expected, my_lock, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.p.store(expected, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Release a held lock, stamping the new commit version.
    pub fn release(&self, new_version: u64) {
        self.v.store(new_version, Ordering::Release);
    }

    /// Release a held lock back to its pre-lock version (rollback path).
    pub fn release_to_prior(&self) {
        let p = self.p.load(Ordering::Acquire);
        self.v.store(p, Ordering::Release);
    }

    /// Release a held lock after an *eager* writer's rollback: the writer
    /// already stored a dirty value in place before aborting, so restoring
    /// the bare pre-lock version `p` would let a reader that sampled that
    /// dirty value between lock and abort pass its two-check validation
    /// (`v1 == v2 == p`) and accept the rolled-back value. Stamping `p + 1`
    /// instead makes that reader's second check observe a changed version
    /// and retry. Also CAS-bumps `timestamp` if `p + 1` advanced past it,
    /// so a later transaction's `start_time` snapshot is never taken below
    /// a version that already exists in the orec table.
    pub fn release_dirty_rollback(&self, timestamp: &AtomicU64) {
        let p = self.p.load(Ordering::Acquire);
        let new_version = p + 1;
        self.v.store(new_version, Ordering::Release);
        let mut ts = timestamp.load(Ordering::Acquire);
        while new_version > ts {
            match timestamp.compare_exchange_weak(ts, new_version, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => ts = actual,
            }
        }
    }
}

/// Fixed, statically-allocated table of orecs, address-hashed.
///
/// Orecs live for the process's lifetime -- spec.md SS3.1 "no dynamic
/// allocation" -- so the table is sized once at [`crate::Stm`] construction
/// and never resized.
pub struct OrecTable {
    orecs: Box<[Orec]>,
    mask: usize,
}

impl OrecTable {
    pub fn new(tunables: &Tunables) -> Self {
        Self::with_size(tunables.orec_table_size)
    }

    pub fn with_size(size: usize) -> Self {
        let size = size.next_power_of_two();
        let mut v = Vec::with_capacity(size);
        v.resize_with(size, Orec::new);
        Self {
            orecs: v.into_boxed_slice(),
            mask: size - 1,
        }
    }

    /// Map an address to the orec guarding it.
    #[inline]
    pub fn get(&self, addr: usize) -> &Orec {
        let idx = (addr >> Tunables::ADDR_SHIFT) & self.mask;
        &self.orecs[idx]
    }

    pub fn len(&self) -> usize {
        self.orecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orecs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_address_maps_to_same_orec() {
        let t = OrecTable::new(&Tunables {
            orec_table_size: 16,
            ..Tunables::default()
        });
        let a = t.get(0x1000) as *const Orec;
        let b = t.get(0x1000) as *const Orec;
        assert_eq!(a, b);
    }

    #[test]
    fn lock_roundtrip() {
        let o = Orec::new();
        assert!(!is_locked(o.v.load(Ordering::Acquire)));
        let lock = lock_word(3);
        assert!(o.try_lock(0, lock));
        assert!(is_locked(o.v.load(Ordering::Acquire)));
        assert_eq!(owner_id(o.v.load(Ordering::Acquire)), 3);
        o.release(42);
        assert_eq!(o.v.load(Ordering::Acquire), 42);
    }

    #[test]
    fn release_to_prior_restores_version() {
        let o = Orec::new();
        o.v.store(7, Ordering::Release);
        let lock = lock_word(1);
        assert!(o.try_lock(7, lock));
        o.release_to_prior();
        assert_eq!(o.v.load(Ordering::Acquire), 7);
    }

    #[test]
    fn contested_lock_fails_for_second_locker() {
        let o = Orec::new();
        assert!(o.try_lock(0, lock_word(1)));
        assert!(!o.try_lock(0, lock_word(2)));
    }
}
