// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The per-thread transaction descriptor (spec.md SS3.3).
//!
//! One `Tx` lives per OS thread, created lazily on that thread's first
//! transactional call and reused for every subsequent transaction the
//! thread runs. Its log fields (`reads`, `writes`, `undo`, `locks`, ...)
//! are cleared and reused rather than reallocated between attempts, so a
//! thread that retries a transaction after a conflict does not churn the
//! allocator on the abort path.

use crate::alloc_hook::TxAllocatorHook;
use crate::core::bloom::BloomFilter;
use crate::core::log::{AddrLog, LockList, NanorecList, ReadLog, UndoLog, ValueList, WriteLog};
use crate::core::registry::ThreadSlot;
use crate::dispatch::DispatchTuple;
use std::sync::Arc;

/// Visible lifecycle state (spec.md SS3.3 `status`/`alive`). Used by
/// cohort algorithms to gate a new cohort's start and by contention
/// managers deciding whether a peer is still a live abort target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Aborted,
    Committed,
    /// Writer has claimed a commit slot but has not finished writeback
    /// (cohort/token families' "in the process of committing").
    CPending,
}

/// Per-thread transaction state, plus every log structure an installed
/// algorithm may need. An algorithm only touches the fields its family
/// uses; the rest sit idle (e.g. `ByteEager` never populates `nanorecs`).
pub struct Tx {
    pub id: u32,
    /// Lock-encoded word this thread writes into an orec's `v` field when
    /// acquiring it (`orec::lock_word(id)`).
    pub my_lock: u64,
    pub status: TxStatus,
    pub start_time: u64,
    pub end_time: u64,
    /// Last-known "all commits at or below this are visible" time
    /// (token/cohort families poll this instead of `timestamp`).
    pub ts_cache: u64,
    /// Commit token; `-1` ("no outstanding order") is `i64::MIN` sentinel
    /// free representation -- `None` is used instead since Rust has no
    /// need to match the original's in-band sentinel.
    pub order: Option<u64>,
    pub consec_aborts: u32,
    pub consec_ro: u32,

    pub reads: ReadLog,
    pub writes: WriteLog,
    pub undo: UndoLog,
    pub locks: LockList,
    pub read_filter: BloomFilter,
    pub write_filter: BloomFilter,
    pub values: ValueList,
    pub nanorecs: NanorecList,

    /// Addresses marked with a reader bit/byte, visible-reader family only
    /// (spec.md SS4.4). Unmarked at commit/rollback.
    pub reader_addrs: AddrLog,
    /// Addresses whose owner slot this transaction holds, visible-reader
    /// family only. Released at commit/rollback.
    pub writer_addrs: AddrLog,

    /// Running union of ring slots already scanned, `RingAla` only (spec.md
    /// SS4.5): avoids re-scanning the whole ring back to `start_time` on
    /// every read.
    pub conflict_filter: BloomFilter,

    /// Cross-thread-visible slot (`alive`, `last_val_time`), shared with
    /// the registry so a peer can reach this thread without unsafe
    /// aliasing.
    pub shared: Arc<ThreadSlot>,

    /// Cached dispatch tuple for the algorithm installed at this
    /// transaction's `begin()`. Deliberately snapshotted rather than
    /// re-read from the global each barrier: spec.md SS4.1 forbids a
    /// running transaction from observing an algorithm switch mid-flight.
    pub dispatch: DispatchTuple,

    pub allocator: Arc<dyn TxAllocatorHook>,

    /// `true` once this transaction has won the cohort's turbo flicker
    /// protocol (`CohortsLI`/`CohortsLNI2Q`, spec.md SS4.6): its writes
    /// land in place, un-logged, instead of buffering to a redo log.
    pub turbo: bool,

    /// Re-execution attempt counter (spec.md SS6); `0` on a fresh `begin`.
    pub attempt: u32,

    /// Flat-nesting depth: a nested `begin` while `nesting > 0` is
    /// absorbed into the outermost transaction rather than starting a new
    /// one (spec.md SS1 non-goal: no true nested transactions).
    pub nesting: u32,
}

impl Tx {
    pub fn new(
        id: u32,
        shared: Arc<ThreadSlot>,
        dispatch: DispatchTuple,
        allocator: Arc<dyn TxAllocatorHook>,
    ) -> Self {
        Self {
            id,
            my_lock: crate::core::orec::lock_word(id),
            status: TxStatus::Active,
            start_time: 0,
            end_time: 0,
            ts_cache: 0,
            order: None,
            consec_aborts: 0,
            consec_ro: 0,
            reads: ReadLog::new(),
            writes: WriteLog::new(),
            undo: UndoLog::new(),
            locks: LockList::new(),
            read_filter: BloomFilter::new(),
            write_filter: BloomFilter::new(),
            values: ValueList::new(),
            nanorecs: NanorecList::new(),
            reader_addrs: AddrLog::new(),
            writer_addrs: AddrLog::new(),
            conflict_filter: BloomFilter::new(),
            shared,
            dispatch,
            allocator,
            turbo: false,
            attempt: 0,
            nesting: 0,
        }
    }

    /// Clear every log ahead of a fresh attempt. Called by `begin()`
    /// before installing a new `start_time`; never called mid-transaction.
    pub fn reset_logs(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.undo.clear();
        self.locks.clear();
        self.read_filter.clear();
        self.write_filter.clear();
        self.values.clear();
        self.nanorecs.clear();
        self.reader_addrs.clear();
        self.writer_addrs.clear();
        self.conflict_filter.clear();
        self.turbo = false;
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
            && self.undo.is_empty()
            && self.locks.is_empty()
            && self.writer_addrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchTuple;
    use crate::alloc_hook::NoopAllocatorHook;

    #[test]
    fn reset_logs_clears_everything() {
        let mut tx = Tx::new(
            1,
            ThreadSlot::new(),
            DispatchTuple::inert(),
            Arc::new(NoopAllocatorHook),
        );
        tx.writes.insert(8, 1, u64::MAX);
        tx.read_filter.insert(8);
        tx.reset_logs();
        assert!(tx.writes.is_empty());
        assert!(tx.read_filter.is_empty());
    }

    #[test]
    fn fresh_tx_is_read_only() {
        let tx = Tx::new(
            1,
            ThreadSlot::new(),
            DispatchTuple::inert(),
            Arc::new(NoopAllocatorHook),
        );
        assert!(tx.is_read_only());
    }
}
