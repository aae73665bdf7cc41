// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide state shared by every algorithm family (spec.md SS3.4).
//!
//! One `Globals` is built by [`crate::Stm::new`] and lives for the
//! process's lifetime; every table it owns is sized once from
//! [`Tunables`] and never reallocated, matching spec.md SS3.1's "no
//! dynamic allocation" for metadata. Individual fields are used by only
//! some algorithm families -- e.g. `global_version`/`writer_lock`/
//! `activity` back `Pessimistic` alone -- but all live in one struct so a
//! dispatch-tuple switch never has to reconstruct state the next
//! algorithm needs.

use super::bloom::BloomFilter;
use super::orec::OrecTable;
use super::registry::ThreadRegistry;
use super::ring::Ring;
use super::visible::{BitlockTable, BytelockTable};
use crate::config::Tunables;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Cohort-family control counters (spec.md SS3.4, SS4.6). A cohort is a
/// batch of transactions allowed to run concurrently; no thread may begin
/// a new cohort while `cpending > committed`.
#[derive(Default)]
pub struct CohortCounters {
    pub gatekeeper: AtomicU32,
    pub started: AtomicU32,
    pub cpending: AtomicU32,
    pub committed: AtomicU32,
    pub last_order: AtomicI64,
}

/// Pessimistic-family writer serialization state (spec.md SS4.9).
pub struct PessimisticState {
    pub global_version: AtomicU64,
    /// `true` while a writer holds exclusive access.
    pub writer_lock: AtomicBool,
    /// Per-thread snapshot of the version a thread began reading at, or
    /// [`PessimisticState::IDLE`] while it holds no live transaction. A
    /// committing writer waits for every slot `<= its own start version`
    /// to clear before touching memory.
    pub activity: Box<[AtomicU64]>,
}

impl PessimisticState {
    /// Sentinel meaning "this thread is not currently mid-transaction".
    /// Must sort above every real version a writer could wait on.
    pub const IDLE: u64 = u64::MAX;

    fn new(max_threads: usize) -> Self {
        let mut v = Vec::with_capacity(max_threads);
        v.resize_with(max_threads, || AtomicU64::new(Self::IDLE));
        Self {
            global_version: AtomicU64::new(0),
            writer_lock: AtomicBool::new(false),
            activity: v.into_boxed_slice(),
        }
    }
}

/// All process-wide STM state.
pub struct Globals {
    /// Monotonic clock (spec.md I1-I3); some families reserve the MSB,
    /// none of the implemented 16 do, so it is a plain counter here.
    pub timestamp: AtomicU64,
    /// Highest order known fully committed (cohort/token families).
    pub last_complete: AtomicU64,
    /// Highest ring slot initialized (ring family; mirrors `Ring`'s own
    /// index but kept here too since spec.md SS3.4 names it as separate
    /// global state from the ring buffer itself).
    pub last_init: AtomicU64,

    pub orecs: OrecTable,
    pub bitlocks: BitlockTable,
    pub bytelocks: BytelockTable,
    pub ring: Ring,

    /// Small, separate orec table for the Nano family (spec.md SS4.8):
    /// Nano validates its *entire* nanorec list on every read rather than
    /// comparing against a global clock, so its table is deliberately
    /// undersized relative to `orecs` -- more sharing, smaller quadratic
    /// lists, sized from `nano_table_size` rather than `orec_table_size`.
    pub nano_orecs: OrecTable,

    /// Priority read-record table for priority-aware contention
    /// management (spec.md SS3.4 `rrecs[]`). Present for contract
    /// completeness; none of the 16 implemented algorithms consult it
    /// (OrecFair, the priority-scheduled orec variant, is out of this
    /// crate's representative cross-section).
    pub rrecs: Box<[AtomicU64]>,

    pub cohorts: CohortCounters,
    pub global_filter: Mutex<BloomFilter>,
    pub temp_filter: Mutex<BloomFilter>,

    pub pessimistic: PessimisticState,

    /// Per-slot commit-order completion ring for `CTokenQ` (spec.md SS4.7):
    /// instead of every waiter spinning on one shared `last_complete` word,
    /// each spins on `qnodes[order % len]`, sharding cache traffic across a
    /// small ring sized to twice the thread count (the "two slots" a
    /// thread's queue node toggles between).
    pub qnodes: Box<[AtomicU64]>,

    pub threads: ThreadRegistry,

    /// Copy of the tunables this `Globals` was built from -- algorithms
    /// read spin-timeout counts (`read_timeout_spins` etc.) directly off
    /// it rather than threading a second parameter through every barrier.
    pub tunables: Tunables,

    /// Contention manager backing remote-abort decisions (spec.md SS4.10).
    /// Chosen once per `Stm` at construction; unlike the algorithm dispatch
    /// tuple, spec.md does not require hot-swapping it mid-run.
    pub cm: Arc<dyn crate::cm::ContentionManager>,
}

impl Globals {
    /// Build with the default contention manager ([`crate::cm::Backoff`]).
    pub fn new(tunables: &Tunables) -> Self {
        Self::with_cm(tunables, Arc::new(crate::cm::Backoff))
    }

    pub fn with_cm(tunables: &Tunables, cm: Arc<dyn crate::cm::ContentionManager>) -> Self {
        let mut rrecs = Vec::with_capacity(tunables.max_threads);
        rrecs.resize_with(tunables.max_threads, || AtomicU64::new(0));
        Self {
            timestamp: AtomicU64::new(0),
            last_complete: AtomicU64::new(0),
            last_init: AtomicU64::new(0),
            orecs: OrecTable::new(tunables),
            bitlocks: BitlockTable::new(tunables),
            bytelocks: BytelockTable::new(tunables),
            ring: Ring::new(tunables),
            nano_orecs: OrecTable::with_size(tunables.nano_table_size),
            rrecs: rrecs.into_boxed_slice(),
            cohorts: CohortCounters::default(),
            global_filter: Mutex::new(BloomFilter::new()),
            temp_filter: Mutex::new(BloomFilter::new()),
            pessimistic: PessimisticState::new(tunables.max_threads),
            qnodes: {
                let len = (tunables.max_threads * 2).max(2).next_power_of_two();
                let mut v = Vec::with_capacity(len);
                v.resize_with(len, || AtomicU64::new(0));
                v.into_boxed_slice()
            },
            threads: ThreadRegistry::new(tunables),
            tunables: *tunables,
            cm,
        }
    }

    /// Fetch-and-add the global clock, returning the new value (spec.md
    /// I1: never observed to decrease).
    pub fn tick(&self) -> u64 {
        self.timestamp.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn now(&self) -> u64 {
        self.timestamp.load(Ordering::Acquire)
    }
}
