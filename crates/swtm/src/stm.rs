// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The `Stm` facade (spec.md SS1, SS6): the one type a client touches.
//!
//! `Stm::new` leaks one [`Globals`] for the process's lifetime (spec.md
//! SS3.1 "no dynamic allocation" applies to metadata tables, not to the
//! one-time setup cost of building them) and registers every algorithm in
//! [`crate::algs::all`]. Each OS thread gets its own [`Tx`] descriptor,
//! created lazily on that thread's first call and kept in a thread-local
//! for the life of the thread -- mirroring [`crate::core::registry`]'s
//! "ids are assigned once, never reused" design.

use crate::alloc_hook::{NoopAllocatorHook, TxAllocatorHook};
use crate::algs;
use crate::cm::{Backoff, ContentionManager};
use crate::config::Tunables;
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::dispatch::AlgorithmTable;
use crate::error::TmError;
use crate::reexec::BeginOutcome;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static TX: RefCell<Option<Tx>> = const { RefCell::new(None) };
}

/// The STM runtime. One instance is expected per process (the thread
/// registry it leaks is itself process-wide, spec.md SS3.4); building a
/// second `Stm` works but shares no state with the first and still draws
/// thread ids from the same [`crate::core::registry::ThreadRegistry`]-style
/// thread-local cache.
pub struct Stm {
    globals: &'static Globals,
    algorithms: AlgorithmTable,
    allocator: Arc<dyn TxAllocatorHook>,
}

impl Stm {
    /// Build an `Stm` with the default contention manager ([`Backoff`]) and
    /// `orec-eager` installed (spec.md SS4.2, the baseline algorithm every
    /// comparison in SS8 measures against).
    pub fn new(tunables: Tunables) -> Self {
        Self::with_cm(tunables, Arc::new(Backoff))
    }

    /// Build an `Stm` with an explicit contention manager.
    pub fn with_cm(tunables: Tunables, cm: Arc<dyn ContentionManager>) -> Self {
        let globals: &'static Globals = Box::leak(Box::new(Globals::with_cm(&tunables, cm)));
        let mut algorithms = AlgorithmTable::new();
        for dispatch in algs::all() {
            algorithms.register(dispatch);
        }
        algorithms.install_default(ORECEAGER);
        Self {
            globals,
            algorithms,
            allocator: Arc::new(NoopAllocatorHook),
        }
    }

    /// Replace the transactional-allocator hook (spec.md SS6); no-op by
    /// default.
    pub fn with_allocator_hook(mut self, hook: Arc<dyn TxAllocatorHook>) -> Self {
        self.allocator = hook;
        self
    }

    /// Names of every registered algorithm, for a client building a
    /// selection UI or picking one from configuration.
    pub fn algorithm_names(&self) -> impl Iterator<Item = &&'static str> {
        self.algorithms.names()
    }

    pub fn current_algorithm(&self) -> &'static str {
        self.algorithms.current().name
    }

    /// Install a different algorithm process-wide (spec.md SS4.1). Requires
    /// `&mut self`: the exclusive borrow is how this crate enforces "no
    /// transaction is in flight across a switch" without a runtime check,
    /// since a `&Stm` handle cannot coexist with an outstanding `&mut Stm`.
    pub fn switch_to(&mut self, name: &str) -> Result<(), TmError> {
        self.algorithms.switch_to(self.globals, name)
    }

    fn with_tx<R>(&self, f: impl FnOnce(&'static Globals, &mut Tx) -> R) -> Result<R, TmError> {
        let id = self.globals.threads.id_for_current_thread()?;
        TX.with(|cell| {
            let mut guard = cell.borrow_mut();
            if guard.is_none() {
                let shared = self.globals.threads.slot(id);
                *guard = Some(Tx::new(
                    id,
                    shared,
                    self.algorithms.current(),
                    Arc::clone(&self.allocator),
                ));
            }
            let tx = guard.as_mut().expect("just inserted");
            Ok(f(self.globals, tx))
        })
    }

    /// Start (or restart, after a conflict) a transaction on the calling
    /// thread. Absorbs flat nesting (spec.md SS1 non-goal): a `begin()`
    /// called while already inside one is a no-op that just bumps
    /// `nesting`.
    pub fn begin(&self) -> Result<BeginOutcome, TmError> {
        let dispatch = self.algorithms.current();
        self.with_tx(|globals, tx| {
            tx.nesting += 1;
            if tx.nesting > 1 {
                // Flat nesting: absorbed into the already-open outer
                // transaction, no new start_time/log reset.
                return BeginOutcome { attempt: tx.attempt };
            }
            tx.dispatch = dispatch;
            tx.allocator.on_tx_begin();
            (tx.dispatch.begin)(globals, tx);
            if tx.attempt == 0 {
                BeginOutcome::first()
            } else {
                BeginOutcome::retry(tx.attempt - 1)
            }
        })
    }

    pub fn read(&self, addr: usize, mask: u64) -> Result<u64, TmError> {
        self.with_tx(|globals, tx| (tx.dispatch.read)(globals, tx, addr, mask))?
    }

    pub fn write(&self, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
        self.with_tx(|globals, tx| (tx.dispatch.write)(globals, tx, addr, value, mask))?
    }

    /// Commit the calling thread's transaction. On a recoverable failure
    /// (`Conflict`/`Timeout`/`RemoteAbort`/`RingRollover`) this already runs
    /// `rollback` and bumps the retry counter before returning -- spec.md
    /// SS6's contract that a client sees fully-reset logs the moment
    /// `commit()` returns an `Err`, with no separate rollback call needed.
    pub fn commit(&self) -> Result<(), TmError> {
        self.with_tx(|globals, tx| {
            if tx.nesting > 1 {
                tx.nesting -= 1;
                return Ok(());
            }
            tx.nesting = 0;
            match (tx.dispatch.commit)(globals, tx) {
                Ok(()) => {
                    tx.allocator.on_tx_commit();
                    tx.attempt = 0;
                    Ok(())
                }
                Err(e) => {
                    (tx.dispatch.rollback)(globals, tx);
                    tx.allocator.on_tx_abort();
                    if e.is_recoverable() {
                        tx.attempt += 1;
                    }
                    Err(e)
                }
            }
        })?
    }

    /// Explicitly abort the calling thread's in-flight transaction (spec.md
    /// SS6 `tmabort`). Returns the recoverable [`TmError::Conflict`] the
    /// caller's retry loop should treat exactly like a failed `commit()`.
    pub fn tmabort(&self) -> Result<TmError, TmError> {
        self.with_tx(|globals, tx| {
            tx.nesting = 0;
            (tx.dispatch.rollback)(globals, tx);
            tx.allocator.on_tx_abort();
            tx.attempt += 1;
            tx.status = TxStatus::Aborted;
            TmError::Conflict
        })
    }

    /// Ask the installed algorithm to make the current transaction
    /// irrevocable (spec.md SS4.1 `irrevoc`). Returns `true` if it
    /// accepted; none of the 16 shipped algorithms currently do (each
    /// reports `false`), so a client relying on irrevocability must supply
    /// its own algorithm variant.
    pub fn irrevoc(&self) -> Result<bool, TmError> {
        self.with_tx(|globals, tx| (tx.dispatch.irrevoc)(globals, tx))
    }

    /// Run `body` inside a `begin`/`commit` loop, retrying on every
    /// recoverable error (spec.md SS6 "self-rescheduling contract"). `body`
    /// receives the same `&Stm` so it can issue `read`/`write` calls, and
    /// returns its result through `commit()` succeeding.
    pub fn atomic<T>(&self, mut body: impl FnMut(&Stm) -> Result<T, TmError>) -> Result<T, TmError> {
        loop {
            self.begin()?;
            match body(self) {
                Ok(value) => {
                    self.commit()?;
                    return Ok(value);
                }
                Err(e) if e.is_recoverable() => {
                    let _ = self.tmabort();
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

const ORECEAGER: &str = "orec-eager";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_algorithm_is_orec_eager() {
        let stm = Stm::new(Tunables::default());
        assert_eq!(stm.current_algorithm(), "orec-eager");
    }

    #[test]
    fn switch_to_installs_named_algorithm() {
        let mut stm = Stm::new(Tunables::default());
        stm.switch_to("bit-eager").unwrap();
        assert_eq!(stm.current_algorithm(), "bit-eager");
    }

    #[test]
    fn switch_to_unknown_name_errors_and_leaves_current_installed() {
        let mut stm = Stm::new(Tunables::default());
        assert!(stm.switch_to("does-not-exist").is_err());
        assert_eq!(stm.current_algorithm(), "orec-eager");
    }

    #[test]
    fn single_threaded_read_your_own_write() {
        let stm = Stm::new(Tunables::default());
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        stm.begin().unwrap();
        stm.write(addr, 42, u64::MAX).unwrap();
        assert_eq!(stm.read(addr, u64::MAX).unwrap(), 42);
        stm.commit().unwrap();
        assert_eq!(cell, 42);
    }

    #[test]
    fn atomic_retries_until_it_commits() {
        let stm = Stm::new(Tunables::default());
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        let mut attempts = 0;
        let result = stm.atomic(|s| {
            attempts += 1;
            s.write(addr, 7, u64::MAX)?;
            if attempts < 3 {
                Err(TmError::Conflict)
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(attempts, 3);
        assert_eq!(cell, 7);
    }

    #[test]
    fn irrevoc_is_unsupported_by_every_shipped_algorithm() {
        let stm = Stm::new(Tunables::default());
        stm.begin().unwrap();
        assert_eq!(stm.irrevoc().unwrap(), false);
        stm.commit().unwrap();
    }
}
