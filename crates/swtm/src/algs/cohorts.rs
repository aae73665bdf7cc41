// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cohort-based STM (spec.md SS4.6, `Cohorts`).
//!
//! A cohort is the set of transactions that joined between two full
//! drains; no thread may join a new cohort while a member of the current
//! one is still committing. Writes buffer to a redo log; commit acquires
//! a per-cohort order via `cpending`, waits for its predecessor to
//! publish, validates against the cohort's accumulated write filter, then
//! writes back and publishes its own order. [`super::cohorts_li`] reuses
//! every helper here except `write`/`commit`, adding a turbo fast path.

use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;
use std::thread;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "cohorts",
    begin,
    read,
    write,
    commit,
    rollback,
    irrevoc,
    on_switch,
    privatization_safe: false,
};

/// Block until the current cohort has fully drained (`cpending ==
/// committed`), then join it by incrementing `started`. If a drain closed
/// the gate in the gap between the wait and the increment, back the
/// increment out and retry.
pub(super) fn join_cohort(globals: &Globals) {
    loop {
        while globals.cohorts.gatekeeper.load(Ordering::Acquire) != 0 {
            thread::yield_now();
        }
        while globals.cohorts.cpending.load(Ordering::Acquire)
            != globals.cohorts.committed.load(Ordering::Acquire)
        {
            thread::yield_now();
        }
        globals.cohorts.started.fetch_add(1, Ordering::AcqRel);
        if globals.cohorts.cpending.load(Ordering::Acquire)
            == globals.cohorts.committed.load(Ordering::Acquire)
        {
            return;
        }
        globals.cohorts.started.fetch_sub(1, Ordering::AcqRel);
    }
}

fn begin(globals: &Globals, tx: &mut Tx) {
    join_cohort(globals);
    tx.reset_logs();
    tx.ts_cache = globals.cohorts.last_order.load(Ordering::Acquire) as u64;
    tx.status = TxStatus::Active;
    tx.shared.revive();
    globals.cm.on_begin(tx);
}

fn read(_globals: &Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    if let Some(entry) = tx.writes.find(addr) {
        if entry.mask == u64::MAX {
            return Ok(entry.value & mask);
        }
    }
    tx.read_filter.insert(addr);
    let mem_val = unsafe { memword::load(addr) };
    let merged = match tx.writes.find(addr) {
        Some(entry) => (mem_val & !entry.mask) | (entry.value & entry.mask),
        None => mem_val,
    };
    Ok(merged & mask)
}

fn write(_globals: &Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    tx.writes.insert(addr, value, mask);
    tx.write_filter.insert(addr);
    Ok(())
}

/// If the last transaction remaining in the cohort has just committed (or
/// left read-only), clear the accumulated write filter and reset every
/// counter so the next `begin` can start a fresh cohort.
pub(super) fn drain_if_last(globals: &Globals) {
    if globals.cohorts.committed.load(Ordering::Acquire) != globals.cohorts.started.load(Ordering::Acquire) {
        return;
    }
    globals.cohorts.gatekeeper.store(1, Ordering::Release);
    globals.global_filter.lock().clear();
    globals.cohorts.started.store(0, Ordering::Release);
    globals.cohorts.cpending.store(0, Ordering::Release);
    globals.cohorts.committed.store(0, Ordering::Release);
    globals.cohorts.last_order.store(0, Ordering::Release);
    globals.cohorts.gatekeeper.store(0, Ordering::Release);
}

fn commit_ro(globals: &Globals, tx: &mut Tx) {
    globals.cohorts.started.fetch_sub(1, Ordering::AcqRel);
    drain_if_last(globals);
    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
}

pub(super) fn commit_rw(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    let order = globals.cohorts.cpending.fetch_add(1, Ordering::AcqRel) as i64 + 1;
    while globals.cohorts.last_order.load(Ordering::Acquire) != order - 1 {
        thread::yield_now();
    }
    while globals.cohorts.cpending.load(Ordering::Acquire) != globals.cohorts.started.load(Ordering::Acquire) {
        thread::yield_now();
    }
    if order != 1 && globals.global_filter.lock().intersects(&tx.read_filter) {
        return Err(TmError::Conflict);
    }
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }
    globals.global_filter.lock().union_from(&tx.write_filter);
    globals.cohorts.last_order.store(order, Ordering::Release);
    globals.cohorts.committed.fetch_add(1, Ordering::AcqRel);
    drain_if_last(globals);
    Ok(())
}

fn commit(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.writes.is_empty() {
        commit_ro(globals, tx);
        return Ok(());
    }
    commit_rw(globals, tx)?;
    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &Globals, tx: &mut Tx) {
    globals.cohorts.started.fetch_sub(1, Ordering::AcqRel);
    drain_if_last(globals);
    tx.status = TxStatus::Aborted;
    globals.cm.on_abort(tx);
}

fn irrevoc(_globals: &Globals, _tx: &mut Tx) -> bool {
    false
}

fn on_switch(_globals: &Globals) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc_hook::NoopAllocatorHook;
    use crate::config::Tunables;
    use crate::core::registry::ThreadSlot;
    use std::sync::Arc;

    fn new_tx(id: u32) -> Tx {
        Tx::new(id, ThreadSlot::new(), DISPATCH, Arc::new(NoopAllocatorHook))
    }

    #[test]
    fn lone_writer_commits_and_drains_cohort() {
        let globals = Globals::new(&Tunables::default());
        let mut tx = new_tx(1);
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        begin(&globals, &mut tx);
        write(&globals, &mut tx, addr, 8, u64::MAX).unwrap();
        commit(&globals, &mut tx).unwrap();
        assert_eq!(cell, 8);
        assert_eq!(globals.cohorts.started.load(Ordering::Acquire), 0);
        assert_eq!(globals.cohorts.committed.load(Ordering::Acquire), 0);
    }

    #[test]
    fn read_only_commit_decrements_started() {
        let globals = Globals::new(&Tunables::default());
        let mut tx = new_tx(1);
        begin(&globals, &mut tx);
        assert_eq!(globals.cohorts.started.load(Ordering::Acquire), 1);
        commit(&globals, &mut tx).unwrap();
        assert_eq!(globals.cohorts.started.load(Ordering::Acquire), 0);
    }
}
