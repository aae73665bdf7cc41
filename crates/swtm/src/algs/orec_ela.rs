// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Privatization-safe lazy orec STM (spec.md SS4.3, `OrecELA`).
//!
//! Shares [`super::orec_lazy`]'s redo-log read/write pair and commit-time
//! orec acquisition, adding two things on top: `begin` snapshots
//! `last_complete` rather than the raw clock (so a quiescent writer never
//! has to wait on itself), and a committing writer publishes
//! `last_complete` in ticket order and then waits for every other thread's
//! epoch to catch up before returning -- spec.md SS4.3's "writers
//! serialize through `last_complete`... readers revalidate on clock
//! change", together giving privatizing transactions Transactional
//! Sequential Consistency.

use super::orec_lazy::{acquire_write_set, begin_at, read_impl, validate_reads, writeback};
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::sandbox::{quiesce, revalidate_on_clock_change};
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;
use std::thread;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "orec-ela",
    begin,
    read,
    write,
    commit,
    rollback,
    irrevoc,
    on_switch,
    privatization_safe: true,
};

fn begin(globals: &Globals, tx: &mut Tx) {
    let start = globals.last_complete.load(Ordering::Acquire);
    begin_at(globals, tx, start);
    tx.ts_cache = globals.now();
}

fn read(globals: &'static Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    revalidate_on_clock_change(globals, tx)?;
    read_impl(globals, tx, addr, mask)
}

fn write(_globals: &Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    tx.writes.insert(addr, value, mask);
    tx.write_filter.insert(addr);
    Ok(())
}

fn commit(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.writes.is_empty() {
        tx.status = TxStatus::Committed;
        tx.shared.set_last_val_time(globals.now());
        globals.cm.on_commit(tx);
        return Ok(());
    }
    acquire_write_set(globals, tx)?;
    let end_time = globals.tick();
    if end_time != tx.start_time + 1 && !validate_reads(tx, tx.start_time) {
        return Err(TmError::Conflict);
    }
    writeback(tx);
    for orec in tx.locks.iter() {
        orec.release(end_time);
    }

    // Publish `last_complete` in strict ticket order, then let every
    // other thread's epoch catch up before this privatizing commit
    // returns (spec.md SS4.3 / SS4.8 Menon epoch).
    while globals.last_complete.load(Ordering::Acquire) != end_time - 1 {
        thread::yield_now();
    }
    globals.last_complete.store(end_time, Ordering::Release);
    tx.shared.set_last_val_time(end_time);
    quiesce(globals, tx.id, end_time);

    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &Globals, tx: &mut Tx) {
    for orec in tx.locks.iter() {
        orec.release_to_prior();
    }
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

    fn leaked_globals() -> &'static Globals {
        Box::leak(Box::new(Globals::new(&Tunables::default())))
    }

    fn new_tx() -> Tx {
        Tx::new(1, ThreadSlot::new(), DISPATCH, Arc::new(NoopAllocatorHook))
    }

    #[test]
    fn begin_snapshots_last_complete_not_raw_clock() {
        let globals = leaked_globals();
        globals.tick();
        globals.tick();
        let mut tx = new_tx();
        begin(globals, &mut tx);
        assert_eq!(tx.start_time, globals.last_complete.load(Ordering::Acquire));
    }

    #[test]
    fn single_writer_commit_publishes_last_complete() {
        let globals = leaked_globals();
        globals.threads.id_for_current_thread().unwrap();
        let mut tx = new_tx();
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        begin(globals, &mut tx);
        write(globals, &mut tx, addr, 11, u64::MAX).unwrap();
        commit(globals, &mut tx).unwrap();
        assert_eq!(cell, 11);
        assert_eq!(
            globals.last_complete.load(Ordering::Acquire),
            tx.shared.last_val_time()
        );
    }

    #[test]
    fn read_only_commit_updates_epoch_without_writes() {
        let globals = leaked_globals();
        globals.threads.id_for_current_thread().unwrap();
        let mut tx = new_tx();
        begin(globals, &mut tx);
        commit(globals, &mut tx).unwrap();
        assert_eq!(tx.shared.last_val_time(), globals.now());
    }
}
