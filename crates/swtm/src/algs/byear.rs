// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Eager abort-requester visible-reader STM (spec.md SS4.4, `ByEAR`).
//!
//! Writer acquisition and writeback are identical to
//! [`super::byte_eager`]; the difference is entirely in `read`: instead of
//! spinning out a timeout against a standing writer, a `ByEAR` reader
//! immediately asks the writer's thread to abort (`ThreadSlot::kill`,
//! same primitive [`crate::cm::HyperAggressive`] uses) and retries. A
//! killed writer discovers the request the next time it calls `write` or
//! `commit` and aborts itself there.

use super::visible_reader::{acquire_for_write, begin as visible_begin, release_all};
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::core::visible::NO_OWNER;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::thread;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "byear",
    begin,
    read,
    write,
    commit,
    rollback,
    irrevoc,
    on_switch,
    privatization_safe: false,
};

fn begin(globals: &Globals, tx: &mut Tx) {
    visible_begin(tx);
    globals.cm.on_begin(tx);
}

fn read(globals: &'static Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    if tx.writer_addrs.iter().any(|a| *a == addr) {
        let val = unsafe { memword::load(addr) };
        return Ok(val & mask);
    }
    let lock = globals.bytelocks.get(addr);
    loop {
        if !tx.shared.is_alive() {
            return Err(TmError::Conflict);
        }
        let owner = lock.owner();
        if owner == NO_OWNER || owner == tx.id {
            lock.mark_reader(tx.id);
            let owner_after = lock.owner();
            if owner_after == NO_OWNER || owner_after == tx.id {
                tx.reader_addrs.push(addr);
                let val = unsafe { memword::load(addr) };
                return Ok(val & mask);
            }
            lock.unmark_reader(tx.id);
            continue;
        }
        let owner_slot = globals.threads.slot(owner);
        if !owner_slot.is_alive() {
            // Already asked to abort; give it a moment to release, then
            // re-check rather than requesting again.
            thread::yield_now();
            continue;
        }
        owner_slot.kill();
        thread::yield_now();
    }
}

fn write(globals: &'static Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    if !tx.shared.is_alive() {
        return Err(TmError::Conflict);
    }
    acquire_for_write(
        &globals.bytelocks,
        &mut tx.writer_addrs,
        tx.id,
        addr,
        globals.tunables.acquire_timeout_spins,
        globals.tunables.drain_timeout_spins,
    )?;
    let old_word = unsafe { memword::load(addr) };
    tx.undo.push(addr, old_word, mask);
    unsafe { memword::store_masked(addr, value, mask) };
    Ok(())
}

fn commit(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    if !tx.shared.is_alive() {
        return Err(TmError::Conflict);
    }
    release_all(&globals.bytelocks, tx.id, &tx.reader_addrs, &tx.writer_addrs);
    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &'static Globals, tx: &mut Tx) {
    for entry in tx.undo.iter_rev() {
        unsafe { memword::store_masked(entry.addr, entry.old_value, entry.mask) };
    }
    release_all(&globals.bytelocks, tx.id, &tx.reader_addrs, &tx.writer_addrs);
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

    fn new_tx(id: u32) -> Tx {
        Tx::new(id, ThreadSlot::new(), DISPATCH, Arc::new(NoopAllocatorHook))
    }

    #[test]
    fn reader_kills_standing_writer_and_eventually_proceeds() {
        let globals = leaked_globals();
        let mut cell: u64 = 1;
        let addr = &mut cell as *mut u64 as usize;

        let mut writer = new_tx(1);
        begin(globals, &mut writer);
        write(globals, &mut writer, addr, 2, u64::MAX).unwrap();

        let mut reader = new_tx(2);
        begin(globals, &mut reader);
        // Simulate the writer's thread slot already having been killed by
        // a prior round of this same reader's retry loop.
        writer.shared.kill();
        assert!(write(globals, &mut writer, addr, 3, u64::MAX).is_err());
        rollback(globals, &mut writer);

        let seen = read(globals, &mut reader, addr, u64::MAX).unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn commit_detects_a_kill_requested_mid_transaction() {
        let globals = leaked_globals();
        let mut tx = new_tx(1);
        begin(globals, &mut tx);
        tx.shared.kill();
        assert!(commit(globals, &mut tx).is_err());
    }
}
