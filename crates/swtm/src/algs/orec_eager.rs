// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Eager-locking orec STM with an undo log (spec.md SS4.2).
//!
//! Writes acquire their orec and mutate memory in place immediately;
//! rollback replays the undo log. Reads re-validate with a two-timestamp
//! orec check and may ask the installed contention manager to force a
//! conflicting owner to abort (spec.md SS8 scenario 3, `HyperAggressive`).

use crate::core::descriptor::Tx;
use crate::core::globals::Globals;
use crate::core::memword;
use crate::core::orec::{is_locked, owner_id, Orec};
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "orec-eager",
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
    tx.reset_logs();
    tx.start_time = globals.now();
    tx.status = crate::core::descriptor::TxStatus::Active;
    tx.shared.revive();
    globals.cm.on_begin(tx);
}

/// Re-check every orec this transaction has read against `as_of`. Used
/// both by `commit` (validating before writeback) and by `read` (trying
/// to extend `start_time` instead of aborting outright).
fn validate_reads(tx: &Tx, as_of: u64) -> bool {
    tx.reads.iter().all(|orec| {
        let v = orec.v.load(Ordering::Acquire);
        if is_locked(v) {
            owner_id(v) == tx.id
        } else {
            v <= as_of
        }
    })
}

fn read(globals: &'static Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    loop {
        let orec: &'static Orec = globals.orecs.get(addr);
        let v1 = orec.v.load(Ordering::Acquire);
        if is_locked(v1) {
            if owner_id(v1) == tx.id {
                let val = unsafe { memword::load(addr) };
                return Ok(val & mask);
            }
            if globals.cm.may_kill(globals, tx, owner_id(v1)) {
                continue;
            }
            return Err(TmError::Conflict);
        }
        if v1 > tx.start_time {
            if validate_reads(tx, tx.start_time) {
                tx.start_time = globals.now();
            } else {
                return Err(TmError::Conflict);
            }
            continue;
        }
        let val = unsafe { memword::load(addr) };
        let v2 = orec.v.load(Ordering::Acquire);
        if v1 == v2 {
            tx.reads.push(orec);
            tx.read_filter.insert(addr);
            return Ok(val & mask);
        }
    }
}

fn write(globals: &'static Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    let orec: &'static Orec = globals.orecs.get(addr);
    let v = orec.v.load(Ordering::Acquire);
    if is_locked(v) {
        if owner_id(v) != tx.id {
            if !globals.cm.may_kill(globals, tx, owner_id(v)) {
                return Err(TmError::Conflict);
            }
        }
    } else {
        if v > tx.start_time {
            return Err(TmError::Conflict);
        }
        if !orec.try_lock(v, tx.my_lock) {
            return Err(TmError::Conflict);
        }
        tx.locks.push(orec);
    }
    let old_word = unsafe { memword::load(addr) };
    tx.undo.push(addr, old_word, mask);
    unsafe { memword::store_masked(addr, value, mask) };
    tx.writes.insert(addr, value, mask);
    tx.write_filter.insert(addr);
    Ok(())
}

fn commit(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.is_read_only() {
        tx.status = crate::core::descriptor::TxStatus::Committed;
        globals.cm.on_commit(tx);
        return Ok(());
    }
    let end_time = globals.tick();
    if end_time != tx.start_time + 1 && !validate_reads(tx, tx.start_time) {
        return Err(TmError::Conflict);
    }
    for orec in tx.locks.iter() {
        orec.release(end_time);
    }
    tx.status = crate::core::descriptor::TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &Globals, tx: &mut Tx) {
    for entry in tx.undo.iter_rev() {
        unsafe { memword::store_masked(entry.addr, entry.old_value, entry.mask) };
    }
    for orec in tx.locks.iter() {
        orec.release_dirty_rollback(&globals.timestamp);
    }
    tx.status = crate::core::descriptor::TxStatus::Aborted;
    globals.cm.on_abort(tx);
}

fn irrevoc(_globals: &Globals, _tx: &mut Tx) -> bool {
    false
}

fn on_switch(_globals: &Globals) {}
