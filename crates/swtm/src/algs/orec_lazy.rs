// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lazy-locking orec STM with a redo log (spec.md SS4.3, `OrecLazy`).
//!
//! Writes only touch the redo log; orecs are acquired at commit time, in
//! write-set order, and released with the new commit timestamp once the
//! writeback has landed. [`super::orec_ela`] reuses [`validate_reads`] and
//! [`acquire_write_set`] to add privatization safety on top of this same
//! read/write pair.

use crate::core::descriptor::Tx;
use crate::core::globals::Globals;
use crate::core::memword;
use crate::core::orec::is_locked;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "orec-lazy",
    begin,
    read,
    write,
    commit,
    rollback,
    irrevoc,
    on_switch,
    privatization_safe: false,
};

pub(super) fn begin_at(globals: &Globals, tx: &mut Tx, start_time: u64) {
    tx.reset_logs();
    tx.start_time = start_time;
    tx.status = crate::core::descriptor::TxStatus::Active;
    tx.shared.revive();
    globals.cm.on_begin(tx);
}

fn begin(globals: &Globals, tx: &mut Tx) {
    begin_at(globals, tx, globals.now());
}

/// Every orec read so far still carries a version `<= as_of` (or is held
/// by this transaction itself, which cannot happen pre-commit for a lazy
/// writer but can for the privatization-safe variant re-checking during
/// its own commit).
pub(super) fn validate_reads(tx: &Tx, as_of: u64) -> bool {
    tx.reads.iter().all(|orec| {
        let v = orec.v.load(Ordering::Acquire);
        !is_locked(v) && v <= as_of
    })
}

pub(super) fn read_impl(globals: &'static Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    if let Some(entry) = tx.writes.find(addr) {
        if entry.mask == u64::MAX {
            return Ok(entry.value & mask);
        }
    }
    loop {
        let orec = globals.orecs.get(addr);
        let v1 = orec.v.load(Ordering::Acquire);
        if is_locked(v1) {
            return Err(TmError::Conflict);
        }
        if v1 > tx.start_time {
            return Err(TmError::Conflict);
        }
        let mem_val = unsafe { memword::load(addr) };
        let v2 = orec.v.load(Ordering::Acquire);
        if v1 != v2 {
            continue;
        }
        tx.reads.push(orec);
        tx.read_filter.insert(addr);
        let merged = match tx.writes.find(addr) {
            Some(entry) => (mem_val & !entry.mask) | (entry.value & entry.mask),
            None => mem_val,
        };
        return Ok(merged & mask);
    }
}

fn read(globals: &'static Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    read_impl(globals, tx, addr, mask)
}

fn write(_globals: &Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    tx.writes.insert(addr, value, mask);
    tx.write_filter.insert(addr);
    Ok(())
}

/// Acquire every orec backing the write set, in write-set order (spec.md
/// SS4.3 "acquire all orecs for addresses in the redo log"). Returns
/// `Err` the moment one is unavailable; any orecs already acquired are
/// left locked for `rollback` to release.
pub(super) fn acquire_write_set(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    for entry in tx.writes.iter() {
        let orec = globals.orecs.get(entry.addr);
        let v = orec.v.load(Ordering::Acquire);
        if is_locked(v) || v > tx.start_time {
            return Err(TmError::Conflict);
        }
        if !orec.try_lock(v, tx.my_lock) {
            return Err(TmError::Conflict);
        }
        tx.locks.push(orec);
    }
    Ok(())
}

pub(super) fn writeback(tx: &Tx) {
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }
}

fn commit(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.writes.is_empty() {
        tx.status = crate::core::descriptor::TxStatus::Committed;
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
    tx.status = crate::core::descriptor::TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &Globals, tx: &mut Tx) {
    for orec in tx.locks.iter() {
        orec.release_to_prior();
    }
    tx.status = crate::core::descriptor::TxStatus::Aborted;
    globals.cm.on_abort(tx);
}

fn irrevoc(_globals: &Globals, _tx: &mut Tx) -> bool {
    false
}

fn on_switch(_globals: &Globals) {}
