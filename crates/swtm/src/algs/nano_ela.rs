// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Privatization-safe quadratic-validation orec STM (spec.md SS4.8,
//! `NanoELA`).
//!
//! Shares [`super::nano`]'s read/write/validate/acquire machinery
//! unchanged; the only addition is a Menon epoch published on every
//! committing writer: bump the global clock, stamp `last_val_time`, and
//! quiesce until every other live thread has caught up, so a thread still
//! mid-transaction against data this commit just privatized is guaranteed
//! to observe the new epoch before touching it again.

use super::nano::{acquire_write_set, validate_nanorecs};
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::core::orec::is_locked;
use crate::core::sandbox::quiesce;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "nano-ela",
    begin,
    read,
    write,
    commit,
    rollback,
    irrevoc,
    on_switch,
    privatization_safe: true,
};

const SELF_ABORT_SENTINEL: u32 = u32::MAX;

fn begin(globals: &Globals, tx: &mut Tx) {
    tx.reset_logs();
    tx.status = TxStatus::Active;
    tx.shared.revive();
    globals.cm.on_begin(tx);
}

fn read(globals: &'static Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    if let Some(entry) = tx.writes.find(addr) {
        if entry.mask == u64::MAX {
            return Ok(entry.value & mask);
        }
    }
    let orec = globals.nano_orecs.get(addr);
    loop {
        let v1 = orec.v.load(Ordering::Acquire);
        if is_locked(v1) {
            return Err(TmError::Conflict);
        }
        let mem_val = unsafe { memword::load(addr) };
        let v2 = orec.v.load(Ordering::Acquire);
        if v1 != v2 {
            continue;
        }
        tx.nanorecs.push(orec, v1);
        if tx.nanorecs.iter().count() > globals.tunables.nano_table_size {
            tx.consec_aborts = SELF_ABORT_SENTINEL;
            return Err(TmError::Conflict);
        }
        if !validate_nanorecs(tx) {
            return Err(TmError::Conflict);
        }
        tx.read_filter.insert(addr);
        let merged = match tx.writes.find(addr) {
            Some(entry) => (mem_val & !entry.mask) | (entry.value & entry.mask),
            None => mem_val,
        };
        return Ok(merged & mask);
    }
}

fn write(_globals: &Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    tx.writes.insert(addr, value, mask);
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
    if !validate_nanorecs(tx) {
        return Err(TmError::Conflict);
    }
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }
    for orec in tx.locks.iter() {
        let p = orec.p.load(Ordering::Acquire);
        orec.release(p + 1);
    }

    let epoch = globals.tick();
    tx.shared.set_last_val_time(epoch);
    quiesce(globals, tx.id, epoch);

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
