// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Privatization-safe ring STM (spec.md SS4.5, `RingALA`).
//!
//! Same commit protocol as [`super::ring_sw`], plus two differences: reads
//! accumulate a running union "conflict filter" instead of re-testing the
//! read filter against each newly published slot (cheaper when the read
//! set is large relative to the ring traffic since begin), and a
//! committing writer serializes its `last_complete` publication and waits
//! for every other thread's epoch to catch up, same discipline as
//! [`super::orec_ela`].

use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::core::ring::RingValidation;
use crate::core::sandbox::quiesce;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;
use std::thread;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "ring-ala",
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
    tx.reset_logs();
    tx.start_time = globals.ring.snapshot();
    tx.ts_cache = tx.start_time;
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
    tx.read_filter.insert(addr);
    match globals.ring.accumulate_since(tx.ts_cache, &mut tx.conflict_filter) {
        RingValidation::Conflict => return Err(TmError::Conflict),
        RingValidation::Clean(now) => tx.ts_cache = now,
    }
    if tx.conflict_filter.intersects(&tx.read_filter) {
        return Err(TmError::Conflict);
    }
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

fn commit(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.writes.is_empty() {
        tx.status = TxStatus::Committed;
        tx.shared.set_last_val_time(globals.ring.snapshot());
        globals.cm.on_commit(tx);
        return Ok(());
    }
    if matches!(
        globals.ring.accumulate_since(tx.ts_cache, &mut tx.conflict_filter),
        RingValidation::Conflict
    ) || tx.conflict_filter.intersects(&tx.read_filter)
    {
        return Err(TmError::Conflict);
    }
    let new_index = globals.ring.publish(tx.write_filter.clone());
    globals.last_init.store(new_index, Ordering::Release);
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }

    while globals.last_complete.load(Ordering::Acquire) != new_index - 1 {
        thread::yield_now();
    }
    globals.last_complete.store(new_index, Ordering::Release);
    tx.shared.set_last_val_time(new_index);
    quiesce(globals, tx.id, new_index);

    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &Globals, tx: &mut Tx) {
    tx.status = TxStatus::Aborted;
    globals.cm.on_abort(tx);
}

fn irrevoc(_globals: &Globals, _tx: &mut Tx) -> bool {
    false
}

fn on_switch(_globals: &Globals) {}
