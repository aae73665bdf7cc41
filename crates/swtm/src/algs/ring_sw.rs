// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ring/Bloom-filter STM, stop-the-world variant (spec.md SS4.5, `RingSW`).
//!
//! No per-location metadata at all: a committing writer claims the next
//! ring slot, publishes its write filter there, then writes back its redo
//! log. Readers validate incrementally, intersecting their accumulated
//! read filter against every ring slot published since their last check,
//! on every `read()` call rather than only at commit -- this is what lets
//! `RingSW` detect a conflict as early as possible instead of doing all
//! the work of a doomed transaction.

use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::core::ring::RingValidation;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "ring-sw",
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
    match globals.ring.validate_since(tx.ts_cache, &tx.read_filter) {
        RingValidation::Conflict => Err(TmError::Conflict),
        RingValidation::Clean(now) => {
            tx.ts_cache = now;
            let mem_val = unsafe { memword::load(addr) };
            let merged = match tx.writes.find(addr) {
                Some(entry) => (mem_val & !entry.mask) | (entry.value & entry.mask),
                None => mem_val,
            };
            Ok(merged & mask)
        }
    }
}

fn write(_globals: &Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    tx.writes.insert(addr, value, mask);
    tx.write_filter.insert(addr);
    Ok(())
}

fn commit(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.writes.is_empty() {
        tx.status = TxStatus::Committed;
        globals.cm.on_commit(tx);
        return Ok(());
    }
    if matches!(
        globals.ring.validate_since(tx.ts_cache, &tx.read_filter),
        RingValidation::Conflict
    ) {
        return Err(TmError::Conflict);
    }
    let new_index = globals.ring.publish(tx.write_filter.clone());
    globals.last_init.store(new_index, Ordering::Release);
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }
    globals.last_complete.store(new_index, Ordering::Release);
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
