// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Commit-token STM with a sharded wait queue (spec.md SS4.7, `CTokenQ`).
//!
//! Identical to [`super::ctoken`] except for how a committer waits for
//! its predecessor: instead of every thread polling one shared
//! `last_complete` word, each polls `qnodes[order % len]` -- a small ring
//! sized to twice the thread count -- so cache traffic is sharded across
//! several cache lines instead of hammering one.

use super::ctoken::revalidate_values;
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;
use std::thread;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "ctoken-q",
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
    tx.order = None;
    tx.ts_cache = globals.last_complete.load(Ordering::Acquire);
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
    let mem_val = unsafe { memword::load(addr) };
    tx.values.push(addr, mem_val, u64::MAX);
    let merged = match tx.writes.find(addr) {
        Some(entry) => (mem_val & !entry.mask) | (entry.value & entry.mask),
        None => mem_val,
    };
    Ok(merged & mask)
}

fn write(globals: &Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    if tx.order.is_none() {
        tx.order = Some(1 + globals.tick());
    }
    tx.writes.insert(addr, value, mask);
    Ok(())
}

fn commit(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    let Some(order) = tx.order else {
        tx.status = TxStatus::Committed;
        globals.cm.on_commit(tx);
        return Ok(());
    };
    let len = globals.qnodes.len() as u64;
    let predecessor_slot = &globals.qnodes[((order - 1) % len) as usize];
    while predecessor_slot.load(Ordering::Acquire) != order - 1 {
        thread::yield_now();
    }
    let my_slot = &globals.qnodes[(order % len) as usize];
    if !revalidate_values(tx) {
        my_slot.store(order, Ordering::Release);
        return Err(TmError::Conflict);
    }
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }
    my_slot.store(order, Ordering::Release);
    globals.last_complete.store(order, Ordering::Release);
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
