// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cohort STM with an in-place turbo fast path (spec.md SS4.6,
//! `CohortsLI`).
//!
//! Identical to [`super::cohorts`] until exactly one writer remains in
//! the cohort (`started - committed == 1`): that sole survivor can never
//! race another cohort member, so it flips into turbo mode and writes
//! directly to memory, un-logged, skipping the redo-log buffering and the
//! bloom-filter validation the general path needs.

use super::cohorts::{commit_rw, drain_if_last, join_cohort};
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "cohorts-li",
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
    join_cohort(globals);
    tx.reset_logs();
    tx.ts_cache = globals.cohorts.last_order.load(Ordering::Acquire) as u64;
    tx.status = TxStatus::Active;
    tx.shared.revive();
    globals.cm.on_begin(tx);
}

fn read(_globals: &Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    if tx.turbo {
        let val = unsafe { memword::load(addr) };
        return Ok(val & mask);
    }
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

/// Flicker protocol: claim turbo, then re-check that no later transaction
/// joined the cohort in the gap; if one did, stay in the buffered path
/// rather than risk an un-logged store racing a concurrent reader.
fn maybe_go_turbo(globals: &Globals, tx: &mut Tx) {
    if tx.turbo {
        return;
    }
    let solo = globals
        .cohorts
        .started
        .load(Ordering::Acquire)
        .saturating_sub(globals.cohorts.committed.load(Ordering::Acquire))
        == 1;
    if !solo {
        return;
    }
    let still_solo = globals
        .cohorts
        .started
        .load(Ordering::Acquire)
        .saturating_sub(globals.cohorts.committed.load(Ordering::Acquire))
        == 1;
    if still_solo {
        tx.turbo = true;
        for entry in tx.writes.iter() {
            unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
        }
        tx.writes.clear();
    }
}

fn write(globals: &Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    maybe_go_turbo(globals, tx);
    if tx.turbo {
        unsafe { memword::store_masked(addr, value, mask) };
    } else {
        tx.writes.insert(addr, value, mask);
    }
    tx.write_filter.insert(addr);
    Ok(())
}

fn commit(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.turbo {
        let order = globals.cohorts.cpending.fetch_add(1, Ordering::AcqRel) as i64 + 1;
        globals.cohorts.last_order.store(order, Ordering::Release);
        globals.global_filter.lock().union_from(&tx.write_filter);
        globals.cohorts.committed.fetch_add(1, Ordering::AcqRel);
        drain_if_last(globals);
        tx.status = TxStatus::Committed;
        globals.cm.on_commit(tx);
        return Ok(());
    }
    if tx.writes.is_empty() {
        globals.cohorts.started.fetch_sub(1, Ordering::AcqRel);
        drain_if_last(globals);
        tx.status = TxStatus::Committed;
        globals.cm.on_commit(tx);
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
