// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer-serialized STM (spec.md SS4.9, `Pessimistic`).
//!
//! Readers carry no per-access instrumentation: `begin` snapshots the
//! global version and publishes it into `activity[]`, then every `read`
//! is a plain load. A committing writer takes `writer_lock` to serialize
//! against other writers, flips `global_version` from even (quiescent) to
//! odd (writer active) with a CAS against its own snapshot, waits for
//! every thread whose published `activity[]` entry is still `<=` that
//! snapshot to finish (so no reader can observe a half-written value),
//! writes back in place, and returns `global_version` to even.

use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::{Globals, PessimisticState};
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;
use std::thread;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "pessimistic",
    begin,
    read,
    write,
    commit,
    rollback,
    irrevoc,
    on_switch,
    privatization_safe: true,
};

fn activity_slot(globals: &Globals, tx_id: u32) -> &std::sync::atomic::AtomicU64 {
    &globals.pessimistic.activity[(tx_id - 1) as usize]
}

fn begin(globals: &Globals, tx: &mut Tx) {
    tx.reset_logs();
    tx.status = TxStatus::Active;
    tx.shared.revive();
    let slot = activity_slot(globals, tx.id);
    loop {
        let v = globals.pessimistic.global_version.load(Ordering::Acquire);
        if v % 2 == 0 {
            slot.store(v, Ordering::Release);
            // A writer may have started between the load above and the
            // publish; re-check before trusting the snapshot.
            if globals.pessimistic.global_version.load(Ordering::Acquire) == v {
                tx.ts_cache = v;
                break;
            }
        }
        thread::yield_now();
    }
    globals.cm.on_begin(tx);
}

fn read(_globals: &Globals, tx: &mut Tx, addr: usize, mask: u64) -> Result<u64, TmError> {
    if let Some(entry) = tx.writes.find(addr) {
        if entry.mask == u64::MAX {
            return Ok(entry.value & mask);
        }
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
    Ok(())
}

/// Wait for every other registered, live thread still reading at or
/// before `version` to vacate before a writer touches memory.
fn quiesce_readers(globals: &Globals, writer_id: u32, version: u64) {
    let count = globals.threads.thread_count() as u32;
    for id in 1..=count {
        if id == writer_id {
            continue;
        }
        let slot = globals.threads.slot(id);
        let activity = activity_slot(globals, id);
        while slot.is_alive() && activity.load(Ordering::Acquire) <= version {
            thread::yield_now();
        }
    }
}

fn commit(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    let own_slot = activity_slot(globals, tx.id);
    if tx.writes.is_empty() {
        own_slot.store(PessimisticState::IDLE, Ordering::Release);
        tx.status = TxStatus::Committed;
        globals.cm.on_commit(tx);
        return Ok(());
    }

    while globals
        .pessimistic
        .writer_lock
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        thread::yield_now();
    }

    let start = tx.ts_cache;
    if globals.pessimistic.global_version.load(Ordering::Acquire) != start
        || globals
            .pessimistic
            .global_version
            .compare_exchange(start, start + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
    {
        globals.pessimistic.writer_lock.store(false, Ordering::Release);
        own_slot.store(PessimisticState::IDLE, Ordering::Release);
        return Err(TmError::Conflict);
    }

    quiesce_readers(globals, tx.id, start);

    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }

    globals
        .pessimistic
        .global_version
        .store(start + 2, Ordering::Release);
    globals.pessimistic.writer_lock.store(false, Ordering::Release);
    own_slot.store(PessimisticState::IDLE, Ordering::Release);

    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &Globals, tx: &mut Tx) {
    activity_slot(globals, tx.id).store(PessimisticState::IDLE, Ordering::Release);
    tx.status = TxStatus::Aborted;
    globals.cm.on_abort(tx);
}

fn irrevoc(_globals: &Globals, _tx: &mut Tx) -> bool {
    false
}

fn on_switch(_globals: &Globals) {}
