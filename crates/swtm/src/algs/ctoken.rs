// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Commit-token STM (spec.md SS4.7, `CTokenNOrec`).
//!
//! No per-location metadata: a writer claims a monotone commit order on
//! its first write, waits for its predecessor's order to publish, value-
//! validates its read set against current memory, writes back its redo
//! log, then publishes its own order. Readers buffer the values they see
//! rather than locking anything, so reads never block a concurrent
//! writer.

use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;
use std::thread;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "ctoken",
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

/// `true` if every value this transaction observed during `read()` still
/// matches current memory.
pub(super) fn revalidate_values(tx: &Tx) -> bool {
    tx.values
        .iter()
        .all(|entry| unsafe { memword::load(entry.addr) } == entry.value)
}

fn commit(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    let Some(order) = tx.order else {
        tx.status = TxStatus::Committed;
        globals.cm.on_commit(tx);
        return Ok(());
    };
    while globals.last_complete.load(Ordering::Acquire) != order - 1 {
        thread::yield_now();
    }
    if !revalidate_values(tx) {
        // Publish anyway: this writer claimed `order` and a later writer
        // may already be spinning on it, so the order must advance even
        // on abort to avoid deadlocking the queue.
        globals.last_complete.store(order, Ordering::Release);
        return Err(TmError::Conflict);
    }
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc_hook::NoopAllocatorHook;
    use crate::config::Tunables;
    use crate::core::registry::ThreadSlot;
    use std::sync::Arc;

    fn new_tx(id: u32) -> Tx {
        Tx::new(id, ThreadSlot::new(), DISPATCH, Arc::new(NoopAllocatorHook))
    }

    #[test]
    fn first_writer_claims_order_one_and_commits() {
        let globals = Globals::new(&Tunables::default());
        let mut tx = new_tx(1);
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        begin(&globals, &mut tx);
        write(&globals, &mut tx, addr, 6, u64::MAX).unwrap();
        assert_eq!(tx.order, Some(1));
        commit(&globals, &mut tx).unwrap();
        assert_eq!(cell, 6);
        assert_eq!(globals.last_complete.load(Ordering::Acquire), 1);
    }

    #[test]
    fn stale_read_fails_revalidation() {
        let globals = Globals::new(&Tunables::default());
        let mut cell: u64 = 1;
        let addr = &mut cell as *mut u64 as usize;

        let mut reader = new_tx(1);
        begin(&globals, &mut reader);
        let _ = read(&globals, &mut reader, addr, u64::MAX).unwrap();

        let mut writer = new_tx(2);
        begin(&globals, &mut writer);
        write(&globals, &mut writer, addr, 2, u64::MAX).unwrap();
        commit(&globals, &mut writer).unwrap();

        assert!(!revalidate_values(&reader));
    }
}
