// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-visible-reader STM with a redo log (spec.md SS4.4, `ByteEagerRedo`).
//!
//! Differs from [`super::byte_eager`] only in where a write lands: the
//! owner slot is still claimed and readers still drained at `write()`
//! time (so a concurrent reader can never observe a half-written value),
//! but the new bytes go into a redo log instead of memory. `commit`
//! writes the whole buffered set back before releasing; `rollback` never
//! touched memory, so it only has locks to release.

use super::visible_reader::{acquire_for_write, begin as visible_begin, read as visible_read, release_all};
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "byte-eager-redo",
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
    if let Some(entry) = tx.writes.find(addr) {
        if entry.mask == u64::MAX {
            return Ok(entry.value & mask);
        }
    }
    let mem_val = visible_read(
        &globals.bytelocks,
        &mut tx.reader_addrs,
        tx.id,
        addr,
        u64::MAX,
        globals.tunables.read_timeout_spins,
    )?;
    let merged = match tx.writes.find(addr) {
        Some(entry) => (mem_val & !entry.mask) | (entry.value & entry.mask),
        None => mem_val,
    };
    Ok(merged & mask)
}

fn write(globals: &'static Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    acquire_for_write(
        &globals.bytelocks,
        &mut tx.writer_addrs,
        tx.id,
        addr,
        globals.tunables.acquire_timeout_spins,
        globals.tunables.drain_timeout_spins,
    )?;
    tx.writes.insert(addr, value, mask);
    Ok(())
}

fn commit(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    for entry in tx.writes.iter() {
        unsafe { memword::store_masked(entry.addr, entry.value, entry.mask) };
    }
    release_all(&globals.bytelocks, tx.id, &tx.reader_addrs, &tx.writer_addrs);
    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &'static Globals, tx: &mut Tx) {
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
    fn memory_untouched_until_commit() {
        let globals = leaked_globals();
        let mut tx = new_tx(1);
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        begin(globals, &mut tx);
        write(globals, &mut tx, addr, 42, u64::MAX).unwrap();
        assert_eq!(cell, 0);
        commit(globals, &mut tx).unwrap();
        assert_eq!(cell, 42);
    }

    #[test]
    fn rollback_leaves_memory_untouched() {
        let globals = leaked_globals();
        let mut tx = new_tx(1);
        let mut cell: u64 = 7;
        let addr = &mut cell as *mut u64 as usize;
        begin(globals, &mut tx);
        write(globals, &mut tx, addr, 99, u64::MAX).unwrap();
        rollback(globals, &mut tx);
        assert_eq!(cell, 7);
    }
}
