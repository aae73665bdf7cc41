// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-visible-reader, in-place writer STM (spec.md SS4.4, `ByteEager`).
//!
//! Readers announce themselves in a per-address byte (scales past 64
//! threads, unlike [`super::bit_eager`]); writers CAS the owner slot, drain
//! readers, then write in place with an undo log, same as `OrecEager`'s
//! write barrier but keyed by [`crate::core::visible::BytelockTable`]
//! instead of an orec.

use super::visible_reader::{acquire_for_write, begin as visible_begin, read as visible_read, release_all};
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "byte-eager",
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
    if tx.writer_addrs.iter().any(|a| *a == addr) {
        let val = unsafe { memword::load(addr) };
        return Ok(val & mask);
    }
    visible_read(
        &globals.bytelocks,
        &mut tx.reader_addrs,
        tx.id,
        addr,
        mask,
        globals.tunables.read_timeout_spins,
    )
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
    let old_word = unsafe { memword::load(addr) };
    tx.undo.push(addr, old_word, mask);
    unsafe { memword::store_masked(addr, value, mask) };
    Ok(())
}

fn commit(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    release_all(&globals.bytelocks, tx.id, &tx.reader_addrs, &tx.writer_addrs);
    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &'static Globals, tx: &mut Tx) {
    for entry in tx.undo.iter_rev() {
        unsafe { memword::store_masked(entry.addr, entry.old_value, entry.mask) };
    }
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
    fn write_then_read_sees_own_write_without_remarking() {
        let globals = leaked_globals();
        let mut tx = new_tx(1);
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        begin(globals, &mut tx);
        write(globals, &mut tx, addr, 5, u64::MAX).unwrap();
        let seen = read(globals, &mut tx, addr, u64::MAX).unwrap();
        assert_eq!(seen, 5);
        commit(globals, &mut tx).unwrap();
        assert_eq!(cell, 5);
    }

    #[test]
    fn rollback_restores_prior_value_and_releases_owner() {
        let globals = leaked_globals();
        let mut tx = new_tx(1);
        let mut cell: u64 = 3;
        let addr = &mut cell as *mut u64 as usize;
        begin(globals, &mut tx);
        write(globals, &mut tx, addr, 100, u64::MAX).unwrap();
        rollback(globals, &mut tx);
        assert_eq!(cell, 3);
        assert_eq!(globals.bytelocks.get(addr).owner(), crate::core::visible::NO_OWNER);
    }
}
