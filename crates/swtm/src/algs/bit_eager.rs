// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bit-visible-reader, in-place writer STM (spec.md SS4.4, `BitEager`).
//!
//! Identical protocol to [`super::byte_eager`], but reader presence is one
//! bit in a shared word ([`crate::core::visible::BitlockTable`]) rather
//! than one byte per thread -- cheaper to test and clear, capped at 64
//! concurrent threads (spec.md SS3.2).

use super::visible_reader::{acquire_for_write, begin as visible_begin, read as visible_read, release_all};
use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "bit-eager",
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
        &globals.bitlocks,
        &mut tx.reader_addrs,
        tx.id,
        addr,
        mask,
        globals.tunables.read_timeout_spins,
    )
}

fn write(globals: &'static Globals, tx: &mut Tx, addr: usize, value: u64, mask: u64) -> Result<(), TmError> {
    acquire_for_write(
        &globals.bitlocks,
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
    release_all(&globals.bitlocks, tx.id, &tx.reader_addrs, &tx.writer_addrs);
    tx.status = TxStatus::Committed;
    globals.cm.on_commit(tx);
    Ok(())
}

fn rollback(globals: &'static Globals, tx: &mut Tx) {
    for entry in tx.undo.iter_rev() {
        unsafe { memword::store_masked(entry.addr, entry.old_value, entry.mask) };
    }
    release_all(&globals.bitlocks, tx.id, &tx.reader_addrs, &tx.writer_addrs);
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
    fn second_writer_times_out_while_first_holds_owner() {
        let globals = leaked_globals();
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        let mut t1 = new_tx(1);
        begin(globals, &mut t1);
        write(globals, &mut t1, addr, 1, u64::MAX).unwrap();

        let mut t2 = new_tx(2);
        begin(globals, &mut t2);
        let result = write(globals, &mut t2, addr, 2, u64::MAX);
        assert!(result.is_err());
    }

    #[test]
    fn commit_releases_owner_for_next_writer() {
        let globals = leaked_globals();
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        let mut t1 = new_tx(1);
        begin(globals, &mut t1);
        write(globals, &mut t1, addr, 1, u64::MAX).unwrap();
        commit(globals, &mut t1).unwrap();

        let mut t2 = new_tx(2);
        begin(globals, &mut t2);
        assert!(write(globals, &mut t2, addr, 2, u64::MAX).is_ok());
    }
}
