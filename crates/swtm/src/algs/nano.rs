// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Quadratic-validation orec STM (spec.md SS4.8, `Nano`).
//!
//! No global clock: a small, heavily-shared orec table backs every
//! address, and each read logs `(orec, version-seen)` then re-validates
//! the *entire* nanorec list so far -- deliberately O(n^2) in read-set
//! size, trading that for needing no timestamp and no doomed-transaction
//! polling. Writes buffer to a redo log; commit acquires every write-set
//! orec, re-validates the nanorec list once more under lock, writes back,
//! and releases each with `p + 1`.

use crate::core::descriptor::{Tx, TxStatus};
use crate::core::globals::Globals;
use crate::core::memword;
use crate::core::orec::is_locked;
use crate::dispatch::DispatchTuple;
use crate::error::TmError;
use std::sync::atomic::Ordering;

pub const DISPATCH: DispatchTuple = DispatchTuple {
    name: "nano",
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
    tx.status = TxStatus::Active;
    tx.shared.revive();
    globals.cm.on_begin(tx);
}

/// Re-check every nanorec logged so far. Quadratic by construction: called
/// after every single read, so logging `n` reads costs `O(n^2)` total.
pub(super) fn validate_nanorecs(tx: &Tx) -> bool {
    tx.nanorecs.iter().all(|nr| {
        let v = nr.orec.v.load(Ordering::Acquire);
        !is_locked(v) && v == nr.version
    })
}

/// Threshold past which a growing nanorec list signals this address set
/// is too hot for Nano's quadratic validation; the adaptivity policy
/// reads `consec_aborts` to decide whether to migrate this thread to a
/// different algorithm (spec.md SS4.8 "self-abort hook").
const SELF_ABORT_SENTINEL: u32 = u32::MAX;

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

pub(super) fn acquire_write_set(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    for entry in tx.writes.iter() {
        let orec = globals.nano_orecs.get(entry.addr);
        let v = orec.v.load(Ordering::Acquire);
        if is_locked(v) || !orec.try_lock(v, tx.my_lock) {
            return Err(TmError::Conflict);
        }
        tx.locks.push(orec);
    }
    Ok(())
}

fn commit(globals: &'static Globals, tx: &mut Tx) -> Result<(), TmError> {
    if tx.writes.is_empty() {
        tx.status = TxStatus::Committed;
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
    fn write_then_commit_releases_with_p_plus_one() {
        let globals = leaked_globals();
        let mut tx = new_tx(1);
        let mut cell: u64 = 0;
        let addr = &mut cell as *mut u64 as usize;
        begin(globals, &mut tx);
        write(globals, &mut tx, addr, 44, u64::MAX).unwrap();
        commit(globals, &mut tx).unwrap();
        assert_eq!(cell, 44);
        let orec = globals.nano_orecs.get(addr);
        assert_eq!(orec.v.load(Ordering::Acquire), 1);
    }

    #[test]
    fn read_validates_whole_nanorec_list_each_time() {
        let globals = leaked_globals();
        let mut tx = new_tx(1);
        let mut a: u64 = 1;
        let mut b: u64 = 2;
        let addr_a = &mut a as *mut u64 as usize;
        let addr_b = &mut b as *mut u64 as usize;
        begin(globals, &mut tx);
        assert_eq!(read(globals, &mut tx, addr_a, u64::MAX).unwrap(), 1);
        assert_eq!(read(globals, &mut tx, addr_b, u64::MAX).unwrap(), 2);
        assert_eq!(tx.nanorecs.iter().count(), 2);
    }
}
