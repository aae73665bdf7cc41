// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared generic core for the visible-reader family (spec.md SS4.4):
//! `ByteEager`, `BitEager`, `ByteEagerRedo`, `ByEAR`.
//!
//! All four share one protocol -- mark a reader bit/byte before trusting a
//! location is unlocked, CAS an owner field before writing, drain other
//! readers before the write is visible -- differing only in which
//! [`ReaderPresence`] backs the lock table and whether writes land
//! in-place (undo log) or buffered (redo log). [`super::byte_eager`] and
//! [`super::bit_eager`] instantiate the in-place path over
//! [`ByteSet`]/[`BitSet`] respectively; [`super::byte_eager_redo`] and
//! [`super::byear`] build their own barriers on top of these helpers.

use crate::core::descriptor::Tx;
use crate::core::log::AddrLog;
use crate::core::memword;
use crate::core::visible::{LockTable, ReaderPresence, NO_OWNER};
use crate::error::TmError;
use std::thread;

pub fn begin(tx: &mut Tx) {
    tx.reset_logs();
    tx.status = crate::core::descriptor::TxStatus::Active;
    tx.shared.revive();
}

/// Mark a reader bit for `addr`, re-checking the owner afterward (the
/// classic visible-reader handshake: a writer that raced in after our
/// first owner check will see our reader bit and drain for us, or we spin
/// waiting for it to release). Spins up to `read_timeout` iterations
/// before giving up and aborting.
pub fn read<R: ReaderPresence>(
    table: &'static LockTable<R>,
    reader_addrs: &mut AddrLog,
    tx_id: u32,
    addr: usize,
    mask: u64,
    read_timeout: u32,
) -> Result<u64, TmError> {
    let lock = table.get(addr);
    let mut spins = 0;
    loop {
        let owner = lock.owner();
        if owner == NO_OWNER || owner == tx_id {
            lock.mark_reader(tx_id);
            let owner_after = lock.owner();
            if owner_after == NO_OWNER || owner_after == tx_id {
                reader_addrs.push(addr);
                let val = unsafe { memword::load(addr) };
                return Ok(val & mask);
            }
            lock.unmark_reader(tx_id);
        }
        spins += 1;
        if spins >= read_timeout {
            return Err(TmError::Conflict);
        }
        thread::yield_now();
    }
}

/// Acquire the owner slot for `addr` (spinning up to `acquire_timeout`),
/// then drain every other reader (spinning up to `drain_timeout`).
/// Returns `Err(Conflict)` if either timeout expires; any owner slot
/// already claimed is left for `rollback`/`commit` to release.
pub fn acquire_for_write<R: ReaderPresence>(
    table: &'static LockTable<R>,
    writer_addrs: &mut AddrLog,
    tx_id: u32,
    addr: usize,
    acquire_timeout: u32,
    drain_timeout: u32,
) -> Result<(), TmError> {
    let lock = table.get(addr);
    if lock.owner() != tx_id {
        let mut spins = 0;
        while !lock.try_acquire(tx_id) {
            spins += 1;
            if spins >= acquire_timeout {
                return Err(TmError::Conflict);
            }
            thread::yield_now();
        }
        writer_addrs.push(addr);
    }
    let mut spins = 0;
    while lock.has_other_readers(tx_id) {
        spins += 1;
        if spins >= drain_timeout {
            return Err(TmError::Conflict);
        }
        thread::yield_now();
    }
    Ok(())
}

/// Release every reader mark and owner slot this transaction holds, in
/// the visible-reader family's table. Safe to call on both the commit and
/// rollback path since unmarking/releasing an address twice is a no-op.
pub fn release_all<R: ReaderPresence>(
    table: &'static LockTable<R>,
    tx_id: u32,
    reader_addrs: &AddrLog,
    writer_addrs: &AddrLog,
) {
    for addr in reader_addrs.iter() {
        table.get(*addr).unmark_reader(tx_id);
    }
    for addr in writer_addrs.iter() {
        table.get(*addr).release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tunables;
    use crate::core::visible::BitSet;

    fn leaked_table() -> &'static LockTable<BitSet> {
        Box::leak(Box::new(LockTable::<BitSet>::new(&Tunables::default())))
    }

    #[test]
    fn read_marks_and_releases_cleanly() {
        let table = leaked_table();
        let mut reader_addrs = AddrLog::new();
        let cell: u64 = 9;
        let addr = &cell as *const u64 as usize;
        let v = read(table, &mut reader_addrs, 1, addr, u64::MAX, 1000).unwrap();
        assert_eq!(v, 9);
        assert!(table.get(addr).am_reader(1));
        release_all(table, 1, &reader_addrs, &AddrLog::new());
        assert!(!table.get(addr).am_reader(1));
    }

    #[test]
    fn write_drains_after_acquiring() {
        let table = leaked_table();
        let mut writer_addrs = AddrLog::new();
        let cell: u64 = 0;
        let addr = &cell as *const u64 as usize;
        acquire_for_write(table, &mut writer_addrs, 1, addr, 1000, 1000).unwrap();
        assert_eq!(table.get(addr).owner(), 1);
        release_all(table, 1, &AddrLog::new(), &writer_addrs);
        assert_eq!(table.get(addr).owner(), NO_OWNER);
    }

    #[test]
    fn write_times_out_against_a_standing_writer() {
        let table = leaked_table();
        let cell: u64 = 0;
        let addr = &cell as *const u64 as usize;
        table.get(addr).try_acquire(2);
        let mut writer_addrs = AddrLog::new();
        let result = acquire_for_write(table, &mut writer_addrs, 1, addr, 8, 8);
        assert!(result.is_err());
    }
}
