// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Privatization / quiescence helpers shared by the privatization-safe
//! algorithm variants (spec.md SS4.11): `OrecEla`, `RingAla`, `NanoEla`,
//! `Pessimistic`.
//!
//! Two distinct mechanisms live here because the algorithms use both:
//! *doomed-transaction* revalidation (spec.md SS4.3's "readers poll
//! `timestamp` vs. `ts_cache`") for readers, and *epoch quiescence*
//! (spec.md SS4.8's Menon epoch) for writers publishing a privatizing
//! commit.

use super::descriptor::Tx;
use super::globals::Globals;
use super::orec::{is_locked, owner_id};
use crate::error::TmError;
use std::sync::atomic::Ordering;
use std::thread;

/// Re-check every orec in `tx`'s read log against `tx.start_time` iff the
/// global clock has advanced since the last check. Returns `Err(Conflict)`
/// the moment a read orec is found locked by someone else, or stamped with
/// a version newer than `start_time` -- the transaction is "doomed" and
/// must abort rather than be allowed to keep reading stale-but-consistent
/// state (spec.md SS4.3 "doomed transaction prevention").
pub fn revalidate_on_clock_change(globals: &Globals, tx: &mut Tx) -> Result<(), TmError> {
    let ts = globals.now();
    if ts == tx.ts_cache {
        return Ok(());
    }
    for orec in tx.reads.iter() {
        let v = orec.v.load(Ordering::Acquire);
        if is_locked(v) {
            if owner_id(v) != tx.id {
                return Err(TmError::Conflict);
            }
        } else if v > tx.start_time {
            return Err(TmError::Conflict);
        }
    }
    tx.ts_cache = ts;
    Ok(())
}

/// Block until every registered thread other than `committer_id` has
/// observed validation time `>= target` (Menon epoch quiescence, spec.md
/// SS4.8 NanoEla / SS4.3 OrecEla). Called once per privatizing commit,
/// after that commit's writes are already visible, so a thread with a
/// stale epoch is guaranteed to revalidate (and abort, if it raced) before
/// touching the privatized object.
pub fn quiesce(globals: &Globals, committer_id: u32, target: u64) {
    let count = globals.threads.thread_count() as u32;
    for id in 1..=count {
        if id == committer_id {
            continue;
        }
        let slot = globals.threads.slot(id);
        while slot.is_alive() && slot.last_val_time() < target {
            thread::yield_now();
        }
    }
}
