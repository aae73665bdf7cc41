// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exponential backoff contention manager (spec.md SS4.10): never kills a
//! peer, spins for longer after each consecutive abort.

use super::ContentionManager;
use crate::core::descriptor::Tx;
use crate::core::fence::spin64;
use crate::core::globals::Globals;

const MAX_SHIFT: u32 = 16;

/// Spins `2^min(consec_aborts, MAX_SHIFT)` times per retry.
pub struct Backoff;

impl ContentionManager for Backoff {
    fn on_abort(&self, tx: &mut Tx) {
        tx.consec_aborts = tx.consec_aborts.saturating_add(1);
        let rounds = 1u32 << tx.consec_aborts.min(MAX_SHIFT);
        for _ in 0..rounds {
            spin64();
        }
    }

    fn on_commit(&self, tx: &mut Tx) {
        tx.consec_aborts = 0;
    }

    fn may_kill(&self, _globals: &Globals, _tx: &Tx, _other_id: u32) -> bool {
        false
    }
}
