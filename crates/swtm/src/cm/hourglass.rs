// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hourglass contention manager (spec.md SS4.10): at most one transaction
//! process-wide may hold "hourglass" killing rights at a time, bounded by
//! a single global token.

use super::ContentionManager;
use crate::core::descriptor::Tx;
use crate::core::globals::Globals;
use std::sync::atomic::{AtomicU32, Ordering};

const NO_HOLDER: u32 = 0;

/// Only the current token holder may kill; a transaction claims the token
/// on its first abort and releases it on commit.
pub struct Hourglass {
    holder: AtomicU32,
}

impl Hourglass {
    pub fn new() -> Self {
        Self {
            holder: AtomicU32::new(NO_HOLDER),
        }
    }

    fn try_claim(&self, id: u32) -> bool {
        self.holder
            .compare_exchange(NO_HOLDER, id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn holds(&self, id: u32) -> bool {
        self.holder.load(Ordering::Acquire) == id
    }

    fn release(&self, id: u32) {
        let _ = self
            .holder
            .compare_exchange(id, NO_HOLDER, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl Default for Hourglass {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentionManager for Hourglass {
    fn on_abort(&self, tx: &mut Tx) {
        tx.consec_aborts = tx.consec_aborts.saturating_add(1);
        let _ = self.try_claim(tx.id);
    }

    fn on_commit(&self, tx: &mut Tx) {
        tx.consec_aborts = 0;
        self.release(tx.id);
    }

    fn may_kill(&self, globals: &Globals, tx: &Tx, other_id: u32) -> bool {
        if !self.holds(tx.id) {
            return false;
        }
        globals.threads.slot(other_id).kill();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc_hook::NoopAllocatorHook;
    use crate::config::Tunables;
    use crate::core::registry::ThreadSlot;
    use crate::dispatch::DispatchTuple;
    use std::sync::Arc;

    fn tx(id: u32) -> Tx {
        Tx::new(id, ThreadSlot::new(), DispatchTuple::inert(), Arc::new(NoopAllocatorHook))
    }

    #[test]
    fn only_token_holder_may_kill() {
        let cm = Hourglass::new();
        let globals = Globals::new(&Tunables::default());
        let victim = globals.threads.id_for_current_thread().unwrap();

        let mut holder = tx(1);
        let mut other = tx(2);

        cm.on_abort(&mut holder);
        assert!(cm.may_kill(&globals, &holder, victim));
        assert!(!cm.may_kill(&globals, &other, victim));

        cm.on_commit(&mut holder);
        cm.on_abort(&mut other);
        assert!(cm.may_kill(&globals, &other, victim));
    }
}
