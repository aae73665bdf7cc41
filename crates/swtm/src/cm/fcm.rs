// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fair contention manager (spec.md SS4.10): priority accrues with each
//! consecutive abort, and only a strictly-higher-priority transaction may
//! kill a peer, bounding how long any one transaction can be starved.

use super::ContentionManager;
use crate::config::Tunables;
use crate::core::descriptor::Tx;
use crate::core::globals::Globals;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct Fcm {
    priority: Box<[AtomicU32]>,
}

impl Fcm {
    pub fn new(tunables: &Tunables) -> Self {
        let mut v = Vec::with_capacity(tunables.max_threads);
        v.resize_with(tunables.max_threads, || AtomicU32::new(0));
        Self {
            priority: v.into_boxed_slice(),
        }
    }

    fn get(&self, id: u32) -> u32 {
        self.priority[id as usize - 1].load(Ordering::Acquire)
    }
}

impl ContentionManager for Fcm {
    fn on_begin(&self, tx: &mut Tx) {
        self.priority[tx.id as usize - 1].store(tx.consec_aborts, Ordering::Release);
    }

    fn on_abort(&self, tx: &mut Tx) {
        tx.consec_aborts = tx.consec_aborts.saturating_add(1);
        self.priority[tx.id as usize - 1].store(tx.consec_aborts, Ordering::Release);
    }

    fn on_commit(&self, tx: &mut Tx) {
        tx.consec_aborts = 0;
        self.priority[tx.id as usize - 1].store(0, Ordering::Release);
    }

    fn may_kill(&self, globals: &Globals, tx: &Tx, other_id: u32) -> bool {
        if self.get(tx.id) <= self.get(other_id) {
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
    use crate::core::registry::ThreadSlot;
    use crate::dispatch::DispatchTuple;
    use std::sync::Arc;

    fn tx(id: u32) -> Tx {
        Tx::new(id, ThreadSlot::new(), DispatchTuple::inert(), Arc::new(NoopAllocatorHook))
    }

    #[test]
    fn higher_priority_wins() {
        let tunables = Tunables::default();
        let cm = Fcm::new(&tunables);
        let globals = Globals::new(&tunables);
        // Register two real thread ids so `may_kill`'s slot() lookup is valid.
        let id_a = globals.threads.id_for_current_thread().unwrap();
        let id_b = std::thread::scope(|s| {
            s.spawn(|| globals.threads.id_for_current_thread().unwrap())
                .join()
                .unwrap()
        });

        let mut low = tx(id_a);
        let mut high = tx(id_b);
        cm.on_abort(&mut low);
        cm.on_abort(&mut high);
        cm.on_abort(&mut high);

        assert!(!cm.may_kill(&globals, &low, id_b));
        assert!(cm.may_kill(&globals, &high, id_a));
    }
}
