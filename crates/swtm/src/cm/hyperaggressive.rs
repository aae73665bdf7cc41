// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Always-kill contention manager (spec.md SS4.10), scenario 3 of
//! spec.md SS8's literal table (`OrecEager`/`HyperAggressive`).

use super::ContentionManager;
use crate::core::descriptor::Tx;
use crate::core::globals::Globals;

/// Unconditionally kills whatever peer is in the way. Livelock is possible
/// between two mutually-aggressive writers (spec.md SS8 round-trip note);
/// this CM trades that risk for minimum latency under light contention.
pub struct HyperAggressive;

impl ContentionManager for HyperAggressive {
    fn may_kill(&self, globals: &Globals, _tx: &Tx, other_id: u32) -> bool {
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

    #[test]
    fn always_kills_and_marks_dead() {
        let cm = HyperAggressive;
        let globals = Globals::new(&Tunables::default());
        let victim_id = globals.threads.id_for_current_thread().unwrap();
        let tx = Tx::new(
            victim_id + 1,
            ThreadSlot::new(),
            DispatchTuple::inert(),
            Arc::new(NoopAllocatorHook),
        );
        assert!(cm.may_kill(&globals, &tx, victim_id));
        assert!(!globals.threads.slot(victim_id).is_alive());
    }
}
