// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread registration: stable per-thread ids and the shared `alive` cells
//! a peer needs to remote-abort a victim (spec.md SS3.4 `threads[]`, SS6).
//!
//! Ids are assigned once per OS thread, 1-based (`0` is reserved as the
//! "no owner" sentinel used by [`super::orec`] and [`super::visible`]),
//! and never reused: a thread that registers, runs transactions, and
//! exits leaves its slot retired rather than handed to the next caller,
//! so a remote reader can always tell a stale id from a reused one.

use crate::config::Tunables;
use crate::error::TmError;
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

thread_local! {
    static MY_ID: Cell<u32> = const { Cell::new(0) };
}

/// Per-thread state visible to other threads: whether the owner is still
/// alive (remote-abort target) and its last successful validation time
/// (used by `OrecEla`/ELA-style early abort checks).
pub struct ThreadSlot {
    alive: AtomicBool,
    last_val_time: AtomicU64,
}

impl ThreadSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            last_val_time: AtomicU64::new(0),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark this thread's current transaction as killed. Called by a
    /// contention manager that won the right to abort a peer.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Called by the owner at the start of each `begin()` to clear a kill
    /// left over from the previous attempt.
    pub fn revive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    pub fn last_val_time(&self) -> u64 {
        self.last_val_time.load(Ordering::Acquire)
    }

    pub fn set_last_val_time(&self, t: u64) {
        self.last_val_time.store(t, Ordering::Release);
    }
}

/// Process-wide table mapping thread id to [`ThreadSlot`].
///
/// One registry is expected per [`crate::Stm`] (normally one per process,
/// reached through `Globals`'s `OnceLock`); the thread-local cached id is
/// not itself tied to a particular registry, so constructing more than one
/// `Stm` in the same process would share id assignment across them. That
/// is an accepted limitation, matching spec.md SS3.4's single global
/// `threads[]` table.
pub struct ThreadRegistry {
    next_id: AtomicU32,
    max_threads: usize,
    slots: Mutex<Vec<Arc<ThreadSlot>>>,
}

impl ThreadRegistry {
    pub fn new(tunables: &Tunables) -> Self {
        Self {
            next_id: AtomicU32::new(1),
            max_threads: tunables.max_threads,
            slots: Mutex::new(Vec::with_capacity(tunables.max_threads)),
        }
    }

    /// Return this OS thread's stable id, registering it on first call.
    pub fn id_for_current_thread(&self) -> Result<u32, TmError> {
        let cached = MY_ID.with(Cell::get);
        if cached != 0 {
            return Ok(cached);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id as usize > self.max_threads {
            return Err(TmError::Unrecoverable {
                reason: format!(
                    "thread registry exhausted: max_threads={} but thread {} registered",
                    self.max_threads, id
                ),
            });
        }
        let mut slots = self.slots.lock();
        debug_assert_eq!(slots.len() as u32, id - 1);
        slots.push(ThreadSlot::new());
        MY_ID.with(|c| c.set(id));
        Ok(id)
    }

    pub fn thread_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn slot(&self, id: u32) -> Arc<ThreadSlot> {
        Arc::clone(&self.slots.lock()[id as usize - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn current_thread_gets_stable_id() {
        let reg = ThreadRegistry::new(&Tunables::default());
        let a = reg.id_for_current_thread().unwrap();
        let b = reg.id_for_current_thread().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_threads_get_distinct_ids() {
        let reg = Arc::new(ThreadRegistry::new(&Tunables::default()));
        let r2 = Arc::clone(&reg);
        let main_id = reg.id_for_current_thread().unwrap();
        let other_id = thread::spawn(move || r2.id_for_current_thread().unwrap())
            .join()
            .unwrap();
        assert_ne!(main_id, other_id);
        assert_eq!(reg.thread_count(), 2);
    }

    #[test]
    fn kill_and_revive_round_trip() {
        let reg = ThreadRegistry::new(&Tunables::default());
        let id = reg.id_for_current_thread().unwrap();
        let slot = reg.slot(id);
        assert!(slot.is_alive());
        slot.kill();
        assert!(!slot.is_alive());
        slot.revive();
        assert!(slot.is_alive());
    }

    #[test]
    fn registry_exhaustion_is_an_error() {
        let reg = Arc::new(ThreadRegistry::new(&Tunables {
            max_threads: 1,
            ..Tunables::default()
        }));
        reg.id_for_current_thread().unwrap();
        let r2 = Arc::clone(&reg);
        // A distinct OS thread has a fresh thread_local, so it always
        // attempts fresh registration and hits the capacity check.
        let result = thread::spawn(move || r2.id_for_current_thread())
            .join()
            .unwrap();
        assert!(result.is_err());
    }
}
