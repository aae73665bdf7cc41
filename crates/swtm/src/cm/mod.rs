// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Contention managers (spec.md SS4.10).
//!
//! A CM is a strategy object with four hooks, installed per-`Stm` rather
//! than per-algorithm: any algorithm that calls into a CM (orec-eager's
//! remote-abort-on-conflict path, the visible-reader EAR variants) takes
//! `&dyn ContentionManager` so swapping managers never requires recompiling
//! the algorithm.

pub mod backoff;
pub mod fcm;
pub mod hourglass;
pub mod hyperaggressive;

pub use backoff::Backoff;
pub use fcm::Fcm;
pub use hourglass::Hourglass;
pub use hyperaggressive::HyperAggressive;

use crate::core::descriptor::Tx;
use crate::core::globals::Globals;

/// Strategy invoked at the four points spec.md SS4.10 names.
pub trait ContentionManager: Send + Sync {
    fn on_begin(&self, _tx: &mut Tx) {}
    fn on_commit(&self, _tx: &mut Tx) {}
    /// Called after a conflict abort, before backoff/retry.
    fn on_abort(&self, _tx: &mut Tx) {}
    /// Decide whether `tx` may force `other_id` to `Aborted`, and if so,
    /// perform it. Returns `true` iff `other_id` was actually killed.
    fn may_kill(&self, globals: &Globals, tx: &Tx, other_id: u32) -> bool;
}
