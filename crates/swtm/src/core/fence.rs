// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Memory fences and the monotonic tick used by privatization-safe algorithms.
//!
//! Named after the primitives spec.md SS5 requires: `CFENCE` (a
//! compiler/acquire-release fence between a dereference and the orec check
//! that guards it) and `WBR` (a full write-before-read fence used when a
//! writer publishes an orec stamp before making it visible to readers).
//! `tick()` backs the Menon-epoch privatization scheme used by
//! [`crate::algs::nano_ela`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Fence between reading a memory location and reading the orec that guards
/// it. On x86/ARM this is a compiler-only barrier (the two loads cannot be
/// reordered by hardware); expressed here as an `Acquire` fence so the
/// crate's behavior does not depend on target-specific knowledge.
#[inline(always)]
pub fn cfence() {
    std::sync::atomic::fence(Ordering::Acquire);
}

/// Full fence: orders a write (to an orec, or through a redo log) before a
/// subsequent read that another thread depends on for correctness.
#[inline(always)]
pub fn wbr() {
    std::sync::atomic::fence(Ordering::SeqCst);
}

static TICKER: AtomicU64 = AtomicU64::new(1);

/// Monotonic clock used by epoch-coherent privatization schemes.
///
/// Unlike `timestamp` (which only advances on a committing writer),
/// `tick()` advances on every call, so a reader's `last_val_time` snapshot
/// and a committer's epoch stamp are drawn from the same always-moving
/// source, per spec.md SS4.8 / SS4.3 (NanoELA's Menon epoch).
#[inline]
pub fn tick() -> u64 {
    TICKER.fetch_add(1, Ordering::AcqRel)
}

/// Short busy-wait used by bounded spin loops (bytelock drain/acquire,
/// cohort gatekeeper waits). Not backed by a timer; callers supply their own
/// iteration budget (see [`crate::config::Tunables`]).
#[inline(always)]
pub fn spin64() {
    for _ in 0..64 {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_monotonic() {
        let a = tick();
        let b = tick();
        assert!(b > a);
    }
}
