// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime tunables (spec.md SS6 "Tunables").
//!
//! Mirrors the teacher's `crates/hdds/src/config.rs` shape: a plain struct
//! with a `Default` impl matching upstream's historical constants, plus an
//! optional TOML loader gated behind the `config-file` feature (the
//! teacher's `qos-loaders` equivalent).

#[cfg(feature = "config-file")]
use serde::{Deserialize, Serialize};

/// Process-wide tunables for the STM runtime.
///
/// Constructed once via [`Tunables::default`] (or [`Tunables::load`] with
/// the `config-file` feature) and handed to [`crate::Stm::new`]. Not
/// mutable after a `Stm` is built: orec/bitlock/ring table sizes are baked
/// into the allocated tables at construction time.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct Tunables {
    /// Maximum number of threads that may hold a transaction descriptor.
    /// Bounds the bitlock reader bit-set and the pessimistic `activity[]`
    /// table, so it cannot be resized after construction.
    pub max_threads: usize,
    /// Number of Bloom-filter slots in the ring (RingSW/RingALA).
    pub ring_elements: usize,
    /// Number of orecs in the shared ownership-record table. Rounded up to
    /// a power of two so address-to-orec hashing can mask instead of mod.
    pub orec_table_size: usize,
    /// Number of slots in the bytelock/bitlock table (visible-reader family).
    pub lock_table_size: usize,
    /// Number of slots in the nanorec table (quadratic-validation family).
    pub nano_table_size: usize,
    /// Contention-manager aggressiveness factor consumed by `Fcm`/`Hourglass`
    /// (higher means more patience before a thread is allowed to kill a peer).
    pub karma_factor: u32,
    /// Spin iterations a visible-reader read waits for a conflicting writer
    /// to release before aborting.
    pub read_timeout_spins: u32,
    /// Spin iterations a visible-reader write waits to acquire the lock.
    pub acquire_timeout_spins: u32,
    /// Spin iterations a visible-reader write waits for readers to drain.
    pub drain_timeout_spins: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_threads: 64,
            ring_elements: 1024,
            orec_table_size: 1 << 20,
            lock_table_size: 1 << 16,
            nano_table_size: 64,
            karma_factor: 4,
            read_timeout_spins: 10_000,
            acquire_timeout_spins: 10_000,
            drain_timeout_spins: 100_000,
        }
    }
}

impl Tunables {
    /// Address-to-orec-index shift: orecs cover cache-line-sized (64B)
    /// ranges, so the bottom 6 bits of an address never affect orec choice.
    pub const ADDR_SHIFT: u32 = 6;

    pub fn orec_table_mask(&self) -> usize {
        self.orec_table_size.next_power_of_two() - 1
    }

    pub fn lock_table_mask(&self) -> usize {
        self.lock_table_size.next_power_of_two() - 1
    }
}

#[cfg(feature = "config-file")]
impl Tunables {
    /// Load tunables from a TOML file, falling back to [`Tunables::default`]
    /// for any field the file omits.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::TmError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::error::TmError::Unrecoverable {
                reason: format!("reading config file: {e}"),
            }
        })?;
        toml::from_str(&text).map_err(|e| crate::error::TmError::Unrecoverable {
            reason: format!("parsing config file: {e}"),
        })
    }
}
