// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Algorithm variants (spec.md SS2, SS4.2-SS4.9), each exposing one
//! `pub const DISPATCH: DispatchTuple` plus the functions it bundles.
//!
//! Families share a generic core where the source shares one (visible-
//! reader's `ReaderPresence`, ring's `Ring`); otherwise each variant is its
//! own small module, matching the teacher's one-file-per-concern layout.

pub mod bit_eager;
pub mod byear;
pub mod byte_eager;
pub mod byte_eager_redo;
pub mod cohorts;
pub mod cohorts_li;
pub mod ctoken;
pub mod ctoken_q;
pub mod nano;
pub mod nano_ela;
pub mod orec_eager;
pub mod orec_ela;
pub mod orec_lazy;
pub mod pessimistic;
pub mod ring_ala;
pub mod ring_sw;
pub mod visible_reader;

use crate::dispatch::DispatchTuple;

/// Every shipped algorithm's dispatch tuple, in the order spec.md SS2
/// lists them. [`crate::Stm::new`] registers each of these and installs
/// `orec_eager::DISPATCH` as the default.
pub fn all() -> [DispatchTuple; 16] {
    [
        orec_eager::DISPATCH,
        orec_lazy::DISPATCH,
        orec_ela::DISPATCH,
        byte_eager::DISPATCH,
        bit_eager::DISPATCH,
        byte_eager_redo::DISPATCH,
        byear::DISPATCH,
        ring_sw::DISPATCH,
        ring_ala::DISPATCH,
        cohorts::DISPATCH,
        cohorts_li::DISPATCH,
        ctoken::DISPATCH,
        ctoken_q::DISPATCH,
        nano::DISPATCH,
        nano_ela::DISPATCH,
        pessimistic::DISPATCH,
    ]
}
