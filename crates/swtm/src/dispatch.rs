// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch tuples and the algorithm registry (spec.md SS4.1).
//!
//! Every algorithm family in `src/algs/` exposes one `DispatchTuple`: a
//! plain bundle of function pointers, no `dyn` indirection. A transaction
//! caches the tuple active at its `begin()` in [`crate::core::descriptor::Tx`]
//! so an algorithm switch installed mid-transaction by another thread is
//! never observed -- spec.md SS4.1's "a running transaction... is not
//! observed to change mid-transaction". Switching itself is gated behind
//! a serialization barrier ([`AlgorithmTable::switch_to`]) that only the
//! owner of an `Stm` (never a transaction) may call.

use crate::core::descriptor::Tx;
use crate::core::globals::Globals;
use crate::error::TmError;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

// Every algorithm's metadata (orecs, bitlocks, the ring...) lives in one
// `Globals` that a process leaks once at `Stm::new` time and never frees
// (spec.md SS3.1 "no dynamic allocation"), so dispatch functions take a
// `&'static Globals` rather than an arbitrarily-scoped borrow: that lets
// `read()`/`write()` stash `&'static Orec` references straight into a
// transaction's read/lock logs without an unsafe lifetime cast.
pub type BeginFn = fn(&'static Globals, &mut Tx);
pub type ReadFn = fn(&'static Globals, &mut Tx, usize, u64) -> Result<u64, TmError>;
pub type WriteFn = fn(&'static Globals, &mut Tx, usize, u64, u64) -> Result<(), TmError>;
pub type CommitFn = fn(&'static Globals, &mut Tx) -> Result<(), TmError>;
pub type RollbackFn = fn(&'static Globals, &mut Tx);
pub type IrrevocFn = fn(&'static Globals, &mut Tx) -> bool;
pub type OnSwitchFn = fn(&'static Globals);

/// One algorithm's complete barrier set (spec.md SS4.1).
///
/// `read`/`write` take a byte `mask` selecting which bytes of the 64-bit
/// `value`/return are meaningful, so sub-word transactional stores don't
/// need a separate narrow-width entry point.
#[derive(Clone, Copy)]
pub struct DispatchTuple {
    pub name: &'static str,
    pub begin: BeginFn,
    pub read: ReadFn,
    pub write: WriteFn,
    pub commit: CommitFn,
    pub rollback: RollbackFn,
    pub irrevoc: IrrevocFn,
    pub on_switch: OnSwitchFn,
    /// `true` if this algorithm gives readers Transactional Sequential
    /// Consistency across privatizing transactions without an extra
    /// fence (OrecEla/RingAla/NanoEla); spec.md SS4.3.
    pub privatization_safe: bool,
}

fn inert_begin(_: &Globals, _: &mut Tx) {}
fn inert_read(_: &Globals, _: &mut Tx, _: usize, _: u64) -> Result<u64, TmError> {
    Err(TmError::Unrecoverable {
        reason: "read() called with no algorithm installed".into(),
    })
}
fn inert_write(_: &Globals, _: &mut Tx, _: usize, _: u64, _: u64) -> Result<(), TmError> {
    Err(TmError::Unrecoverable {
        reason: "write() called with no algorithm installed".into(),
    })
}
fn inert_commit(_: &Globals, _: &mut Tx) -> Result<(), TmError> {
    Ok(())
}
fn inert_rollback(_: &Globals, _: &mut Tx) {}
fn inert_irrevoc(_: &Globals, _: &mut Tx) -> bool {
    false
}
fn inert_on_switch(_: &Globals) {}

impl DispatchTuple {
    /// Placeholder tuple that performs no transactional work. Used as the
    /// `Stm`-less default in tests and before the first algorithm install.
    pub const fn inert() -> Self {
        Self {
            name: "inert",
            begin: inert_begin,
            read: inert_read,
            write: inert_write,
            commit: inert_commit,
            rollback: inert_rollback,
            irrevoc: inert_irrevoc,
            on_switch: inert_on_switch,
            privatization_safe: false,
        }
    }
}

/// Registry of named algorithms plus the one currently installed
/// (spec.md SS4.1 "install/switch").
pub struct AlgorithmTable {
    named: HashMap<&'static str, DispatchTuple>,
    installed: ArcSwap<DispatchTuple>,
}

impl AlgorithmTable {
    pub fn new() -> Self {
        Self {
            named: HashMap::new(),
            installed: ArcSwap::from_pointee(DispatchTuple::inert()),
        }
    }

    pub fn register(&mut self, tuple: DispatchTuple) {
        self.named.insert(tuple.name, tuple);
    }

    pub fn install_default(&mut self, name: &'static str) {
        if let Some(tuple) = self.named.get(name) {
            self.installed.store(Arc::new(*tuple));
        }
    }

    /// Current dispatch tuple, to be snapshotted into a transaction's
    /// descriptor at `begin()`.
    pub fn current(&self) -> DispatchTuple {
        **self.installed.load()
    }

    /// Install `name` as the active algorithm. Callers must guarantee no
    /// transaction is in flight (spec.md SS4.1 serialization barrier) --
    /// `Stm` enforces this by requiring `&mut self` through an exclusive
    /// borrow of the facade, which cannot coexist with an outstanding
    /// `Tx` handle.
    pub fn switch_to(&mut self, globals: &'static Globals, name: &str) -> Result<(), TmError> {
        let tuple = *self.named.get(name).ok_or_else(|| TmError::Unrecoverable {
            reason: format!("unknown algorithm: {name}"),
        })?;
        (tuple.on_switch)(globals);
        self.installed.store(Arc::new(tuple));
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &&'static str> {
        self.named.keys()
    }
}

impl Default for AlgorithmTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_tuple_read_errors() {
        let globals: &'static Globals =
            Box::leak(Box::new(Globals::new(&crate::config::Tunables::default())));
        let dispatch = DispatchTuple::inert();
        let mut tx = Tx::new(
            1,
            crate::core::registry::ThreadSlot::new(),
            dispatch,
            Arc::new(crate::alloc_hook::NoopAllocatorHook),
        );
        let result = (dispatch.read)(globals, &mut tx, 0, u64::MAX);
        assert!(result.is_err());
    }

    #[test]
    fn register_and_install_round_trip() {
        let mut table = AlgorithmTable::new();
        let tuple = DispatchTuple {
            name: "test-algo",
            ..DispatchTuple::inert()
        };
        table.register(tuple);
        table.install_default("test-algo");
        assert_eq!(table.current().name, "test-algo");
    }

    #[test]
    fn switch_to_unknown_algorithm_errors() {
        let mut table = AlgorithmTable::new();
        let globals: &'static Globals =
            Box::leak(Box::new(Globals::new(&crate::config::Tunables::default())));
        assert!(table.switch_to(globals, "does-not-exist").is_err());
    }
}
