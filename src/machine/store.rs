//! Per-robot mutable store of memory cells.
//!
//! Cells hold either a value, a suspended term waiting to be forced, or a
//! black hole marking a cell whose computation is in progress. Addresses
//! are handed out monotonically and never reused. Cells nothing refers to
//! any more can be dropped with [`Store::retain_reachable`]; the addresses
//! of the remaining cells do not change.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::lang::Term;
use crate::machine::value::relocate_env;
use crate::machine::{Env, Value};

/// Address of a store cell.
pub type Addr = usize;

/// Contents of one store cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// An evaluated value.
    Value(Value),
    /// A term to evaluate on first use.
    Delayed {
        /// Suspended term.
        term: Arc<Term>,
        /// Environment the term is closed over.
        env: Env,
    },
    /// Being computed right now; demanding it again is a loop.
    Forcing,
}

impl Slot {
    fn addresses(&self, out: &mut Vec<Addr>) {
        match self {
            Slot::Value(v) => v.addresses(out),
            Slot::Delayed { env, .. } => out.extend(env.values().copied()),
            Slot::Forcing => {}
        }
    }

    fn relocate(&self, map: &BTreeMap<Addr, Addr>) -> Slot {
        match self {
            Slot::Value(v) => Slot::Value(v.relocate(map)),
            Slot::Delayed { term, env } => Slot::Delayed {
                term: Arc::clone(term),
                env: relocate_env(env, map),
            },
            Slot::Forcing => Slot::Forcing,
        }
    }
}

/// A robot's store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Store {
    cells: BTreeMap<Addr, Slot>,
    next: Addr,
}

impl Store {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
            next: 0,
        }
    }

    /// Number of live cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the store holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Allocate a fresh cell.
    pub fn alloc(&mut self, slot: Slot) -> Addr {
        let addr = self.next;
        self.next += 1;
        self.cells.insert(addr, slot);
        addr
    }

    /// Allocate a cell holding a value.
    pub fn alloc_value(&mut self, value: Value) -> Addr {
        self.alloc(Slot::Value(value))
    }

    /// Read a cell.
    #[must_use]
    pub fn get(&self, addr: Addr) -> Option<&Slot> {
        self.cells.get(&addr)
    }

    /// Overwrite a cell. Returns `false` if the address is not live.
    pub fn set(&mut self, addr: Addr, slot: Slot) -> bool {
        match self.cells.get_mut(&addr) {
            Some(cell) => {
                *cell = slot;
                true
            }
            None => false,
        }
    }

    /// Replace a cell with a black hole, returning what it held.
    pub(crate) fn begin_forcing(&mut self, addr: Addr) -> Option<Slot> {
        self.cells
            .get_mut(&addr)
            .map(|cell| std::mem::replace(cell, Slot::Forcing))
    }

    /// Addresses reachable from `roots`, in ascending order.
    #[must_use]
    pub fn reachable(&self, roots: impl IntoIterator<Item = Addr>) -> BTreeSet<Addr> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<Addr> = roots.into_iter().collect();
        let mut found = Vec::new();
        while let Some(addr) = pending.pop() {
            if !seen.insert(addr) {
                continue;
            }
            if let Some(slot) = self.cells.get(&addr) {
                found.clear();
                slot.addresses(&mut found);
                pending.extend(found.iter().copied().filter(|a| !seen.contains(a)));
            }
        }
        seen
    }

    /// Drop every cell not reachable from `roots`. Returns how many were dropped.
    pub fn retain_reachable(&mut self, roots: impl IntoIterator<Item = Addr>) -> usize {
        let live = self.reachable(roots);
        let before = self.cells.len();
        self.cells.retain(|addr, _| live.contains(addr));
        before - self.cells.len()
    }

    /// Copy every cell reachable from `env` into a new store.
    ///
    /// Returns the environment rewritten to address the new store. Cells keep
    /// their relative order, so transplanting the same environment twice
    /// yields identical stores.
    #[must_use]
    pub fn transplant(&self, env: &Env) -> (Env, Store) {
        let live = self.reachable(env.values().copied());
        let map: BTreeMap<Addr, Addr> = live
            .iter()
            .enumerate()
            .map(|(new, old)| (*old, new))
            .collect();
        let cells: BTreeMap<Addr, Slot> = live
            .iter()
            .filter_map(|addr| Some((*map.get(addr)?, self.cells.get(addr)?.relocate(&map))))
            .collect();
        let next = live.len();
        (relocate_env(env, &map), Store { cells, next })
    }
}
