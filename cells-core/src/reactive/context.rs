//! Propagation Context
//!
//! The propagation context is the small amount of shared state the engine
//! needs besides the cells themselves: the clock, the cell whose rule is
//! running, the cell whose change is being broadcast, and the two FIFOs of
//! work postponed until the outermost propagation unwinds.
//!
//! # Implementation
//!
//! The context is a plain value owned by a [`Runtime`](super::Runtime) and
//! reached through `&mut self`, so every graph has its own clock and tests
//! never share state. "Current" markers are saved and restored around each
//! nested run or propagation, which gives the same discipline as a call
//! stack without keeping one.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use crate::graph::{AnyValue, CellId, Tick};

/// Who is broadcasting a change right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Propagator {
    /// A cell notifying its dependents.
    Cell(CellId),
    /// Queued updates are being drained. Keeps writes deferred while the
    /// drain runs even though no cell is notifying.
    Draining,
}

/// A write postponed because it arrived mid-propagation.
pub(crate) enum PendingWrite {
    /// Replace the value outright.
    Replace(AnyValue),
    /// Mutate a copy of the value in place when the write is applied.
    Mutate(Box<dyn FnOnce(&mut dyn Any)>),
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingWrite::Replace(_) => f.write_str("Replace"),
            PendingWrite::Mutate(_) => f.write_str("Mutate"),
        }
    }
}

/// Global propagation state for one cell graph.
#[derive(Debug)]
pub struct PropagationContext {
    /// Current datapulse.
    tick: Tick,

    /// The cell whose rule is executing.
    current: Option<CellId>,

    /// The cell broadcasting a change.
    current_propagator: Option<Propagator>,

    /// Cells whose validation was postponed by a nested propagation.
    deferred_updates: VecDeque<CellId>,

    /// Writes postponed because a propagation was in flight.
    deferred_sets: VecDeque<(CellId, PendingWrite)>,

    /// Set while the outermost drain applies deferred writes, so writes
    /// applied inside it leave the rest of the queue to the outer loop.
    draining_writes: bool,
}

impl PropagationContext {
    /// Create a context starting at `initial_tick`.
    pub fn new(initial_tick: Tick) -> Self {
        Self {
            tick: initial_tick,
            current: None,
            current_propagator: None,
            deferred_updates: VecDeque::new(),
            deferred_sets: VecDeque::new(),
            draining_writes: false,
        }
    }

    /// Reinitialize everything. Intended for test isolation.
    pub fn reset(&mut self, initial_tick: Tick) {
        *self = Self::new(initial_tick);
    }

    /// The current datapulse.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// The cell whose rule is executing, if any.
    pub fn current(&self) -> Option<CellId> {
        self.current
    }

    /// The cell presently broadcasting a change, if any.
    pub fn current_propagator(&self) -> Option<CellId> {
        match self.current_propagator {
            Some(Propagator::Cell(id)) => Some(id),
            _ => None,
        }
    }

    /// Is a propagation in flight?
    pub fn is_propagating(&self) -> bool {
        self.current_propagator.is_some()
    }

    /// Number of queued updates.
    pub fn pending_updates(&self) -> usize {
        self.deferred_updates.len()
    }

    /// Number of queued writes.
    pub fn pending_writes(&self) -> usize {
        self.deferred_sets.len()
    }

    /// Advance the clock by one pulse.
    pub(crate) fn advance(&mut self) -> Tick {
        self.tick += 1;
        self.tick
    }

    /// Make `cell` the running cell, returning the previous one.
    pub(crate) fn enter_run(&mut self, cell: CellId) -> Option<CellId> {
        self.current.replace(cell)
    }

    pub(crate) fn exit_run(&mut self, saved: Option<CellId>) {
        self.current = saved;
    }

    /// Make `propagator` the current propagator, returning the previous one.
    pub(crate) fn enter_propagation(&mut self, propagator: Propagator) -> Option<Propagator> {
        self.current_propagator.replace(propagator)
    }

    pub(crate) fn exit_propagation(&mut self, saved: Option<Propagator>) {
        self.current_propagator = saved;
    }

    pub(crate) fn defer_update(&mut self, cell: CellId) {
        self.deferred_updates.push_back(cell);
    }

    pub(crate) fn pop_update(&mut self) -> Option<CellId> {
        self.deferred_updates.pop_front()
    }

    pub(crate) fn defer_write(&mut self, cell: CellId, write: PendingWrite) {
        self.deferred_sets.push_back((cell, write));
    }

    pub(crate) fn pop_write(&mut self) -> Option<(CellId, PendingWrite)> {
        self.deferred_sets.pop_front()
    }

    pub(crate) fn is_draining_writes(&self) -> bool {
        self.draining_writes
    }

    pub(crate) fn set_draining_writes(&mut self, draining: bool) {
        self.draining_writes = draining;
    }

    /// Throw away all queued work. Returns how many items were dropped.
    pub(crate) fn discard_deferred(&mut self) -> usize {
        let dropped = self.deferred_updates.len() + self.deferred_sets.len();
        self.deferred_updates.clear();
        self.deferred_sets.clear();
        dropped
    }
}

impl Default for PropagationContext {
    fn default() -> Self {
        Self::new(1)
    }
}
