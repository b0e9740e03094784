//! Owner types for the reactive system.
//!
//! An owner is the host object a cell belongs to. The engine knows owners
//! only by id: after any run or set that changes a cell's value, it hands
//! the change to the dispatch hook registered for the cell's owner.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CellResult;
use crate::graph::CellId;

use super::Runtime;

/// Unique identifier for a host object that owns cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Generate a new unique owner ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

/// A change reported to an owner's dispatch hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellChange {
    /// Owner of the changed cell.
    pub owner: OwnerId,
    /// The cell whose value changed. Its new value is readable with
    /// [`Runtime::peek`], the old one with [`Runtime::last_value`].
    pub cell: CellId,
    /// Whether the cell had a value before this change.
    pub was_bound: bool,
}

/// Observer dispatch hook supplied by the host layer.
///
/// Invoked synchronously after the changed value is stored and before the
/// change reaches any dependent.
pub trait ObserverDispatch {
    fn dispatch(&self, rt: &mut Runtime, change: &CellChange) -> CellResult<()>;
}

impl<F> ObserverDispatch for F
where
    F: Fn(&mut Runtime, &CellChange) -> CellResult<()>,
{
    fn dispatch(&self, rt: &mut Runtime, change: &CellChange) -> CellResult<()> {
        self(rt, change)
    }
}
