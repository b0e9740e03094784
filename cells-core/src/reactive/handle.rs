//! Typed cell handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::graph::CellId;

/// A typed, copyable handle to a cell stored in a [`Runtime`](super::Runtime).
///
/// The handle carries the value type; the runtime checks it against the
/// stored value on every access, so a handle can never read a value as the
/// wrong type.
pub struct Cell<T> {
    id: CellId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Cell<T> {
    pub(crate) fn from_id(id: CellId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The untyped id of this cell.
    pub fn id(&self) -> CellId {
        self.id
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cell<T> {}

impl<T> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Cell<T> {}

impl<T> Hash for Cell<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cell").field(&self.id).finish()
    }
}

impl<T> From<Cell<T>> for CellId {
    fn from(cell: Cell<T>) -> Self {
        cell.id
    }
}
