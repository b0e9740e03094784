//! Container Cells
//!
//! List- and map-valued input cells with in-place mutation. Every mutation
//! follows the write path of `set`: during a propagation it is queued as a
//! closure and applied later, otherwise it is applied to a copy of the
//! current value, compared against the old one, and propagated if the
//! container actually changed.

use std::any::Any;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::CellResult;

use super::context::PendingWrite;
use super::handle::Cell;
use super::runtime::Runtime;

/// An input cell holding a list.
pub type ListCell<T> = Cell<Vec<T>>;

/// An input cell holding an insertion-ordered map.
pub type DictCell<K, V> = Cell<IndexMap<K, V>>;

impl Runtime {
    /// Mutate a cell's value in place.
    ///
    /// `f` runs on a copy of the value. If the result is unchanged, nothing
    /// propagates.
    pub fn mutate<T, F>(&mut self, cell: Cell<T>, f: F) -> CellResult<()>
    where
        T: Clone + 'static,
        F: FnOnce(&mut T) + 'static,
    {
        self.check_type::<T>(cell.id())?;
        let mutate = move |value: &mut dyn Any| {
            if let Some(value) = value.downcast_mut::<T>() {
                f(value);
            }
        };
        self.write(cell.id(), PendingWrite::Mutate(Box::new(mutate)))
    }

    pub fn push<T: Clone + 'static>(&mut self, list: ListCell<T>, item: T) -> CellResult<()> {
        self.mutate(list, move |items| items.push(item))
    }

    /// Insert `item` at `index`. An index past the end appends.
    pub fn insert_at<T: Clone + 'static>(
        &mut self,
        list: ListCell<T>,
        index: usize,
        item: T,
    ) -> CellResult<()> {
        self.mutate(list, move |items| {
            let index = index.min(items.len());
            items.insert(index, item);
        })
    }

    /// Remove the item at `index`. Out-of-range indices are ignored.
    pub fn remove_at<T: Clone + 'static>(
        &mut self,
        list: ListCell<T>,
        index: usize,
    ) -> CellResult<()> {
        self.mutate(list, move |items| {
            if index < items.len() {
                items.remove(index);
            }
        })
    }

    pub fn clear<T: Clone + 'static>(&mut self, list: ListCell<T>) -> CellResult<()> {
        self.mutate(list, |items| items.clear())
    }

    pub fn dict_insert<K, V>(&mut self, dict: DictCell<K, V>, key: K, value: V) -> CellResult<()>
    where
        K: Clone + Hash + Eq + 'static,
        V: Clone + 'static,
    {
        self.mutate(dict, move |map| {
            map.insert(key, value);
        })
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn dict_remove<K, V>(&mut self, dict: DictCell<K, V>, key: K) -> CellResult<()>
    where
        K: Clone + Hash + Eq + 'static,
        V: Clone + 'static,
    {
        self.mutate(dict, move |map| {
            map.shift_remove(&key);
        })
    }
}
