//! Graph Nodes
//!
//! This module defines the per-cell storage that lives in the arena.
//! Values are stored type-erased; the typed [`Cell`](crate::reactive::Cell)
//! handle checks the type on every access.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::CellResult;
use crate::reactive::{OwnerId, Runtime};

/// The global logical clock value ("datapulse").
pub type Tick = u64;

/// A boxed cell value.
pub(crate) type AnyValue = Box<dyn Any>;

/// A rule with its value type erased. Receives the runtime and the
/// cell's previous value, if it has one.
pub(crate) type ErasedRule = Rc<dyn Fn(&mut Runtime, Option<&dyn Any>) -> CellResult<AnyValue>>;

/// An `unchanged_if(old, new)` predicate with its value type erased.
pub(crate) type ErasedUnchanged = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Stable handle to a cell slot in the arena.
///
/// The generation makes handles to removed cells detectably stale instead
/// of silently aliasing whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    index: u32,
    generation: u32,
}

impl CellId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// The variant a cell was constructed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    /// Settable, never recomputed.
    Input,
    /// Recomputed from its rule, never settable.
    Rule,
    /// Runs its rule once at construction, then behaves as an input.
    RuleThenInput,
    /// Skipped during propagation, catches up when read. Evaluated when a
    /// host object initializes.
    OnceAskedLazy,
    /// Skipped during propagation and host initialization.
    AlwaysLazy,
    /// Lazy until its first non-initialization read, then a plain rule.
    UntilAskedLazy,
}

impl CellKind {
    /// Does this variant carry a rule at construction time?
    pub fn has_rule(self) -> bool {
        !matches!(self, CellKind::Input)
    }

    /// Does this variant start out lazy?
    pub fn starts_lazy(self) -> bool {
        matches!(
            self,
            CellKind::OnceAskedLazy | CellKind::AlwaysLazy | CellKind::UntilAskedLazy
        )
    }

    /// May `set()` be called on a cell of this variant?
    pub fn is_settable(self) -> bool {
        matches!(self, CellKind::Input | CellKind::RuleThenInput)
    }
}

/// Runtime type information for a stored value.
#[derive(Clone, Copy)]
pub(crate) struct ValueType {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
    clone: fn(&dyn Any) -> Option<AnyValue>,
}

impl ValueType {
    pub(crate) fn of<T: Clone + 'static>() -> Self {
        fn clone_boxed<T: Clone + 'static>(value: &dyn Any) -> Option<AnyValue> {
            value
                .downcast_ref::<T>()
                .map(|v| Box::new(v.clone()) as AnyValue)
        }

        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            clone: clone_boxed::<T>,
        }
    }

    pub(crate) fn clone_value(&self, value: &dyn Any) -> Option<AnyValue> {
        (self.clone)(value)
    }
}

/// A cell's storage slot.
pub(crate) struct CellNode {
    /// Diagnostic name.
    pub(crate) name: String,

    /// Variant chosen at construction.
    pub(crate) kind: CellKind,

    pub(crate) value_type: ValueType,

    /// Last computed or set value. `None` until bound, and again after an
    /// ephemeral pulse.
    pub(crate) value: Option<AnyValue>,

    /// The value before the most recent change.
    pub(crate) last_value: Option<AnyValue>,

    pub(crate) rule: Option<ErasedRule>,

    pub(crate) unchanged_if: ErasedUnchanged,

    /// Has this cell ever produced a value.
    pub(crate) bound: bool,

    /// Tick of the last validation or recompute.
    pub(crate) datapulse: Tick,

    /// Tick at which the value last actually changed.
    pub(crate) changed_datapulse: Tick,

    /// Cells read during the most recent rule run.
    pub(crate) calls: IndexSet<CellId>,

    /// Cells whose most recent run read this cell.
    pub(crate) called_by: IndexSet<CellId>,

    pub(crate) lazy: bool,

    /// Reverts to unbound once its propagation completes.
    pub(crate) ephemeral: bool,

    /// Set while this cell broadcasts a change.
    pub(crate) notifying: bool,

    /// Set while this cell's rule executes.
    pub(crate) running: bool,

    pub(crate) owner: Option<OwnerId>,

    /// Synapses created by this cell's rule, keyed by name.
    pub(crate) synapses: HashMap<String, CellId>,
}

impl CellNode {
    pub(crate) fn new(
        name: String,
        kind: CellKind,
        value_type: ValueType,
        unchanged_if: ErasedUnchanged,
    ) -> Self {
        Self {
            name,
            kind,
            value_type,
            value: None,
            last_value: None,
            rule: None,
            unchanged_if,
            bound: false,
            datapulse: 0,
            changed_datapulse: 0,
            calls: IndexSet::new(),
            called_by: IndexSet::new(),
            lazy: kind.starts_lazy(),
            ephemeral: false,
            notifying: false,
            running: false,
            owner: None,
            synapses: HashMap::new(),
        }
    }

    /// Is this cell current as of `tick`?
    pub(crate) fn is_current(&self, tick: Tick) -> bool {
        self.datapulse == tick
    }

    /// Did this cell's value change during `tick`?
    pub(crate) fn changed_at(&self, tick: Tick) -> bool {
        self.changed_datapulse == tick
    }

    /// Would storing `new` count as a change?
    ///
    /// Replacing no value at all is always a change.
    pub(crate) fn differs_from(&self, new: &dyn Any) -> bool {
        match self.value.as_deref() {
            Some(old) => !(self.unchanged_if)(old, new),
            None => true,
        }
    }

    /// Store a new value, keeping the old one as `last_value`.
    pub(crate) fn replace_value(&mut self, new: AnyValue) {
        self.last_value = self.value.replace(new);
        self.bound = true;
    }

    /// Clone of the current value, for handing to a rule as `prev`.
    pub(crate) fn clone_value(&self) -> Option<AnyValue> {
        self.value
            .as_deref()
            .and_then(|v| self.value_type.clone_value(v))
    }
}

impl fmt::Debug for CellNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("type", &self.value_type.name)
            .field("bound", &self.bound)
            .field("datapulse", &self.datapulse)
            .field("changed_datapulse", &self.changed_datapulse)
            .field("calls", &self.calls.len())
            .field("called_by", &self.called_by.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_node(kind: CellKind) -> CellNode {
        CellNode::new(
            "n".to_string(),
            kind,
            ValueType::of::<i32>(),
            Rc::new(|old: &dyn Any, new: &dyn Any| {
                old.downcast_ref::<i32>() == new.downcast_ref::<i32>()
            }),
        )
    }

    #[test]
    fn lazy_kinds_start_lazy() {
        assert!(int_node(CellKind::AlwaysLazy).lazy);
        assert!(int_node(CellKind::OnceAskedLazy).lazy);
        assert!(int_node(CellKind::UntilAskedLazy).lazy);
        assert!(!int_node(CellKind::Rule).lazy);
        assert!(!int_node(CellKind::Input).lazy);
    }

    #[test]
    fn settable_kinds() {
        assert!(CellKind::Input.is_settable());
        assert!(CellKind::RuleThenInput.is_settable());
        assert!(!CellKind::Rule.is_settable());
        assert!(!CellKind::AlwaysLazy.is_settable());
    }

    #[test]
    fn unbound_node_always_differs() {
        let node = int_node(CellKind::Rule);
        assert!(node.differs_from(&5i32));
    }

    #[test]
    fn replace_value_keeps_last() {
        let mut node = int_node(CellKind::Input);
        node.replace_value(Box::new(1i32));
        node.replace_value(Box::new(2i32));

        assert!(node.bound);
        assert!(!node.differs_from(&2i32));
        assert_eq!(
            node.last_value.as_deref().and_then(|v| v.downcast_ref::<i32>()),
            Some(&1)
        );
    }

    #[test]
    fn clone_value_preserves_type() {
        let mut node = int_node(CellKind::Input);
        node.replace_value(Box::new(7i32));
        let copy = node.clone_value().unwrap();
        assert_eq!(copy.downcast_ref::<i32>(), Some(&7));
    }

    #[test]
    fn cell_id_display() {
        assert_eq!(CellId::new(3, 1).to_string(), "#3v1");
    }
}
