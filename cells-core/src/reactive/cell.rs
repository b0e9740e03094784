//! Cell Construction
//!
//! Cells are created through [`CellBuilder`]. A builder takes exactly one of
//! a rule or a fixed value, plus optional equality predicate, variant and
//! owner. `build` validates the combination and inserts the cell into a
//! runtime.
//!
//! # Example
//!
//! ```
//! use cells_core::{CellBuilder, Runtime};
//!
//! let mut rt = Runtime::new();
//! let x = rt.input("x", 2).unwrap();
//! let doubled = CellBuilder::new("doubled")
//!     .rule(move |rt, _| Ok(rt.get(x)? * 2))
//!     .build(&mut rt)
//!     .unwrap();
//!
//! assert_eq!(rt.get(doubled).unwrap(), 4);
//! rt.set(x, 5).unwrap();
//! assert_eq!(rt.get(doubled).unwrap(), 10);
//! ```

use std::any::Any;
use std::rc::Rc;

use tracing::debug;

use crate::error::{CellError, CellResult};
use crate::graph::{AnyValue, CellKind, CellNode, ErasedRule, ErasedUnchanged, ValueType};

use super::handle::Cell;
use super::owner::OwnerId;
use super::runtime::{erased_eq, Runtime};

/// A typed rule: receives the runtime and the cell's previous value.
pub type Rule<T> = Rc<dyn Fn(&mut Runtime, Option<&T>) -> CellResult<T>>;

/// A typed `unchanged_if(old, new)` predicate.
pub type Unchanged<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Builder for a single cell.
pub struct CellBuilder<T> {
    name: String,
    rule: Option<Rule<T>>,
    value: Option<T>,
    unchanged_if: Option<Unchanged<T>>,
    kind: Option<CellKind>,
    lazy: bool,
    ephemeral: bool,
    owner: Option<OwnerId>,
}

impl<T: Clone + PartialEq + 'static> CellBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rule: None,
            value: None,
            unchanged_if: None,
            kind: None,
            lazy: false,
            ephemeral: false,
            owner: None,
        }
    }

    /// Compute the cell's value with `rule`.
    pub fn rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&mut Runtime, Option<&T>) -> CellResult<T> + 'static,
    {
        self.rule = Some(Rc::new(rule));
        self
    }

    /// Like [`rule`](Self::rule), for a rule that is already shared.
    pub fn shared_rule(mut self, rule: Rule<T>) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Seed an input cell with `value`.
    pub fn value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    /// Replace the default `==` change test. A new value for which
    /// `unchanged_if(old, new)` holds is discarded.
    pub fn unchanged_if<F>(mut self, unchanged_if: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.unchanged_if = Some(Rc::new(unchanged_if));
        self
    }

    pub fn shared_unchanged_if(mut self, unchanged_if: Unchanged<T>) -> Self {
        self.unchanged_if = Some(unchanged_if);
        self
    }

    /// Pick a variant explicitly instead of inferring one.
    pub fn kind(mut self, kind: CellKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Make a rule cell once-asked lazy.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Make an input cell revert to unbound after each change has
    /// propagated.
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Route change notifications for this cell to `owner`'s hook.
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    fn conflict(&self, reason: &'static str) -> CellError {
        CellError::ConstructionConflict {
            cell: self.name.clone(),
            reason,
        }
    }

    fn resolve_kind(&self) -> CellResult<CellKind> {
        let kind = match (&self.rule, &self.value, self.kind) {
            (Some(_), Some(_), _) => return Err(self.conflict("both a rule and a value given")),
            (None, None, None | Some(CellKind::Input)) if self.ephemeral => CellKind::Input,
            (None, None, _) => return Err(self.conflict("neither a rule nor a value given")),
            (Some(_), None, Some(CellKind::Input)) => {
                return Err(self.conflict("an input cell takes a value, not a rule"))
            }
            (Some(_), None, Some(kind)) => kind,
            (Some(_), None, None) if self.lazy => CellKind::OnceAskedLazy,
            (Some(_), None, None) => CellKind::Rule,
            (None, Some(_), None | Some(CellKind::Input)) => CellKind::Input,
            (None, Some(_), Some(_)) => {
                return Err(self.conflict("a rule-backed kind was given a value"))
            }
        };

        if self.lazy && !kind.starts_lazy() {
            return Err(self.conflict("lazy flag on an eager kind"));
        }
        if self.ephemeral && kind != CellKind::Input {
            return Err(self.conflict("only input cells can be ephemeral"));
        }
        Ok(kind)
    }

    /// Validate the definition and insert the cell into `rt`.
    ///
    /// A rule-then-input cell runs its rule here, once, and is settable
    /// from then on.
    pub fn build(self, rt: &mut Runtime) -> CellResult<Cell<T>> {
        let kind = self.resolve_kind()?;

        let unchanged_if: ErasedUnchanged = match self.unchanged_if {
            Some(unchanged_if) => Rc::new(move |old: &dyn Any, new: &dyn Any| {
                match (old.downcast_ref::<T>(), new.downcast_ref::<T>()) {
                    (Some(old), Some(new)) => unchanged_if(old, new),
                    _ => false,
                }
            }),
            None => Rc::new(erased_eq::<T>),
        };

        let mut node = CellNode::new(self.name, kind, ValueType::of::<T>(), unchanged_if);
        node.owner = self.owner;
        node.ephemeral = self.ephemeral;
        node.rule = self.rule.map(erase_rule);
        if let Some(value) = self.value {
            node.value = Some(Box::new(value));
            node.bound = true;
            node.datapulse = rt.tick();
        }

        debug!(cell = %node.name, ?kind, "building cell");
        let id = rt.arena.insert(node);

        if kind == CellKind::RuleThenInput {
            if let Err(err) = rt.run_cell(id) {
                rt.arena.remove(id);
                return Err(err);
            }
            // From here on it is an input: no rule, no dependencies.
            rt.arena.sever_calls(id);
            if let Some(node) = rt.arena.get_mut(id) {
                node.rule = None;
            }
        }

        Ok(Cell::from_id(id))
    }
}

fn erase_rule<T: 'static>(rule: Rule<T>) -> ErasedRule {
    Rc::new(move |rt: &mut Runtime, prev: Option<&dyn Any>| {
        let prev = prev.and_then(|value| value.downcast_ref::<T>());
        rule(rt, prev).map(|value| Box::new(value) as AnyValue)
    })
}

impl Runtime {
    /// Create an input cell holding `value`.
    pub fn input<T: Clone + PartialEq + 'static>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> CellResult<Cell<T>> {
        CellBuilder::new(name).value(value).build(self)
    }

    /// Create an eager rule cell.
    pub fn rule<T, F>(&mut self, name: impl Into<String>, rule: F) -> CellResult<Cell<T>>
    where
        T: Clone + PartialEq + 'static,
        F: Fn(&mut Runtime, Option<&T>) -> CellResult<T> + 'static,
    {
        CellBuilder::new(name).rule(rule).build(self)
    }
}
