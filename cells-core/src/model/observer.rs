//! Model Observers
//!
//! Observers are side-effecting callbacks attached to a model type. They
//! fire when a cell of an instance changes and all their conditions hold.
//!
//! # Conditions
//!
//! - Watched fields: if any are given, only changes to those fields count.
//! - New-value and old-value predicates, checked against the changed cell.
//!   A predicate typed for a different value type never matches, and an
//!   old-value predicate never matches a cell that had no previous value.
//!
//! An observer runs at most once per datapulse per instance. Observers are
//! considered in priority order: higher first, unprioritized last, ties in
//! declaration order.

use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::CellResult;
use crate::graph::CellId;
use crate::reactive::{Cell, CellChange, ObserverDispatch, Runtime};

use super::instance::{Model, ModelInner};
use super::spec::{Field, ModelSpecBuilder, SpecId};

type ValuePredicate = Rc<dyn Fn(&Runtime, CellId) -> bool>;

/// An observer callback.
pub type ObserverAction = Rc<dyn Fn(&mut Runtime, &Model, &CellChange) -> CellResult<()>>;

pub(crate) struct ObserverDef {
    pub(crate) name: String,
    /// Watched fields with the spec that issued them. Empty means every
    /// field.
    fields: Vec<(SpecId, usize)>,
    when_new: Option<ValuePredicate>,
    when_old: Option<ValuePredicate>,
    pub(crate) priority: Option<i32>,
    action: ObserverAction,
}

impl ObserverDef {
    fn applies(&self, rt: &Runtime, spec: SpecId, field: usize, cell: CellId) -> bool {
        if !self.fields.is_empty() && !self.fields.contains(&(spec, field)) {
            return false;
        }
        if let Some(when_new) = &self.when_new {
            if !when_new(rt, cell) {
                return false;
            }
        }
        if let Some(when_old) = &self.when_old {
            if !when_old(rt, cell) {
                return false;
            }
        }
        true
    }
}

/// Defines one observer. Finish with [`add`](Self::add).
pub struct ObserverBuilder<'a> {
    spec: &'a mut ModelSpecBuilder,
    name: String,
    fields: Vec<(SpecId, usize)>,
    when_new: Option<ValuePredicate>,
    when_old: Option<ValuePredicate>,
    priority: Option<i32>,
}

impl<'a> ObserverBuilder<'a> {
    pub(crate) fn new(spec: &'a mut ModelSpecBuilder, name: String) -> Self {
        Self {
            spec,
            name,
            fields: Vec::new(),
            when_new: None,
            when_old: None,
            priority: None,
        }
    }

    /// Only fire for changes to `field`. May be given more than once. A
    /// field of another model type never matches.
    pub fn watch<T>(mut self, field: Field<T>) -> Self {
        self.fields.push((field.spec(), field.index()));
        self
    }

    /// Only fire when the changed cell's new value satisfies `predicate`.
    pub fn when_new<T, F>(mut self, predicate: F) -> Self
    where
        T: Clone + 'static,
        F: Fn(&T) -> bool + 'static,
    {
        self.when_new = Some(Rc::new(move |rt: &Runtime, cell: CellId| {
            matches!(rt.peek(Cell::<T>::from_id(cell)), Ok(Some(value)) if predicate(&value))
        }));
        self
    }

    /// Only fire when the changed cell's previous value satisfies
    /// `predicate`.
    pub fn when_old<T, F>(mut self, predicate: F) -> Self
    where
        T: Clone + 'static,
        F: Fn(&T) -> bool + 'static,
    {
        self.when_old = Some(Rc::new(move |rt: &Runtime, cell: CellId| {
            matches!(rt.last_value(Cell::<T>::from_id(cell)), Ok(Some(value)) if predicate(&value))
        }));
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Add the observer with its callback.
    pub fn add<F>(self, action: F)
    where
        F: Fn(&mut Runtime, &Model, &CellChange) -> CellResult<()> + 'static,
    {
        self.spec.observers.push(ObserverDef {
            name: self.name,
            fields: self.fields,
            when_new: self.when_new,
            when_old: self.when_old,
            priority: self.priority,
            action: Rc::new(action),
        });
    }
}

/// Run every applicable observer of `model` for a change to `field`.
pub(crate) fn run_observers(
    rt: &mut Runtime,
    model: &Model,
    field: usize,
    change: &CellChange,
) -> CellResult<()> {
    let spec = model.spec().clone();
    for (slot, observer) in spec.observers.iter().enumerate() {
        let tick = rt.tick();
        if model.observer_ran_at(slot) == Some(tick) {
            continue;
        }
        if !observer.applies(rt, spec.id, field, change.cell) {
            continue;
        }

        model.mark_observer_ran(slot, tick);
        debug!(
            observer = %observer.name,
            model = %spec.name,
            field = spec.fields[field].name.as_str(),
            tick,
            "running observer"
        );
        (observer.action)(rt, model, change)?;
    }
    Ok(())
}

/// The engine-side hook for one model instance.
pub(crate) struct ModelHook {
    pub(crate) model: Weak<ModelInner>,
}

impl ObserverDispatch for ModelHook {
    fn dispatch(&self, rt: &mut Runtime, change: &CellChange) -> CellResult<()> {
        let Some(model) = Model::upgrade(&self.model) else {
            return Ok(());
        };
        let Some(field) = model.field_of(change.cell) else {
            return Ok(());
        };
        run_observers(rt, &model, field, change)
    }
}
