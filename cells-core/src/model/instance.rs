//! Model Instances
//!
//! A [`Model`] is one instance of a [`ModelSpec`]. It owns a slot per field,
//! builds each field's cell on first access, and registers a dispatch hook
//! so the engine can route cell changes to the spec's observers.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::{CellError, CellResult};
use crate::graph::{CellId, CellKind, Tick};
use crate::reactive::{CellChange, OwnerId, Runtime};

use super::observer::{run_observers, ModelHook};
use super::spec::{erase, Field, ModelRule, ModelSpec, SpecId};

/// A per-instance replacement for a field's definition.
#[derive(Clone)]
pub(crate) enum Override {
    Value {
        value: Rc<dyn Any>,
        type_name: &'static str,
    },
    Rule {
        rule: Rc<dyn Any>,
        type_name: &'static str,
    },
}

/// Per-instance overrides, applied when the instance is created.
#[derive(Clone, Default)]
pub struct Overrides {
    by_field: HashMap<(SpecId, usize), Override>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `field` a fixed value in this instance.
    pub fn value<T: Clone + 'static>(mut self, field: Field<T>, value: T) -> Self {
        self.by_field.insert(
            (field.spec(), field.index()),
            Override::Value {
                value: erase(value),
                type_name: std::any::type_name::<T>(),
            },
        );
        self
    }

    /// Give `field` a different rule in this instance.
    pub fn rule<T, F>(mut self, field: Field<T>, rule: F) -> Self
    where
        T: 'static,
        F: Fn(&mut Runtime, &Model, Option<&T>) -> CellResult<T> + 'static,
    {
        let rule: ModelRule<T> = Rc::new(rule);
        self.by_field.insert(
            (field.spec(), field.index()),
            Override::Rule {
                rule: erase(rule),
                type_name: std::any::type_name::<T>(),
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }

    /// A field index overridden here that was issued by a spec other than
    /// `spec`.
    fn foreign_field(&self, spec: SpecId) -> Option<usize> {
        self.by_field
            .keys()
            .find(|(owner, _)| *owner != spec)
            .map(|(_, index)| *index)
    }
}

pub(crate) struct ModelInner {
    spec: Rc<ModelSpec>,
    owner: OwnerId,
    overrides: Overrides,
    cells: RefCell<Vec<Option<CellId>>>,
    by_cell: RefCell<HashMap<CellId, usize>>,
    /// Tick each observer last ran at, by position in the spec.
    last_ran: RefCell<Vec<Option<Tick>>>,
}

/// One instance of a model type.
///
/// Cheap to clone; clones refer to the same instance.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl ModelSpec {
    /// Create an instance with per-field overrides.
    pub fn instantiate(
        self: &Rc<Self>,
        rt: &mut Runtime,
        overrides: Overrides,
    ) -> CellResult<Model> {
        Model::with_overrides(rt, self, overrides)
    }
}

impl Model {
    /// Create an instance with every field as defined by `spec`.
    pub fn new(rt: &mut Runtime, spec: &Rc<ModelSpec>) -> CellResult<Self> {
        Self::with_overrides(rt, spec, Overrides::new())
    }

    /// Create an instance, then perform the initialization read of every
    /// field that is not always-lazy.
    pub fn with_overrides(
        rt: &mut Runtime,
        spec: &Rc<ModelSpec>,
        overrides: Overrides,
    ) -> CellResult<Self> {
        if let Some(index) = overrides.foreign_field(spec.id) {
            return Err(CellError::UnknownField {
                model: spec.name.clone(),
                index,
            });
        }

        let inner = Rc::new_cyclic(|weak: &Weak<ModelInner>| {
            let owner = rt.register_owner(Rc::new(ModelHook {
                model: weak.clone(),
            }));
            ModelInner {
                spec: spec.clone(),
                owner,
                overrides,
                cells: RefCell::new(vec![None; spec.fields.len()]),
                by_cell: RefCell::new(HashMap::new()),
                last_ran: RefCell::new(vec![None; spec.observers.len()]),
            }
        });
        let model = Model { inner };
        debug!(model = %spec.name, owner = model.owner().raw(), "creating model instance");

        if let Err(err) = model.initialize(rt) {
            model.dispose(rt);
            return Err(err);
        }
        Ok(model)
    }

    fn initialize(&self, rt: &mut Runtime) -> CellResult<()> {
        for index in 0..self.inner.spec.fields.len() {
            let id = self.cell_id(rt, index)?;
            if rt.kind(id)? == CellKind::AlwaysLazy {
                trace!(cell = %rt.name_of(id), "always lazy; skipped at init");
                continue;
            }
            match rt.read_init(id) {
                Ok(()) | Err(CellError::Unbound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub fn spec(&self) -> &Rc<ModelSpec> {
        &self.inner.spec
    }

    /// The owner id the engine knows this instance by.
    pub fn owner(&self) -> OwnerId {
        self.inner.owner
    }

    /// The field a cell belongs to, if it belongs to this instance.
    pub fn field_of(&self, cell: CellId) -> Option<usize> {
        self.inner.by_cell.borrow().get(&cell).copied()
    }

    /// Name of the field behind `cell`.
    pub fn field_name(&self, cell: CellId) -> Option<&str> {
        self.field_of(cell)
            .and_then(|index| self.inner.spec.field_name(index))
    }

    /// The cell behind a [`Field`] accessor. Accessors issued by another
    /// spec are rejected even when the index happens to exist here.
    pub(crate) fn field_cell_id(
        &self,
        rt: &mut Runtime,
        spec: SpecId,
        index: usize,
    ) -> CellResult<CellId> {
        if spec != self.inner.spec.id {
            return Err(CellError::UnknownField {
                model: self.inner.spec.name.clone(),
                index,
            });
        }
        self.cell_id(rt, index)
    }

    /// The cell behind field `index`, building it if this is the first
    /// access. Observers run as soon as a freshly built cell holds a value.
    pub(crate) fn cell_id(&self, rt: &mut Runtime, index: usize) -> CellResult<CellId> {
        let Some(field) = self.inner.spec.fields.get(index) else {
            return Err(CellError::UnknownField {
                model: self.inner.spec.name.clone(),
                index,
            });
        };

        let existing = self.inner.cells.borrow()[index];
        if let Some(id) = existing.filter(|id| rt.contains(*id)) {
            return Ok(id);
        }

        let over = self
            .inner
            .overrides
            .by_field
            .get(&(self.inner.spec.id, index));
        let id = (field.factory)(rt, self, over)?;
        self.inner.cells.borrow_mut()[index] = Some(id);
        self.inner.by_cell.borrow_mut().insert(id, index);
        trace!(field = %field.name, cell = %id, "vivified field");

        if rt.is_bound(id)? {
            let change = CellChange {
                owner: self.inner.owner,
                cell: id,
                was_bound: false,
            };
            run_observers(rt, self, index, &change)?;
        }
        Ok(id)
    }

    pub(crate) fn observer_ran_at(&self, slot: usize) -> Option<Tick> {
        self.inner.last_ran.borrow()[slot]
    }

    pub(crate) fn mark_observer_ran(&self, slot: usize, tick: Tick) {
        self.inner.last_ran.borrow_mut()[slot] = Some(tick);
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ModelInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Model { inner })
    }

    /// Remove every cell of this instance from the graph and unregister its
    /// observer hook.
    pub fn dispose(&self, rt: &mut Runtime) {
        let cells: Vec<CellId> = self
            .inner
            .cells
            .borrow_mut()
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        self.inner.by_cell.borrow_mut().clear();

        for id in cells {
            // A cell may already be gone if user code removed it directly.
            let _ = rt.remove_id(id);
        }
        rt.unregister_owner(self.inner.owner);
        debug!(model = %self.inner.spec.name, "disposed model instance");
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("spec", &self.inner.spec.name)
            .field("owner", &self.inner.owner)
            .field(
                "vivified",
                &self.inner.cells.borrow().iter().filter(|c| c.is_some()).count(),
            )
            .finish()
    }
}
