//! Model Specs
//!
//! A [`ModelSpec`] is the per-type field and observer table. It is built
//! once with a [`ModelSpecBuilder`] and shared by every instance.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::error::{CellError, CellResult};
use crate::graph::{CellId, CellKind};
use crate::reactive::{Cell, CellBuilder, Runtime, Unchanged};

use super::instance::{Model, Override};
use super::observer::{ObserverBuilder, ObserverDef};

/// A rule defined on a model field. Receives the model instance as well as
/// the cell's previous value.
pub type ModelRule<T> = Rc<dyn Fn(&mut Runtime, &Model, Option<&T>) -> CellResult<T>>;

/// Builds a field's cell for one instance, applying the instance's override
/// if there is one.
type FieldFactory = Rc<dyn Fn(&mut Runtime, &Model, Option<&Override>) -> CellResult<CellId>>;

/// Identity of a model type, assigned when its builder is created.
///
/// Every [`Field`] carries the id of the spec that issued it, so an
/// accessor can never reach into a model of another type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecId(u64);

impl SpecId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

pub(crate) struct FieldDef {
    pub(crate) name: String,
    pub(crate) factory: FieldFactory,
}

/// The static description of a model type.
pub struct ModelSpec {
    pub(crate) id: SpecId,
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldDef>,
    /// Sorted by priority once at build time.
    pub(crate) observers: Vec<ObserverDef>,
}

impl ModelSpec {
    pub fn builder(name: impl Into<String>) -> ModelSpecBuilder {
        ModelSpecBuilder::new(name)
    }

    pub fn id(&self) -> SpecId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|field| field.name.as_str())
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Observer names in the order they are considered.
    pub fn observer_names(&self) -> impl Iterator<Item = &str> {
        self.observers.iter().map(|observer| observer.name.as_str())
    }
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field(
                "fields",
                &self.fields.iter().map(|f| &f.name).collect::<Vec<_>>(),
            )
            .field("observers", &self.observers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Collects fields and observers for a [`ModelSpec`].
pub struct ModelSpecBuilder {
    id: SpecId,
    name: String,
    fields: Vec<FieldDef>,
    pub(crate) observers: Vec<ObserverDef>,
}

impl ModelSpecBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SpecId::new(),
            name: name.into(),
            fields: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Start defining a field.
    pub fn field<T: Clone + PartialEq + 'static>(
        &mut self,
        name: impl Into<String>,
    ) -> FieldBuilder<'_, T> {
        FieldBuilder {
            spec: self,
            name: name.into(),
            definition: Definition::Unset,
            unchanged_if: None,
            kind: None,
            lazy: false,
            ephemeral: false,
        }
    }

    /// Shorthand for an input field seeded with `value`.
    pub fn input<T: Clone + PartialEq + 'static>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Field<T> {
        self.field(name).value(value).add()
    }

    /// Shorthand for an eager rule field.
    pub fn rule<T, F>(&mut self, name: impl Into<String>, rule: F) -> Field<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn(&mut Runtime, &Model, Option<&T>) -> CellResult<T> + 'static,
    {
        self.field(name).rule(rule).add()
    }

    /// Start defining an observer.
    pub fn observer(&mut self, name: impl Into<String>) -> ObserverBuilder<'_> {
        ObserverBuilder::new(self, name.into())
    }

    pub fn build(mut self) -> Rc<ModelSpec> {
        // Higher priority first, unprioritized last; the sort is stable so
        // ties keep declaration order.
        self.observers
            .sort_by_key(|observer| std::cmp::Reverse(observer.priority));
        Rc::new(ModelSpec {
            id: self.id,
            name: self.name,
            fields: self.fields,
            observers: self.observers,
        })
    }
}

enum Definition<T> {
    Unset,
    Value(T),
    Rule(ModelRule<T>),
}

impl<T: Clone> Clone for Definition<T> {
    fn clone(&self) -> Self {
        match self {
            Definition::Unset => Definition::Unset,
            Definition::Value(value) => Definition::Value(value.clone()),
            Definition::Rule(rule) => Definition::Rule(rule.clone()),
        }
    }
}

/// Defines one field of a model. Finish with [`add`](Self::add).
pub struct FieldBuilder<'a, T> {
    spec: &'a mut ModelSpecBuilder,
    name: String,
    definition: Definition<T>,
    unchanged_if: Option<Unchanged<T>>,
    kind: Option<CellKind>,
    lazy: bool,
    ephemeral: bool,
}

impl<'a, T: Clone + PartialEq + 'static> FieldBuilder<'a, T> {
    pub fn value(mut self, value: T) -> Self {
        self.definition = Definition::Value(value);
        self
    }

    pub fn rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&mut Runtime, &Model, Option<&T>) -> CellResult<T> + 'static,
    {
        self.definition = Definition::Rule(Rc::new(rule));
        self
    }

    pub fn unchanged_if<F>(mut self, unchanged_if: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.unchanged_if = Some(Rc::new(unchanged_if));
        self
    }

    pub fn kind(mut self, kind: CellKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Add the field to the spec and return its accessor.
    pub fn add(self) -> Field<T> {
        let FieldBuilder {
            spec,
            name,
            definition,
            unchanged_if,
            kind,
            lazy,
            ephemeral,
        } = self;

        let cell_name = format!("{}.{}", spec.name, name);
        let factory: FieldFactory = Rc::new(
            move |rt: &mut Runtime, model: &Model, over: Option<&Override>| -> CellResult<CellId> {
                let mut builder =
                    CellBuilder::<T>::new(cell_name.clone()).owner(model.owner());
                if let Some(unchanged_if) = &unchanged_if {
                    builder = builder.shared_unchanged_if(unchanged_if.clone());
                }
                if ephemeral {
                    builder = builder.ephemeral();
                }

                let effective = match over {
                    Some(over) => {
                        trace!(cell = %cell_name, "applying instance override");
                        override_definition::<T>(over, &cell_name)?
                    }
                    None => definition.clone(),
                };
                let declared_shape = matches!(
                    (&definition, &effective),
                    (Definition::Rule(_), Definition::Rule(_))
                        | (
                            Definition::Value(_) | Definition::Unset,
                            Definition::Value(_) | Definition::Unset
                        )
                );

                builder = match effective {
                    Definition::Unset => builder,
                    Definition::Value(value) => builder.value(value),
                    Definition::Rule(rule) => builder.rule(bind_to_model(rule, model)),
                };
                // An override of the other shape brings its own variant.
                if declared_shape {
                    if let Some(kind) = kind {
                        builder = builder.kind(kind);
                    }
                    if lazy {
                        builder = builder.lazy();
                    }
                }

                builder.build(rt).map(|cell| cell.id())
            },
        );

        let index = spec.fields.len();
        spec.fields.push(FieldDef { name, factory });
        Field::new(spec.id, index)
    }
}

fn override_definition<T: Clone + 'static>(
    over: &Override,
    cell_name: &str,
) -> CellResult<Definition<T>> {
    let mismatch = |found| CellError::TypeMismatch {
        cell: cell_name.to_string(),
        expected: std::any::type_name::<T>(),
        found,
    };
    match over {
        Override::Value { value, type_name } => value
            .downcast_ref::<T>()
            .cloned()
            .map(Definition::Value)
            .ok_or_else(|| mismatch(*type_name)),
        Override::Rule { rule, type_name } => rule
            .downcast_ref::<ModelRule<T>>()
            .cloned()
            .map(Definition::Rule)
            .ok_or_else(|| mismatch(*type_name)),
    }
}

/// Adapt a model rule to a plain cell rule. The cell holds the model
/// weakly; a rule running after its model is gone fails.
fn bind_to_model<T: 'static>(
    rule: ModelRule<T>,
    model: &Model,
) -> impl Fn(&mut Runtime, Option<&T>) -> CellResult<T> + 'static {
    let weak = model.downgrade();
    move |rt: &mut Runtime, prev: Option<&T>| {
        let model = Model::upgrade(&weak)
            .ok_or_else(|| CellError::rule("the owning model was dropped"))?;
        rule(rt, &model, prev)
    }
}

pub(crate) fn erase<T: 'static>(value: T) -> Rc<dyn Any> {
    Rc::new(value)
}

// ----------------------------------------------------------------------------
// Field accessors
// ----------------------------------------------------------------------------

/// Typed accessor for one field of a model type.
///
/// A `Field` is an index into the field table of the spec that issued it.
/// The cell behind it is built per instance on first access.
pub struct Field<T> {
    spec: SpecId,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Field<T> {
    fn new(spec: SpecId, index: usize) -> Self {
        Self {
            spec,
            index,
            _marker: PhantomData,
        }
    }

    /// The spec this accessor belongs to.
    pub fn spec(&self) -> SpecId {
        self.spec
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("spec", &self.spec.raw())
            .field("index", &self.index)
            .finish()
    }
}

impl<T: Clone + 'static> Field<T> {
    /// The instance's cell for this field, built on first access.
    pub fn cell(self, rt: &mut Runtime, model: &Model) -> CellResult<Cell<T>> {
        let id = model.field_cell_id(rt, self.spec, self.index)?;
        rt.check_type::<T>(id)?;
        Ok(Cell::from_id(id))
    }

    pub fn read(self, rt: &mut Runtime, model: &Model) -> CellResult<T> {
        let cell = self.cell(rt, model)?;
        rt.get(cell)
    }

    /// Like [`read`](Self::read), but an unbound cell reads as `None`.
    pub fn read_opt(self, rt: &mut Runtime, model: &Model) -> CellResult<Option<T>> {
        let cell = self.cell(rt, model)?;
        rt.get_opt(cell)
    }

    pub fn write(self, rt: &mut Runtime, model: &Model, value: T) -> CellResult<()> {
        let cell = self.cell(rt, model)?;
        rt.set(cell, value)
    }
}
