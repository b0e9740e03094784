//! Host Models
//!
//! Models group cells into objects. A model type is described once by a
//! [`ModelSpec`]: an ordered table of fields (each a value or a rule, with
//! its variant and equality test) and a table of observers. Instances are
//! created from the spec and get their own cell per field.
//!
//! # How It Works
//!
//! 1. Fields are addressed by typed [`Field`] accessors handed out by the
//!    spec builder. An accessor is an index, so lookups never go through
//!    names at runtime.
//!
//! 2. A field's cell is built the first time the instance touches it. An
//!    instance may override a field's value or rule; the override replaces
//!    the spec's definition for that instance only.
//!
//! 3. Creating an instance reads every field once, except always-lazy ones.
//!    This is the initialization read, so until-asked cells stay lazy.
//!
//! 4. Each instance registers a dispatch hook with the runtime. Whenever one
//!    of its cells changes, the hook runs the spec's observers.
//!
//! # Example
//!
//! ```
//! use cells_core::model::{Model, ModelSpec};
//! use cells_core::Runtime;
//!
//! let mut spec = ModelSpec::builder("rect");
//! let width = spec.input("width", 2);
//! let height = spec.input("height", 3);
//! let area = spec.rule("area", move |rt, model, _| {
//!     Ok(width.read(rt, model)? * height.read(rt, model)?)
//! });
//! let spec = spec.build();
//!
//! let mut rt = Runtime::new();
//! let rect = Model::new(&mut rt, &spec).unwrap();
//! assert_eq!(area.read(&mut rt, &rect).unwrap(), 6);
//!
//! width.write(&mut rt, &rect, 5).unwrap();
//! assert_eq!(area.read(&mut rt, &rect).unwrap(), 15);
//! ```

mod instance;
mod observer;
mod spec;

pub use instance::{Model, Overrides};
pub use observer::{ObserverAction, ObserverBuilder};
pub use spec::{Field, FieldBuilder, ModelRule, ModelSpec, ModelSpecBuilder, SpecId};
