//! Reactive Engine
//!
//! This module implements the propagation engine: cells, the clock that
//! orders their changes, and the algorithm that keeps every cell
//! consistent with the cells it reads.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A cell holds a value. Input cells are set from outside; rule cells
//! compute their value from other cells. Hybrid and lazy variants are
//! described on [`CellKind`].
//!
//! ## Datapulse
//!
//! A global tick that advances once per effective input change. A cell whose
//! datapulse equals the tick is current and can be read as-is.
//!
//! ## Dependencies
//!
//! Nothing is declared. Whatever a rule reads during its last run is what it
//! depends on, and that set is rediscovered every time the rule runs.
//!
//! # Implementation Notes
//!
//! There is no ambient state: the clock, the running cell and the deferred
//! queues live in a [`PropagationContext`] inside each [`Runtime`], and
//! rules receive the runtime explicitly.

mod cell;
mod container;
mod context;
mod handle;
mod owner;
mod runtime;
mod synapse;

pub use cell::{CellBuilder, Rule, Unchanged};
pub use container::{DictCell, ListCell};
pub use context::PropagationContext;
pub use handle::Cell;
pub use owner::{CellChange, ObserverDispatch, OwnerId};
pub use runtime::Runtime;

pub use crate::graph::{CellId, CellKind, Tick};
