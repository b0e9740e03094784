//! Cells Core
//!
//! This crate provides a reactive dataflow engine in the lineage of
//! spreadsheet engines and the Cells library. It implements:
//!
//! - Memoizing cells whose dependencies are discovered as rules read them
//! - A global datapulse that orders every change
//! - Propagation that brings the querying cell current before any other
//!   dependent, with nested work deferred in FIFO order
//! - Input, rule, rule-then-input and lazy cell variants, container cells
//!   and change synapses
//! - A model layer for grouping cells into objects with observers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Cell storage, handles and dependency edges
//! - `reactive`: The runtime and the propagation algorithm
//! - `model`: Field tables, per-instance cells and observers
//! - `config`: Runtime configuration
//! - `snapshot`: Serializable views of a graph for debugging
//!
//! # Example
//!
//! ```rust
//! use cells_core::Runtime;
//!
//! let mut rt = Runtime::new();
//!
//! // Create an input
//! let count = rt.input("count", 1).unwrap();
//!
//! // Create a derived value
//! let doubled = rt.rule("doubled", move |rt, _| Ok(rt.get(count)? * 2)).unwrap();
//! assert_eq!(rt.get(doubled).unwrap(), 2);
//!
//! // Update the input; the change propagates before `set` returns
//! rt.set(count, 5).unwrap();
//! assert_eq!(rt.peek(doubled).unwrap(), Some(10));
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod reactive;
pub mod snapshot;

pub use config::RuntimeConfig;
pub use error::{CellError, CellResult, MutationOp};
pub use graph::{CellId, CellKind, Tick};
pub use reactive::{
    Cell, CellBuilder, CellChange, DictCell, ListCell, ObserverDispatch, OwnerId,
    PropagationContext, Runtime,
};
pub use snapshot::{CellSnapshot, GraphSnapshot};
