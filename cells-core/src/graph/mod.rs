//! Dependency Graph
//!
//! This module holds the storage side of the engine: the cell nodes and
//! the arena they live in.
//!
//! # Overview
//!
//! - Nodes are cells: a value, an optional rule, and the bookkeeping the
//!   propagation algorithm needs (ticks, flags).
//! - Edges are discovered, not declared. When a rule reads another cell,
//!   the reader gains a `calls` edge and the read cell gains a `called_by`
//!   edge. Both are rebuilt from scratch each time the rule runs.
//!
//! # Design Decisions
//!
//! 1. One arena per runtime with generational handles. Edges are plain
//!    handles, so the graph never keeps a removed cell alive.
//!
//! 2. Edge sets preserve insertion order, which fixes the order in which
//!    dependents are notified.

mod arena;
mod node;

pub(crate) use arena::CellArena;
pub(crate) use node::{AnyValue, CellNode, ErasedRule, ErasedUnchanged, ValueType};
pub use node::{CellId, CellKind, Tick};
