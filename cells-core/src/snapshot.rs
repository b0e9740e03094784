//! Graph Snapshots
//!
//! A serializable picture of a runtime's graph and propagation state, for
//! debugging and for asserting on graph shape in tests.

use indexmap::IndexSet;
use serde::Serialize;

use crate::graph::{CellId, CellKind, Tick};
use crate::reactive::Runtime;

/// State of the whole graph at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub tick: Tick,
    pub propagating: bool,
    pub pending_updates: usize,
    pub pending_writes: usize,
    /// Live cells in arena order.
    pub cells: Vec<CellSnapshot>,
}

/// State of a single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub id: CellId,
    pub name: String,
    pub kind: CellKind,
    pub bound: bool,
    pub lazy: bool,
    pub datapulse: Tick,
    pub changed_datapulse: Tick,
    /// Names of the cells this cell read during its last run.
    pub calls: Vec<String>,
    /// Names of the cells that read this cell during their last run.
    pub called_by: Vec<String>,
}

impl GraphSnapshot {
    /// Find a cell by name.
    pub fn cell(&self, name: &str) -> Option<&CellSnapshot> {
        self.cells.iter().find(|cell| cell.name == name)
    }
}

impl Runtime {
    /// Capture the current graph and propagation state.
    pub fn snapshot(&self) -> GraphSnapshot {
        let names = |ids: &IndexSet<CellId>| -> Vec<String> {
            ids.iter().map(|id| self.name_of(*id)).collect()
        };

        let cells = self
            .arena
            .iter()
            .map(|(id, node)| CellSnapshot {
                id,
                name: node.name.clone(),
                kind: node.kind,
                bound: node.bound,
                lazy: node.lazy,
                datapulse: node.datapulse,
                changed_datapulse: node.changed_datapulse,
                calls: names(&node.calls),
                called_by: names(&node.called_by),
            })
            .collect();

        GraphSnapshot {
            tick: self.ctx.tick(),
            propagating: self.ctx.is_propagating(),
            pending_updates: self.ctx.pending_updates(),
            pending_writes: self.ctx.pending_writes(),
            cells,
        }
    }
}
