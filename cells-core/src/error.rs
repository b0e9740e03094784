//! Error Types
//!
//! Every failure the engine reports is a usage error: there is no I/O in
//! here, so nothing is transient and nothing is retried. Errors are raised
//! at the point of misuse and propagate out through `?`.

use std::fmt;

use thiserror::Error;

use crate::graph::CellId;

/// The operation that was refused by [`CellError::InvalidMutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    /// An external write.
    Set,
    /// A forced recompute.
    Run,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::Set => f.write_str("set"),
            MutationOp::Run => f.write_str("run"),
        }
    }
}

/// Errors produced by the propagation engine and the model layer.
#[derive(Debug, Error)]
pub enum CellError {
    /// `set()` on a rule-backed cell, or `run()` on an input cell.
    #[error("cannot {op} cell '{cell}'")]
    InvalidMutation { cell: String, op: MutationOp },

    /// `set()` on a cell while that same cell is notifying its dependents.
    #[error("cell '{cell}' was set while notifying its dependents")]
    ReentrantWrite { cell: String },

    /// The construction parameters do not select exactly one variant.
    #[error("cannot construct cell '{cell}': {reason}")]
    ConstructionConflict { cell: String, reason: &'static str },

    /// A read required a bound value and there was none.
    #[error("cell '{cell}' has no bound value")]
    Unbound { cell: String },

    /// The handle points at a slot that has been removed.
    #[error("stale cell handle {id}")]
    StaleHandle { id: CellId },

    /// The handle's value type does not match what the cell stores.
    #[error("cell '{cell}' holds {found}, not {expected}")]
    TypeMismatch {
        cell: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Too many deferred writes were applied by a single drain.
    #[error("deferred write drain exceeded {limit} rounds")]
    DrainLimit { limit: usize },

    /// A field accessor was used with a model built from a different spec.
    #[error("model '{model}' has no field #{index}")]
    UnknownField { model: String, index: usize },

    /// A rule reported a failure of its own.
    #[error("rule failed: {0}")]
    Rule(String),
}

impl CellError {
    /// Build a [`CellError::Rule`] from anything printable.
    pub fn rule(message: impl fmt::Display) -> Self {
        CellError::Rule(message.to_string())
    }
}

/// Result alias used throughout the crate.
pub type CellResult<T> = Result<T, CellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_cell() {
        let err = CellError::InvalidMutation {
            cell: "total".to_string(),
            op: MutationOp::Set,
        };
        assert_eq!(err.to_string(), "cannot set cell 'total'");

        let err = CellError::ReentrantWrite {
            cell: "x".to_string(),
        };
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn rule_error_wraps_display() {
        let err = CellError::rule(format_args!("bad input {}", 3));
        assert!(matches!(err, CellError::Rule(ref m) if m == "bad input 3"));
    }
}
