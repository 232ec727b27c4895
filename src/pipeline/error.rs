//! Pipeline-specific error types and per-node execution outcomes.

use crate::pipeline::id::{DataId, NodeId};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by graph-building operations.
///
/// The update protocol itself never returns these: per-node failures are
/// recorded as an [`ExecutionOutcome`] and the pipeline keeps going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Unknown data object {0:?}")]
    UnknownData(DataId),

    #[error("Node {node:?} has no {direction} slot {index}")]
    InvalidSlot {
        node: NodeId,
        direction: &'static str,
        index: usize,
    },

    #[error("Data object {data:?} is not an output of node {node:?}")]
    NotAnOutput { node: NodeId, data: DataId },

    #[error("Data object {data:?} is not an input of node {node:?}")]
    NotAnInput { node: NodeId, data: DataId },

    #[error("Data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Node {node_id:?} error: {message}")]
    Node { node_id: NodeId, message: String },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Why a node's execute step did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The requested extent or piece count was zero-sized.
    EmptyRequest,
    /// The requested piece is beyond what the producer can generate.
    PieceUnavailable,
    /// The update extent failed verification.
    InvalidRequest,
    /// Execution was aborted through the node's abort flag.
    Aborted,
}

/// Outcome of the most recent execute attempt of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum ExecutionOutcome {
    /// The node has never been asked to execute.
    #[default]
    NotRun,
    Success,
    Skipped(SkipReason),
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::InvalidSlot {
            node: NodeId(1),
            direction: "input",
            index: 3,
        };
        assert_eq!(err.to_string(), "Node NodeId(1) has no input slot 3");

        let err = PipelineError::NotAnInput {
            node: NodeId(2),
            data: DataId(5),
        };
        assert_eq!(
            err.to_string(),
            "Data object DataId(5) is not an input of node NodeId(2)"
        );
    }

    #[test]
    fn test_outcome_predicates() {
        assert!(ExecutionOutcome::Success.is_success());
        assert!(ExecutionOutcome::Failed("x".into()).is_failed());
        assert_eq!(ExecutionOutcome::default(), ExecutionOutcome::NotRun);
    }
}
