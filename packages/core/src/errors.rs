//! Error types for the editor core

use crate::key::NodeKey;
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Node {0} is not in the working table")]
    StaleNode(NodeKey),

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("No active transaction is available to this call")]
    NoActiveTransaction,

    #[error("Selection could not be resolved: {0}")]
    SelectionResolution(String),

    #[error("Node type registered twice: {0}")]
    DuplicateNodeType(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node type {node_type} is a {actual} node, expected {expected}")]
    BaseMismatch {
        node_type: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Node {0} is not an element")]
    NotAnElement(NodeKey),

    #[error("Node {0} is not text")]
    NotText(NodeKey),

    #[error("Update loop: more than {0} consecutive ticks were scheduled")]
    UpdateLoop(usize),

    #[error("Node transforms did not settle after {0} passes")]
    TransformLoop(usize),

    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    #[error("Invalid editor state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EditorError {
    pub(crate) fn invalid_move(message: impl Into<String>) -> Self {
        EditorError::InvalidMove(message.into())
    }

    /// Errors that abort the enclosing transaction. Selection resolution
    /// problems are recovered locally and never reach this point.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EditorError::SelectionResolution(_))
    }
}
