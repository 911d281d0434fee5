//! Error types for document and reconciler operations.
//!
//! Text that fails to match, references to missing tags and malformed URLs
//! are not errors: they simply stay plain text.

use thiserror::Error;

use crate::document::NodeId;
use crate::nodes::NodeTypes;

/// Errors surfaced to the integrating application.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EditorError {
    /// The document was set up without node types the reconciler produces.
    #[error("node types not registered with the document: {missing:?}")]
    UnregisteredNodeTypes { missing: NodeTypes },

    /// A node was inserted whose type the document does not accept.
    #[error("node type {kind} is not registered with the document")]
    UnregisteredNode { kind: &'static str },

    /// Handle does not refer to a live node.
    #[error("node {0} does not exist")]
    MissingNode(NodeId),

    /// Operation needs a different kind of node.
    #[error("node {id} is a {actual} node, expected {expected}")]
    UnexpectedNodeType {
        id: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    /// Offset past the end of a text node or inside a UTF-8 sequence.
    #[error("offset {offset} is not a char boundary of node {id}")]
    InvalidOffset { id: NodeId, offset: usize },

    /// Tree edit would make a node its own ancestor, or detach the root.
    #[error("invalid tree edit on node {0}")]
    InvalidTreeEdit(NodeId),
}
