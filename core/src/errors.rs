//! Error types.
//!
//! Every fallible operation returns a `GraftResult`. Failures that callers
//! are expected to tell apart are raised as a `GraphError` and can be
//! recovered with `err.downcast_ref::<GraphError>()`, whatever context was
//! attached on the way up.
use crate::model::NodeId;
use graft_data::prelude::DatumType;
use std::fmt;

pub type GraftResult<T> = anyhow::Result<T>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    InvalidGraph(String),
    DuplicateName(String),
    ShapeMismatch(String),
    UnsupportedOpPrecision { op: String, datum_type: DatumType },
    UnsupportedOp(String),
    CorruptPayload(String),
    StaleHandle(NodeId),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use GraphError::*;
        match self {
            InvalidGraph(msg) => write!(f, "Invalid graph: {msg}"),
            DuplicateName(name) => write!(f, "Duplicate tensor name {name:?}"),
            ShapeMismatch(msg) => write!(f, "Shape mismatch: {msg}"),
            UnsupportedOpPrecision { op, datum_type } => {
                write!(f, "{op} does not support {datum_type} precision")
            }
            UnsupportedOp(msg) => write!(f, "Unsupported operation: {msg}"),
            CorruptPayload(msg) => write!(f, "Corrupt payload: {msg}"),
            StaleHandle(id) => write!(f, "Stale node handle {id}"),
        }
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    /// Looks for a `GraphError` at the root of an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&GraphError> {
        err.chain().find_map(|e| e.downcast_ref::<GraphError>())
    }
}

pub(crate) fn invalid(msg: impl Into<String>) -> anyhow::Error {
    GraphError::InvalidGraph(msg.into()).into()
}

pub(crate) fn shape_mismatch(msg: impl Into<String>) -> anyhow::Error {
    GraphError::ShapeMismatch(msg.into()).into()
}
