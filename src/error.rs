use crate::protocol::{NodeId, RemoteError};
use thiserror::Error;

/// Failures raised by filesystem-node operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("name already exists: {0}")]
    NameConflict(String),

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("invalid node name: {0:?}")]
    InvalidName(String),

    #[error("unknown node id: {0}")]
    UnknownNode(NodeId),

    #[error("node {0} is not a directory")]
    NotADirectory(NodeId),

    #[error("node {0} is not a file")]
    NotAFile(NodeId),
}

impl From<FsError> for RemoteError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NameConflict(name) => RemoteError::NameConflict(name),
            FsError::NotFound(name) => RemoteError::NotFound(name),
            FsError::Rejected(reason) => RemoteError::Rejected(reason),
            other => RemoteError::Unsupported(other.to_string()),
        }
    }
}
