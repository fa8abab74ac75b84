pub mod config;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a node in the server-side arena. Id 0 is always the root
/// directory, so clients can address the tree without a bootstrap lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Directory,
    File,
}

/// One row of a directory listing, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// Structured failures that travel back to the calling client. Everything
/// else (transport errors, delivery failures) stays on the server side.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RemoteError {
    #[error("name already exists: {0}")]
    NameConflict(String),
    #[error("no such entry: {0}")]
    NotFound(String),
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RfsMessage {
    //request
    List(NodeId),
    CreateFile { dir: NodeId, name: String },
    CreateDirectory { dir: NodeId, name: String },
    Find { dir: NodeId, name: String },
    Read(NodeId),
    Write(NodeId, Vec<String>),
    RegisterCallback,
    Shutdown,

    //response
    Entries(Vec<DirEntry>),
    Node { id: NodeId, kind: NodeKind },
    Lines(Vec<String>),
    Ack,
    Error(RemoteError),

    // pushed on a server-opened unidirectional stream, never a reply
    Notify(u64),
}
