//! In-memory filesystem tree backed by an id arena.
//!
//! Nodes never hold pointers to each other; directories refer to their
//! children by [`NodeId`] and every node records its parent id, so the
//! structure is cycle-free. Locking is per node: mutating one file never
//! blocks operations on unrelated nodes. The arena map itself is only
//! locked to insert or look up node handles.

use crate::error::FsError;
use crate::protocol::{NodeId, NodeKind};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pluggable predicate consulted before every file write. Returning an
/// error string rejects the write with `FsError::Rejected`.
pub type WritePolicy = Arc<dyn Fn(&[String]) -> Result<(), String> + Send + Sync>;

enum NodeBody {
    Directory { children: Vec<(String, NodeId)> },
    File { lines: Vec<String> },
}

impl NodeBody {
    fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Directory { .. } => NodeKind::Directory,
            NodeBody::File { .. } => NodeKind::File,
        }
    }
}

struct Node {
    name: String,
    parent: Option<NodeId>,
    body: NodeBody,
}

pub struct Tree {
    nodes: RwLock<HashMap<NodeId, Arc<Mutex<Node>>>>,
    next_id: AtomicU64,
    root: NodeId,
    write_policy: WritePolicy,
}

impl Tree {
    pub fn new(root_name: &str) -> Self {
        Self::with_write_policy(root_name, Arc::new(|_| Ok(())))
    }

    pub fn with_write_policy(root_name: &str, policy: WritePolicy) -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Arc::new(Mutex::new(Node {
                name: root_name.to_string(),
                parent: None,
                body: NodeBody::Directory {
                    children: Vec::new(),
                },
            })),
        );
        Tree {
            nodes: RwLock::new(nodes),
            next_id: AtomicU64::new(1),
            root,
            write_policy: policy,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> Result<Arc<Mutex<Node>>, FsError> {
        self.nodes
            .read()
            .get(&id)
            .cloned()
            .ok_or(FsError::UnknownNode(id))
    }

    fn kind(&self, id: NodeId) -> Result<NodeKind, FsError> {
        Ok(self.node(id)?.lock().body.kind())
    }

    pub fn name(&self, id: NodeId) -> Result<String, FsError> {
        Ok(self.node(id)?.lock().name.clone())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, FsError> {
        Ok(self.node(id)?.lock().parent)
    }

    /// Snapshot of a directory's entries, in insertion order.
    pub fn list(&self, dir: NodeId) -> Result<Vec<(String, NodeKind)>, FsError> {
        let node = self.node(dir)?;
        let guard = node.lock();
        let NodeBody::Directory { children } = &guard.body else {
            return Err(FsError::NotADirectory(dir));
        };
        let mut out = Vec::with_capacity(children.len());
        for (name, id) in children {
            out.push((name.clone(), self.kind(*id)?));
        }
        Ok(out)
    }

    pub fn create_file(&self, dir: NodeId, name: &str) -> Result<NodeId, FsError> {
        self.create_child(dir, name, NodeBody::File { lines: Vec::new() })
    }

    pub fn create_directory(&self, dir: NodeId, name: &str) -> Result<NodeId, FsError> {
        self.create_child(
            dir,
            name,
            NodeBody::Directory {
                children: Vec::new(),
            },
        )
    }

    fn create_child(&self, dir: NodeId, name: &str, body: NodeBody) -> Result<NodeId, FsError> {
        if name.is_empty() {
            return Err(FsError::InvalidName(name.to_string()));
        }
        let parent = self.node(dir)?;
        let mut guard = parent.lock();
        let NodeBody::Directory { children } = &mut guard.body else {
            return Err(FsError::NotADirectory(dir));
        };
        // Files and subdirectories share one case-sensitive namespace.
        if children.iter().any(|(existing, _)| existing == name) {
            return Err(FsError::NameConflict(name.to_string()));
        }
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.nodes.write().insert(
            id,
            Arc::new(Mutex::new(Node {
                name: name.to_string(),
                parent: Some(dir),
                body,
            })),
        );
        children.push((name.to_string(), id));
        Ok(id)
    }

    pub fn find(&self, dir: NodeId, name: &str) -> Result<(NodeId, NodeKind), FsError> {
        let node = self.node(dir)?;
        let guard = node.lock();
        let NodeBody::Directory { children } = &guard.body else {
            return Err(FsError::NotADirectory(dir));
        };
        let id = children
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let kind = self.kind(id)?;
        Ok((id, kind))
    }

    pub fn read(&self, file: NodeId) -> Result<Vec<String>, FsError> {
        let node = self.node(file)?;
        let guard = node.lock();
        match &guard.body {
            NodeBody::File { lines } => Ok(lines.clone()),
            NodeBody::Directory { .. } => Err(FsError::NotAFile(file)),
        }
    }

    /// Replaces the file's contents wholesale. Readers never observe a
    /// partial replacement; the swap happens under the node lock.
    pub fn write(&self, file: NodeId, lines: Vec<String>) -> Result<(), FsError> {
        (self.write_policy)(&lines).map_err(FsError::Rejected)?;
        let node = self.node(file)?;
        let mut guard = node.lock();
        match &mut guard.body {
            NodeBody::File { lines: slot } => {
                *slot = lines;
                Ok(())
            }
            NodeBody::Directory { .. } => Err(FsError::NotAFile(file)),
        }
    }
}
