use std::sync::{Mutex, PoisonError};

use crate::error::RecordError;
use crate::types::{CollisionPolicy, HierarchyPath, Node};

/// The hierarchy tree while workers are still inserting into it.
///
/// A single mutex covers each whole insert, so concurrent inserts never interleave
/// their node-creation steps. There are no readers until [`SharedTree::into_root`].
#[derive(Debug, Default)]
pub struct SharedTree {
    root: Mutex<Node>,
    policy: CollisionPolicy,
}

impl SharedTree {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            root: Mutex::new(Node::new()),
            policy,
        }
    }

    pub fn insert(&self, path: &HierarchyPath, item_id: &str) -> Result<(), RecordError> {
        // A panicking inserter aborts the whole parse, so a poisoned tree is never returned.
        let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        root.insert(path, item_id, self.policy)
    }

    /// Freeze the tree and hand ownership of the root to the caller.
    pub fn into_root(self) -> Node {
        self.root.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
