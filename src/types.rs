//! Core data model types for hierarchy ingestion.
//!
//! Ingestion produces a single root [`Node`]: a trie keyed by category segments whose
//! terminal entries are item identifiers flagged with [`Node::item`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// A node of the hierarchy tree.
///
/// Serializes as `{"item": true}` for leaves and `{"children": {...}}` for categories;
/// both fields are omitted when false/empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// True when this node stands for an item identifier.
    #[serde(default, skip_serializing_if = "is_false")]
    pub item: bool,
    /// Child nodes keyed by segment value or item identifier.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Node>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// How an item identifier that collides with a category key at the same level is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Flag the existing node as an item and keep its children.
    #[default]
    MarkLeaf,
    /// Fail the record with [`RecordError::LeafCollision`].
    Reject,
}

/// Ordered category segments of one record, level 1 first.
///
/// Only contains non-empty segments; trailing empty levels are dropped during extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HierarchyPath {
    segments: Vec<String>,
}

impl HierarchyPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of category levels in the path.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl From<Vec<String>> for HierarchyPath {
    fn from(segments: Vec<String>) -> Self {
        Self::new(segments)
    }
}

impl<'a> From<&[&'a str]> for HierarchyPath {
    fn from(segments: &[&'a str]) -> Self {
        Self::new(segments.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl Node {
    /// Create an empty (root or category) node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a leaf node for an item identifier.
    pub fn leaf() -> Self {
        Self {
            item: true,
            children: BTreeMap::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.item
    }

    pub fn child(&self, key: &str) -> Option<&Node> {
        self.children.get(key)
    }

    /// Follow `keys` from this node.
    pub fn get_path(&self, keys: &[&str]) -> Option<&Node> {
        keys.iter().try_fold(self, |node, key| node.child(key))
    }

    /// Total number of nodes below this one (excluding itself).
    pub fn descendant_count(&self) -> usize {
        self.children
            .values()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    /// Number of item nodes below this one.
    pub fn item_count(&self) -> usize {
        self.children
            .values()
            .map(|child| usize::from(child.item) + child.item_count())
            .sum()
    }

    /// Insert `item_id` under `path`, creating missing category nodes on the way.
    ///
    /// Nodes are only ever added. Inserting the same `(path, item_id)` twice leaves the tree
    /// unchanged. Under [`CollisionPolicy::Reject`] the tree is checked before anything is
    /// created, so a rejected insert leaves no partial path behind.
    pub fn insert(
        &mut self,
        path: &HierarchyPath,
        item_id: &str,
        policy: CollisionPolicy,
    ) -> Result<(), RecordError> {
        if policy == CollisionPolicy::Reject {
            self.check_collision(path, item_id)?;
        }

        let mut current = self;
        for segment in path.segments() {
            current = current.children.entry(segment.clone()).or_default();
        }
        current.children.entry(item_id.to_owned()).or_default().item = true;
        Ok(())
    }

    fn check_collision(&self, path: &HierarchyPath, item_id: &str) -> Result<(), RecordError> {
        let mut current = self;
        for segment in path.segments() {
            match current.children.get(segment) {
                Some(child) if child.item => {
                    return Err(RecordError::LeafCollision {
                        key: segment.clone(),
                    });
                }
                Some(child) => current = child,
                None => return Ok(()),
            }
        }
        match current.children.get(item_id) {
            Some(child) if !child.item => Err(RecordError::LeafCollision {
                key: item_id.to_owned(),
            }),
            _ => Ok(()),
        }
    }
}
