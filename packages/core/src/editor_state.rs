//! # Editor State
//!
//! An [`EditorState`] is a frozen snapshot: node table, selection and
//! version. Snapshots share unchanged nodes through `Arc`, so cloning one is
//! cheap and history can keep as many as it likes.

use crate::errors::EditorResult;
use crate::key::NodeKey;
use crate::node::Node;
use crate::registry::NodeRegistry;
use crate::selection::Selection;
use crate::serialize::{self, SerializedEditorState};
use crate::tree::{NodeMap, TreeView};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct EditorState {
    pub(crate) nodes: Arc<NodeMap>,
    pub(crate) selection: Option<Selection>,
    pub(crate) version: u64,
    pub(crate) registry: Arc<NodeRegistry>,
}

impl EditorState {
    /// State holding nothing but an empty root
    pub(crate) fn empty(registry: Arc<NodeRegistry>) -> Self {
        let mut nodes = NodeMap::new();
        nodes.insert(NodeKey::ROOT, Arc::new(Node::root()));
        Self {
            nodes: Arc::new(nodes),
            selection: None,
            version: 0,
            registry,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().map(|r| r.children().is_empty()).unwrap_or(true)
    }

    /// Run `f` against the frozen snapshot
    pub fn read<R>(&self, f: impl FnOnce(&EditorState) -> R) -> R {
        f(self)
    }

    /// Whether `key` resolves to the very same node allocation in both states
    pub fn shares_node(&self, other: &EditorState, key: NodeKey) -> bool {
        match (self.nodes.get(&key), other.nodes.get(&key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn to_json(&self) -> EditorResult<SerializedEditorState> {
        serialize::export_state(self)
    }

    pub fn to_json_string(&self) -> EditorResult<String> {
        Ok(serde_json::to_string(&self.to_json()?)?)
    }
}

/// Equal trees and selections; the version is bookkeeping
impl PartialEq for EditorState {
    fn eq(&self, other: &Self) -> bool {
        if self.selection != other.selection || self.nodes.len() != other.nodes.len() {
            return false;
        }
        Arc::ptr_eq(&self.nodes, &other.nodes)
            || self.nodes.iter().all(|(key, node)| {
                other
                    .nodes
                    .get(key)
                    .map(|o| Arc::ptr_eq(node, o) || **node == **o)
                    .unwrap_or(false)
            })
    }
}

impl TreeView for EditorState {
    fn node_map(&self) -> &NodeMap {
        &self.nodes
    }

    fn registry(&self) -> &NodeRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state() {
        let state = EditorState::empty(Arc::new(NodeRegistry::new()));
        assert!(state.is_empty());
        assert_eq!(state.len(), 1);
        assert_eq!(state.version(), 0);
        assert!(state.check_integrity().is_ok());
        assert_eq!(state.read(|s| s.text_content(NodeKey::ROOT).unwrap()), "");
    }

    #[test]
    fn test_equality_ignores_version() {
        let state = EditorState::empty(Arc::new(NodeRegistry::new()));
        let mut later = state.clone();
        later.version = 9;
        assert_eq!(state, later);
    }
}
