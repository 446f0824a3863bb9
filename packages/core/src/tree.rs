//! Read-only navigation shared by committed states and open transactions

use crate::errors::{EditorError, EditorResult};
use crate::key::NodeKey;
use crate::node::Node;
use crate::registry::NodeRegistry;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Node table: key to copy-on-write node
pub type NodeMap = HashMap<NodeKey, Arc<Node>>;

const DOUBLE_LINE_BREAK: &str = "\n\n";

/// Tree accessors available wherever a node table is in scope
pub trait TreeView {
    fn node_map(&self) -> &NodeMap;

    fn registry(&self) -> &NodeRegistry;

    fn node(&self, key: NodeKey) -> Option<&Node> {
        self.node_map().get(&key).map(|n| n.as_ref())
    }

    /// Node for a key, or `StaleNode` when the key is not in the table
    fn get(&self, key: NodeKey) -> EditorResult<&Node> {
        self.node(key).ok_or(EditorError::StaleNode(key))
    }

    fn contains(&self, key: NodeKey) -> bool {
        self.node_map().contains_key(&key)
    }

    fn root(&self) -> EditorResult<&Node> {
        self.get(NodeKey::ROOT)
    }

    fn parent_of(&self, key: NodeKey) -> EditorResult<Option<NodeKey>> {
        Ok(self.get(key)?.parent())
    }

    fn children_of(&self, key: NodeKey) -> EditorResult<&[NodeKey]> {
        Ok(self.get(key)?.children())
    }

    fn index_within_parent(&self, key: NodeKey) -> EditorResult<Option<usize>> {
        let Some(parent) = self.parent_of(key)? else {
            return Ok(None);
        };
        Ok(self
            .get(parent)?
            .children()
            .iter()
            .position(|child| *child == key))
    }

    fn previous_sibling(&self, key: NodeKey) -> EditorResult<Option<NodeKey>> {
        let Some(parent) = self.parent_of(key)? else {
            return Ok(None);
        };
        let siblings = self.get(parent)?.children();
        Ok(siblings
            .iter()
            .position(|child| *child == key)
            .filter(|i| *i > 0)
            .map(|i| siblings[i - 1]))
    }

    fn next_sibling(&self, key: NodeKey) -> EditorResult<Option<NodeKey>> {
        let Some(parent) = self.parent_of(key)? else {
            return Ok(None);
        };
        let siblings = self.get(parent)?.children();
        Ok(siblings
            .iter()
            .position(|child| *child == key)
            .and_then(|i| siblings.get(i + 1).copied()))
    }

    /// Ancestors from the parent up to the root
    fn ancestors(&self, key: NodeKey) -> EditorResult<Vec<NodeKey>> {
        let mut out = Vec::new();
        let mut current = self.parent_of(key)?;
        while let Some(parent) = current {
            if out.contains(&parent) {
                return Err(EditorError::InvalidState(format!(
                    "parent cycle through {}",
                    parent
                )));
            }
            out.push(parent);
            current = self.parent_of(parent)?;
        }
        Ok(out)
    }

    /// Whether `key` sits somewhere below `ancestor`
    fn is_descendant_of(&self, key: NodeKey, ancestor: NodeKey) -> EditorResult<bool> {
        Ok(self.ancestors(key)?.contains(&ancestor))
    }

    /// Reachable from the root through parent links
    fn is_attached(&self, key: NodeKey) -> bool {
        if key.is_root() {
            return true;
        }
        match self.ancestors(key) {
            Ok(ancestors) => ancestors.last() == Some(&NodeKey::ROOT),
            Err(_) => false,
        }
    }

    /// Direct child of the root containing `key`
    fn top_level_element(&self, key: NodeKey) -> EditorResult<Option<NodeKey>> {
        if key.is_root() {
            return Ok(None);
        }
        let mut current = key;
        loop {
            match self.parent_of(current)? {
                Some(parent) if parent.is_root() => return Ok(Some(current)),
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Closest ancestor-or-self that is a non-inline element
    fn nearest_block(&self, key: NodeKey) -> EditorResult<Option<NodeKey>> {
        let mut current = Some(key);
        while let Some(k) = current {
            let node = self.get(k)?;
            if node.is_root() {
                return Ok(None);
            }
            if node.is_element() && !self.registry().behavior_for(node).is_inline(node) {
                return Ok(Some(k));
            }
            current = node.parent();
        }
        Ok(None)
    }

    fn first_descendant(&self, key: NodeKey) -> EditorResult<NodeKey> {
        let mut current = key;
        while let Some(first) = self.get(current)?.children().first() {
            current = *first;
        }
        Ok(current)
    }

    fn last_descendant(&self, key: NodeKey) -> EditorResult<NodeKey> {
        let mut current = key;
        while let Some(last) = self.get(current)?.children().last() {
            current = *last;
        }
        Ok(current)
    }

    /// Index path from the root
    fn path(&self, key: NodeKey) -> EditorResult<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = key;
        while let Some(parent) = self.parent_of(current)? {
            let index = self
                .get(parent)?
                .children()
                .iter()
                .position(|c| *c == current)
                .ok_or_else(|| {
                    EditorError::InvalidState(format!("{} is missing from its parent", current))
                })?;
            path.push(index);
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Document order of two nodes
    fn compare_order(&self, a: NodeKey, b: NodeKey) -> EditorResult<Ordering> {
        Ok(self.path(a)?.cmp(&self.path(b)?))
    }

    /// Text of a node: leaves report their own, elements join their
    /// children and separate blocks with a blank line
    fn text_content(&self, key: NodeKey) -> EditorResult<String> {
        let node = self.get(key)?;
        let behavior = self.registry().behavior_for(node);
        if let Some(text) = behavior.text_content(node) {
            return Ok(text);
        }
        let mut out = String::new();
        let children = node.children();
        for (i, child) in children.iter().enumerate() {
            out.push_str(&self.text_content(*child)?);
            let child_node = self.get(*child)?;
            let is_block = child_node.is_element()
                && !self.registry().behavior_for(child_node).is_inline(child_node);
            if is_block && i + 1 < children.len() {
                out.push_str(DOUBLE_LINE_BREAK);
            }
        }
        Ok(out)
    }

    /// All nodes below `key` in document order, `key` excluded
    fn descendants(&self, key: NodeKey) -> EditorResult<Vec<NodeKey>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeKey> = self.get(key)?.children().iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.get(next)?.children().iter().rev().copied());
        }
        Ok(out)
    }

    /// Leaves below `key` in document order
    fn leaves(&self, key: NodeKey) -> EditorResult<Vec<NodeKey>> {
        let mut out = Vec::new();
        for k in self.descendants(key)? {
            if !self.get(k)?.is_element() {
                out.push(k);
            }
        }
        Ok(out)
    }

    /// Closure check: every child points back at its parent, every parent
    /// link resolves and every node is reachable from the root
    fn check_integrity(&self) -> EditorResult<()> {
        let root = self.root()?;
        if root.parent().is_some() {
            return Err(EditorError::InvalidState("root has a parent".into()));
        }
        let mut seen = 1usize;
        for key in self.descendants(NodeKey::ROOT)? {
            let node = self.get(key)?;
            let parent = node
                .parent()
                .ok_or_else(|| EditorError::InvalidState(format!("{} has no parent", key)))?;
            if !self.get(parent)?.children().contains(&key) {
                return Err(EditorError::InvalidState(format!(
                    "{} is not listed by its parent {}",
                    key, parent
                )));
            }
            if !node.is_element() && !node.children().is_empty() {
                return Err(EditorError::InvalidState(format!("leaf {} has children", key)));
            }
            seen += 1;
        }
        if seen != self.node_map().len() {
            return Err(EditorError::InvalidState(format!(
                "{} nodes are unreachable from the root",
                self.node_map().len() - seen
            )));
        }
        Ok(())
    }
}
