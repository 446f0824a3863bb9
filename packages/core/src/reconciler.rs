//! # Reconciler
//!
//! Brings a [`Surface`] from rendering one [`EditorState`] to rendering the
//! next. Work is limited to dirty keys: a subtree whose root is clean and
//! shared between both states (same `Arc`) is skipped outright.
//!
//! Child lists are diffed by key. Children that keep their relative order
//! (a longest increasing subsequence of their previous positions) stay where
//! they are; everything else is inserted or moved in place, walking from
//! the end with the following sibling as anchor. Nodes that moved to another
//! parent keep their surface element and are adopted by the new parent.

use crate::config::EditorConfig;
use crate::dom::{DomElement, DomId, DomPoint, DomSelection, Surface};
use crate::editor_state::EditorState;
use crate::errors::{EditorError, EditorResult};
use crate::key::NodeKey;
use crate::node::NodeKind;
use crate::selection::{Point, PointKind, Selection};
use crate::transaction::DirtySet;
use crate::tree::TreeView;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Counts of surface work done by one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub moved: usize,
    pub destroyed: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Reconciler {
    surface: Box<dyn Surface>,
    key_to_dom: HashMap<NodeKey, DomId>,
    dom_to_key: HashMap<DomId, NodeKey>,
    /// Text node holding the characters of a text element
    text_dom: HashMap<NodeKey, DomId>,
    /// Last element description written for each key
    rendered: HashMap<NodeKey, DomElement>,
}

/// Per-pass context
struct Pass<'a> {
    prev: &'a EditorState,
    next: &'a EditorState,
    dirty: &'a DirtySet,
    config: &'a EditorConfig,
    report: ReconcileReport,
}

impl Reconciler {
    /// Take over a surface and render `state` into it
    pub fn mount(
        surface: Box<dyn Surface>,
        state: &EditorState,
        config: &EditorConfig,
    ) -> EditorResult<(Self, ReconcileReport)> {
        let mut reconciler = Self {
            surface,
            key_to_dom: HashMap::new(),
            dom_to_key: HashMap::new(),
            text_dom: HashMap::new(),
            rendered: HashMap::new(),
        };
        let report = reconciler.render(state, config)?;
        Ok((reconciler, report))
    }

    /// Throw away everything below the surface root and render `state` afresh
    pub fn render(&mut self, state: &EditorState, config: &EditorConfig) -> EditorResult<ReconcileReport> {
        let root_dom = self.surface.root();
        for child in self.surface.children(root_dom).to_vec() {
            self.surface.release(child);
        }
        self.key_to_dom.clear();
        self.dom_to_key.clear();
        self.text_dom.clear();
        self.rendered.clear();
        self.bind(NodeKey::ROOT, root_dom);

        let mut pass = Pass {
            prev: state,
            next: state,
            dirty: &DirtySet::default(),
            config,
            report: ReconcileReport::default(),
        };
        for child in state.children_of(NodeKey::ROOT)? {
            let dom = self.create_subtree(&mut pass, *child)?;
            self.surface.insert_before(root_dom, dom, None);
        }
        debug!(created = pass.report.created, "surface rendered");
        Ok(pass.report)
    }

    /// Apply the difference between `prev` and `next`
    #[instrument(skip_all, fields(version = next.version()))]
    pub fn reconcile(
        &mut self,
        prev: &EditorState,
        next: &EditorState,
        dirty: &DirtySet,
        config: &EditorConfig,
    ) -> EditorResult<ReconcileReport> {
        let mut pass = Pass {
            prev,
            next,
            dirty,
            config,
            report: ReconcileReport::default(),
        };
        if !dirty.is_empty() {
            self.reconcile_node(&mut pass, NodeKey::ROOT)?;
        }
        Ok(pass.report)
    }

    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> &mut dyn Surface {
        self.surface.as_mut()
    }

    pub fn into_surface(self) -> Box<dyn Surface> {
        self.surface
    }

    pub fn dom_for(&self, key: NodeKey) -> Option<DomId> {
        self.key_to_dom.get(&key).copied()
    }

    pub fn text_dom_for(&self, key: NodeKey) -> Option<DomId> {
        self.text_dom.get(&key).copied()
    }

    pub fn key_for(&self, dom: DomId) -> Option<NodeKey> {
        self.dom_to_key.get(&dom).copied()
    }

    /// Key of the closest node rendered at or above a surface node
    pub fn nearest_key(&self, dom: DomId) -> Option<NodeKey> {
        let mut current = Some(dom);
        while let Some(id) = current {
            if let Some(key) = self.dom_to_key.get(&id) {
                return Some(*key);
            }
            current = self.surface.parent(id);
        }
        None
    }

    fn bind(&mut self, key: NodeKey, dom: DomId) {
        if let Some(old) = self.key_to_dom.insert(key, dom) {
            self.dom_to_key.remove(&old);
        }
        self.dom_to_key.insert(dom, key);
    }

    fn unbind(&mut self, key: NodeKey) {
        if let Some(dom) = self.key_to_dom.remove(&key) {
            self.dom_to_key.remove(&dom);
        }
        if let Some(text) = self.text_dom.remove(&key) {
            self.dom_to_key.remove(&text);
        }
        self.rendered.remove(&key);
    }

    fn write_element(&mut self, element: &DomElement) -> DomId {
        let id = self.surface.create_element(&element.tag);
        for (name, value) in &element.attributes {
            self.surface.set_attribute(id, name, value);
        }
        id
    }

    fn create_subtree(&mut self, pass: &mut Pass<'_>, key: NodeKey) -> EditorResult<DomId> {
        let node = pass.next.get(key)?;
        let behavior = pass.next.registry().behavior_for(node);
        let element = behavior.create_dom(node, pass.config);
        let id = self.write_element(&element);
        self.bind(key, id);
        self.rendered.insert(key, element);
        pass.report.created += 1;

        match node.kind() {
            NodeKind::Text(text) => {
                let text_id = self.surface.create_text(&text.text);
                self.surface.insert_before(id, text_id, None);
                self.text_dom.insert(key, text_id);
                self.dom_to_key.insert(text_id, key);
            }
            NodeKind::Root(data) | NodeKind::Element(data) => {
                for child in &data.children {
                    let child_id = self.create_subtree(pass, *child)?;
                    self.surface.insert_before(id, child_id, None);
                }
            }
            NodeKind::Decorator(_) | NodeKind::LineBreak => {}
        }
        Ok(id)
    }

    /// Remove the surface element of a node that left its parent. Nodes that
    /// are still attached in the next state moved elsewhere and keep theirs.
    fn destroy(&mut self, pass: &mut Pass<'_>, key: NodeKey) -> EditorResult<()> {
        if pass.next.contains(key) && pass.next.is_attached(key) {
            return Ok(());
        }
        let Some(dom) = self.dom_for(key) else {
            return Ok(());
        };

        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if k != key && pass.next.contains(k) && pass.next.is_attached(k) {
                // Moved elsewhere. Its new parent may already have adopted
                // it; only detach while it still sits under `dom`.
                if let Some(child_dom) = self.dom_for(k) {
                    if self.surface_contains(dom, child_dom) {
                        if let Some(parent_dom) = self.surface.parent(child_dom) {
                            self.surface.remove_child(parent_dom, child_dom);
                        }
                    }
                }
                continue;
            }
            if let Some(node) = pass.prev.node(k) {
                stack.extend_from_slice(node.children());
            }
            self.unbind(k);
            pass.report.destroyed += 1;
        }

        if let Some(parent) = self.surface.parent(dom) {
            self.surface.remove_child(parent, dom);
        }
        self.surface.release(dom);
        Ok(())
    }

    /// Whether `node` is a surface descendant of `ancestor`
    fn surface_contains(&self, ancestor: DomId, node: DomId) -> bool {
        let mut current = self.surface.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.surface.parent(id);
        }
        false
    }

    fn reconcile_node(&mut self, pass: &mut Pass<'_>, key: NodeKey) -> EditorResult<DomId> {
        let mut dom = self
            .dom_for(key)
            .ok_or_else(|| EditorError::Reconciliation(format!("{} has no surface element", key)))?;
        let shared = pass.prev.shares_node(pass.next, key);
        if shared && !pass.dirty.contains(key) {
            return Ok(dom);
        }

        let next_node = pass.next.get(key)?;
        let prev_node = pass.prev.get(key)?;

        if !shared && !key.is_root() {
            let behavior = pass.next.registry().behavior_for(next_node);
            let previous = self.rendered.get(&key).cloned().unwrap_or_default();
            let mut element = previous.clone();
            if behavior.update_dom(prev_node, next_node, &mut element, pass.config) {
                let fresh = behavior.create_dom(next_node, pass.config);
                dom = self.replace_element(key, dom, fresh)?;
                pass.report.replaced += 1;
            } else if self.apply_attributes(dom, &previous, &element) {
                self.rendered.insert(key, element);
                pass.report.updated += 1;
            }

            if let NodeKind::Text(text) = next_node.kind() {
                if let Some(text_id) = self.text_dom_for(key) {
                    // Leave the surface alone when it already shows this text
                    if self.surface.text(text_id) != Some(text.text.as_str()) {
                        self.surface.set_text(text_id, &text.text);
                        pass.report.updated += 1;
                    }
                }
            }
        }

        if next_node.is_element() {
            let prev_children = prev_node.children().to_vec();
            let next_children = next_node.children().to_vec();
            self.reconcile_children(pass, &prev_children, &next_children, dom)?;
        }
        Ok(dom)
    }

    /// Write attribute differences; returns whether anything was written
    fn apply_attributes(&mut self, dom: DomId, previous: &DomElement, element: &DomElement) -> bool {
        let mut changed = false;
        for (name, value) in &element.attributes {
            if previous.attributes.get(name) != Some(value) {
                self.surface.set_attribute(dom, name, value);
                changed = true;
            }
        }
        for name in previous.attributes.keys() {
            if !element.attributes.contains_key(name) {
                self.surface.remove_attribute(dom, name);
                changed = true;
            }
        }
        changed
    }

    /// New element in place of `old`; existing children are re-parented
    /// into it rather than rebuilt
    fn replace_element(&mut self, key: NodeKey, old: DomId, element: DomElement) -> EditorResult<DomId> {
        let parent = self
            .surface
            .parent(old)
            .ok_or_else(|| EditorError::Reconciliation(format!("{} is not on the surface", key)))?;
        let id = self.write_element(&element);
        for child in self.surface.children(old).to_vec() {
            self.surface.insert_before(id, child, None);
        }
        self.surface.insert_before(parent, id, Some(old));
        self.surface.remove_child(parent, old);
        self.surface.release(old);

        self.bind(key, id);
        self.rendered.insert(key, element);
        debug!(key = %key, "surface element replaced");
        Ok(id)
    }

    fn reconcile_children(
        &mut self,
        pass: &mut Pass<'_>,
        prev: &[NodeKey],
        next: &[NodeKey],
        parent_dom: DomId,
    ) -> EditorResult<()> {
        if prev == next {
            for child in next {
                self.reconcile_node(pass, *child)?;
            }
            return Ok(());
        }

        let next_set: HashSet<NodeKey> = next.iter().copied().collect();
        for child in prev {
            if !next_set.contains(child) {
                self.destroy(pass, *child)?;
            }
        }

        let prev_index: HashMap<NodeKey, usize> =
            prev.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        let sources: Vec<Option<usize>> = next.iter().map(|k| prev_index.get(k).copied()).collect();
        let stable = longest_increasing(&sources);

        let mut anchor: Option<DomId> = None;
        for (i, child) in next.iter().enumerate().rev() {
            let existing = self.dom_for(*child).is_some();
            let dom = if existing {
                self.reconcile_node(pass, *child)?
            } else {
                self.create_subtree(pass, *child)?
            };
            if !stable.contains(&i) {
                self.surface.insert_before(parent_dom, dom, anchor);
                if existing {
                    pass.report.moved += 1;
                }
            }
            anchor = Some(dom);
        }
        Ok(())
    }

    /// Push the state's selection to the surface. Keys that no longer
    /// resolve fall back to the nearest rendered ancestor.
    pub fn sync_selection(&mut self, state: &EditorState) {
        let selection = match state.selection() {
            Some(Selection::Range(range)) => {
                match (self.dom_point(state, &range.anchor), self.dom_point(state, &range.focus)) {
                    (Some(anchor), Some(focus)) => Some(DomSelection { anchor, focus }),
                    _ => None,
                }
            }
            Some(Selection::Node(_)) | None => None,
        };
        self.surface.set_selection(selection);
    }

    fn dom_point(&self, state: &EditorState, point: &Point) -> Option<DomPoint> {
        let direct = match point.kind {
            PointKind::Text => self.text_dom_for(point.key),
            PointKind::Element => self.dom_for(point.key),
        };
        if let Some(node) = direct {
            return Some(DomPoint {
                node,
                offset: point.offset,
            });
        }

        let mut child = point.key;
        while let Ok(Some(parent)) = state.parent_of(child) {
            if let Some(node) = self.dom_for(parent) {
                let offset = state.index_within_parent(child).ok().flatten().unwrap_or(0);
                return Some(DomPoint { node, offset });
            }
            child = parent;
        }
        None
    }

    /// Model position for a surface position
    pub fn resolve_dom_point(&self, state: &EditorState, point: DomPoint) -> Option<Point> {
        let key = self.nearest_key(point.node)?;
        let node = state.node(key)?;
        if self.text_dom_for(key) == Some(point.node) || (node.is_text() && self.dom_for(key) == Some(point.node)) {
            return Some(Point::text(key, point.offset.min(node.text_len())));
        }
        if node.is_element() {
            return Some(Point::element(key, point.offset.min(node.children().len())));
        }
        let parent = node.parent()?;
        let index = state.index_within_parent(key).ok().flatten()?;
        Some(Point::element(parent, index + usize::from(point.offset > 0)))
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("rendered", &self.key_to_dom.len())
            .finish()
    }
}

/// Positions (into `sources`) of a longest strictly increasing subsequence
/// of the `Some` values
fn longest_increasing(sources: &[Option<usize>]) -> HashSet<usize> {
    // tails[k]: position ending the best subsequence of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; sources.len()];

    for (i, source) in sources.iter().enumerate() {
        let Some(value) = source else {
            continue;
        };
        let at = tails.partition_point(|&t| sources[t].map_or(false, |v| v < *value));
        if at > 0 {
            predecessor[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }

    let mut out = HashSet::new();
    let mut current = tails.last().copied();
    while let Some(i) = current {
        out.insert(i);
        current = predecessor[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_increasing() {
        let sources = vec![Some(1), Some(0), None, Some(2), Some(3)];
        let stable = longest_increasing(&sources);
        assert_eq!(stable.len(), 3);
        assert!(stable.contains(&3));
        assert!(stable.contains(&4));
        assert!(!stable.contains(&2));
    }

    #[test]
    fn test_longest_increasing_reversed() {
        let sources = vec![Some(3), Some(2), Some(1), Some(0)];
        assert_eq!(longest_increasing(&sources).len(), 1);
    }

    #[test]
    fn test_longest_increasing_identity() {
        let sources: Vec<_> = (0..5).map(Some).collect();
        assert_eq!(longest_increasing(&sources).len(), 5);
    }
}
