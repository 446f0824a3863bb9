//! # Transactions
//!
//! A [`Transaction`] is the only way to change a document. It wraps the
//! tick's pending working state: a copy of the committed node table whose
//! nodes are cloned the first time they are written (`Arc::make_mut`), the
//! pending selection, the dirty sets that scope reconciliation, and the
//! update tags.
//!
//! Every structural operation validates before it mutates, so a failed
//! operation leaves the working table untouched. Errors still abort the
//! whole tick: the editor discards the pending state and keeps the last
//! committed one.

use crate::commands::Command;
use crate::config::EditorConfig;
use crate::editor_state::EditorState;
use crate::errors::{EditorError, EditorResult};
use crate::key::{KeyGenerator, NodeKey};
use crate::listeners::Listeners;
use crate::node::{
    char_len, splice_str, Direction, ElementFormat, Node, NodeBase, NodeInit, NodeKind, TextFormat,
    TextMode,
};
use crate::registry::NodeRegistry;
use crate::selection::{
    resolve_selection, NodeSelection, Point, PointKind, RangeSelection, Selection,
};
use crate::tree::{NodeMap, TreeView};
use serde_json::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Keys touched during a tick
#[derive(Debug, Clone, Default)]
pub struct DirtySet {
    pub leaves: HashSet<NodeKey>,
    /// `true` when the element itself changed, `false` when only something
    /// below it did
    pub elements: HashMap<NodeKey, bool>,
    /// Intentional marks not yet seen by node transforms
    pub(crate) recent: HashSet<NodeKey>,
}

impl DirtySet {
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.elements.is_empty()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.leaves.contains(&key) || self.elements.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.leaves.iter().chain(self.elements.keys()).copied()
    }
}

/// Working state of one tick
#[derive(Debug, Clone)]
pub(crate) struct PendingState {
    pub nodes: NodeMap,
    pub selection: Option<Selection>,
    pub dirty: DirtySet,
    pub tags: HashSet<String>,
}

impl PendingState {
    pub fn from_state(state: &EditorState) -> Self {
        Self {
            nodes: (*state.nodes).clone(),
            selection: state.selection.clone(),
            dirty: DirtySet::default(),
            tags: HashSet::new(),
        }
    }

    /// Whether committing would produce a state different from `prev`
    pub fn differs_from(&self, prev: &EditorState) -> bool {
        if self.selection != prev.selection || self.nodes.len() != prev.nodes.len() {
            return true;
        }
        self.dirty.keys().any(|key| {
            match (self.nodes.get(&key), prev.nodes.get(&key)) {
                (Some(a), Some(b)) => !Arc::ptr_eq(a, b) && **a != **b,
                (None, None) => false,
                _ => true,
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Place {
    Append,
    At(usize),
    Before(NodeKey),
    After(NodeKey),
}

/// Write access to the pending state of the current tick
pub struct Transaction<'a> {
    pending: &'a mut PendingState,
    registry: &'a NodeRegistry,
    config: &'a EditorConfig,
    listeners: &'a RefCell<Listeners>,
    keys: &'a KeyGenerator,
    composition: Option<NodeKey>,
}

impl TreeView for Transaction<'_> {
    fn node_map(&self) -> &NodeMap {
        &self.pending.nodes
    }

    fn registry(&self) -> &NodeRegistry {
        self.registry
    }
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        pending: &'a mut PendingState,
        registry: &'a NodeRegistry,
        config: &'a EditorConfig,
        listeners: &'a RefCell<Listeners>,
        keys: &'a KeyGenerator,
        composition: Option<NodeKey>,
    ) -> Self {
        Self {
            pending,
            registry,
            config,
            listeners,
            keys,
            composition,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        self.config
    }

    /// Key of the text node under an active IME composition
    pub fn composition_key(&self) -> Option<NodeKey> {
        self.composition
    }

    pub(crate) fn dirty(&self) -> &DirtySet {
        &self.pending.dirty
    }

    pub(crate) fn take_recent(&mut self) -> HashSet<NodeKey> {
        std::mem::take(&mut self.pending.dirty.recent)
    }

    // ---- creation -------------------------------------------------------

    /// Create a detached node of `node_type`. When the registry replaces that
    /// type, the replacement is created instead; always use the returned key.
    #[must_use = "the created node may be a replacement; use the returned key"]
    pub fn create_node(&mut self, node_type: &str, init: NodeInit) -> EditorResult<NodeKey> {
        let resolved = self.registry.resolve(node_type).to_string();
        let behavior = self.registry.get(&resolved)?;
        if behavior.base() != init.base() {
            return Err(EditorError::BaseMismatch {
                node_type: resolved,
                expected: behavior.base().name(),
                actual: init.base().name(),
            });
        }
        if init.base() == NodeBase::Root {
            return Err(EditorError::invalid_move("a document has exactly one root"));
        }
        if resolved != node_type {
            debug!(from = node_type, to = %resolved, "node replaced on creation");
        }
        Ok(self.insert_new(resolved, init))
    }

    fn insert_new(&mut self, node_type: String, init: NodeInit) -> NodeKey {
        let key = self.keys.next_key();
        let mut node = Node::new(key, node_type, init.kind);
        node.props = init.props;
        self.pending.nodes.insert(key, Arc::new(node));
        self.mark_dirty(key);
        key
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> EditorResult<NodeKey> {
        self.create_node("text", NodeInit::text(text))
    }

    pub fn create_paragraph(&mut self) -> EditorResult<NodeKey> {
        self.create_node("paragraph", NodeInit::element())
    }

    pub fn create_line_break(&mut self) -> EditorResult<NodeKey> {
        self.create_node("linebreak", NodeInit::line_break())
    }

    pub fn create_decorator(&mut self, node_type: &str, payload: Value) -> EditorResult<NodeKey> {
        self.create_node(node_type, NodeInit::decorator(payload))
    }

    /// Copy of a node with a fresh key and no parent. Children are not copied.
    pub fn clone_detached(&mut self, key: NodeKey) -> EditorResult<NodeKey> {
        let node = self.get(key)?;
        let copy = self.registry.behavior_for(node).clone_node(node);
        let mut kind = copy.kind;
        if let NodeKind::Element(element) = &mut kind {
            element.children.clear();
        }
        let init = NodeInit {
            kind,
            props: copy.props,
        };
        Ok(self.insert_new(copy.node_type, init))
    }

    // ---- dirty tracking -------------------------------------------------

    fn mark_dirty(&mut self, key: NodeKey) {
        self.mark(key, true);
    }

    fn mark(&mut self, key: NodeKey, intentional: bool) {
        let Some((is_element, parent)) = self.node(key).map(|n| (n.is_element(), n.parent())) else {
            return;
        };
        if is_element {
            let entry = self.pending.dirty.elements.entry(key).or_insert(false);
            *entry |= intentional;
        } else {
            self.pending.dirty.leaves.insert(key);
        }
        if intentional {
            self.pending.dirty.recent.insert(key);
        }
        let mut current = parent;
        while let Some(parent) = current {
            self.pending.dirty.elements.entry(parent).or_insert(false);
            current = self.node(parent).and_then(Node::parent);
        }
    }

    /// Writable copy of a node; marks it dirty
    pub fn get_writable(&mut self, key: NodeKey) -> EditorResult<&mut Node> {
        if !self.pending.nodes.contains_key(&key) {
            return Err(EditorError::StaleNode(key));
        }
        self.mark_dirty(key);
        self.writable(key)
    }

    fn writable(&mut self, key: NodeKey) -> EditorResult<&mut Node> {
        let node = self
            .pending
            .nodes
            .get_mut(&key)
            .ok_or(EditorError::StaleNode(key))?;
        Ok(Arc::make_mut(node))
    }

    // ---- structure ------------------------------------------------------

    fn check_insertable(&self, parent: NodeKey, child: NodeKey) -> EditorResult<()> {
        let parent_node = self.get(parent)?;
        let child_node = self.get(child)?;
        if child.is_root() {
            return Err(EditorError::invalid_move("the root cannot be moved"));
        }
        if !parent_node.is_element() {
            return Err(EditorError::invalid_move(format!(
                "{} node {} cannot have children",
                parent_node.base(),
                parent
            )));
        }
        if parent == child || self.is_descendant_of(parent, child)? {
            return Err(EditorError::invalid_move(format!(
                "{} would become its own descendant",
                child
            )));
        }
        if parent_node.is_root() && !(child_node.is_element() || child_node.is_decorator()) {
            return Err(EditorError::invalid_move(format!(
                "{} node {} cannot be a child of the root",
                child_node.node_type(),
                child
            )));
        }
        Ok(())
    }

    fn attach(&mut self, parent: NodeKey, child: NodeKey, place: Place) -> EditorResult<()> {
        self.check_insertable(parent, child)?;
        if let Place::Before(sibling) | Place::After(sibling) = place {
            if sibling == child {
                return Err(EditorError::invalid_move(format!(
                    "{} cannot be placed next to itself",
                    child
                )));
            }
        }
        self.detach(child)?;
        let children = self.get(parent)?.children();
        let index = match place {
            Place::Append => children.len(),
            Place::At(i) => i.min(children.len()),
            Place::Before(sibling) | Place::After(sibling) => {
                let i = children.iter().position(|c| *c == sibling).ok_or_else(|| {
                    EditorError::InvalidState(format!("{} is not a child of {}", sibling, parent))
                })?;
                if matches!(place, Place::After(_)) {
                    i + 1
                } else {
                    i
                }
            }
        };
        self.mark_dirty(parent);
        if let Some(element) = self.writable(parent)?.element_mut() {
            element.children.insert(index, child);
        }
        self.writable(child)?.parent = Some(parent);
        self.mark_dirty(child);
        Ok(())
    }

    /// Unlink a node from its parent, leaving it in the table
    fn detach(&mut self, key: NodeKey) -> EditorResult<()> {
        let Some(parent) = self.get(key)?.parent() else {
            return Ok(());
        };
        self.mark_dirty(key);
        self.mark_dirty(parent);
        if let Some(element) = self.writable(parent)?.element_mut() {
            element.children.retain(|c| *c != key);
        }
        self.writable(key)?.parent = None;
        Ok(())
    }

    fn parent_for_sibling(&self, sibling: NodeKey) -> EditorResult<NodeKey> {
        self.get(sibling)?.parent().ok_or_else(|| {
            EditorError::invalid_move(format!("{} has no parent to insert into", sibling))
        })
    }

    /// Move or insert `child` as the last child of `parent`
    pub fn append(&mut self, parent: NodeKey, child: NodeKey) -> EditorResult<()> {
        self.attach(parent, child, Place::Append)
    }

    pub fn append_all(&mut self, parent: NodeKey, children: &[NodeKey]) -> EditorResult<()> {
        for child in children {
            self.append(parent, *child)?;
        }
        Ok(())
    }

    pub fn insert_at(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> EditorResult<()> {
        self.attach(parent, child, Place::At(index))
    }

    pub fn insert_after(&mut self, sibling: NodeKey, node: NodeKey) -> EditorResult<()> {
        let parent = self.parent_for_sibling(sibling)?;
        self.attach(parent, node, Place::After(sibling))
    }

    pub fn insert_before(&mut self, sibling: NodeKey, node: NodeKey) -> EditorResult<()> {
        let parent = self.parent_for_sibling(sibling)?;
        self.attach(parent, node, Place::Before(sibling))
    }

    /// Detach a node. The selection moves off it, and parents that cannot be
    /// empty go with their last child.
    pub fn remove(&mut self, key: NodeKey) -> EditorResult<()> {
        self.remove_node(key, true)
    }

    fn remove_node(&mut self, key: NodeKey, prune_parent: bool) -> EditorResult<()> {
        if key.is_root() {
            return Err(EditorError::invalid_move("the root cannot be removed"));
        }
        let Some(parent) = self.get(key)?.parent() else {
            return Ok(());
        };
        self.move_selection_off(key)?;
        self.detach(key)?;

        let parent_node = self.get(parent)?;
        if prune_parent
            && !parent_node.is_root()
            && parent_node.children().is_empty()
            && !self.registry.behavior_for(parent_node).can_be_empty()
        {
            debug!(key = %parent, "removing emptied element");
            self.remove_node(parent, true)?;
        }
        Ok(())
    }

    /// Put `new` where `old` is. With `include_children` the children of
    /// `old` move to `new`. Returns the key that now holds the position.
    pub fn replace(
        &mut self,
        old: NodeKey,
        new: NodeKey,
        include_children: bool,
    ) -> EditorResult<NodeKey> {
        if old == new {
            self.get(old)?;
            return Ok(new);
        }
        if old.is_root() {
            return Err(EditorError::invalid_move("the root cannot be replaced"));
        }
        self.get(new)?;
        if self.is_descendant_of(new, old)? {
            return Err(EditorError::invalid_move(format!(
                "{} cannot replace its ancestor {}",
                new, old
            )));
        }
        let parent = self.parent_for_sibling(old)?;
        self.attach(parent, new, Place::After(old))?;

        if include_children {
            if !self.get(new)?.is_element() {
                return Err(EditorError::NotAnElement(new));
            }
            let children = self.get(old)?.children().to_vec();
            for child in children {
                self.attach(new, child, Place::Append)?;
            }
        }
        self.redirect_selection(old, new)?;
        self.remove_node(old, false)?;
        Ok(new)
    }

    /// Remove `delete_count` children at `start`, then insert `nodes` there
    pub fn splice_children(
        &mut self,
        parent: NodeKey,
        start: usize,
        delete_count: usize,
        nodes: &[NodeKey],
    ) -> EditorResult<()> {
        let children = self.children_of(parent)?;
        let end = (start + delete_count).min(children.len());
        let doomed: Vec<NodeKey> = children.get(start.min(end)..end).unwrap_or(&[]).to_vec();
        for node in nodes {
            self.check_insertable(parent, *node)?;
        }
        for key in doomed {
            self.remove_node(key, false)?;
        }
        for (i, node) in nodes.iter().enumerate() {
            self.attach(parent, *node, Place::At(start + i))?;
        }
        Ok(())
    }

    // ---- text -----------------------------------------------------------

    fn text_mut(&mut self, key: NodeKey) -> EditorResult<&mut crate::node::TextData> {
        if !self.get(key)?.is_text() {
            return Err(EditorError::NotText(key));
        }
        self.mark_dirty(key);
        self.writable(key)?
            .text_data_mut()
            .ok_or(EditorError::NotText(key))
    }

    pub fn set_text(&mut self, key: NodeKey, text: impl Into<String>) -> EditorResult<()> {
        self.text_mut(key)?.text = text.into();
        Ok(())
    }

    /// Replace `delete` characters at `offset` with `insert`. Selection points
    /// after the edit shift with it.
    pub fn splice_text(
        &mut self,
        key: NodeKey,
        offset: usize,
        delete: usize,
        insert: &str,
    ) -> EditorResult<()> {
        let data = self.text_mut(key)?;
        let offset = offset.min(char_len(&data.text));
        data.text = splice_str(&data.text, offset, delete, insert);
        let inserted = char_len(insert);
        self.map_points(|p| {
            if p.key != key || p.offset <= offset {
                return;
            }
            p.offset = if p.offset >= offset + delete {
                p.offset - delete + inserted
            } else {
                offset
            };
        });
        Ok(())
    }

    /// Split a text node at character offsets. The first part keeps the key;
    /// the other parts are new siblings of the same type. Returns every part.
    pub fn split_text(&mut self, key: NodeKey, offsets: &[usize]) -> EditorResult<Vec<NodeKey>> {
        let node = self.get(key)?;
        let data = node.text_data().ok_or(EditorError::NotText(key))?.clone();
        let node_type = node.node_type().to_string();
        let props = node.props().clone();
        let len = char_len(&data.text);

        let mut cuts: Vec<usize> = offsets.iter().copied().filter(|o| *o > 0 && *o < len).collect();
        cuts.sort_unstable();
        cuts.dedup();
        if cuts.is_empty() {
            return Ok(vec![key]);
        }

        let mut bounds = vec![0];
        bounds.extend(&cuts);
        bounds.push(len);
        let chars: Vec<char> = data.text.chars().collect();
        let parts: Vec<String> = bounds
            .windows(2)
            .map(|w| chars[w[0]..w[1]].iter().collect())
            .collect();

        self.set_text(key, parts[0].clone())?;
        let mut keys = vec![key];
        let mut prev = key;
        for part in &parts[1..] {
            let init = NodeInit {
                kind: NodeKind::Text(crate::node::TextData {
                    text: part.clone(),
                    ..data.clone()
                }),
                props: props.clone(),
            };
            let next = self.insert_new(node_type.clone(), init);
            if self.get(key)?.parent().is_some() {
                self.insert_after(prev, next)?;
            }
            keys.push(next);
            prev = next;
        }

        self.map_points(|p| {
            if p.key != key {
                return;
            }
            let part = cuts.iter().filter(|c| **c < p.offset).count();
            p.offset -= bounds[part];
            p.key = keys[part];
        });
        Ok(keys)
    }

    /// Fold the next (or previous) text sibling into `key`, which keeps its
    /// key. Returns `key`.
    pub fn merge_with_sibling(&mut self, key: NodeKey, forward: bool) -> EditorResult<NodeKey> {
        let sibling = if forward {
            self.next_sibling(key)?
        } else {
            self.previous_sibling(key)?
        }
        .ok_or_else(|| EditorError::invalid_move(format!("{} has no sibling to merge", key)))?;

        let own = self.get(key)?.text_data().ok_or(EditorError::NotText(key))?;
        let other = self
            .get(sibling)?
            .text_data()
            .ok_or(EditorError::NotText(sibling))?;
        let own_len = char_len(&own.text);
        let other_len = char_len(&other.text);
        let merged = if forward {
            format!("{}{}", own.text, other.text)
        } else {
            format!("{}{}", other.text, own.text)
        };

        self.map_points(|p| {
            if forward && p.key == sibling {
                p.key = key;
                p.offset += own_len;
            } else if !forward && p.key == key {
                p.offset += other_len;
            } else if !forward && p.key == sibling {
                p.key = key;
            }
        });
        self.set_text(key, merged)?;
        self.remove_node(sibling, false)?;
        Ok(key)
    }

    // ---- properties -----------------------------------------------------

    pub fn set_prop(&mut self, key: NodeKey, name: &str, value: impl Into<Value>) -> EditorResult<()> {
        self.get_writable(key)?.props.insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn remove_prop(&mut self, key: NodeKey, name: &str) -> EditorResult<()> {
        self.get_writable(key)?.props.remove(name);
        Ok(())
    }

    pub fn set_format(&mut self, key: NodeKey, format: TextFormat) -> EditorResult<()> {
        self.text_mut(key)?.format = format;
        Ok(())
    }

    pub fn set_style(&mut self, key: NodeKey, style: impl Into<String>) -> EditorResult<()> {
        self.text_mut(key)?.style = style.into();
        Ok(())
    }

    pub fn set_mode(&mut self, key: NodeKey, mode: TextMode) -> EditorResult<()> {
        self.text_mut(key)?.mode = mode;
        Ok(())
    }

    fn element_mut(&mut self, key: NodeKey) -> EditorResult<&mut crate::node::ElementData> {
        self.get_writable(key)?
            .element_mut()
            .ok_or(EditorError::NotAnElement(key))
    }

    pub fn set_element_format(&mut self, key: NodeKey, format: ElementFormat) -> EditorResult<()> {
        self.element_mut(key)?.format = format;
        Ok(())
    }

    pub fn set_indent(&mut self, key: NodeKey, indent: u32) -> EditorResult<()> {
        self.element_mut(key)?.indent = indent;
        Ok(())
    }

    pub fn set_direction(&mut self, key: NodeKey, direction: Option<Direction>) -> EditorResult<()> {
        self.element_mut(key)?.direction = direction;
        Ok(())
    }

    pub fn set_payload(&mut self, key: NodeKey, payload: Value) -> EditorResult<()> {
        match &mut self.get_writable(key)?.kind {
            NodeKind::Decorator(data) => {
                data.payload = payload;
                Ok(())
            }
            _ => Err(EditorError::InvalidState(format!("{} is not a decorator", key))),
        }
    }

    // ---- selection ------------------------------------------------------

    pub fn selection(&self) -> Option<&Selection> {
        self.pending.selection.as_ref()
    }

    pub fn range_selection(&self) -> Option<RangeSelection> {
        self.pending.selection.as_ref().and_then(Selection::as_range).cloned()
    }

    pub fn node_selection(&self) -> Option<NodeSelection> {
        self.pending.selection.as_ref().and_then(Selection::as_node).cloned()
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.pending.selection = selection;
    }

    /// Range inside one text node; typing continues in the node's format
    pub fn select_text(&mut self, key: NodeKey, anchor: usize, focus: usize) -> EditorResult<()> {
        let node = self.get(key)?;
        if !node.is_text() {
            return Err(EditorError::NotText(key));
        }
        let mut range = RangeSelection::new(Point::text(key, anchor), Point::text(key, focus));
        range.format = node.format();
        self.set_selection(Some(Selection::Range(range)));
        Ok(())
    }

    /// Collapsed range at `point`, carrying the format of the text under it
    pub fn set_caret(&mut self, point: Point) {
        let format = match point.kind {
            PointKind::Text => self.node(point.key).map(Node::format).unwrap_or_default(),
            PointKind::Element => TextFormat::empty(),
        };
        let mut range = RangeSelection::collapsed(point);
        range.format = format;
        self.set_selection(Some(Selection::Range(range)));
    }

    /// Caret at the start of a node's content
    pub fn select_start(&mut self, key: NodeKey) -> EditorResult<()> {
        let point = self.start_point(key)?;
        self.set_caret(point);
        Ok(())
    }

    /// Caret at the end of a node's content
    pub fn select_end(&mut self, key: NodeKey) -> EditorResult<()> {
        let point = self.end_point(key)?;
        self.set_caret(point);
        Ok(())
    }

    pub fn select_nodes(&mut self, keys: impl IntoIterator<Item = NodeKey>) {
        self.set_selection(Some(Selection::Node(NodeSelection::with(keys))));
    }

    pub fn start_point(&self, key: NodeKey) -> EditorResult<Point> {
        let target = self.first_descendant(key)?;
        let node = self.get(target)?;
        if node.is_text() {
            Ok(Point::text(target, 0))
        } else if node.is_element() {
            Ok(Point::element(target, 0))
        } else {
            self.boundary_point(target, false)
        }
    }

    pub fn end_point(&self, key: NodeKey) -> EditorResult<Point> {
        let target = self.last_descendant(key)?;
        let node = self.get(target)?;
        if node.is_text() {
            Ok(Point::text(target, node.text_len()))
        } else if node.is_element() {
            Ok(Point::element(target, node.children().len()))
        } else {
            self.boundary_point(target, true)
        }
    }

    /// Element point just before or after a leaf that cannot hold a caret
    fn boundary_point(&self, key: NodeKey, after: bool) -> EditorResult<Point> {
        let parent = self.parent_for_sibling(key)?;
        let index = self.index_within_parent(key)?.unwrap_or(0);
        Ok(Point::element(parent, if after { index + 1 } else { index }))
    }

    fn map_points(&mut self, mut f: impl FnMut(&mut Point)) {
        if let Some(Selection::Range(range)) = self.pending.selection.as_mut() {
            f(&mut range.anchor);
            f(&mut range.focus);
        }
    }

    /// Move selection points that sit in or below `key` onto a neighbour
    fn move_selection_off(&mut self, key: NodeKey) -> EditorResult<()> {
        match self.pending.selection.clone() {
            Some(Selection::Node(mut nodes)) => {
                let below: Vec<NodeKey> = nodes
                    .keys()
                    .filter(|k| *k == key || self.is_descendant_of(*k, key).unwrap_or(false))
                    .collect();
                for k in below {
                    nodes.delete(k);
                }
                self.pending.selection = if nodes.is_empty() {
                    None
                } else {
                    Some(Selection::Node(nodes))
                };
            }
            Some(Selection::Range(range)) => {
                let inside = |p: &Point| p.key == key || self.is_descendant_of(p.key, key).unwrap_or(false);
                let (anchor_in, focus_in) = (inside(&range.anchor), inside(&range.focus));
                if !anchor_in && !focus_in {
                    return Ok(());
                }
                let outside = self.point_outside(key)?;
                self.map_points(|p| {
                    if (anchor_in && *p == range.anchor) || (focus_in && *p == range.focus) {
                        *p = outside;
                    }
                });
            }
            None => {}
        }
        Ok(())
    }

    /// Nearest caret position outside `key`: the end of a previous text
    /// sibling, the start of a next one, or the slot in the parent
    fn point_outside(&self, key: NodeKey) -> EditorResult<Point> {
        if let Some(prev) = self.previous_sibling(key)? {
            let node = self.get(prev)?;
            if node.is_text() {
                return Ok(Point::text(prev, node.text_len()));
            }
        }
        if let Some(next) = self.next_sibling(key)? {
            if self.get(next)?.is_text() {
                return Ok(Point::text(next, 0));
            }
        }
        let parent = self.parent_for_sibling(key)?;
        let index = self.index_within_parent(key)?.unwrap_or(0);
        Ok(Point::element(parent, index))
    }

    fn redirect_selection(&mut self, old: NodeKey, new: NodeKey) -> EditorResult<()> {
        let old_is_text = self.get(old)?.is_text();
        let new_node = self.get(new)?;
        let (new_is_text, new_len) = (new_node.is_text(), new_node.content_len());
        let fallback = self.start_point(new)?;
        if let Some(Selection::Node(nodes)) = self.pending.selection.as_mut() {
            if nodes.has(old) {
                nodes.delete(old);
                nodes.add(new);
            }
            return Ok(());
        }
        self.map_points(|p| {
            if p.key != old {
                return;
            }
            if old_is_text == new_is_text {
                p.key = new;
                p.offset = p.offset.min(new_len);
            } else {
                *p = fallback;
            }
        });
        Ok(())
    }

    // ---- commands and tags ----------------------------------------------

    /// Run the handlers registered for `command`, highest priority first,
    /// until one returns `true`
    pub fn dispatch_command<P: 'static>(
        &mut self,
        command: &Command<P>,
        payload: P,
    ) -> EditorResult<bool> {
        let handlers = self.listeners.borrow().handlers(command.name());
        debug!(command = command.name(), handlers = handlers.len(), "dispatching command");
        for handler in handlers {
            if handler(&payload as &dyn Any, self)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.pending.tags.insert(tag.into());
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.pending.tags.contains(tag)
    }

    /// Replace the working tree and selection with those of `state`. Nodes
    /// that differ are marked dirty without scheduling their transforms.
    pub fn restore_state(&mut self, state: &EditorState) -> EditorResult<()> {
        let previous = std::mem::replace(&mut self.pending.nodes, (*state.nodes).clone());
        self.pending.selection = state.selection.clone();

        let changed: Vec<NodeKey> = self
            .pending
            .nodes
            .iter()
            .filter(|(key, node)| {
                previous
                    .get(key)
                    .map(|old| !Arc::ptr_eq(old, node))
                    .unwrap_or(true)
            })
            .map(|(key, _)| *key)
            .collect();
        for key in &changed {
            self.mark(*key, false);
        }
        for (key, node) in &previous {
            if !self.pending.nodes.contains_key(key) {
                if node.is_element() {
                    self.pending.dirty.elements.entry(*key).or_insert(false);
                } else {
                    self.pending.dirty.leaves.insert(*key);
                }
            }
        }
        debug!(changed = changed.len(), version = state.version, "restored state");
        Ok(())
    }

    // ---- commit-time passes ---------------------------------------------

    /// Remove an empty simple text node, or fold it into adjacent simple
    /// text runs that share its format and style
    pub(crate) fn normalize_text_node(&mut self, key: NodeKey) -> EditorResult<()> {
        let Some(node) = self.node(key) else {
            return Ok(());
        };
        if !self.is_mergeable(node) || !self.is_attached(key) {
            return Ok(());
        }
        if node.text().is_empty() {
            if self.composition != Some(key) {
                self.remove_node(key, false)?;
            }
            return Ok(());
        }

        let mut current = key;
        while let Some(prev) = self.previous_sibling(current)? {
            if !self.can_merge(prev, current)? {
                break;
            }
            current = self.merge_with_sibling(prev, true)?;
        }
        while let Some(next) = self.next_sibling(current)? {
            if !self.can_merge(current, next)? {
                break;
            }
            current = self.merge_with_sibling(current, true)?;
        }
        Ok(())
    }

    fn is_mergeable(&self, node: &Node) -> bool {
        node.is_simple_text() && !self.registry.behavior_for(node).is_text_entity()
    }

    fn can_merge(&self, a: NodeKey, b: NodeKey) -> EditorResult<bool> {
        let (a, b) = (self.get(a)?, self.get(b)?);
        if !self.is_mergeable(a) || !self.is_mergeable(b) {
            return Ok(false);
        }
        if self.composition == Some(a.key()) || self.composition == Some(b.key()) {
            return Ok(false);
        }
        let (ta, tb) = (a.text_data(), b.text_data());
        Ok(ta.map(|t| (t.format, &t.style)) == tb.map(|t| (t.format, &t.style)))
    }

    /// Drop nodes that were detached during the tick, with their subtrees
    pub(crate) fn collect_garbage(&mut self) -> Vec<NodeKey> {
        let candidates: Vec<NodeKey> = self.pending.dirty.keys().collect();
        let mut removed = Vec::new();
        for key in candidates {
            if !self.pending.nodes.contains_key(&key) || self.is_attached(key) {
                continue;
            }
            let mut stack = vec![key];
            while let Some(k) = stack.pop() {
                if let Some(node) = self.pending.nodes.remove(&k) {
                    stack.extend_from_slice(node.children());
                    removed.push(k);
                }
            }
        }
        removed
    }

    /// Clamp the pending selection, or drop it when it cannot be resolved
    pub(crate) fn validate_selection(&mut self) {
        let Some(selection) = self.pending.selection.take() else {
            return;
        };
        match resolve_selection(&*self, &selection) {
            Ok(resolved) => self.pending.selection = Some(resolved),
            Err(e) => warn!(error = %e, "selection collapsed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        pending: PendingState,
        registry: NodeRegistry,
        config: EditorConfig,
        listeners: RefCell<Listeners>,
        keys: KeyGenerator,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = NodeRegistry::new();
            let state = EditorState::empty(Arc::new(registry.clone()));
            Self {
                pending: PendingState::from_state(&state),
                registry,
                config: EditorConfig::default(),
                listeners: RefCell::new(Listeners::default()),
                keys: KeyGenerator::new(),
            }
        }

        fn tx(&mut self) -> Transaction<'_> {
            Transaction::new(
                &mut self.pending,
                &self.registry,
                &self.config,
                &self.listeners,
                &self.keys,
                None,
            )
        }
    }

    #[test]
    fn test_append_and_navigate() {
        let mut fixture = Fixture::new();
        let mut tx = fixture.tx();

        let p = tx.create_paragraph().unwrap();
        let a = tx.create_text("a").unwrap();
        let b = tx.create_text("b").unwrap();
        tx.append(NodeKey::ROOT, p).unwrap();
        tx.append(p, a).unwrap();
        tx.append(p, b).unwrap();

        assert_eq!(tx.children_of(p).unwrap(), &[a, b]);
        assert_eq!(tx.next_sibling(a).unwrap(), Some(b));
        assert_eq!(tx.previous_sibling(a).unwrap(), None);
        assert_eq!(tx.parent_of(b).unwrap(), Some(p));
        assert_eq!(tx.text_content(NodeKey::ROOT).unwrap(), "ab");
        assert!(tx.dirty().elements.get(&NodeKey::ROOT).is_some());
    }

    #[test]
    fn test_text_cannot_sit_under_root() {
        let mut fixture = Fixture::new();
        let mut tx = fixture.tx();

        let text = tx.create_text("loose").unwrap();
        let err = tx.append(NodeKey::ROOT, text).unwrap_err();
        assert!(matches!(err, EditorError::InvalidMove(_)));
    }

    #[test]
    fn test_leaf_cannot_have_children() {
        let mut fixture = Fixture::new();
        let mut tx = fixture.tx();

        let text = tx.create_text("leaf").unwrap();
        let other = tx.create_text("child").unwrap();
        assert!(matches!(
            tx.append(text, other),
            Err(EditorError::InvalidMove(_))
        ));
    }

    #[test]
    fn test_stale_key() {
        let mut fixture = Fixture::new();
        let mut tx = fixture.tx();
        assert!(matches!(
            tx.set_text(NodeKey(99), "x"),
            Err(EditorError::StaleNode(NodeKey(99)))
        ));
    }

    #[test]
    fn test_split_moves_selection() {
        let mut fixture = Fixture::new();
        let mut tx = fixture.tx();

        let p = tx.create_paragraph().unwrap();
        let t = tx.create_text("hello world").unwrap();
        tx.append(NodeKey::ROOT, p).unwrap();
        tx.append(p, t).unwrap();
        tx.select_text(t, 8, 8).unwrap();

        let parts = tx.split_text(t, &[5, 6]).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(tx.get(parts[0]).unwrap().text(), "hello");
        assert_eq!(tx.get(parts[1]).unwrap().text(), " ");
        assert_eq!(tx.get(parts[2]).unwrap().text(), "world");

        let range = tx.range_selection().unwrap();
        assert_eq!(range.anchor, Point::text(parts[2], 2));
    }

    #[test]
    fn test_normalize_merges_runs() {
        let mut fixture = Fixture::new();
        let mut tx = fixture.tx();

        let p = tx.create_paragraph().unwrap();
        let a = tx.create_text("foo").unwrap();
        let b = tx.create_text("bar").unwrap();
        let c = tx.create_text("!").unwrap();
        tx.set_format(c, TextFormat::BOLD).unwrap();
        tx.append(NodeKey::ROOT, p).unwrap();
        tx.append_all(p, &[a, b, c]).unwrap();
        tx.select_text(b, 1, 1).unwrap();

        tx.normalize_text_node(b).unwrap();

        assert_eq!(tx.children_of(p).unwrap(), &[a, c]);
        assert_eq!(tx.get(a).unwrap().text(), "foobar");
        assert_eq!(tx.range_selection().unwrap().anchor, Point::text(a, 4));
    }

    #[test]
    fn test_remove_prunes_and_collects() {
        let mut fixture = Fixture::new();
        let mut tx = fixture.tx();

        let p = tx.create_paragraph().unwrap();
        let t = tx.create_text("x").unwrap();
        tx.append(NodeKey::ROOT, p).unwrap();
        tx.append(p, t).unwrap();

        tx.remove(p).unwrap();
        let removed = tx.collect_garbage();
        assert!(removed.contains(&p));
        assert!(removed.contains(&t));
        assert!(tx.check_integrity().is_ok());
    }
}
