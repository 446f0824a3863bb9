//! # Selection
//!
//! Range selections address positions by node key and offset. A text point's
//! offset counts characters; an element point's offset counts children.
//! Node selections hold a set of keys and are used by atomic nodes that
//! cannot be partially selected.

use crate::errors::{EditorError, EditorResult};
use crate::key::NodeKey;
use crate::node::TextFormat;
use crate::tree::TreeView;
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointKind {
    Text,
    Element,
}

/// A caret position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
    pub kind: PointKind,
}

impl Point {
    pub fn text(key: NodeKey, offset: usize) -> Self {
        Self {
            key,
            offset,
            kind: PointKind::Text,
        }
    }

    pub fn element(key: NodeKey, offset: usize) -> Self {
        Self {
            key,
            offset,
            kind: PointKind::Element,
        }
    }

    /// Position in the document as an index path, offset last
    pub fn path<T: TreeView + ?Sized>(&self, view: &T) -> EditorResult<Vec<usize>> {
        let mut path = view.path(self.key)?;
        path.push(self.offset);
        Ok(path)
    }

    pub fn compare<T: TreeView + ?Sized>(&self, other: &Point, view: &T) -> EditorResult<Ordering> {
        if self.key == other.key {
            return Ok(self.offset.cmp(&other.offset));
        }
        Ok(self.path(view)?.cmp(&other.path(view)?))
    }

    pub fn is_before<T: TreeView + ?Sized>(&self, other: &Point, view: &T) -> EditorResult<bool> {
        Ok(self.compare(other, view)? == Ordering::Less)
    }
}

/// Anchor and focus; the anchor stays put when the selection is extended
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSelection {
    pub anchor: Point,
    pub focus: Point,
    /// Format applied to text typed at a collapsed caret
    pub format: TextFormat,
}

impl RangeSelection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self {
            anchor,
            focus,
            format: TextFormat::empty(),
        }
    }

    pub fn collapsed(point: Point) -> Self {
        Self::new(point, point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Focus before anchor in document order
    pub fn is_backward<T: TreeView + ?Sized>(&self, view: &T) -> EditorResult<bool> {
        self.focus.is_before(&self.anchor, view)
    }

    /// Start and end points in document order
    pub fn start_end<T: TreeView + ?Sized>(&self, view: &T) -> EditorResult<(Point, Point)> {
        if self.is_backward(view)? {
            Ok((self.focus, self.anchor))
        } else {
            Ok((self.anchor, self.focus))
        }
    }

    /// Leaves and elements touched by the range, in document order
    pub fn nodes<T: TreeView + ?Sized>(&self, view: &T) -> EditorResult<Vec<NodeKey>> {
        let (start, end) = self.start_end(view)?;
        let first = point_node(view, &start, false)?;
        let last = point_node(view, &end, true)?;
        if first == last {
            return Ok(vec![first]);
        }
        let mut out = Vec::new();
        let mut inside = false;
        for key in view.descendants(NodeKey::ROOT)? {
            if key == first {
                inside = true;
            }
            if inside {
                out.push(key);
            }
            if key == last {
                break;
            }
        }
        Ok(out)
    }

    /// Plain text covered by the range
    pub fn text_content<T: TreeView + ?Sized>(&self, view: &T) -> EditorResult<String> {
        let (start, end) = self.start_end(view)?;
        let mut out = String::new();
        for key in self.nodes(view)? {
            let node = view.get(key)?;
            if node.is_element() {
                continue;
            }
            if node.is_text() {
                let len = node.text_len();
                let from = if key == start.key { start.offset.min(len) } else { 0 };
                let to = if key == end.key { end.offset.min(len) } else { len };
                out.extend(node.text().chars().skip(from).take(to.saturating_sub(from)));
            } else if let Some(text) = view.registry().behavior_for(node).text_content(node) {
                out.push_str(&text);
            }
        }
        Ok(out)
    }
}

/// Node a point sits on: the addressed child for element points, the
/// element itself when it has no child at that offset
fn point_node<T: TreeView + ?Sized>(view: &T, point: &Point, is_end: bool) -> EditorResult<NodeKey> {
    if point.kind == PointKind::Text {
        return Ok(point.key);
    }
    let children = view.children_of(point.key)?;
    if is_end {
        match point.offset.checked_sub(1).and_then(|i| children.get(i)) {
            Some(child) => view.last_descendant(*child),
            None => Ok(point.key),
        }
    } else {
        match children.get(point.offset) {
            Some(child) => view.first_descendant(*child),
            None => Ok(point.key),
        }
    }
}

/// Set of whole selected nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeSelection {
    keys: BTreeSet<NodeKey>,
}

impl NodeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(keys: impl IntoIterator<Item = NodeKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn add(&mut self, key: NodeKey) {
        self.keys.insert(key);
    }

    pub fn delete(&mut self, key: NodeKey) {
        self.keys.remove(&key);
    }

    pub fn has(&self, key: NodeKey) -> bool {
        self.keys.contains(&key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.keys.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Range(RangeSelection),
    Node(NodeSelection),
}

impl Selection {
    pub fn caret(point: Point) -> Self {
        Selection::Range(RangeSelection::collapsed(point))
    }

    pub fn as_range(&self) -> Option<&RangeSelection> {
        match self {
            Selection::Range(range) => Some(range),
            Selection::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeSelection> {
        match self {
            Selection::Node(nodes) => Some(nodes),
            Selection::Range(_) => None,
        }
    }

    /// Keys the selection refers to
    pub fn keys(&self) -> Vec<NodeKey> {
        match self {
            Selection::Range(range) => {
                if range.anchor.key == range.focus.key {
                    vec![range.anchor.key]
                } else {
                    vec![range.anchor.key, range.focus.key]
                }
            }
            Selection::Node(nodes) => nodes.keys().collect(),
        }
    }
}

/// Check a point against the tree and clamp its offset. Points on missing,
/// detached or wrongly-kinded nodes cannot be resolved.
pub fn resolve_point<T: TreeView + ?Sized>(view: &T, point: &Point) -> EditorResult<Point> {
    let node = view
        .node(point.key)
        .ok_or_else(|| EditorError::SelectionResolution(format!("{} is gone", point.key)))?;
    if !view.is_attached(point.key) {
        return Err(EditorError::SelectionResolution(format!(
            "{} is detached",
            point.key
        )));
    }
    let expected = match point.kind {
        PointKind::Text => node.is_text(),
        PointKind::Element => node.is_element(),
    };
    if !expected {
        return Err(EditorError::SelectionResolution(format!(
            "{} cannot hold a {:?} point",
            point.key, point.kind
        )));
    }
    Ok(Point {
        offset: point.offset.min(node.content_len()),
        ..*point
    })
}

/// Validate a selection against the tree. Range offsets are clamped, node
/// selections drop keys that are no longer attached; anything else fails
/// with `SelectionResolution`.
pub fn resolve_selection<T: TreeView + ?Sized>(
    view: &T,
    selection: &Selection,
) -> EditorResult<Selection> {
    match selection {
        Selection::Range(range) => Ok(Selection::Range(RangeSelection {
            anchor: resolve_point(view, &range.anchor)?,
            focus: resolve_point(view, &range.focus)?,
            format: range.format,
        })),
        Selection::Node(nodes) => {
            let live = NodeSelection::with(nodes.keys().filter(|k| view.is_attached(*k)));
            if live.is_empty() && !nodes.is_empty() {
                return Err(EditorError::SelectionResolution(
                    "every selected node is gone".into(),
                ));
            }
            Ok(Selection::Node(live))
        }
    }
}
