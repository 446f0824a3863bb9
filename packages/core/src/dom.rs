//! # Editable Surface
//!
//! The reconciler never talks to a concrete DOM. It drives a [`Surface`]: a
//! small set of DOM-like operations (create, attribute and text writes,
//! insert/move, removal, selection). Hosts implement the trait over their
//! real view layer; [`VirtualSurface`] is the in-memory implementation used by
//! tests, benchmarks and the CLI.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Surface-side node handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomId(pub u32);

/// Description of a surface element produced by a node behavior
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
}

impl DomElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Append a class to the `class` attribute
    pub fn with_class(mut self, class: impl AsRef<str>) -> Self {
        self.add_class(class.as_ref());
        self
    }

    pub fn add_class(&mut self, class: &str) {
        if class.is_empty() {
            return;
        }
        match self.attributes.get_mut("class") {
            Some(existing) if !existing.split_whitespace().any(|c| c == class) => {
                existing.push(' ');
                existing.push_str(class);
            }
            Some(_) => {}
            None => {
                self.attributes.insert("class".to_string(), class.to_string());
            }
        }
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Position inside the surface: a text node and character offset, or an
/// element and child index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomPoint {
    pub node: DomId,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomSelection {
    pub anchor: DomPoint,
    pub focus: DomPoint,
}

impl DomSelection {
    pub fn collapsed(point: DomPoint) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }
}

/// DOM-like operations the reconciler needs from a host view layer.
///
/// `insert_before` follows DOM semantics: inserting a node that already has a
/// parent moves it. `release` frees a detached node and its subtree.
pub trait Surface: Any {
    /// The editable root element owned by the host
    fn root(&self) -> DomId;

    fn create_element(&mut self, tag: &str) -> DomId;

    fn create_text(&mut self, text: &str) -> DomId;

    fn set_attribute(&mut self, node: DomId, name: &str, value: &str);

    fn remove_attribute(&mut self, node: DomId, name: &str);

    fn set_text(&mut self, node: DomId, text: &str);

    fn text(&self, node: DomId) -> Option<&str>;

    fn insert_before(&mut self, parent: DomId, child: DomId, before: Option<DomId>);

    fn remove_child(&mut self, parent: DomId, child: DomId);

    fn release(&mut self, node: DomId);

    fn parent(&self, node: DomId) -> Option<DomId>;

    fn children(&self, node: DomId) -> &[DomId];

    fn selection(&self) -> Option<DomSelection>;

    fn set_selection(&mut self, selection: Option<DomSelection>);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Counters of the operations applied to a [`VirtualSurface`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceStats {
    pub created: usize,
    pub attribute_writes: usize,
    pub text_writes: usize,
    pub inserts: usize,
    pub removals: usize,
    pub selection_writes: usize,
}

impl SurfaceStats {
    /// Structural and content mutations; selection writes are not counted
    pub fn mutations(&self) -> usize {
        self.created + self.attribute_writes + self.text_writes + self.inserts + self.removals
    }
}

#[derive(Debug, Clone)]
enum VirtualKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct VirtualNode {
    kind: VirtualKind,
    parent: Option<DomId>,
    children: Vec<DomId>,
}

/// In-memory surface
#[derive(Debug)]
pub struct VirtualSurface {
    nodes: HashMap<DomId, VirtualNode>,
    next_id: u32,
    root: DomId,
    selection: Option<DomSelection>,
    stats: SurfaceStats,
}

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input"];

impl VirtualSurface {
    pub fn new() -> Self {
        let root = DomId(0);
        let mut attributes = BTreeMap::new();
        attributes.insert("contenteditable".to_string(), "true".to_string());

        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            VirtualNode {
                kind: VirtualKind::Element {
                    tag: "div".to_string(),
                    attributes,
                },
                parent: None,
                children: Vec::new(),
            },
        );

        Self {
            nodes,
            next_id: 1,
            root,
            selection: None,
            stats: SurfaceStats::default(),
        }
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SurfaceStats::default();
    }

    /// Number of live surface nodes, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn tag(&self, node: DomId) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            VirtualKind::Element { tag, .. } => Some(tag),
            VirtualKind::Text(_) => None,
        }
    }

    pub fn attribute(&self, node: DomId, name: &str) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            VirtualKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            VirtualKind::Text(_) => None,
        }
    }

    pub fn contains(&self, node: DomId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Concatenated text below a node
    pub fn text_content(&self, node: DomId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: DomId, out: &mut String) {
        if let Some(n) = self.nodes.get(&node) {
            match &n.kind {
                VirtualKind::Text(text) => out.push_str(text),
                VirtualKind::Element { .. } => {
                    for child in &n.children {
                        self.collect_text(*child, out);
                    }
                }
            }
        }
    }

    /// Markup of everything below the root
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.nodes.get(&self.root) {
            for child in &root.children {
                self.write_html(*child, &mut out);
            }
        }
        out
    }

    fn write_html(&self, node: DomId, out: &mut String) {
        let Some(n) = self.nodes.get(&node) else {
            return;
        };
        match &n.kind {
            VirtualKind::Text(text) => out.push_str(&escape_html(text)),
            VirtualKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    let _ = write!(out, " {}=\"{}\"", name, escape_html(value));
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) && n.children.is_empty() {
                    return;
                }
                for child in &n.children {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{}>", tag);
            }
        }
    }

    fn alloc(&mut self, kind: VirtualKind) -> DomId {
        let id = DomId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            VirtualNode {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        self.stats.created += 1;
        id
    }

    fn detach(&mut self, child: DomId) {
        let parent = self.nodes.get(&child).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != child);
            }
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parent = None;
            }
        }
    }
}

impl Default for VirtualSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for VirtualSurface {
    fn root(&self) -> DomId {
        self.root
    }

    fn create_element(&mut self, tag: &str) -> DomId {
        self.alloc(VirtualKind::Element {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> DomId {
        self.alloc(VirtualKind::Text(text.to_string()))
    }

    fn set_attribute(&mut self, node: DomId, name: &str, value: &str) {
        if let Some(VirtualNode {
            kind: VirtualKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(&node)
        {
            attributes.insert(name.to_string(), value.to_string());
            self.stats.attribute_writes += 1;
        }
    }

    fn remove_attribute(&mut self, node: DomId, name: &str) {
        if let Some(VirtualNode {
            kind: VirtualKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(&node)
        {
            if attributes.remove(name).is_some() {
                self.stats.attribute_writes += 1;
            }
        }
    }

    fn set_text(&mut self, node: DomId, text: &str) {
        if let Some(VirtualNode {
            kind: VirtualKind::Text(existing),
            ..
        }) = self.nodes.get_mut(&node)
        {
            *existing = text.to_string();
            self.stats.text_writes += 1;
        }
    }

    fn text(&self, node: DomId) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            VirtualKind::Text(text) => Some(text),
            VirtualKind::Element { .. } => None,
        }
    }

    fn insert_before(&mut self, parent: DomId, child: DomId, before: Option<DomId>) {
        if !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            return;
        }
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(&parent) {
            let index = before
                .and_then(|b| p.children.iter().position(|c| *c == b))
                .unwrap_or(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        self.stats.inserts += 1;
    }

    fn remove_child(&mut self, parent: DomId, child: DomId) {
        let is_child = self
            .nodes
            .get(&child)
            .map(|c| c.parent == Some(parent))
            .unwrap_or(false);
        if is_child {
            self.detach(child);
            self.stats.removals += 1;
        }
    }

    fn release(&mut self, node: DomId) {
        if node == self.root {
            return;
        }
        self.detach(node);
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.remove(&id) {
                stack.extend(n.children);
            }
        }
    }

    fn parent(&self, node: DomId) -> Option<DomId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    fn children(&self, node: DomId) -> &[DomId] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn selection(&self) -> Option<DomSelection> {
        self.selection
    }

    fn set_selection(&mut self, selection: Option<DomSelection>) {
        if self.selection != selection {
            self.selection = selection;
            self.stats.selection_writes += 1;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_element_classes() {
        let el = DomElement::new("span").with_class("a").with_class("b").with_class("a");
        assert_eq!(el.attr("class"), Some("a b"));
    }

    #[test]
    fn test_insert_before_moves_existing_node() {
        let mut surface = VirtualSurface::new();
        let root = surface.root();
        let p1 = surface.create_element("p");
        let p2 = surface.create_element("p");
        let t = surface.create_text("hi");

        surface.insert_before(root, p1, None);
        surface.insert_before(root, p2, None);
        surface.insert_before(p1, t, None);
        assert_eq!(surface.to_html(), "<p>hi</p><p></p>");

        surface.insert_before(p2, t, None);
        assert_eq!(surface.to_html(), "<p></p><p>hi</p>");
        assert_eq!(surface.parent(t), Some(p2));

        surface.insert_before(root, p2, Some(p1));
        assert_eq!(surface.children(root), &[p2, p1]);
    }

    #[test]
    fn test_release_frees_subtree() {
        let mut surface = VirtualSurface::new();
        let root = surface.root();
        let p = surface.create_element("p");
        let t = surface.create_text("x");
        surface.insert_before(root, p, None);
        surface.insert_before(p, t, None);

        surface.release(p);
        assert!(!surface.contains(p));
        assert!(!surface.contains(t));
        assert!(surface.children(root).is_empty());
    }

    #[test]
    fn test_html_escapes_and_void_tags() {
        let mut surface = VirtualSurface::new();
        let root = surface.root();
        let p = surface.create_element("p");
        let t = surface.create_text("a < b");
        let br = surface.create_element("br");
        surface.insert_before(root, p, None);
        surface.insert_before(p, t, None);
        surface.insert_before(p, br, None);

        assert_eq!(surface.to_html(), "<p>a &lt; b<br></p>");
    }

    #[test]
    fn test_stats_count_mutations_not_selection() {
        let mut surface = VirtualSurface::new();
        let root = surface.root();
        let t = surface.create_text("x");
        surface.insert_before(root, t, None);
        surface.set_selection(Some(DomSelection::collapsed(DomPoint { node: t, offset: 0 })));

        let stats = surface.stats();
        assert_eq!(stats.mutations(), 2);
        assert_eq!(stats.selection_writes, 1);
    }
}
