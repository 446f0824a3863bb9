//! # Document Nodes
//!
//! A document is a tree of [`Node`]s addressed by [`NodeKey`]. Every node is
//! one of a closed set of base variants ([`NodeKind`]); plugin node types
//! specialize a base variant through a type tag and a
//! [`NodeBehavior`](crate::registry::NodeBehavior) registered for that tag.
//!
//! Type-specific fields such as a heading's tag live in the node's property
//! bag, so every node type shares one storage layout and one serializer.

use crate::key::NodeKey;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

bitflags! {
    /// Inline formatting of a text run
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextFormat: u32 {
        const BOLD = 1;
        const ITALIC = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const UNDERLINE = 1 << 3;
        const CODE = 1 << 4;
        const SUBSCRIPT = 1 << 5;
        const SUPERSCRIPT = 1 << 6;
        const HIGHLIGHT = 1 << 7;
    }
}

impl TextFormat {
    /// Theme keys used to look up class names, in bit order
    pub fn theme_keys(self) -> impl Iterator<Item = &'static str> {
        [
            (TextFormat::BOLD, "text.bold"),
            (TextFormat::ITALIC, "text.italic"),
            (TextFormat::STRIKETHROUGH, "text.strikethrough"),
            (TextFormat::UNDERLINE, "text.underline"),
            (TextFormat::CODE, "text.code"),
            (TextFormat::SUBSCRIPT, "text.subscript"),
            (TextFormat::SUPERSCRIPT, "text.superscript"),
            (TextFormat::HIGHLIGHT, "text.highlight"),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, key)| key)
    }
}

/// Boundary policy of a text node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMode {
    /// Characters can be inserted and removed anywhere
    #[default]
    Normal,
    /// Edited as a unit of segments; editing converts it back to plain text
    Segmented,
    /// Atomic: deleting any part deletes the whole node
    Token,
}

/// Block alignment of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementFormat {
    #[default]
    #[serde(rename = "")]
    Unset,
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementData {
    pub children: Vec<NodeKey>,
    pub format: ElementFormat,
    pub indent: u32,
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextData {
    pub text: String,
    pub format: TextFormat,
    pub style: String,
    pub mode: TextMode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecoratorData {
    /// Opaque payload handed to the external renderer
    pub payload: Value,
}

/// Base variant of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root(ElementData),
    Element(ElementData),
    Text(TextData),
    Decorator(DecoratorData),
    LineBreak,
}

/// Base variant without its data, used by the registry to validate types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeBase {
    Root,
    Element,
    Text,
    Decorator,
    LineBreak,
}

impl NodeBase {
    pub fn name(self) -> &'static str {
        match self {
            NodeBase::Root => "root",
            NodeBase::Element => "element",
            NodeBase::Text => "text",
            NodeBase::Decorator => "decorator",
            NodeBase::LineBreak => "linebreak",
        }
    }
}

impl fmt::Display for NodeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single node of the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) key: NodeKey,
    pub(crate) node_type: String,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) kind: NodeKind,
    pub(crate) props: Map<String, Value>,
}

impl Node {
    pub(crate) fn new(key: NodeKey, node_type: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            key,
            node_type: node_type.into(),
            parent: None,
            kind,
            props: Map::new(),
        }
    }

    pub(crate) fn root() -> Self {
        Self::new(NodeKey::ROOT, "root", NodeKind::Root(ElementData::default()))
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn base(&self) -> NodeBase {
        match self.kind {
            NodeKind::Root(_) => NodeBase::Root,
            NodeKind::Element(_) => NodeBase::Element,
            NodeKind::Text(_) => NodeBase::Text,
            NodeKind::Decorator(_) => NodeBase::Decorator,
            NodeKind::LineBreak => NodeBase::LineBreak,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root(_))
    }

    /// Root or element: anything that owns children
    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Root(_) | NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self.kind, NodeKind::Decorator(_))
    }

    pub fn is_line_break(&self) -> bool {
        matches!(self.kind, NodeKind::LineBreak)
    }

    pub fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Root(data) | NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.kind {
            NodeKind::Root(data) | NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    pub fn text_data(&self) -> Option<&TextData> {
        match &self.kind {
            NodeKind::Text(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn text_data_mut(&mut self) -> Option<&mut TextData> {
        match &mut self.kind {
            NodeKind::Text(data) => Some(data),
            _ => None,
        }
    }

    pub fn decorator(&self) -> Option<&DecoratorData> {
        match &self.kind {
            NodeKind::Decorator(data) => Some(data),
            _ => None,
        }
    }

    /// Children of an element, empty for leaves
    pub fn children(&self) -> &[NodeKey] {
        self.element().map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    /// Text of a text node, empty for anything else
    pub fn text(&self) -> &str {
        self.text_data().map(|t| t.text.as_str()).unwrap_or("")
    }

    pub fn text_len(&self) -> usize {
        char_len(self.text())
    }

    pub fn format(&self) -> TextFormat {
        self.text_data().map(|t| t.format).unwrap_or_default()
    }

    pub fn mode(&self) -> TextMode {
        self.text_data().map(|t| t.mode).unwrap_or_default()
    }

    /// Normal-mode node of the plain `text` type: the only kind of run that
    /// may be merged with its neighbours
    pub fn is_simple_text(&self) -> bool {
        self.node_type == "text" && self.mode() == TextMode::Normal
    }

    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }

    /// Property bag of a node obtained through `Transaction::get_writable`
    pub fn props_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.props
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(Value::as_str)
    }

    pub fn prop_u64(&self, name: &str) -> Option<u64> {
        self.props.get(name).and_then(Value::as_u64)
    }

    pub fn prop_bool(&self, name: &str) -> Option<bool> {
        self.props.get(name).and_then(Value::as_bool)
    }

    /// Content length used by selection offsets: characters for text,
    /// child count for elements, zero for other leaves
    pub fn content_len(&self) -> usize {
        match &self.kind {
            NodeKind::Text(t) => char_len(&t.text),
            NodeKind::Root(e) | NodeKind::Element(e) => e.children.len(),
            _ => 0,
        }
    }
}

/// Initial contents of a node created inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInit {
    pub(crate) kind: NodeKind,
    pub(crate) props: Map<String, Value>,
}

impl NodeInit {
    pub fn element() -> Self {
        Self::from_kind(NodeKind::Element(ElementData::default()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Text(TextData {
            text: text.into(),
            ..TextData::default()
        }))
    }

    pub fn decorator(payload: Value) -> Self {
        Self::from_kind(NodeKind::Decorator(DecoratorData { payload }))
    }

    pub fn line_break() -> Self {
        Self::from_kind(NodeKind::LineBreak)
    }

    pub(crate) fn from_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            props: Map::new(),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props.extend(props);
        self
    }

    pub fn with_mode(mut self, mode: TextMode) -> Self {
        if let NodeKind::Text(ref mut t) = self.kind {
            t.mode = mode;
        }
        self
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        if let NodeKind::Text(ref mut t) = self.kind {
            t.format = format;
        }
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        if let NodeKind::Text(ref mut t) = self.kind {
            t.style = style.into();
        }
        self
    }

    pub fn with_element_format(mut self, format: ElementFormat) -> Self {
        if let NodeKind::Element(ref mut e) = self.kind {
            e.format = format;
        }
        self
    }

    pub fn with_indent(mut self, indent: u32) -> Self {
        if let NodeKind::Element(ref mut e) = self.kind {
            e.indent = indent;
        }
        self
    }

    pub fn base(&self) -> NodeBase {
        match self.kind {
            NodeKind::Root(_) => NodeBase::Root,
            NodeKind::Element(_) => NodeBase::Element,
            NodeKind::Text(_) => NodeBase::Text,
            NodeKind::Decorator(_) => NodeBase::Decorator,
            NodeKind::LineBreak => NodeBase::LineBreak,
        }
    }
}

/// Length of a string in Unicode scalar values
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `offset`-th character, clamped to the end
pub fn byte_offset(s: &str, offset: usize) -> usize {
    s.char_indices()
        .nth(offset)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Character-indexed splice: remove `delete` chars at `offset`, insert `insert`
pub fn splice_str(s: &str, offset: usize, delete: usize, insert: &str) -> String {
    let start = byte_offset(s, offset);
    let end = byte_offset(s, offset + delete);
    let mut out = String::with_capacity(s.len() + insert.len());
    out.push_str(&s[..start]);
    out.push_str(insert);
    out.push_str(&s[end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_counts_characters() {
        assert_eq!(splice_str("héllo", 1, 1, "e"), "hello");
        assert_eq!(splice_str("abc", 3, 0, "d"), "abcd");
        assert_eq!(splice_str("abc", 0, 10, ""), "");
        assert_eq!(byte_offset("héllo", 2), 3);
    }

    #[test]
    fn test_format_theme_keys() {
        let format = TextFormat::BOLD | TextFormat::CODE;
        let keys: Vec<_> = format.theme_keys().collect();
        assert_eq!(keys, vec!["text.bold", "text.code"]);
    }

    #[test]
    fn test_node_init_builders() {
        let init = NodeInit::text("@ada")
            .with_mode(TextMode::Segmented)
            .with_prop("mentionName", "ada");

        assert_eq!(init.base(), NodeBase::Text);
        assert_eq!(init.props.get("mentionName"), Some(&Value::from("ada")));
        match init.kind {
            NodeKind::Text(ref t) => assert_eq!(t.mode, TextMode::Segmented),
            _ => panic!("Expected text init"),
        }
    }
}
