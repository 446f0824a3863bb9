//! # Node Registry
//!
//! Maps type tags to [`NodeBehavior`]s. The registry is built once, from an
//! ordered list of behaviors, when the editor is constructed; duplicate type
//! tags are a configuration error.
//!
//! ## Capability contract
//!
//! Node types do not subclass anything. A node is always one of the base
//! variants of [`NodeKind`](crate::node::NodeKind); its type tag selects the
//! behavior that customizes creation of its surface element, incremental
//! updates, import/export and editing policy. Every method has a default
//! derived from the base variant, so a node type overrides only what differs.

use crate::config::EditorConfig;
use crate::dom::DomElement;
use crate::errors::{EditorError, EditorResult};
use crate::html::ExternalElement;
use crate::key::NodeKey;
use crate::node::{
    Direction, ElementData, ElementFormat, Node, NodeBase, NodeInit, NodeKind, TextData,
    TextFormat, TextMode,
};
use crate::serialize::SerializedNode;
use crate::transaction::Transaction;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Converter from an external element into document nodes
pub type ConvertFn =
    fn(&ExternalElement, &mut Transaction<'_>) -> EditorResult<Option<ConversionOutput>>;

/// Import rule for one external tag name. When several rules accept the
/// same element, the highest priority wins.
#[derive(Clone, Copy)]
pub struct DomConversion {
    pub tag: &'static str,
    pub priority: u8,
    pub convert: ConvertFn,
}

impl std::fmt::Debug for DomConversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomConversion")
            .field("tag", &self.tag)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Result of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConversionOutput {
    /// Node standing for the element; `None` lifts its children to the parent
    pub node: Option<NodeKey>,
    /// Format applied to text created below the element
    pub child_format: TextFormat,
}

impl ConversionOutput {
    pub fn node(key: NodeKey) -> Self {
        Self {
            node: Some(key),
            child_format: TextFormat::empty(),
        }
    }

    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn format(format: TextFormat) -> Self {
        Self {
            node: None,
            child_format: format,
        }
    }
}

/// Behavior of one node type
pub trait NodeBehavior: Send + Sync + 'static {
    /// Type tag, unique within a registry
    fn node_type(&self) -> &'static str;

    /// Base variant every node of this type uses
    fn base(&self) -> NodeBase;

    /// Copy of a node; must preserve the key
    fn clone_node(&self, node: &Node) -> Node {
        node.clone()
    }

    /// Surface element for a freshly created node
    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        default_create_dom(node, config)
    }

    /// Bring `dom` in line with `node`. Returns true when the element cannot
    /// be updated in place and must be replaced.
    fn update_dom(
        &self,
        _prev: &Node,
        node: &Node,
        dom: &mut DomElement,
        config: &EditorConfig,
    ) -> bool {
        let fresh = self.create_dom(node, config);
        if fresh.tag != dom.tag {
            return true;
        }
        dom.attributes = fresh.attributes;
        false
    }

    /// Element written to external markup
    fn export_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        self.create_dom(node, config)
    }

    /// Import rules keyed by external tag name
    fn import_dom(&self) -> Vec<DomConversion> {
        Vec::new()
    }

    /// Fields written to the JSON form, besides `type`, `version` and `children`
    fn export_json(&self, node: &Node) -> Map<String, Value> {
        default_export_json(node)
    }

    /// Initial contents of a node rebuilt from its JSON form
    fn import_json(&self, serialized: &SerializedNode) -> EditorResult<NodeInit> {
        default_import_json(self.base(), serialized)
    }

    fn is_inline(&self, node: &Node) -> bool {
        !node.is_element()
    }

    fn exclude_from_copy(&self, _node: &Node) -> bool {
        false
    }

    /// Text contributed by a leaf. Elements return `None`; their text is
    /// assembled from their children.
    fn text_content(&self, node: &Node) -> Option<String> {
        match node.kind() {
            NodeKind::Text(t) => Some(t.text.clone()),
            NodeKind::LineBreak => Some("\n".to_string()),
            NodeKind::Decorator(_) => Some(String::new()),
            NodeKind::Root(_) | NodeKind::Element(_) => None,
        }
    }

    /// Text entities are re-validated by their transform and never merged
    fn is_text_entity(&self) -> bool {
        false
    }

    fn can_insert_text_before(&self, node: &Node) -> bool {
        node.mode() != TextMode::Token
    }

    fn can_insert_text_after(&self, node: &Node) -> bool {
        node.mode() != TextMode::Token
    }

    /// Elements that return false are removed once their last child goes
    fn can_be_empty(&self) -> bool {
        true
    }

    /// Decorators that return true are selected, not deleted, by the first
    /// backspace that reaches them
    fn is_keyboard_selectable(&self) -> bool {
        true
    }

    /// Payload for the external renderer of a decorator
    fn decorate(&self, node: &Node, _config: &EditorConfig) -> Option<Value> {
        node.decorator().map(|d| d.payload.clone())
    }

    /// Type of the block created when a paragraph break is inserted at the
    /// end of this block
    fn new_block_after(&self, _node: &Node) -> &'static str {
        "paragraph"
    }
}

/// Surface element derived from the base variant alone
pub fn default_create_dom(node: &Node, config: &EditorConfig) -> DomElement {
    match node.kind() {
        NodeKind::Root(_) => DomElement::new("div"),
        NodeKind::Element(_) => {
            let mut dom = DomElement::new("div");
            apply_element_attributes(node, &mut dom);
            if let Some(class) = config.theme_class(node.node_type()) {
                dom.add_class(class);
            }
            dom
        }
        NodeKind::Text(t) => text_dom(t, config),
        NodeKind::Decorator(_) => DomElement::new("span")
            .with_attr("contenteditable", "false")
            .with_attr("data-folio-decorator", "true"),
        NodeKind::LineBreak => DomElement::new("br"),
    }
}

/// Element of a text run: the tag follows the strongest format, classes
/// follow the theme
pub fn text_dom(text: &TextData, config: &EditorConfig) -> DomElement {
    let tag = if text.format.contains(TextFormat::CODE) {
        "code"
    } else if text.format.contains(TextFormat::BOLD) {
        "strong"
    } else if text.format.contains(TextFormat::ITALIC) {
        "em"
    } else {
        "span"
    };
    let mut dom = DomElement::new(tag).with_attr("data-folio-text", "true");
    for key in text.format.theme_keys() {
        if let Some(class) = config.theme_class(key) {
            dom.add_class(class);
        }
    }
    if !text.style.is_empty() {
        dom.set_attr("style", text.style.clone());
    }
    dom
}

/// Alignment, indentation and direction of a block
pub fn apply_element_attributes(node: &Node, dom: &mut DomElement) {
    let Some(element) = node.element() else {
        return;
    };
    let mut style = String::new();
    match element.format {
        ElementFormat::Unset => {}
        ElementFormat::Left => style.push_str("text-align: left;"),
        ElementFormat::Center => style.push_str("text-align: center;"),
        ElementFormat::Right => style.push_str("text-align: right;"),
        ElementFormat::Justify => style.push_str("text-align: justify;"),
    }
    if element.indent > 0 {
        if !style.is_empty() {
            style.push(' ');
        }
        style.push_str(&format!("padding-inline-start: {}px;", element.indent * 40));
    }
    if !style.is_empty() {
        dom.set_attr("style", style);
    }
    match element.direction {
        Some(Direction::Ltr) => dom.set_attr("dir", "ltr"),
        Some(Direction::Rtl) => dom.set_attr("dir", "rtl"),
        None => {}
    }
}

pub fn default_export_json(node: &Node) -> Map<String, Value> {
    let mut fields = Map::new();
    match node.kind() {
        NodeKind::Root(e) | NodeKind::Element(e) => {
            fields.insert("format".into(), serde_json::to_value(e.format).unwrap_or(Value::Null));
            fields.insert("indent".into(), Value::from(e.indent));
            fields.insert(
                "direction".into(),
                e.direction
                    .map(|d| serde_json::to_value(d).unwrap_or(Value::Null))
                    .unwrap_or(Value::Null),
            );
        }
        NodeKind::Text(t) => {
            fields.insert("text".into(), Value::from(t.text.clone()));
            fields.insert("format".into(), Value::from(t.format.bits()));
            fields.insert("style".into(), Value::from(t.style.clone()));
            fields.insert("mode".into(), serde_json::to_value(t.mode).unwrap_or(Value::Null));
            fields.insert("detail".into(), Value::from(0));
        }
        NodeKind::Decorator(d) => {
            fields.insert("payload".into(), d.payload.clone());
        }
        NodeKind::LineBreak => {}
    }
    for (name, value) in node.props() {
        fields.insert(name.clone(), value.clone());
    }
    fields
}

const BASE_FIELDS: &[&str] = &[
    "format", "indent", "direction", "text", "style", "mode", "detail", "payload",
];

pub fn default_import_json(base: NodeBase, serialized: &SerializedNode) -> EditorResult<NodeInit> {
    let fields = &serialized.fields;
    let kind = match base {
        NodeBase::Root | NodeBase::Element => {
            let data = ElementData {
                children: Vec::new(),
                format: field(fields, "format")?.unwrap_or_default(),
                indent: field(fields, "indent")?.unwrap_or_default(),
                direction: field(fields, "direction")?,
            };
            if base == NodeBase::Root {
                NodeKind::Root(data)
            } else {
                NodeKind::Element(data)
            }
        }
        NodeBase::Text => {
            let bits: u32 = field(fields, "format")?.unwrap_or_default();
            NodeKind::Text(TextData {
                text: field(fields, "text")?.unwrap_or_default(),
                format: TextFormat::from_bits_truncate(bits),
                style: field(fields, "style")?.unwrap_or_default(),
                mode: field(fields, "mode")?.unwrap_or_default(),
            })
        }
        NodeBase::Decorator => NodeKind::Decorator(crate::node::DecoratorData {
            payload: fields.get("payload").cloned().unwrap_or(Value::Null),
        }),
        NodeBase::LineBreak => NodeKind::LineBreak,
    };

    let props = fields
        .iter()
        .filter(|(name, _)| !BASE_FIELDS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Ok(NodeInit::from_kind(kind).with_props(props))
}

fn field<T: serde::de::DeserializeOwned>(
    fields: &Map<String, Value>,
    name: &str,
) -> EditorResult<Option<T>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

/// The document root
#[derive(Debug)]
pub struct RootNode;

impl NodeBehavior for RootNode {
    fn node_type(&self) -> &'static str {
        "root"
    }

    fn base(&self) -> NodeBase {
        NodeBase::Root
    }
}

/// Default block
#[derive(Debug)]
pub struct ParagraphNode;

impl NodeBehavior for ParagraphNode {
    fn node_type(&self) -> &'static str {
        "paragraph"
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = DomElement::new("p");
        apply_element_attributes(node, &mut dom);
        if let Some(class) = config.theme_class("paragraph") {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "p",
            priority: 0,
            convert: |_, tx| Ok(Some(ConversionOutput::node(tx.create_paragraph()?))),
        }]
    }
}

/// Plain text run
#[derive(Debug)]
pub struct TextNode;

impl NodeBehavior for TextNode {
    fn node_type(&self) -> &'static str {
        "text"
    }

    fn base(&self) -> NodeBase {
        NodeBase::Text
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        fn rule(tag: &'static str, convert: ConvertFn) -> DomConversion {
            DomConversion {
                tag,
                priority: 0,
                convert,
            }
        }

        vec![
            rule("strong", |_, _| Ok(Some(ConversionOutput::format(TextFormat::BOLD)))),
            rule("b", |_, _| Ok(Some(ConversionOutput::format(TextFormat::BOLD)))),
            rule("em", |_, _| Ok(Some(ConversionOutput::format(TextFormat::ITALIC)))),
            rule("i", |_, _| Ok(Some(ConversionOutput::format(TextFormat::ITALIC)))),
            rule("code", |_, _| Ok(Some(ConversionOutput::format(TextFormat::CODE)))),
            rule("u", |_, _| Ok(Some(ConversionOutput::format(TextFormat::UNDERLINE)))),
            rule("s", |_, _| Ok(Some(ConversionOutput::format(TextFormat::STRIKETHROUGH)))),
            rule("span", |_, _| Ok(Some(ConversionOutput::passthrough()))),
        ]
    }
}

#[derive(Debug)]
pub struct LineBreakNode;

impl NodeBehavior for LineBreakNode {
    fn node_type(&self) -> &'static str {
        "linebreak"
    }

    fn base(&self) -> NodeBase {
        NodeBase::LineBreak
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "br",
            priority: 0,
            convert: |_, tx| Ok(Some(ConversionOutput::node(tx.create_line_break()?))),
        }]
    }
}

/// Type tag to behavior map, plus node replacements and import rules
#[derive(Clone)]
pub struct NodeRegistry {
    behaviors: HashMap<String, Arc<dyn NodeBehavior>>,
    order: Vec<String>,
    replacements: HashMap<String, String>,
    conversions: HashMap<String, Vec<DomConversion>>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.order)
            .field("replacements", &self.replacements)
            .finish()
    }
}

impl NodeRegistry {
    /// Registry with nothing but the built-in root, paragraph, text and
    /// line-break types
    pub fn new() -> Self {
        let mut registry = Self {
            behaviors: HashMap::new(),
            order: Vec::new(),
            replacements: HashMap::new(),
            conversions: HashMap::new(),
        };
        for behavior in builtin_behaviors() {
            // Built-in tags are distinct, so this cannot fail
            let _ = registry.insert(behavior);
        }
        registry
    }

    /// Register a node type. Registering a tag twice is an error.
    pub fn register<B: NodeBehavior>(&mut self, behavior: B) -> EditorResult<()> {
        self.insert(Arc::new(behavior))
    }

    pub fn register_arc(&mut self, behavior: Arc<dyn NodeBehavior>) -> EditorResult<()> {
        self.insert(behavior)
    }

    fn insert(&mut self, behavior: Arc<dyn NodeBehavior>) -> EditorResult<()> {
        let tag = behavior.node_type().to_string();
        if self.behaviors.contains_key(&tag) {
            return Err(EditorError::DuplicateNodeType(tag));
        }
        for conversion in behavior.import_dom() {
            let rules = self.conversions.entry(conversion.tag.to_string()).or_default();
            rules.push(conversion);
            // Stable sort keeps registration order among equal priorities
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        self.order.push(tag.clone());
        self.behaviors.insert(tag, behavior);
        Ok(())
    }

    /// Create `to` nodes whenever `from` nodes are requested
    pub fn register_replacement(&mut self, from: &str, to: &str) -> EditorResult<()> {
        let from_base = self.get(from)?.base();
        let to_base = self.get(to)?.base();
        if from_base != to_base {
            return Err(EditorError::BaseMismatch {
                node_type: to.to_string(),
                expected: from_base.name(),
                actual: to_base.name(),
            });
        }
        self.replacements.insert(from.to_string(), to.to_string());
        Ok(())
    }

    pub fn get(&self, node_type: &str) -> EditorResult<&dyn NodeBehavior> {
        self.behaviors
            .get(node_type)
            .map(|b| b.as_ref())
            .ok_or_else(|| EditorError::UnknownNodeType(node_type.to_string()))
    }

    /// Behavior for a node, falling back to the base variant's defaults when
    /// the node's type is not registered
    pub fn behavior_for(&self, node: &Node) -> &dyn NodeBehavior {
        match self.behaviors.get(node.node_type()) {
            Some(b) => b.as_ref(),
            None => fallback_behavior(node.base()),
        }
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.behaviors.contains_key(node_type)
    }

    /// Type actually created when `node_type` is requested
    pub fn resolve<'a>(&'a self, node_type: &'a str) -> &'a str {
        self.replacements
            .get(node_type)
            .map(String::as_str)
            .unwrap_or(node_type)
    }

    /// Import rules for an external tag, highest priority first
    pub fn conversions_for(&self, tag: &str) -> &[DomConversion] {
        self.conversions
            .get(&tag.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Registered type tags in registration order
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_behaviors() -> Vec<Arc<dyn NodeBehavior>> {
    vec![
        Arc::new(RootNode),
        Arc::new(ParagraphNode),
        Arc::new(TextNode),
        Arc::new(LineBreakNode),
    ]
}

struct BaseBehavior(NodeBase);

impl NodeBehavior for BaseBehavior {
    fn node_type(&self) -> &'static str {
        self.0.name()
    }

    fn base(&self) -> NodeBase {
        self.0
    }
}

fn fallback_behavior(base: NodeBase) -> &'static dyn NodeBehavior {
    static ROOT: BaseBehavior = BaseBehavior(NodeBase::Root);
    static ELEMENT: BaseBehavior = BaseBehavior(NodeBase::Element);
    static TEXT: BaseBehavior = BaseBehavior(NodeBase::Text);
    static DECORATOR: BaseBehavior = BaseBehavior(NodeBase::Decorator);
    static LINE_BREAK: BaseBehavior = BaseBehavior(NodeBase::LineBreak);
    match base {
        NodeBase::Root => &ROOT,
        NodeBase::Element => &ELEMENT,
        NodeBase::Text => &TEXT,
        NodeBase::Decorator => &DECORATOR,
        NodeBase::LineBreak => &LINE_BREAK,
    }
}
