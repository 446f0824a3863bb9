//! # External Markup
//!
//! Export turns a subtree into a small element/text tree ([`ExternalNode`])
//! using each node type's `export_dom`; import walks such a tree and asks
//! the registry's conversion rules, highest priority first, which node each
//! element stands for. Format wrappers (`strong`, `em`, ...) do not become
//! nodes; they pass their format down to the text below them.

use crate::config::EditorConfig;
use crate::dom::escape_html;
use crate::errors::EditorResult;
use crate::key::NodeKey;
use crate::node::{NodeKind, TextFormat};
use crate::registry::ConversionOutput;
use crate::transaction::Transaction;
use crate::tree::TreeView;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input"];

/// Wrappers written inside a text element for formats its tag does not carry
const FORMAT_WRAPPERS: &[(TextFormat, &str)] = &[
    (TextFormat::BOLD, "strong"),
    (TextFormat::ITALIC, "em"),
    (TextFormat::UNDERLINE, "u"),
    (TextFormat::STRIKETHROUGH, "s"),
    (TextFormat::CODE, "code"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalNode {
    Element(ExternalElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<ExternalNode>,
}

impl ExternalElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ExternalNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(ExternalNode::Text(text.into()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                ExternalNode::Text(text) => out.push_str(text),
                ExternalNode::Element(element) => out.push_str(&element.text_content()),
            }
        }
        out
    }
}

impl ExternalNode {
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(self, &mut out);
        out
    }
}

fn write_html(node: &ExternalNode, out: &mut String) {
    match node {
        ExternalNode::Text(text) => out.push_str(&escape_html(text)),
        ExternalNode::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attributes {
                let _ = write!(out, " {}=\"{}\"", name, escape_html(value));
            }
            out.push('>');
            if VOID_TAGS.contains(&element.tag.as_str()) && element.children.is_empty() {
                return;
            }
            for child in &element.children {
                write_html(child, out);
            }
            let _ = write!(out, "</{}>", element.tag);
        }
    }
}

/// External form of a node. Nodes excluded from copy contribute their
/// children only.
pub fn export_external<T: TreeView + ?Sized>(
    view: &T,
    config: &EditorConfig,
    key: NodeKey,
) -> EditorResult<Vec<ExternalNode>> {
    let node = view.get(key)?;
    let behavior = view.registry().behavior_for(node);

    let mut children = Vec::new();
    for child in node.children() {
        children.extend(export_external(view, config, *child)?);
    }
    if node.is_root() || behavior.exclude_from_copy(node) {
        return Ok(children);
    }

    let dom = behavior.export_dom(node, config);
    let mut element = ExternalElement {
        tag: dom.tag,
        attributes: dom.attributes,
        children,
    };
    if let NodeKind::Text(text) = node.kind() {
        let mut inner = ExternalNode::Text(text.text.clone());
        for (flag, tag) in FORMAT_WRAPPERS.iter().rev() {
            if text.format.contains(*flag) && element.tag != *tag {
                inner = ExternalNode::Element(ExternalElement::new(*tag).with_child(inner));
            }
        }
        element.children = vec![inner];
    }
    Ok(vec![ExternalNode::Element(element)])
}

/// Markup of the whole document
pub fn generate_html<T: TreeView + ?Sized>(view: &T, config: &EditorConfig) -> EditorResult<String> {
    let mut out = String::new();
    for node in export_external(view, config, NodeKey::ROOT)? {
        write_html(&node, &mut out);
    }
    Ok(out)
}

/// Create detached nodes for external markup. Returns the top-level nodes.
pub fn import_external(tx: &mut Transaction<'_>, nodes: &[ExternalNode]) -> EditorResult<Vec<NodeKey>> {
    let mut out = Vec::new();
    for node in nodes {
        out.extend(import_one(tx, node, TextFormat::empty())?);
    }
    Ok(out)
}

fn import_one(
    tx: &mut Transaction<'_>,
    node: &ExternalNode,
    format: TextFormat,
) -> EditorResult<Vec<NodeKey>> {
    let element = match node {
        ExternalNode::Text(text) => {
            // Whitespace between block tags is layout, not content
            if text.is_empty() || (text.trim().is_empty() && text.contains('\n')) {
                return Ok(Vec::new());
            }
            let key = tx.create_text(text.clone())?;
            if !format.is_empty() {
                tx.set_format(key, format)?;
            }
            return Ok(vec![key]);
        }
        ExternalNode::Element(element) => element,
    };

    let rules = tx.registry().conversions_for(&element.tag).to_vec();
    let mut output = ConversionOutput::passthrough();
    for rule in rules {
        if let Some(converted) = (rule.convert)(element, tx)? {
            output = converted;
            break;
        }
    }

    let child_format = format | output.child_format;
    let Some(key) = output.node else {
        let mut lifted = Vec::new();
        for child in &element.children {
            lifted.extend(import_one(tx, child, child_format)?);
        }
        return Ok(lifted);
    };

    let created = tx.get(key)?;
    if created.is_text() {
        if !child_format.is_empty() {
            let merged = created.format() | child_format;
            tx.set_format(key, merged)?;
        }
    } else if created.is_element() {
        for child in &element.children {
            for child_key in import_one(tx, child, child_format)? {
                tx.append(key, child_key)?;
            }
        }
    }
    Ok(vec![key])
}

/// Insert imported nodes after the block holding the selection, or at the
/// end of the document. Runs of inline nodes are wrapped in paragraphs.
pub fn insert_generated_nodes(tx: &mut Transaction<'_>, nodes: &[NodeKey]) -> EditorResult<()> {
    let anchor_block = match tx.range_selection() {
        Some(range) => tx.top_level_element(range.anchor.key)?,
        None => None,
    };

    let mut blocks = Vec::new();
    let mut inline_run: Option<NodeKey> = None;
    for key in nodes {
        let node = tx.get(*key)?;
        let is_block = (node.is_element() || node.is_decorator())
            && !tx.registry().behavior_for(node).is_inline(node);
        if is_block {
            inline_run = None;
            blocks.push(*key);
            continue;
        }
        let paragraph = match inline_run {
            Some(paragraph) => paragraph,
            None => {
                let paragraph = tx.create_paragraph()?;
                blocks.push(paragraph);
                inline_run = Some(paragraph);
                paragraph
            }
        };
        tx.append(paragraph, *key)?;
    }

    let mut previous = anchor_block;
    for block in &blocks {
        match previous {
            Some(prev) => tx.insert_after(prev, *block)?,
            None => tx.append(NodeKey::ROOT, *block)?,
        }
        previous = Some(*block);
    }
    if let Some(last) = blocks.last() {
        tx.select_end(*last)?;
    }
    Ok(())
}
