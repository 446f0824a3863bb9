//! Headings, quotes and block type conversion

use crate::list::LIST_ITEM;
use crate::util::selected_blocks;
use folio_core::commands::KEY_BACKSPACE_COMMAND;
use folio_core::registry::{apply_element_attributes, DomConversion};
use folio_core::{
    CommandPriority, ConversionOutput, DomElement, Editor, EditorConfig, EditorResult, Node, NodeBase,
    NodeBehavior, NodeInit, NodeKey, Selection, Transaction, TreeView, Unregister,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const HEADING: &str = "heading";
pub const QUOTE: &str = "quote";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingTag {
    #[default]
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl HeadingTag {
    pub const ALL: [HeadingTag; 6] = [
        HeadingTag::H1,
        HeadingTag::H2,
        HeadingTag::H3,
        HeadingTag::H4,
        HeadingTag::H5,
        HeadingTag::H6,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HeadingTag::H1 => "h1",
            HeadingTag::H2 => "h2",
            HeadingTag::H3 => "h3",
            HeadingTag::H4 => "h4",
            HeadingTag::H5 => "h5",
            HeadingTag::H6 => "h6",
        }
    }
}

impl fmt::Display for HeadingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeadingTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeadingTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("not a heading tag: {}", s))
    }
}

pub fn heading_tag(node: &Node) -> HeadingTag {
    node.prop_str("tag")
        .and_then(|t| t.parse().ok())
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct HeadingNode;

fn import_heading(tag: HeadingTag, tx: &mut Transaction<'_>) -> EditorResult<Option<ConversionOutput>> {
    Ok(Some(ConversionOutput::node(create_heading(tx, tag)?)))
}

impl NodeBehavior for HeadingNode {
    fn node_type(&self) -> &'static str {
        HEADING
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let tag = heading_tag(node);
        let mut dom = DomElement::new(tag.as_str());
        apply_element_attributes(node, &mut dom);
        if let Some(class) = config.theme_class(&format!("heading.{}", tag)) {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![
            DomConversion { tag: "h1", priority: 0, convert: |_, tx| import_heading(HeadingTag::H1, tx) },
            DomConversion { tag: "h2", priority: 0, convert: |_, tx| import_heading(HeadingTag::H2, tx) },
            DomConversion { tag: "h3", priority: 0, convert: |_, tx| import_heading(HeadingTag::H3, tx) },
            DomConversion { tag: "h4", priority: 0, convert: |_, tx| import_heading(HeadingTag::H4, tx) },
            DomConversion { tag: "h5", priority: 0, convert: |_, tx| import_heading(HeadingTag::H5, tx) },
            DomConversion { tag: "h6", priority: 0, convert: |_, tx| import_heading(HeadingTag::H6, tx) },
        ]
    }
}

#[derive(Debug)]
pub struct QuoteNode;

impl NodeBehavior for QuoteNode {
    fn node_type(&self) -> &'static str {
        QUOTE
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = DomElement::new("blockquote");
        apply_element_attributes(node, &mut dom);
        if let Some(class) = config.theme_class(QUOTE) {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "blockquote",
            priority: 0,
            convert: |_, tx| Ok(Some(ConversionOutput::node(create_quote(tx)?))),
        }]
    }
}

pub fn create_heading(tx: &mut Transaction<'_>, tag: HeadingTag) -> EditorResult<NodeKey> {
    tx.create_node(HEADING, NodeInit::element().with_prop("tag", tag.as_str()))
}

pub fn create_quote(tx: &mut Transaction<'_>) -> EditorResult<NodeKey> {
    tx.create_node(QUOTE, NodeInit::element())
}

/// Replace every selected block with a new element from `create`, keeping
/// its children. List items keep their type.
pub fn set_blocks_type<F>(tx: &mut Transaction<'_>, mut create: F) -> EditorResult<()>
where
    F: FnMut(&mut Transaction<'_>) -> EditorResult<NodeKey>,
{
    for block in selected_blocks(tx)? {
        let node = tx.get(block)?;
        if node.node_type() == LIST_ITEM {
            continue;
        }
        let format = node.element().map(|e| (e.format, e.indent, e.direction));
        let replacement = create(tx)?;
        if let Some((format, indent, direction)) = format {
            tx.set_element_format(replacement, format)?;
            tx.set_indent(replacement, indent)?;
            tx.set_direction(replacement, direction)?;
        }
        tx.replace(block, replacement, true)?;
        debug!(from = %block, to = %replacement, "block type changed");
    }
    Ok(())
}

/// Backspace at the very start of a heading or quote turns it into a
/// paragraph
fn collapse_at_start(tx: &mut Transaction<'_>) -> EditorResult<bool> {
    let Some(Selection::Range(range)) = tx.selection().cloned() else {
        return Ok(false);
    };
    if !range.is_collapsed() {
        return Ok(false);
    }
    let Some(block) = tx.nearest_block(range.anchor.key)? else {
        return Ok(false);
    };
    let node_type = tx.get(block)?.node_type();
    if node_type != HEADING && node_type != QUOTE {
        return Ok(false);
    }
    if tx.start_point(block)? != range.anchor {
        return Ok(false);
    }
    let paragraph = tx.create_paragraph()?;
    tx.replace(block, paragraph, true)?;
    Ok(true)
}

pub fn register_heading_plugin(editor: &Editor) -> Vec<Unregister> {
    vec![editor.register_command(&KEY_BACKSPACE_COMMAND, |_, tx| collapse_at_start(tx), CommandPriority::Low)]
}
