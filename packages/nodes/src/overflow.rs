//! # Character Limit
//!
//! Content past a character limit is wrapped in inline overflow elements so
//! it can be highlighted. The wrapping runs as a root transform, so every
//! commit leaves the document wrapped consistently with the limit. Overflow
//! elements are left out of copies; their children are exported as usual.

use crate::util::is_type;
use folio_core::node::char_len;
use folio_core::registry::default_create_dom;
use folio_core::{
    DomElement, Editor, EditorConfig, EditorResult, Node, NodeBase, NodeBehavior, NodeInit, NodeKey,
    TextMode, Transaction, TreeView, Unregister,
};
use tracing::debug;

pub const OVERFLOW: &str = "overflow";

/// Characters counted between two top-level blocks
const BLOCK_SEPARATOR_LEN: usize = 2;

#[derive(Debug)]
pub struct OverflowNode;

impl NodeBehavior for OverflowNode {
    fn node_type(&self) -> &'static str {
        OVERFLOW
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = default_create_dom(node, config);
        dom.tag = "span".to_string();
        if let Some(class) = config.theme_class("characterLimit") {
            dom.add_class(class);
        }
        dom
    }

    fn is_inline(&self, _node: &Node) -> bool {
        true
    }

    fn exclude_from_copy(&self, _node: &Node) -> bool {
        true
    }

    fn can_be_empty(&self) -> bool {
        false
    }
}

pub fn register_character_limit(editor: &Editor, max: usize) -> EditorResult<Unregister> {
    editor.register_node_transform("root", move |_, tx| wrap_overflowed_nodes(tx, max))
}

/// Characters left before `max`; negative once the document overflows
pub fn remaining_characters<T: TreeView + ?Sized>(view: &T, max: usize) -> EditorResult<i64> {
    let used = char_len(&view.text_content(NodeKey::ROOT)?);
    Ok(max as i64 - used as i64)
}

/// Wrap every leaf past `max` characters in an overflow element and unwrap
/// leaves that fit again. Text straddling the limit is split at it.
pub fn wrap_overflowed_nodes(tx: &mut Transaction<'_>, max: usize) -> EditorResult<()> {
    let blocks = tx.children_of(NodeKey::ROOT)?.to_vec();
    let mut used = 0usize;

    for (i, block) in blocks.into_iter().enumerate() {
        if i > 0 {
            used += BLOCK_SEPARATOR_LEN;
        }
        let leaves = if tx.get(block)?.is_element() {
            tx.leaves(block)?
        } else {
            vec![block]
        };

        for leaf in leaves {
            if !tx.contains(leaf) || !tx.is_attached(leaf) {
                continue;
            }
            let node = tx.get(leaf)?;
            let len = tx
                .registry()
                .behavior_for(node)
                .text_content(node)
                .map(|t| char_len(&t))
                .unwrap_or(0);
            let splittable = node.is_text() && node.mode() == TextMode::Normal;
            let overflow = node.parent().filter(|p| is_type(tx, *p, OVERFLOW));

            if used + len <= max {
                if let Some(overflow) = overflow {
                    unwrap_overflow(tx, overflow)?;
                }
            } else if used >= max {
                if overflow.is_none() && leaf != block {
                    wrap_in_overflow(tx, leaf)?;
                }
            } else if splittable {
                let parts = tx.split_text(leaf, &[max - used])?;
                match overflow {
                    Some(overflow) => tx.insert_before(overflow, parts[0])?,
                    None => {
                        if let Some(tail) = parts.get(1) {
                            wrap_in_overflow(tx, *tail)?;
                        }
                    }
                }
            } else if overflow.is_none() && leaf != block {
                wrap_in_overflow(tx, leaf)?;
            }
            used += len;
        }
    }
    Ok(())
}

fn wrap_in_overflow(tx: &mut Transaction<'_>, leaf: NodeKey) -> EditorResult<()> {
    if let Some(prev) = tx.previous_sibling(leaf)? {
        if is_type(tx, prev, OVERFLOW) {
            return tx.append(prev, leaf);
        }
    }
    let overflow = tx.create_node(OVERFLOW, NodeInit::element())?;
    tx.insert_before(leaf, overflow)?;
    tx.append(overflow, leaf)?;

    if let Some(next) = tx.next_sibling(overflow)? {
        if is_type(tx, next, OVERFLOW) {
            let moved = tx.children_of(next)?.to_vec();
            tx.append_all(overflow, &moved)?;
            tx.remove(next)?;
        }
    }
    debug!(key = %overflow, leaf = %leaf, "content wrapped in overflow");
    Ok(())
}

fn unwrap_overflow(tx: &mut Transaction<'_>, overflow: NodeKey) -> EditorResult<()> {
    for child in tx.children_of(overflow)?.to_vec() {
        tx.insert_before(overflow, child)?;
    }
    if tx.contains(overflow) && tx.is_attached(overflow) {
        tx.remove(overflow)?;
    }
    debug!(key = %overflow, "overflow unwrapped");
    Ok(())
}
