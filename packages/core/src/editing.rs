//! # Selection Editing
//!
//! Text-editing operations on the pending selection. They are the default
//! behaviour behind the rich-text commands; node types influence them
//! through their behavior (`can_insert_text_before`, text modes, keyboard
//! selectability, `new_block_after`, `can_be_empty`).

use crate::errors::EditorResult;
use crate::key::NodeKey;
use crate::node::{char_len, NodeInit, TextFormat, TextMode};
use crate::selection::{Point, PointKind, Selection};
use crate::transaction::Transaction;
use crate::tree::TreeView;
use tracing::debug;

/// Insert text at the selection, replacing selected content
pub fn insert_text(tx: &mut Transaction<'_>, text: &str) -> EditorResult<()> {
    let Some(range) = tx.range_selection() else {
        return Ok(());
    };
    if !range.is_collapsed() {
        remove_text(tx)?;
    }
    let Some(range) = tx.range_selection() else {
        return Ok(());
    };
    let point = range.anchor;
    match point.kind {
        PointKind::Text => insert_at_text_point(tx, point, text, range.format),
        PointKind::Element => {
            let run = tx.create_text(text)?;
            tx.set_format(run, range.format)?;
            if point.key.is_root() {
                let paragraph = tx.create_paragraph()?;
                tx.append(paragraph, run)?;
                tx.insert_at(NodeKey::ROOT, point.offset, paragraph)?;
            } else {
                tx.insert_at(point.key, point.offset, run)?;
            }
            tx.select_end(run)
        }
    }
}

fn insert_at_text_point(
    tx: &mut Transaction<'_>,
    point: Point,
    text: &str,
    format: TextFormat,
) -> EditorResult<()> {
    let node = tx.get(point.key)?;
    let behavior = tx.registry().behavior_for(node);
    let len = node.text_len();
    let offset = point.offset.min(len);
    let mode = node.mode();
    let at_start = offset == 0 && len > 0;
    let at_end = offset == len;
    let existing = node.text().to_string();

    let needs_new_run = node.format() != format
        || mode == TextMode::Token
        || (at_start && !behavior.can_insert_text_before(node))
        || (at_end && !behavior.can_insert_text_after(node));

    if needs_new_run {
        let run = tx.create_text(text)?;
        tx.set_format(run, format)?;
        if at_start {
            tx.insert_before(point.key, run)?;
        } else if at_end || mode == TextMode::Token {
            tx.insert_after(point.key, run)?;
        } else {
            let parts = tx.split_text(point.key, &[offset])?;
            tx.insert_after(parts[0], run)?;
        }
        debug!(key = %run, "typed into a new text run");
        return tx.select_end(run);
    }

    let mut key = point.key;
    if mode == TextMode::Segmented {
        // Editing a segmented node turns it back into plain text
        let plain = tx.create_text(existing)?;
        tx.set_format(plain, format)?;
        key = tx.replace(point.key, plain, false)?;
    }
    tx.splice_text(key, offset, 0, text)?;
    tx.set_caret(Point::text(key, offset + char_len(text)));
    Ok(())
}

/// Delete one character, or the selected content. A collapsed caret at a
/// block boundary merges the neighbouring blocks. Returns whether anything
/// was deleted or selected.
pub fn delete_character(tx: &mut Transaction<'_>, backward: bool) -> EditorResult<bool> {
    match tx.selection().cloned() {
        None => Ok(false),
        Some(Selection::Node(nodes)) => {
            let keys: Vec<NodeKey> = nodes.keys().collect();
            for key in &keys {
                if tx.contains(*key) && tx.is_attached(*key) {
                    tx.remove(*key)?;
                }
            }
            tx.set_selection(None);
            Ok(!keys.is_empty())
        }
        Some(Selection::Range(range)) if !range.is_collapsed() => {
            remove_text(tx)?;
            Ok(true)
        }
        Some(Selection::Range(range)) => {
            let point = range.anchor;
            match point.kind {
                PointKind::Text => delete_from_text(tx, point, backward),
                PointKind::Element => {
                    let children = tx.children_of(point.key)?;
                    let neighbour = if backward {
                        point.offset.checked_sub(1).and_then(|i| children.get(i).copied())
                    } else {
                        children.get(point.offset).copied()
                    };
                    match neighbour {
                        Some(neighbour) => delete_adjacent(tx, neighbour, backward),
                        None => merge_at_boundary(tx, point.key, backward),
                    }
                }
            }
        }
    }
}

fn delete_from_text(tx: &mut Transaction<'_>, point: Point, backward: bool) -> EditorResult<bool> {
    let node = tx.get(point.key)?;
    let len = node.text_len();
    let mode = node.mode();
    let offset = point.offset.min(len);

    let inside = if backward { offset > 0 } else { offset < len };
    if inside {
        if mode != TextMode::Normal {
            tx.remove(point.key)?;
            return Ok(true);
        }
        let at = if backward { offset - 1 } else { offset };
        tx.splice_text(point.key, at, 1, "")?;
        tx.set_caret(Point::text(point.key, at));
        return Ok(true);
    }

    match adjacent_in_block(tx, point.key, backward)? {
        Some(neighbour) => delete_adjacent(tx, neighbour, backward),
        None => merge_at_boundary(tx, point.key, backward),
    }
}

/// Sibling in the given direction, stepping out of inline parents
fn adjacent_in_block(
    tx: &Transaction<'_>,
    key: NodeKey,
    backward: bool,
) -> EditorResult<Option<NodeKey>> {
    let mut current = key;
    loop {
        let sibling = if backward {
            tx.previous_sibling(current)?
        } else {
            tx.next_sibling(current)?
        };
        if sibling.is_some() {
            return Ok(sibling);
        }
        let Some(parent) = tx.parent_of(current)? else {
            return Ok(None);
        };
        let parent_node = tx.get(parent)?;
        if parent_node.is_root() || !tx.registry().behavior_for(parent_node).is_inline(parent_node) {
            return Ok(None);
        }
        current = parent;
    }
}

/// Delete the character or atomic node next to the caret
fn delete_adjacent(tx: &mut Transaction<'_>, neighbour: NodeKey, backward: bool) -> EditorResult<bool> {
    let node = tx.get(neighbour)?;
    let behavior = tx.registry().behavior_for(node);

    if node.is_decorator() {
        if behavior.is_keyboard_selectable() {
            tx.select_nodes([neighbour]);
        } else {
            tx.remove(neighbour)?;
        }
        return Ok(true);
    }
    if node.is_line_break() {
        tx.remove(neighbour)?;
        return Ok(true);
    }
    if node.is_element() {
        let inner = if backward {
            tx.last_descendant(neighbour)?
        } else {
            tx.first_descendant(neighbour)?
        };
        if inner == neighbour {
            tx.remove(neighbour)?;
            return Ok(true);
        }
        return delete_adjacent(tx, inner, backward);
    }

    let len = node.text_len();
    if node.mode() != TextMode::Normal || len == 0 {
        tx.remove(neighbour)?;
        return Ok(true);
    }
    if backward {
        tx.splice_text(neighbour, len - 1, 1, "")?;
        tx.set_caret(Point::text(neighbour, len - 1));
    } else {
        tx.splice_text(neighbour, 0, 1, "")?;
    }
    Ok(true)
}

/// Caret at the edge of its block: join with the neighbouring block
fn merge_at_boundary(tx: &mut Transaction<'_>, key: NodeKey, backward: bool) -> EditorResult<bool> {
    let Some(block) = tx.nearest_block(key)? else {
        return Ok(false);
    };
    let sibling = if backward {
        tx.previous_sibling(block)?
    } else {
        tx.next_sibling(block)?
    };
    let Some(sibling) = sibling else {
        return Ok(false);
    };

    let sibling_node = tx.get(sibling)?;
    if sibling_node.is_decorator() {
        return delete_adjacent(tx, sibling, backward);
    }
    if !sibling_node.is_element() {
        return Ok(false);
    }

    if backward {
        let target = innermost_block(tx, sibling, true)?;
        let end = tx.end_point(target)?;
        let moved = tx.children_of(block)?.to_vec();
        tx.append_all(target, &moved)?;
        tx.set_caret(end);
        tx.remove(block)?;
    } else {
        let source = innermost_block(tx, sibling, false)?;
        let moved = tx.children_of(source)?.to_vec();
        tx.append_all(block, &moved)?;
        tx.remove(source)?;
    }
    debug!(block = %block, sibling = %sibling, backward, "merged blocks");
    Ok(true)
}

/// Deepest last (or first) block inside `key`
fn innermost_block(tx: &Transaction<'_>, key: NodeKey, last: bool) -> EditorResult<NodeKey> {
    let mut current = key;
    loop {
        let children = tx.children_of(current)?;
        let edge = if last { children.last() } else { children.first() };
        match edge {
            Some(child) => {
                let node = tx.get(*child)?;
                if node.is_element() && !tx.registry().behavior_for(node).is_inline(node) {
                    current = *child;
                } else {
                    return Ok(current);
                }
            }
            None => return Ok(current),
        }
    }
}

/// Delete the selected content and collapse the selection at its start
pub fn remove_text(tx: &mut Transaction<'_>) -> EditorResult<()> {
    let Some(range) = tx.range_selection() else {
        if let Some(nodes) = tx.node_selection() {
            for key in nodes.keys() {
                if tx.contains(key) {
                    tx.remove(key)?;
                }
            }
            tx.set_selection(None);
        }
        return Ok(());
    };
    if range.is_collapsed() {
        return Ok(());
    }
    let (start, end) = range.start_end(&*tx)?;
    let nodes = range.nodes(&*tx)?;
    let (Some(&first), Some(&last)) = (nodes.first(), nodes.last()) else {
        return Ok(());
    };

    if start.key == end.key && start.kind == PointKind::Text {
        let node = tx.get(start.key)?;
        let whole = start.offset == 0 && end.offset >= node.text_len();
        if node.mode() != TextMode::Normal && !whole {
            tx.set_caret(start);
            tx.remove(start.key)?;
        } else {
            tx.splice_text(start.key, start.offset, end.offset - start.offset, "")?;
            tx.set_caret(start);
        }
        return Ok(());
    }

    let first_block = tx.nearest_block(first)?;
    let last_block = tx.nearest_block(last)?;
    tx.set_caret(start);

    if end.kind == PointKind::Text && tx.get(last)?.is_text() {
        let node = tx.get(last)?;
        if node.mode() != TextMode::Normal && end.offset < node.text_len() {
            tx.remove(last)?;
        } else {
            tx.splice_text(last, 0, end.offset, "")?;
        }
    } else if last != first && !tx.get(last)?.is_element() {
        tx.remove(last)?;
    }

    for key in nodes.iter().skip(1).take(nodes.len().saturating_sub(2)) {
        if !tx.contains(*key) || !tx.is_attached(*key) {
            continue;
        }
        if tx.is_descendant_of(last, *key)? || tx.is_descendant_of(first, *key)? {
            continue;
        }
        tx.remove(*key)?;
    }

    let first_node = tx.get(first)?;
    if start.kind == PointKind::Text {
        let len = first_node.text_len();
        if first_node.mode() != TextMode::Normal {
            tx.remove(first)?;
        } else {
            tx.splice_text(first, start.offset, len.saturating_sub(start.offset), "")?;
        }
    } else if first != last && !first_node.is_element() && tx.is_attached(first) {
        tx.remove(first)?;
    }

    if let (Some(first_block), Some(last_block)) = (first_block, last_block) {
        if first_block != last_block && tx.is_attached(last_block) && tx.is_attached(first_block) {
            let moved = tx.children_of(last_block)?.to_vec();
            tx.append_all(first_block, &moved)?;
            tx.remove(last_block)?;
        }
    }
    Ok(())
}

/// Split the block at the caret; content after the caret moves into a new
/// block of the type the current block asks for
pub fn insert_paragraph(tx: &mut Transaction<'_>) -> EditorResult<()> {
    let Some(range) = tx.range_selection() else {
        return Ok(());
    };
    if !range.is_collapsed() {
        remove_text(tx)?;
    }
    let Some(range) = tx.range_selection() else {
        return Ok(());
    };
    let point = range.anchor;

    let Some(block) = tx.nearest_block(point.key)? else {
        let paragraph = tx.create_paragraph()?;
        tx.insert_at(NodeKey::ROOT, point.offset, paragraph)?;
        return tx.select_start(paragraph);
    };

    let moved = nodes_after_point(tx, block, point)?;
    let block_node = tx.get(block)?;
    let new_type = tx.registry().behavior_for(block_node).new_block_after(block_node);
    let direction = block_node.element().and_then(|e| e.direction);

    let new_block = tx.create_node(new_type, NodeInit::element())?;
    tx.set_direction(new_block, direction)?;
    tx.insert_after(block, new_block)?;
    tx.append_all(new_block, &moved)?;
    tx.select_start(new_block)
}

/// Direct children of `block` that come after the caret, splitting the text
/// node under the caret when needed
fn nodes_after_point(tx: &mut Transaction<'_>, block: NodeKey, point: Point) -> EditorResult<Vec<NodeKey>> {
    if point.kind == PointKind::Element && point.key == block {
        return Ok(tx.children_of(block)?.get(point.offset..).unwrap_or(&[]).to_vec());
    }

    // Child of the block that holds the caret
    let mut top = point.key;
    while let Some(parent) = tx.parent_of(top)? {
        if parent == block {
            break;
        }
        top = parent;
    }
    let children = tx.children_of(block)?.to_vec();
    let index = children.iter().position(|c| *c == top).unwrap_or(children.len());

    let start = if point.kind == PointKind::Text && top == point.key {
        let len = tx.get(point.key)?.text_len();
        if point.offset == 0 {
            index
        } else if point.offset >= len {
            index + 1
        } else {
            let parts = tx.split_text(point.key, &[point.offset])?;
            return Ok(std::iter::once(parts[1])
                .chain(children.get(index + 1..).unwrap_or(&[]).iter().copied())
                .collect());
        }
    } else {
        index + 1
    };
    Ok(children.get(start..).unwrap_or(&[]).to_vec())
}

/// Insert a line break at the caret
pub fn insert_line_break(tx: &mut Transaction<'_>) -> EditorResult<()> {
    let Some(range) = tx.range_selection() else {
        return Ok(());
    };
    if !range.is_collapsed() {
        remove_text(tx)?;
    }
    let Some(range) = tx.range_selection() else {
        return Ok(());
    };
    let point = range.anchor;
    let line_break = tx.create_line_break()?;

    match point.kind {
        PointKind::Text => {
            let len = tx.get(point.key)?.text_len();
            if point.offset == 0 {
                tx.insert_before(point.key, line_break)?;
                tx.set_caret(Point::text(point.key, 0));
                return Ok(());
            }
            if point.offset < len {
                let parts = tx.split_text(point.key, &[point.offset])?;
                tx.insert_after(parts[0], line_break)?;
                tx.set_caret(Point::text(parts[1], 0));
                return Ok(());
            }
            tx.insert_after(point.key, line_break)?;
        }
        PointKind::Element if point.key.is_root() => {
            let paragraph = tx.create_paragraph()?;
            tx.append(paragraph, line_break)?;
            tx.insert_at(NodeKey::ROOT, point.offset, paragraph)?;
        }
        PointKind::Element => tx.insert_at(point.key, point.offset, line_break)?,
    }

    let parent = tx.parent_of(line_break)?.unwrap_or(NodeKey::ROOT);
    let index = tx.index_within_parent(line_break)?.unwrap_or(0);
    tx.set_caret(Point::element(parent, index + 1));
    Ok(())
}

/// Toggle `format` over the selection. A collapsed caret only changes the
/// format of the text typed next.
pub fn format_text(tx: &mut Transaction<'_>, format: TextFormat) -> EditorResult<()> {
    let Some(mut range) = tx.range_selection() else {
        return Ok(());
    };
    if range.is_collapsed() {
        range.format.toggle(format);
        tx.set_selection(Some(Selection::Range(range)));
        return Ok(());
    }

    let (start, end) = range.start_end(&*tx)?;
    let mut texts = Vec::new();
    for key in range.nodes(&*tx)? {
        if tx.get(key)?.is_text() {
            texts.push(key);
        }
    }
    let Some(&first) = texts.first() else {
        return Ok(());
    };
    let adding = !tx.get(first)?.format().contains(format);

    for key in texts {
        let node = tx.get(key)?;
        let len = node.text_len();
        let whole_only = node.mode() != TextMode::Normal;
        let from = if key == start.key && !whole_only { start.offset.min(len) } else { 0 };
        let to = if key == end.key && !whole_only { end.offset.min(len) } else { len };
        if from >= to {
            continue;
        }
        let parts = tx.split_text(key, &[from, to])?;
        let target = if from > 0 { parts[1] } else { parts[0] };
        let mut next = tx.get(target)?.format();
        next.set(format, adding);
        tx.set_format(target, next)?;
    }

    if let Some(Selection::Range(mut range)) = tx.selection().cloned() {
        range.format.set(format, adding);
        tx.set_selection(Some(Selection::Range(range)));
    }
    Ok(())
}

/// Insert a block-level node after the block holding the selection. A
/// paragraph follows it when nothing else would hold the caret.
pub fn insert_block_node(tx: &mut Transaction<'_>, key: NodeKey) -> EditorResult<()> {
    let anchor = match tx.selection() {
        Some(Selection::Range(range)) => Some(range.anchor.key),
        Some(Selection::Node(nodes)) => nodes.keys().last(),
        None => None,
    };
    let block = match anchor {
        Some(anchor) if tx.contains(anchor) && tx.is_attached(anchor) => tx.top_level_element(anchor)?,
        _ => None,
    };

    match block {
        Some(block) => {
            let block_node = tx.get(block)?;
            let is_empty_paragraph =
                block_node.node_type() == "paragraph" && block_node.children().is_empty();
            tx.insert_after(block, key)?;
            if is_empty_paragraph {
                tx.remove(block)?;
            }
        }
        None => tx.append(NodeKey::ROOT, key)?,
    }

    if tx.get(key)?.is_element() {
        return tx.select_start(key);
    }
    match tx.next_sibling(key)? {
        Some(next) => tx.select_start(next),
        None => {
            let paragraph = tx.create_paragraph()?;
            tx.insert_after(key, paragraph)?;
            tx.select_start(paragraph)
        }
    }
}
