//! # Text Entities
//!
//! A text entity is a run of text a matcher recognizes, such as a hashtag.
//! Two node transforms keep entities in step with the text:
//!
//! - plain text runs are scanned and every match is split out into an
//!   entity node (text typed right after an entity may extend it instead)
//! - entity nodes whose text no longer matches as a whole turn back into
//!   plain text, which the first transform then scans again
//!
//! Matchers report character offsets `[start, end)` of the first match.

use crate::util::is_type;
use folio_core::node::char_len;
use folio_core::{Editor, EditorResult, NodeKey, Point, Transaction, TreeView, Unregister};
use tracing::debug;

/// First match in a string, as character offsets
pub type EntityMatcher = fn(&str) -> Option<(usize, usize)>;

/// Creates a detached entity node holding the given text
pub type EntityFactory = fn(&mut Transaction<'_>, &str) -> EditorResult<NodeKey>;

pub fn register_text_entity(
    editor: &Editor,
    entity_type: &'static str,
    matcher: EntityMatcher,
    create: EntityFactory,
) -> EditorResult<Vec<Unregister>> {
    let text = editor.register_node_transform("text", move |key, tx| {
        split_entities(tx, key, entity_type, matcher, create)
    })?;
    let entity = editor.register_node_transform(entity_type, move |key, tx| {
        revalidate_entity(tx, key, matcher)
    })?;
    Ok(vec![text, entity])
}

/// Convert a byte range of `text` into character offsets
pub fn char_range(text: &str, start: usize, end: usize) -> (usize, usize) {
    (char_len(&text[..start]), char_len(&text[..end]))
}

fn split_entities(
    tx: &mut Transaction<'_>,
    key: NodeKey,
    entity_type: &str,
    matcher: EntityMatcher,
    create: EntityFactory,
) -> EditorResult<()> {
    let node = tx.get(key)?;
    if !node.is_simple_text() {
        return Ok(());
    }
    let format = node.format();

    if extend_previous_entity(tx, key, entity_type, matcher)? {
        return Ok(());
    }

    let mut current = key;
    loop {
        let text = tx.get(current)?.text().to_string();
        let Some((start, end)) = matcher(&text) else {
            return Ok(());
        };
        if start >= end {
            return Ok(());
        }

        let parts = tx.split_text(current, &[start, end])?;
        let (target, rest) = if start == 0 {
            (parts[0], parts.get(1).copied())
        } else {
            (parts[1], parts.get(2).copied())
        };
        let matched = tx.get(target)?.text().to_string();
        let entity = create(tx, &matched)?;
        tx.set_format(entity, format)?;
        tx.replace(target, entity, false)?;
        debug!(key = %entity, entity_type, text = %matched, "text entity created");

        match rest {
            Some(rest) => current = rest,
            None => return Ok(()),
        }
    }
}

/// Move the start of `key` into a preceding entity when the joined text
/// still matches from the entity's start. Returns true when `key` is gone.
fn extend_previous_entity(
    tx: &mut Transaction<'_>,
    key: NodeKey,
    entity_type: &str,
    matcher: EntityMatcher,
) -> EditorResult<bool> {
    let Some(prev) = tx.previous_sibling(key)? else {
        return Ok(false);
    };
    if !is_type(tx, prev, entity_type) {
        return Ok(false);
    }
    let prev_text = tx.get(prev)?.text().to_string();
    let text = tx.get(key)?.text().to_string();
    let prev_len = char_len(&prev_text);
    let combined = format!("{}{}", prev_text, text);

    let end = match matcher(&combined) {
        Some((0, end)) if end > prev_len => end,
        _ => return Ok(false),
    };
    let moved = end - prev_len;
    let caret = tx
        .range_selection()
        .filter(|r| r.is_collapsed() && r.anchor.key == key)
        .map(|r| r.anchor.offset);

    let extended: String = combined.chars().take(end).collect();
    let remaining: String = text.chars().skip(moved).collect();
    tx.set_text(prev, extended)?;
    let gone = remaining.is_empty();
    if gone {
        tx.remove(key)?;
    } else {
        tx.set_text(key, remaining)?;
    }

    if let Some(offset) = caret {
        if offset <= moved {
            tx.set_caret(Point::text(prev, prev_len + offset));
        } else if !gone {
            tx.set_caret(Point::text(key, offset - moved));
        }
    }
    debug!(key = %prev, moved, "text entity extended");
    Ok(gone)
}

fn revalidate_entity(tx: &mut Transaction<'_>, key: NodeKey, matcher: EntityMatcher) -> EditorResult<()> {
    let node = tx.get(key)?;
    let text = node.text().to_string();
    let len = char_len(&text);
    if matches!(matcher(&text), Some((0, end)) if end == len) {
        return Ok(());
    }

    let format = node.format();
    let plain = tx.create_text(text)?;
    tx.set_format(plain, format)?;
    tx.replace(key, plain, false)?;
    debug!(key = %key, "text entity reverted to plain text");
    Ok(())
}
