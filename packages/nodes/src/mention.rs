//! Mentions: segmented text runs naming a person or entity

use folio_core::editing::remove_text;
use folio_core::node::char_len;
use folio_core::registry::{default_create_dom, DomConversion};
use folio_core::{
    Command, CommandPriority, ConversionOutput, DomElement, Editor, EditorConfig, EditorResult, Node,
    NodeBase, NodeBehavior, NodeInit, NodeKey, PointKind, TextMode, Transaction, TreeView, Unregister,
};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

pub const MENTION: &str = "mention";

/// Payload: the name to mention
pub const INSERT_MENTION_COMMAND: Command<String> = Command::new("INSERT_MENTION_COMMAND");

/// `@query` directly before the caret
const TRIGGER_PATTERN: &str = r"(?:^|\s)(@[^\s@]{0,75})$";

static TRIGGER_REGEX: OnceLock<Regex> = OnceLock::new();

#[derive(Debug)]
pub struct MentionNode;

impl NodeBehavior for MentionNode {
    fn node_type(&self) -> &'static str {
        MENTION
    }

    fn base(&self) -> NodeBase {
        NodeBase::Text
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = default_create_dom(node, config);
        dom.set_attr("data-folio-mention", "true");
        if let Some(class) = config.theme_class(MENTION) {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "span",
            priority: 1,
            convert: |element, tx| {
                if !element.has_attr("data-folio-mention") {
                    return Ok(None);
                }
                let key = create_mention(tx, &element.text_content())?;
                Ok(Some(ConversionOutput::node(key)))
            },
        }]
    }

    fn is_text_entity(&self) -> bool {
        true
    }

    fn can_insert_text_before(&self, _node: &Node) -> bool {
        false
    }

    fn can_insert_text_after(&self, _node: &Node) -> bool {
        false
    }
}

pub fn create_mention(tx: &mut Transaction<'_>, name: &str) -> EditorResult<NodeKey> {
    tx.create_node(
        MENTION,
        NodeInit::text(name)
            .with_mode(TextMode::Segmented)
            .with_prop("mentionName", name),
    )
}

pub fn mention_name(node: &Node) -> Option<&str> {
    node.prop_str("mentionName")
}

/// Character offset of the `@` that starts a mention query ending at the
/// end of `text`
pub fn find_trigger(text: &str) -> Option<usize> {
    let regex = TRIGGER_REGEX.get_or_init(|| Regex::new(TRIGGER_PATTERN).expect("trigger pattern is valid"));
    let query = regex.captures(text)?.get(1)?;
    Some(char_len(&text[..query.start()]))
}

/// Insert a mention at the caret. A `@query` typed right before the caret
/// is replaced by the mention.
pub fn insert_mention(tx: &mut Transaction<'_>, name: &str) -> EditorResult<bool> {
    let Some(range) = tx.range_selection() else {
        return Ok(false);
    };
    if !range.is_collapsed() {
        remove_text(tx)?;
    }
    let Some(range) = tx.range_selection() else {
        return Ok(false);
    };
    let point = range.anchor;
    let mention = create_mention(tx, name)?;

    match point.kind {
        PointKind::Element if point.key.is_root() => {
            let paragraph = tx.create_paragraph()?;
            tx.append(paragraph, mention)?;
            tx.insert_at(NodeKey::ROOT, point.offset, paragraph)?;
        }
        PointKind::Element => tx.insert_at(point.key, point.offset, mention)?,
        PointKind::Text => {
            let node = tx.get(point.key)?;
            let offset = point.offset.min(node.text_len());
            let before: String = node.text().chars().take(offset).collect();
            let trigger = if node.is_simple_text() { find_trigger(&before) } else { None };

            match trigger {
                Some(start) => {
                    let parts = tx.split_text(point.key, &[start, offset])?;
                    let query = if start > 0 { parts[1] } else { parts[0] };
                    tx.replace(query, mention, false)?;
                    debug!(key = %mention, name, "mention replaced its query");
                }
                None if offset == 0 => tx.insert_before(point.key, mention)?,
                None => {
                    let parts = tx.split_text(point.key, &[offset])?;
                    tx.insert_after(parts[0], mention)?;
                }
            }
        }
    }
    tx.select_end(mention)?;
    Ok(true)
}

pub fn register_mention_plugin(editor: &Editor) -> Vec<Unregister> {
    vec![editor.register_command(
        &INSERT_MENTION_COMMAND,
        |name, tx| insert_mention(tx, name),
        CommandPriority::Editor,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_trigger() {
        assert_eq!(find_trigger("hi @al"), Some(3));
        assert_eq!(find_trigger("@"), Some(0));
        assert_eq!(find_trigger("mail@host"), None);
        assert_eq!(find_trigger("@al done"), None);
    }
}
