//! Hashtags: `#tag` runs split out of plain text as they are typed

use crate::text_entity::{char_range, register_text_entity};
use folio_core::registry::{default_create_dom, DomConversion};
use folio_core::{
    ConversionOutput, DomElement, Editor, EditorConfig, EditorResult, Node, NodeBase, NodeBehavior,
    NodeInit, NodeKey, Transaction, Unregister,
};
use regex::Regex;
use std::sync::OnceLock;

pub const HASHTAG: &str = "hashtag";

/// A `#` (or full-width `＃`) after a boundary, then word characters with at
/// least one letter or underscore
const HASHTAG_PATTERN: &str = r"(?:^|[^\w#＃])([#＃]\w*[\p{L}_]\w*)";

static HASHTAG_REGEX: OnceLock<Regex> = OnceLock::new();

#[derive(Debug)]
pub struct HashtagNode;

impl NodeBehavior for HashtagNode {
    fn node_type(&self) -> &'static str {
        HASHTAG
    }

    fn base(&self) -> NodeBase {
        NodeBase::Text
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = default_create_dom(node, config);
        dom.set_attr("data-folio-hashtag", "true");
        if let Some(class) = config.theme_class(HASHTAG) {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "span",
            priority: 1,
            convert: |element, tx| {
                if !element.has_attr("data-folio-hashtag") {
                    return Ok(None);
                }
                let key = create_hashtag(tx, &element.text_content())?;
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
}

pub fn create_hashtag(tx: &mut Transaction<'_>, text: &str) -> EditorResult<NodeKey> {
    tx.create_node(HASHTAG, NodeInit::text(text))
}

/// Character range of the first hashtag in `text`
pub fn find_hashtag(text: &str) -> Option<(usize, usize)> {
    let regex = HASHTAG_REGEX.get_or_init(|| Regex::new(HASHTAG_PATTERN).expect("hashtag pattern is valid"));
    let tag = regex.captures(text)?.get(1)?;
    Some(char_range(text, tag.start(), tag.end()))
}

pub fn register_hashtag_plugin(editor: &Editor) -> EditorResult<Vec<Unregister>> {
    register_text_entity(editor, HASHTAG, find_hashtag, create_hashtag)
}
