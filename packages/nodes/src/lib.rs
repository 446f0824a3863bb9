//! # Folio Nodes
//!
//! Node types and editing plugins built on `folio-core`. Each module defines
//! its behaviors plus a `register_*` function that installs the commands and
//! transforms it needs on an editor.
//!
//! ```rust,ignore
//! use folio_core::Editor;
//! use folio_nodes::{all_nodes, register_plugins};
//!
//! let editor = Editor::builder().nodes(all_nodes()).build()?;
//! let _handles = register_plugins(&editor)?;
//! ```

pub mod heading;
pub mod hashtag;
pub mod horizontal_rule;
pub mod list;
pub mod mention;
pub mod overflow;
pub mod rich_text;
pub mod table;
pub mod text_entity;
mod util;

pub use hashtag::HashtagNode;
pub use heading::{HeadingNode, QuoteNode};
pub use horizontal_rule::HorizontalRuleNode;
pub use list::{ListItemNode, ListNode, ListType};
pub use mention::MentionNode;
pub use overflow::OverflowNode;
pub use table::{TableCellNode, TableNode, TableRowNode};

use folio_core::{Editor, EditorResult, NodeBehavior, Unregister};
use std::sync::Arc;

/// Every node type of this crate, ready for `EditorBuilder::nodes`
pub fn all_nodes() -> Vec<Arc<dyn NodeBehavior>> {
    vec![
        Arc::new(HeadingNode),
        Arc::new(QuoteNode),
        Arc::new(ListNode),
        Arc::new(ListItemNode),
        Arc::new(TableNode),
        Arc::new(TableRowNode),
        Arc::new(TableCellNode),
        Arc::new(HashtagNode),
        Arc::new(MentionNode),
        Arc::new(HorizontalRuleNode),
        Arc::new(OverflowNode),
    ]
}

/// Rich-text commands plus the plugins of every node type in [`all_nodes`].
/// The character limit is not included; it needs a limit.
pub fn register_plugins(editor: &Editor) -> EditorResult<Vec<Unregister>> {
    let mut handles = rich_text::register_rich_text(editor);
    handles.extend(hashtag::register_hashtag_plugin(editor)?);
    handles.extend(mention::register_mention_plugin(editor));
    handles.extend(horizontal_rule::register_horizontal_rule_plugin(editor));
    handles.extend(list::register_list_plugin(editor)?);
    handles.extend(table::register_table_plugin(editor));
    handles.extend(heading::register_heading_plugin(editor));
    Ok(handles)
}
