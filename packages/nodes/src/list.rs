//! # Lists
//!
//! `list > listitem > inline content`. A list's type decides its tag: `ul`
//! for bullet and check lists, `ol` for numbered ones. A transform on lists
//! keeps each item's `value` equal to the list's `start` plus its index.

use crate::util::{is_type, nearest_of_type, selected_blocks};
use folio_core::commands::INSERT_PARAGRAPH_COMMAND;
use folio_core::registry::{apply_element_attributes, DomConversion};
use folio_core::{
    Command, CommandPriority, ConversionOutput, DomElement, Editor, EditorConfig, EditorResult, Node,
    NodeBase, NodeBehavior, NodeInit, NodeKey, Transaction, TreeView, Unregister,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const LIST: &str = "list";
pub const LIST_ITEM: &str = "listitem";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[default]
    Bullet,
    Number,
    Check,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListType::Bullet => "bullet",
            ListType::Number => "number",
            ListType::Check => "check",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            ListType::Number => "ol",
            ListType::Bullet | ListType::Check => "ul",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "bullet" => Some(ListType::Bullet),
            "number" => Some(ListType::Number),
            "check" => Some(ListType::Check),
            _ => None,
        }
    }
}

pub const INSERT_UNORDERED_LIST_COMMAND: Command<()> = Command::new("INSERT_UNORDERED_LIST_COMMAND");
pub const INSERT_ORDERED_LIST_COMMAND: Command<()> = Command::new("INSERT_ORDERED_LIST_COMMAND");
pub const INSERT_CHECK_LIST_COMMAND: Command<()> = Command::new("INSERT_CHECK_LIST_COMMAND");
pub const REMOVE_LIST_COMMAND: Command<()> = Command::new("REMOVE_LIST_COMMAND");

pub fn list_type(node: &Node) -> ListType {
    node.prop_str("listType").and_then(ListType::parse).unwrap_or_default()
}

pub fn list_start(node: &Node) -> u64 {
    node.prop_u64("start").unwrap_or(1)
}

#[derive(Debug)]
pub struct ListNode;

impl NodeBehavior for ListNode {
    fn node_type(&self) -> &'static str {
        LIST
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let list_type = list_type(node);
        let mut dom = DomElement::new(list_type.tag());
        apply_element_attributes(node, &mut dom);
        let start = list_start(node);
        if list_type == ListType::Number && start != 1 {
            dom.set_attr("start", start.to_string());
        }
        if let Some(class) = config.theme_class(&format!("list.{}", list_type.tag())) {
            dom.add_class(class);
        }
        if list_type == ListType::Check {
            dom.set_attr("data-folio-checklist", "true");
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![
            DomConversion {
                tag: "ul",
                priority: 0,
                convert: |element, tx| {
                    let list_type = if element.has_attr("data-folio-checklist") {
                        ListType::Check
                    } else {
                        ListType::Bullet
                    };
                    Ok(Some(ConversionOutput::node(create_list(tx, list_type)?)))
                },
            },
            DomConversion {
                tag: "ol",
                priority: 0,
                convert: |element, tx| {
                    let list = create_list(tx, ListType::Number)?;
                    if let Some(start) = element.attr("start").and_then(|s| s.parse::<u64>().ok()) {
                        tx.set_prop(list, "start", start)?;
                    }
                    Ok(Some(ConversionOutput::node(list)))
                },
            },
        ]
    }

    fn can_be_empty(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct ListItemNode;

impl NodeBehavior for ListItemNode {
    fn node_type(&self) -> &'static str {
        LIST_ITEM
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = DomElement::new("li");
        apply_element_attributes(node, &mut dom);
        if let Some(value) = node.prop_u64("value") {
            dom.set_attr("value", value.to_string());
        }
        if let Some(checked) = node.prop_bool("checked") {
            dom.set_attr("role", "checkbox");
            dom.set_attr("aria-checked", if checked { "true" } else { "false" });
        }
        if let Some(class) = config.theme_class("listitem") {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "li",
            priority: 0,
            convert: |element, tx| {
                let item = tx.create_node(LIST_ITEM, NodeInit::element())?;
                if let Some(checked) = element.attr("aria-checked") {
                    tx.set_prop(item, "checked", checked == "true")?;
                }
                Ok(Some(ConversionOutput::node(item)))
            },
        }]
    }

    fn new_block_after(&self, _node: &Node) -> &'static str {
        LIST_ITEM
    }
}

pub fn create_list(tx: &mut Transaction<'_>, list_type: ListType) -> EditorResult<NodeKey> {
    tx.create_node(LIST, NodeInit::element().with_prop("listType", list_type.as_str()))
}

/// Turn the selected blocks into items of a list of `list_type`. Adjacent
/// blocks share one list; blocks already in a list change that list's type.
pub fn insert_list(tx: &mut Transaction<'_>, list_type: ListType) -> EditorResult<()> {
    let blocks = selected_blocks(tx)?;
    if blocks.is_empty() {
        let list = create_list(tx, list_type)?;
        let item = tx.create_node(LIST_ITEM, NodeInit::element())?;
        tx.append(list, item)?;
        tx.append(NodeKey::ROOT, list)?;
        return tx.select_start(item);
    }

    for block in blocks {
        if is_type(tx, block, LIST_ITEM) {
            if let Some(list) = tx.parent_of(block)? {
                tx.set_prop(list, "listType", list_type.as_str())?;
            }
            continue;
        }
        if tx.children_of(block)?.iter().any(|c| is_block(tx, *c)) {
            continue;
        }

        let item = tx.create_node(LIST_ITEM, NodeInit::element())?;
        tx.replace(block, item, true)?;
        let joinable = match tx.previous_sibling(item)? {
            Some(prev) if is_type(tx, prev, LIST) => {
                let prev_type = tx.get(prev).map(self::list_type).unwrap_or_default();
                (prev_type == list_type).then_some(prev)
            }
            _ => None,
        };
        let list = match joinable {
            Some(list) => list,
            None => {
                let list = create_list(tx, list_type)?;
                tx.insert_before(item, list)?;
                list
            }
        };
        tx.append(list, item)?;
        debug!(item = %item, list = %list, "block turned into list item");
    }
    Ok(())
}

fn is_block(tx: &Transaction<'_>, key: NodeKey) -> bool {
    tx.node(key)
        .map_or(false, |n| n.is_element() && !tx.registry().behavior_for(n).is_inline(n))
}

/// Turn every item of the selected lists back into paragraphs
pub fn remove_list(tx: &mut Transaction<'_>) -> EditorResult<()> {
    let mut lists = Vec::new();
    for block in selected_blocks(tx)? {
        if let Some(list) = nearest_of_type(tx, block, LIST)? {
            if !lists.contains(&list) {
                lists.push(list);
            }
        }
    }
    for list in lists {
        for item in tx.children_of(list)?.to_vec() {
            let paragraph = tx.create_paragraph()?;
            tx.replace(item, paragraph, true)?;
            tx.insert_before(list, paragraph)?;
        }
        if tx.contains(list) && tx.is_attached(list) {
            tx.remove(list)?;
        }
    }
    Ok(())
}

/// Paragraph break in an empty list item leaves the list. Items after it
/// move into a new list of the same type.
fn exit_list_on_empty_item(tx: &mut Transaction<'_>) -> EditorResult<bool> {
    let Some(range) = tx.range_selection() else {
        return Ok(false);
    };
    if !range.is_collapsed() {
        return Ok(false);
    }
    let Some(item) = nearest_of_type(tx, range.anchor.key, LIST_ITEM)? else {
        return Ok(false);
    };
    if !tx.children_of(item)?.is_empty() {
        return Ok(false);
    }
    let Some(list) = tx.parent_of(item)? else {
        return Ok(false);
    };

    let following: Vec<NodeKey> = {
        let siblings = tx.children_of(list)?;
        let index = siblings.iter().position(|k| *k == item).unwrap_or(siblings.len());
        siblings.get(index + 1..).unwrap_or(&[]).to_vec()
    };
    let paragraph = tx.create_paragraph()?;
    tx.insert_after(list, paragraph)?;
    if !following.is_empty() {
        let list_type = list_type(tx.get(list)?);
        let rest = create_list(tx, list_type)?;
        tx.insert_after(paragraph, rest)?;
        tx.append_all(rest, &following)?;
    }
    tx.remove(item)?;
    tx.select_start(paragraph)?;
    debug!(list = %list, "left list from an empty item");
    Ok(true)
}

pub fn set_checked(tx: &mut Transaction<'_>, item: NodeKey, checked: bool) -> EditorResult<()> {
    tx.set_prop(item, "checked", checked)
}

/// Number the items of `list`
fn update_values(tx: &mut Transaction<'_>, list: NodeKey) -> EditorResult<()> {
    let start = list_start(tx.get(list)?);
    for (i, item) in tx.children_of(list)?.to_vec().into_iter().enumerate() {
        if !is_type(tx, item, LIST_ITEM) {
            continue;
        }
        let value = start + i as u64;
        if tx.get(item)?.prop_u64("value") != Some(value) {
            tx.set_prop(item, "value", value)?;
        }
    }
    Ok(())
}

pub fn register_list_plugin(editor: &Editor) -> EditorResult<Vec<Unregister>> {
    let insert = |list_type: ListType| {
        move |_: &(), tx: &mut Transaction<'_>| {
            insert_list(tx, list_type)?;
            Ok(true)
        }
    };
    Ok(vec![
        editor.register_node_transform(LIST, |key, tx| update_values(tx, key))?,
        editor.register_command(&INSERT_UNORDERED_LIST_COMMAND, insert(ListType::Bullet), CommandPriority::Editor),
        editor.register_command(&INSERT_ORDERED_LIST_COMMAND, insert(ListType::Number), CommandPriority::Editor),
        editor.register_command(&INSERT_CHECK_LIST_COMMAND, insert(ListType::Check), CommandPriority::Editor),
        editor.register_command(
            &REMOVE_LIST_COMMAND,
            |_, tx| {
                remove_list(tx)?;
                Ok(true)
            },
            CommandPriority::Editor,
        ),
        editor.register_command(
            &INSERT_PARAGRAPH_COMMAND,
            |_, tx| exit_list_on_empty_item(tx),
            CommandPriority::Low,
        ),
    ])
}
