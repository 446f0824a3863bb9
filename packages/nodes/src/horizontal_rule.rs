//! Horizontal rules: atomic block decorators selected as whole nodes

use folio_core::commands::{CLICK_COMMAND, KEY_BACKSPACE_COMMAND, KEY_DELETE_COMMAND};
use folio_core::editing::insert_block_node;
use folio_core::registry::DomConversion;
use folio_core::{
    Command, CommandPriority, ConversionOutput, DomElement, Editor, EditorConfig, EditorResult, Node,
    NodeBase, NodeBehavior, NodeKey, NodeSelection, PointerEvent, Selection, Transaction, Unregister,
};
use serde_json::json;
use tracing::debug;

pub const HORIZONTAL_RULE: &str = "horizontalrule";

pub const INSERT_HORIZONTAL_RULE_COMMAND: Command<()> = Command::new("INSERT_HORIZONTAL_RULE_COMMAND");

#[derive(Debug)]
pub struct HorizontalRuleNode;

impl NodeBehavior for HorizontalRuleNode {
    fn node_type(&self) -> &'static str {
        HORIZONTAL_RULE
    }

    fn base(&self) -> NodeBase {
        NodeBase::Decorator
    }

    fn create_dom(&self, _node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = DomElement::new("hr");
        if let Some(class) = config.theme_class("hr") {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "hr",
            priority: 0,
            convert: |_, tx| Ok(Some(ConversionOutput::node(create_horizontal_rule(tx)?))),
        }]
    }

    fn is_inline(&self, _node: &Node) -> bool {
        false
    }

    fn text_content(&self, _node: &Node) -> Option<String> {
        Some("\n".to_string())
    }
}

pub fn create_horizontal_rule(tx: &mut Transaction<'_>) -> EditorResult<NodeKey> {
    tx.create_decorator(HORIZONTAL_RULE, json!({ "type": HORIZONTAL_RULE }))
}

fn is_rule(tx: &Transaction<'_>, key: NodeKey) -> bool {
    crate::util::is_type(tx, key, HORIZONTAL_RULE)
}

/// Click on a rule: select it, adding to the node selection with shift
fn on_click(event: &PointerEvent, tx: &mut Transaction<'_>) -> EditorResult<bool> {
    let Some(target) = event.target.filter(|k| is_rule(tx, *k)) else {
        return Ok(false);
    };
    let mut nodes = match (event.shift, tx.node_selection()) {
        (true, Some(nodes)) => nodes,
        _ => NodeSelection::new(),
    };
    if nodes.has(target) {
        nodes.delete(target);
    } else {
        nodes.add(target);
    }
    tx.set_selection(if nodes.is_empty() {
        None
    } else {
        Some(Selection::Node(nodes))
    });
    Ok(true)
}

/// Delete or backspace while rules are node-selected removes them
fn on_delete(tx: &mut Transaction<'_>) -> EditorResult<bool> {
    let Some(nodes) = tx.node_selection() else {
        return Ok(false);
    };
    let rules: Vec<NodeKey> = nodes.keys().filter(|k| is_rule(tx, *k)).collect();
    if rules.is_empty() {
        return Ok(false);
    }
    for key in &rules {
        tx.remove(*key)?;
    }
    tx.set_selection(None);
    debug!(removed = rules.len(), "selected horizontal rules deleted");
    Ok(true)
}

pub fn register_horizontal_rule_plugin(editor: &Editor) -> Vec<Unregister> {
    vec![
        editor.register_command(
            &INSERT_HORIZONTAL_RULE_COMMAND,
            |_, tx| {
                let rule = create_horizontal_rule(tx)?;
                insert_block_node(tx, rule)?;
                Ok(true)
            },
            CommandPriority::Editor,
        ),
        editor.register_command(&CLICK_COMMAND, on_click, CommandPriority::Low),
        editor.register_command(&KEY_DELETE_COMMAND, |_, tx| on_delete(tx), CommandPriority::Low),
        editor.register_command(&KEY_BACKSPACE_COMMAND, |_, tx| on_delete(tx), CommandPriority::Low),
    ]
}
