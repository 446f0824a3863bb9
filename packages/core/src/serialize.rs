//! JSON form of editor states
//!
//! Each node serializes to `{ "type", "version", "children"?, ..fields }`
//! where the fields come from the node type's `export_json`.

use crate::errors::{EditorError, EditorResult};
use crate::key::NodeKey;
use crate::node::{NodeBase, NodeKind};
use crate::transaction::Transaction;
use crate::tree::TreeView;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SerializedNode>>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SerializedNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            version: default_version(),
            children: None,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<SerializedNode>) -> Self {
        self.children = Some(children);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEditorState {
    pub root: SerializedNode,
}

/// JSON form of a node and its subtree
pub fn export_node<T: TreeView + ?Sized>(view: &T, key: NodeKey) -> EditorResult<SerializedNode> {
    let node = view.get(key)?;
    let behavior = view.registry().behavior_for(node);
    let mut serialized = SerializedNode::new(node.node_type());
    serialized.fields = behavior.export_json(node);
    if node.is_element() {
        let children = node
            .children()
            .iter()
            .map(|child| export_node(view, *child))
            .collect::<EditorResult<Vec<_>>>()?;
        serialized.children = Some(children);
    }
    Ok(serialized)
}

pub fn export_state<T: TreeView + ?Sized>(view: &T) -> EditorResult<SerializedEditorState> {
    Ok(SerializedEditorState {
        root: export_node(view, NodeKey::ROOT)?,
    })
}

/// Rebuild a detached node and its subtree inside a transaction
pub fn import_node(tx: &mut Transaction<'_>, serialized: &SerializedNode) -> EditorResult<NodeKey> {
    let behavior = tx.registry().get(&serialized.node_type)?;
    let init = behavior.import_json(serialized)?;
    if init.base() == NodeBase::Root {
        return Err(EditorError::InvalidState(
            "a root can only appear at the top of a document".into(),
        ));
    }
    let key = tx.create_node(&serialized.node_type, init)?;
    for child in serialized.children.iter().flatten() {
        let child_key = import_node(tx, child)?;
        tx.append(key, child_key)?;
    }
    Ok(key)
}

/// Load a document into the root of the transaction, replacing its children
pub fn import_state(tx: &mut Transaction<'_>, state: &SerializedEditorState) -> EditorResult<()> {
    let root = &state.root;
    if root.node_type != "root" {
        return Err(EditorError::InvalidState(format!(
            "document root has type {}",
            root.node_type
        )));
    }
    let init = tx.registry().get("root")?.import_json(root)?;
    if let NodeKind::Root(data) = init.kind {
        tx.set_element_format(NodeKey::ROOT, data.format)?;
        tx.set_indent(NodeKey::ROOT, data.indent)?;
        tx.set_direction(NodeKey::ROOT, data.direction)?;
    }

    let mut children = Vec::new();
    for child in root.children.iter().flatten() {
        children.push(import_node(tx, child)?);
    }
    let count = tx.children_of(NodeKey::ROOT)?.len();
    tx.splice_children(NodeKey::ROOT, 0, count, &children)?;
    tx.set_selection(None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_node_shape() {
        let node = SerializedNode::new("text")
            .with_field("text", "hi")
            .with_field("format", 1);

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["version"], 1);
        assert_eq!(json["text"], "hi");
        assert!(json.get("children").is_none());
    }

    #[test]
    fn test_parse_defaults_version() {
        let json = r#"{ "type": "paragraph", "children": [], "indent": 2 }"#;
        let node: SerializedNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.version, 1);
        assert_eq!(node.children, Some(vec![]));
        assert_eq!(node.fields.get("indent"), Some(&Value::from(2)));
    }
}
