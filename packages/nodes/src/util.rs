use folio_core::{EditorResult, NodeKey, Selection, Transaction, TreeView};

/// Blocks touched by the pending selection, in document order
pub(crate) fn selected_blocks(tx: &Transaction<'_>) -> EditorResult<Vec<NodeKey>> {
    let mut keys = match tx.selection() {
        None => return Ok(Vec::new()),
        Some(Selection::Range(range)) => range.nodes(tx)?,
        Some(Selection::Node(nodes)) => nodes.keys().collect(),
    };
    keys.retain(|k| tx.contains(*k) && tx.is_attached(*k));
    keys.sort_by(|a, b| tx.compare_order(*a, *b).unwrap_or(std::cmp::Ordering::Equal));

    let mut blocks = Vec::new();
    for key in keys {
        if let Some(block) = tx.nearest_block(key)? {
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        }
    }
    Ok(blocks)
}

pub(crate) fn is_type(tx: &Transaction<'_>, key: NodeKey, node_type: &str) -> bool {
    tx.node(key).map_or(false, |n| n.node_type() == node_type)
}

/// Closest ancestor-or-self of the given type
pub(crate) fn nearest_of_type(
    tx: &Transaction<'_>,
    key: NodeKey,
    node_type: &str,
) -> EditorResult<Option<NodeKey>> {
    let mut current = Some(key);
    while let Some(k) = current {
        let node = tx.get(k)?;
        if node.node_type() == node_type {
            return Ok(Some(k));
        }
        current = node.parent();
    }
    Ok(None)
}
