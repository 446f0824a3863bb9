//! # Tables
//!
//! `table > tablerow > tablecell > blocks`. Cells are grid cells: they span
//! `colSpan` columns and `rowSpan` rows and carry a header state. A header
//! cell renders as `th` and a data cell as `td`; changing the header state
//! replaces the cell's surface element while its content is re-parented.

use bitflags::bitflags;
use folio_core::editing::insert_block_node;
use folio_core::registry::{apply_element_attributes, DomConversion};
use folio_core::{
    Command, CommandPriority, ConversionOutput, DomElement, Editor, EditorConfig, EditorError,
    EditorResult, ExternalElement, Node, NodeBase, NodeBehavior, NodeInit, NodeKey, Transaction,
    TreeView, Unregister,
};
use tracing::debug;

pub const TABLE: &str = "table";
pub const TABLE_ROW: &str = "tablerow";
pub const TABLE_CELL: &str = "tablecell";

bitflags! {
    /// Which header a cell belongs to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeaderState: u8 {
        const ROW = 1;
        const COLUMN = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertTablePayload {
    pub rows: usize,
    pub columns: usize,
    /// First row as a header row
    pub include_headers: bool,
}

pub const INSERT_TABLE_COMMAND: Command<InsertTablePayload> = Command::new("INSERT_TABLE_COMMAND");

#[derive(Debug)]
pub struct TableNode;

impl NodeBehavior for TableNode {
    fn node_type(&self) -> &'static str {
        TABLE
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = DomElement::new("table");
        apply_element_attributes(node, &mut dom);
        if let Some(class) = config.theme_class("table") {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "table",
            priority: 0,
            convert: |_, tx| Ok(Some(ConversionOutput::node(tx.create_node(TABLE, NodeInit::element())?))),
        }]
    }

    fn can_be_empty(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct TableRowNode;

impl NodeBehavior for TableRowNode {
    fn node_type(&self) -> &'static str {
        TABLE_ROW
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let mut dom = DomElement::new("tr");
        if let Some(height) = node.prop_u64("height") {
            dom.set_attr("style", format!("height: {}px;", height));
        }
        if let Some(class) = config.theme_class("tableRow") {
            dom.add_class(class);
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![DomConversion {
            tag: "tr",
            priority: 0,
            convert: |_, tx| {
                Ok(Some(ConversionOutput::node(
                    tx.create_node(TABLE_ROW, NodeInit::element())?,
                )))
            },
        }]
    }

    fn can_be_empty(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct TableCellNode;

impl NodeBehavior for TableCellNode {
    fn node_type(&self) -> &'static str {
        TABLE_CELL
    }

    fn base(&self) -> NodeBase {
        NodeBase::Element
    }

    fn create_dom(&self, node: &Node, config: &EditorConfig) -> DomElement {
        let header = header_state(node);
        let mut dom = DomElement::new(if header.is_empty() { "td" } else { "th" });
        apply_element_attributes(node, &mut dom);

        let (columns, rows) = span(node);
        if columns > 1 {
            dom.set_attr("colspan", columns.to_string());
        }
        if rows > 1 {
            dom.set_attr("rowspan", rows.to_string());
        }
        if let Some(width) = node.prop_u64("width") {
            dom.set_attr("style", format!("width: {}px;", width));
        }
        if let Some(class) = config.theme_class("tableCell") {
            dom.add_class(class);
        }
        if !header.is_empty() {
            if let Some(class) = config.theme_class("tableCellHeader") {
                dom.add_class(class);
            }
        }
        dom
    }

    fn import_dom(&self) -> Vec<DomConversion> {
        vec![
            DomConversion {
                tag: "td",
                priority: 0,
                convert: |element, tx| import_cell(element, tx, HeaderState::empty()),
            },
            DomConversion {
                tag: "th",
                priority: 0,
                convert: |element, tx| import_cell(element, tx, HeaderState::ROW),
            },
        ]
    }
}

fn import_cell(
    element: &ExternalElement,
    tx: &mut Transaction<'_>,
    header: HeaderState,
) -> EditorResult<Option<ConversionOutput>> {
    let parse = |name: &str| element.attr(name).and_then(|v| v.trim().parse::<u64>().ok());
    let cell = create_cell(tx, header)?;
    if let Some(columns) = parse("colspan").filter(|c| *c > 1) {
        tx.set_prop(cell, "colSpan", columns)?;
    }
    if let Some(rows) = parse("rowspan").filter(|r| *r > 1) {
        tx.set_prop(cell, "rowSpan", rows)?;
    }
    Ok(Some(ConversionOutput::node(cell)))
}

pub fn header_state(node: &Node) -> HeaderState {
    node.prop_u64("headerState")
        .map(|bits| HeaderState::from_bits_truncate(bits as u8))
        .unwrap_or_default()
}

/// Column and row span of a cell
pub fn span(node: &Node) -> (u64, u64) {
    (
        node.prop_u64("colSpan").unwrap_or(1).max(1),
        node.prop_u64("rowSpan").unwrap_or(1).max(1),
    )
}

pub fn create_cell(tx: &mut Transaction<'_>, header: HeaderState) -> EditorResult<NodeKey> {
    let mut init = NodeInit::element();
    if !header.is_empty() {
        init = init.with_prop("headerState", header.bits());
    }
    tx.create_node(TABLE_CELL, init)
}

/// Cell holding an empty paragraph
fn create_filled_cell(tx: &mut Transaction<'_>, header: HeaderState) -> EditorResult<NodeKey> {
    let cell = create_cell(tx, header)?;
    let paragraph = tx.create_paragraph()?;
    tx.append(cell, paragraph)?;
    Ok(cell)
}

/// Detached table of `rows` x `columns` cells, each with an empty paragraph
pub fn create_table(
    tx: &mut Transaction<'_>,
    rows: usize,
    columns: usize,
    include_headers: bool,
) -> EditorResult<NodeKey> {
    if rows == 0 || columns == 0 {
        return Err(EditorError::InvalidState(format!(
            "a table needs at least one row and column, got {}x{}",
            rows, columns
        )));
    }
    let table = tx.create_node(TABLE, NodeInit::element())?;
    for r in 0..rows {
        let row = tx.create_node(TABLE_ROW, NodeInit::element())?;
        tx.append(table, row)?;
        let header = if include_headers && r == 0 {
            HeaderState::ROW
        } else {
            HeaderState::empty()
        };
        for _ in 0..columns {
            let cell = create_filled_cell(tx, header)?;
            tx.append(row, cell)?;
        }
    }
    Ok(table)
}

pub fn set_header_state(tx: &mut Transaction<'_>, cell: NodeKey, header: HeaderState) -> EditorResult<()> {
    if header.is_empty() {
        tx.remove_prop(cell, "headerState")
    } else {
        tx.set_prop(cell, "headerState", header.bits())
    }
}

pub fn set_span(tx: &mut Transaction<'_>, cell: NodeKey, columns: u64, rows: u64) -> EditorResult<()> {
    tx.set_prop(cell, "colSpan", columns.max(1))?;
    tx.set_prop(cell, "rowSpan", rows.max(1))
}

/// Cell at a row and child index
pub fn cell_at<T: TreeView + ?Sized>(
    view: &T,
    table: NodeKey,
    row: usize,
    column: usize,
) -> EditorResult<Option<NodeKey>> {
    let Some(row) = view.children_of(table)?.get(row).copied() else {
        return Ok(None);
    };
    Ok(view.children_of(row)?.get(column).copied())
}

/// Insert a row after `row` with as many cells as `row` has. Returns it.
pub fn insert_row_after(tx: &mut Transaction<'_>, row: NodeKey) -> EditorResult<NodeKey> {
    let columns = tx.children_of(row)?.len();
    let new_row = tx.create_node(TABLE_ROW, NodeInit::element())?;
    for _ in 0..columns {
        let cell = create_filled_cell(tx, HeaderState::empty())?;
        tx.append(new_row, cell)?;
    }
    tx.insert_after(row, new_row)?;
    debug!(row = %new_row, columns, "table row inserted");
    Ok(new_row)
}

/// Insert a cell after the `column`th cell of every row
pub fn insert_column_after(tx: &mut Transaction<'_>, table: NodeKey, column: usize) -> EditorResult<()> {
    for row in tx.children_of(table)?.to_vec() {
        let cells = tx.children_of(row)?.to_vec();
        // Header columns extend to the new cell
        let header = cells
            .get(column)
            .and_then(|c| tx.node(*c))
            .map(header_state)
            .unwrap_or_default()
            & HeaderState::ROW;
        let cell = create_filled_cell(tx, header)?;
        match cells.get(column) {
            Some(after) => tx.insert_after(*after, cell)?,
            None => tx.append(row, cell)?,
        }
    }
    Ok(())
}

pub fn register_table_plugin(editor: &Editor) -> Vec<Unregister> {
    vec![editor.register_command(
        &INSERT_TABLE_COMMAND,
        |payload, tx| {
            let table = create_table(tx, payload.rows, payload.columns, payload.include_headers)?;
            insert_block_node(tx, table)?;
            Ok(true)
        },
        CommandPriority::Editor,
    )]
}
