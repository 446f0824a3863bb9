//! Selection editing operations

use folio_core::editing::{
    delete_character, format_text, insert_block_node, insert_line_break, insert_paragraph, insert_text,
    remove_text,
};
use folio_core::html::{generate_html, import_external, insert_generated_nodes};
use folio_core::{
    Editor, EditorConfig, ExternalElement, ExternalNode, NodeKey, Point, PointKind, Selection, TextFormat,
    TreeView,
};

fn editor_with(texts: &'static [&'static str]) -> Editor {
    let editor = Editor::new(EditorConfig::default());
    editor
        .update_discrete(move |tx| {
            for text in texts {
                let paragraph = tx.create_paragraph()?;
                let run = tx.create_text(*text)?;
                tx.append(paragraph, run)?;
                tx.append(NodeKey::ROOT, paragraph)?;
            }
            Ok(())
        })
        .unwrap();
    editor
}

fn blocks(editor: &Editor) -> Vec<String> {
    editor.read(|state| {
        state
            .children_of(NodeKey::ROOT)
            .unwrap()
            .iter()
            .map(|key| state.text_content(*key).unwrap())
            .collect()
    })
}

fn caret(editor: &Editor) -> Point {
    match editor.read(|s| s.selection().cloned()) {
        Some(Selection::Range(range)) => {
            assert!(range.is_collapsed());
            range.anchor
        }
        other => panic!("expected a caret, got {:?}", other),
    }
}

fn text_key(editor: &Editor, block: usize) -> NodeKey {
    editor.read(|s| {
        let block = s.children_of(NodeKey::ROOT).unwrap()[block];
        s.first_descendant(block).unwrap()
    })
}

#[test]
fn test_insert_text_at_caret() {
    let editor = editor_with(&["helo"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(text, 3));
            insert_text(tx, "l")
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["hello"]);
    assert_eq!(caret(&editor), Point::text(text, 4));
}

#[test]
fn test_insert_text_replaces_selection() {
    let editor = editor_with(&["hello world"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.select_text(text, 6, 11)?;
            insert_text(tx, "there")
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["hello there"]);
}

#[test]
fn test_typing_with_pending_format_starts_new_run() {
    let editor = editor_with(&["plain"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(text, 5));
            format_text(tx, TextFormat::BOLD)?;
            insert_text(tx, "bold")
        })
        .unwrap();

    editor.read(|s| {
        let paragraph = s.children_of(NodeKey::ROOT).unwrap()[0];
        let runs = s.children_of(paragraph).unwrap();
        assert_eq!(runs.len(), 2);
        let second = s.get(runs[1]).unwrap();
        assert_eq!(second.text(), "bold");
        assert_eq!(second.format(), TextFormat::BOLD);
    });
}

#[test]
fn test_backspace_inside_text() {
    let editor = editor_with(&["hello"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(text, 5));
            delete_character(tx, true).map(|_| ())
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["hell"]);
    assert_eq!(caret(&editor), Point::text(text, 4));
}

#[test]
fn test_backspace_at_block_start_merges() {
    let editor = editor_with(&["one", "two"]);
    let second = text_key(&editor, 1);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(second, 0));
            delete_character(tx, true).map(|_| ())
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["onetwo"]);
    // Runs were merged at commit; the caret sits between the halves
    let point = caret(&editor);
    assert_eq!(point.kind, PointKind::Text);
    assert_eq!(point.offset, 3);
}

#[test]
fn test_forward_delete_at_block_end_merges() {
    let editor = editor_with(&["one", "two"]);
    let first = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(first, 3));
            delete_character(tx, false).map(|_| ())
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["onetwo"]);
}

#[test]
fn test_backspace_at_document_start_does_nothing() {
    let editor = editor_with(&["one"]);
    let first = text_key(&editor, 0);
    let before = editor.get_editor_state();
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(first, 0));
            Ok(())
        })
        .unwrap();
    let version = editor.read(|s| s.version());
    editor
        .update_discrete(|tx| {
            assert!(!delete_character(tx, true)?);
            Ok(())
        })
        .unwrap();
    assert_eq!(editor.read(|s| s.version()), version);
    assert_eq!(blocks(&editor), blocks_of(&before));
}

fn blocks_of(state: &folio_core::EditorState) -> Vec<String> {
    state
        .children_of(NodeKey::ROOT)
        .unwrap()
        .iter()
        .map(|key| state.text_content(*key).unwrap())
        .collect()
}

#[test]
fn test_remove_text_across_blocks() {
    let editor = editor_with(&["hello", "middle", "world"]);
    let first = text_key(&editor, 0);
    let last = text_key(&editor, 2);
    editor
        .update_discrete(move |tx| {
            let range = folio_core::RangeSelection::new(Point::text(first, 2), Point::text(last, 3));
            tx.set_selection(Some(Selection::Range(range)));
            remove_text(tx)
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["held"]);
    assert_eq!(caret(&editor), Point::text(first, 2));
}

#[test]
fn test_backward_selection_removes_same_content() {
    let editor = editor_with(&["abcdef"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.select_text(text, 4, 1)?;
            remove_text(tx)
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["aef"]);
}

#[test]
fn test_insert_paragraph_splits_block() {
    let editor = editor_with(&["helloworld"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(text, 5));
            insert_paragraph(tx)
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["hello", "world"]);
    let second = text_key(&editor, 1);
    assert_eq!(caret(&editor), Point::text(second, 0));
}

#[test]
fn test_insert_paragraph_at_end_makes_empty_block() {
    let editor = editor_with(&["hello"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(text, 5));
            insert_paragraph(tx)?;
            insert_text(tx, "next")
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["hello", "next"]);
}

#[test]
fn test_insert_line_break() {
    let editor = editor_with(&["ab"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.set_caret(Point::text(text, 1));
            insert_line_break(tx)
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["a\nb"]);
}

#[test]
fn test_format_text_over_range() {
    let editor = editor_with(&["hello world"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| {
            tx.select_text(text, 0, 5)?;
            format_text(tx, TextFormat::BOLD)
        })
        .unwrap();

    editor.read(|s| {
        let paragraph = s.children_of(NodeKey::ROOT).unwrap()[0];
        let runs: Vec<_> = s
            .children_of(paragraph)
            .unwrap()
            .iter()
            .map(|k| {
                let node = s.get(*k).unwrap();
                (node.text().to_string(), node.format())
            })
            .collect();
        assert_eq!(
            runs,
            vec![
                ("hello".to_string(), TextFormat::BOLD),
                (" world".to_string(), TextFormat::empty()),
            ]
        );
    });

    // Toggling again removes the format and the runs merge back
    editor
        .update_discrete(move |tx| {
            tx.select_text(text, 0, 5)?;
            format_text(tx, TextFormat::BOLD)
        })
        .unwrap();
    editor.read(|s| {
        let paragraph = s.children_of(NodeKey::ROOT).unwrap()[0];
        assert_eq!(s.children_of(paragraph).unwrap().len(), 1);
    });
}

#[test]
fn test_insert_block_node_replaces_empty_paragraph() {
    let editor = editor_with(&["text"]);
    editor
        .update_discrete(|tx| {
            let empty = tx.create_paragraph()?;
            tx.append(NodeKey::ROOT, empty)?;
            tx.select_start(empty)?;
            let block = tx.create_paragraph()?;
            let run = tx.create_text("block")?;
            tx.append(block, run)?;
            insert_block_node(tx, block)
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["text", "block"]);
}

#[test]
fn test_html_export_and_paste() {
    let editor = editor_with(&["hello"]);
    let text = text_key(&editor, 0);
    editor
        .update_discrete(move |tx| tx.set_format(text, TextFormat::BOLD | TextFormat::UNDERLINE))
        .unwrap();
    let html = editor.read(|s| generate_html(s, editor.config()).unwrap());
    assert_eq!(
        html,
        "<p><strong data-folio-text=\"true\"><u>hello</u></strong></p>"
    );

    let pasted = vec![
        ExternalNode::Element(
            ExternalElement::new("p").with_child(ExternalNode::Element(
                ExternalElement::new("em").with_text("pasted"),
            )),
        ),
        ExternalNode::Text("tail".to_string()),
    ];
    editor
        .update_discrete(move |tx| {
            tx.select_end(text)?;
            let nodes = import_external(tx, &pasted)?;
            insert_generated_nodes(tx, &nodes)
        })
        .unwrap();
    assert_eq!(blocks(&editor), vec!["hello", "pasted", "tail"]);
    editor.read(|s| {
        let paragraph = s.children_of(NodeKey::ROOT).unwrap()[1];
        let run = s.first_descendant(paragraph).unwrap();
        assert_eq!(s.get(run).unwrap().format(), TextFormat::ITALIC);
    });
}
