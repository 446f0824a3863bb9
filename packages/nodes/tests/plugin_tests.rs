//! Node plugins driven through an editor with every node registered

use folio_core::commands::{
    CLICK_COMMAND, CONTROLLED_TEXT_INSERTION_COMMAND, INSERT_PARAGRAPH_COMMAND, KEY_BACKSPACE_COMMAND,
    KEY_DELETE_COMMAND,
};
use folio_core::html::{generate_html, import_external};
use folio_core::reconciler::Reconciler;
use folio_core::{
    Editor, EditorConfig, ExternalElement, ExternalNode, NodeInit, NodeKey, Point, PointerEvent, RangeSelection,
    Selection, Surface, TextFormat, TreeView, VirtualSurface,
};
use folio_nodes::hashtag::{create_hashtag, HASHTAG};
use folio_nodes::heading::{create_heading, heading_tag, set_blocks_type, HeadingTag, HEADING};
use folio_nodes::horizontal_rule::create_horizontal_rule;
use folio_nodes::list::{
    create_list, list_type, INSERT_ORDERED_LIST_COMMAND, INSERT_UNORDERED_LIST_COMMAND, LIST, LIST_ITEM,
    REMOVE_LIST_COMMAND,
};
use folio_nodes::mention::{mention_name, INSERT_MENTION_COMMAND, MENTION};
use folio_nodes::overflow::{register_character_limit, remaining_characters, OVERFLOW};
use folio_nodes::table::{
    cell_at, header_state, set_header_state, HeaderState, InsertTablePayload, INSERT_TABLE_COMMAND, TABLE,
};
use folio_nodes::{all_nodes, register_plugins, ListType};

fn editor() -> Editor {
    let editor = Editor::builder().nodes(all_nodes()).build().unwrap();
    let _handles = register_plugins(&editor).unwrap();
    editor
}

/// One paragraph per text with the caret at the end of the last one
fn editor_with(texts: &'static [&'static str]) -> Editor {
    let editor = editor();
    editor
        .update_discrete(move |tx| {
            let mut last = None;
            for text in texts {
                let paragraph = tx.create_paragraph()?;
                if !text.is_empty() {
                    let run = tx.create_text(*text)?;
                    tx.append(paragraph, run)?;
                }
                tx.append(NodeKey::ROOT, paragraph)?;
                last = Some(paragraph);
            }
            match last {
                Some(paragraph) => tx.select_end(paragraph),
                None => Ok(()),
            }
        })
        .unwrap();
    editor
}

fn dispatch<P: 'static>(editor: &Editor, command: &folio_core::Command<P>, payload: P) -> bool {
    let handled = editor.dispatch_command(command, payload).unwrap();
    editor.flush().unwrap();
    handled
}

fn content(editor: &Editor) -> String {
    editor.read(|s| s.text_content(NodeKey::ROOT).unwrap())
}

fn root_types(editor: &Editor) -> Vec<String> {
    editor.read(|s| {
        s.children_of(NodeKey::ROOT)
            .unwrap()
            .iter()
            .map(|k| s.get(*k).unwrap().node_type().to_string())
            .collect()
    })
}

/// Key and text of every node of `node_type` in document order
fn nodes_of(editor: &Editor, node_type: &str) -> Vec<(NodeKey, String)> {
    editor.read(|s| {
        s.descendants(NodeKey::ROOT)
            .unwrap()
            .into_iter()
            .filter(|k| s.get(*k).unwrap().node_type() == node_type)
            .map(|k| (k, s.text_content(k).unwrap()))
            .collect()
    })
}

// ---- hashtags --------------------------------------------------------------

#[test]
fn test_typed_hashtag_is_split_out() {
    let editor = editor_with(&["hello "]);
    assert!(dispatch(&editor, &CONTROLLED_TEXT_INSERTION_COMMAND, "#rust".to_string()));

    assert_eq!(content(&editor), "hello #rust");
    let tags = nodes_of(&editor, HASHTAG);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].1, "#rust");
}

#[test]
fn test_text_after_hashtag_boundary_stays_plain() {
    let editor = editor_with(&["hello "]);
    dispatch(&editor, &CONTROLLED_TEXT_INSERTION_COMMAND, "#rust".to_string());
    dispatch(&editor, &CONTROLLED_TEXT_INSERTION_COMMAND, " ok".to_string());

    assert_eq!(content(&editor), "hello #rust ok");
    let tags = nodes_of(&editor, HASHTAG);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].1, "#rust");
}

#[test]
fn test_typing_before_hashtag_starts_new_run() {
    let editor = editor();
    editor
        .update_discrete(|tx| {
            let paragraph = tx.create_paragraph()?;
            let tag = create_hashtag(tx, "#tag")?;
            tx.append(paragraph, tag)?;
            tx.append(NodeKey::ROOT, paragraph)?;
            tx.set_caret(Point::text(tag, 0));
            Ok(())
        })
        .unwrap();

    let behavior_flags = editor.read(|s| {
        let tag = nodes_of_state(s, HASHTAG)[0];
        let node = s.get(tag).unwrap();
        let behavior = s.registry().behavior_for(node);
        (behavior.is_text_entity(), behavior.can_insert_text_before(node))
    });
    assert_eq!(behavior_flags, (true, false));

    dispatch(&editor, &CONTROLLED_TEXT_INSERTION_COMMAND, "x".to_string());
    assert_eq!(content(&editor), "x#tag");
    let tags = nodes_of(&editor, HASHTAG);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].1, "#tag");
}

fn nodes_of_state(state: &folio_core::EditorState, node_type: &str) -> Vec<NodeKey> {
    state
        .descendants(NodeKey::ROOT)
        .unwrap()
        .into_iter()
        .filter(|k| state.get(*k).unwrap().node_type() == node_type)
        .collect()
}

#[test]
fn test_hashtag_markup_round_trip() {
    let editor = editor_with(&["see #docs"]);
    let html = editor.read(|s| generate_html(s, &EditorConfig::default()).unwrap());
    assert!(html.contains("data-folio-hashtag=\"true\""), "{}", html);

    editor
        .update_discrete(|tx| {
            let span = ExternalElement::new("span")
                .with_attr("data-folio-hashtag", "true")
                .with_text("#pasted");
            let keys = import_external(tx, &[ExternalNode::Element(span)])?;
            assert_eq!(keys.len(), 1);
            assert_eq!(tx.get(keys[0])?.node_type(), HASHTAG);
            assert_eq!(tx.get(keys[0])?.text(), "#pasted");
            Ok(())
        })
        .unwrap();
}

// ---- mentions --------------------------------------------------------------

#[test]
fn test_mention_replaces_query() {
    let editor = editor_with(&["hi @al"]);
    assert!(dispatch(&editor, &INSERT_MENTION_COMMAND, "alice".to_string()));

    assert_eq!(content(&editor), "hi alice");
    let mentions = nodes_of(&editor, MENTION);
    assert_eq!(mentions.len(), 1);
    editor.read(|s| {
        let node = s.get(mentions[0].0).unwrap();
        assert_eq!(mention_name(node), Some("alice"));
        match s.selection() {
            Some(Selection::Range(range)) => assert_eq!(range.anchor, Point::text(mentions[0].0, 5)),
            other => panic!("expected a caret, got {:?}", other),
        }
    });
}

// ---- horizontal rules ------------------------------------------------------

#[test]
fn test_selected_rule_is_deleted() {
    let editor = editor();
    editor
        .update_discrete(|tx| {
            for text in ["a", "b"] {
                let paragraph = tx.create_paragraph()?;
                let run = tx.create_text(text)?;
                tx.append(paragraph, run)?;
                tx.append(NodeKey::ROOT, paragraph)?;
            }
            let rule = create_horizontal_rule(tx)?;
            let first = tx.children_of(NodeKey::ROOT)?[0];
            tx.insert_after(first, rule)
        })
        .unwrap();
    assert_eq!(root_types(&editor), vec!["paragraph", "horizontalrule", "paragraph"]);

    let rule = editor.read(|s| s.children_of(NodeKey::ROOT).unwrap()[1]);
    assert!(dispatch(
        &editor,
        &CLICK_COMMAND,
        PointerEvent {
            target: Some(rule),
            shift: false
        }
    ));
    editor.read(|s| match s.selection() {
        Some(Selection::Node(nodes)) => assert!(nodes.has(rule)),
        other => panic!("expected a node selection, got {:?}", other),
    });

    assert!(dispatch(&editor, &KEY_DELETE_COMMAND, ()));
    assert_eq!(root_types(&editor), vec!["paragraph", "paragraph"]);
    assert!(editor.read(|s| s.selection().is_none()));
    assert_eq!(content(&editor), "a\n\nb");
}

// ---- character limit -------------------------------------------------------

#[test]
fn test_overflow_wraps_and_unwraps() {
    let editor = editor();
    let _limit = register_character_limit(&editor, 5).unwrap();
    editor
        .update_discrete(|tx| {
            let paragraph = tx.create_paragraph()?;
            let run = tx.create_text("hello world")?;
            tx.append(paragraph, run)?;
            tx.append(NodeKey::ROOT, paragraph)
        })
        .unwrap();

    let overflows = nodes_of(&editor, OVERFLOW);
    assert_eq!(overflows.len(), 1);
    assert_eq!(overflows[0].1, " world");
    assert_eq!(content(&editor), "hello world");
    assert_eq!(editor.read(|s| remaining_characters(s, 5).unwrap()), -6);

    // Shrink both halves so everything fits again
    editor
        .update_discrete(|tx| {
            let paragraph = tx.children_of(NodeKey::ROOT)?[0];
            let children = tx.children_of(paragraph)?.to_vec();
            tx.set_text(children[0], "hey")?;
            let inner = tx.children_of(children[1])?[0];
            tx.set_text(inner, " w")
        })
        .unwrap();
    assert!(nodes_of(&editor, OVERFLOW).is_empty());
    assert_eq!(content(&editor), "hey w");
    editor.read(|s| assert!(s.check_integrity().is_ok()));
}

#[test]
fn test_overflow_is_left_out_of_markup() {
    let editor = editor();
    let _limit = register_character_limit(&editor, 2).unwrap();
    editor
        .update_discrete(|tx| {
            let paragraph = tx.create_paragraph()?;
            let run = tx.create_text("abcd")?;
            tx.append(paragraph, run)?;
            tx.append(NodeKey::ROOT, paragraph)
        })
        .unwrap();
    assert_eq!(nodes_of(&editor, OVERFLOW).len(), 1);

    let html = editor.read(|s| generate_html(s, &EditorConfig::default()).unwrap());
    assert!(
        html.contains(r#"<span data-folio-text="true">ab</span><span data-folio-text="true">cd</span>"#),
        "{}",
        html
    );
}

// ---- tables ----------------------------------------------------------------

#[test]
fn test_insert_table_replaces_empty_paragraph() {
    let editor = editor_with(&[""]);
    assert!(dispatch(
        &editor,
        &INSERT_TABLE_COMMAND,
        InsertTablePayload {
            rows: 2,
            columns: 3,
            include_headers: true
        }
    ));
    assert_eq!(root_types(&editor), vec![TABLE]);

    editor.read(|s| {
        let table = s.children_of(NodeKey::ROOT).unwrap()[0];
        assert_eq!(s.children_of(table).unwrap().len(), 2);
        let header = cell_at(s, table, 0, 2).unwrap().unwrap();
        let data = cell_at(s, table, 1, 0).unwrap().unwrap();
        assert_eq!(header_state(s.get(header).unwrap()), HeaderState::ROW);
        assert!(header_state(s.get(data).unwrap()).is_empty());
        assert!(cell_at(s, table, 2, 0).unwrap().is_none());
    });
}

#[test]
fn test_header_change_swaps_surface_element() {
    let editor = editor_with(&[""]);
    dispatch(
        &editor,
        &INSERT_TABLE_COMMAND,
        InsertTablePayload {
            rows: 1,
            columns: 1,
            include_headers: false,
        },
    );
    editor.set_surface(VirtualSurface::new()).unwrap();
    let cell = editor.read(|s| {
        let table = s.children_of(NodeKey::ROOT).unwrap()[0];
        cell_at(s, table, 0, 0).unwrap().unwrap()
    });
    let before = editor.surface_node(cell).unwrap();
    let tag = editor.with_surface(|s: &VirtualSurface| s.tag(before).map(str::to_string));
    assert_eq!(tag.flatten().as_deref(), Some("td"));

    editor
        .update_discrete(move |tx| set_header_state(tx, cell, HeaderState::COLUMN))
        .unwrap();
    let after = editor.surface_node(cell).unwrap();
    assert_ne!(before, after);
    let html = editor.with_surface(|s: &VirtualSurface| s.to_html()).unwrap();
    assert!(html.contains("<th"), "{}", html);
    assert!(!html.contains("<td"), "{}", html);
}

// ---- headings --------------------------------------------------------------

#[test]
fn test_set_blocks_type_and_collapse() {
    let editor = editor_with(&["title"]);
    editor
        .update_discrete(|tx| set_blocks_type(tx, |tx| create_heading(tx, HeadingTag::H2)))
        .unwrap();
    assert_eq!(root_types(&editor), vec![HEADING]);
    editor.read(|s| {
        let heading = s.children_of(NodeKey::ROOT).unwrap()[0];
        assert_eq!(heading_tag(s.get(heading).unwrap()), HeadingTag::H2);
    });
    assert_eq!(content(&editor), "title");

    editor
        .update_discrete(|tx| {
            let heading = tx.children_of(NodeKey::ROOT)?[0];
            tx.select_start(heading)
        })
        .unwrap();
    assert!(dispatch(&editor, &KEY_BACKSPACE_COMMAND, ()));
    assert_eq!(root_types(&editor), vec!["paragraph"]);
    assert_eq!(content(&editor), "title");
}

// ---- lists -----------------------------------------------------------------

fn select_all(editor: &Editor) {
    editor
        .update_discrete(|tx| {
            let first = tx.first_descendant(NodeKey::ROOT)?;
            let last = tx.last_descendant(NodeKey::ROOT)?;
            let len = tx.get(last)?.text_len();
            tx.set_selection(Some(Selection::Range(RangeSelection::new(
                Point::text(first, 0),
                Point::text(last, len),
            ))));
            Ok(())
        })
        .unwrap();
}

fn item_values(editor: &Editor) -> Vec<Option<u64>> {
    editor.read(|s| {
        nodes_of_state(s, LIST_ITEM)
            .into_iter()
            .map(|k| s.get(k).unwrap().prop_u64("value"))
            .collect()
    })
}

#[test]
fn test_insert_list_numbers_items() {
    let editor = editor_with(&["one", "two"]);
    select_all(&editor);
    assert!(dispatch(&editor, &INSERT_ORDERED_LIST_COMMAND, ()));

    assert_eq!(root_types(&editor), vec![LIST]);
    assert_eq!(item_values(&editor), vec![Some(1), Some(2)]);
    assert_eq!(content(&editor), "one\n\ntwo");

    dispatch(&editor, &INSERT_UNORDERED_LIST_COMMAND, ());
    editor.read(|s| {
        let list = s.children_of(NodeKey::ROOT).unwrap()[0];
        assert_eq!(list_type(s.get(list).unwrap()), ListType::Bullet);
    });
}

#[test]
fn test_empty_item_leaves_list() {
    let editor = editor_with(&["one", "two"]);
    select_all(&editor);
    dispatch(&editor, &INSERT_ORDERED_LIST_COMMAND, ());

    editor
        .update_discrete(|tx| {
            let last = tx.last_descendant(NodeKey::ROOT)?;
            tx.select_end(last)
        })
        .unwrap();
    assert!(dispatch(&editor, &INSERT_PARAGRAPH_COMMAND, ()));
    assert_eq!(item_values(&editor), vec![Some(1), Some(2), Some(3)]);

    assert!(dispatch(&editor, &INSERT_PARAGRAPH_COMMAND, ()));
    assert_eq!(root_types(&editor), vec![LIST, "paragraph"]);
    assert_eq!(item_values(&editor), vec![Some(1), Some(2)]);
    editor.read(|s| assert!(s.check_integrity().is_ok()));
}

#[test]
fn test_remove_list_restores_paragraphs() {
    let editor = editor_with(&["one", "two"]);
    select_all(&editor);
    dispatch(&editor, &INSERT_UNORDERED_LIST_COMMAND, ());
    select_all(&editor);

    assert!(dispatch(&editor, &REMOVE_LIST_COMMAND, ()));
    assert_eq!(root_types(&editor), vec!["paragraph", "paragraph"]);
    assert_eq!(content(&editor), "one\n\ntwo");
}

#[test]
fn test_forward_delete_pulls_first_item_into_paragraph() {
    let editor = editor();
    editor
        .update_discrete(|tx| {
            let paragraph = tx.create_paragraph()?;
            let intro = tx.create_text("intro")?;
            tx.append(paragraph, intro)?;
            tx.append(NodeKey::ROOT, paragraph)?;

            let list = create_list(tx, ListType::Bullet)?;
            for text in ["one", "two"] {
                let item = tx.create_node(LIST_ITEM, NodeInit::element())?;
                let run = tx.create_text(text)?;
                tx.set_format(run, TextFormat::BOLD)?;
                tx.append(item, run)?;
                tx.append(list, item)?;
            }
            tx.append(NodeKey::ROOT, list)?;
            tx.select_end(intro)
        })
        .unwrap();
    editor.set_surface(VirtualSurface::new()).unwrap();

    assert!(dispatch(&editor, &KEY_DELETE_COMMAND, ()));
    assert_eq!(content(&editor), "introone\n\ntwo");

    let (html, blocks) = editor
        .with_surface(|s: &VirtualSurface| {
            let blocks: Vec<String> = s.children(s.root()).iter().map(|c| s.text_content(*c)).collect();
            (s.to_html(), blocks)
        })
        .unwrap();
    assert_eq!(blocks, vec!["introone", "two"]);

    let state = editor.get_editor_state();
    let (fresh, _) = Reconciler::mount(Box::new(VirtualSurface::new()), &state, editor.config()).unwrap();
    let fresh = fresh.surface().as_any().downcast_ref::<VirtualSurface>().unwrap().to_html();
    assert_eq!(html, fresh);
}
