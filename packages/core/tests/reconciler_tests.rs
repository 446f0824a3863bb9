//! Surface reconciliation against a virtual surface

use folio_core::reconciler::Reconciler;
use folio_core::{
    DomElement, DomPoint, DomSelection, Editor, EditorConfig, Node, NodeBase, NodeBehavior, NodeKey, Point,
    Selection, Surface, TextFormat, TreeView, VirtualSurface,
};

fn mounted(texts: &'static [&'static str]) -> Editor {
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
    editor.set_surface(VirtualSurface::new()).unwrap();
    reset_stats(&editor);
    editor
}

fn reset_stats(editor: &Editor) {
    editor.with_surface_mut(|s: &mut VirtualSurface| s.reset_stats()).unwrap();
}

fn html(editor: &Editor) -> String {
    editor.with_surface(|s: &VirtualSurface| s.to_html()).unwrap()
}

/// Markup of the committed state rendered onto a new surface
fn fresh_html(editor: &Editor) -> String {
    let state = editor.get_editor_state();
    let (reconciler, _) = Reconciler::mount(Box::new(VirtualSurface::new()), &state, editor.config()).unwrap();
    reconciler
        .surface()
        .as_any()
        .downcast_ref::<VirtualSurface>()
        .unwrap()
        .to_html()
}

fn mutations(editor: &Editor) -> usize {
    editor.with_surface(|s: &VirtualSurface| s.stats().mutations()).unwrap()
}

fn top_level(editor: &Editor) -> Vec<NodeKey> {
    editor.read(|state| state.children_of(NodeKey::ROOT).unwrap().to_vec())
}

/// Text of each top-level surface element, in surface order
fn surface_blocks(editor: &Editor) -> Vec<String> {
    editor
        .with_surface(|s: &VirtualSurface| {
            s.children(s.root())
                .iter()
                .map(|child| s.text_content(*child))
                .collect()
        })
        .unwrap()
}

fn model_blocks(editor: &Editor) -> Vec<String> {
    editor.read(|state| {
        state
            .children_of(NodeKey::ROOT)
            .unwrap()
            .iter()
            .map(|key| state.text_content(*key).unwrap())
            .collect()
    })
}

#[test]
fn test_mount_renders_document() {
    let editor = mounted(&["hello", "world"]);
    assert_eq!(
        html(&editor),
        "<p><span data-folio-text=\"true\">hello</span></p><p><span data-folio-text=\"true\">world</span></p>"
    );
}

#[test]
fn test_no_op_commit_touches_nothing() {
    let editor = mounted(&["hello"]);
    let before = editor.get_editor_state();
    editor
        .update_discrete(|tx| {
            let text = tx.first_descendant(NodeKey::ROOT)?;
            tx.set_text(text, "hello")?;
            let paragraph = tx.children_of(NodeKey::ROOT)?[0];
            tx.set_indent(paragraph, 0)
        })
        .unwrap();

    assert_eq!(editor.get_editor_state(), before);
    assert_eq!(mutations(&editor), 0);
    assert_eq!(editor.reconciliations(), 0);
}

#[test]
fn test_order_preserved_after_reorder() {
    let editor = mounted(&["a", "b", "c", "d", "e"]);
    let blocks = top_level(&editor);

    editor
        .update_discrete(move |tx| {
            // a b c d e -> e a c b d
            tx.insert_before(blocks[0], blocks[4])?;
            tx.insert_after(blocks[2], blocks[1])
        })
        .unwrap();

    assert_eq!(model_blocks(&editor), vec!["e", "a", "c", "b", "d"]);
    assert_eq!(surface_blocks(&editor), model_blocks(&editor));
    // Only moved children are inserted again; nothing is recreated
    let stats = editor.with_surface(|s: &VirtualSurface| s.stats()).unwrap();
    assert_eq!(stats.created, 0);
    assert_eq!(stats.inserts, 2);
}

#[test]
fn test_insert_and_remove_blocks() {
    let editor = mounted(&["a", "b", "c"]);
    let blocks = top_level(&editor);

    editor
        .update_discrete(move |tx| {
            tx.remove(blocks[1])?;
            let paragraph = tx.create_paragraph()?;
            let text = tx.create_text("new")?;
            tx.append(paragraph, text)?;
            tx.insert_before(blocks[0], paragraph)
        })
        .unwrap();

    assert_eq!(surface_blocks(&editor), vec!["new", "a", "c"]);
    assert_eq!(surface_blocks(&editor), model_blocks(&editor));
}

#[test]
fn test_text_change_writes_only_text() {
    let editor = mounted(&["hello", "world"]);
    editor
        .update_discrete(|tx| {
            let text = tx.first_descendant(NodeKey::ROOT)?;
            tx.splice_text(text, 5, 0, "!")
        })
        .unwrap();

    let stats = editor.with_surface(|s: &VirtualSurface| s.stats()).unwrap();
    assert_eq!(stats.text_writes, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(stats.inserts, 0);
    assert_eq!(surface_blocks(&editor), vec!["hello!", "world"]);
}

#[test]
fn test_surface_text_already_current_is_left_alone() {
    let editor = mounted(&["hello"]);
    let text = editor.read(|s| s.first_descendant(NodeKey::ROOT).unwrap());
    let text_dom = editor
        .with_surface(|s: &VirtualSurface| s.children(s.children(s.children(s.root())[0])[0])[0])
        .unwrap();

    // The user typed into the surface first
    editor
        .with_surface_mut(|s: &mut VirtualSurface| {
            s.set_text(text_dom, "hello there");
            s.reset_stats();
        })
        .unwrap();
    editor
        .update_discrete(move |tx| tx.set_text(text, "hello there"))
        .unwrap();

    let stats = editor.with_surface(|s: &VirtualSurface| s.stats()).unwrap();
    assert_eq!(stats.text_writes, 0);
    assert_eq!(surface_blocks(&editor), vec!["hello there"]);
}

#[test]
fn test_format_change_replaces_element_keeping_text_node() {
    let editor = mounted(&["hello"]);
    let text = editor.read(|s| s.first_descendant(NodeKey::ROOT).unwrap());
    let before = editor.surface_node(text).unwrap();
    let text_dom = editor
        .with_surface(|s: &VirtualSurface| s.children(before)[0])
        .unwrap();

    editor
        .update_discrete(move |tx| tx.set_format(text, TextFormat::BOLD))
        .unwrap();

    let after = editor.surface_node(text).unwrap();
    assert_ne!(before, after);
    editor
        .with_surface(|s: &VirtualSurface| {
            assert_eq!(s.tag(after), Some("strong"));
            assert!(!s.contains(before));
            // The text node was re-parented, not rebuilt
            assert_eq!(s.children(after), &[text_dom]);
        })
        .unwrap();
    assert_eq!(editor.nearest_node_from_dom(text_dom), Some(text));
}

#[test]
fn test_attribute_update_in_place() {
    let editor = mounted(&["hello"]);
    let paragraph = top_level(&editor)[0];
    let dom = editor.surface_node(paragraph).unwrap();

    editor
        .update_discrete(move |tx| tx.set_indent(paragraph, 1))
        .unwrap();
    assert_eq!(editor.surface_node(paragraph), Some(dom));
    assert_eq!(
        editor.with_surface(|s: &VirtualSurface| s.attribute(dom, "style").map(str::to_string)),
        Some(Some("padding-inline-start: 40px;".to_string()))
    );

    editor
        .update_discrete(move |tx| tx.set_indent(paragraph, 0))
        .unwrap();
    assert_eq!(
        editor.with_surface(|s: &VirtualSurface| s.attribute(dom, "style").map(str::to_string)),
        Some(None)
    );
}

#[test]
fn test_moved_node_is_adopted_by_new_parent() {
    let editor = mounted(&["one", "two"]);
    let blocks = top_level(&editor);
    let text = editor.read(|s| s.first_descendant(blocks[1]).unwrap());
    let text_dom = editor.surface_node(text).unwrap();

    editor
        .update_discrete(move |tx| {
            let line_break = tx.create_line_break()?;
            tx.append(blocks[0], line_break)?;
            tx.append(blocks[0], text)?;
            tx.remove(blocks[1])
        })
        .unwrap();

    assert_eq!(editor.surface_node(text), Some(text_dom));
    assert_eq!(surface_blocks(&editor), vec!["onetwo"]);
    assert_eq!(
        html(&editor),
        "<p><span data-folio-text=\"true\">one</span><br><span data-folio-text=\"true\">two</span></p>"
    );
}

#[test]
fn test_node_adopted_before_its_old_parent_is_removed() {
    struct Section;
    impl NodeBehavior for Section {
        fn node_type(&self) -> &'static str {
            "section"
        }
        fn base(&self) -> NodeBase {
            NodeBase::Element
        }
        fn create_dom(&self, _node: &Node, _config: &EditorConfig) -> DomElement {
            DomElement::new("section")
        }
    }

    let editor = Editor::builder().node(Section).build().unwrap();
    editor
        .update_discrete(|tx| {
            let first = tx.create_paragraph()?;
            let bee = tx.create_text("bee")?;
            tx.append(first, bee)?;
            tx.append(NodeKey::ROOT, first)?;

            let section = tx.create_node("section", folio_core::NodeInit::element())?;
            for text in ["ant", "cat"] {
                let paragraph = tx.create_paragraph()?;
                let run = tx.create_text(text)?;
                tx.set_format(run, TextFormat::BOLD)?;
                tx.append(paragraph, run)?;
                tx.append(section, paragraph)?;
            }
            tx.append(NodeKey::ROOT, section)
        })
        .unwrap();
    editor.set_surface(VirtualSurface::new()).unwrap();

    let blocks = top_level(&editor);
    let (first, section) = (blocks[0], blocks[1]);
    let (old_parent, ant) = editor.read(|s| {
        let paragraph = s.children_of(section).unwrap()[0];
        (paragraph, s.first_descendant(paragraph).unwrap())
    });
    let ant_dom = editor.surface_node(ant).unwrap();

    // The adopting paragraph is reconciled before the section drops the old one
    editor
        .update_discrete(move |tx| {
            tx.append(first, ant)?;
            tx.remove(old_parent)
        })
        .unwrap();

    assert_eq!(editor.surface_node(ant), Some(ant_dom));
    assert_eq!(surface_blocks(&editor), vec!["beeant", "cat"]);
    assert_eq!(surface_blocks(&editor), model_blocks(&editor));
    assert!(html(&editor).contains("ant</strong></p><section>"));
    assert_eq!(html(&editor), fresh_html(&editor));
}

#[test]
fn test_element_replacement_reparents_children() {
    struct Quote;
    impl NodeBehavior for Quote {
        fn node_type(&self) -> &'static str {
            "quote"
        }
        fn base(&self) -> NodeBase {
            NodeBase::Element
        }
        fn create_dom(&self, node: &Node, _config: &EditorConfig) -> DomElement {
            let tag = if node.prop_bool("cite").unwrap_or(false) { "cite" } else { "blockquote" };
            DomElement::new(tag)
        }
    }

    let editor = Editor::builder().node(Quote).build().unwrap();
    editor
        .update_discrete(|tx| {
            let quote = tx.create_node("quote", folio_core::NodeInit::element())?;
            let text = tx.create_text("said")?;
            tx.append(quote, text)?;
            tx.append(NodeKey::ROOT, quote)
        })
        .unwrap();
    editor.set_surface(VirtualSurface::new()).unwrap();
    let quote = top_level(&editor)[0];
    let text = editor.read(|s| s.first_descendant(quote).unwrap());
    let text_dom = editor.surface_node(text).unwrap();
    reset_stats(&editor);

    editor
        .update_discrete(move |tx| tx.set_prop(quote, "cite", true))
        .unwrap();

    assert_eq!(editor.surface_node(text), Some(text_dom));
    assert_eq!(html(&editor), "<cite><span data-folio-text=\"true\">said</span></cite>");
    let stats = editor.with_surface(|s: &VirtualSurface| s.stats()).unwrap();
    assert_eq!(stats.created, 1);
}

#[test]
fn test_selection_is_pushed_to_surface() {
    let editor = mounted(&["hello"]);
    let text = editor.read(|s| s.first_descendant(NodeKey::ROOT).unwrap());
    editor
        .update_discrete(move |tx| tx.select_text(text, 1, 3))
        .unwrap();

    let text_dom = editor
        .with_surface(|s: &VirtualSurface| s.children(editor.surface_node(text).unwrap())[0])
        .unwrap();
    let selection = editor.with_surface(|s: &VirtualSurface| s.selection()).unwrap();
    assert_eq!(
        selection,
        Some(DomSelection {
            anchor: DomPoint { node: text_dom, offset: 1 },
            focus: DomPoint { node: text_dom, offset: 3 },
        })
    );
}

#[test]
fn test_selection_not_pushed_while_composing() {
    let editor = mounted(&["hello"]);
    let text = editor.read(|s| s.first_descendant(NodeKey::ROOT).unwrap());
    editor.set_composition_key(Some(text)).unwrap();
    editor
        .update_discrete(move |tx| {
            tx.splice_text(text, 5, 0, "ka")?;
            tx.set_caret(Point::text(text, 7));
            Ok(())
        })
        .unwrap();
    let selection = editor.with_surface(|s: &VirtualSurface| s.selection()).unwrap();
    assert_eq!(selection, None);
}

#[test]
fn test_select_from_surface() {
    let editor = mounted(&["hello"]);
    let text = editor.read(|s| s.first_descendant(NodeKey::ROOT).unwrap());
    let text_dom = editor
        .with_surface(|s: &VirtualSurface| s.children(editor.surface_node(text).unwrap())[0])
        .unwrap();

    editor
        .with_surface_mut(|s: &mut VirtualSurface| {
            s.set_selection(Some(DomSelection::collapsed(DomPoint { node: text_dom, offset: 4 })))
        })
        .unwrap();
    editor.select_from_surface().unwrap();
    editor.flush().unwrap();

    let selection = editor.read(|s| s.selection().cloned());
    match selection {
        Some(Selection::Range(range)) => assert_eq!(range.anchor, Point::text(text, 4)),
        other => panic!("expected a caret, got {:?}", other),
    }
}

#[test]
fn test_large_document_reorders_match() {
    let editor = Editor::new(EditorConfig::default());
    editor
        .update_discrete(|tx| {
            for i in 0..50 {
                let paragraph = tx.create_paragraph()?;
                let text = tx.create_text(format!("p{}", i))?;
                tx.append(paragraph, text)?;
                tx.append(NodeKey::ROOT, paragraph)?;
            }
            Ok(())
        })
        .unwrap();
    editor.set_surface(VirtualSurface::new()).unwrap();

    let blocks = top_level(&editor);
    editor
        .update_discrete(move |tx| {
            // Reverse every third block pair and drop every seventh block
            for pair in blocks.chunks(3) {
                if pair.len() >= 2 {
                    tx.insert_before(pair[0], pair[1])?;
                }
            }
            for (i, key) in blocks.iter().enumerate() {
                if i % 7 == 0 {
                    tx.remove(*key)?;
                }
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(surface_blocks(&editor), model_blocks(&editor));
    assert_eq!(html(&editor), fresh_html(&editor));

    // Pull the text of every fifth block up into the block before it
    let blocks = top_level(&editor);
    editor
        .update_discrete(move |tx| {
            for pair in blocks.windows(2).step_by(5) {
                let (into, from) = (pair[0], pair[1]);
                let text = tx.first_descendant(from)?;
                let line_break = tx.create_line_break()?;
                tx.append(into, line_break)?;
                tx.append(into, text)?;
                tx.remove(from)?;
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(surface_blocks(&editor).len(), top_level(&editor).len());
    assert_eq!(html(&editor), fresh_html(&editor));

    // Move whole blocks into a container that comes earlier in the document
    let blocks = top_level(&editor);
    editor
        .update_discrete(move |tx| {
            for key in blocks.iter().skip(1).step_by(4) {
                tx.append(blocks[0], *key)?;
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(surface_blocks(&editor).len(), top_level(&editor).len());
    assert_eq!(html(&editor), fresh_html(&editor));
    editor.get_editor_state().check_integrity().unwrap();
}
