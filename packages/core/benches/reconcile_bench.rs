use criterion::{black_box, criterion_group, criterion_main, Criterion};
use folio_core::{Editor, EditorConfig, NodeKey, Point, TreeView, VirtualSurface};

fn document(blocks: usize) -> Editor {
    let editor = Editor::new(EditorConfig::default());
    editor.set_surface(VirtualSurface::new()).unwrap();
    editor
        .update_discrete(move |tx| {
            for i in 0..blocks {
                let paragraph = tx.create_paragraph()?;
                let text = tx.create_text(format!("Paragraph number {}", i))?;
                tx.append(paragraph, text)?;
                tx.append(NodeKey::ROOT, paragraph)?;
            }
            Ok(())
        })
        .unwrap();
    editor
}

fn typing_in_large_document(c: &mut Criterion) {
    let editor = document(1_000);
    let text = editor.read(|s| {
        let middle = s.children_of(NodeKey::ROOT).unwrap()[500];
        s.first_descendant(middle).unwrap()
    });

    c.bench_function("typing_in_large_document", |b| {
        b.iter(|| {
            editor
                .update_discrete(move |tx| {
                    tx.splice_text(text, 0, 0, black_box("x"))?;
                    tx.set_caret(Point::text(text, 1));
                    Ok(())
                })
                .unwrap()
        })
    });
}

fn reorder_blocks(c: &mut Criterion) {
    let editor = document(200);

    c.bench_function("reorder_blocks", |b| {
        b.iter(|| {
            editor
                .update_discrete(|tx| {
                    let blocks = tx.children_of(NodeKey::ROOT)?.to_vec();
                    if let (Some(first), Some(last)) = (blocks.first(), blocks.last()) {
                        tx.insert_before(*first, *last)?;
                    }
                    Ok(())
                })
                .unwrap()
        })
    });
}

fn mount_document(c: &mut Criterion) {
    let editor = document(500);
    let state = editor.get_editor_state();

    c.bench_function("mount_document", |b| {
        b.iter(|| {
            let editor = Editor::new(EditorConfig::default());
            editor.set_editor_state(black_box(state.clone())).unwrap();
            editor.flush().unwrap();
            editor.set_surface(VirtualSurface::new()).unwrap()
        })
    });
}

criterion_group!(benches, typing_in_large_document, reorder_blocks, mount_document);
criterion_main!(benches);
