use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use document_core::{Document, FindOption};

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog (document-core benchmark line)\n"
        ));
    }
    out
}

fn bench_large_file_open(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("large_file_open/50k_lines", |b| {
        b.iter(|| {
            let doc = Document::from_text(black_box(&text));
            black_box(doc.lines_total());
        })
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("typing_middle/100_inserts", |b| {
        b.iter_batched(
            || Document::from_text(&text),
            |mut doc| {
                let mut offset = doc.length() / 2;
                for _ in 0..100 {
                    doc.insert_text(offset, "x");
                    offset += 1;
                }
                black_box(doc.length());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_line_lookups(c: &mut Criterion) {
    let doc = Document::from_text(&large_text(50_000));
    c.bench_function("line_lookups/10k_queries", |b| {
        b.iter(|| {
            let mut acc = 0usize;
            for i in 0..10_000 {
                let pos = (i * 97) % doc.length();
                acc = acc.wrapping_add(doc.line_from_position(pos));
            }
            black_box(acc);
        })
    });
}

fn bench_literal_search(c: &mut Criterion) {
    let text = large_text(10_000);
    c.bench_function("literal_search/whole_document", |b| {
        b.iter_batched(
            || Document::from_text(&text),
            |mut doc| {
                let found = doc
                    .find_text(0, doc.length(), b"lazy dog", FindOption::MATCH_CASE)
                    .unwrap();
                black_box(found);
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_undo_redo_cycle(c: &mut Criterion) {
    let text = large_text(1_000);
    c.bench_function("undo_redo/200_edits", |b| {
        b.iter_batched(
            || Document::from_text(&text),
            |mut doc| {
                for i in 0..200 {
                    doc.insert_text((i * 31) % doc.length(), "word ");
                }
                while doc.can_undo() {
                    doc.undo();
                }
                black_box(doc.length());
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_large_file_open,
    bench_typing_in_middle,
    bench_line_lookups,
    bench_literal_search,
    bench_undo_redo_cycle
);
criterion_main!(benches);
