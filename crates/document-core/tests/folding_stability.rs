use document_core::{
    level_number, Document, LEVEL_BASE, LEVEL_HEADER_FLAG, LEVEL_WHITE_FLAG,
};

/// A small outline:
/// 0 fn a() {        header, base
/// 1     if x {      header, base+1
/// 2         stmt;   base+2
/// 3     }           base+1
/// 4                 whitespace
/// 5 fn b() {        header, base
/// 6     stmt;       base+1
/// 7 }               base
fn outline() -> Document {
    let mut doc =
        Document::from_text("fn a() {\n    if x {\n        stmt;\n    }\n\nfn b() {\n    stmt;\n}");
    doc.set_level(0, LEVEL_BASE | LEVEL_HEADER_FLAG);
    doc.set_level(1, (LEVEL_BASE + 1) | LEVEL_HEADER_FLAG);
    doc.set_level(2, LEVEL_BASE + 2);
    doc.set_level(3, LEVEL_BASE + 1);
    doc.set_level(4, LEVEL_BASE | LEVEL_WHITE_FLAG);
    doc.set_level(5, LEVEL_BASE | LEVEL_HEADER_FLAG);
    doc.set_level(6, LEVEL_BASE + 1);
    doc.set_level(7, LEVEL_BASE);
    doc
}

#[test]
fn test_set_level_returns_previous() {
    let mut doc = Document::from_text("a\nb");
    assert_eq!(doc.set_level(1, LEVEL_BASE + 3), LEVEL_BASE);
    assert_eq!(doc.set_level(1, LEVEL_BASE), LEVEL_BASE + 3);
    assert_eq!(level_number(doc.get_level(1)), LEVEL_BASE);
}

#[test]
fn test_fold_parent() {
    let doc = outline();
    assert_eq!(doc.get_fold_parent(2), Some(1));
    assert_eq!(doc.get_fold_parent(1), Some(0));
    assert_eq!(doc.get_fold_parent(3), Some(1));
    assert_eq!(doc.get_fold_parent(6), Some(5));
    assert_eq!(doc.get_fold_parent(0), None);
}

#[test]
fn test_get_last_child_inner_block() {
    let mut doc = outline();
    // The inner if-block covers the lines deeper than its header; the
    // closing line sits back at the header's own level.
    assert_eq!(doc.get_last_child(1, None, None), 2);
}

#[test]
fn test_get_last_child_absorbs_trailing_whitespace() {
    let mut doc = outline();
    // fn a() owns lines 1..4; the blank line 4 is subordinate but is
    // given back when it belongs to the gap before the next block.
    let last = doc.get_last_child(0, None, None);
    assert!(last == 3 || last == 4, "unexpected last child {last}");
}

#[test]
fn test_get_last_child_second_block() {
    let mut doc = outline();
    assert_eq!(doc.get_last_child(5, None, None), 6);
}

#[test]
fn test_levels_follow_line_edits() {
    let mut doc = outline();
    // Insert a new line before line 2.
    let pos = doc.line_start(2);
    doc.insert_text(pos, "        more;\n");
    assert_eq!(doc.lines_total(), 9);
    // Old line 3 is now line 4 and keeps its level.
    assert_eq!(level_number(doc.get_level(4)), LEVEL_BASE + 1);
    // Old line 5 header moved to 6.
    assert_eq!(doc.get_level(6) & LEVEL_HEADER_FLAG, LEVEL_HEADER_FLAG);
}

#[test]
fn test_highlight_delimiters_inner() {
    let mut doc = outline();
    let hd = doc.get_highlight_delimiters(2, 7);
    assert_eq!(hd.begin_fold_block, Some(1));
    assert_eq!(hd.end_fold_block, Some(2));
}

#[test]
fn test_highlight_delimiters_no_block() {
    let mut doc = Document::from_text("flat\ntext");
    let hd = doc.get_highlight_delimiters(1, 1);
    assert_eq!(hd.begin_fold_block, None);
}

#[test]
fn test_marker_survives_fold_changes() {
    let mut doc = outline();
    let handle = doc.add_mark(5, 2).unwrap();
    doc.set_level(5, (LEVEL_BASE + 1) | LEVEL_HEADER_FLAG);
    assert_eq!(doc.line_from_handle(handle), Some(5));
    assert_eq!(doc.get_mark(5) & (1 << 2), 1 << 2);
}
