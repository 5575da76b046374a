use document_core::{Document, EndOfLine};

fn text_of(doc: &Document) -> Vec<u8> {
    doc.get_char_range(0, doc.length())
}

#[test]
fn test_mixed_line_ends_index() {
    let doc = Document::from_text("unix\nwindows\r\nmac\rlast");
    assert_eq!(doc.lines_total(), 4);
    assert_eq!(doc.line_start(0), 0);
    assert_eq!(doc.line_start(1), 5);
    assert_eq!(doc.line_start(2), 14);
    assert_eq!(doc.line_start(3), 18);
    assert_eq!(doc.line_end(1), 12);
    assert_eq!(doc.line_end(2), 17);
}

#[test]
fn test_transform_line_ends() {
    let out = Document::transform_line_ends(b"a\nb\r\nc\rd", EndOfLine::CrLf);
    assert_eq!(out, b"a\r\nb\r\nc\r\nd");
    let out = Document::transform_line_ends(b"a\nb\r\nc\rd", EndOfLine::Lf);
    assert_eq!(out, b"a\nb\nc\nd");
    let out = Document::transform_line_ends(b"a\nb\r\nc\rd", EndOfLine::Cr);
    assert_eq!(out, b"a\rb\rc\rd");
}

#[test]
fn test_transform_line_ends_idempotent() {
    for mode in [EndOfLine::CrLf, EndOfLine::Cr, EndOfLine::Lf] {
        let once = Document::transform_line_ends(b"one\r\ntwo\rthree\nfour", mode);
        let twice = Document::transform_line_ends(&once, mode);
        assert_eq!(once, twice);
    }
}

#[test]
fn test_convert_line_ends_to_crlf() {
    let mut doc = Document::from_text("a\nb\rc\r\nd");
    doc.convert_line_ends(EndOfLine::CrLf);
    assert_eq!(text_of(&doc), b"a\r\nb\r\nc\r\nd");
    assert_eq!(doc.lines_total(), 4);

    // One undo group restores the original text.
    doc.undo();
    assert_eq!(text_of(&doc), b"a\nb\rc\r\nd");
}

#[test]
fn test_convert_line_ends_to_lf() {
    let mut doc = Document::from_text("a\r\nb\rc\nd");
    doc.convert_line_ends(EndOfLine::Lf);
    assert_eq!(text_of(&doc), b"a\nb\nc\nd");
    assert_eq!(doc.lines_total(), 4);
}

#[test]
fn test_convert_line_ends_to_cr() {
    let mut doc = Document::from_text("a\r\nb\nc\rd");
    doc.convert_line_ends(EndOfLine::Cr);
    assert_eq!(text_of(&doc), b"a\rb\rc\rd");
}

#[test]
fn test_convert_is_idempotent_on_document() {
    let mut doc = Document::from_text("x\ny\r\nz");
    doc.convert_line_ends(EndOfLine::CrLf);
    let first = text_of(&doc);
    doc.convert_line_ends(EndOfLine::CrLf);
    assert_eq!(text_of(&doc), first);
}

#[test]
fn test_crlf_split_and_join() {
    let mut doc = Document::from_text("a\r\nb");
    assert_eq!(doc.lines_total(), 2);

    // Splitting the pair creates a line at both CR and LF.
    doc.insert_text(2, "X");
    assert_eq!(text_of(&doc), b"a\rX\nb");
    assert_eq!(doc.lines_total(), 3);

    doc.undo();
    assert_eq!(doc.lines_total(), 2);

    // Deleting between the halves joins them again.
    let mut doc = Document::from_text("a\rX\nb");
    assert_eq!(doc.lines_total(), 3);
    doc.delete_chars(2, 1);
    assert_eq!(doc.lines_total(), 2);
}

#[test]
fn test_is_crlf_and_move_outside_snaps_pair() {
    let doc = Document::from_text("ab\r\ncd");
    assert!(doc.is_crlf(2));
    assert!(!doc.is_crlf(3));
    // Position between CR and LF snaps as one unit.
    assert_eq!(doc.move_position_outside_char(3, 1, true), 4);
    assert_eq!(doc.move_position_outside_char(3, -1, true), 2);
    // Without the line-end check the pair is two positions.
    assert_eq!(doc.move_position_outside_char(3, 1, false), 3);
}

#[test]
fn test_eol_mode_bytes() {
    let mut doc = Document::new();
    assert_eq!(doc.eol_bytes(), b"\n");
    doc.set_eol_mode(EndOfLine::CrLf);
    assert_eq!(doc.eol_bytes(), b"\r\n");
    doc.set_eol_mode(EndOfLine::Cr);
    assert_eq!(doc.eol_bytes(), b"\r");
}
