use document_core::{CharClass, Document};

#[test]
fn test_move_position_outside_char_utf8() {
    // "aé中🦀" = 1 + 2 + 3 + 4 bytes.
    let doc = Document::from_text("aé中🦀");
    for pos in 0..=doc.length() {
        let snapped = doc.move_position_outside_char(pos, 1, false);
        // Snapped positions are never inside a character.
        assert!(
            [0, 1, 3, 6, 10].contains(&snapped),
            "pos {pos} snapped to {snapped}"
        );
    }
    assert_eq!(doc.move_position_outside_char(2, 1, false), 3);
    assert_eq!(doc.move_position_outside_char(2, -1, false), 1);
    assert_eq!(doc.move_position_outside_char(7, 1, false), 10);
    assert_eq!(doc.move_position_outside_char(7, -1, false), 6);
}

#[test]
fn test_next_position_utf8() {
    let doc = Document::from_text("aé中🦀");
    assert_eq!(doc.next_position(0, 1), 1);
    assert_eq!(doc.next_position(1, 1), 3);
    assert_eq!(doc.next_position(3, 1), 6);
    assert_eq!(doc.next_position(6, 1), 10);
    assert_eq!(doc.next_position(10, -1), 6);
    assert_eq!(doc.next_position(6, -1), 3);
    assert_eq!(doc.next_position(3, -1), 1);
    assert_eq!(doc.next_position(1, -1), 0);
}

#[test]
fn test_next_position_clamps_at_edges() {
    let doc = Document::from_text("abc");
    assert_eq!(doc.next_position(0, -1), 0);
    assert_eq!(doc.next_position(doc.length(), 1), doc.length());
}

#[test]
fn test_next_position_crlf_is_two_positions() {
    let doc = Document::from_text("a\r\nb");
    assert_eq!(doc.next_position(1, 1), 2);
    assert_eq!(doc.next_position(2, 1), 3);
}

#[test]
fn test_invalid_utf8_advances_one_byte() {
    let doc = Document::from_bytes(&[b'a', 0xFF, 0x80, b'b']);
    assert_eq!(doc.next_position(1, 1), 2);
    assert_eq!(doc.next_position(2, 1), 3);
    // Invalid bytes are reported as unpaired surrogates.
    let (ch, width) = doc.get_character_and_width(1);
    assert_eq!(ch, 0xDC80 + 0xFF);
    assert_eq!(width, 1);
}

#[test]
fn test_character_after_and_before() {
    let doc = Document::from_text("aé中");
    assert_eq!(doc.character_after(0).character, 'a' as u32);
    assert_eq!(doc.character_after(1).character, 'é' as u32);
    assert_eq!(doc.character_after(1).width_bytes, 2);
    assert_eq!(doc.character_after(3).character, '中' as u32);
    assert_eq!(doc.character_before(6).character, '中' as u32);
    assert_eq!(doc.character_before(3).character, 'é' as u32);
    assert_eq!(doc.character_before(1).character, 'a' as u32);
    // Edges report the empty sentinel.
    assert_eq!(doc.character_before(0).width_bytes, 0);
    assert_eq!(doc.character_after(6).width_bytes, 0);
}

#[test]
fn test_get_relative_position() {
    let doc = Document::from_text("aé中🦀b");
    assert_eq!(doc.get_relative_position(0, 3), Some(6));
    assert_eq!(doc.get_relative_position(6, -2), Some(1));
    assert_eq!(doc.get_relative_position(0, -1), None);
    assert_eq!(doc.get_relative_position(0, 5), Some(11));
    assert_eq!(doc.get_relative_position(0, 6), None);
}

#[test]
fn test_extract_character_surrogates() {
    let doc = Document::from_text("🦀");
    let info = doc.extract_character(0);
    assert_eq!(info.len_characters, 2);
    assert_eq!(info.len_bytes, 4);
    assert_eq!(info.buffer, [0xD83E, 0xDD80]);
}

#[test]
fn test_safe_segment_breaks_at_space() {
    let doc = Document::new();
    assert_eq!(doc.safe_segment(b"ab cd ef", 6), 5);
}

#[test]
fn test_safe_segment_whole_cjk_character() {
    let doc = Document::new();
    // Two 3-byte characters then ASCII; a budget inside the second
    // character retreats to the first boundary, never 2 or 4.
    let text = "一二x".as_bytes();
    assert_eq!(doc.safe_segment(text, 4), 3);
    assert_eq!(doc.safe_segment(text, 5), 3);
}

#[test]
fn test_safe_segment_class_transition() {
    let doc = Document::new();
    // No spaces: breaks at the word/punctuation transition.
    assert_eq!(doc.safe_segment(b"foo(barbaz", 8), 4);
}

#[test]
fn test_safe_segment_combining_sequence() {
    let doc = Document::new();
    // "xe" + combining acute; a break between base and accent retreats.
    let text = "xe\u{0301}zz".as_bytes();
    let cut = doc.safe_segment(text, 2);
    assert!(cut == 1, "break splits the cluster: {cut}");
}

#[test]
fn test_word_navigation() {
    let doc = Document::from_text("one  two.three");
    assert_eq!(doc.next_word_start(0, 1), 5);
    assert_eq!(doc.next_word_start(5, 1), 8);
    assert_eq!(doc.next_word_start(8, 1), 9);
    assert_eq!(doc.next_word_end(0, 1), 3);
    assert_eq!(doc.next_word_end(3, 1), 8);
    assert_eq!(doc.next_word_start(5, -1), 0);
    assert_eq!(doc.next_word_end(14, -1), 9);
}

#[test]
fn test_extend_word_select() {
    let doc = Document::from_text("alpha beta");
    assert_eq!(doc.extend_word_select(7, 1, false), 10);
    assert_eq!(doc.extend_word_select(7, -1, false), 6);
    // Only-word mode stops at the boundary before a space.
    assert_eq!(doc.extend_word_select(5, 1, true), 5);
}

#[test]
fn test_word_parts_camel_case() {
    let doc = Document::from_text("getFileName");
    assert_eq!(doc.word_part_right(0), 3);
    assert_eq!(doc.word_part_right(3), 7);
    assert_eq!(doc.word_part_right(7), 11);
    assert_eq!(doc.word_part_left(11), 7);
    assert_eq!(doc.word_part_left(7), 3);
    assert_eq!(doc.word_part_left(3), 0);
}

#[test]
fn test_word_parts_underscores_and_digits() {
    let doc = Document::from_text("max_value42");
    assert_eq!(doc.word_part_right(0), 3);
    assert_eq!(doc.word_part_right(4), 9);
    assert_eq!(doc.word_part_right(9), 11);
}

#[test]
fn test_paragraphs() {
    let doc = Document::from_text("one\ntwo\n\n\nthree\nfour");
    assert_eq!(doc.para_down(0), 10);
    assert_eq!(doc.para_up(10), 0);
    assert_eq!(doc.para_down(10), doc.line_end(5));
    assert_eq!(doc.para_up(doc.length()), 10);
}

#[test]
fn test_word_character_class_unicode() {
    let doc = Document::new();
    assert_eq!(doc.word_character_class('a' as u32), CharClass::Word);
    assert_eq!(doc.word_character_class('中' as u32), CharClass::CjkWord);
    assert_eq!(doc.word_character_class('é' as u32), CharClass::Word);
    assert_eq!(doc.word_character_class(' ' as u32), CharClass::Space);
    assert_eq!(doc.word_character_class('.' as u32), CharClass::Punctuation);
}

#[test]
fn test_dbcs_navigation() {
    // Shift-JIS: 0x82 0xA0 is one character; 0x41 is ASCII 'A'.
    let mut doc = Document::from_bytes(&[0x82, 0xA0, 0x41, 0x82, 0xA2]);
    assert!(doc.set_code_page(932));
    assert!(doc.is_dbcs_lead_byte(0x82));
    assert!(doc.is_dbcs_dual_byte_at(0));
    assert_eq!(doc.next_position(0, 1), 2);
    assert_eq!(doc.next_position(2, 1), 3);
    assert_eq!(doc.next_position(3, 1), 5);
    assert_eq!(doc.next_position(5, -1), 3);
    assert_eq!(doc.next_position(3, -1), 2);
    assert_eq!(doc.next_position(2, -1), 0);
    assert_eq!(doc.move_position_outside_char(1, 1, false), 2);
    assert_eq!(doc.move_position_outside_char(1, -1, false), 0);
    assert_eq!(doc.move_position_outside_char(4, -1, false), 3);
    let ce = doc.character_after(0);
    assert_eq!(ce.character, 0x82A0);
    assert_eq!(ce.width_bytes, 2);
}

#[test]
fn test_dbcs_literal_search() {
    let mut doc = Document::from_bytes(&[0x82, 0xA0, b'A', b'B', 0x82, 0xA2]);
    doc.set_code_page(932);
    use document_core::FindOption;
    let found = doc
        .find_text(0, doc.length(), b"AB", FindOption::MATCH_CASE)
        .unwrap();
    assert_eq!(found, Some((2, 2)));
    // Reverse search also lands on the character boundary.
    let found = doc
        .find_text(doc.length(), 0, b"AB", FindOption::MATCH_CASE)
        .unwrap();
    assert_eq!(found, Some((2, 2)));
    // The DBCS pair is findable as raw bytes too.
    let found = doc
        .find_text(0, doc.length(), &[0x82, 0xA2], FindOption::MATCH_CASE)
        .unwrap();
    assert_eq!(found, Some((4, 2)));
}

#[test]
fn test_del_char_back_multibyte() {
    let mut doc = Document::from_text("a中b");
    doc.del_char_back(4);
    assert_eq!(doc.get_char_range(0, doc.length()), b"ab");
    let mut doc = Document::from_text("x\r\n");
    doc.del_char_back(3);
    assert_eq!(doc.get_char_range(0, doc.length()), b"x");
}
