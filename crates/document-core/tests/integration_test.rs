use std::cell::RefCell;
use std::rc::Rc;

use document_core::{
    DocModification, DocWatcher, Document, FindOption, Lexer, ModificationFlags, Status,
};

fn text_of(doc: &Document) -> Vec<u8> {
    doc.get_char_range(0, doc.length())
}

#[test]
fn test_scenario_insert_at_tail_then_undo() {
    let mut doc = Document::new();
    doc.insert_string(0, b"hello");
    assert_eq!(doc.length(), 5);
    assert_eq!(doc.lines_total(), 1);
    doc.undo();
    assert_eq!(doc.length(), 0);
    assert!(doc.is_save_point());
    assert_eq!(doc.lines_total(), 1);
}

#[test]
fn test_scenario_line_index_after_crlf_edit() {
    let mut doc = Document::from_text("a\r\nb");
    doc.insert_string(2, b"X");
    assert_eq!(text_of(&doc), b"a\rX\nb");
    // Split at both CR and LF since they are no longer adjacent.
    assert_eq!(doc.lines_total(), 3);
    doc.undo();
    assert_eq!(doc.lines_total(), 2);
}

#[test]
fn test_scenario_case_insensitive_find() {
    let mut doc = Document::from_text("Hello, World");
    let found = doc.find_text(0, 12, b"world", FindOption::empty()).unwrap();
    assert_eq!(found, Some((7, 5)));
}

#[test]
fn test_scenario_safe_segment() {
    let doc = Document::new();
    assert_eq!(doc.safe_segment(b"ab cd ef", 6), 5);
    let cjk = "一二x".as_bytes();
    let cut = doc.safe_segment(cjk, 4);
    assert_eq!(cut, 3);
    assert_ne!(cut, 2);
    assert_ne!(cut, 4);
}

#[test]
fn test_scenario_brace_match() {
    let doc = Document::from_text("(a(b)c)");
    assert_eq!(doc.brace_match(0, 0, false), Some(6));
    assert_eq!(doc.brace_match(2, 0, false), Some(4));
    assert_eq!(doc.brace_match(6, 0, false), Some(0));
    assert_eq!(doc.brace_match(1, 0, false), None);
}

#[test]
fn test_scenario_regex_submatch() {
    let mut doc = Document::from_text("x(name)y");
    let flags = FindOption::MATCH_CASE | FindOption::REGEXP;
    let found = doc
        .find_text(0, doc.length(), br"\(([A-Za-z]+)\)", flags)
        .unwrap();
    assert_eq!(found, Some((1, 6)));
    let replaced = doc.substitute_by_position(br"[\1]").unwrap();
    assert_eq!(replaced, b"[name]");
}

#[test]
fn test_line_starts_are_monotone() {
    let mut doc = Document::from_text("a\nbb\r\nccc\rdddd");
    doc.insert_text(3, "mid\ndle");
    doc.delete_chars(0, 2);
    for line in 0..doc.lines_total() {
        assert!(doc.line_start(line) <= doc.line_start(line + 1));
    }
    assert_eq!(doc.line_start(doc.lines_total()), doc.length());
}

#[test]
fn test_brace_match_respects_styles() {
    let mut doc = Document::from_text("(a(b)c)");
    // Style everything, then give the inner pair a different style.
    doc.start_styling(0);
    doc.set_style_for(7, 1);
    doc.start_styling(2);
    doc.set_style_for(1, 9);
    doc.start_styling(4);
    doc.set_style_for(1, 9);
    doc.start_styling(7);

    // From the outer brace the inner pair is invisible (other style).
    assert_eq!(doc.brace_match(0, 0, false), Some(6));
    // The inner pair matches itself.
    assert_eq!(doc.brace_match(2, 0, false), Some(4));
}

#[test]
fn test_read_only_rejects_and_notifies() {
    #[derive(Default)]
    struct Attempts(usize);
    struct AttemptWatcher(Rc<RefCell<Attempts>>);
    impl DocWatcher for AttemptWatcher {
        fn notify_modify_attempt(&mut self, _doc: &Document, _user_data: usize) {
            self.0.borrow_mut().0 += 1;
        }
    }

    let mut doc = Document::from_text("locked");
    let attempts = Rc::new(RefCell::new(Attempts::default()));
    doc.add_watcher(Box::new(AttemptWatcher(attempts.clone())), 0);
    doc.set_read_only(true);

    assert_eq!(doc.insert_text(0, "x"), 0);
    assert!(!doc.delete_chars(0, 1));
    assert_eq!(doc.undo(), None);
    assert_eq!(text_of(&doc), b"locked");
    assert!(attempts.borrow().0 >= 2);

    doc.set_read_only(false);
    assert_eq!(doc.insert_text(0, "x"), 1);
}

#[test]
fn test_save_point_notifications() {
    #[derive(Default)]
    struct SavePoints(Vec<bool>);
    struct SaveWatcher(Rc<RefCell<SavePoints>>);
    impl DocWatcher for SaveWatcher {
        fn notify_save_point(&mut self, _doc: &Document, _user_data: usize, at_save_point: bool) {
            self.0.borrow_mut().0.push(at_save_point);
        }
    }

    let mut doc = Document::new();
    let log = Rc::new(RefCell::new(SavePoints::default()));
    doc.add_watcher(Box::new(SaveWatcher(log.clone())), 0);

    doc.insert_text(0, "a"); // leaves the initial save point
    doc.set_save_point(); // explicit save
    doc.insert_text(1, "b"); // leaves again
    doc.undo(); // comes back
    assert_eq!(log.borrow().0, vec![false, true, false, true]);
}

#[test]
fn test_delay_save_point_coalesces() {
    #[derive(Default)]
    struct SavePoints(Vec<bool>);
    struct SaveWatcher(Rc<RefCell<SavePoints>>);
    impl DocWatcher for SaveWatcher {
        fn notify_save_point(&mut self, _doc: &Document, _user_data: usize, at_save_point: bool) {
            self.0.borrow_mut().0.push(at_save_point);
        }
    }

    let mut doc = Document::new();
    let log = Rc::new(RefCell::new(SavePoints::default()));
    doc.add_watcher(Box::new(SaveWatcher(log.clone())), 0);

    doc.begin_delay_save_point();
    doc.insert_text(0, "a");
    doc.insert_text(1, "b");
    doc.end_delay_save_point();
    // One notification for the whole bracket.
    assert_eq!(log.borrow().0, vec![false]);
}

#[test]
fn test_group_completed_notification() {
    #[derive(Default)]
    struct Groups(usize);
    struct GroupWatcher(Rc<RefCell<Groups>>);
    impl DocWatcher for GroupWatcher {
        fn notify_group_completed(&mut self, _doc: &Document, _user_data: usize) {
            self.0.borrow_mut().0 += 1;
        }
    }

    let mut doc = Document::new();
    let groups = Rc::new(RefCell::new(Groups::default()));
    doc.add_watcher(Box::new(GroupWatcher(groups.clone())), 0);

    doc.begin_undo_action();
    doc.begin_undo_action();
    doc.insert_text(0, "x");
    doc.end_undo_action();
    assert_eq!(groups.borrow().0, 0);
    doc.end_undo_action();
    assert_eq!(groups.borrow().0, 1);
}

#[test]
fn test_error_status_broadcast() {
    #[derive(Default)]
    struct Errors(Vec<Status>);
    struct ErrorWatcher(Rc<RefCell<Errors>>);
    impl DocWatcher for ErrorWatcher {
        fn notify_error_occurred(&mut self, _doc: &Document, _user_data: usize, status: Status) {
            self.0.borrow_mut().0.push(status);
        }
    }

    let mut doc = Document::new();
    let errors = Rc::new(RefCell::new(Errors::default()));
    doc.add_watcher(Box::new(ErrorWatcher(errors.clone())), 0);
    doc.set_error_status(Status::RegEx);
    assert_eq!(errors.borrow().0, vec![Status::RegEx]);
}

/// A lexer that styles word bytes 1 and everything else 0.
struct WordLexer;

impl Lexer for WordLexer {
    fn lex(&mut self, doc: &mut Document, start: usize, end: usize, _initial_style: u8) {
        doc.start_styling(start);
        for pos in start..end.min(doc.length()) {
            let b = doc.byte_at(pos);
            let style = u8::from(b.is_ascii_alphanumeric());
            doc.set_style_for(1, style);
        }
    }
}

#[test]
fn test_lexer_bridge_styles_lazily() {
    let mut doc = Document::from_text("ab c");
    doc.set_lexer(Some(Box::new(WordLexer)));
    assert_eq!(doc.get_end_styled(), 0);

    doc.ensure_styled_to(4);
    assert_eq!(doc.get_end_styled(), 4);
    assert_eq!(doc.style_at(0), 1);
    assert_eq!(doc.style_at(1), 1);
    assert_eq!(doc.style_at(2), 0);
    assert_eq!(doc.style_at(3), 1);

    // Editing pulls the styled watermark back.
    doc.insert_text(1, "!");
    assert_eq!(doc.get_end_styled(), 1);
    doc.ensure_styled_to(doc.length());
    assert_eq!(doc.style_at(1), 0);
}

#[test]
fn test_style_needed_watcher_when_no_lexer() {
    struct StylingWatcher;
    impl DocWatcher for StylingWatcher {
        fn notify_style_needed(&mut self, doc: &mut Document, _user_data: usize, end_pos: usize) {
            let start = doc.get_end_styled();
            doc.start_styling(start);
            doc.set_style_for(end_pos - start, 7);
        }
    }

    let mut doc = Document::from_text("some text");
    doc.add_watcher(Box::new(StylingWatcher), 0);
    doc.ensure_styled_to(4);
    assert_eq!(doc.get_end_styled(), 4);
    assert_eq!(doc.style_at(3), 7);
    assert_eq!(doc.style_at(4), 0);
}

#[test]
fn test_style_to_adjusting_duration_budget() {
    let mut doc = Document::from_text(&"line of text\n".repeat(200));
    doc.set_lexer(Some(Box::new(WordLexer)));
    doc.style_to_adjusting_line_duration(doc.length());
    assert_eq!(doc.get_end_styled(), doc.length());
    let budget = doc.actions_in_allowed_time(0.01);
    // Clamped to [8, 65536] units of 1000 bytes.
    assert!(budget >= 8 * 1000);
    assert!(budget <= 65536 * 1000);
}

#[test]
fn test_insert_check_interceptor() {
    let mut doc = Document::from_text("ab");
    doc.set_insert_check(Some(Box::new(|_pos, bytes: &[u8]| {
        // Reject tabs, double everything else.
        if bytes == b"\t" {
            Some(Vec::new())
        } else {
            let mut doubled = bytes.to_vec();
            doubled.extend_from_slice(bytes);
            Some(doubled)
        }
    })));

    assert_eq!(doc.insert_text(1, "x"), 2);
    assert_eq!(text_of(&doc), b"axxb");
    assert_eq!(doc.insert_text(0, "\t"), 0);
    assert_eq!(text_of(&doc), b"axxb");
}

#[test]
fn test_add_data_appends_with_status() {
    let mut doc = Document::from_text("head");
    assert_eq!(doc.add_data(b"-tail"), Status::Ok);
    assert_eq!(text_of(&doc), b"head-tail");
    doc.set_read_only(true);
    assert_eq!(doc.add_data(b"more"), Status::Failure);
}

#[test]
fn test_extend_style_range() {
    let mut doc = Document::from_text("aaabbbccc");
    doc.start_styling(0);
    doc.set_style_for(3, 1);
    doc.set_style_for(3, 2);
    doc.set_style_for(3, 3);
    assert_eq!(doc.extend_style_range(4, 1, false), 6);
    assert_eq!(doc.extend_style_range(4, -1, false), 3);
}

#[test]
fn test_notify_deleted_on_drop() {
    #[derive(Default)]
    struct Dropped(bool);
    struct DropWatcher(Rc<RefCell<Dropped>>);
    impl DocWatcher for DropWatcher {
        fn notify_deleted(&mut self, _doc: &Document, _user_data: usize) {
            self.0.borrow_mut().0 = true;
        }
    }

    let dropped = Rc::new(RefCell::new(Dropped::default()));
    {
        let mut doc = Document::new();
        doc.add_watcher(Box::new(DropWatcher(dropped.clone())), 0);
        doc.insert_text(0, "bye");
    }
    assert!(dropped.borrow().0);
}

#[test]
fn test_position_boundaries() {
    let doc = Document::from_text("abc");
    assert_eq!(doc.next_position(0, -1), 0);
    assert_eq!(doc.next_position(doc.length(), 1), doc.length());
    assert_eq!(doc.move_position_outside_char(0, -1, true), 0);
    assert_eq!(
        doc.move_position_outside_char(doc.length(), 1, true),
        doc.length()
    );
    assert_eq!(doc.clamp_position_into_document(99), doc.length());
}

#[test]
fn test_insert_check_notification_flag() {
    let (flags, mut doc) = {
        #[derive(Default)]
        struct Flags(Vec<ModificationFlags>);
        struct FlagWatcher(Rc<RefCell<Flags>>);
        impl DocWatcher for FlagWatcher {
            fn notify_modified(
                &mut self,
                _doc: &Document,
                mh: &DocModification<'_>,
                _user_data: usize,
            ) {
                self.0.borrow_mut().0.push(mh.modification_type);
            }
        }
        let mut doc = Document::new();
        let flags = Rc::new(RefCell::new(Flags::default()));
        doc.add_watcher(Box::new(FlagWatcher(flags.clone())), 0);
        (flags, doc)
    };
    doc.insert_text(0, "q");
    let seen = flags.borrow().0.clone();
    assert!(seen[0].contains(ModificationFlags::INSERT_CHECK));
    assert!(seen[1].contains(ModificationFlags::BEFORE_INSERT));
    assert!(seen[2].contains(ModificationFlags::INSERT_TEXT));
}
