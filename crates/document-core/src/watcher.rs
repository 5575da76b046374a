//! Watcher protocol.
//!
//! Watchers register on a document and receive a notification for every
//! observable change. Notifications carry a [`DocModification`] record and
//! a borrowed document reference, so a watcher can read but never mutate
//! from inside a notification; the style-needed callback alone receives a
//! mutable document so it can produce styles.

use bitflags::bitflags;
use thiserror::Error;

use crate::document::Document;

bitflags! {
    /// What a modification notification describes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModificationFlags: u32 {
        /// Text was inserted.
        const INSERT_TEXT = 0x1;
        /// Text was deleted.
        const DELETE_TEXT = 0x2;
        /// Style bytes changed.
        const CHANGE_STYLE = 0x4;
        /// A fold level changed.
        const CHANGE_FOLD = 0x8;
        /// The change came from a direct user action.
        const USER = 0x10;
        /// The change is part of an undo.
        const UNDO = 0x20;
        /// The change is part of a redo.
        const REDO = 0x40;
        /// This undo/redo spans several steps.
        const MULTI_STEP_UNDO_REDO = 0x80;
        /// Last step of the current undo/redo run.
        const LAST_STEP_IN_UNDO_REDO = 0x100;
        /// A marker was added or removed.
        const CHANGE_MARKER = 0x200;
        /// Sent before text is inserted.
        const BEFORE_INSERT = 0x400;
        /// Sent before text is deleted.
        const BEFORE_DELETE = 0x800;
        /// The undo/redo run touched several lines.
        const MULTILINE_UNDO_REDO = 0x1000;
        /// First action of a new undo group.
        const START_ACTION = 0x2000;
        /// An indicator range changed.
        const CHANGE_INDICATOR = 0x4000;
        /// A line state changed.
        const CHANGE_LINE_STATE = 0x8000;
        /// A margin text changed.
        const CHANGE_MARGIN = 0x10000;
        /// An above-line annotation changed.
        const CHANGE_ANNOTATION = 0x20000;
        /// A container action passed through undo/redo.
        const CONTAINER = 0x40000;
        /// The lexer wants to persist internal state for a range.
        const LEXER_STATE = 0x80000;
        /// Sent before an insertion so the text can be inspected.
        const INSERT_CHECK = 0x100000;
        /// Explicit tab stops changed on a line.
        const CHANGE_TAB_STOPS = 0x200000;
        /// An end-of-line annotation changed.
        const CHANGE_EOL_ANNOTATION = 0x400000;
    }
}

bitflags! {
    /// Classes of line end a lexer can support.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineEndTypes: u32 {
        /// CR, LF and CR-LF.
        const DEFAULT = 0;
        /// Unicode separators (NEL, LS, PS) as well.
        const UNICODE = 1;
    }
}

/// Status codes surfaced at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// No error.
    #[default]
    Ok,
    /// A generic failure.
    Failure,
    /// An allocation failed.
    BadAlloc,
    /// A regular expression failed to compile.
    RegEx,
}

/// A regular expression could not be compiled or executed.
#[derive(Debug, Error)]
#[error("regex error: {message}")]
pub struct RegexError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl RegexError {
    /// Wrap a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Everything a watcher learns about one modification.
#[derive(Debug, Clone)]
pub struct DocModification<'a> {
    /// Flags describing the change.
    pub modification_type: ModificationFlags,
    /// Byte position of the change.
    pub position: usize,
    /// Byte length of the change.
    pub length: usize,
    /// Net lines added (negative when lines were removed).
    pub lines_added: isize,
    /// The inserted or removed bytes, when the change carries text.
    pub text: Option<&'a [u8]>,
    /// The line a per-line change applies to; `None` for document-wide
    /// changes such as marker mass deletion.
    pub line: Option<usize>,
    /// New fold level for fold changes.
    pub fold_level_now: u32,
    /// Previous fold level for fold changes.
    pub fold_level_prev: u32,
    /// Display lines the annotation change added or removed.
    pub annotation_lines_added: isize,
    /// Token of a container action.
    pub token: usize,
}

impl<'a> DocModification<'a> {
    /// A record with the given flags, position and length; everything else
    /// empty.
    pub fn new(modification_type: ModificationFlags, position: usize, length: usize) -> Self {
        Self {
            modification_type,
            position,
            length,
            lines_added: 0,
            text: None,
            line: None,
            fold_level_now: 0,
            fold_level_prev: 0,
            annotation_lines_added: 0,
            token: 0,
        }
    }

    /// Attach the affected bytes.
    pub fn with_text(mut self, text: &'a [u8]) -> Self {
        self.text = Some(text);
        self
    }

    /// Attach the net line delta.
    pub fn with_lines_added(mut self, lines_added: isize) -> Self {
        self.lines_added = lines_added;
        self
    }

    /// Attach the per-line target.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Receiver of document notifications.
///
/// Every method has an empty default so watchers implement only what they
/// observe. `user_data` is the value the watcher registered with.
pub trait DocWatcher {
    /// The document changed; `mh` describes how.
    fn notify_modified(&mut self, doc: &Document, mh: &DocModification<'_>, user_data: usize) {
        let _ = (doc, mh, user_data);
    }

    /// The document is being destroyed.
    fn notify_deleted(&mut self, doc: &Document, user_data: usize) {
        let _ = (doc, user_data);
    }

    /// The document crossed its save point in either direction.
    fn notify_save_point(&mut self, doc: &Document, user_data: usize, at_save_point: bool) {
        let _ = (doc, user_data, at_save_point);
    }

    /// A mutation was attempted on a read-only document.
    fn notify_modify_attempt(&mut self, doc: &Document, user_data: usize) {
        let _ = (doc, user_data);
    }

    /// Styling is needed up to `end_pos`; the watcher may style the
    /// document directly.
    fn notify_style_needed(&mut self, doc: &mut Document, user_data: usize, end_pos: usize) {
        let _ = (doc, user_data, end_pos);
    }

    /// An error status was raised on the document.
    fn notify_error_occurred(&mut self, doc: &Document, user_data: usize, status: Status) {
        let _ = (doc, user_data, status);
    }

    /// The outermost undo group completed.
    fn notify_group_completed(&mut self, doc: &Document, user_data: usize) {
        let _ = (doc, user_data);
    }
}
