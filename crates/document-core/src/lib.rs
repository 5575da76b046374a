#![warn(missing_docs)]
//! Document Core - Headless Text Document Kernel
//!
//! # Overview
//!
//! `document-core` is the in-memory document engine behind a programmer's
//! text editor: it stores the text of one editable buffer, tracks per-line
//! metadata, notifies observers of every mutation, supports unlimited
//! grouped undo/redo, and answers the queries a view needs to render,
//! navigate, search and lex the text. It does not render anything and has
//! no caret or selection model; those live in the host.
//!
//! # Core Features
//!
//! - **Byte-exact storage**: piece-table text bytes plus lockstep style
//!   bytes; invalid UTF-8 and double-byte code pages are first-class
//! - **Fast line index**: stepped partition of line starts with optional
//!   UTF-16/UTF-32 per-line indices
//! - **Grouped undo**: one action log with save-point, detach and
//!   tentative marks; redo is replay, new edits truncate
//! - **Encoding model**: single-byte, UTF-8 and East-Asian DBCS
//!   navigation behind one set of primitives
//! - **Per-line metadata**: markers, fold levels, lexer states, margin
//!   text, annotations
//! - **Search**: Boyer-Moore-Horspool-Sunday literals, case-folded
//!   matching, and two regex back-ends
//! - **Styling coordination**: lazy lexing with an adaptive time budget
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Document (guards, notifications, queries)  │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Search / Regex / Styling bridge            │  ← Collaborators
//! ├─────────────────────────────────────────────┤
//! │  Per-Line Stores & Decorations              │  ← Line metadata
//! ├─────────────────────────────────────────────┤
//! │  Cell Buffer (undo, lines, styles)          │  ← Consistency core
//! ├─────────────────────────────────────────────┤
//! │  Piece Table Storage                        │  ← Text bytes
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use document_core::Document;
//!
//! let mut doc = Document::from_text("fn main() {}\n");
//! doc.insert_text(3, "x");
//! assert_eq!(doc.length(), 14);
//! doc.undo();
//! assert_eq!(doc.length(), 13);
//! assert!(doc.can_redo());
//! ```
//!
//! # Module Description
//!
//! - [`storage`] - piece table text storage and style bytes
//! - [`line_index`] - line starts and per-line character indices
//! - [`undo`] - the action log with its marker indices
//! - [`cell_buffer`] - the consistency core over storage, lines and undo
//! - [`per_line`] - markers, fold levels, line states, annotations
//! - [`decorations`] - indicator layers over byte ranges
//! - [`char_classify`] - character classes with user overrides
//! - [`encoding`] - UTF-8 and DBCS helpers
//! - [`case_fold`] - case folding for search
//! - [`search`] - search options and literal-search helpers
//! - [`regex_search`] - the two regex back-ends
//! - [`document`] - the facade tying everything together
//! - [`watcher`] - the notification protocol

pub mod case_fold;
pub mod cell_buffer;
pub mod char_classify;
pub mod decorations;
pub mod document;
pub mod encoding;
pub mod line_index;
pub mod per_line;
pub mod regex_search;
pub mod search;
pub mod storage;
pub mod undo;
pub mod watcher;

pub use case_fold::{CaseFolder, CaseFolderTable, CaseFolderUnicode};
pub use cell_buffer::{CellBuffer, LineDelta};
pub use char_classify::{CharClass, CharClassify};
pub use decorations::{Decoration, DecorationList, FillResult, RunStyles};
pub use document::{
    ActionDuration, Document, EndOfLine, HighlightDelimiter, InsertCheck, Lexer, ViewState,
    WatcherId,
};
pub use encoding::{CharacterExtracted, CharacterWideInfo, EncodingFamily, CP_UTF8};
pub use line_index::LineCharacterIndex;
pub use per_line::{
    level_is_header, level_is_whitespace, level_number, LineAnnotations, LineLevels, LineMarkers,
    LineStates, PerLine, LEVEL_BASE, LEVEL_HEADER_FLAG, LEVEL_NUMBER_MASK, LEVEL_WHITE_FLAG,
};
pub use regex_search::{BuiltinRegex, CharacterIndexer, MatchSpans, RegexSearcher, StandardRegex};
pub use search::FindOption;
pub use storage::PieceTable;
pub use undo::{Action, ActionType, UndoHistory};
pub use watcher::{
    DocModification, DocWatcher, LineEndTypes, ModificationFlags, RegexError, Status,
};
