//! The document facade.
//!
//! Owns the cell buffer, the per-line stores, the decorations, the
//! classifier, the case folder, the regex engine and the lexer bridge;
//! enforces the read-only and reentrance guards; exposes navigation,
//! search and editing; and fans mutation notifications out to registered
//! watchers.
//!
//! Every text change flows through the two gateways `insert_string` and
//! `delete_chars` (undo and redo replay through the same primitive
//! operations), so watchers always observe a consistent buffer.

use std::time::Instant;

use tracing::{debug, trace};

use crate::case_fold::{CaseFolder, CaseFolderTable, CaseFolderUnicode, MAX_FOLDING_EXPANSION};
use crate::cell_buffer::{CellBuffer, LineDelta};
use crate::char_classify::{
    is_a_digit, is_ascii_character, is_ascii_punctuation, is_break_space, is_eol_byte, is_graphic,
    is_lower_case, is_space_char, is_space_or_tab, is_upper_case, CharClass, CharClassify,
};
use crate::decorations::{DecorationList, FillResult};
use crate::encoding::{
    discard_last_combined_character, family_for_code_page, utf8_bytes_of_lead, utf8_decode,
    utf8_is_ascii, utf8_is_trail_byte, CharacterExtracted, CharacterWideInfo, DbcsClassify,
    EncodingFamily, CP_UTF8, UNICODE_REPLACEMENT_CHAR, UTF8_MAX_BYTES,
};
use crate::line_index::LineCharacterIndex;
use crate::per_line::{
    level_is_header, level_is_whitespace, level_number, LineAnnotations, LineLevels, LineMarkers,
    LineStates, PerLine, LEVEL_BASE,
};
use crate::regex_search::{BuiltinRegex, RegexSearcher};
use crate::search::{build_shift_table, FindOption};
use crate::undo::{Action, ActionType};
use crate::watcher::{
    DocModification, DocWatcher, LineEndTypes, ModificationFlags, RegexError, Status,
};

/// End-of-line mode used when inserting line ends on the document's
/// behalf (indentation rebuilds, line-end conversion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfLine {
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
    /// `\n`
    #[default]
    Lf,
}

impl EndOfLine {
    /// The byte sequence of this mode.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            EndOfLine::CrLf => b"\r\n",
            EndOfLine::Cr => b"\r",
            EndOfLine::Lf => b"\n",
        }
    }
}

/// Exponential-smoothing estimator of seconds-per-styling-unit, used to
/// slice long styling work into bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct ActionDuration {
    duration: f64,
    min_duration: f64,
    unit_bytes: usize,
}

impl ActionDuration {
    const ALPHA: f64 = 0.25;

    fn new(initial: f64, min_duration: f64, unit_bytes: usize) -> Self {
        Self {
            duration: initial,
            min_duration,
            unit_bytes,
        }
    }

    /// Feed one observation of `number_actions` bytes styled in
    /// `duration_of_actions` seconds.
    pub fn add_sample(&mut self, number_actions: usize, duration_of_actions: f64) {
        // Only adjust for multiple units to avoid instability.
        if number_actions < self.unit_bytes {
            return;
        }
        let duration_one =
            (self.unit_bytes as f64 * duration_of_actions) / number_actions as f64;
        let smoothed = Self::ALPHA * duration_one + (1.0 - Self::ALPHA) * self.duration;
        self.duration = smoothed.max(self.min_duration);
    }

    /// Convert a time budget to a byte budget.
    pub fn actions_in_allowed_time(&self, seconds_allowed: f64) -> usize {
        let actions = (seconds_allowed / self.duration) as i64;
        (actions.clamp(8, 0x10000) as usize) * self.unit_bytes
    }
}

/// A lexer collaborating with the document: it produces style bytes and
/// fold levels on demand.
pub trait Lexer {
    /// Style `[start, end)`; `initial_style` is the style in force at
    /// `start`.
    fn lex(&mut self, doc: &mut Document, start: usize, end: usize, initial_style: u8);

    /// Compute fold levels for `[start, end)`.
    fn fold(&mut self, doc: &mut Document, start: usize, end: usize, initial_style: u8) {
        let _ = (doc, start, end, initial_style);
    }

    /// Which line-end classes the lexer understands.
    fn line_end_types_supported(&self) -> LineEndTypes {
        LineEndTypes::DEFAULT
    }
}

/// Per-view state parked on the document so undo-history truncation can
/// reach it.
pub trait ViewState {
    /// Drop any snapshots keyed past log index `action`.
    fn truncate_undo(&mut self, action: usize);
}

/// Handle identifying a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherId(usize);

/// Fold-block delimiters around a line, for margin highlighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighlightDelimiter {
    /// Header line of the enclosing fold block.
    pub begin_fold_block: Option<usize>,
    /// Last line of the enclosing fold block.
    pub end_fold_block: Option<usize>,
    /// First line before `line` whose change can reshape the block.
    pub first_changeable_line_before: Option<usize>,
    /// First line after `line` whose change can reshape the block.
    pub first_changeable_line_after: Option<usize>,
}

/// Insertion interceptor: may replace the bytes about to be inserted.
pub type InsertCheck = Box<dyn FnMut(usize, &[u8]) -> Option<Vec<u8>>>;

#[derive(Clone, Copy, Default)]
struct Range {
    start: usize,
    end: usize,
}

impl Range {
    fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos <= self.end
    }
}

/// The in-memory text document.
pub struct Document {
    cb: CellBuffer,

    markers: LineMarkers,
    levels: LineLevels,
    states: LineStates,
    margins: LineAnnotations,
    annotations: LineAnnotations,
    eol_annotations: LineAnnotations,
    decorations: DecorationList,

    char_class: CharClassify,
    dbcs: Option<DbcsClassify>,
    case_folder: Option<Box<dyn CaseFolder>>,
    regex: Option<Box<dyn RegexSearcher>>,
    lexer: Option<Box<dyn Lexer>>,
    view_state: Option<Box<dyn ViewState>>,
    insert_check: Option<InsertCheck>,

    watchers: Vec<(WatcherId, Box<dyn DocWatcher>, usize)>,
    next_watcher_id: usize,

    code_page: u32,
    eol_mode: EndOfLine,
    line_end_bit_set: LineEndTypes,
    tab_in_chars: usize,
    indent_in_chars: usize,
    use_tabs: bool,

    entered_modification: u32,
    entered_read_only: u32,
    entered_styling: u32,
    performing_style: bool,
    end_styled: usize,
    style_clock: u32,
    duration_style_one_unit: ActionDuration,

    forward_safe_char: u8,
    backward_safe_char: u8,
    ascii_backward_safe_char: u8,

    pending_insertion: Option<Vec<u8>>,
    delay_save_point: Option<bool>,
}

impl Document {
    /// An empty UTF-8 document with style bytes enabled.
    pub fn new() -> Self {
        Self::from_bytes(b"")
    }

    /// A document over raw bytes (UTF-8 code page until changed).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut doc = Self {
            cb: CellBuffer::new(bytes, true),
            markers: LineMarkers::new(),
            levels: LineLevels::new(),
            states: LineStates::new(),
            margins: LineAnnotations::new(),
            annotations: LineAnnotations::new(),
            eol_annotations: LineAnnotations::new(),
            decorations: DecorationList::new(bytes.len()),
            char_class: CharClassify::new(),
            dbcs: None,
            case_folder: None,
            regex: None,
            lexer: None,
            view_state: None,
            insert_check: None,
            watchers: Vec::new(),
            next_watcher_id: 0,
            code_page: CP_UTF8,
            eol_mode: EndOfLine::default(),
            line_end_bit_set: LineEndTypes::DEFAULT,
            tab_in_chars: 8,
            indent_in_chars: 0,
            use_tabs: true,
            entered_modification: 0,
            entered_read_only: 0,
            entered_styling: 0,
            performing_style: false,
            end_styled: 0,
            style_clock: 0,
            duration_style_one_unit: ActionDuration::new(1e-6, 1e-9, 1000),
            forward_safe_char: 0x7F,
            backward_safe_char: 0x7F,
            ascii_backward_safe_char: 0xFF,
            pending_insertion: None,
            delay_save_point: None,
        };
        doc.apply_code_page();
        doc
    }

    /// A document over UTF-8 text.
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    // === watchers and notifications ===

    /// Register a watcher; it receives every subsequent notification.
    pub fn add_watcher(&mut self, watcher: Box<dyn DocWatcher>, user_data: usize) -> WatcherId {
        let id = WatcherId(self.next_watcher_id);
        self.next_watcher_id += 1;
        self.watchers.push((id, watcher, user_data));
        id
    }

    /// Remove a watcher by the id `add_watcher` returned.
    pub fn remove_watcher(&mut self, id: WatcherId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|(wid, _, _)| *wid != id);
        self.watchers.len() != before
    }

    fn notify_modified(&mut self, mh: DocModification<'_>) {
        if mh.modification_type.contains(ModificationFlags::INSERT_TEXT) {
            self.decorations.insert_space(mh.position, mh.length);
        } else if mh.modification_type.contains(ModificationFlags::DELETE_TEXT) {
            self.decorations.delete_range(mh.position, mh.length);
        }
        let mut watchers = std::mem::take(&mut self.watchers);
        for (_, watcher, data) in &mut watchers {
            watcher.notify_modified(self, &mh, *data);
        }
        let mut added = std::mem::replace(&mut self.watchers, watchers);
        self.watchers.append(&mut added);
    }

    fn notify_save_point(&mut self, at_save_point: bool) {
        if self.delay_save_point.is_some() {
            return;
        }
        let mut watchers = std::mem::take(&mut self.watchers);
        for (_, watcher, data) in &mut watchers {
            watcher.notify_save_point(self, *data, at_save_point);
        }
        let mut added = std::mem::replace(&mut self.watchers, watchers);
        self.watchers.append(&mut added);
    }

    fn notify_modify_attempt(&mut self) {
        let mut watchers = std::mem::take(&mut self.watchers);
        for (_, watcher, data) in &mut watchers {
            watcher.notify_modify_attempt(self, *data);
        }
        let mut added = std::mem::replace(&mut self.watchers, watchers);
        self.watchers.append(&mut added);
    }

    fn notify_group_completed(&mut self) {
        let mut watchers = std::mem::take(&mut self.watchers);
        for (_, watcher, data) in &mut watchers {
            watcher.notify_group_completed(self, *data);
        }
        let mut added = std::mem::replace(&mut self.watchers, watchers);
        self.watchers.append(&mut added);
    }

    /// Tell the watchers an error has occurred.
    pub fn set_error_status(&mut self, status: Status) {
        let mut watchers = std::mem::take(&mut self.watchers);
        for (_, watcher, data) in &mut watchers {
            watcher.notify_error_occurred(self, *data, status);
        }
        let mut added = std::mem::replace(&mut self.watchers, watchers);
        self.watchers.append(&mut added);
    }

    // === scalar state ===

    /// Total length in bytes.
    pub fn length(&self) -> usize {
        self.cb.length()
    }

    /// Byte at `pos` (0 outside the document).
    pub fn byte_at(&self, pos: usize) -> u8 {
        self.cb.char_at(pos)
    }

    /// Style byte at `pos`.
    pub fn style_at(&self, pos: usize) -> u8 {
        self.cb.style_at(pos)
    }

    /// Bytes of `[start, start + len)`.
    pub fn get_char_range(&self, start: usize, len: usize) -> Vec<u8> {
        self.cb.range_vec(start, len.min(self.length().saturating_sub(start)))
    }

    /// Clamp a position into `[0, length]`.
    pub fn clamp_position_into_document(&self, pos: usize) -> usize {
        pos.min(self.length())
    }

    /// The active code page: 0 single-byte, 65001 UTF-8, else a DBCS page.
    pub fn code_page(&self) -> u32 {
        self.code_page
    }

    /// The broad encoding family of the active code page.
    pub fn code_page_family(&self) -> EncodingFamily {
        family_for_code_page(self.code_page)
    }

    /// Switch the code page. Returns `true` when it changed; the case
    /// folder and regex engine reset and all styling becomes stale.
    pub fn set_code_page(&mut self, code_page: u32) -> bool {
        if self.code_page == code_page {
            return false;
        }
        self.code_page = code_page;
        self.apply_code_page();
        self.case_folder = None;
        self.regex = None;
        self.modified_at(0);
        debug!(code_page, "code page changed");
        true
    }

    fn apply_code_page(&mut self) {
        self.forward_safe_char = 0xFF;
        self.backward_safe_char = 0xFF;
        self.ascii_backward_safe_char = 0xFF;
        self.dbcs = None;
        match self.code_page_family() {
            EncodingFamily::EightBit => {}
            EncodingFamily::Unicode => {
                self.forward_safe_char = 0x7F;
                self.backward_safe_char = 0x7F;
            }
            EncodingFamily::Dbcs => {
                let classify = DbcsClassify::new(self.code_page);
                // Below the minimum lead byte forward, below the minimum
                // trail byte backward, a byte can never continue a
                // character.
                self.forward_safe_char = 0x80;
                self.backward_safe_char = classify.backward_safe_char();
                self.ascii_backward_safe_char = classify.backward_safe_char();
                self.dbcs = Some(classify);
            }
        }
        self.cb
            .set_utf8_substance(self.code_page_family() == EncodingFamily::Unicode);
    }

    /// Allowed line-end classes; actual support also depends on the lexer.
    pub fn line_end_types_allowed(&self) -> LineEndTypes {
        self.line_end_bit_set
    }

    /// Restrict or widen the allowed line-end classes.
    pub fn set_line_end_types_allowed(&mut self, line_end_bit_set: LineEndTypes) -> bool {
        if self.line_end_bit_set == line_end_bit_set {
            return false;
        }
        self.line_end_bit_set = line_end_bit_set;
        true
    }

    /// Line-end classes the lexer supports (UTF-8 documents only).
    pub fn line_end_types_supported(&self) -> LineEndTypes {
        if self.code_page == CP_UTF8
            && let Some(lexer) = &self.lexer
        {
            return lexer.line_end_types_supported();
        }
        LineEndTypes::DEFAULT
    }

    /// The preferred end-of-line mode.
    pub fn eol_mode(&self) -> EndOfLine {
        self.eol_mode
    }

    /// Set the preferred end-of-line mode (existing text is untouched;
    /// see [`Document::convert_line_ends`]).
    pub fn set_eol_mode(&mut self, eol_mode: EndOfLine) {
        self.eol_mode = eol_mode;
    }

    /// The byte sequence inserted for a new line end.
    pub fn eol_bytes(&self) -> &'static [u8] {
        self.eol_mode.as_bytes()
    }

    /// Width of a tab in character columns.
    pub fn tab_in_chars(&self) -> usize {
        self.tab_in_chars
    }

    /// Set the tab width in character columns (minimum 1).
    pub fn set_tab_in_chars(&mut self, tab: usize) {
        self.tab_in_chars = tab.max(1);
    }

    /// Size of one indent level: the indent width, or the tab width when
    /// the indent width is 0.
    pub fn indent_size(&self) -> usize {
        if self.indent_in_chars > 0 {
            self.indent_in_chars
        } else {
            self.tab_in_chars
        }
    }

    /// Set the indent width (0 means "use the tab width").
    pub fn set_indent_in_chars(&mut self, indent: usize) {
        self.indent_in_chars = indent;
    }

    /// Whether indentation rebuilds use tab bytes.
    pub fn use_tabs(&self) -> bool {
        self.use_tabs
    }

    /// Choose tabs or spaces for indentation rebuilds.
    pub fn set_use_tabs(&mut self, use_tabs: bool) {
        self.use_tabs = use_tabs;
    }

    /// Whether mutation is rejected.
    pub fn is_read_only(&self) -> bool {
        self.cb.is_read_only()
    }

    /// Set or clear the read-only flag.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.cb.set_read_only(read_only);
    }

    fn check_read_only(&mut self) {
        if self.cb.is_read_only() && self.entered_read_only == 0 {
            self.entered_read_only += 1;
            self.notify_modify_attempt();
            self.entered_read_only -= 1;
        }
    }

    // === lines ===

    /// Number of lines; never less than 1.
    pub fn lines_total(&self) -> usize {
        self.cb.lines_total()
    }

    /// Byte position where `line` starts; `lines_total()` maps to the
    /// document length.
    pub fn line_start(&self, line: usize) -> usize {
        self.cb.line_start(line)
    }

    /// End of `line` excluding its terminator.
    pub fn line_end(&self, line: usize) -> usize {
        self.cb.line_end(line)
    }

    /// Line containing `pos`.
    pub fn line_from_position(&self, pos: usize) -> usize {
        self.cb.line_from_position(pos)
    }

    /// `[start, start-of-next-line)` of `line`.
    pub fn line_range(&self, line: usize) -> (usize, usize) {
        (self.cb.line_start(line), self.cb.line_start(line + 1))
    }

    /// Start of the line containing `pos`.
    pub fn line_start_position(&self, pos: usize) -> usize {
        self.cb.line_start(self.cb.line_from_position(pos))
    }

    /// End of the line containing `pos`, excluding the terminator.
    pub fn line_end_position(&self, pos: usize) -> usize {
        self.cb.line_end(self.cb.line_from_position(pos))
    }

    /// Whether `pos` is the first position of its line.
    pub fn is_line_start_position(&self, pos: usize) -> bool {
        self.line_start_position(pos) == pos
    }

    /// Whether `pos` is at the end of its line (before the terminator).
    pub fn is_line_end_position(&self, pos: usize) -> bool {
        self.line_end_position(pos) == pos
    }

    /// Whether `pos` lies within its line's terminator.
    pub fn is_position_in_line_end(&self, pos: usize) -> bool {
        pos >= self.line_end_position(pos)
    }

    /// First non-blank position of the line containing `pos`, or the line
    /// start when `pos` already sits there.
    pub fn vc_home_position(&self, pos: usize) -> usize {
        let line = self.line_from_position(pos);
        let start_position = self.line_start(line);
        let end_line = self.line_end(line);
        let mut start_text = start_position;
        while start_text < end_line && is_space_or_tab(self.cb.char_at(start_text)) {
            start_text += 1;
        }
        if pos == start_text {
            start_position
        } else {
            start_text
        }
    }

    /// The line after the one reached by adding `length` bytes to the
    /// start of `line`; always makes progress.
    pub fn line_from_position_after(&self, line: usize, length: usize) -> usize {
        let pos_after = self.cb.line_start(line) + length;
        if pos_after >= self.length() {
            return self.lines_total();
        }
        let line_after = self.line_from_position(pos_after);
        if line == line_after {
            line_after + 1
        } else {
            line_after
        }
    }

    // === optional per-line character indices ===

    /// The active character-index kinds.
    pub fn line_character_index(&self) -> LineCharacterIndex {
        self.cb.line_character_index()
    }

    /// Retain character-index kinds; must be paired with a release.
    pub fn allocate_line_character_index(&mut self, kinds: LineCharacterIndex) {
        self.cb.allocate_line_character_index(kinds);
    }

    /// Release character-index kinds.
    pub fn release_line_character_index(&mut self, kinds: LineCharacterIndex) {
        self.cb.release_line_character_index(kinds);
    }

    /// Start of `line` counted in the units of `kind`.
    pub fn index_line_start(&self, line: usize, kind: LineCharacterIndex) -> Option<usize> {
        self.cb.index_line_start(line, kind)
    }

    /// Line containing a position counted in the units of `kind`.
    pub fn line_from_position_index(&self, pos: usize, kind: LineCharacterIndex) -> Option<usize> {
        self.cb.line_from_position_index(pos, kind)
    }

    // === encoding and navigation ===

    /// Whether a CR-LF pair starts at `pos`.
    pub fn is_crlf(&self, pos: usize) -> bool {
        pos < self.length()
            && self.cb.char_at(pos) == b'\r'
            && self.cb.char_at(pos + 1) == b'\n'
    }

    /// Whether `b` can start a two-byte character in the active code page.
    pub fn is_dbcs_lead_byte(&self, b: u8) -> bool {
        self.dbcs.as_ref().is_some_and(|d| d.is_lead_byte(b))
    }

    fn is_dbcs_trail_byte(&self, b: u8) -> bool {
        self.dbcs.as_ref().is_some_and(|d| d.is_trail_byte(b))
    }

    /// Whether a valid lead/trail pair starts at `pos`.
    pub fn is_dbcs_dual_byte_at(&self, pos: usize) -> bool {
        self.is_dbcs_lead_byte(self.cb.char_at(pos))
            && self.is_dbcs_trail_byte(self.cb.char_at(pos + 1))
    }

    /// Byte length of the character at `pos`; CR-LF counts as one
    /// character of length 2. The `bool` reports an invalid sequence.
    pub fn len_char(&self, pos: usize) -> (usize, bool) {
        if pos >= self.length() {
            // 1 instead of 0 so an out-of-bounds loop still advances.
            return (1, false);
        }
        let lead = self.cb.char_at(pos);
        if lead == b'\r' && self.cb.char_at(pos + 1) == b'\n' {
            return (2, false);
        }
        match self.code_page_family() {
            EncodingFamily::EightBit => (1, false),
            EncodingFamily::Unicode => {
                if utf8_is_ascii(lead) {
                    return (1, false);
                }
                let width = utf8_bytes_of_lead(lead);
                let bytes = self.cb.range_vec(pos, width.min(self.length() - pos));
                match utf8_decode(&bytes) {
                    Some((_, width)) => (width, false),
                    None => (1, true),
                }
            }
            EncodingFamily::Dbcs => {
                if utf8_is_ascii(lead) {
                    (1, false)
                } else if self.is_dbcs_dual_byte_at(pos) {
                    (2, false)
                } else {
                    (1, self.is_dbcs_lead_byte(lead))
                }
            }
        }
    }

    /// Whether `pos` sits inside a valid UTF-8 sequence; returns the
    /// sequence extent when it does.
    fn in_good_utf8(&self, pos: usize) -> Option<(usize, usize)> {
        let mut trail = pos;
        while trail > 0
            && pos - trail < UTF8_MAX_BYTES
            && utf8_is_trail_byte(self.cb.char_at(trail - 1))
        {
            trail -= 1;
        }
        let start = trail.saturating_sub(1);
        let lead = self.cb.char_at(start);
        let width = utf8_bytes_of_lead(lead);
        if width == 1 || pos - start > width - 1 {
            return None;
        }
        let bytes = self.cb.range_vec(start, width.min(self.length() - start));
        utf8_decode(&bytes).map(|(_, w)| (start, start + w))
    }

    /// Snap `pos` so it never splits a multi-byte character nor a CR-LF
    /// pair (when `check_line_end`). The snap direction is the sign of
    /// `move_dir`.
    pub fn move_position_outside_char(
        &self,
        pos: usize,
        move_dir: isize,
        check_line_end: bool,
    ) -> usize {
        if pos == 0 {
            return 0;
        }
        if pos >= self.length() {
            return self.length();
        }

        if check_line_end && self.is_crlf(pos - 1) {
            return if move_dir > 0 { pos + 1 } else { pos - 1 };
        }

        match self.code_page_family() {
            EncodingFamily::EightBit => pos,
            EncodingFamily::Unicode => {
                let ch = self.cb.char_at(pos);
                if utf8_is_trail_byte(ch)
                    && let Some((start, end)) = self.in_good_utf8(pos)
                {
                    // A trail byte within a character; invalid UTF-8 keeps
                    // the position of the isolated byte.
                    return if move_dir > 0 { end } else { start };
                }
                pos
            }
            EncodingFamily::Dbcs => {
                // Step back until a non-lead byte, then walk forward
                // character by character from a known start.
                let mut check = pos;
                while check > 0 && self.is_dbcs_lead_byte(self.cb.char_at(check - 1)) {
                    check -= 1;
                }
                while check < pos {
                    let size = if self.is_dbcs_dual_byte_at(check) { 2 } else { 1 };
                    if check + size == pos {
                        return pos;
                    }
                    if check + size > pos {
                        return if move_dir > 0 { check + size } else { check };
                    }
                    check += size;
                }
                pos
            }
        }
    }

    /// Advance exactly one character from a valid position; CR-LF counts
    /// as two positions. Clamps at the document edges.
    pub fn next_position(&self, pos: usize, move_dir: isize) -> usize {
        if move_dir > 0 {
            if pos + 1 >= self.length() {
                return self.length();
            }
        } else if pos <= 1 {
            return 0;
        }

        match self.code_page_family() {
            EncodingFamily::EightBit => {
                (pos as isize + move_dir.signum()) as usize
            }
            EncodingFamily::Unicode => {
                if move_dir > 0 {
                    let lead = self.cb.char_at(pos);
                    if utf8_is_ascii(lead) {
                        pos + 1
                    } else {
                        let width = utf8_bytes_of_lead(lead);
                        let bytes = self.cb.range_vec(pos, width.min(self.length() - pos));
                        match utf8_decode(&bytes) {
                            Some((_, w)) => (pos + w).min(self.length()),
                            None => pos + 1,
                        }
                    }
                } else {
                    let pos = pos - 1;
                    let ch = self.cb.char_at(pos);
                    if utf8_is_trail_byte(ch)
                        && let Some((start, _)) = self.in_good_utf8(pos)
                    {
                        return start;
                    }
                    pos
                }
            }
            EncodingFamily::Dbcs => {
                if move_dir > 0 {
                    let size = if self.is_dbcs_dual_byte_at(pos) { 2 } else { 1 };
                    (pos + size).min(self.length())
                } else {
                    // Going backwards requires finding a character start.
                    if self.is_dbcs_lead_byte(self.cb.char_at(pos - 1)) {
                        // Should actually be a trail byte.
                        if pos >= 2 && self.is_dbcs_dual_byte_at(pos - 2) {
                            pos - 2
                        } else {
                            // Invalid pair, treat as one byte wide.
                            pos - 1
                        }
                    } else {
                        // Step back until a non-lead byte and use parity to
                        // decide the width of the last character.
                        let mut pos_temp = pos as isize - 1;
                        loop {
                            pos_temp -= 1;
                            if pos_temp < 0
                                || !self.is_dbcs_lead_byte(self.cb.char_at(pos_temp as usize))
                            {
                                break;
                            }
                        }
                        let width_last = (((pos as isize - pos_temp) & 1) + 1) as usize;
                        if width_last == 2 && self.is_dbcs_dual_byte_at(pos - 2) {
                            pos - 2
                        } else {
                            // The byte before pos may be a valid character
                            // or an invalid second byte.
                            pos - 1
                        }
                    }
                }
            }
        }
    }

    /// Move `pos` one character; returns `false` (leaving `pos` alone) at
    /// the document edges.
    pub fn next_character(&self, pos: &mut usize, move_dir: isize) -> bool {
        let next = self.next_position(*pos, move_dir);
        if next == *pos {
            return false;
        }
        *pos = next;
        true
    }

    /// The character starting at `pos`.
    pub fn character_after(&self, pos: usize) -> CharacterExtracted {
        if pos >= self.length() {
            return CharacterExtracted::EMPTY;
        }
        let lead = self.cb.char_at(pos);
        if utf8_is_ascii(lead) || self.code_page_family() == EncodingFamily::EightBit {
            return CharacterExtracted::single_byte(lead);
        }
        match self.code_page_family() {
            EncodingFamily::Unicode => {
                let width = utf8_bytes_of_lead(lead);
                let bytes = self.cb.range_vec(pos, width.min(self.length() - pos));
                CharacterExtracted::from_utf8(&bytes)
            }
            _ => {
                if self.is_dbcs_dual_byte_at(pos) {
                    CharacterExtracted::dbcs(self.cb.char_at(pos), self.cb.char_at(pos + 1))
                } else {
                    CharacterExtracted::single_byte(lead)
                }
            }
        }
    }

    /// The character ending at `pos`.
    pub fn character_before(&self, pos: usize) -> CharacterExtracted {
        if pos == 0 {
            return CharacterExtracted::EMPTY;
        }
        let previous = self.cb.char_at(pos - 1);
        match self.code_page_family() {
            EncodingFamily::EightBit => CharacterExtracted::single_byte(previous),
            EncodingFamily::Unicode => {
                if utf8_is_ascii(previous) {
                    return CharacterExtracted::single_byte(previous);
                }
                let pos = pos - 1;
                if utf8_is_trail_byte(previous)
                    && let Some((start, end)) = self.in_good_utf8(pos)
                {
                    let bytes = self.cb.range_vec(start, end - start);
                    return CharacterExtracted::from_utf8(&bytes);
                }
                // An isolated trail or lead byte.
                CharacterExtracted {
                    character: UNICODE_REPLACEMENT_CHAR,
                    width_bytes: 1,
                }
            }
            EncodingFamily::Dbcs => {
                // Moving backwards in DBCS is complex so use next_position.
                let start = self.next_position(pos, -1);
                self.character_after(start)
            }
        }
    }

    /// Position `character_offset` whole characters away from
    /// `position_start`, or `None` when it leaves the document.
    pub fn get_relative_position(
        &self,
        position_start: usize,
        character_offset: isize,
    ) -> Option<usize> {
        if self.code_page_family() == EncodingFamily::EightBit {
            let pos = position_start as isize + character_offset;
            return (pos >= 0 && pos <= self.length() as isize).then_some(pos as usize);
        }
        let mut pos = position_start;
        let increment: isize = if character_offset > 0 { 1 } else { -1 };
        let mut remaining = character_offset.unsigned_abs();
        while remaining > 0 {
            let next = self.next_position(pos, increment);
            if next == pos {
                return None;
            }
            pos = next;
            remaining -= 1;
        }
        Some(pos)
    }

    /// Position `character_offset` UTF-16 code units away from
    /// `position_start`.
    pub fn get_relative_position_utf16(
        &self,
        position_start: usize,
        character_offset: isize,
    ) -> Option<usize> {
        if self.code_page_family() == EncodingFamily::EightBit {
            return self.get_relative_position(position_start, character_offset);
        }
        let mut pos = position_start;
        let increment: isize = if character_offset > 0 { 1 } else { -1 };
        let mut remaining = character_offset.unsigned_abs() as isize;
        while remaining > 0 {
            let next = self.next_position(pos, increment);
            if next == pos {
                return None;
            }
            if next.abs_diff(pos) > 3 {
                // A 4-byte character is two UTF-16 units.
                remaining -= 1;
            }
            pos = next;
            remaining -= 1;
        }
        Some(pos)
    }

    /// The character value at `pos` and its byte width. Invalid UTF-8 is
    /// reported as `0xDC80 + byte`.
    pub fn get_character_and_width(&self, pos: usize) -> (u32, usize) {
        let lead = self.cb.char_at(pos);
        if utf8_is_ascii(lead) || self.code_page_family() == EncodingFamily::EightBit {
            return (lead as u32, 1);
        }
        match self.code_page_family() {
            EncodingFamily::Unicode => {
                let width = utf8_bytes_of_lead(lead);
                let bytes = self.cb.range_vec(pos, width.min(self.length() - pos));
                match utf8_decode(&bytes) {
                    Some((ch, w)) => (ch as u32, w),
                    None => (0xDC80 + lead as u32, 1),
                }
            }
            _ => {
                if self.is_dbcs_dual_byte_at(pos) {
                    (
                        ((lead as u32) << 8) | self.cb.char_at(pos + 1) as u32,
                        2,
                    )
                } else {
                    (lead as u32, 1)
                }
            }
        }
    }

    /// The character at `pos` expressed in UTF-16 code units.
    pub fn extract_character(&self, pos: usize) -> CharacterWideInfo {
        let lead = self.cb.char_at(pos);
        if utf8_is_ascii(lead) {
            return CharacterWideInfo {
                buffer: [lead as u16, 0],
                len_characters: 1,
                len_bytes: 1,
            };
        }
        if self.code_page == CP_UTF8 {
            let ce = self.character_after(pos);
            match char::from_u32(ce.character) {
                Some(c) => {
                    let mut buffer = [0u16; 2];
                    let units = c.encode_utf16(&mut buffer).len();
                    CharacterWideInfo {
                        buffer,
                        len_characters: units,
                        len_bytes: ce.width_bytes.max(1),
                    }
                }
                None => CharacterWideInfo {
                    buffer: [UNICODE_REPLACEMENT_CHAR as u16, 0],
                    len_characters: 1,
                    len_bytes: 1,
                },
            }
        } else {
            // Platform charset conversion is an external concern; report
            // the replacement character but the true byte width.
            let width = if self.is_dbcs_dual_byte_at(pos) { 2 } else { 1 };
            CharacterWideInfo {
                buffer: [UNICODE_REPLACEMENT_CHAR as u16, 0],
                len_characters: 1,
                len_bytes: width,
            }
        }
    }

    /// A break offset `<= length` in `text` suitable for line wrapping.
    ///
    /// Preference order: before a space or control byte; at a
    /// word/punctuation class transition; for UTF-8, before a whole
    /// grapheme cluster; failing all, the last whole-character boundary.
    pub fn safe_segment(&self, text: &[u8], length_segment: usize) -> usize {
        if text.is_empty() {
            return 0;
        }
        let family = self.code_page_family();
        let length_segment = length_segment.min(text.len() - 1);

        // Check space first as most written languages use spaces.
        let mut i = length_segment;
        while i > 0 {
            if is_break_space(text[i]) {
                return i;
            }
            i -= 1;
        }

        if family != EncodingFamily::Dbcs {
            // Backward iterate for UTF-8 and single-byte encodings to find
            // a word or punctuation boundary.
            let cc_prev = self.char_class.get_class(text[length_segment]);
            let mut last_punctuation_break = length_segment;
            let mut i = length_segment;
            while i > 0 {
                i -= 1;
                let cc = self.char_class.get_class(text[i]);
                if cc != cc_prev {
                    last_punctuation_break = i + 1;
                    break;
                }
            }

            if cc_prev >= CharClass::Punctuation && family != EncodingFamily::EightBit {
                // Go back over a potential grapheme cluster so combining
                // sequences stay whole.
                let bounded = &text[..(last_punctuation_break + UTF8_MAX_BYTES).min(text.len())];
                last_punctuation_break =
                    discard_last_combined_character(bounded, last_punctuation_break);
                if last_punctuation_break == length_segment {
                    // Discard trail bytes of a truncated last character.
                    let mut i = length_segment;
                    while i > 0 && utf8_is_trail_byte(text[i]) {
                        i -= 1;
                    }
                    last_punctuation_break = i;
                }
            }
            return last_punctuation_break;
        }

        // Forward iterate for DBCS to find a word or punctuation boundary.
        let mut last_punctuation_break = 0;
        let mut last_encoding_allowed_break = 0;
        let mut cc_prev = CharClass::Space;
        let mut j = 0;
        while j < length_segment {
            let ch = text[j];
            last_encoding_allowed_break = j;
            j += 1;

            let cc = if utf8_is_ascii(ch) {
                self.char_class.get_class(ch)
            } else {
                j += usize::from(self.is_dbcs_lead_byte(ch));
                CharClass::Word
            };
            if cc != cc_prev {
                cc_prev = cc;
                last_punctuation_break = last_encoding_allowed_break;
            }
        }
        if last_punctuation_break > 0 {
            last_punctuation_break
        } else {
            last_encoding_allowed_break
        }
    }

    // === mutation gateways ===

    fn modified_at(&mut self, pos: usize) {
        if self.end_styled > pos {
            self.end_styled = pos;
        }
    }

    fn truncate_undo_comments(&mut self) {
        let current = self.cb.undo_history().current();
        if let Some(view_state) = &mut self.view_state {
            view_state.truncate_undo(current);
        }
    }

    /// Install the insertion interceptor (see [`InsertCheck`]).
    pub fn set_insert_check(&mut self, check: Option<InsertCheck>) {
        self.insert_check = check;
    }

    /// Park per-view state on the document.
    pub fn set_view_state(&mut self, view_state: Option<Box<dyn ViewState>>) {
        self.view_state = view_state;
    }

    /// Delete `len` bytes at `pos`. Returns `false` when rejected
    /// (read-only, reentrant, or out of range).
    pub fn delete_chars(&mut self, pos: usize, len: usize) -> bool {
        if len == 0 || pos + len > self.length() {
            return false;
        }
        self.check_read_only();
        if self.entered_modification != 0 {
            return false;
        }
        self.entered_modification += 1;
        let mut result = false;
        if !self.cb.is_read_only() {
            if self.cb.is_collecting_undo() && self.cb.can_redo() {
                // Abandoning some undo actions so truncate any later
                // view snapshots.
                self.truncate_undo_comments();
            }
            self.notify_modified(DocModification::new(
                ModificationFlags::BEFORE_DELETE | ModificationFlags::USER,
                pos,
                len,
            ));
            let prev_lines_total = self.lines_total() as isize;
            let start_save_point = self.cb.is_save_point();
            if let Some((start_sequence, deleted, delta)) = self.cb.delete_chars(pos, len) {
                if start_save_point && self.cb.is_collecting_undo() {
                    self.notify_save_point(false);
                }
                self.sync_per_line(delta);
                if pos < self.length() || pos == 0 {
                    self.modified_at(pos);
                } else {
                    self.modified_at(pos - 1);
                }
                let mut flags = ModificationFlags::DELETE_TEXT | ModificationFlags::USER;
                if start_sequence {
                    flags |= ModificationFlags::START_ACTION;
                }
                let lines_added = self.lines_total() as isize - prev_lines_total;
                self.notify_modified(
                    DocModification::new(flags, pos, len)
                        .with_lines_added(lines_added)
                        .with_text(&deleted),
                );
                result = true;
            }
        }
        self.entered_modification -= 1;
        result
    }

    /// Insert bytes at `position`. Returns the number of bytes actually
    /// inserted (0 when rejected).
    pub fn insert_string(&mut self, position: usize, bytes: &[u8]) -> usize {
        if bytes.is_empty() || position > self.length() {
            return 0;
        }
        self.check_read_only(); // the handler may change the read-only state
        if self.cb.is_read_only() || self.entered_modification != 0 {
            return 0;
        }
        self.entered_modification += 1;

        // The interceptor may replace the insertion.
        self.pending_insertion = None;
        if let Some(mut check) = self.insert_check.take() {
            self.pending_insertion = check(position, bytes);
            self.insert_check = Some(check);
        }
        let replacement = self.pending_insertion.take();
        let ins: &[u8] = replacement.as_deref().unwrap_or(bytes);
        self.notify_modified(
            DocModification::new(ModificationFlags::INSERT_CHECK, position, ins.len())
                .with_text(ins),
        );

        if self.cb.is_collecting_undo() && self.cb.can_redo() {
            self.truncate_undo_comments();
        }
        self.notify_modified(
            DocModification::new(
                ModificationFlags::BEFORE_INSERT | ModificationFlags::USER,
                position,
                ins.len(),
            )
            .with_text(ins),
        );

        let prev_lines_total = self.lines_total() as isize;
        let start_save_point = self.cb.is_save_point();
        let inserted = match self.cb.insert_string(position, ins) {
            Some((start_sequence, delta)) => {
                if start_save_point && self.cb.is_collecting_undo() {
                    self.notify_save_point(false);
                }
                self.sync_per_line(delta);
                self.modified_at(position);
                let mut flags = ModificationFlags::INSERT_TEXT | ModificationFlags::USER;
                if start_sequence {
                    flags |= ModificationFlags::START_ACTION;
                }
                let lines_added = self.lines_total() as isize - prev_lines_total;
                self.notify_modified(
                    DocModification::new(flags, position, ins.len())
                        .with_lines_added(lines_added)
                        .with_text(ins),
                );
                ins.len()
            }
            None => 0,
        };
        self.entered_modification -= 1;
        inserted
    }

    /// Insert UTF-8 text at `position`.
    pub fn insert_text(&mut self, position: usize, text: &str) -> usize {
        self.insert_string(position, text.as_bytes())
    }

    /// Append bytes at the end of the document, reporting a status.
    pub fn add_data(&mut self, data: &[u8]) -> Status {
        let position = self.length();
        if self.insert_string(position, data) == data.len() {
            Status::Ok
        } else {
            Status::Failure
        }
    }

    /// Delete the whole character at `pos`.
    pub fn del_char(&mut self, pos: usize) -> bool {
        let (width, _) = self.len_char(pos);
        self.delete_chars(pos, width)
    }

    /// Delete the character before `pos`, honouring CR-LF pairs and
    /// multi-byte characters.
    pub fn del_char_back(&mut self, pos: usize) -> bool {
        if pos == 0 {
            false
        } else if pos >= 2 && self.is_crlf(pos - 2) {
            self.delete_chars(pos - 2, 2)
        } else if self.code_page_family() != EncodingFamily::EightBit {
            let start_char = self.next_position(pos, -1);
            self.delete_chars(start_char, pos - start_char)
        } else {
            self.delete_chars(pos - 1, 1)
        }
    }

    fn sync_per_line(&mut self, delta: LineDelta) {
        if delta.added > 0 {
            let count = delta.added as usize;
            self.markers.insert_lines(delta.first_line, count);
            self.levels.insert_lines(delta.first_line, count);
            self.states.insert_lines(delta.first_line, count);
            self.margins.insert_lines(delta.first_line, count);
            self.annotations.insert_lines(delta.first_line, count);
            self.eol_annotations.insert_lines(delta.first_line, count);
        } else if delta.added < 0 {
            for _ in 0..delta.added.unsigned_abs() {
                self.markers.remove_line(delta.first_line);
                self.levels.remove_line(delta.first_line);
                self.states.remove_line(delta.first_line);
                self.margins.remove_line(delta.first_line);
                self.annotations.remove_line(delta.first_line);
                self.eol_annotations.remove_line(delta.first_line);
            }
        }
    }

    // === undo / redo ===

    /// Whether undo actions are recorded.
    pub fn is_collecting_undo(&self) -> bool {
        self.cb.is_collecting_undo()
    }

    /// Turn undo recording on or off; turning it off drops the history.
    pub fn set_undo_collection(&mut self, collect: bool) {
        self.cb.set_undo_collection(collect);
    }

    /// Drop the whole undo history.
    pub fn delete_undo_history(&mut self) {
        self.cb.delete_undo_history();
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        self.cb.can_undo()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        self.cb.can_redo()
    }

    /// Open an explicit undo group; groups nest.
    pub fn begin_undo_action(&mut self) {
        self.cb.begin_undo_action();
    }

    /// Close an explicit undo group; the outermost close broadcasts a
    /// group-completed notification.
    pub fn end_undo_action(&mut self) {
        if self.cb.end_undo_action() {
            self.notify_group_completed();
        }
    }

    /// Nesting depth of explicit undo groups.
    pub fn undo_sequence_depth(&self) -> u32 {
        self.cb.undo_sequence_depth()
    }

    /// Record a container action carrying `token`; the application uses it
    /// to re-create non-text side effects on undo and redo.
    pub fn add_undo_action(&mut self, token: usize, may_coalesce: bool) {
        if self.cb.add_container_action(token, may_coalesce) {
            // A fresh group containing only this action.
            trace!(token, "container action recorded");
        }
    }

    /// Mark the present state as saved.
    pub fn set_save_point(&mut self) {
        self.cb.set_save_point();
        self.notify_save_point(true);
    }

    /// Whether the document is at its save point.
    pub fn is_save_point(&self) -> bool {
        self.cb.is_save_point()
    }

    /// Suppress save-point notifications until the matching end call.
    pub fn begin_delay_save_point(&mut self) {
        self.delay_save_point = Some(self.cb.is_save_point());
    }

    /// End save-point delay, emitting one notification when the state
    /// changed across the bracket.
    pub fn end_delay_save_point(&mut self) {
        if let Some(start_save_point) = self.delay_save_point.take() {
            let end_save_point = self.cb.is_save_point();
            if start_save_point != end_save_point {
                self.notify_save_point(end_save_point);
            }
        }
    }

    /// Broadcast the before-change notification for one undo/redo step;
    /// an unwound insertion deletes text and vice versa.
    fn notify_undo_redo_step(&mut self, action: &Action, base_flags: ModificationFlags) {
        let undoing = base_flags.contains(ModificationFlags::UNDO);
        let flags = match (action.at, undoing) {
            (ActionType::Remove, true) | (ActionType::Insert, false) => {
                ModificationFlags::BEFORE_INSERT | base_flags
            }
            (ActionType::Insert, true) | (ActionType::Remove, false) => {
                ModificationFlags::BEFORE_DELETE | base_flags
            }
            (ActionType::Container, _) => ModificationFlags::CONTAINER | base_flags,
        };
        let mut mh = DocModification::new(flags, action.position, action.len());
        if action.at == ActionType::Container {
            mh.position = 0;
            mh.length = 0;
            mh.token = action.position;
        } else {
            mh.text = Some(&action.data);
        }
        self.notify_modified(mh);
    }

    /// Undo one group of actions. Returns the position of the last text
    /// change, or `None` when nothing was undone.
    pub fn undo(&mut self) -> Option<usize> {
        let mut new_pos = None;
        self.check_read_only();
        if self.entered_modification == 0 && self.cb.is_collecting_undo() && self.cb.can_undo() {
            self.entered_modification += 1;
            if !self.cb.is_read_only() {
                let start_save_point = self.cb.is_save_point();
                let mut multi_line = false;
                let steps = self.cb.start_undo();
                let mut coalesced_remove = Range::default();
                for step in 0..steps {
                    let prev_lines_total = self.lines_total() as isize;
                    let action = self.cb.get_undo_step();
                    self.notify_undo_redo_step(&action, ModificationFlags::UNDO);
                    let delta = self.cb.perform_undo_step();
                    self.sync_per_line(delta);
                    if action.at != ActionType::Container {
                        self.modified_at(action.position);
                        new_pos = Some(action.position);
                    }

                    let mut mod_flags = ModificationFlags::UNDO;
                    // With undo, an insertion action becomes a deletion
                    // notification.
                    match action.at {
                        ActionType::Remove => {
                            mod_flags |= ModificationFlags::INSERT_TEXT;
                            if coalesced_remove.contains(action.position) {
                                coalesced_remove.end += action.len();
                                new_pos = Some(coalesced_remove.end);
                            } else {
                                coalesced_remove = Range {
                                    start: action.position,
                                    end: action.position + action.len(),
                                };
                                new_pos = Some(action.position + action.len());
                            }
                        }
                        ActionType::Insert => {
                            mod_flags |= ModificationFlags::DELETE_TEXT;
                            coalesced_remove = Range::default();
                        }
                        ActionType::Container => {
                            mod_flags |= ModificationFlags::CONTAINER;
                        }
                    }
                    if steps > 1 {
                        mod_flags |= ModificationFlags::MULTI_STEP_UNDO_REDO;
                    }
                    let lines_added = self.lines_total() as isize - prev_lines_total;
                    if lines_added != 0 {
                        multi_line = true;
                    }
                    if step == steps - 1 {
                        mod_flags |= ModificationFlags::LAST_STEP_IN_UNDO_REDO;
                        if multi_line {
                            mod_flags |= ModificationFlags::MULTILINE_UNDO_REDO;
                        }
                    }
                    let mut mh = DocModification::new(mod_flags, action.position, action.len())
                        .with_lines_added(lines_added);
                    if action.at == ActionType::Container {
                        mh.position = 0;
                        mh.length = 0;
                        mh.token = action.position;
                    } else {
                        mh.text = Some(&action.data);
                    }
                    self.notify_modified(mh);
                }

                let end_save_point = self.cb.is_save_point();
                if start_save_point != end_save_point {
                    self.notify_save_point(end_save_point);
                }
            }
            self.entered_modification -= 1;
        }
        new_pos
    }

    /// Redo one group of actions. Returns the position after the last
    /// text change, or `None` when nothing was redone.
    pub fn redo(&mut self) -> Option<usize> {
        let mut new_pos = None;
        self.check_read_only();
        if self.entered_modification == 0 && self.cb.is_collecting_undo() && self.cb.can_redo() {
            self.entered_modification += 1;
            if !self.cb.is_read_only() {
                let start_save_point = self.cb.is_save_point();
                let mut multi_line = false;
                let steps = self.cb.start_redo();
                for step in 0..steps {
                    let prev_lines_total = self.lines_total() as isize;
                    let action = self.cb.get_redo_step();
                    self.notify_undo_redo_step(&action, ModificationFlags::REDO);
                    let delta = self.cb.perform_redo_step();
                    self.sync_per_line(delta);
                    if action.at != ActionType::Container {
                        self.modified_at(action.position);
                        new_pos = Some(action.position);
                    }

                    let mut mod_flags = ModificationFlags::REDO;
                    match action.at {
                        ActionType::Insert => {
                            new_pos = Some(action.position + action.len());
                            mod_flags |= ModificationFlags::INSERT_TEXT;
                        }
                        ActionType::Remove => {
                            mod_flags |= ModificationFlags::DELETE_TEXT;
                        }
                        ActionType::Container => {
                            mod_flags |= ModificationFlags::CONTAINER;
                        }
                    }
                    if steps > 1 {
                        mod_flags |= ModificationFlags::MULTI_STEP_UNDO_REDO;
                    }
                    let lines_added = self.lines_total() as isize - prev_lines_total;
                    if lines_added != 0 {
                        multi_line = true;
                    }
                    if step == steps - 1 {
                        mod_flags |= ModificationFlags::LAST_STEP_IN_UNDO_REDO;
                        if multi_line {
                            mod_flags |= ModificationFlags::MULTILINE_UNDO_REDO;
                        }
                    }
                    let mut mh = DocModification::new(mod_flags, action.position, action.len())
                        .with_lines_added(lines_added);
                    if action.at == ActionType::Container {
                        mh.position = 0;
                        mh.length = 0;
                        mh.token = action.position;
                    } else {
                        mh.text = Some(&action.data);
                    }
                    self.notify_modified(mh);
                }

                let end_save_point = self.cb.is_save_point();
                if start_save_point != end_save_point {
                    self.notify_save_point(end_save_point);
                }
            }
            self.entered_modification -= 1;
        }
        new_pos
    }

    // === tentative undo layer ===

    /// Begin a speculative group of actions.
    pub fn tentative_start(&mut self) {
        self.cb.tentative_start();
    }

    /// Whether a speculative group is open.
    pub fn tentative_active(&self) -> bool {
        self.cb.tentative_active()
    }

    /// Keep the speculative actions as ordinary history.
    pub fn tentative_commit(&mut self) {
        self.cb.tentative_commit();
    }

    /// Roll back every action since the tentative mark, leaving no trace
    /// in the history.
    pub fn tentative_undo(&mut self) {
        if !self.tentative_active() {
            return;
        }
        self.check_read_only();
        if self.entered_modification == 0 {
            self.entered_modification += 1;
            if !self.cb.is_read_only() {
                let start_save_point = self.cb.is_save_point();
                let mut multi_line = false;
                let steps = self.cb.tentative_steps();
                for step in 0..steps {
                    let prev_lines_total = self.lines_total() as isize;
                    let action = self.cb.get_undo_step();
                    self.notify_undo_redo_step(&action, ModificationFlags::UNDO);
                    let delta = self.cb.perform_undo_step();
                    self.sync_per_line(delta);
                    if action.at != ActionType::Container {
                        self.modified_at(action.position);
                    }

                    let mut mod_flags = ModificationFlags::UNDO;
                    match action.at {
                        ActionType::Remove => mod_flags |= ModificationFlags::INSERT_TEXT,
                        ActionType::Insert => mod_flags |= ModificationFlags::DELETE_TEXT,
                        ActionType::Container => mod_flags |= ModificationFlags::CONTAINER,
                    }
                    if steps > 1 {
                        mod_flags |= ModificationFlags::MULTI_STEP_UNDO_REDO;
                    }
                    let lines_added = self.lines_total() as isize - prev_lines_total;
                    if lines_added != 0 {
                        multi_line = true;
                    }
                    if step == steps - 1 {
                        mod_flags |= ModificationFlags::LAST_STEP_IN_UNDO_REDO;
                        if multi_line {
                            mod_flags |= ModificationFlags::MULTILINE_UNDO_REDO;
                        }
                    }
                    let mut mh = DocModification::new(mod_flags, action.position, action.len())
                        .with_lines_added(lines_added);
                    if action.at != ActionType::Container {
                        mh.text = Some(&action.data);
                    }
                    self.notify_modified(mh);
                }

                let end_save_point = self.cb.is_save_point();
                if start_save_point != end_save_point {
                    self.notify_save_point(end_save_point);
                }

                self.cb.tentative_drop_rolled_back();
            }
            self.entered_modification -= 1;
        }
    }

    // === undo log introspection ===

    /// Number of recorded undo actions.
    pub fn undo_actions(&self) -> usize {
        self.cb.undo_history().actions_count()
    }

    /// Log index of the next action to replay.
    pub fn undo_current(&self) -> usize {
        self.cb.undo_history().current()
    }

    /// Move the replay position directly; the host keeps the text in sync.
    pub fn set_undo_current(&mut self, index: usize) {
        self.cb.undo_history_mut().set_current(index);
    }

    /// Log index of the clean state.
    pub fn undo_save_point(&self) -> Option<usize> {
        self.cb.undo_history().save_point_index()
    }

    /// Pin the clean state to a log index.
    pub fn set_undo_save_point(&mut self, index: Option<usize>) {
        self.cb.undo_history_mut().set_save_point_index(index);
    }

    /// Log index where the history detached from its persisted origin.
    pub fn undo_detach(&self) -> Option<usize> {
        self.cb.undo_history().detach_index()
    }

    /// Pin the detach index.
    pub fn set_undo_detach(&mut self, index: Option<usize>) {
        self.cb.undo_history_mut().set_detach_index(index);
    }

    /// Log index of the tentative mark.
    pub fn undo_tentative(&self) -> Option<usize> {
        self.cb.undo_history().tentative_index()
    }

    /// Pin the tentative mark.
    pub fn set_undo_tentative(&mut self, index: Option<usize>) {
        self.cb.undo_history_mut().set_tentative_index(index);
    }

    /// Kind of the action at log `index`.
    pub fn undo_action_type(&self, index: usize) -> Option<ActionType> {
        self.cb.undo_history().action_at(index).map(|a| a.at)
    }

    /// Position of the action at log `index`.
    pub fn undo_action_position(&self, index: usize) -> Option<usize> {
        self.cb.undo_history().action_at(index).map(|a| a.position)
    }

    /// Byte payload of the action at log `index`.
    pub fn undo_action_text(&self, index: usize) -> Option<&[u8]> {
        self.cb
            .undo_history()
            .action_at(index)
            .map(|a| a.data.as_slice())
    }

    /// Append a bare action record during history reconstruction.
    pub fn push_undo_action_type(&mut self, at: ActionType, position: usize) {
        self.cb.undo_history_mut().push_action_type(at, position);
    }

    /// Replace the byte payload of the most recently pushed action.
    pub fn change_last_undo_action_text(&mut self, data: &[u8]) {
        self.cb
            .undo_history_mut()
            .change_last_action_text(data.to_vec());
    }

    // === markers ===

    /// Marker bitmask of `line`.
    pub fn get_mark(&self, line: usize) -> u32 {
        self.markers.mark_value(line)
    }

    /// Next line at or after `line_start` whose markers intersect `mask`.
    pub fn marker_next(&self, line_start: usize, mask: u32) -> Option<usize> {
        self.markers.marker_next(line_start, mask)
    }

    /// Add marker `marker_num` to `line`; returns its handle.
    pub fn add_mark(&mut self, line: usize, marker_num: i32) -> Option<i32> {
        if line >= self.lines_total() {
            return None;
        }
        let handle = self.markers.add_mark(line, marker_num, self.lines_total());
        let mh = DocModification::new(ModificationFlags::CHANGE_MARKER, self.line_start(line), 0)
            .with_line(line);
        self.notify_modified(mh);
        Some(handle)
    }

    /// Add every marker of `value_set` to `line`.
    pub fn add_mark_set(&mut self, line: usize, value_set: u32) {
        if line >= self.lines_total() {
            return;
        }
        let mut m = value_set;
        let mut i = 0;
        while m != 0 {
            if m & 1 != 0 {
                self.markers.add_mark(line, i, self.lines_total());
            }
            i += 1;
            m >>= 1;
        }
        let mh = DocModification::new(ModificationFlags::CHANGE_MARKER, self.line_start(line), 0)
            .with_line(line);
        self.notify_modified(mh);
    }

    /// Delete one instance of marker `marker_num` from `line` (all
    /// markers when negative).
    pub fn delete_mark(&mut self, line: usize, marker_num: i32) {
        self.markers.delete_mark(line, marker_num, false);
        let mh = DocModification::new(ModificationFlags::CHANGE_MARKER, self.line_start(line), 0)
            .with_line(line);
        self.notify_modified(mh);
    }

    /// Delete the marker instance with `handle`.
    pub fn delete_mark_from_handle(&mut self, handle: i32) {
        self.markers.delete_mark_from_handle(handle);
        let mh = DocModification::new(ModificationFlags::CHANGE_MARKER, 0, 0);
        self.notify_modified(mh);
    }

    /// Delete marker `marker_num` from every line (all markers when
    /// negative).
    pub fn delete_all_marks(&mut self, marker_num: i32) {
        let mut some_changes = false;
        for line in 0..self.lines_total() {
            if self.markers.delete_mark(line, marker_num, true) {
                some_changes = true;
            }
        }
        if some_changes {
            let mh = DocModification::new(ModificationFlags::CHANGE_MARKER, 0, 0);
            self.notify_modified(mh);
        }
    }

    /// The line currently holding `handle`.
    pub fn line_from_handle(&self, handle: i32) -> Option<usize> {
        self.markers.line_from_handle(handle)
    }

    /// Marker number of the `which`-th marker on `line`.
    pub fn marker_number_from_line(&self, line: usize, which: usize) -> Option<i32> {
        self.markers.number_from_line(line, which)
    }

    /// Handle of the `which`-th marker on `line`.
    pub fn marker_handle_from_line(&self, line: usize, which: usize) -> Option<i32> {
        self.markers.handle_from_line(line, which)
    }

    // === fold levels ===

    /// Set the fold level of `line`; broadcasts a fold change when it
    /// differs. Returns the previous level.
    pub fn set_level(&mut self, line: usize, level: u32) -> u32 {
        let prev = self.levels.set_level(line, level, self.lines_total());
        if prev != level {
            let mut mh = DocModification::new(
                ModificationFlags::CHANGE_FOLD | ModificationFlags::CHANGE_MARKER,
                self.line_start(line),
                0,
            )
            .with_line(line);
            mh.fold_level_now = level;
            mh.fold_level_prev = prev;
            self.notify_modified(mh);
        }
        prev
    }

    /// The fold level of `line`.
    pub fn get_level(&self, line: usize) -> u32 {
        self.levels.get_level(line)
    }

    /// Drop all fold levels.
    pub fn clear_levels(&mut self) {
        self.levels.clear_levels();
    }

    /// The nearest ancestor header line of `line`.
    pub fn get_fold_parent(&self, line: usize) -> Option<usize> {
        self.levels.fold_parent(line)
    }

    /// The furthest descendant of the fold block headed at `line_parent`.
    ///
    /// `level` overrides the parent's own level when given. Styling is
    /// pulled two lines past the probe so the fold stays stable while a
    /// lexer is still working.
    pub fn get_last_child(
        &mut self,
        line_parent: usize,
        level: Option<u32>,
        last_line: Option<usize>,
    ) -> usize {
        let level_start = level_number(level.unwrap_or_else(|| self.get_level(line_parent)));
        let max_line = self.lines_total() - 1;
        let last_line = last_line.filter(|&l| l <= max_line).unwrap_or(max_line);
        let mut line_end_styled = self
            .line_from_position(self.end_styled)
            .saturating_sub(1);
        let mut line_max_subord = line_parent;
        while line_max_subord < max_line {
            if line_max_subord >= line_end_styled {
                // Two or more lines are required to make a stable fold for
                // most lexers.
                self.ensure_styled_to(self.line_start(line_max_subord + 3));
                line_end_styled = self
                    .line_from_position(self.end_styled)
                    .saturating_sub(1);
            }
            if !is_subordinate(level_start, self.get_level(line_max_subord + 1)) {
                break;
            }
            if line_max_subord >= last_line
                && !level_is_whitespace(self.get_level(line_max_subord))
            {
                break;
            }
            line_max_subord += 1;
        }
        if line_max_subord > line_parent
            && level_start > level_number(self.get_level(line_max_subord + 1))
            && level_is_whitespace(self.get_level(line_max_subord))
        {
            // Chewed up some whitespace that belongs to a parent, back off.
            line_max_subord -= 1;
        }
        line_max_subord
    }

    /// Compute the fold-block delimiters around `line`.
    pub fn get_highlight_delimiters(&mut self, line: usize, last_line: usize) -> HighlightDelimiter {
        let level = self.get_level(line);
        let look_last_line = line.max(last_line) + 1;

        let mut look_line = line as isize;
        let mut look_line_level = level;
        let mut look_line_level_num = level_number(look_line_level);
        while look_line > 0
            && (level_is_whitespace(look_line_level)
                || (level_is_header(look_line_level)
                    && look_line_level_num
                        >= level_number(self.get_level(look_line as usize + 1))))
        {
            look_line -= 1;
            look_line_level = self.get_level(look_line as usize);
            look_line_level_num = level_number(look_line_level);
        }

        let begin_fold_block = if level_is_header(look_line_level) {
            Some(look_line as usize)
        } else {
            self.get_fold_parent(look_line as usize)
        };
        let Some(mut begin_fold_block) = begin_fold_block else {
            return HighlightDelimiter::default();
        };

        let mut end_fold_block = self.get_last_child(begin_fold_block, None, Some(look_last_line));
        let mut first_changeable_line_before: Option<usize> = None;
        if end_fold_block < line {
            let mut look = begin_fold_block as isize - 1;
            while look >= 0 {
                let look_level = self.get_level(look as usize);
                if level_number(look_level) < LEVEL_BASE {
                    break;
                }
                if level_is_header(look_level)
                    && self.get_last_child(look as usize, Some(look_level), Some(look_last_line))
                        == line
                {
                    begin_fold_block = look as usize;
                    end_fold_block = line;
                    first_changeable_line_before = line.checked_sub(1);
                }
                if look > 0
                    && level_number(look_level) == LEVEL_BASE
                    && level_number(self.get_level(look as usize - 1)) > level_number(look_level)
                {
                    break;
                }
                look -= 1;
            }
        }
        if first_changeable_line_before.is_none() {
            let mut look = line as isize - 1;
            while look >= begin_fold_block as isize {
                let look_level = self.get_level(look as usize);
                if level_is_whitespace(look_level)
                    || level_number(look_level) > level_number(level)
                {
                    first_changeable_line_before = Some(look as usize);
                    break;
                }
                look -= 1;
            }
        }
        if first_changeable_line_before.is_none() {
            first_changeable_line_before = begin_fold_block.checked_sub(1);
        }

        let mut first_changeable_line_after: Option<usize> = None;
        let mut look = line + 1;
        while look <= end_fold_block {
            let look_level = self.get_level(look);
            if level_is_header(look_level)
                && level_number(look_level) < level_number(self.get_level(look + 1))
            {
                first_changeable_line_after = Some(look);
                break;
            }
            look += 1;
        }
        if first_changeable_line_after.is_none() {
            first_changeable_line_after = Some(end_fold_block + 1);
        }

        HighlightDelimiter {
            begin_fold_block: Some(begin_fold_block),
            end_fold_block: Some(end_fold_block),
            first_changeable_line_before,
            first_changeable_line_after,
        }
    }

    // === line state ===

    /// Set the lexer state of `line`; broadcasts when it changed.
    /// Returns the previous state.
    pub fn set_line_state(&mut self, line: usize, state: i32) -> i32 {
        let state_previous = self.states.set_line_state(line, state, self.lines_total());
        if state != state_previous {
            let mh =
                DocModification::new(ModificationFlags::CHANGE_LINE_STATE, self.line_start(line), 0)
                    .with_line(line);
            self.notify_modified(mh);
        }
        state_previous
    }

    /// The lexer state of `line`.
    pub fn get_line_state(&self, line: usize) -> i32 {
        self.states.get_line_state(line)
    }

    /// One past the highest line holding any lexer state.
    pub fn get_max_line_state(&self) -> usize {
        self.states.max_line_state()
    }

    /// Broadcast that the lexer changed internal state over a range.
    pub fn change_lexer_state(&mut self, start: usize, end: usize) {
        let mh = DocModification::new(
            ModificationFlags::LEXER_STATE,
            start,
            end.saturating_sub(start),
        );
        self.notify_modified(mh);
    }

    // === margin text / annotations / EOL annotations ===

    /// Margin text of `line`.
    pub fn margin_text(&self, line: usize) -> Option<&str> {
        self.margins.text(line)
    }

    /// The margin annotation store (single style, per-byte styles, line
    /// counts).
    pub fn margins(&self) -> &LineAnnotations {
        &self.margins
    }

    /// Set or clear the margin text of `line`.
    pub fn margin_set_text(&mut self, line: usize, text: Option<&str>) {
        self.margins.set_text(line, text);
        let mh = DocModification::new(ModificationFlags::CHANGE_MARGIN, self.line_start(line), 0)
            .with_line(line);
        self.notify_modified(mh);
    }

    /// Set the single style of `line`'s margin text.
    pub fn margin_set_style(&mut self, line: usize, style: u8) {
        self.margins.set_style(line, style);
        let mh = DocModification::new(ModificationFlags::CHANGE_MARGIN, self.line_start(line), 0)
            .with_line(line);
        self.notify_modified(mh);
    }

    /// Set per-byte styles of `line`'s margin text.
    pub fn margin_set_styles(&mut self, line: usize, styles: &[u8]) {
        self.margins.set_styles(line, styles);
        let mh = DocModification::new(ModificationFlags::CHANGE_MARGIN, self.line_start(line), 0)
            .with_line(line);
        self.notify_modified(mh);
    }

    /// Clear every margin text.
    pub fn margin_clear_all(&mut self) {
        for line in 0..self.lines_total() {
            self.margin_set_text(line, None);
        }
        self.margins.clear_all();
    }

    /// Annotation text of `line`.
    pub fn annotation_text(&self, line: usize) -> Option<&str> {
        self.annotations.text(line)
    }

    /// The above-line annotation store.
    pub fn annotations(&self) -> &LineAnnotations {
        &self.annotations
    }

    /// Display lines occupied by `line`'s annotation.
    pub fn annotation_lines(&self, line: usize) -> usize {
        self.annotations.lines(line)
    }

    /// Set or clear the annotation of `line`, reporting the display-line
    /// delta to watchers.
    pub fn annotation_set_text(&mut self, line: usize, text: Option<&str>) {
        if line >= self.lines_total() {
            return;
        }
        let lines_before = self.annotation_lines(line) as isize;
        self.annotations.set_text(line, text);
        let lines_after = self.annotation_lines(line) as isize;
        let mut mh =
            DocModification::new(ModificationFlags::CHANGE_ANNOTATION, self.line_start(line), 0)
                .with_line(line);
        mh.annotation_lines_added = lines_after - lines_before;
        self.notify_modified(mh);
    }

    /// Set the single style of `line`'s annotation.
    pub fn annotation_set_style(&mut self, line: usize, style: u8) {
        if line >= self.lines_total() {
            return;
        }
        self.annotations.set_style(line, style);
        let mh =
            DocModification::new(ModificationFlags::CHANGE_ANNOTATION, self.line_start(line), 0)
                .with_line(line);
        self.notify_modified(mh);
    }

    /// Set per-byte styles of `line`'s annotation.
    pub fn annotation_set_styles(&mut self, line: usize, styles: &[u8]) {
        if line < self.lines_total() {
            self.annotations.set_styles(line, styles);
        }
    }

    /// Clear every annotation.
    pub fn annotation_clear_all(&mut self) {
        if self.annotations.empty() {
            return;
        }
        for line in 0..self.lines_total() {
            self.annotation_set_text(line, None);
        }
        self.annotations.clear_all();
    }

    /// End-of-line annotation text of `line`.
    pub fn eol_annotation_text(&self, line: usize) -> Option<&str> {
        self.eol_annotations.text(line)
    }

    /// The end-of-line annotation store.
    pub fn eol_annotations(&self) -> &LineAnnotations {
        &self.eol_annotations
    }

    /// Set or clear the end-of-line annotation of `line`.
    pub fn eol_annotation_set_text(&mut self, line: usize, text: Option<&str>) {
        if line >= self.lines_total() {
            return;
        }
        self.eol_annotations.set_text(line, text);
        let mh = DocModification::new(
            ModificationFlags::CHANGE_EOL_ANNOTATION,
            self.line_start(line),
            0,
        )
        .with_line(line);
        self.notify_modified(mh);
    }

    /// Set the single style of `line`'s end-of-line annotation.
    pub fn eol_annotation_set_style(&mut self, line: usize, style: u8) {
        if line >= self.lines_total() {
            return;
        }
        self.eol_annotations.set_style(line, style);
        let mh = DocModification::new(
            ModificationFlags::CHANGE_EOL_ANNOTATION,
            self.line_start(line),
            0,
        )
        .with_line(line);
        self.notify_modified(mh);
    }

    /// Clear every end-of-line annotation.
    pub fn eol_annotation_clear_all(&mut self) {
        if self.eol_annotations.empty() {
            return;
        }
        for line in 0..self.lines_total() {
            self.eol_annotation_set_text(line, None);
        }
        self.eol_annotations.clear_all();
    }

    // === decorations ===

    /// Select the indicator subsequent fills write to.
    pub fn decoration_set_current_indicator(&mut self, indicator: i32) {
        self.decorations.set_current_indicator(indicator);
    }

    /// Set the value subsequent fills write.
    pub fn decoration_set_current_value(&mut self, value: i32) {
        self.decorations.set_current_value(value);
    }

    /// Fill a byte range on the current indicator, broadcasting the
    /// changed extent.
    pub fn decoration_fill_range(
        &mut self,
        position: usize,
        value: i32,
        fill_length: usize,
    ) -> FillResult {
        let fr = self.decorations.fill_range(position, value, fill_length);
        if fr.changed {
            let mh = DocModification::new(
                ModificationFlags::CHANGE_INDICATOR | ModificationFlags::USER,
                fr.position,
                fr.fill_length,
            );
            self.notify_modified(mh);
        }
        fr
    }

    /// Value of `indicator` at `pos`.
    pub fn decoration_value_at(&self, indicator: i32, pos: usize) -> i32 {
        self.decorations.value_at(indicator, pos)
    }

    /// Start of the `indicator` run containing `pos`.
    pub fn decoration_start(&self, indicator: i32, pos: usize) -> usize {
        self.decorations.start(indicator, pos)
    }

    /// End of the `indicator` run containing `pos`.
    pub fn decoration_end(&self, indicator: i32, pos: usize) -> usize {
        self.decorations.end(indicator, pos)
    }

    /// Indicators currently holding any range.
    pub fn decoration_indicators(&self) -> Vec<i32> {
        self.decorations.active_indicators()
    }

    // === character classes ===

    /// Reset the byte classification table to its defaults.
    pub fn set_default_char_classes(&mut self, include_word_class: bool) {
        self.char_class.set_default_char_classes(include_word_class);
    }

    /// Override the class of the given bytes.
    pub fn set_char_classes(&mut self, chars: &[u8], new_class: CharClass) {
        self.char_class.set_char_classes(chars, new_class);
    }

    /// All bytes holding `class`.
    pub fn get_chars_of_class(&self, class: CharClass) -> Vec<u8> {
        self.char_class.chars_of_class(class)
    }

    /// The classifier itself (used by the regex engine).
    pub fn char_classify(&self) -> &CharClassify {
        &self.char_class
    }

    /// Classify a character value the way word navigation does.
    pub fn word_character_class(&self, ch: u32) -> CharClass {
        if self.code_page != 0 && !is_ascii_character(ch) {
            return match self.code_page_family() {
                EncodingFamily::Unicode => CharClassify::classify_character(ch),
                EncodingFamily::Dbcs => {
                    if ch > 0xFF {
                        CharClass::CjkWord
                    } else {
                        self.char_class.get_class(ch as u8)
                    }
                }
                EncodingFamily::EightBit => self.char_class.get_class(ch as u8),
            };
        }
        self.char_class.get_class(ch as u8)
    }

    // === words ===

    /// Extend from `pos` to a word edge. With `only_word_characters`
    /// false, extends through any same-class run.
    pub fn extend_word_select(
        &self,
        mut pos: usize,
        delta: isize,
        only_word_characters: bool,
    ) -> usize {
        let mut cc_start = CharClass::Word;
        if delta < 0 {
            if pos > 0 {
                let ce = self.character_before(pos);
                let ce_start = self.word_character_class(ce.character);
                if !only_word_characters
                    || ce_start == cc_start
                    || ce_start == CharClass::CjkWord
                {
                    cc_start = ce_start;
                    pos -= ce.width_bytes;
                } else {
                    return self.move_position_outside_char(pos, delta, true);
                }
            }
            while pos > 0 {
                let ce = self.character_before(pos);
                if self.word_character_class(ce.character) != cc_start {
                    break;
                }
                pos -= ce.width_bytes;
            }
        } else {
            if pos < self.length() {
                let ce = self.character_after(pos);
                let ce_start = self.word_character_class(ce.character);
                if !only_word_characters
                    || ce_start == cc_start
                    || ce_start == CharClass::CjkWord
                {
                    cc_start = ce_start;
                    pos += ce.width_bytes;
                } else {
                    return self.move_position_outside_char(pos, delta, true);
                }
            }
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != cc_start {
                    break;
                }
                pos += ce.width_bytes;
            }
        }
        self.move_position_outside_char(pos, delta, true)
    }

    /// Move to the start of the next word in the direction of `delta`.
    pub fn next_word_start(&self, mut pos: usize, delta: isize) -> usize {
        if delta < 0 {
            while pos > 0 {
                let ce = self.character_before(pos);
                if self.word_character_class(ce.character) != CharClass::Space {
                    break;
                }
                pos -= ce.width_bytes;
            }
            if pos > 0 {
                let cc_start = self.word_character_class(self.character_before(pos).character);
                while pos > 0 {
                    let ce = self.character_before(pos);
                    if self.word_character_class(ce.character) != cc_start {
                        break;
                    }
                    pos -= ce.width_bytes;
                }
            }
        } else {
            let cc_start = self.word_character_class(self.character_after(pos).character);
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != cc_start {
                    break;
                }
                pos += ce.width_bytes;
            }
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != CharClass::Space {
                    break;
                }
                pos += ce.width_bytes;
            }
        }
        pos
    }

    /// Move to the end of the next word in the direction of `delta`.
    pub fn next_word_end(&self, mut pos: usize, delta: isize) -> usize {
        if delta < 0 {
            if pos > 0 {
                let cc_start = self.word_character_class(self.character_before(pos).character);
                if cc_start != CharClass::Space {
                    while pos > 0 {
                        let ce = self.character_before(pos);
                        if self.word_character_class(ce.character) != cc_start {
                            break;
                        }
                        pos -= ce.width_bytes;
                    }
                }
                while pos > 0 {
                    let ce = self.character_before(pos);
                    if self.word_character_class(ce.character) != CharClass::Space {
                        break;
                    }
                    pos -= ce.width_bytes;
                }
            }
        } else {
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != CharClass::Space {
                    break;
                }
                pos += ce.width_bytes;
            }
            if pos < self.length() {
                let cc_start = self.word_character_class(self.character_after(pos).character);
                while pos < self.length() {
                    let ce = self.character_after(pos);
                    if self.word_character_class(ce.character) != cc_start {
                        break;
                    }
                    pos += ce.width_bytes;
                }
            }
        }
        pos
    }

    /// Whether the character at `pos` starts a word: word or punctuation
    /// class, with a different class before it.
    pub fn is_word_start_at(&self, pos: usize) -> bool {
        if pos >= self.length() {
            return false;
        }
        let cc_pos = self.word_character_class(self.character_after(pos).character);
        // At the start of the document, treat as if a space came before.
        let cc_prev = if pos > 0 {
            self.word_character_class(self.character_before(pos).character)
        } else {
            CharClass::Space
        };
        is_word_edge(cc_pos, cc_prev)
    }

    /// Whether the character before `pos` ends a word.
    pub fn is_word_end_at(&self, pos: usize) -> bool {
        if pos == 0 {
            return false;
        }
        if pos > self.length() {
            return true;
        }
        // At the end of the document, treat as if a space came after.
        let cc_pos = if pos < self.length() {
            self.word_character_class(self.character_after(pos).character)
        } else {
            CharClass::Space
        };
        let cc_prev = self.word_character_class(self.character_before(pos).character);
        is_word_edge(cc_prev, cc_pos)
    }

    /// Whether `[start, end)` has word edges at both ends.
    pub fn is_word_at(&self, start: usize, end: usize) -> bool {
        start < end && self.is_word_start_at(start) && self.is_word_end_at(end)
    }

    fn matches_word_options(&self, word: bool, word_start: bool, pos: usize, length: usize) -> bool {
        (!word && !word_start)
            || (word && self.is_word_at(pos, pos + length))
            || (word_start && self.is_word_start_at(pos))
    }

    /// Whether `ch` separates identifier parts (an underscore-like word
    /// punctuation byte).
    pub fn is_word_part_separator(&self, ch: u32) -> bool {
        ch < 0x80
            && self.char_class.get_class(ch as u8) == CharClass::Word
            && is_ascii_punctuation(ch)
    }

    /// Move left to the previous identifier-part boundary: camel-case
    /// transitions, digit runs, non-ASCII runs, underscores.
    pub fn word_part_left(&self, mut pos: usize) -> usize {
        if pos == 0 {
            return pos;
        }
        pos -= self.character_before(pos).width_bytes;
        let mut ce_start = self.character_after(pos);
        if self.is_word_part_separator(ce_start.character) {
            while pos > 0 && self.is_word_part_separator(self.character_after(pos).character) {
                pos -= self.character_before(pos).width_bytes;
            }
        }
        if pos > 0 {
            ce_start = self.character_after(pos);
            pos -= self.character_before(pos).width_bytes;
            if !is_ascii_character(ce_start.character) {
                while pos > 0 && !is_ascii_character(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes;
                }
                if is_ascii_character(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes;
                }
            } else if is_lower_case(ce_start.character) {
                while pos > 0 && is_lower_case(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes;
                }
                let ce = self.character_after(pos);
                if !is_upper_case(ce.character) && !is_lower_case(ce.character) {
                    pos += self.character_after(pos).width_bytes;
                }
            } else if is_upper_case(ce_start.character) {
                while pos > 0 && is_upper_case(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes;
                }
                if !is_upper_case(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes;
                }
            } else if is_a_digit(ce_start.character) {
                while pos > 0 && is_a_digit(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes;
                }
                if !is_a_digit(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes;
                }
            } else if is_graphic(ce_start.character) {
                while pos > 0 && is_ascii_punctuation(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes;
                }
                if !is_ascii_punctuation(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes;
                }
            } else if is_space_char(ce_start.character) {
                while pos > 0 && is_space_char(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes;
                }
                if !is_space_char(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes;
                }
            } else {
                pos += self.character_after(pos).width_bytes;
            }
        }
        pos
    }

    /// Move right to the next identifier-part boundary.
    pub fn word_part_right(&self, mut pos: usize) -> usize {
        let length = self.length();
        let mut ce_start = self.character_after(pos);
        while pos < length && self.is_word_part_separator(ce_start.character) {
            pos += ce_start.width_bytes;
            ce_start = self.character_after(pos);
        }
        if !is_ascii_character(ce_start.character) && pos < length {
            while pos < length && !is_ascii_character(ce_start.character) {
                pos += ce_start.width_bytes;
                ce_start = self.character_after(pos);
            }
        } else if is_lower_case(ce_start.character) {
            while pos < length && is_lower_case(ce_start.character) {
                pos += ce_start.width_bytes;
                ce_start = self.character_after(pos);
            }
        } else if is_upper_case(ce_start.character) {
            let ce_next = self.character_after(pos + ce_start.width_bytes);
            if is_lower_case(ce_next.character) {
                pos += ce_start.width_bytes;
                ce_start = ce_next;
                while pos < length && is_lower_case(ce_start.character) {
                    pos += ce_start.width_bytes;
                    ce_start = self.character_after(pos);
                }
            } else {
                while pos < length && is_upper_case(ce_start.character) {
                    pos += ce_start.width_bytes;
                    ce_start = self.character_after(pos);
                }
            }
            if is_lower_case(ce_start.character) {
                let ce_prev = self.character_before(pos);
                if is_upper_case(ce_prev.character) {
                    pos -= ce_prev.width_bytes;
                }
            }
        } else if is_a_digit(ce_start.character) {
            while pos < length && is_a_digit(ce_start.character) {
                pos += ce_start.width_bytes;
                ce_start = self.character_after(pos);
            }
        } else if is_graphic(ce_start.character) {
            while pos < length && is_ascii_punctuation(ce_start.character) {
                pos += ce_start.width_bytes;
                ce_start = self.character_after(pos);
            }
        } else if is_space_char(ce_start.character) {
            while pos < length && is_space_char(ce_start.character) {
                pos += ce_start.width_bytes;
                ce_start = self.character_after(pos);
            }
        } else {
            pos += ce_start.width_bytes;
        }
        pos
    }

    // === paragraphs ===

    /// Whether `line` holds only blanks.
    pub fn is_white_line(&self, line: usize) -> bool {
        let mut current = self.line_start(line);
        let end_line = self.line_end(line);
        while current < end_line {
            if !is_space_or_tab(self.cb.char_at(current)) {
                return false;
            }
            current += 1;
        }
        true
    }

    /// Start of the previous paragraph (runs of blank lines separate
    /// paragraphs).
    pub fn para_up(&self, pos: usize) -> usize {
        let mut line = self.line_from_position(pos) as isize;
        let start = self.line_start(line as usize);
        if pos == start {
            line -= 1;
        }
        while line >= 0 && self.is_white_line(line as usize) {
            line -= 1;
        }
        while line >= 0 && !self.is_white_line(line as usize) {
            line -= 1;
        }
        line += 1;
        self.line_start(line as usize)
    }

    /// Start of the next paragraph.
    pub fn para_down(&self, pos: usize) -> usize {
        let max_line = self.lines_total();
        let mut line = self.line_from_position(pos);
        while line < max_line && !self.is_white_line(line) {
            line += 1;
        }
        while line < max_line && self.is_white_line(line) {
            line += 1;
        }
        if line < max_line {
            self.line_start(line)
        } else {
            self.line_end(line - 1)
        }
    }

    // === indentation and columns ===

    /// Visual indent of `line`, tabs expanded by the tab width.
    pub fn get_line_indentation(&self, line: usize) -> usize {
        let mut indent = 0;
        if line < self.lines_total() {
            let line_start = self.line_start(line);
            let length = self.length();
            for i in line_start..length {
                match self.cb.char_at(i) {
                    b' ' => indent += 1,
                    b'\t' => indent = next_tab(indent, self.tab_in_chars),
                    _ => return indent,
                }
            }
        }
        indent
    }

    /// Rebuild the leading whitespace of `line` to `indent` columns, as
    /// tabs plus residual spaces when tabs are in use. Returns the
    /// position after the new indentation.
    pub fn set_line_indentation(&mut self, line: usize, indent: isize) -> usize {
        let indent_of_line = self.get_line_indentation(line);
        let indent = indent.max(0) as usize;
        if indent == indent_of_line {
            return self.get_line_indent_position(line);
        }
        let mut linebuf = Vec::new();
        let mut remaining = indent;
        if self.use_tabs {
            let count = remaining / self.tab_in_chars;
            remaining %= self.tab_in_chars;
            linebuf.extend(std::iter::repeat_n(b'\t', count));
        }
        linebuf.extend(std::iter::repeat_n(b' ', remaining));
        let this_line_start = self.line_start(line);
        let indent_pos = self.get_line_indent_position(line);
        self.begin_undo_action();
        self.delete_chars(this_line_start, indent_pos - this_line_start);
        let inserted = self.insert_string(this_line_start, &linebuf);
        self.end_undo_action();
        this_line_start + inserted
    }

    /// Position just past the leading whitespace of `line`.
    pub fn get_line_indent_position(&self, line: usize) -> usize {
        let mut pos = self.line_start(line);
        let length = self.length();
        while pos < length && is_space_or_tab(self.cb.char_at(pos)) {
            pos += 1;
        }
        pos
    }

    /// Visual column of `pos` within its line.
    pub fn get_column(&self, pos: usize) -> usize {
        let mut column = 0;
        let line = self.line_from_position(pos);
        if line < self.lines_total() {
            let mut i = self.line_start(line);
            while i < pos {
                let ch = self.cb.char_at(i);
                match ch {
                    b'\t' => {
                        column = next_tab(column, self.tab_in_chars);
                        i += 1;
                    }
                    b'\r' | b'\n' => return column,
                    _ if utf8_is_ascii(ch) => {
                        column += 1;
                        i += 1;
                    }
                    _ if i >= self.length() => return column,
                    _ => {
                        column += 1;
                        i = self.next_position(i, 1);
                    }
                }
            }
        }
        column
    }

    /// Number of whole characters in `[start_pos, end_pos)`.
    pub fn count_characters(&self, start_pos: usize, end_pos: usize) -> usize {
        let start_pos = self.move_position_outside_char(start_pos, 1, false);
        let end_pos = self.move_position_outside_char(end_pos, -1, false);
        let mut count = 0;
        let mut i = start_pos;
        while i < end_pos {
            count += 1;
            i = self.next_position(i, 1);
        }
        count
    }

    /// Characters and the final visual column over `[start_pos, end_pos)`,
    /// continuing from the given starting totals.
    pub fn count_characters_and_columns(
        &self,
        start_pos: usize,
        end_pos: usize,
        mut count: usize,
        mut column: usize,
    ) -> (usize, usize) {
        let mut i = start_pos;
        while i < end_pos {
            let ch = self.cb.char_at(i);
            if ch == b'\t' {
                column = next_tab(column, self.tab_in_chars);
                i += 1;
            } else if utf8_is_ascii(ch) {
                column += 1;
                i += 1;
            } else {
                column += 1;
                i = self.next_position(i, 1);
            }
            count += 1;
        }
        (count, column)
    }

    /// Number of UTF-16 code units in `[start_pos, end_pos)`.
    pub fn count_utf16(&self, start_pos: usize, end_pos: usize) -> usize {
        let start_pos = self.move_position_outside_char(start_pos, 1, false);
        let end_pos = self.move_position_outside_char(end_pos, -1, false);
        let mut count = 0;
        let mut i = start_pos;
        while i < end_pos {
            count += 1;
            let next = self.next_position(i, 1);
            if next - i > 3 {
                count += 1;
            }
            i = next;
        }
        count
    }

    /// Byte position of visual `column` on `line`.
    pub fn find_column(&self, line: usize, column: usize) -> usize {
        let mut position = self.line_start(line);
        if line < self.lines_total() {
            let mut column_current = 0;
            while column_current < column && position < self.length() {
                let ch = self.cb.char_at(position);
                match ch {
                    b'\t' => {
                        column_current = next_tab(column_current, self.tab_in_chars);
                        if column_current > column {
                            return position;
                        }
                        position += 1;
                    }
                    b'\r' | b'\n' => return position,
                    _ if utf8_is_ascii(ch) => {
                        column_current += 1;
                        position += 1;
                    }
                    _ => {
                        column_current += 1;
                        position = self.next_position(position, 1);
                    }
                }
            }
        }
        position
    }

    /// Indent (or dedent) every line from `line_top` through
    /// `line_bottom` by one indent level.
    pub fn indent(&mut self, forwards: bool, line_bottom: usize, line_top: usize) {
        for line in (line_top..=line_bottom).rev() {
            let indent_of_line = self.get_line_indentation(line) as isize;
            let step = self.indent_size() as isize;
            if forwards {
                if self.line_start(line) < self.line_end(line) {
                    self.set_line_indentation(line, indent_of_line + step);
                }
            } else {
                self.set_line_indentation(line, indent_of_line - step);
            }
        }
    }

    // === line ends ===

    /// Convert the line ends in `s` to `eol_mode_wanted`. Stops at a NUL
    /// byte.
    pub fn transform_line_ends(s: &[u8], eol_mode_wanted: EndOfLine) -> Vec<u8> {
        let mut dest = Vec::with_capacity(s.len());
        let eol = eol_mode_wanted.as_bytes();
        let mut i = 0;
        while i < s.len() && s[i] != 0 {
            if is_eol_byte(s[i]) {
                dest.extend_from_slice(eol);
                if s[i] == b'\r' && i + 1 < s.len() && s[i + 1] == b'\n' {
                    i += 1;
                }
            } else {
                dest.push(s[i]);
            }
            i += 1;
        }
        dest
    }

    /// Convert every line end in the document to `eol_mode_set`, as one
    /// undo group.
    pub fn convert_line_ends(&mut self, eol_mode_set: EndOfLine) {
        self.begin_undo_action();
        let mut pos = 0usize;
        while pos < self.length() {
            let ch = self.cb.char_at(pos);
            if ch == b'\r' {
                if self.cb.char_at(pos + 1) == b'\n' {
                    match eol_mode_set {
                        EndOfLine::Cr => {
                            self.delete_chars(pos + 1, 1); // delete the LF
                        }
                        EndOfLine::Lf => {
                            self.delete_chars(pos, 1); // delete the CR
                        }
                        EndOfLine::CrLf => {
                            pos += 1;
                        }
                    }
                } else {
                    match eol_mode_set {
                        EndOfLine::CrLf => {
                            pos += self.insert_string(pos + 1, b"\n");
                        }
                        EndOfLine::Lf => {
                            pos += self.insert_string(pos, b"\n");
                            self.delete_chars(pos, 1); // delete the CR
                            pos -= 1;
                        }
                        EndOfLine::Cr => {}
                    }
                }
            } else if ch == b'\n' {
                match eol_mode_set {
                    EndOfLine::CrLf => {
                        pos += self.insert_string(pos, b"\r");
                    }
                    EndOfLine::Cr => {
                        pos += self.insert_string(pos, b"\r");
                        self.delete_chars(pos, 1); // delete the LF
                        pos -= 1;
                    }
                    EndOfLine::Lf => {}
                }
            }
            pos += 1;
        }
        self.end_undo_action();
    }

    // === search ===

    /// Install a case folder; `None` reverts to the per-encoding default.
    pub fn set_case_folder(&mut self, folder: Option<Box<dyn CaseFolder>>) {
        self.case_folder = folder;
    }

    /// Whether a case folder is installed.
    pub fn has_case_folder(&self) -> bool {
        self.case_folder.is_some()
    }

    fn ensure_case_folder(&mut self) {
        if self.case_folder.is_none() {
            self.case_folder = Some(match self.code_page_family() {
                EncodingFamily::Unicode => Box::new(CaseFolderUnicode),
                _ => Box::new(CaseFolderTable::new()),
            });
        }
    }

    /// Install a regex engine; `None` reverts to the built-in.
    pub fn set_regex_searcher(&mut self, regex: Option<Box<dyn RegexSearcher>>) {
        self.regex = regex;
    }

    /// Find `needle` between `min_pos` and `max_pos`; the direction is the
    /// sign of `max_pos - min_pos`. Returns the match position and length,
    /// `Ok(None)` when absent, or an error for a bad regex pattern.
    pub fn find_text(
        &mut self,
        min_pos: usize,
        max_pos: usize,
        needle: &[u8],
        flags: FindOption,
    ) -> Result<Option<(usize, usize)>, RegexError> {
        if needle.is_empty() {
            return Ok(Some((min_pos, 0)));
        }
        if flags.contains(FindOption::REGEXP) {
            let mut regex = self
                .regex
                .take()
                .unwrap_or_else(|| Box::new(BuiltinRegex::new()));
            let mut length = needle.len();
            let result = regex.find_text(self, min_pos, max_pos, needle, flags, &mut length);
            self.regex = Some(regex);
            return match result {
                Ok(Some(pos)) => Ok(Some((pos, length))),
                Ok(None) => Ok(None),
                Err(err) => {
                    debug!(error = %err.message, "regex compile failed");
                    Err(err)
                }
            };
        }

        let case_sensitive = flags.contains(FindOption::MATCH_CASE);
        let word = flags.contains(FindOption::WHOLE_WORD);
        let word_start = flags.contains(FindOption::WORD_START);
        if !case_sensitive {
            self.ensure_case_folder();
        }

        let forward = max_pos >= min_pos;
        let increment: isize = if forward { 1 } else { -1 };

        // Range endpoints should not be inside multi-byte characters, but
        // just in case, move them.
        let start_pos = self.move_position_outside_char(min_pos, increment, false);
        let end_pos = self.move_position_outside_char(max_pos, increment, false);
        let length_find = needle.len();
        let limit_pos = start_pos.max(end_pos);

        if case_sensitive {
            Ok(self
                .find_bytes_case_sensitive(
                    start_pos, end_pos, needle, forward, word, word_start, limit_pos,
                )
                .map(|pos| (pos, length_find)))
        } else {
            Ok(self.find_bytes_folded(
                start_pos, end_pos, needle, forward, word, word_start, limit_pos,
            ))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn find_bytes_case_sensitive(
        &self,
        start_pos: usize,
        end_pos: usize,
        needle: &[u8],
        forward: bool,
        word: bool,
        word_start: bool,
        limit_pos: usize,
    ) -> Option<usize> {
        let length_find = needle.len();
        let increment: isize = if forward { 1 } else { -1 };
        let shift_table = (length_find != 1).then(|| build_shift_table(needle, increment));

        let end_search: isize = if start_pos <= end_pos {
            end_pos as isize - length_find as isize + 1
        } else {
            end_pos as isize
        };
        // skip == 1 exactly for a forward single-byte scan.
        let skip: isize = if forward { length_find as isize } else { -1 };
        let safe_char = if skip == 1 {
            self.forward_safe_char
        } else {
            self.backward_safe_char
        };
        let char_start_search = needle[0];

        let mut pos: isize = if forward {
            start_pos as isize
        } else {
            self.move_position_outside_char(start_pos.saturating_sub(length_find), -1, false)
                as isize
        };

        loop {
            let in_range = if forward {
                pos < end_search
            } else {
                pos >= end_search && pos >= 0
            };
            if !in_range {
                break;
            }
            let upos = pos as usize;
            let lead_byte = self.cb.char_at(upos);
            if char_start_search == lead_byte {
                let mut found = upos + length_find <= limit_pos;
                let mut index_search = 1;
                while index_search < length_find && found {
                    found = self.cb.char_at(upos + index_search) == needle[index_search];
                    index_search += 1;
                }
                if found && self.matches_word_options(word, word_start, upos, length_find) {
                    return Some(upos);
                }
            }

            match &shift_table {
                None => {
                    if lead_byte <= safe_char {
                        pos += increment;
                    } else {
                        let mut upos = pos as usize;
                        if !self.next_character(&mut upos, increment) {
                            break;
                        }
                        pos = upos as isize;
                    }
                }
                Some(table) => {
                    let probe = pos + skip;
                    let next_byte = if probe >= 0 && (probe as usize) < self.length() {
                        self.cb.char_at(probe as usize)
                    } else {
                        0
                    };
                    pos += table[next_byte as usize];
                    if next_byte > safe_char && pos >= 0 {
                        pos = self.move_position_outside_char(
                            (pos as usize).min(self.length()),
                            increment,
                            false,
                        ) as isize;
                    }
                }
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn find_bytes_folded(
        &self,
        start_pos: usize,
        end_pos: usize,
        needle: &[u8],
        forward: bool,
        word: bool,
        word_start: bool,
        limit_pos: usize,
    ) -> Option<(usize, usize)> {
        let folder = self.case_folder.as_deref().expect("folder installed");
        let length_find = needle.len();
        let increment: isize = if forward { 1 } else { -1 };

        let mut pos = start_pos;
        if !forward {
            // Back all of a character.
            pos = self.next_position(pos, -1);
        }

        match self.code_page_family() {
            EncodingFamily::EightBit => {
                let mut folded_needle = vec![0u8; length_find + 1];
                let len_search = folder.fold(&mut folded_needle, needle);
                let end_search: isize = if start_pos <= end_pos {
                    end_pos as isize - length_find as isize + 1
                } else {
                    end_pos as isize
                };
                let mut pos = pos as isize;
                loop {
                    let in_range = if forward {
                        pos < end_search
                    } else {
                        pos >= end_search && pos >= 0
                    };
                    if !in_range {
                        break;
                    }
                    let upos = pos as usize;
                    let mut found = upos + len_search <= limit_pos;
                    let mut index_search = 0;
                    while index_search < len_search && found {
                        let mut folded = [0u8; 1];
                        folder.fold(&mut folded, &[self.cb.char_at(upos + index_search)]);
                        found = folded[0] == folded_needle[index_search];
                        index_search += 1;
                    }
                    if found && self.matches_word_options(word, word_start, upos, len_search) {
                        return Some((upos, len_search));
                    }
                    pos += increment;
                }
                None
            }
            family => {
                // UTF-8 and DBCS: fold character by character with up to
                // 4x expansion buffers.
                let max_bytes_character = if family == EncodingFamily::Unicode {
                    UTF8_MAX_BYTES
                } else {
                    2
                };
                let mut folded_needle =
                    vec![0u8; (length_find + 1) * max_bytes_character * MAX_FOLDING_EXPANSION + 1];
                let len_search = folder.fold(&mut folded_needle, needle);

                loop {
                    if forward {
                        if pos >= end_pos {
                            break;
                        }
                    } else if pos < end_pos {
                        break;
                    }

                    let mut width_first_character = 0usize;
                    let mut index_document = 0usize;
                    let mut index_search = 0usize;
                    let mut character_matches = true;
                    loop {
                        let (width_char, char_bytes) = {
                            let lead = self.cb.char_at(pos + index_document);
                            if utf8_is_ascii(lead) {
                                (1usize, vec![lead])
                            } else if family == EncodingFamily::Unicode {
                                let (width, _) = self.len_char(pos + index_document);
                                (width, self.cb.range_vec(pos + index_document, width))
                            } else {
                                let width =
                                    if self.is_dbcs_dual_byte_at(pos + index_document) { 2 } else { 1 };
                                (width, self.cb.range_vec(pos + index_document, width))
                            }
                        };
                        if width_first_character == 0 {
                            width_first_character = width_char;
                        }
                        if pos + index_document + width_char > limit_pos {
                            break;
                        }
                        let mut folded =
                            [0u8; UTF8_MAX_BYTES * MAX_FOLDING_EXPANSION + 1];
                        let len_flat = folder.fold(&mut folded, &char_bytes).max(1);
                        if index_search + len_flat > len_search {
                            character_matches = false;
                        } else {
                            character_matches =
                                folded[..len_flat] == folded_needle[index_search..index_search + len_flat];
                        }
                        if !character_matches {
                            break;
                        }
                        index_document += width_char;
                        index_search += len_flat;
                        if index_search >= len_search {
                            break;
                        }
                    }
                    if character_matches
                        && index_search == len_search
                        && self.matches_word_options(word, word_start, pos, index_document)
                    {
                        return Some((pos, index_document));
                    }
                    if forward {
                        pos += width_first_character.max(1);
                    } else {
                        let mut upos = pos;
                        if !self.next_character(&mut upos, increment) {
                            break;
                        }
                        pos = upos;
                    }
                }
                None
            }
        }
    }

    /// Expand a replacement template against the last regex match.
    pub fn substitute_by_position(&mut self, template: &[u8]) -> Option<Vec<u8>> {
        let mut regex = self.regex.take()?;
        let mut length = template.len();
        let result = regex.substitute_by_position(self, template, &mut length);
        self.regex = Some(regex);
        result
    }

    // === styling ===

    /// The position up to which style bytes are valid.
    pub fn get_end_styled(&self) -> usize {
        self.end_styled
    }

    /// Restart styling from `position`.
    pub fn start_styling(&mut self, position: usize) {
        self.end_styled = position;
    }

    /// Whether a style byte is kept per text byte.
    pub fn has_styles(&self) -> bool {
        self.cb.has_styles()
    }

    /// Style `length` bytes from the styling position with one style.
    pub fn set_style_for(&mut self, length: usize, style: u8) -> bool {
        if self.entered_styling != 0 || !self.cb.has_styles() {
            return false;
        }
        self.entered_styling += 1;
        let prev_end_styled = self.end_styled;
        if self.cb.set_style_for(self.end_styled, length, style) {
            let mh = DocModification::new(
                ModificationFlags::CHANGE_STYLE | ModificationFlags::USER,
                prev_end_styled,
                length,
            );
            self.notify_modified(mh);
        }
        self.end_styled += length;
        self.entered_styling -= 1;
        true
    }

    /// Style a run of bytes from the styling position with individual
    /// styles.
    pub fn set_styles(&mut self, styles: &[u8]) -> bool {
        if self.entered_styling != 0 || !self.cb.has_styles() {
            return false;
        }
        self.entered_styling += 1;
        let mut did_change = false;
        let mut start_mod = 0;
        let mut end_mod = 0;
        for &style in styles {
            if self.cb.set_style_at(self.end_styled, style) {
                if !did_change {
                    start_mod = self.end_styled;
                }
                did_change = true;
                end_mod = self.end_styled;
            }
            self.end_styled += 1;
        }
        if did_change {
            let mh = DocModification::new(
                ModificationFlags::CHANGE_STYLE | ModificationFlags::USER,
                start_mod,
                end_mod - start_mod + 1,
            );
            self.notify_modified(mh);
        }
        self.entered_styling -= 1;
        true
    }

    /// Install or remove the lexer bridge. Styling becomes stale.
    pub fn set_lexer(&mut self, lexer: Option<Box<dyn Lexer>>) {
        self.lexer = lexer;
        self.end_styled = 0;
    }

    /// Whether a lexer bridge is installed.
    pub fn has_lexer(&self) -> bool {
        self.lexer.is_some()
    }

    /// Pull styling up to `pos`: ask the lexer, or the watchers when no
    /// lexer is installed. Guarded against reentrance.
    pub fn ensure_styled_to(&mut self, pos: usize) {
        if self.performing_style || self.entered_styling != 0 || pos <= self.end_styled {
            return;
        }
        self.increment_style_clock();
        self.performing_style = true;
        if let Some(mut lexer) = self.lexer.take() {
            let end_styled_to = self.line_start_position(self.end_styled);
            let initial_style = if end_styled_to > 0 {
                self.style_at(end_styled_to - 1)
            } else {
                0
            };
            trace!(from = end_styled_to, to = pos, "lexing");
            lexer.lex(self, end_styled_to, pos, initial_style);
            self.lexer = Some(lexer);
        } else {
            // Ask the watchers to style, and stop as soon as one responds.
            let mut watchers = std::mem::take(&mut self.watchers);
            for (_, watcher, data) in &mut watchers {
                if pos <= self.end_styled {
                    break;
                }
                watcher.notify_style_needed(self, *data, pos);
            }
            let mut added = std::mem::replace(&mut self.watchers, watchers);
            self.watchers.append(&mut added);
        }
        self.performing_style = false;
    }

    /// Style up to `pos`, feeding the elapsed time into the duration
    /// estimator.
    pub fn style_to_adjusting_line_duration(&mut self, pos: usize) {
        let styling_start = self.end_styled;
        let started = Instant::now();
        self.ensure_styled_to(pos);
        let bytes_being_styled = self.end_styled.saturating_sub(styling_start);
        self.duration_style_one_unit
            .add_sample(bytes_being_styled, started.elapsed().as_secs_f64());
    }

    /// Convert a time budget to a styling byte budget.
    pub fn actions_in_allowed_time(&self, seconds_allowed: f64) -> usize {
        self.duration_style_one_unit
            .actions_in_allowed_time(seconds_allowed)
    }

    /// Monotonic clock incremented whenever styling restarts.
    pub fn style_clock(&self) -> u32 {
        self.style_clock
    }

    fn increment_style_clock(&mut self) {
        self.style_clock = (self.style_clock + 1) % 0x10_0000;
    }

    /// Extend `pos` over the run of bytes sharing its style.
    pub fn extend_style_range(&self, mut pos: usize, delta: isize, single_line: bool) -> usize {
        let style_start = self.style_at(pos);
        if delta < 0 {
            while pos > 0
                && self.style_at(pos) == style_start
                && (!single_line || !is_eol_byte(self.cb.char_at(pos)))
            {
                pos -= 1;
            }
            pos += 1;
        } else {
            while pos < self.length()
                && self.style_at(pos) == style_start
                && (!single_line || !is_eol_byte(self.cb.char_at(pos)))
            {
                pos += 1;
            }
        }
        pos
    }

    // === brace matching ===

    /// Find the brace matching the one at `position`, walking from
    /// `start_pos` when `use_start_pos`. Only positions styled like the
    /// original brace (or past the styled watermark) count.
    pub fn brace_match(
        &self,
        position: usize,
        start_pos: usize,
        use_start_pos: bool,
    ) -> Option<usize> {
        let ch_brace = self.cb.char_at(position);
        let ch_seek = brace_opposite(ch_brace)?;
        let sty_brace = self.style_at(position);
        let direction: isize = if ch_brace < ch_seek { 1 } else { -1 };
        let safe_char = self.ascii_backward_safe_char;
        let length = self.length() as isize;
        let end_style_pos = self.end_styled;

        let mut pos: isize = if use_start_pos {
            start_pos as isize
        } else {
            position as isize + direction
        };
        let mut depth = 1i32;
        while pos >= 0 && pos < length {
            let upos = pos as usize;
            let ch_at_pos = self.cb.char_at(upos);
            if ch_at_pos == ch_brace || ch_at_pos == ch_seek {
                let style_ok = upos > end_style_pos || self.style_at(upos) == sty_brace;
                let boundary_ok = ch_at_pos <= safe_char
                    || upos == self.move_position_outside_char(upos, direction, false);
                if style_ok && boundary_ok {
                    depth += if ch_at_pos == ch_brace { 1 } else { -1 };
                    if depth == 0 {
                        return Some(upos);
                    }
                }
            }
            pos += direction;
        }
        None
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        let mut watchers = std::mem::take(&mut self.watchers);
        for (_, watcher, data) in &mut watchers {
            watcher.notify_deleted(self, *data);
        }
    }
}

/// Next tab stop after `pos` for the given tab size.
pub const fn next_tab(pos: usize, tab_size: usize) -> usize {
    ((pos / tab_size) + 1) * tab_size
}

/// Whether `cc` against its neighbour `cc_next` forms a word edge.
const fn is_word_edge(cc: CharClass, cc_next: CharClass) -> bool {
    (cc as u8 != cc_next as u8) && (cc as u8 >= CharClass::Punctuation as u8)
}

fn is_subordinate(level_start: u32, level_try: u32) -> bool {
    if level_is_whitespace(level_try) {
        return true;
    }
    level_start < level_number(level_try)
}

/// The partner of a brace character, derived arithmetically from the
/// ASCII codes.
const fn brace_opposite(ch: u8) -> Option<u8> {
    match ch {
        b'(' | b')' => Some(b'(' + b')' - ch),
        b'[' | b']' | b'{' | b'}' => Some(b'[' + b']' + (ch & 32) * 2 - ch),
        b'<' | b'>' => Some(b'<' + b'>' - ch),
        _ => None,
    }
}
