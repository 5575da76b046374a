//! Cell buffer.
//!
//! Owns the text bytes, the per-byte styles, the line-start index and the
//! undo history, and keeps all four mutually consistent through the two
//! primitive mutations, insert and delete. Every mutation reports the line
//! structure change so the document can resize per-line stores before
//! notifying watchers.
//!
//! Line breaks are LF, CR, and the CR-LF pair counted as one terminator
//! only while the two bytes are adjacent; edits between the pair split it
//! into two terminators and edits that join the bytes merge them, both
//! handled by recomputing breaks in a small window around the edit.

use crate::line_index::{LineCharacterIndex, LineStarts};
use crate::storage::{PieceTable, StyleBuffer};
use crate::undo::{Action, ActionType, UndoHistory};

/// Line-structure change produced by one primitive edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineDelta {
    /// Index of the first inserted or removed line.
    pub first_line: usize,
    /// Positive: lines inserted before `first_line`. Negative: lines
    /// removed starting at `first_line`.
    pub added: isize,
}

impl LineDelta {
    const NONE: Self = Self {
        first_line: 0,
        added: 0,
    };
}

/// The byte/style/line/undo store behind a document.
pub struct CellBuffer {
    substance: PieceTable,
    style: StyleBuffer,
    lv: LineStarts,
    uh: UndoHistory,
    read_only: bool,
    collecting_undo: bool,
    utf8_substance: bool,
}

impl CellBuffer {
    /// A buffer over `text`, with or without a style byte per text byte.
    pub fn new(text: &[u8], has_styles: bool) -> Self {
        let mut cb = Self {
            substance: PieceTable::new(text),
            style: StyleBuffer::new(has_styles, text.len()),
            lv: LineStarts::new(),
            uh: UndoHistory::new(),
            read_only: false,
            collecting_undo: true,
            utf8_substance: true,
        };
        cb.rebuild_line_index();
        cb
    }

    fn rebuild_line_index(&mut self) {
        self.lv = LineStarts::new();
        let len = self.substance.len();
        let mut line = 1;
        let mut i = 0;
        while i < len {
            let b = self.substance.byte_at(i);
            if b == b'\n' || (b == b'\r' && self.substance.byte_at(i + 1) != b'\n') {
                if i + 1 <= len {
                    self.lv.insert_line(line, i + 1, 0, 0);
                    line += 1;
                }
            }
            i += 1;
        }
    }

    // --- byte access ---

    /// Total byte length.
    pub fn length(&self) -> usize {
        self.substance.len()
    }

    /// Byte at `pos` as a signed char (0 outside the buffer).
    pub fn char_at(&self, pos: usize) -> u8 {
        self.substance.byte_at(pos)
    }

    /// Copy the bytes of `[start, start + out.len())` into `out`.
    pub fn get_char_range(&self, start: usize, out: &mut [u8]) {
        self.substance.fill_range(start, out);
    }

    /// Bytes of `[start, start + len)` as a vector.
    pub fn range_vec(&self, start: usize, len: usize) -> Vec<u8> {
        self.substance.range_vec(start, len)
    }

    /// Style byte at `pos`.
    pub fn style_at(&self, pos: usize) -> u8 {
        self.style.at(pos)
    }

    /// Whether a style byte is kept per text byte.
    pub fn has_styles(&self) -> bool {
        self.style.has_styles()
    }

    /// Enable or disable style bytes. Returns `true` when the setting
    /// changed, which invalidates all styling.
    pub fn ensure_style_buffer(&mut self, enabled: bool) -> bool {
        self.style.ensure(enabled, self.substance.len())
    }

    /// Set one style byte. Returns `true` if it changed.
    pub fn set_style_at(&mut self, pos: usize, style: u8) -> bool {
        self.style.set_at(pos, style)
    }

    /// Set a run of style bytes. Returns `true` if any changed.
    pub fn set_style_for(&mut self, pos: usize, len: usize, style: u8) -> bool {
        self.style.set_range(pos, len, style)
    }

    /// Whether the buffer rejects mutation.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Set the read-only flag.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Tell the buffer whether its bytes are UTF-8; used by the optional
    /// character indices.
    pub fn set_utf8_substance(&mut self, utf8: bool) {
        self.utf8_substance = utf8;
    }

    // --- line index ---

    /// Number of lines; an empty buffer has one line.
    pub fn lines_total(&self) -> usize {
        self.lv.lines_total()
    }

    /// Byte position where `line` starts; `lines_total()` maps to the
    /// buffer length.
    pub fn line_start(&self, line: usize) -> usize {
        if line >= self.lv.lines_total() {
            self.substance.len()
        } else {
            self.lv.line_start(line)
        }
    }

    /// End of `line` excluding its terminator bytes.
    pub fn line_end(&self, line: usize) -> usize {
        if line + 1 >= self.lv.lines_total() {
            return self.substance.len();
        }
        let mut end = self.lv.line_start(line + 1);
        // Step back over one terminator: LF, CR, or CR-LF.
        if end > 0 && self.substance.byte_at(end - 1) == b'\n' {
            end -= 1;
        }
        if end > 0 && self.substance.byte_at(end - 1) == b'\r' {
            end -= 1;
        }
        end
    }

    /// The line containing byte position `pos`.
    pub fn line_from_position(&self, pos: usize) -> usize {
        self.lv.line_from_position(pos.min(self.substance.len()))
    }

    // --- optional character indices ---

    /// The active character index kinds.
    pub fn line_character_index(&self) -> LineCharacterIndex {
        self.lv.character_index()
    }

    /// Retain character index kinds, building any that become active.
    pub fn allocate_line_character_index(&mut self, kinds: LineCharacterIndex) {
        let added = self.lv.allocate_character_index(kinds);
        for kind in [LineCharacterIndex::UTF16, LineCharacterIndex::UTF32] {
            if added.contains(kind) {
                let starts = self.compute_character_starts(kind);
                self.lv.rebuild_character_index(kind, starts);
            }
        }
    }

    /// Release character index kinds.
    pub fn release_line_character_index(&mut self, kinds: LineCharacterIndex) {
        self.lv.release_character_index(kinds);
    }

    /// Start of `line` in the units of `kind`, when that index is active.
    pub fn index_line_start(&self, line: usize, kind: LineCharacterIndex) -> Option<usize> {
        self.lv.index_line_start(line.min(self.lv.lines_total() - 1), kind)
    }

    /// Line containing a position counted in the units of `kind`.
    pub fn line_from_position_index(&self, pos: usize, kind: LineCharacterIndex) -> Option<usize> {
        self.lv.line_from_position_index(pos, kind)
    }

    fn compute_character_starts(&self, kind: LineCharacterIndex) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.lv.lines_total());
        starts.push(0);
        let mut units = 0usize;
        for line in 1..self.lv.lines_total() {
            let from = self.lv.line_start(line - 1);
            let to = self.lv.line_start(line);
            let bytes = self.substance.range_vec(from, to - from);
            let (u16s, u32s) = self.units_of(&bytes);
            units += if kind == LineCharacterIndex::UTF16 {
                u16s
            } else {
                u32s
            };
            starts.push(units);
        }
        starts
    }

    fn units_of(&self, bytes: &[u8]) -> (usize, usize) {
        if !self.utf8_substance {
            return (bytes.len(), bytes.len());
        }
        let mut u16s = 0;
        let mut u32s = 0;
        let mut i = 0;
        while i < bytes.len() {
            match crate::encoding::utf8_decode(&bytes[i..]) {
                Some((_, width)) => {
                    u16s += crate::encoding::utf16_units_for_width(width);
                    u32s += 1;
                    i += width;
                }
                None => {
                    u16s += 1;
                    u32s += 1;
                    i += 1;
                }
            }
        }
        (u16s, u32s)
    }

    // --- undo surface ---

    /// Whether actions are being recorded.
    pub fn is_collecting_undo(&self) -> bool {
        self.collecting_undo
    }

    /// Turn recording on or off; turning it off drops the history.
    pub fn set_undo_collection(&mut self, collect: bool) {
        if collect != self.collecting_undo {
            self.collecting_undo = collect;
            if !collect {
                self.uh.delete_undo_history();
            }
        }
    }

    /// Open an explicit undo group.
    pub fn begin_undo_action(&mut self) {
        self.uh.begin_sequence();
    }

    /// Close an explicit undo group. Returns `true` at the outermost close.
    pub fn end_undo_action(&mut self) -> bool {
        self.uh.end_sequence()
    }

    /// Depth of open explicit undo groups.
    pub fn undo_sequence_depth(&self) -> u32 {
        self.uh.sequence_depth()
    }

    /// Record a container action carrying `token`.
    pub fn add_container_action(&mut self, token: usize, may_coalesce: bool) -> bool {
        if self.collecting_undo {
            self.uh
                .append(ActionType::Container, token, Vec::new(), may_coalesce)
        } else {
            false
        }
    }

    /// Whether undo is possible.
    pub fn can_undo(&self) -> bool {
        self.collecting_undo && self.uh.can_undo()
    }

    /// Whether redo is possible.
    pub fn can_redo(&self) -> bool {
        self.collecting_undo && self.uh.can_redo()
    }

    /// Number of steps in the group about to be undone.
    pub fn start_undo(&self) -> usize {
        self.uh.start_undo()
    }

    /// The next action undo will unwind.
    pub fn get_undo_step(&self) -> Action {
        self.uh.undo_step().clone()
    }

    /// Apply the inverse of the next undo action to the buffer.
    pub fn perform_undo_step(&mut self) -> LineDelta {
        let action = self.uh.undo_step().clone();
        let delta = match action.at {
            ActionType::Insert => self.basic_delete(action.position, action.len()).1,
            ActionType::Remove => self.basic_insert(action.position, &action.data),
            ActionType::Container => LineDelta::NONE,
        };
        self.uh.completed_undo_step();
        delta
    }

    /// Number of steps in the group about to be redone.
    pub fn start_redo(&self) -> usize {
        self.uh.start_redo()
    }

    /// The next action redo will replay.
    pub fn get_redo_step(&self) -> Action {
        self.uh.redo_step().clone()
    }

    /// Replay the next redo action onto the buffer.
    pub fn perform_redo_step(&mut self) -> LineDelta {
        let action = self.uh.redo_step().clone();
        let delta = match action.at {
            ActionType::Insert => self.basic_insert(action.position, &action.data),
            ActionType::Remove => self.basic_delete(action.position, action.len()).1,
            ActionType::Container => LineDelta::NONE,
        };
        self.uh.completed_redo_step();
        delta
    }

    /// Mark the current state as saved.
    pub fn set_save_point(&mut self) {
        self.uh.set_save_point();
    }

    /// Whether the buffer is at its saved state.
    pub fn is_save_point(&self) -> bool {
        self.uh.is_save_point()
    }

    /// Drop the whole history.
    pub fn delete_undo_history(&mut self) {
        self.uh.delete_undo_history();
    }

    /// Begin a tentative (speculative) group.
    pub fn tentative_start(&mut self) {
        self.uh.tentative_start();
    }

    /// Whether a tentative group is open.
    pub fn tentative_active(&self) -> bool {
        self.uh.tentative_active()
    }

    /// Actions recorded since the tentative mark.
    pub fn tentative_steps(&self) -> usize {
        self.uh.tentative_steps()
    }

    /// Keep the tentative actions as ordinary history.
    pub fn tentative_commit(&mut self) {
        self.uh.tentative_commit();
    }

    /// After a tentative rollback, drop the unwound actions entirely.
    pub fn tentative_drop_rolled_back(&mut self) {
        self.uh.drop_rolled_back();
    }

    /// Direct access to the undo log for session-restore hosts.
    pub fn undo_history(&self) -> &UndoHistory {
        &self.uh
    }

    /// Mutable access to the undo log for session-restore hosts.
    pub fn undo_history_mut(&mut self) -> &mut UndoHistory {
        &mut self.uh
    }

    // --- mutation gateways ---

    /// Insert `bytes` at `pos`, recording undo. Returns `None` when the
    /// buffer is read-only; otherwise whether a new undo group opened and
    /// the line delta.
    pub fn insert_string(&mut self, pos: usize, bytes: &[u8]) -> Option<(bool, LineDelta)> {
        if self.read_only || bytes.is_empty() {
            return None;
        }
        let start_sequence = if self.collecting_undo {
            self.uh
                .append(ActionType::Insert, pos, bytes.to_vec(), true)
        } else {
            false
        };
        let delta = self.basic_insert(pos, bytes);
        Some((start_sequence, delta))
    }

    /// Delete `len` bytes at `pos`, recording undo. Returns `None` when the
    /// buffer is read-only; otherwise whether a new undo group opened, the
    /// removed bytes, and the line delta.
    pub fn delete_chars(&mut self, pos: usize, len: usize) -> Option<(bool, Vec<u8>, LineDelta)> {
        if self.read_only || len == 0 {
            return None;
        }
        let deleted = self.substance.range_vec(pos, len);
        let start_sequence = if self.collecting_undo {
            self.uh
                .append(ActionType::Remove, pos, deleted.clone(), true)
        } else {
            false
        };
        let (removed, delta) = self.basic_delete_with(pos, len, deleted);
        debug_assert_eq!(removed.len(), len);
        Some((start_sequence, removed, delta))
    }

    // --- primitive edits ---

    /// Whether a line break lies at `s`, judged from the bytes now in the
    /// buffer: LF always ends a line; CR only when not followed by LF.
    fn is_break_at(&self, s: usize) -> bool {
        if s == 0 || s > self.substance.len() {
            return false;
        }
        match self.substance.byte_at(s - 1) {
            b'\n' => true,
            b'\r' => self.substance.byte_at(s) != b'\n' || s == self.substance.len(),
            _ => false,
        }
    }

    /// First line-index of the recompute window for an edit at `pos`: the
    /// line after the one containing `pos`, or that line itself when its
    /// start sits exactly at `pos` (the break that created it gains a new
    /// neighbour byte).
    fn window_first(&self, pos: usize) -> usize {
        let line_edit = self.lv.line_from_position(pos.min(self.substance.len()));
        if line_edit > 0 && self.lv.line_start(line_edit) == pos {
            line_edit
        } else {
            line_edit + 1
        }
    }

    fn basic_insert(&mut self, pos: usize, bytes: &[u8]) -> LineDelta {
        let len = bytes.len();

        // Old line starts at pos or pos+1 get recomputed: the bytes that
        // created them gain new neighbours.
        let first = self.window_first(pos);
        let mut removed = 0usize;
        while first + removed < self.lv.lines_total()
            && self.lv.line_start(first + removed) <= pos + 1
        {
            removed += 1;
        }
        for _ in 0..removed {
            self.lv.remove_line(first);
        }

        // Splice the bytes, then shift everything after the window.
        self.substance.insert(pos, bytes);
        self.style.insert_space(pos, len);
        let (u16s, u32s) = self.units_of(bytes);
        self.lv
            .shift_tail(first, len as isize, u16s as isize, u32s as isize);

        // Recompute breaks in [pos, pos+len+1].
        let inserted = self.recompute_window(pos, pos + len + 1, first);

        LineDelta {
            first_line: first,
            added: inserted as isize - removed as isize,
        }
    }

    fn basic_delete(&mut self, pos: usize, len: usize) -> (Vec<u8>, LineDelta) {
        let deleted = self.substance.range_vec(pos, len);
        self.basic_delete_with(pos, len, deleted)
    }

    fn basic_delete_with(
        &mut self,
        pos: usize,
        len: usize,
        deleted: Vec<u8>,
    ) -> (Vec<u8>, LineDelta) {
        // Old line starts in [pos, pos+len+1] disappear or get recomputed.
        let first = self.window_first(pos);
        let mut removed = 0usize;
        while first + removed < self.lv.lines_total()
            && self.lv.line_start(first + removed) <= pos + len + 1
        {
            removed += 1;
        }
        for _ in 0..removed {
            self.lv.remove_line(first);
        }

        self.substance.delete(pos, len);
        self.style.delete_range(pos, len);
        let (u16s, u32s) = self.units_of(&deleted);
        self.lv
            .shift_tail(first, -(len as isize), -(u16s as isize), -(u32s as isize));

        // Recompute breaks in [pos, pos+1].
        let inserted = self.recompute_window(pos, pos + 1, first);

        let delta = LineDelta {
            first_line: first,
            added: inserted as isize - removed as isize,
        };
        (deleted, delta)
    }

    /// Find the breaks in `[lo, hi]` of the current bytes and insert them
    /// as line starts beginning at index `at`. Returns how many were
    /// inserted.
    fn recompute_window(&mut self, lo: usize, hi: usize, at: usize) -> usize {
        let mut inserted = 0usize;
        let line_scan_start = if at > 0 {
            self.lv.line_start(at - 1)
        } else {
            0
        };
        let needs_units = !self.lv.character_index().is_empty();
        for s in lo.max(1)..=hi.min(self.substance.len()) {
            if self.is_break_at(s) {
                let (u16s, u32s) = if needs_units {
                    let bytes = self.substance.range_vec(line_scan_start, s - line_scan_start);
                    let (a, b) = self.units_of(&bytes);
                    let base16 = self
                        .lv
                        .index_line_start(at.saturating_sub(1), LineCharacterIndex::UTF16)
                        .unwrap_or(0);
                    let base32 = self
                        .lv
                        .index_line_start(at.saturating_sub(1), LineCharacterIndex::UTF32)
                        .unwrap_or(0);
                    (base16 + a, base32 + b)
                } else {
                    (0, 0)
                };
                self.lv.insert_line(at + inserted, s, u16s, u32s);
                inserted += 1;
            }
        }
        inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(cb: &CellBuffer) -> Vec<u8> {
        cb.range_vec(0, cb.length())
    }

    #[test]
    fn test_empty_buffer_has_one_line() {
        let cb = CellBuffer::new(b"", true);
        assert_eq!(cb.length(), 0);
        assert_eq!(cb.lines_total(), 1);
        assert_eq!(cb.line_start(0), 0);
        assert_eq!(cb.line_start(1), 0);
    }

    #[test]
    fn test_initial_line_index() {
        let cb = CellBuffer::new(b"one\ntwo\r\nthree\rfour", true);
        assert_eq!(cb.lines_total(), 4);
        assert_eq!(cb.line_start(0), 0);
        assert_eq!(cb.line_start(1), 4);
        assert_eq!(cb.line_start(2), 9);
        assert_eq!(cb.line_start(3), 15);
        assert_eq!(cb.line_from_position(8), 1);
        assert_eq!(cb.line_from_position(9), 2);
        assert_eq!(cb.line_end(1), 7);
        assert_eq!(cb.line_end(3), 19);
    }

    #[test]
    fn test_insert_updates_lines() {
        let mut cb = CellBuffer::new(b"ab", true);
        cb.insert_string(1, b"x\ny").unwrap();
        assert_eq!(text(&cb), b"ax\nyb");
        assert_eq!(cb.lines_total(), 2);
        assert_eq!(cb.line_start(1), 3);
    }

    #[test]
    fn test_insert_between_cr_lf_splits_pair() {
        let mut cb = CellBuffer::new(b"a\r\nb", true);
        assert_eq!(cb.lines_total(), 2);
        let (_, delta) = cb.insert_string(2, b"X").unwrap();
        assert_eq!(text(&cb), b"a\rX\nb");
        assert_eq!(cb.lines_total(), 3);
        assert_eq!(delta.added, 1);
        assert_eq!(cb.line_start(1), 2);
        assert_eq!(cb.line_start(2), 4);
    }

    #[test]
    fn test_delete_between_cr_lf_joins_pair() {
        let mut cb = CellBuffer::new(b"a\rX\nb", true);
        assert_eq!(cb.lines_total(), 3);
        let (_, removed, delta) = cb.delete_chars(2, 1).unwrap();
        assert_eq!(removed, b"X");
        assert_eq!(text(&cb), b"a\r\nb");
        assert_eq!(cb.lines_total(), 2);
        assert_eq!(delta.added, -1);
        assert_eq!(cb.line_start(1), 3);
    }

    #[test]
    fn test_insert_lf_before_cr_merges_nothing() {
        let mut cb = CellBuffer::new(b"a\rb", true);
        assert_eq!(cb.lines_total(), 2);
        // Inserting LF after the CR forms a pair: still one terminator.
        cb.insert_string(2, b"\n").unwrap();
        assert_eq!(text(&cb), b"a\r\nb");
        assert_eq!(cb.lines_total(), 2);
        assert_eq!(cb.line_start(1), 3);
    }

    #[test]
    fn test_delete_across_lines() {
        let mut cb = CellBuffer::new(b"one\ntwo\nthree", true);
        let (_, removed, delta) = cb.delete_chars(2, 7).unwrap();
        assert_eq!(removed, b"e\ntwo\nt");
        assert_eq!(text(&cb), b"onhree");
        assert_eq!(cb.lines_total(), 1);
        assert_eq!(delta.added, -2);
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut cb = CellBuffer::new(b"hello", true);
        cb.insert_string(5, b" world").unwrap();
        cb.delete_chars(0, 1).unwrap();
        assert_eq!(text(&cb), b"ello world");

        while cb.can_undo() {
            for _ in 0..cb.start_undo() {
                cb.perform_undo_step();
            }
        }
        assert_eq!(text(&cb), b"hello");
        assert_eq!(cb.lines_total(), 1);

        while cb.can_redo() {
            for _ in 0..cb.start_redo() {
                cb.perform_redo_step();
            }
        }
        assert_eq!(text(&cb), b"ello world");
    }

    #[test]
    fn test_undo_restores_lines() {
        let mut cb = CellBuffer::new(b"a\r\nb", true);
        cb.insert_string(2, b"X").unwrap();
        assert_eq!(cb.lines_total(), 3);
        let delta = cb.perform_undo_step();
        assert_eq!(delta.added, -1);
        assert_eq!(text(&cb), b"a\r\nb");
        assert_eq!(cb.lines_total(), 2);
    }

    #[test]
    fn test_save_point() {
        let mut cb = CellBuffer::new(b"", true);
        assert!(cb.is_save_point());
        cb.insert_string(0, b"x").unwrap();
        assert!(!cb.is_save_point());
        cb.set_save_point();
        assert!(cb.is_save_point());
        cb.perform_undo_step();
        assert!(!cb.is_save_point());
    }

    #[test]
    fn test_read_only_rejects() {
        let mut cb = CellBuffer::new(b"abc", true);
        cb.set_read_only(true);
        assert!(cb.insert_string(0, b"x").is_none());
        assert!(cb.delete_chars(0, 1).is_none());
        assert_eq!(text(&cb), b"abc");
    }

    #[test]
    fn test_style_bytes_follow_edits() {
        let mut cb = CellBuffer::new(b"abcdef", true);
        cb.set_style_for(0, 6, 5);
        cb.insert_string(3, b"xy").unwrap();
        assert_eq!(cb.style_at(2), 5);
        assert_eq!(cb.style_at(3), 0);
        assert_eq!(cb.style_at(4), 0);
        assert_eq!(cb.style_at(5), 5);
        cb.delete_chars(3, 2).unwrap();
        assert_eq!(cb.style_at(3), 5);
    }

    #[test]
    fn test_undo_collection_toggle() {
        let mut cb = CellBuffer::new(b"", true);
        cb.insert_string(0, b"a").unwrap();
        assert!(cb.can_undo());
        cb.set_undo_collection(false);
        assert!(!cb.can_undo());
        cb.insert_string(1, b"b").unwrap();
        assert!(!cb.can_undo());
        cb.set_undo_collection(true);
        cb.insert_string(2, b"c").unwrap();
        assert!(cb.can_undo());
        cb.perform_undo_step();
        assert_eq!(text(&cb), b"ab");
    }

    #[test]
    fn test_utf16_index_maintained() {
        let mut cb = CellBuffer::new("中文\nabc\n".as_bytes(), true);
        cb.allocate_line_character_index(LineCharacterIndex::UTF16);
        assert_eq!(cb.index_line_start(0, LineCharacterIndex::UTF16), Some(0));
        // "中文\n" = 3 UTF-16 units.
        assert_eq!(cb.index_line_start(1, LineCharacterIndex::UTF16), Some(3));
        assert_eq!(cb.index_line_start(2, LineCharacterIndex::UTF16), Some(7));

        // Insert a surrogate-pair character on line 0.
        cb.insert_string(0, "🦀".as_bytes()).unwrap();
        assert_eq!(cb.index_line_start(1, LineCharacterIndex::UTF16), Some(5));
        assert_eq!(cb.index_line_start(2, LineCharacterIndex::UTF16), Some(9));
        assert_eq!(
            cb.line_from_position_index(4, LineCharacterIndex::UTF16),
            Some(0)
        );
        assert_eq!(
            cb.line_from_position_index(5, LineCharacterIndex::UTF16),
            Some(1)
        );

        cb.release_line_character_index(LineCharacterIndex::UTF16);
        assert!(cb.line_character_index().is_empty());
    }

    #[test]
    fn test_utf32_index_with_line_insert() {
        let mut cb = CellBuffer::new("ab\ncd\n".as_bytes(), true);
        cb.allocate_line_character_index(LineCharacterIndex::UTF32);
        assert_eq!(cb.index_line_start(1, LineCharacterIndex::UTF32), Some(3));
        cb.insert_string(1, "x\ny".as_bytes()).unwrap();
        // Text is now "ax\nyb\ncd\n": line starts at code points 0, 3, 6.
        assert_eq!(cb.index_line_start(1, LineCharacterIndex::UTF32), Some(3));
        assert_eq!(cb.index_line_start(2, LineCharacterIndex::UTF32), Some(6));
    }
}
