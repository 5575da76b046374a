//! Regular expression search.
//!
//! Two back-ends live behind the [`RegexSearcher`] capability: the built-in
//! backtracking engine (default) and a standard-syntax engine built on the
//! `regex` crate, selected with [`FindOption::STANDARD_REGEX`]. The
//! document never depends on a specific engine; each engine sees the
//! document through the [`CharacterIndexer`] view plus read-only range
//! access.

mod builtin;
mod standard;

pub use builtin::ReSearch;
pub use standard::StandardRegex;

use crate::document::Document;
use crate::search::FindOption;
use crate::watcher::RegexError;

/// Number of capture slots, group 0 (the whole match) included.
pub const MAXTAG: usize = 10;

/// Capture spans of the most recent successful match.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchSpans {
    /// Start of each submatch.
    pub bopat: [Option<usize>; MAXTAG],
    /// End (exclusive) of each submatch.
    pub eopat: [Option<usize>; MAXTAG],
}

/// The regex back-ends' sole byte-level view of a document.
pub trait CharacterIndexer {
    /// Byte at `index`, or 0 outside the indexed range.
    fn char_at(&self, index: usize) -> u8;
    /// Snap `pos` to a character boundary in the direction of `move_dir`.
    fn move_position_outside_char(&self, pos: usize, move_dir: isize) -> usize;
}

/// Indexer over a document, clamped to an end position.
pub struct DocumentIndexer<'a> {
    doc: &'a Document,
    end: usize,
}

impl<'a> DocumentIndexer<'a> {
    /// View of `doc` up to byte `end`.
    pub fn new(doc: &'a Document, end: usize) -> Self {
        Self { doc, end }
    }
}

impl CharacterIndexer for DocumentIndexer<'_> {
    fn char_at(&self, index: usize) -> u8 {
        if index < self.end {
            self.doc.byte_at(index)
        } else {
            0
        }
    }

    fn move_position_outside_char(&self, pos: usize, move_dir: isize) -> usize {
        self.doc.move_position_outside_char(pos, move_dir, false)
    }
}

/// A compiled-pattern search engine.
pub trait RegexSearcher {
    /// Find `pattern` in `doc` between `min_pos` and `max_pos` (direction
    /// is the sign of `max_pos - min_pos`). On success returns the match
    /// position and writes the match length through `length`.
    fn find_text(
        &mut self,
        doc: &Document,
        min_pos: usize,
        max_pos: usize,
        pattern: &[u8],
        flags: FindOption,
        length: &mut usize,
    ) -> Result<Option<usize>, RegexError>;

    /// Process a replacement template against the last successful match:
    /// `\0`..`\9` substitute submatches, C escapes produce their bytes,
    /// any other escaped character passes through escaped.
    fn substitute_by_position(
        &mut self,
        doc: &Document,
        template: &[u8],
        length: &mut usize,
    ) -> Option<Vec<u8>>;
}

/// Direction-normalised search range, snapped to character boundaries and
/// expressed as a line range for line-by-line engines.
pub struct SearchRange {
    /// +1 forward, -1 backward.
    pub increment: isize,
    /// Snapped start position (the `min_pos` side).
    pub start_pos: usize,
    /// Snapped end position (the `max_pos` side).
    pub end_pos: usize,
    /// Line containing `start_pos`.
    pub line_range_start: usize,
    /// Line containing `end_pos`.
    pub line_range_end: usize,
}

impl SearchRange {
    /// Build the range for a search from `min_pos` towards `max_pos`.
    pub fn new(doc: &Document, min_pos: usize, max_pos: usize) -> Self {
        let increment: isize = if min_pos <= max_pos { 1 } else { -1 };

        // Range endpoints should not be inside multi-byte characters or
        // between a CR and LF, but just in case, move them.
        let start_pos = doc.move_position_outside_char(min_pos, 1, true);
        let end_pos = doc.move_position_outside_char(max_pos, 1, true);

        Self {
            increment,
            start_pos,
            end_pos,
            line_range_start: doc.line_from_position(start_pos),
            line_range_end: doc.line_from_position(end_pos),
        }
    }

}

/// The default back-end: the built-in engine, compiled each call and
/// walking the range line by line in the search direction. Also hosts the
/// standard-syntax engine selected by [`FindOption::STANDARD_REGEX`] so
/// that substitution always sees the engine that matched last.
#[derive(Default)]
pub struct BuiltinRegex {
    search: ReSearch,
    standard: StandardRegex,
    last_standard: bool,
}

impl BuiltinRegex {
    /// A fresh engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegexSearcher for BuiltinRegex {
    fn find_text(
        &mut self,
        doc: &Document,
        min_pos: usize,
        max_pos: usize,
        pattern: &[u8],
        flags: FindOption,
        length: &mut usize,
    ) -> Result<Option<usize>, RegexError> {
        if flags.contains(FindOption::STANDARD_REGEX) {
            self.last_standard = true;
            return self
                .standard
                .find_text(doc, min_pos, max_pos, pattern, flags, length);
        }
        self.last_standard = false;

        let resr = SearchRange::new(doc, min_pos, max_pos);
        self.search.compile(pattern, flags)?;

        let search_for_line_start = pattern.first() == Some(&b'^');
        let search_for_line_end = pattern.len() >= 2 && pattern[pattern.len() - 1] == b'$'
            && pattern[pattern.len() - 2] != b'\\'
            || pattern == b"$";

        let mut pos: Option<usize> = None;
        let mut len_ret = 0usize;

        let brk = resr.line_range_end as isize + resr.increment;
        let mut line = resr.line_range_start as isize;
        while line != brk {
            let line_u = line as usize;
            let line_start_pos = doc.line_start(line_u);
            let line_end_pos = doc.line_end(line_u);
            let (mut start_of_line, mut end_of_line) = (line_start_pos, line_end_pos);

            if resr.increment > 0 {
                if line_u == resr.line_range_start {
                    if resr.start_pos != start_of_line && search_for_line_start {
                        // Can't match start of line if the start position
                        // is after the start of the line.
                        line += resr.increment;
                        continue;
                    }
                    start_of_line = resr.start_pos;
                }
                if line_u == resr.line_range_end {
                    if resr.end_pos != end_of_line && search_for_line_end {
                        line += resr.increment;
                        continue;
                    }
                    end_of_line = resr.end_pos;
                }
            } else {
                if line_u == resr.line_range_end {
                    if resr.end_pos != start_of_line && search_for_line_start {
                        line += resr.increment;
                        continue;
                    }
                    start_of_line = resr.end_pos;
                }
                if line_u == resr.line_range_start {
                    if resr.start_pos != end_of_line && search_for_line_end {
                        line += resr.increment;
                        continue;
                    }
                    end_of_line = resr.start_pos;
                }
            }

            let di = DocumentIndexer::new(doc, end_of_line);
            self.search.set_line_range(line_start_pos, line_end_pos);
            let mut success =
                self.search
                    .execute(&di, doc.char_classify(), start_of_line, end_of_line);
            if success {
                let mut end_pos = self.search.spans.eopat[0].unwrap_or(start_of_line);
                if resr.increment < 0 && !search_for_line_start {
                    // Check for the last match on this line.
                    while success && end_pos < end_of_line {
                        let held = self.search.spans;
                        let mut probe = end_pos;
                        if Some(probe) == held.bopat[0] {
                            // An empty match must advance or it loops.
                            probe = doc.next_position(probe, 1);
                        }
                        success =
                            self.search
                                .execute(&di, doc.char_classify(), probe, end_of_line);
                        if success {
                            end_pos = self.search.spans.eopat[0].unwrap_or(probe);
                        } else {
                            self.search.spans = held;
                        }
                    }
                    success = true;
                }
                let match_pos = self.search.spans.bopat[0].unwrap_or(start_of_line);
                len_ret = end_pos - match_pos;
                pos = Some(match_pos);
                break;
            }
            line += resr.increment;
        }

        if pos.is_some() {
            *length = len_ret;
        }
        Ok(pos)
    }

    fn substitute_by_position(
        &mut self,
        doc: &Document,
        template: &[u8],
        length: &mut usize,
    ) -> Option<Vec<u8>> {
        if self.last_standard {
            return self.standard.substitute_by_position(doc, template, length);
        }
        let substituted = substitute_template(doc, &self.search.spans, template);
        *length = substituted.len();
        Some(substituted)
    }
}

/// Expand a replacement template against recorded match spans.
pub(crate) fn substitute_template(
    doc: &Document,
    spans: &MatchSpans,
    template: &[u8],
) -> Vec<u8> {
    let mut substituted = Vec::with_capacity(template.len());
    let mut j = 0;
    while j < template.len() {
        if template[j] == b'\\' && j + 1 < template.len() {
            j += 1;
            let ch_next = template[j];
            if ch_next.is_ascii_digit() {
                let pat_num = (ch_next - b'0') as usize;
                if let (Some(start), Some(end)) = (spans.bopat[pat_num], spans.eopat[pat_num])
                    && end > start
                {
                    substituted.extend_from_slice(&doc.get_char_range(start, end - start));
                }
            } else {
                match ch_next {
                    b'a' => substituted.push(0x07),
                    b'b' => substituted.push(0x08),
                    b'f' => substituted.push(0x0C),
                    b'n' => substituted.push(b'\n'),
                    b'r' => substituted.push(b'\r'),
                    b't' => substituted.push(b'\t'),
                    b'v' => substituted.push(0x0B),
                    b'\\' => substituted.push(b'\\'),
                    _ => {
                        substituted.push(b'\\');
                        substituted.push(ch_next);
                    }
                }
            }
            j += 1;
        } else {
            substituted.push(template[j]);
            j += 1;
        }
    }
    substituted
}
