//! Logical line index.
//!
//! Tracks the byte position of every line start behind a stepped partition:
//! a run of edits near one spot shifts the tail of the index in O(1) by
//! accumulating the shift as a pending step, only materialising it when the
//! edit locality moves. Lookup is a binary search over the logical values.
//!
//! Optional per-line character indices (UTF-16 code units / UTF-32 code
//! points) reuse the same partition structure and are allocated on demand,
//! reference-counted per kind.

use bitflags::bitflags;

bitflags! {
    /// Kinds of per-line character index that can be allocated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineCharacterIndex: u32 {
        /// Line starts measured in UTF-16 code units.
        const UTF16 = 1;
        /// Line starts measured in UTF-32 code points.
        const UTF32 = 2;
    }
}

/// A monotonically increasing position partition with a pending tail step.
///
/// `value(i)` is `values[i]`, plus the pending `step` for every `i >=
/// step_from`. Shifting the tail after an edit is O(1) while edits stay at
/// or after the previous locality; moving the locality backwards
/// materialises the pending step once.
#[derive(Debug, Clone)]
pub struct Partition {
    values: Vec<usize>,
    step_from: usize,
    step: isize,
}

impl Partition {
    /// A partition with the single mandatory first entry at 0.
    pub fn new() -> Self {
        Self {
            values: vec![0],
            step_from: 1,
            step: 0,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when only the mandatory first entry exists.
    pub fn is_empty(&self) -> bool {
        self.values.len() <= 1
    }

    /// Logical value of entry `i`.
    pub fn value(&self, i: usize) -> usize {
        let raw = self.values[i];
        if i >= self.step_from {
            (raw as isize + self.step) as usize
        } else {
            raw
        }
    }

    fn materialize_all(&mut self) {
        if self.step != 0 {
            for v in &mut self.values[self.step_from..] {
                *v = (*v as isize + self.step) as usize;
            }
        }
        self.step = 0;
        self.step_from = self.values.len();
    }

    /// Shift every entry at index `from` or later by `delta`.
    pub fn shift_tail(&mut self, from: usize, delta: isize) {
        if delta == 0 || from >= self.values.len() {
            return;
        }
        if self.step == 0 {
            self.step_from = from;
            self.step = delta;
        } else if from == self.step_from {
            self.step += delta;
        } else if from > self.step_from {
            // Entries in [step_from, from) keep the old step only.
            for v in &mut self.values[self.step_from..from] {
                *v = (*v as isize + self.step) as usize;
            }
            self.step_from = from;
            self.step += delta;
        } else {
            // Locality moved backwards: settle the pending step, restart.
            self.materialize_all();
            self.step_from = from;
            self.step = delta;
        }
    }

    /// Insert an entry with logical value `logical` at index `index`.
    pub fn insert(&mut self, index: usize, logical: usize) {
        if index >= self.step_from {
            let raw = (logical as isize - self.step) as usize;
            self.values.insert(index, raw);
        } else {
            self.values.insert(index, logical);
            self.step_from += 1;
        }
    }

    /// Remove the entry at `index`.
    pub fn remove(&mut self, index: usize) {
        self.values.remove(index);
        if index < self.step_from {
            self.step_from -= 1;
        } else if self.step_from > self.values.len() {
            self.step_from = self.values.len();
        }
    }

    /// Index of the last entry whose logical value is `<= pos`.
    pub fn search(&self, pos: usize) -> usize {
        let mut low = 0usize;
        let mut high = self.values.len();
        while low + 1 < high {
            let mid = (low + high) / 2;
            if self.value(mid) <= pos {
                low = mid;
            } else {
                high = mid;
            }
        }
        low
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::new()
    }
}

/// The line-start index with optional character-unit mirrors.
#[derive(Debug)]
pub struct LineStarts {
    bytes: Partition,
    utf16: Option<Partition>,
    utf32: Option<Partition>,
    refcount_utf16: usize,
    refcount_utf32: usize,
}

impl LineStarts {
    /// An index for an empty document (one line).
    pub fn new() -> Self {
        Self {
            bytes: Partition::new(),
            utf16: None,
            utf32: None,
            refcount_utf16: 0,
            refcount_utf32: 0,
        }
    }

    /// Total number of lines.
    pub fn lines_total(&self) -> usize {
        self.bytes.len()
    }

    /// Byte position of the start of `line`. The caller clamps `line` to
    /// `[0, lines_total)`.
    pub fn line_start(&self, line: usize) -> usize {
        self.bytes.value(line)
    }

    /// Line containing byte position `pos`.
    pub fn line_from_position(&self, pos: usize) -> usize {
        self.bytes.search(pos)
    }

    /// Shift every line start at `line` or later by `delta` bytes, and the
    /// character mirrors by their unit deltas.
    pub fn shift_tail(&mut self, line: usize, delta: isize, delta16: isize, delta32: isize) {
        self.bytes.shift_tail(line, delta);
        if let Some(p) = &mut self.utf16 {
            p.shift_tail(line, delta16);
        }
        if let Some(p) = &mut self.utf32 {
            p.shift_tail(line, delta32);
        }
    }

    /// Insert a line start at index `line`.
    pub fn insert_line(&mut self, line: usize, byte_start: usize, start16: usize, start32: usize) {
        self.bytes.insert(line, byte_start);
        if let Some(p) = &mut self.utf16 {
            p.insert(line, start16);
        }
        if let Some(p) = &mut self.utf32 {
            p.insert(line, start32);
        }
    }

    /// Remove the line start at index `line`.
    pub fn remove_line(&mut self, line: usize) {
        self.bytes.remove(line);
        if let Some(p) = &mut self.utf16 {
            p.remove(line);
        }
        if let Some(p) = &mut self.utf32 {
            p.remove(line);
        }
    }

    /// Which character-index kinds are currently active.
    pub fn character_index(&self) -> LineCharacterIndex {
        let mut kinds = LineCharacterIndex::empty();
        if self.utf16.is_some() {
            kinds |= LineCharacterIndex::UTF16;
        }
        if self.utf32.is_some() {
            kinds |= LineCharacterIndex::UTF32;
        }
        kinds
    }

    /// Retain the given kinds. Returns the kinds that became newly active
    /// and therefore need to be (re)built by the caller.
    pub fn allocate_character_index(&mut self, kinds: LineCharacterIndex) -> LineCharacterIndex {
        let mut added = LineCharacterIndex::empty();
        if kinds.contains(LineCharacterIndex::UTF16) {
            self.refcount_utf16 += 1;
            if self.utf16.is_none() {
                self.utf16 = Some(Partition::new());
                added |= LineCharacterIndex::UTF16;
            }
        }
        if kinds.contains(LineCharacterIndex::UTF32) {
            self.refcount_utf32 += 1;
            if self.utf32.is_none() {
                self.utf32 = Some(Partition::new());
                added |= LineCharacterIndex::UTF32;
            }
        }
        added
    }

    /// Release the given kinds; an index is dropped when its last holder
    /// releases it.
    pub fn release_character_index(&mut self, kinds: LineCharacterIndex) {
        if kinds.contains(LineCharacterIndex::UTF16) && self.refcount_utf16 > 0 {
            self.refcount_utf16 -= 1;
            if self.refcount_utf16 == 0 {
                self.utf16 = None;
            }
        }
        if kinds.contains(LineCharacterIndex::UTF32) && self.refcount_utf32 > 0 {
            self.refcount_utf32 -= 1;
            if self.refcount_utf32 == 0 {
                self.utf32 = None;
            }
        }
    }

    /// Replace the character mirror for `kind` with freshly computed starts.
    pub fn rebuild_character_index(&mut self, kind: LineCharacterIndex, starts: Vec<usize>) {
        debug_assert_eq!(starts.len(), self.bytes.len());
        debug_assert_eq!(starts.first().copied(), Some(0));
        let partition = Partition {
            step_from: starts.len(),
            step: 0,
            values: starts,
        };
        if kind == LineCharacterIndex::UTF16 {
            self.utf16 = Some(partition);
        } else if kind == LineCharacterIndex::UTF32 {
            self.utf32 = Some(partition);
        }
    }

    /// Start of `line` in the units of `kind`; `None` when that index is
    /// not allocated.
    pub fn index_line_start(&self, line: usize, kind: LineCharacterIndex) -> Option<usize> {
        let p = match kind {
            LineCharacterIndex::UTF16 => self.utf16.as_ref()?,
            LineCharacterIndex::UTF32 => self.utf32.as_ref()?,
            _ => return None,
        };
        Some(p.value(line.min(p.len() - 1)))
    }

    /// Line containing the position expressed in the units of `kind`.
    pub fn line_from_position_index(&self, pos: usize, kind: LineCharacterIndex) -> Option<usize> {
        let p = match kind {
            LineCharacterIndex::UTF16 => self.utf16.as_ref()?,
            LineCharacterIndex::UTF32 => self.utf32.as_ref()?,
            _ => return None,
        };
        Some(p.search(pos))
    }
}

impl Default for LineStarts {
    fn default() -> Self {
        Self::new()
    }
}
