//! Byte storage layer.
//!
//! Implements efficient insertion and deletion over the raw document bytes
//! using a piece table (read-only original buffer plus an append-only add
//! buffer). The table is byte-addressed: the document model must tolerate
//! invalid UTF-8 and double-byte sequences, so no `str` invariant is assumed
//! at this layer.

use std::cell::Cell;

/// Buffer type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    /// Read-only original buffer
    Original,
    /// Append-only add buffer
    Add,
}

/// Piece structure: references a fragment in a buffer
#[derive(Debug, Clone)]
pub struct Piece {
    /// Buffer type
    pub buffer_type: BufferType,
    /// Start position in the corresponding buffer (byte offset)
    pub start: usize,
    /// Byte length of the fragment
    pub byte_length: usize,
}

impl Piece {
    /// Create a new piece.
    pub fn new(buffer_type: BufferType, start: usize, byte_length: usize) -> Self {
        Self {
            buffer_type,
            start,
            byte_length,
        }
    }
}

/// Piece table - main storage structure.
///
/// A read cursor caches the last accessed piece so that sequential
/// `byte_at` calls are amortised O(1).
pub struct PieceTable {
    /// Read-only original buffer
    original_buffer: Vec<u8>,
    /// Append-only add buffer
    add_buffer: Vec<u8>,
    /// List of pieces
    pieces: Vec<Piece>,
    /// Cached (piece index, byte offset of that piece's start) of the last read
    cursor: Cell<(usize, usize)>,
    /// Operation counter (for triggering GC)
    operation_count: usize,
    /// GC threshold (trigger GC after every N operations)
    gc_threshold: usize,
}

impl PieceTable {
    /// Create a new piece table from initial bytes.
    pub fn new(bytes: &[u8]) -> Self {
        let pieces = if bytes.is_empty() {
            Vec::new()
        } else {
            vec![Piece::new(BufferType::Original, 0, bytes.len())]
        };

        Self {
            original_buffer: bytes.to_vec(),
            add_buffer: Vec::new(),
            pieces,
            cursor: Cell::new((0, 0)),
            operation_count: 0,
            gc_threshold: 1000,
        }
    }

    /// Create an empty piece table.
    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// Total byte count of the document.
    pub fn len(&self) -> usize {
        self.pieces.iter().map(|p| p.byte_length).sum()
    }

    /// Returns `true` if the document holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    fn buffer(&self, buffer_type: BufferType) -> &[u8] {
        match buffer_type {
            BufferType::Original => &self.original_buffer,
            BufferType::Add => &self.add_buffer,
        }
    }

    /// Byte at `pos`, or 0 when `pos` is out of range.
    ///
    /// The out-of-range zero matches the navigation code's expectations: a
    /// probe one past a lead byte must not panic.
    pub fn byte_at(&self, pos: usize) -> u8 {
        let (piece_idx, offset_in_piece) = match self.locate(pos) {
            Some(loc) => loc,
            None => return 0,
        };
        let piece = &self.pieces[piece_idx];
        self.buffer(piece.buffer_type)[piece.start + offset_in_piece]
    }

    /// Locate the piece containing `pos`; `None` when `pos >= len()`.
    fn locate(&self, pos: usize) -> Option<(usize, usize)> {
        let (mut idx, mut piece_start) = self.cursor.get();
        if idx >= self.pieces.len() || piece_start > pos {
            idx = 0;
            piece_start = 0;
        }
        while idx < self.pieces.len() {
            let piece_len = self.pieces[idx].byte_length;
            if pos < piece_start + piece_len {
                self.cursor.set((idx, piece_start));
                return Some((idx, pos - piece_start));
            }
            piece_start += piece_len;
            idx += 1;
        }
        None
    }

    /// Copy `out.len()` bytes starting at `start` into `out`.
    ///
    /// The requested range must lie inside the document.
    pub fn fill_range(&self, start: usize, out: &mut [u8]) {
        if out.is_empty() {
            return;
        }
        let (mut idx, offset_in_piece) = self
            .locate(start)
            .expect("fill_range start outside document");
        let mut copied = 0;
        let mut skip = offset_in_piece;
        while copied < out.len() && idx < self.pieces.len() {
            let piece = &self.pieces[idx];
            let data = &self.buffer(piece.buffer_type)[piece.start..piece.start + piece.byte_length];
            let data = &data[skip..];
            let take = data.len().min(out.len() - copied);
            out[copied..copied + take].copy_from_slice(&data[..take]);
            copied += take;
            skip = 0;
            idx += 1;
        }
        debug_assert_eq!(copied, out.len());
    }

    /// Bytes in `[start, start + len)` as a fresh vector.
    pub fn range_vec(&self, start: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        self.fill_range(start, &mut out);
        out
    }

    /// Insert bytes at `pos`.
    pub fn insert(&mut self, pos: usize, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let add_start = self.add_buffer.len();
        self.add_buffer.extend_from_slice(bytes);
        let new_piece = Piece::new(BufferType::Add, add_start, bytes.len());

        match self.locate(pos) {
            Some((piece_idx, offset_in_piece)) => {
                if offset_in_piece == 0 {
                    self.pieces.insert(piece_idx, new_piece);
                } else {
                    // Insert in the middle of the piece, need to split
                    let (left, right) = split_piece(&self.pieces[piece_idx], offset_in_piece);
                    self.pieces
                        .splice(piece_idx..=piece_idx, [left, new_piece, right]);
                }
            }
            None => {
                // Empty document or insert at the end
                self.pieces.push(new_piece);
            }
        }

        self.cursor.set((0, 0));
        self.try_merge_adjacent_pieces();
        self.check_gc();
    }

    /// Delete bytes in `[pos, pos + len)`.
    pub fn delete(&mut self, pos: usize, len: usize) {
        if len == 0 {
            return;
        }

        let (start_idx, start_offset) = match self.locate(pos) {
            Some(loc) => loc,
            None => return,
        };
        let end = pos + len;

        match self.locate(end) {
            Some((end_idx, end_offset)) if start_idx == end_idx => {
                let piece = &self.pieces[start_idx];
                if start_offset == 0 {
                    let (_, right) = split_piece(piece, end_offset);
                    self.pieces[start_idx] = right;
                } else {
                    let (left, tail) = split_piece(piece, start_offset);
                    let (_, right) = split_piece(&tail, end_offset - start_offset);
                    self.pieces.splice(start_idx..=start_idx, [left, right]);
                }
            }
            Some((end_idx, end_offset)) => {
                let mut kept = Vec::new();
                if start_offset > 0 {
                    let (left, _) = split_piece(&self.pieces[start_idx], start_offset);
                    kept.push(left);
                }
                if end_offset > 0 {
                    let (_, right) = split_piece(&self.pieces[end_idx], end_offset);
                    kept.push(right);
                }
                let last = if end_offset > 0 { end_idx } else { end_idx - 1 };
                self.pieces.splice(start_idx..=last, kept);
            }
            None => {
                // Delete runs to the end of the document
                if start_offset == 0 {
                    self.pieces.truncate(start_idx);
                } else {
                    let (left, _) = split_piece(&self.pieces[start_idx], start_offset);
                    self.pieces.truncate(start_idx);
                    self.pieces.push(left);
                }
            }
        }

        self.pieces.retain(|p| p.byte_length > 0);
        self.cursor.set((0, 0));
        self.check_gc();
    }

    /// Check if two pieces can be merged (must be from the add buffer and adjacent)
    fn can_merge(p1: &Piece, p2: &Piece) -> bool {
        p1.buffer_type == BufferType::Add
            && p2.buffer_type == BufferType::Add
            && p1.start + p1.byte_length == p2.start
    }

    /// Try to merge adjacent pieces after insertion
    fn try_merge_adjacent_pieces(&mut self) {
        let mut i = 0;
        while i + 1 < self.pieces.len() {
            if Self::can_merge(&self.pieces[i], &self.pieces[i + 1]) {
                self.pieces[i].byte_length += self.pieces[i + 1].byte_length;
                self.pieces.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// Garbage collection: compact the add buffer, removing unreferenced data.
    pub fn gc(&mut self) {
        let mut referenced_ranges: Vec<(usize, usize)> = self
            .pieces
            .iter()
            .filter(|p| p.buffer_type == BufferType::Add)
            .map(|p| (p.start, p.start + p.byte_length))
            .collect();

        if referenced_ranges.is_empty() {
            self.add_buffer.clear();
            self.operation_count = 0;
            return;
        }

        referenced_ranges.sort_by_key(|r| r.0);

        // Merge overlapping or adjacent ranges
        let mut merged_ranges = vec![referenced_ranges[0]];
        for range in referenced_ranges.iter().skip(1) {
            let last = merged_ranges.last_mut().expect("non-empty");
            if range.0 <= last.1 {
                last.1 = last.1.max(range.1);
            } else {
                merged_ranges.push(*range);
            }
        }

        // Build the compacted add buffer and the old-to-new mappings
        let mut new_add_buffer = Vec::new();
        let mut mappings: Vec<(usize, usize, usize)> = Vec::new(); // (old_start, old_end, new_start)
        for (old_start, old_end) in merged_ranges {
            let new_start = new_add_buffer.len();
            new_add_buffer.extend_from_slice(&self.add_buffer[old_start..old_end]);
            mappings.push((old_start, old_end, new_start));
        }

        for piece in &mut self.pieces {
            if piece.buffer_type != BufferType::Add {
                continue;
            }
            let idx = match mappings.binary_search_by_key(&piece.start, |(s, _, _)| *s) {
                Ok(exact) => exact,
                Err(insert_pos) => insert_pos.saturating_sub(1),
            };
            if let Some((old_start, old_end, new_start)) = mappings.get(idx).copied()
                && piece.start < old_end
            {
                piece.start = new_start + (piece.start - old_start);
            }
        }

        self.add_buffer = new_add_buffer;
        self.operation_count = 0;
    }

    fn check_gc(&mut self) {
        self.operation_count += 1;
        if self.operation_count >= self.gc_threshold {
            self.gc();
        }
    }

    /// Set GC threshold.
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.gc_threshold = threshold;
    }

    /// Size of the add buffer (for memory testing).
    pub fn add_buffer_size(&self) -> usize {
        self.add_buffer.len()
    }
}

/// Split a piece at `offset` bytes, returning (left, right).
fn split_piece(piece: &Piece, offset: usize) -> (Piece, Piece) {
    let left = Piece::new(piece.buffer_type, piece.start, offset);
    let right = Piece::new(
        piece.buffer_type,
        piece.start + offset,
        piece.byte_length - offset,
    );
    (left, right)
}

/// Per-byte style storage, enabled on demand.
///
/// Kept in lockstep with the text bytes: every text insert fills the same
/// range with style 0, every delete removes the same range.
#[derive(Debug, Default)]
pub struct StyleBuffer {
    styles: Option<Vec<u8>>,
}

impl StyleBuffer {
    /// Create a style buffer; `enabled` decides whether styles are stored.
    pub fn new(enabled: bool, length: usize) -> Self {
        Self {
            styles: enabled.then(|| vec![0u8; length]),
        }
    }

    /// Whether style bytes are being kept.
    pub fn has_styles(&self) -> bool {
        self.styles.is_some()
    }

    /// Enable or disable style storage. Returns `true` when the setting
    /// changed (the caller must then treat all styling as stale).
    pub fn ensure(&mut self, enabled: bool, length: usize) -> bool {
        if enabled == self.has_styles() {
            return false;
        }
        self.styles = enabled.then(|| vec![0u8; length]);
        true
    }

    /// Style byte at `pos` (0 when disabled or out of range).
    pub fn at(&self, pos: usize) -> u8 {
        self.styles
            .as_ref()
            .and_then(|s| s.get(pos).copied())
            .unwrap_or(0)
    }

    /// Set the style at one position. Returns `true` if the byte changed.
    pub fn set_at(&mut self, pos: usize, style: u8) -> bool {
        match &mut self.styles {
            Some(styles) if pos < styles.len() && styles[pos] != style => {
                styles[pos] = style;
                true
            }
            _ => false,
        }
    }

    /// Set `len` style bytes from `pos`. Returns `true` if any byte changed.
    pub fn set_range(&mut self, pos: usize, len: usize, style: u8) -> bool {
        let Some(styles) = &mut self.styles else {
            return false;
        };
        let end = (pos + len).min(styles.len());
        let mut changed = false;
        for byte in &mut styles[pos.min(end)..end] {
            if *byte != style {
                *byte = style;
                changed = true;
            }
        }
        changed
    }

    /// Mirror a text insertion: new bytes take style 0.
    pub fn insert_space(&mut self, pos: usize, len: usize) {
        if let Some(styles) = &mut self.styles {
            styles.splice(pos..pos, std::iter::repeat_n(0u8, len));
        }
    }

    /// Mirror a text deletion.
    pub fn delete_range(&mut self, pos: usize, len: usize) {
        if let Some(styles) = &mut self.styles {
            let end = (pos + len).min(styles.len());
            styles.drain(pos.min(end)..end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(pt: &PieceTable) -> Vec<u8> {
        pt.range_vec(0, pt.len())
    }

    #[test]
    fn test_new_piece_table() {
        let pt = PieceTable::new(b"Hello, World!");
        assert_eq!(text(&pt), b"Hello, World!");
        assert_eq!(pt.len(), 13);
    }

    #[test]
    fn test_empty_piece_table() {
        let pt = PieceTable::empty();
        assert_eq!(pt.len(), 0);
        assert!(pt.is_empty());
    }

    #[test]
    fn test_insert_at_start() {
        let mut pt = PieceTable::new(b"World");
        pt.insert(0, b"Hello, ");
        assert_eq!(text(&pt), b"Hello, World");
    }

    #[test]
    fn test_insert_at_end() {
        let mut pt = PieceTable::new(b"Hello");
        pt.insert(5, b", World");
        assert_eq!(text(&pt), b"Hello, World");
    }

    #[test]
    fn test_insert_in_middle() {
        let mut pt = PieceTable::new(b"Hlo");
        pt.insert(1, b"el");
        assert_eq!(text(&pt), b"Hello");
    }

    #[test]
    fn test_delete_at_start() {
        let mut pt = PieceTable::new(b"Hello, World");
        pt.delete(0, 7);
        assert_eq!(text(&pt), b"World");
    }

    #[test]
    fn test_delete_at_end() {
        let mut pt = PieceTable::new(b"Hello, World");
        pt.delete(5, 7);
        assert_eq!(text(&pt), b"Hello");
    }

    #[test]
    fn test_delete_in_middle() {
        let mut pt = PieceTable::new(b"Hello, World");
        pt.delete(5, 2);
        assert_eq!(text(&pt), b"HelloWorld");
    }

    #[test]
    fn test_delete_across_pieces() {
        let mut pt = PieceTable::new(b"Hello");
        pt.insert(5, b" World");
        pt.insert(5, b",");
        pt.delete(3, 6);
        assert_eq!(text(&pt), b"Helrld");
    }

    #[test]
    fn test_multiple_operations() {
        let mut pt = PieceTable::new(b"Hello");
        pt.insert(5, b" World");
        pt.insert(5, b",");
        pt.delete(0, 7);
        pt.insert(0, b"Hi, ");
        assert_eq!(text(&pt), b"Hi, World");
    }

    #[test]
    fn test_byte_at_sequential() {
        let mut pt = PieceTable::new(b"abc");
        pt.insert(1, b"xy");
        let expected = b"axybc";
        for (i, &b) in expected.iter().enumerate() {
            assert_eq!(pt.byte_at(i), b);
        }
        // Backwards too, exercising the cursor reset path.
        for (i, &b) in expected.iter().enumerate().rev() {
            assert_eq!(pt.byte_at(i), b);
        }
        assert_eq!(pt.byte_at(5), 0);
    }

    #[test]
    fn test_invalid_utf8_round_trip() {
        // Raw DBCS-like bytes must survive storage untouched.
        let raw = [0x82u8, 0xA0, 0x41, 0xFF, 0x80];
        let mut pt = PieceTable::new(&raw);
        pt.insert(2, &[0xE0, 0x40]);
        assert_eq!(text(&pt), [0x82, 0xA0, 0xE0, 0x40, 0x41, 0xFF, 0x80]);
    }

    #[test]
    fn test_gc_basic() {
        let mut pt = PieceTable::new(b"Hello");
        pt.insert(5, b" World");
        pt.insert(11, b"!");
        let before = pt.add_buffer_size();
        pt.delete(5, 6);
        pt.gc();
        assert_eq!(text(&pt), b"Hello!");
        assert!(pt.add_buffer_size() < before);
    }

    #[test]
    fn test_auto_gc_trigger() {
        let mut pt = PieceTable::new(b"Test");
        pt.set_gc_threshold(5);
        for i in 0..6 {
            pt.insert(4 + i, b"x");
        }
        assert!(pt.operation_count < 6);
        assert_eq!(text(&pt), b"Testxxxxxx");
    }

    #[test]
    fn test_style_buffer_lockstep() {
        let mut sb = StyleBuffer::new(true, 5);
        assert!(sb.set_range(0, 5, 3));
        sb.insert_space(2, 2);
        assert_eq!(sb.at(1), 3);
        assert_eq!(sb.at(2), 0);
        assert_eq!(sb.at(3), 0);
        assert_eq!(sb.at(4), 3);
        sb.delete_range(2, 2);
        assert_eq!(sb.at(2), 3);
        assert!(!sb.set_at(0, 3));
        assert!(sb.set_at(0, 7));
    }

    #[test]
    fn test_style_buffer_disabled() {
        let mut sb = StyleBuffer::new(false, 5);
        assert!(!sb.has_styles());
        assert!(!sb.set_range(0, 5, 3));
        assert_eq!(sb.at(0), 0);
        assert!(sb.ensure(true, 5));
        assert!(sb.set_range(0, 5, 3));
    }
}
