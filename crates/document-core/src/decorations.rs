//! Document decorations (indicators).
//!
//! Each indicator layer maps byte ranges to small integer values through a
//! run-length store. Layers are spliced on every buffer mutation so ranges
//! stay anchored to content: bytes inserted at a range start belong to the
//! run before it, bytes inserted strictly inside a range extend it.

/// Result of filling a range: the extent that actually changed after
/// trimming already-equal bytes at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillResult {
    /// Whether any byte changed value.
    pub changed: bool,
    /// Start of the changed extent.
    pub position: usize,
    /// Length of the changed extent.
    pub fill_length: usize,
}

/// Run-length mapping from byte positions to integer values.
///
/// Runs partition `[0, length)`; `starts[0]` is always 0 and adjacent runs
/// always hold distinct values.
#[derive(Debug, Clone)]
pub struct RunStyles {
    starts: Vec<usize>,
    values: Vec<i32>,
    length: usize,
}

impl RunStyles {
    /// An empty store covering `length` bytes of value 0.
    pub fn with_length(length: usize) -> Self {
        Self {
            starts: vec![0],
            values: vec![0],
            length,
        }
    }

    /// Total bytes covered.
    pub fn length(&self) -> usize {
        self.length
    }

    fn run_index(&self, pos: usize) -> usize {
        let mut low = 0usize;
        let mut high = self.starts.len();
        while low + 1 < high {
            let mid = (low + high) / 2;
            if self.starts[mid] <= pos {
                low = mid;
            } else {
                high = mid;
            }
        }
        low
    }

    fn run_end(&self, i: usize) -> usize {
        self.starts.get(i + 1).copied().unwrap_or(self.length)
    }

    /// Value at byte `pos` (0 outside the store).
    pub fn value_at(&self, pos: usize) -> i32 {
        if pos >= self.length {
            return 0;
        }
        self.values[self.run_index(pos)]
    }

    /// Start of the run containing `pos`.
    pub fn start_run(&self, pos: usize) -> usize {
        self.starts[self.run_index(pos.min(self.length.saturating_sub(1)))]
    }

    /// End of the run containing `pos`.
    pub fn end_run(&self, pos: usize) -> usize {
        self.run_end(self.run_index(pos.min(self.length.saturating_sub(1))))
    }

    /// Whether any byte holds a non-zero value.
    pub fn any_set(&self) -> bool {
        self.values.iter().any(|&v| v != 0)
    }

    /// Fill `[position, position + fill_length)` with `value`, trimming the
    /// already-equal prefix and suffix first.
    pub fn fill_range(&mut self, position: usize, value: i32, fill_length: usize) -> FillResult {
        let mut start = position.min(self.length);
        let mut end = (position + fill_length).min(self.length);

        while start < end && self.value_at(start) == value {
            start += 1;
        }
        while end > start && self.value_at(end - 1) == value {
            end -= 1;
        }
        if start >= end {
            return FillResult {
                changed: false,
                position: start,
                fill_length: 0,
            };
        }

        self.set_range(start, end, value);
        FillResult {
            changed: true,
            position: start,
            fill_length: end - start,
        }
    }

    fn set_range(&mut self, start: usize, end: usize, value: i32) {
        let mut ns: Vec<usize> = Vec::with_capacity(self.starts.len() + 2);
        let mut nv: Vec<i32> = Vec::with_capacity(self.values.len() + 2);
        let mut pushed_fill = false;

        fn push(ns: &mut Vec<usize>, nv: &mut Vec<i32>, s: usize, v: i32) {
            if nv.last() == Some(&v) {
                return;
            }
            ns.push(s);
            nv.push(v);
        }

        for i in 0..self.starts.len() {
            let s = self.starts[i];
            let e = self.run_end(i);
            let v = self.values[i];
            if e <= start {
                push(&mut ns, &mut nv, s, v);
            } else if s >= end {
                if !pushed_fill {
                    push(&mut ns, &mut nv, start, value);
                    pushed_fill = true;
                }
                push(&mut ns, &mut nv, s, v);
            } else {
                if s < start {
                    push(&mut ns, &mut nv, s, v);
                }
                if !pushed_fill {
                    push(&mut ns, &mut nv, start, value);
                    pushed_fill = true;
                }
                if e > end {
                    push(&mut ns, &mut nv, end, v);
                }
            }
        }
        if !pushed_fill {
            push(&mut ns, &mut nv, start, value);
        }

        self.starts = ns;
        self.values = nv;
    }

    /// Splice in `len` bytes at `pos`. Bytes at a run boundary join the
    /// run before the boundary (value 0 at the very start of the buffer).
    pub fn insert_space(&mut self, pos: usize, len: usize) {
        if len == 0 {
            return;
        }
        self.length += len;
        let i = self.run_index(pos);
        if pos == 0 {
            if self.values[0] != 0 {
                for s in &mut self.starts[1..] {
                    *s += len;
                }
                self.starts.insert(1, len);
                self.values.insert(0, 0);
            } else {
                for s in &mut self.starts[1..] {
                    *s += len;
                }
            }
        } else if pos == self.starts[i] {
            for s in &mut self.starts[i..] {
                *s += len;
            }
        } else {
            for s in &mut self.starts[i + 1..] {
                *s += len;
            }
        }
    }

    /// Splice out `[pos, pos + len)`, clipping runs to the remaining
    /// overlap.
    pub fn delete_range(&mut self, pos: usize, len: usize) {
        if len == 0 {
            return;
        }
        let end = (pos + len).min(self.length);
        let len = end - pos;
        let mut ns: Vec<usize> = Vec::with_capacity(self.starts.len());
        let mut nv: Vec<i32> = Vec::with_capacity(self.values.len());

        for i in 0..self.starts.len() {
            let s = self.starts[i];
            let e = self.run_end(i);
            let v = self.values[i];
            if s < pos.min(e) && nv.last() != Some(&v) {
                ns.push(s);
                nv.push(v);
            }
            let s2 = s.max(end);
            if s2 < e && nv.last() != Some(&v) {
                ns.push(s2 - len);
                nv.push(v);
            }
        }

        self.length -= len;
        if ns.is_empty() {
            ns.push(0);
            nv.push(0);
        }
        self.starts = ns;
        self.values = nv;
    }
}

/// One indicator layer.
#[derive(Debug, Clone)]
pub struct Decoration {
    /// Numeric indicator id of this layer.
    pub indicator: i32,
    /// The range-to-value store.
    pub rs: RunStyles,
}

impl Decoration {
    fn new(indicator: i32, length: usize) -> Self {
        Self {
            indicator,
            rs: RunStyles::with_length(length),
        }
    }

    /// Whether no byte carries this indicator.
    pub fn empty(&self) -> bool {
        !self.rs.any_set()
    }
}

/// All indicator layers of a document, ordered by indicator id.
#[derive(Debug, Default)]
pub struct DecorationList {
    decorations: Vec<Decoration>,
    current_indicator: i32,
    current_value: i32,
    length: usize,
}

impl DecorationList {
    /// An empty list for a document of `length` bytes.
    pub fn new(length: usize) -> Self {
        Self {
            decorations: Vec::new(),
            current_indicator: 0,
            current_value: 1,
            length,
        }
    }

    /// Select the indicator that `fill_range` writes to.
    pub fn set_current_indicator(&mut self, indicator: i32) {
        self.current_indicator = indicator;
        self.current_value = 1;
    }

    /// The currently selected indicator.
    pub fn current_indicator(&self) -> i32 {
        self.current_indicator
    }

    /// Set the value that `fill_range` writes.
    pub fn set_current_value(&mut self, value: i32) {
        self.current_value = if value == 0 { 1 } else { value };
    }

    fn layer_mut(&mut self, indicator: i32) -> &mut Decoration {
        let idx = match self
            .decorations
            .binary_search_by_key(&indicator, |d| d.indicator)
        {
            Ok(idx) => idx,
            Err(idx) => {
                self.decorations
                    .insert(idx, Decoration::new(indicator, self.length));
                idx
            }
        };
        &mut self.decorations[idx]
    }

    fn layer(&self, indicator: i32) -> Option<&Decoration> {
        self.decorations
            .binary_search_by_key(&indicator, |d| d.indicator)
            .ok()
            .map(|idx| &self.decorations[idx])
    }

    /// Fill a range on the current indicator with `value`.
    pub fn fill_range(&mut self, position: usize, value: i32, fill_length: usize) -> FillResult {
        let indicator = self.current_indicator;
        let layer = self.layer_mut(indicator);
        let result = layer.rs.fill_range(position, value, fill_length);
        if layer.empty() {
            self.decorations.retain(|d| d.indicator != indicator);
        }
        result
    }

    /// Fill a range on the current indicator with the current value.
    pub fn fill_current(&mut self, position: usize, fill_length: usize) -> FillResult {
        self.fill_range(position, self.current_value, fill_length)
    }

    /// Clear a range on the current indicator.
    pub fn clear_range(&mut self, position: usize, fill_length: usize) -> FillResult {
        self.fill_range(position, 0, fill_length)
    }

    /// Splice all layers for an insertion.
    pub fn insert_space(&mut self, position: usize, len: usize) {
        self.length += len;
        for d in &mut self.decorations {
            d.rs.insert_space(position, len);
        }
    }

    /// Splice all layers for a deletion.
    pub fn delete_range(&mut self, position: usize, len: usize) {
        self.length -= len.min(self.length);
        for d in &mut self.decorations {
            d.rs.delete_range(position, len);
        }
        self.decorations.retain(|d| !d.empty());
    }

    /// Value of `indicator` at `pos`.
    pub fn value_at(&self, indicator: i32, pos: usize) -> i32 {
        self.layer(indicator).map_or(0, |d| d.rs.value_at(pos))
    }

    /// Start of the `indicator` run containing `pos`.
    pub fn start(&self, indicator: i32, pos: usize) -> usize {
        self.layer(indicator).map_or(0, |d| d.rs.start_run(pos))
    }

    /// End of the `indicator` run containing `pos`.
    pub fn end(&self, indicator: i32, pos: usize) -> usize {
        self.layer(indicator).map_or(0, |d| d.rs.end_run(pos))
    }

    /// Indicator ids currently holding any value.
    pub fn active_indicators(&self) -> Vec<i32> {
        self.decorations.iter().map(|d| d.indicator).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_value() {
        let mut rs = RunStyles::with_length(20);
        let fr = rs.fill_range(5, 2, 5);
        assert!(fr.changed);
        assert_eq!(fr.position, 5);
        assert_eq!(fr.fill_length, 5);
        assert_eq!(rs.value_at(4), 0);
        assert_eq!(rs.value_at(5), 2);
        assert_eq!(rs.value_at(9), 2);
        assert_eq!(rs.value_at(10), 0);
        assert_eq!(rs.start_run(7), 5);
        assert_eq!(rs.end_run(7), 10);
    }

    #[test]
    fn test_fill_trims_equal_ends() {
        let mut rs = RunStyles::with_length(20);
        rs.fill_range(5, 2, 5);
        // Refill overlapping: only the new tail actually changes.
        let fr = rs.fill_range(5, 2, 8);
        assert!(fr.changed);
        assert_eq!(fr.position, 10);
        assert_eq!(fr.fill_length, 3);
        // Identical refill reports no change.
        let fr = rs.fill_range(5, 2, 8);
        assert!(!fr.changed);
        assert_eq!(fr.fill_length, 0);
    }

    #[test]
    fn test_fill_merges_adjacent_runs() {
        let mut rs = RunStyles::with_length(20);
        rs.fill_range(0, 3, 5);
        rs.fill_range(10, 3, 5);
        rs.fill_range(5, 3, 5);
        assert_eq!(rs.start_run(7), 0);
        assert_eq!(rs.end_run(7), 15);
    }

    #[test]
    fn test_insert_before_range_shifts() {
        let mut rs = RunStyles::with_length(10);
        rs.fill_range(4, 1, 3); // [4, 7)
        rs.insert_space(2, 5);
        assert_eq!(rs.length(), 15);
        assert_eq!(rs.value_at(8), 0);
        assert_eq!(rs.value_at(9), 1);
        assert_eq!(rs.value_at(11), 1);
        assert_eq!(rs.value_at(12), 0);
    }

    #[test]
    fn test_insert_at_range_start_shifts() {
        let mut rs = RunStyles::with_length(10);
        rs.fill_range(4, 1, 3);
        rs.insert_space(4, 2);
        // Inserted bytes stay outside the range.
        assert_eq!(rs.value_at(4), 0);
        assert_eq!(rs.value_at(5), 0);
        assert_eq!(rs.value_at(6), 1);
        assert_eq!(rs.value_at(8), 1);
        assert_eq!(rs.value_at(9), 0);
    }

    #[test]
    fn test_insert_inside_range_extends() {
        let mut rs = RunStyles::with_length(10);
        rs.fill_range(4, 1, 3);
        rs.insert_space(5, 2);
        assert_eq!(rs.value_at(4), 1);
        assert_eq!(rs.value_at(6), 1);
        assert_eq!(rs.value_at(8), 1);
        assert_eq!(rs.value_at(9), 0);
    }

    #[test]
    fn test_insert_at_document_start() {
        let mut rs = RunStyles::with_length(5);
        rs.fill_range(0, 7, 3); // [0, 3)
        rs.insert_space(0, 2);
        assert_eq!(rs.value_at(0), 0);
        assert_eq!(rs.value_at(1), 0);
        assert_eq!(rs.value_at(2), 7);
        assert_eq!(rs.value_at(4), 7);
        assert_eq!(rs.value_at(5), 0);
    }

    #[test]
    fn test_delete_clips_range() {
        let mut rs = RunStyles::with_length(20);
        rs.fill_range(5, 2, 10); // [5, 15)
        rs.delete_range(0, 3);
        assert_eq!(rs.length(), 17);
        assert_eq!(rs.value_at(1), 0);
        assert_eq!(rs.value_at(2), 2);
        assert_eq!(rs.value_at(11), 2);
        assert_eq!(rs.value_at(12), 0);
        // Delete straddling the range end clips to the overlap.
        rs.delete_range(10, 5);
        assert_eq!(rs.length(), 12);
        assert_eq!(rs.value_at(9), 2);
        assert_eq!(rs.value_at(10), 0);
    }

    #[test]
    fn test_delete_merges_runs() {
        let mut rs = RunStyles::with_length(20);
        rs.fill_range(0, 2, 5);
        rs.fill_range(10, 2, 5);
        rs.delete_range(5, 5);
        assert_eq!(rs.start_run(3), 0);
        assert_eq!(rs.end_run(3), 10);
        assert_eq!(rs.value_at(9), 2);
    }

    #[test]
    fn test_decoration_list_layers() {
        let mut dl = DecorationList::new(30);
        dl.set_current_indicator(8);
        let fr = dl.fill_current(3, 4);
        assert!(fr.changed);
        dl.set_current_indicator(9);
        dl.set_current_value(5);
        dl.fill_current(3, 4);
        assert_eq!(dl.value_at(8, 3), 1);
        assert_eq!(dl.value_at(9, 3), 5);
        assert_eq!(dl.active_indicators(), vec![8, 9]);
        dl.set_current_indicator(8);
        dl.clear_range(3, 4);
        assert_eq!(dl.active_indicators(), vec![9]);
    }

    #[test]
    fn test_decoration_list_splices_all_layers() {
        let mut dl = DecorationList::new(10);
        dl.set_current_indicator(1);
        dl.fill_current(4, 3);
        dl.set_current_indicator(2);
        dl.fill_current(0, 2);
        dl.insert_space(0, 5);
        assert_eq!(dl.value_at(1, 9), 1);
        assert_eq!(dl.value_at(2, 5), 1);
        dl.delete_range(0, 5);
        assert_eq!(dl.value_at(1, 4), 1);
        // Layer 2 lost its whole range and is dropped.
        assert_eq!(dl.active_indicators(), vec![1]);
    }
}
