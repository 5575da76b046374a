//! Per-line metadata stores.
//!
//! Five homogeneous structures keyed by line index: marker bitmasks, fold
//! levels, lexer line states, and three text annotation stores (margin,
//! above-line, end-of-line). Each implements the `PerLine` capability so
//! the document can resize them atomically whenever lines are inserted or
//! removed.

/// Capability shared by every per-line store.
pub trait PerLine {
    /// Drop all contents.
    fn init(&mut self);
    /// Whether the store holds any data worth maintaining.
    fn is_active(&self) -> bool;
    /// A line was inserted before index `line`.
    fn insert_line(&mut self, line: usize);
    /// `count` lines were inserted before index `line`.
    fn insert_lines(&mut self, line: usize, count: usize) {
        for _ in 0..count {
            self.insert_line(line);
        }
    }
    /// The line at index `line` was removed.
    fn remove_line(&mut self, line: usize);
}

// --- markers ---

/// One marker instance on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MarkerHandleNumber {
    handle: i32,
    number: i32,
}

/// Marker bitmasks per line, with stable handles per marker instance.
#[derive(Debug, Default)]
pub struct LineMarkers {
    markers: Vec<Vec<MarkerHandleNumber>>,
    handle_current: i32,
}

impl LineMarkers {
    /// An empty marker store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bitmask of marker numbers present on `line`.
    pub fn mark_value(&self, line: usize) -> u32 {
        self.markers
            .get(line)
            .map(|ms| {
                ms.iter()
                    .filter(|m| (0..32).contains(&m.number))
                    .fold(0u32, |acc, m| acc | (1 << m.number))
            })
            .unwrap_or(0)
    }

    /// Add marker `marker_num` to `line`, returning its handle.
    pub fn add_mark(&mut self, line: usize, marker_num: i32, lines_total: usize) -> i32 {
        if self.markers.len() < lines_total {
            self.markers.resize_with(lines_total, Vec::new);
        }
        self.handle_current += 1;
        let handle = self.handle_current;
        self.markers[line].push(MarkerHandleNumber {
            handle,
            number: marker_num,
        });
        handle
    }

    /// Delete marker `marker_num` from `line`; negative deletes all
    /// markers on the line. With `all` false only the first instance goes.
    /// Returns `true` when something was removed.
    pub fn delete_mark(&mut self, line: usize, marker_num: i32, all: bool) -> bool {
        let Some(ms) = self.markers.get_mut(line) else {
            return false;
        };
        let before = ms.len();
        if marker_num < 0 {
            ms.clear();
        } else if all {
            ms.retain(|m| m.number != marker_num);
        } else if let Some(idx) = ms.iter().position(|m| m.number == marker_num) {
            ms.remove(idx);
        }
        ms.len() != before
    }

    /// Delete the marker instance with `handle`, wherever it lives.
    pub fn delete_mark_from_handle(&mut self, handle: i32) -> bool {
        for ms in &mut self.markers {
            if let Some(idx) = ms.iter().position(|m| m.handle == handle) {
                ms.remove(idx);
                return true;
            }
        }
        false
    }

    /// The line currently holding `handle`.
    pub fn line_from_handle(&self, handle: i32) -> Option<usize> {
        self.markers
            .iter()
            .position(|ms| ms.iter().any(|m| m.handle == handle))
    }

    /// Marker number of the `which`-th marker on `line`.
    pub fn number_from_line(&self, line: usize, which: usize) -> Option<i32> {
        self.markers.get(line)?.get(which).map(|m| m.number)
    }

    /// Handle of the `which`-th marker on `line`.
    pub fn handle_from_line(&self, line: usize, which: usize) -> Option<i32> {
        self.markers.get(line)?.get(which).map(|m| m.handle)
    }

    /// The next line at or after `line_start` whose marks intersect `mask`.
    pub fn marker_next(&self, line_start: usize, mask: u32) -> Option<usize> {
        (line_start..self.markers.len()).find(|&line| self.mark_value(line) & mask != 0)
    }
}

impl PerLine for LineMarkers {
    fn init(&mut self) {
        self.markers.clear();
    }

    fn is_active(&self) -> bool {
        self.markers.iter().any(|ms| !ms.is_empty())
    }

    fn insert_line(&mut self, line: usize) {
        if !self.markers.is_empty() && line <= self.markers.len() {
            self.markers.insert(line, Vec::new());
        }
    }

    fn remove_line(&mut self, line: usize) {
        // Keep the markers of a deleted line by merging them upwards.
        if !self.markers.is_empty() && line < self.markers.len() {
            let removed = self.markers.remove(line);
            if line > 0 {
                self.markers[line - 1].extend(removed);
            }
        }
    }
}

// --- fold levels ---

/// Base fold level number for ordinary lines.
pub const LEVEL_BASE: u32 = 0x400;
/// Flag: the line is blank for folding purposes.
pub const LEVEL_WHITE_FLAG: u32 = 0x1000;
/// Flag: the line heads a fold block.
pub const LEVEL_HEADER_FLAG: u32 = 0x2000;
/// Mask extracting the level number.
pub const LEVEL_NUMBER_MASK: u32 = 0x0FFF;

/// The numeric part of a fold level.
pub const fn level_number(level: u32) -> u32 {
    level & LEVEL_NUMBER_MASK
}

/// Whether the level carries the header flag.
pub const fn level_is_header(level: u32) -> bool {
    level & LEVEL_HEADER_FLAG != 0
}

/// Whether the level carries the whitespace flag.
pub const fn level_is_whitespace(level: u32) -> bool {
    level & LEVEL_WHITE_FLAG != 0
}

/// Fold level per line.
#[derive(Debug, Default)]
pub struct LineLevels {
    levels: Vec<u32>,
}

impl LineLevels {
    /// An empty level store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level of `line`, growing the store to `lines_total`.
    /// Returns the previous level.
    pub fn set_level(&mut self, line: usize, level: u32, lines_total: usize) -> u32 {
        if self.levels.len() < lines_total {
            self.levels.resize(lines_total, LEVEL_BASE);
        }
        if line >= self.levels.len() {
            return LEVEL_BASE;
        }
        std::mem::replace(&mut self.levels[line], level)
    }

    /// The level of `line`; lines never assigned report the base level.
    pub fn get_level(&self, line: usize) -> u32 {
        self.levels.get(line).copied().unwrap_or(LEVEL_BASE)
    }

    /// Drop all levels.
    pub fn clear_levels(&mut self) {
        self.levels.clear();
    }

    /// The nearest ancestor header line of `line`, if any.
    pub fn fold_parent(&self, line: usize) -> Option<usize> {
        let level_number_line = level_number(self.get_level(line));
        let mut look = line.checked_sub(1)?;
        loop {
            let look_level = self.get_level(look);
            if level_is_header(look_level) && level_number(look_level) < level_number_line {
                return Some(look);
            }
            look = look.checked_sub(1)?;
        }
    }
}

impl PerLine for LineLevels {
    fn init(&mut self) {
        self.levels.clear();
    }

    fn is_active(&self) -> bool {
        !self.levels.is_empty()
    }

    fn insert_line(&mut self, line: usize) {
        if !self.levels.is_empty() && line <= self.levels.len() {
            // The new line takes over the level of the line it displaces so
            // existing folds stay stable; the header flag stays behind.
            let level = if line < self.levels.len() {
                self.levels[line] & !LEVEL_HEADER_FLAG
            } else {
                LEVEL_BASE
            };
            self.levels.insert(line, level);
        }
    }

    fn remove_line(&mut self, line: usize) {
        if !self.levels.is_empty() && line < self.levels.len() {
            self.levels.remove(line);
        }
    }
}

// --- lexer line state ---

/// Integer state per line, owned by the lexer.
#[derive(Debug, Default)]
pub struct LineStates {
    states: Vec<i32>,
}

impl LineStates {
    /// An empty state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of `line`, growing the store to `lines_total`.
    /// Returns the previous state.
    pub fn set_line_state(&mut self, line: usize, state: i32, lines_total: usize) -> i32 {
        if self.states.len() < lines_total.max(line + 1) {
            self.states.resize(lines_total.max(line + 1), 0);
        }
        std::mem::replace(&mut self.states[line], state)
    }

    /// The state of `line` (0 when never set).
    pub fn get_line_state(&self, line: usize) -> i32 {
        self.states.get(line).copied().unwrap_or(0)
    }

    /// The highest line with any state stored.
    pub fn max_line_state(&self) -> usize {
        self.states.len()
    }
}

impl PerLine for LineStates {
    fn init(&mut self) {
        self.states.clear();
    }

    fn is_active(&self) -> bool {
        !self.states.is_empty()
    }

    fn insert_line(&mut self, line: usize) {
        if !self.states.is_empty() && line <= self.states.len() {
            self.states.insert(line, 0);
        }
    }

    fn remove_line(&mut self, line: usize) {
        if !self.states.is_empty() && line < self.states.len() {
            self.states.remove(line);
        }
    }
}

// --- annotations (margin / above-line / end-of-line) ---

#[derive(Debug, Clone)]
struct AnnotationData {
    text: String,
    /// Style applied to the whole text when `styles` is `None`.
    style: u8,
    /// Optional per-byte styles, same length as `text`.
    styles: Option<Vec<u8>>,
    /// Cached display line count of `text`.
    lines: usize,
}

/// UTF-8 text attached to lines, with one style or per-byte styles.
///
/// Used for margin text, above-line annotations and end-of-line
/// annotations; the three instances differ only in which notification the
/// document broadcasts for them.
#[derive(Debug, Default)]
pub struct LineAnnotations {
    annotations: Vec<Option<Box<AnnotationData>>>,
}

impl LineAnnotations {
    /// An empty annotation store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no line carries an annotation.
    pub fn empty(&self) -> bool {
        !self.is_active()
    }

    /// The annotation text of `line`.
    pub fn text(&self, line: usize) -> Option<&str> {
        self.data(line).map(|d| d.text.as_str())
    }

    /// Byte length of the annotation text of `line`.
    pub fn length(&self, line: usize) -> usize {
        self.data(line).map_or(0, |d| d.text.len())
    }

    /// The single style of `line`'s annotation.
    pub fn style(&self, line: usize) -> u8 {
        self.data(line).map_or(0, |d| d.style)
    }

    /// Per-byte styles of `line`'s annotation, when individual styles are
    /// in use.
    pub fn styles(&self, line: usize) -> Option<&[u8]> {
        self.data(line)?.styles.as_deref()
    }

    /// Whether `line` uses per-byte styles.
    pub fn multiple_styles(&self, line: usize) -> bool {
        self.data(line).is_some_and(|d| d.styles.is_some())
    }

    /// Number of display lines the annotation of `line` occupies.
    pub fn lines(&self, line: usize) -> usize {
        self.data(line).map_or(0, |d| d.lines)
    }

    fn data(&self, line: usize) -> Option<&AnnotationData> {
        self.annotations.get(line)?.as_deref()
    }

    /// Set or clear (`None`) the annotation text of `line`.
    pub fn set_text(&mut self, line: usize, text: Option<&str>) {
        match text {
            Some(text) => {
                if self.annotations.len() <= line {
                    self.annotations.resize_with(line + 1, || None);
                }
                let lines = text.split('\n').count();
                self.annotations[line] = Some(Box::new(AnnotationData {
                    text: text.to_string(),
                    style: 0,
                    styles: None,
                    lines,
                }));
            }
            None => {
                if let Some(slot) = self.annotations.get_mut(line) {
                    *slot = None;
                }
            }
        }
    }

    /// Set the single style of `line`'s annotation, dropping any per-byte
    /// styles.
    pub fn set_style(&mut self, line: usize, style: u8) {
        if let Some(Some(data)) = self.annotations.get_mut(line) {
            data.style = style;
            data.styles = None;
        }
    }

    /// Set per-byte styles for `line`'s annotation. The array is clipped or
    /// padded with the single style to the text length.
    pub fn set_styles(&mut self, line: usize, styles: &[u8]) {
        if let Some(Some(data)) = self.annotations.get_mut(line) {
            let mut padded = styles.to_vec();
            padded.resize(data.text.len(), data.style);
            data.styles = Some(padded);
        }
    }

    /// Drop all annotations.
    pub fn clear_all(&mut self) {
        self.annotations.clear();
    }
}

impl PerLine for LineAnnotations {
    fn init(&mut self) {
        self.annotations.clear();
    }

    fn is_active(&self) -> bool {
        self.annotations.iter().any(|a| a.is_some())
    }

    fn insert_line(&mut self, line: usize) {
        if !self.annotations.is_empty() && line <= self.annotations.len() {
            self.annotations.insert(line, None);
        }
    }

    fn remove_line(&mut self, line: usize) {
        if !self.annotations.is_empty() && line < self.annotations.len() {
            self.annotations.remove(line);
        }
    }
}
