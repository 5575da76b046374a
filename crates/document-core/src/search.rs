//! Search options and literal-search helpers.
//!
//! The literal scan itself runs on the document (it needs encoding-aware
//! navigation); this module holds the option flags and the
//! Boyer-Moore-Horspool-Sunday shift table shared by both directions.

use bitflags::bitflags;

bitflags! {
    /// Options controlling [`Document::find_text`](crate::Document::find_text).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FindOption: u32 {
        /// Compare case sensitively.
        const MATCH_CASE = 0x4;
        /// Accept a match only when both ends lie on word boundaries.
        const WHOLE_WORD = 0x2;
        /// Accept a match only when it starts on a word boundary.
        const WORD_START = 0x00100000;
        /// Treat the needle as a regular expression.
        const REGEXP = 0x00200000;
        /// In regex mode, let `.` match line-end bytes.
        const REGEX_DOT_ALL = 0x10000000;
        /// Use the standard-syntax regex engine instead of the built-in.
        const STANDARD_REGEX = 0x00800000;
    }
}

/// Shift table for the Boyer-Moore-Horspool-Sunday scan.
///
/// Keyed by the byte one past the current window end; entries are
/// sign-flipped for a reverse search so the scan loop can add them
/// unconditionally.
pub fn build_shift_table(pattern: &[u8], increment: isize) -> [isize; 256] {
    let len = pattern.len() as isize;
    let mut table = [(len + 1) * increment; 256];
    if increment >= 0 {
        let mut shift = len;
        for &b in pattern {
            table[b as usize] = shift;
            shift -= 1;
        }
    } else {
        let mut shift = -len;
        for &b in pattern.iter().rev() {
            table[b as usize] = shift;
            shift += 1;
        }
    }
    table
}
