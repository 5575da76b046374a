//! Standard-syntax regex back-end.
//!
//! Wraps the `regex` crate over the document bytes. The compiled pattern
//! is cached keyed by (flags, pattern bytes) so repeating the same search
//! only pays dispatch. Matching materialises the searched range once;
//! reverse searches take the last match of a forward scan.

use regex::bytes::{Regex, RegexBuilder};
use tracing::debug;

use crate::document::Document;
use crate::search::FindOption;
use crate::watcher::RegexError;

use super::{substitute_template, MatchSpans, MAXTAG, RegexSearcher};

/// The `regex`-crate engine with its one-entry compile cache.
#[derive(Default)]
pub struct StandardRegex {
    cached: Option<(FindOption, Vec<u8>, Regex)>,
    spans: MatchSpans,
}

impl StandardRegex {
    /// A fresh engine with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&mut self, pattern: &[u8], flags: FindOption) -> Result<&Regex, RegexError> {
        let relevant = flags & (FindOption::MATCH_CASE | FindOption::REGEX_DOT_ALL);
        let stale = match &self.cached {
            Some((cached_flags, cached_pattern, _)) => {
                *cached_flags != relevant || cached_pattern != pattern
            }
            None => true,
        };
        if stale {
            let source = std::str::from_utf8(pattern)
                .map_err(|_| RegexError::new("pattern is not valid UTF-8"))?;
            let regex = RegexBuilder::new(source)
                .case_insensitive(!flags.contains(FindOption::MATCH_CASE))
                .dot_matches_new_line(flags.contains(FindOption::REGEX_DOT_ALL))
                .multi_line(true)
                .build()
                .map_err(|e| {
                    debug!(pattern = source, error = %e, "standard regex failed to compile");
                    RegexError::new(e.to_string())
                })?;
            self.cached = Some((relevant, pattern.to_vec(), regex));
        }
        Ok(&self.cached.as_ref().expect("just cached").2)
    }

    fn record(&mut self, captures: &regex::bytes::Captures<'_>, base: usize) {
        self.spans = MatchSpans::default();
        for i in 0..captures.len().min(MAXTAG) {
            if let Some(group) = captures.get(i) {
                self.spans.bopat[i] = Some(base + group.start());
                self.spans.eopat[i] = Some(base + group.end());
            }
        }
    }
}

impl RegexSearcher for StandardRegex {
    fn find_text(
        &mut self,
        doc: &Document,
        min_pos: usize,
        max_pos: usize,
        pattern: &[u8],
        flags: FindOption,
        length: &mut usize,
    ) -> Result<Option<usize>, RegexError> {
        let forward = min_pos <= max_pos;
        let lo = doc.move_position_outside_char(min_pos.min(max_pos), 1, true);
        let hi = doc.move_position_outside_char(min_pos.max(max_pos), 1, true);

        self.compiled(pattern, flags)?;
        let haystack = doc.get_char_range(lo, hi - lo);
        let regex = &self.cached.as_ref().expect("compiled above").2;

        let found = if forward {
            regex.captures(&haystack)
        } else {
            // Last match of a forward scan, skipping empty matches that
            // would otherwise pin the scan in place.
            let mut last: Option<regex::bytes::Captures<'_>> = None;
            let mut at = 0usize;
            while at <= haystack.len() {
                let Some(captures) = regex.captures_at(&haystack, at) else {
                    break;
                };
                let whole = captures.get(0).expect("group 0 always present");
                at = if whole.end() > whole.start() {
                    whole.end()
                } else {
                    whole.end() + 1
                };
                last = Some(captures);
            }
            last
        };

        match found {
            Some(captures) => {
                let whole = captures.get(0).expect("group 0 always present");
                self.record(&captures, lo);
                *length = whole.end() - whole.start();
                Ok(Some(lo + whole.start()))
            }
            None => Ok(None),
        }
    }

    fn substitute_by_position(
        &mut self,
        doc: &Document,
        template: &[u8],
        length: &mut usize,
    ) -> Option<Vec<u8>> {
        let substituted = substitute_template(doc, &self.spans, template);
        *length = substituted.len();
        Some(substituted)
    }
}
