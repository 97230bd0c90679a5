//! Strings that remember where their characters came from.
//!
//! A [`SourcedString`] carries, next to its text, an ordered list of
//! [`SourceSpan`]s mapping runs of its characters back to runs of an original
//! string. Slicing, concatenating and splitting keep that mapping intact, so a
//! token cut out of a decoded document can still be located in the text the
//! host sent.
//!
//! All offsets are counted in `char`s, matching annotation offsets.

use std::fmt;
use std::ops::{Add, Range};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::entities::NAMED_REFERENCES;

/// Maps a run of transformed text back to a run of an original string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// Inclusive start of the run in the transformed string
    pub start: usize,
    /// Exclusive end of the run in the transformed string
    pub end: usize,
    /// The original text this run was taken from
    pub source: Arc<str>,
    /// Inclusive start of the run in `source`
    pub source_start: usize,
    /// Exclusive end of the run in `source`
    pub source_end: usize,
}

impl SourceSpan {
    /// Whether every transformed char maps to exactly one source char.
    ///
    /// Replaced runs (a decoded `&amp;` is one char for five) are not linear and
    /// are never split when sliced.
    pub fn is_linear(&self) -> bool {
        self.end - self.start == self.source_end - self.source_start
    }

    /// Intersect with `[from, to)` and rebase onto `from`.
    fn clip(&self, from: usize, to: usize) -> Option<SourceSpan> {
        let start = self.start.max(from);
        let end = self.end.min(to);
        if start >= end {
            return None;
        }

        let (source_start, source_end) = if self.is_linear() {
            (
                self.source_start + (start - self.start),
                self.source_end - (self.end - end),
            )
        } else {
            (self.source_start, self.source_end)
        };

        Some(SourceSpan {
            start: start - from,
            end: end - from,
            source: Arc::clone(&self.source),
            source_start,
            source_end,
        })
    }

    fn shifted(&self, by: usize) -> SourceSpan {
        SourceSpan {
            start: self.start + by,
            end: self.end + by,
            ..self.clone()
        }
    }

    /// Inverse of `source_offset_at` for a source offset inside the run.
    fn target_offset(&self, source_offset: usize) -> usize {
        if self.is_linear() {
            self.start + (source_offset - self.source_start)
        } else {
            self.start
        }
    }

    fn source_offset_at(&self, offset: usize) -> usize {
        if self.is_linear() {
            self.source_start + (offset - self.start)
        } else {
            self.source_start
        }
    }
}

/// A resolved location in an original string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition<'a> {
    /// The original text
    pub source: &'a str,
    /// Char offset within `source`
    pub offset: usize,
}

/// Text plus a reversible mapping to the text(s) it was derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcedString {
    text: String,
    char_len: usize,
    spans: Vec<SourceSpan>,
    /// Set once the spans stop climbing through a single source in order.
    reordered: bool,
}

impl SourcedString {
    /// Track `text` as its own source.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let char_len = text.chars().count();
        let spans = if char_len == 0 {
            Vec::new()
        } else {
            vec![SourceSpan {
                start: 0,
                end: char_len,
                source: Arc::from(text.as_str()),
                source_start: 0,
                source_end: char_len,
            }]
        };

        Self {
            text,
            char_len,
            spans,
            reordered: false,
        }
    }

    /// Text that has no counterpart in any original string.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            char_len: text.chars().count(),
            text,
            spans: Vec::new(),
            reordered: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.char_len
    }

    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    pub fn spans(&self) -> &[SourceSpan] {
        &self.spans
    }

    /// True when offsets in this string are offsets in its single source.
    pub fn is_identity(&self) -> bool {
        match self.spans.as_slice() {
            [] => self.char_len == 0,
            [span] => {
                span.is_linear()
                    && span.start == 0
                    && span.end == self.char_len
                    && span.source_start == 0
                    && span.source.chars().count() == self.char_len
            }
            _ => false,
        }
    }

    fn byte_offset(&self, char_offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_offset)
            .map_or(self.text.len(), |(idx, _)| idx)
    }

    /// Chars `[range.start, range.end)`, clamped to the string.
    ///
    /// Provenance spans are clipped to the range and rebased to it. An empty
    /// result carries no span.
    pub fn slice(&self, range: Range<usize>) -> SourcedString {
        let end = range.end.min(self.char_len);
        let start = range.start.min(end);
        if start == end {
            return SourcedString::default();
        }

        let text = &self.text[self.byte_offset(start)..self.byte_offset(end)];
        let mut sliced = SourcedString::literal(text);
        for span in self.spans.iter().filter_map(|span| span.clip(start, end)) {
            sliced.append_span(span);
        }
        sliced
    }

    /// Append `other`, laying its spans after ours.
    pub fn push(&mut self, other: &SourcedString) {
        let offset = self.char_len;
        self.text.push_str(&other.text);
        self.char_len += other.char_len;
        for span in &other.spans {
            self.append_span(span.shifted(offset));
        }
    }

    fn append_span(&mut self, span: SourceSpan) {
        if let Some(last) = self.spans.last() {
            if !Arc::ptr_eq(&last.source, &span.source) || last.source_end > span.source_start {
                self.reordered = true;
            }
        }
        self.spans.push(span);
    }

    /// Append text with no original counterpart.
    pub fn push_literal(&mut self, text: &str) {
        self.text.push_str(text);
        self.char_len += text.chars().count();
    }

    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a SourcedString>) -> SourcedString {
        let mut joined = SourcedString::default();
        for part in parts {
            joined.push(part);
        }
        joined
    }

    /// Split on every occurrence of `sep`, like [`str::split`].
    ///
    /// Each piece keeps the provenance of the run it was cut from.
    pub fn split(&self, sep: &str) -> Vec<SourcedString> {
        if sep.is_empty() {
            return vec![self.clone()];
        }

        let sep_chars = sep.chars().count();
        let mut pieces = Vec::new();
        let mut piece_start = 0;
        let mut chars_seen = 0;
        let mut bytes_seen = 0;
        for (byte_idx, _) in self.text.match_indices(sep) {
            chars_seen += self.text[bytes_seen..byte_idx].chars().count();
            bytes_seen = byte_idx;
            pieces.push(self.slice(piece_start..chars_seen));
            piece_start = chars_seen + sep_chars;
        }
        pieces.push(self.slice(piece_start..self.char_len));
        pieces
    }

    /// Split on Unicode word boundaries (UAX #29), keeping every segment.
    pub fn split_word_bounds(&self) -> Vec<SourcedString> {
        self.word_bound_ranges()
            .into_iter()
            .map(|(range, _)| self.slice(range))
            .collect()
    }

    /// Char ranges of the word-bound segments that contain a letter or digit.
    pub fn word_ranges(&self) -> Vec<Range<usize>> {
        self.word_bound_ranges()
            .into_iter()
            .filter(|(_, segment)| segment.chars().any(char::is_alphanumeric))
            .map(|(range, _)| range)
            .collect()
    }

    fn word_bound_ranges(&self) -> Vec<(Range<usize>, &str)> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for segment in self.text.split_word_bounds() {
            let end = start + segment.chars().count();
            ranges.push((start..end, segment));
            start = end;
        }
        ranges
    }

    fn span_at(&self, offset: usize) -> Option<&SourceSpan> {
        let idx = self.spans.partition_point(|span| span.end <= offset);
        self.spans
            .get(idx)
            .filter(|span| span.start <= offset && offset < span.end)
    }

    /// Where the char at `offset` came from.
    pub fn resolve(&self, offset: usize) -> Option<SourcePosition<'_>> {
        self.span_at(offset).map(|span| SourcePosition {
            source: &*span.source,
            offset: span.source_offset_at(offset),
        })
    }

    /// Map a boundary offset (start or end of a span) into source coordinates.
    ///
    /// Unlike [`resolve`](Self::resolve) this also accepts the offset just past
    /// a tracked run, so end offsets map to the end of their source run.
    pub fn to_source_offset(&self, offset: usize) -> Option<usize> {
        if let Some(span) = self.span_at(offset) {
            return Some(span.source_offset_at(offset));
        }
        let span = self.span_at(offset.checked_sub(1)?)?;
        Some(if span.is_linear() {
            span.source_start + (offset - span.start)
        } else {
            span.source_end
        })
    }

    /// Inverse of [`to_source_offset`](Self::to_source_offset).
    ///
    /// An offset landing inside a replaced run maps to the start of that run.
    pub fn from_source_offset(&self, source_offset: usize) -> Option<usize> {
        if self.reordered {
            return self.scan_source_offset(source_offset);
        }

        // source runs are disjoint and ascending, so `source_end` is too
        let idx = self.spans.partition_point(|span| span.source_end <= source_offset);
        if let Some(span) = self.spans.get(idx).filter(|span| span.source_start <= source_offset) {
            return Some(span.target_offset(source_offset));
        }
        idx.checked_sub(1)
            .and_then(|before| self.spans.get(before))
            .filter(|span| span.source_end == source_offset)
            .map(|span| span.end)
    }

    /// Fallback for strings stitched together from several sources.
    fn scan_source_offset(&self, source_offset: usize) -> Option<usize> {
        let inside = self
            .spans
            .iter()
            .find(|span| span.source_start <= source_offset && source_offset < span.source_end);
        if let Some(span) = inside {
            return Some(span.target_offset(source_offset));
        }

        self.spans
            .iter()
            .find(|span| span.source_end == source_offset)
            .map(|span| span.end)
    }

    fn push_source_run(&mut self, run: &str, source: &Arc<str>, source_start: usize) -> usize {
        let len = run.chars().count();
        if len > 0 {
            self.append_span(SourceSpan {
                start: self.char_len,
                end: self.char_len + len,
                source: Arc::clone(source),
                source_start,
                source_end: source_start + len,
            });
            self.text.push_str(run);
            self.char_len += len;
        }
        len
    }

    fn push_replacement(&mut self, replacement: char, source: &Arc<str>, source_run: Range<usize>) {
        self.append_span(SourceSpan {
            start: self.char_len,
            end: self.char_len + 1,
            source: Arc::clone(source),
            source_start: source_run.start,
            source_end: source_run.end,
        });
        self.text.push(replacement);
        self.char_len += 1;
    }
}

impl fmt::Display for SourcedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq<str> for SourcedString {
    fn eq(&self, other: &str) -> bool {
        self.text == other
    }
}

impl PartialEq<&str> for SourcedString {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl From<&str> for SourcedString {
    fn from(text: &str) -> Self {
        SourcedString::new(text)
    }
}

impl Add<&SourcedString> for SourcedString {
    type Output = SourcedString;

    fn add(mut self, rhs: &SourcedString) -> SourcedString {
        self.push(rhs);
        self
    }
}

impl Add<&str> for SourcedString {
    type Output = SourcedString;

    fn add(mut self, rhs: &str) -> SourcedString {
        self.push_literal(rhs);
        self
    }
}

// ============================================================================
// Character reference decoding
// ============================================================================

static CHARACTER_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#?[xX]?(?:[0-9a-fA-F]+|\w{1,8}));").expect("Invalid character reference regex")
});

fn decode_reference(name: &str) -> Option<char> {
    match name.strip_prefix('#') {
        Some(numeric) => {
            let code = match numeric.strip_prefix(|c| c == 'x' || c == 'X') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
        None => NAMED_REFERENCES.get(name).copied(),
    }
}

/// Decode HTML character references (`&amp;`, `&#233;`, `&#x41;`).
///
/// Every decoded char maps to its whole reference in `text`; references that
/// do not decode are kept verbatim.
pub fn unescape_entities(text: &str) -> SourcedString {
    if !text.contains('&') {
        return SourcedString::new(text);
    }

    let source: Arc<str> = Arc::from(text);
    let mut decoded = SourcedString::default();
    let mut copied_to = 0;
    let mut source_chars = 0;
    for captures in CHARACTER_REFERENCE.captures_iter(text) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let Some(replacement) = decode_reference(name.as_str()) else {
            continue;
        };

        source_chars += decoded.push_source_run(&text[copied_to..whole.start()], &source, source_chars);
        let reference_len = whole.as_str().chars().count();
        decoded.push_replacement(replacement, &source, source_chars..source_chars + reference_len);
        source_chars += reference_len;
        copied_to = whole.end();
    }
    decoded.push_source_run(&text[copied_to..], &source, source_chars);

    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &str = "This is a test string";

    #[test]
    fn test_creation_covers_whole_string() {
        let s = SourcedString::new(SENTENCE);
        assert_eq!(s.spans().len(), 1);
        assert_eq!(s.spans()[0].source_start, 0);
        assert_eq!(s.spans()[0].source_end, s.len());
        assert!(s.is_identity());
    }

    #[test]
    fn test_slice() {
        let s = SourcedString::new(SENTENCE);
        let sub = s.slice(5..10);

        assert_eq!(sub, "is a ");
        let span = &sub.spans()[0];
        assert_eq!(&*span.source, SENTENCE);
        assert_eq!((span.start, span.end), (0, 5));
        assert_eq!((span.source_start, span.source_end), (5, 10));
    }

    #[test]
    fn test_slice_out_of_bounds_is_clamped() {
        let s = SourcedString::new(SENTENCE);
        let sub = s.slice(19..25);

        assert_eq!(sub, "ng");
        assert_eq!(sub.spans()[0].source_start, 19);
        assert_eq!(sub.spans()[0].source_end, 21);
    }

    #[test]
    fn test_empty_slice_has_no_span() {
        let s = SourcedString::new(SENTENCE);
        assert!(s.slice(19..3).spans().is_empty());
        assert!(s.slice(4..4).spans().is_empty());
        assert!(SourcedString::new("").spans().is_empty());
    }

    #[test]
    fn test_split_keeps_provenance() {
        let s = SourcedString::new(SENTENCE);
        let pieces = s.split(" ");

        let texts: Vec<&str> = pieces.iter().map(|p| p.as_str()).collect();
        assert_eq!(texts, vec!["This", "is", "a", "test", "string"]);
        assert_eq!(pieces[0].spans()[0].source_start, 0);
        assert_eq!(pieces[0].spans()[0].source_end, 4);
        assert_eq!(pieces[1].spans()[0].source_start, 5);
        assert_eq!(pieces[1].spans()[0].source_end, 7);
        for piece in &pieces {
            assert_eq!(&*piece.spans()[0].source, SENTENCE);
        }
    }

    #[test]
    fn test_split_with_repeated_separator() {
        let s = SourcedString::new("a  b");
        let pieces = s.split(" ");
        assert_eq!(pieces.len(), 3);
        assert!(pieces[1].is_empty());
        assert!(pieces[1].spans().is_empty());
        assert_eq!(pieces[2].spans()[0].source_start, 3);
    }

    #[test]
    fn test_join_two_sourced_strings() {
        let joined = SourcedString::new("This is a ") + &SourcedString::new("test string");

        assert_eq!(joined, SENTENCE);
        assert_eq!(joined.spans().len(), 2);
        let (first, second) = (&joined.spans()[0], &joined.spans()[1]);
        assert_eq!((first.start, first.end), (0, 10));
        assert_eq!((first.source_start, first.source_end), (0, 10));
        assert_eq!((second.start, second.end), (10, 21));
        assert_eq!((second.source_start, second.source_end), (0, 11));
    }

    #[test]
    fn test_join_deep() {
        let joined = SourcedString::concat(&[
            SourcedString::new("This is a "),
            SourcedString::new("test string"),
            SourcedString::new("yes"),
        ]);

        assert_eq!(joined, "This is a test stringyes");
        assert_eq!(joined.spans().len(), 3);
        assert_eq!((joined.spans()[2].start, joined.spans()[2].end), (21, 24));
        assert_eq!(joined.spans()[2].source_end, 3);
    }

    #[test]
    fn test_join_sliced() {
        let joined = SourcedString::new("This is a ") + &SourcedString::new("test string").slice(0..4);

        assert_eq!(joined, "This is a test");
        assert_eq!((joined.spans()[1].start, joined.spans()[1].end), (10, 14));
        assert_eq!((joined.spans()[1].source_start, joined.spans()[1].source_end), (0, 4));
    }

    #[test]
    fn test_join_literal_has_no_provenance() {
        let joined = SourcedString::new("This is a ") + "test string";

        assert_eq!(joined, SENTENCE);
        assert_eq!(joined.spans().len(), 1);
        assert!(joined.resolve(12).is_none());
        assert!(!joined.is_identity());
    }

    #[test]
    fn test_concat_then_slice_resolves_into_both_sources() {
        let joined = SourcedString::new("ab") + &SourcedString::new("cd");
        let sliced = joined.slice(1..3);

        assert_eq!(sliced, "bc");
        assert_eq!(
            sliced.resolve(0),
            Some(SourcePosition {
                source: "ab",
                offset: 1
            })
        );
        assert_eq!(
            sliced.resolve(1),
            Some(SourcePosition {
                source: "cd",
                offset: 0
            })
        );
    }

    #[test]
    fn test_word_ranges() {
        let s = SourcedString::new("The quick (brown) fox.");
        let words: Vec<String> = s
            .word_ranges()
            .into_iter()
            .map(|range| s.slice(range).to_string())
            .collect();
        assert_eq!(words, vec!["The", "quick", "brown", "fox"]);

        let segments = s.split_word_bounds();
        assert_eq!(SourcedString::concat(&segments), s.as_str());
        assert_eq!(segments[2].spans()[0].source_start, 4);
    }

    #[test]
    fn test_unescape_maps_references_to_their_source() {
        let decoded = unescape_entities("a &amp; b");

        assert_eq!(decoded, "a & b");
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded.resolve(2).map(|p| p.offset), Some(2));
        assert_eq!(decoded.resolve(4).map(|p| p.offset), Some(8));

        // Boundary offsets
        assert_eq!(decoded.to_source_offset(3), Some(7));
        assert_eq!(decoded.to_source_offset(5), Some(9));
        assert_eq!(decoded.from_source_offset(8), Some(4));
        assert_eq!(decoded.from_source_offset(7), Some(3));
        assert_eq!(decoded.from_source_offset(9), Some(5));
        assert_eq!(decoded.from_source_offset(4), Some(2));
    }

    #[test]
    fn test_unescape_numeric_and_unknown_references() {
        let decoded = unescape_entities("&#65;&#x42;&bogus;");
        assert_eq!(decoded, "AB&bogus;");
        assert_eq!(decoded.to_source_offset(2), Some(11));
        assert_eq!(decoded.to_source_offset(9), Some(18));
    }

    #[test]
    fn test_unescape_full_named_reference_table() {
        let decoded = unescape_entities("&Eacute;t&eacute; &hearts; &alpha; &rarr;");
        assert_eq!(decoded, "Été ♥ α →");
        assert_eq!(unescape_entities("&thetasym;&apos;&lowast;"), "ϑ'∗");
        assert_eq!(decoded.to_source_offset(3), Some(17));
    }

    #[test]
    fn test_from_source_offset_across_many_runs() {
        let source = "x&amp;".repeat(100);
        let decoded = unescape_entities(&source);
        assert_eq!(decoded.len(), 200);
        assert_eq!(decoded.spans().len(), 200);

        for i in 0..100 {
            assert_eq!(decoded.from_source_offset(6 * i), Some(2 * i));
            for inside in 1..6 {
                assert_eq!(decoded.from_source_offset(6 * i + inside), Some(2 * i + 1));
            }
        }
        assert_eq!(decoded.from_source_offset(600), Some(200));
        assert_eq!(decoded.from_source_offset(601), None);

        let sliced = decoded.slice(10..20);
        assert_eq!(sliced.from_source_offset(30), Some(0));
        assert_eq!(sliced.from_source_offset(29), None);
        assert_eq!(sliced.from_source_offset(60), Some(10));
    }

    #[test]
    fn test_from_source_offset_on_swapped_halves() {
        let s = SourcedString::new("abcd");
        let swapped = s.slice(2..4) + &s.slice(0..2);

        assert_eq!(swapped, "cdab");
        assert_eq!(swapped.from_source_offset(0), Some(2));
        assert_eq!(swapped.from_source_offset(3), Some(1));
        assert_eq!(swapped.from_source_offset(2), Some(0));
        assert_eq!(swapped.from_source_offset(4), Some(2));
    }

    #[test]
    fn test_unescape_without_references_is_identity() {
        let decoded = unescape_entities("plain text");
        assert!(decoded.is_identity());
    }

    #[test]
    fn test_slice_never_splits_a_replaced_run() {
        let decoded = unescape_entities("x&lt;y");
        let lt = decoded.slice(1..2);
        assert_eq!(lt, "<");
        assert_eq!(lt.spans()[0].source_start, 1);
        assert_eq!(lt.spans()[0].source_end, 5);
    }
}
