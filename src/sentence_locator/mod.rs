// WHY: Offset-driven sentence bounds for citation markers
// Scans outward from a marker instead of segmenting the whole document, so each marker's
// sentence is decided by the boundaries nearest to it

use regex_automata::meta::Regex;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{compile, Result};
use crate::marker::MarkerScanner;
use crate::position::{advance_chars, char_len, floor_char_boundary, retreat_chars, BytePos};

pub mod abbreviations;

pub use abbreviations::AbbreviationChecker;

/// How far the bracket guard looks for the partner of an unbalanced bracket
const BRACKET_PARTNER_SCAN_BYTES: usize = 300;

/// Half-open byte range of the sentence enclosing an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceBounds {
    pub start: BytePos,
    pub end: BytePos,
}

impl SentenceBounds {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: BytePos(start),
            end: BytePos(end),
        }
    }

    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start.0..self.end.0]
    }

    pub fn contains(&self, pos: BytePos) -> bool {
        self.start <= pos && pos < self.end
    }

    pub fn len_chars(&self, text: &str) -> usize {
        char_len(self.as_str(text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryKind {
    Punctuation,
    ParagraphBreak,
}

/// A sentence boundary that survived the abbreviation guard
#[derive(Debug, Clone, Copy)]
struct Boundary {
    kind: BoundaryKind,
    /// Terminal punctuation, or the first newline of a paragraph break
    anchor: usize,
    /// Exclusive end of the sentence before the boundary
    end: usize,
    /// First byte of the sentence after the boundary
    next_start: usize,
}

/// Boundary candidates of one text, built once and queried per marker
pub struct BoundaryIndex<'t> {
    text: &'t str,
    boundaries: Vec<Boundary>,
}

impl<'t> BoundaryIndex<'t> {
    pub fn text(&self) -> &'t str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn paragraph_breaks(&self) -> usize {
        self.boundaries
            .iter()
            .filter(|b| b.kind == BoundaryKind::ParagraphBreak)
            .count()
    }
}

pub struct SentenceLocator {
    boundary_pattern: Regex,
    abbreviation_checker: AbbreviationChecker,
    markers: MarkerScanner,
    safety_window_chars: usize,
    safety_half_window_chars: usize,
}

impl SentenceLocator {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        // Compositional pattern components
        let sentence_end_punct = r"[.!?]";
        let closers = r#"["'\u{201D}\u{2019})\]]*"#;
        let separator = r"\s+";
        let sentence_start_chars = r#"[\p{Lu}"'\u{201C}\u{2018}(\[{\u{2022}\u{00B7}*\-0-9]"#;
        let paragraph_break = r"\n[ \t\r]*\n";

        let pattern = format!(
            "(?:{sentence_end_punct}{closers}{separator}{sentence_start_chars})|(?:{paragraph_break})"
        );
        debug!("Compiling sentence boundary pattern: {}", pattern);

        Ok(Self {
            boundary_pattern: compile("sentence-boundary", &pattern)?,
            abbreviation_checker: AbbreviationChecker::new(&config.abbreviation_table),
            markers: MarkerScanner::new()?,
            safety_window_chars: config.safety_window_chars,
            safety_half_window_chars: config.safety_half_window_chars,
        })
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(&EngineConfig::default())
    }

    /// Collect every accepted boundary candidate in `text`
    pub fn index<'t>(&self, text: &'t str) -> BoundaryIndex<'t> {
        let mut boundaries = Vec::new();

        for m in self.boundary_pattern.find_iter(text) {
            let anchor = m.start();
            if text.as_bytes()[anchor] == b'\n' {
                boundaries.push(Boundary {
                    kind: BoundaryKind::ParagraphBreak,
                    anchor,
                    end: anchor,
                    next_start: m.end(),
                });
                continue;
            }

            // WHY: a period that closes "Fig." or "et al." is not a sentence end
            if self.abbreviation_checker.ends_with_abbreviation(text, anchor) {
                continue;
            }

            let after_punct = anchor + 1;
            let closers_len = text[after_punct..]
                .chars()
                .take_while(|c| is_closer(*c))
                .map(char::len_utf8)
                .sum::<usize>();
            let last_char_len = text[..m.end()].chars().next_back().map_or(1, char::len_utf8);

            boundaries.push(Boundary {
                kind: BoundaryKind::Punctuation,
                anchor,
                end: after_punct + closers_len,
                next_start: m.end() - last_char_len,
            });
        }

        BoundaryIndex { text, boundaries }
    }

    /// Bounds of the sentence containing `offset`; pure and deterministic
    pub fn find_sentence_bounds(&self, text: &str, offset: BytePos) -> SentenceBounds {
        let index = self.index(text);
        self.bounds_in(&index, offset)
    }

    /// Bounds query against a prebuilt index
    pub fn bounds_in(&self, index: &BoundaryIndex<'_>, offset: BytePos) -> SentenceBounds {
        let text = index.text;
        if text.is_empty() {
            return SentenceBounds::new(0, 0);
        }
        let offset = floor_char_boundary(text, offset.0.min(text.len() - 1));

        let (mut start, previous) = self.scan_backward(index, offset, index.boundaries.len());
        let mut end = self.scan_forward(index, offset);

        // WHY: a marker opening a sentence cites the sentence before it, never across a paragraph break
        if let Some(i) = previous {
            if index.boundaries[i].kind == BoundaryKind::Punctuation
                && self.markers.token_at(text, offset).is_some()
                && self.markers.is_marker_only(&text[start..offset])
            {
                let anchor = index.boundaries[i].anchor;
                let (previous_start, _) = self.scan_backward(index, anchor, i);
                start = previous_start;
                end = self.markers.cluster_end(text, offset);
                debug!(offset, start, end, "Attached leading marker to preceding sentence");
            }
        }

        self.apply_safety_valve(text, start, end, offset)
    }

    /// Closest accepted boundary before `offset` among the first `limit` boundaries
    fn scan_backward(&self, index: &BoundaryIndex<'_>, offset: usize, limit: usize) -> (usize, Option<usize>) {
        let text = index.text;
        for (i, boundary) in index.boundaries[..limit].iter().enumerate().rev() {
            if boundary.next_start > offset || boundary.anchor >= offset {
                continue;
            }
            let between = &text[boundary.end.min(offset)..offset];
            if unmatched_closers(between) > 0
                && has_open_bracket_before(text, boundary.anchor)
            {
                continue;
            }
            return (boundary.next_start, Some(i));
        }
        (0, None)
    }

    /// First accepted boundary ending after `offset`
    fn scan_forward(&self, index: &BoundaryIndex<'_>, offset: usize) -> usize {
        let text = index.text;
        for boundary in &index.boundaries {
            if boundary.end <= offset || boundary.anchor < offset {
                continue;
            }
            let between = &text[offset..boundary.anchor];
            if unmatched_openers(between) > 0 && has_close_bracket_after(text, boundary.end) {
                continue;
            }
            // Paragraph breaks end the sentence at the break, minus trailing spaces
            return match boundary.kind {
                BoundaryKind::Punctuation => boundary.end,
                BoundaryKind::ParagraphBreak => {
                    match text[offset..boundary.end].trim_end().len() {
                        0 => boundary.end,
                        trimmed => offset + trimmed,
                    }
                }
            };
        }
        text.len()
    }

    /// Replace runaway bounds with a word-aligned window around `offset`
    fn apply_safety_valve(&self, text: &str, start: usize, end: usize, offset: usize) -> SentenceBounds {
        let natural = SentenceBounds::new(start, end);
        let natural_chars = natural.len_chars(text);
        if natural_chars <= self.safety_window_chars {
            return natural;
        }

        let half = self.safety_half_window_chars.max(1);
        let snap_limit = self.safety_window_chars.saturating_sub(2 * half) / 2;

        let window_start = retreat_chars(text, offset, half).max(start);
        let window_end = advance_chars(text, offset, half)
            .min(end)
            .max(advance_chars(text, offset, 1));

        let window_start = snap_left(text, window_start, start, snap_limit);
        let window_end = snap_right(text, window_end, end, snap_limit);

        debug!(
            natural_chars,
            window_start, window_end, "Safety valve replaced runaway sentence bounds"
        );
        SentenceBounds::new(window_start, window_end)
    }
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | '\u{201D}' | '\u{2019}' | ')' | ']')
}

/// Closing brackets in `segment` with no opener inside it
fn unmatched_closers(segment: &str) -> usize {
    let mut depth = 0usize;
    let mut unmatched = 0usize;
    for c in segment.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' if depth > 0 => depth -= 1,
            ')' | ']' => unmatched += 1,
            _ => {}
        }
    }
    unmatched
}

/// Opening brackets in `segment` never closed inside it
fn unmatched_openers(segment: &str) -> usize {
    let mut depth = 0usize;
    for c in segment.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

fn has_open_bracket_before(text: &str, pos: usize) -> bool {
    let scan_start = floor_char_boundary(text, pos.saturating_sub(BRACKET_PARTNER_SCAN_BYTES));
    let mut closes = 0usize;
    for c in text[scan_start..pos].chars().rev() {
        match c {
            ')' | ']' => closes += 1,
            '(' | '[' if closes == 0 => return true,
            '(' | '[' => closes -= 1,
            _ => {}
        }
    }
    false
}

fn has_close_bracket_after(text: &str, pos: usize) -> bool {
    let scan_end = floor_char_boundary(text, pos.saturating_add(BRACKET_PARTNER_SCAN_BYTES));
    let mut opens = 0usize;
    for c in text[pos..scan_end].chars() {
        match c {
            '(' | '[' => opens += 1,
            ')' | ']' if opens == 0 => return true,
            ')' | ']' => opens -= 1,
            _ => {}
        }
    }
    false
}

fn snap_left(text: &str, mut pos: usize, floor: usize, limit: usize) -> usize {
    for _ in 0..limit {
        if pos <= floor {
            break;
        }
        match text[..pos].chars().next_back() {
            Some(c) if !c.is_whitespace() => pos -= c.len_utf8(),
            _ => break,
        }
    }
    pos
}

fn snap_right(text: &str, mut pos: usize, ceiling: usize, limit: usize) -> usize {
    for _ in 0..limit {
        if pos >= ceiling {
            break;
        }
        match text[pos..].chars().next() {
            Some(c) if !c.is_whitespace() => pos += c.len_utf8(),
            _ => break,
        }
    }
    pos
}
