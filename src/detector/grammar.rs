// WHY: One matcher per citation grammar; each yields validated candidates for the merge step
// Matchers never edit text, so a timed-out grammar can be dropped without side effects

use regex_automata::meta::Regex;
use std::time::{Duration, Instant};
use tracing::debug;

use super::CitationGrammar;
use crate::error::{compile, EngineError, Result};
use crate::position::retreat_chars;
use crate::protector::{ProtectedKind, ProtectionTable};

/// Bracketed numbers above this are page numbers or years, not reference indices
const MAX_REFERENCE_NUMBER: u32 = 999;

/// Characters before a numeric group inspected by the context guards
const NUMERIC_CONTEXT_CHARS: usize = 24;

/// Characters before a narrative citation inspected by the keyword window
const NARRATIVE_CONTEXT_CHARS: usize = 10;

const REFERENCE_KEYWORDS: &[&str] = &[
    "fig", "figs", "figure", "figures", "table", "tables", "tab", "eq", "eqs", "equation",
    "equations", "sec", "section", "sections", "appendix", "theorem", "lemma", "page", "pages",
    "line", "lines", "chapter", "algorithm", "step",
];

const NARRATIVE_KEYWORDS: &[&str] = &[
    "fig", "table", "eq", "sec", "appendix", "theorem", "page", "line", "chapter",
];

/// Capitalized words that precede a parenthesized year without naming an author
const NARRATIVE_STOPWORDS: &[&str] = &[
    "In", "The", "Since", "From", "Until", "By", "Before", "After", "During", "Between", "Of",
    "Year", "Years", "Spring", "Summer", "Fall", "Autumn", "Winter", "Published", "Released",
    "Founded", "Established", "Version",
];

/// Sentence adverbs the narrative author list would otherwise absorb, as in "Recently, Smith (2020)"
const SENTENCE_ADVERBS: &[&str] = &[
    "Recently", "However", "Moreover", "Furthermore", "Additionally", "Similarly", "Likewise",
    "Notably", "Importantly", "Interestingly", "Surprisingly", "Previously", "Originally",
    "Subsequently", "Later", "Earlier", "Finally", "Lastly", "First", "Second", "Third", "Also",
    "Indeed", "Thus", "Hence", "Therefore", "Consequently", "Accordingly", "Conversely",
    "Alternatively", "Instead", "Nevertheless", "Nonetheless", "Meanwhile", "Specifically",
    "Here", "Again", "Overall", "Traditionally", "Historically",
];

/// A validated occurrence waiting for the merge step
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Candidate {
    pub start: usize,
    pub end: usize,
    pub grammar: CitationGrammar,
    pub edit: Edit,
    pub references: Vec<String>,
}

/// How accepted markers are written into the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Edit {
    /// Replace the byte range with the marker tokens
    Replace { start: usize, end: usize },
    /// Insert a space and the marker tokens at a position, keeping the prose
    Append { at: usize },
}

/// Read-only inputs shared by every matcher for one call
pub(super) struct ScanContext<'a> {
    pub text: &'a str,
    pub protections: &'a ProtectionTable,
    pub max_range_expansion: u32,
    pub budget: Duration,
}

impl ScanContext<'_> {
    fn clock(&self, rule: &'static str) -> RuleClock {
        RuleClock {
            rule,
            started: Instant::now(),
            budget: self.budget,
        }
    }
}

struct RuleClock {
    rule: &'static str,
    started: Instant,
    budget: Duration,
}

impl RuleClock {
    fn check(&self) -> Result<()> {
        if self.started.elapsed() > self.budget {
            return Err(EngineError::PatternTimeout {
                rule: self.rule,
                budget_ms: self.budget.as_millis() as u64,
            });
        }
        Ok(())
    }
}

pub(super) struct CitationGrammars {
    numeric: Regex,
    superscript: Regex,
    as_cited_in: Regex,
    parenthetical: Regex,
    mention: Regex,
    narrative: Regex,
    metric_context: Regex,
}

impl CitationGrammars {
    pub fn new() -> Result<Self> {
        // Compositional pattern components
        let name = r"\p{Lu}[\p{L}'\u{2019}\-]+";
        let particle = r"(?:van|von|de|der|den|da|del|di|du|la|le|dos)";
        let head = format!(r"(?:{particle}\s+)*{name}");
        let author_list = format!(
            r"{head}(?:(?:\s*,\s*|\s+)(?:(?:and|&)\s+)?{head}|\s*&\s*{head}|\s+et\s+al\.?)*"
        );
        let year = r"(?:1[89]|20)[0-9]{2}[a-z]?";
        let year_item = format!(r"(?:{year}|n\.d\.|in\s+press|forthcoming)");
        let numeric_item = r"[0-9]{1,4}(?:\s*[-\u{2013}\u{2014}]\s*[0-9]{1,4})?";
        let superscript_item = r"[0-9]{1,3}(?:\s*[-\u{2013}]\s*[0-9]{1,3})?";
        let prefix = r"(?i:see\s+also|see|e\.g\.,?|cf\.|i\.e\.,?|for\s+example,?)\s+";
        let pages = r"(?:\s*,\s*(?:pp?\.|chap\.|ch\.)\s*[0-9]+(?:\s*[-\u{2013}]\s*[0-9]+)?)?";
        let cited = format!(r"(?i:as\s+cited\s+in)\s+({author_list})\s*,?\s*({year})");

        Ok(Self {
            numeric: compile(
                "numeric",
                &format!(r"\[\s*{numeric_item}(?:\s*[,;]\s*{numeric_item})*\s*\]"),
            )?,
            superscript: compile(
                "superscript",
                &format!(r"\^?\{{\s*{superscript_item}(?:\s*,\s*{superscript_item})*\s*\}}"),
            )?,
            as_cited_in: compile("as-cited-in", &format!(r"\(\s*{cited}\s*\)|\b{cited}"))?,
            parenthetical: compile(
                "parenthetical",
                &format!(r"\([^()]*?\b{year}\b[^()]*\)"),
            )?,
            mention: compile(
                "parenthetical-mention",
                &format!(
                    r"^(?:{prefix})?(?P<body>{author_list}\s*,?\s*{year_item}(?:\s*,\s*{year_item})*){pages}$"
                ),
            )?,
            narrative: compile(
                "narrative",
                &format!(
                    r"\b(?P<authors>{name}(?:(?:\s+(?:and|&)\s+|\s*,\s*(?:(?:and|&)\s+)?){name})*(?:\s+et\s+al\.?)?)\s*\((?P<year>{year}(?:\s*,\s*{year})*)\)"
                ),
            )?,
            metric_context: compile(
                "metric-context",
                r"(?:\bF_?[12]|\b[PR]@[0-9]+|@[0-9]+|\b(?i:top-[0-9]+))\s*[:=]?\s*$",
            )?,
        })
    }

    /// `[1]`, `[2,5–7]`, `[7-5]`
    pub fn numeric(&self, ctx: &ScanContext<'_>) -> Result<Vec<Candidate>> {
        let clock = ctx.clock("numeric");
        let mut candidates = Vec::new();

        for m in self.numeric.find_iter(ctx.text) {
            clock.check()?;
            let (start, end) = (m.start(), m.end());
            if self.is_metric_context(ctx, start) || follows_reference_keyword(ctx.text, start) {
                debug!(start, "Numeric group rejected by negative context");
                continue;
            }
            let references = expand_items(&ctx.text[start + 1..end - 1], ctx.max_range_expansion);
            if references.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                start,
                end,
                grammar: CitationGrammar::Numeric,
                edit: Edit::Replace { start, end },
                references,
            });
        }
        Ok(candidates)
    }

    /// `as cited in Smith, 2020`; the marker is appended and the prose kept
    pub fn as_cited_in(&self, ctx: &ScanContext<'_>) -> Result<Vec<Candidate>> {
        let clock = ctx.clock("as-cited-in");
        let mut candidates = Vec::new();

        for caps in self.as_cited_in.captures_iter(ctx.text) {
            clock.check()?;
            let Some(whole) = caps.get_match() else {
                continue;
            };
            let groups = caps
                .get_group(1)
                .zip(caps.get_group(2))
                .or_else(|| caps.get_group(3).zip(caps.get_group(4)));
            let Some((author, year)) = groups else {
                continue;
            };
            // an already-appended marker extends the candidate so the merge blocks it
            let end = marker_after(ctx.text, whole.end()).unwrap_or(whole.end());
            candidates.push(Candidate {
                start: whole.start(),
                end,
                grammar: CitationGrammar::AsCitedIn,
                edit: Edit::Append { at: whole.end() },
                references: vec![format!(
                    "{}, {}",
                    ctx.text[author.range()].trim(),
                    &ctx.text[year.range()]
                )],
            });
        }
        Ok(candidates)
    }

    /// `(Smith et al., 2020; Jones, 2019)`
    pub fn parenthetical(&self, ctx: &ScanContext<'_>) -> Result<Vec<Candidate>> {
        let clock = ctx.clock("parenthetical");
        let mut candidates = Vec::new();
        let mut caps = self.mention.create_captures();

        for m in self.parenthetical.find_iter(ctx.text) {
            clock.check()?;
            let (start, end) = (m.start(), m.end());
            let inner = &ctx.text[start + 1..end - 1];

            let mut references = Vec::new();
            for mention in inner.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                self.mention.captures(mention, &mut caps);
                if let Some(body) = caps.get_group_by_name("body") {
                    references.push(mention[body.range()].trim().to_string());
                }
            }

            if references.is_empty() {
                debug!(start, "Parenthetical block has no valid author-year mention");
                continue;
            }
            candidates.push(Candidate {
                start,
                end,
                grammar: CitationGrammar::ParentheticalAuthorYear,
                edit: Edit::Replace { start, end },
                references,
            });
        }
        Ok(candidates)
    }

    /// `Smith (2020)`, `Smith et al. (2020)`; only the parenthesized year is replaced
    pub fn narrative(&self, ctx: &ScanContext<'_>) -> Result<Vec<Candidate>> {
        let clock = ctx.clock("narrative");
        let mut candidates = Vec::new();

        for caps in self.narrative.captures_iter(ctx.text) {
            clock.check()?;
            let (Some(whole), Some(authors), Some(year)) = (
                caps.get_match(),
                caps.get_group_by_name("authors"),
                caps.get_group_by_name("year"),
            ) else {
                continue;
            };
            let matched_authors = ctx.text[authors.range()].trim();
            let authors_text = strip_sentence_adverbs(matched_authors);
            let start = whole.start() + (matched_authors.len() - authors_text.len());
            if NARRATIVE_STOPWORDS.contains(&authors_text) {
                continue;
            }
            if in_narrative_keyword_window(ctx.text, whole.start()) {
                debug!(start = whole.start(), "Narrative citation rejected by keyword window");
                continue;
            }
            // year group sits directly inside the parentheses
            let open = ctx.text[..year.start].rfind('(').unwrap_or(year.start);
            candidates.push(Candidate {
                start,
                end: whole.end(),
                grammar: CitationGrammar::NarrativeAuthorYear,
                edit: Edit::Replace {
                    start: open,
                    end: whole.end(),
                },
                references: vec![format!("{authors_text}, {}", &ctx.text[year.range()])],
            });
        }
        Ok(candidates)
    }

    /// `{5,6}` and `^{5,6}`, excluding ordinals like `{2}nd`
    pub fn superscript(&self, ctx: &ScanContext<'_>) -> Result<Vec<Candidate>> {
        let clock = ctx.clock("superscript");
        let mut candidates = Vec::new();

        for m in self.superscript.find_iter(ctx.text) {
            clock.check()?;
            let (start, end) = (m.start(), m.end());
            if has_ordinal_suffix(&ctx.text[end..]) {
                continue;
            }
            let matched = &ctx.text[start..end];
            let body = matched
                .trim_start_matches('^')
                .trim_start_matches('{')
                .trim_end_matches('}');
            let references = expand_items(body, ctx.max_range_expansion);
            if references.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                start,
                end,
                grammar: CitationGrammar::Superscript,
                edit: Edit::Replace { start, end },
                references,
            });
        }
        Ok(candidates)
    }

    fn is_metric_context(&self, ctx: &ScanContext<'_>, start: usize) -> bool {
        let before = ctx.text[retreat_chars(ctx.text, start, NUMERIC_CONTEXT_CHARS)..start].trim_end();
        if self.metric_context.is_match(before) {
            return true;
        }
        ctx.protections
            .spans()
            .iter()
            .any(|span| span.kind == ProtectedKind::Metric && before.ends_with(span.placeholder.as_str()))
    }
}

/// End of a `[CITATION_n]` token separated from `pos` only by spaces
fn marker_after(text: &str, pos: usize) -> Option<usize> {
    let rest = &text[pos..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    let offset = pos + rest.len() - trimmed.len();
    if !trimmed.starts_with("[CITATION_") {
        return None;
    }
    trimmed.find(']').map(|close| offset + close + 1)
}

/// Drop leading "Recently, " style words from a narrative author list
fn strip_sentence_adverbs(authors: &str) -> &str {
    let mut rest = authors;
    while let Some((first, tail)) = rest.split_once(',') {
        if !SENTENCE_ADVERBS.contains(&first.trim()) {
            break;
        }
        rest = tail.trim_start();
    }
    rest
}

/// Expand `2, 5-7` into individual reference numbers, in written order
fn expand_items(body: &str, max_range_expansion: u32) -> Vec<String> {
    let mut references = Vec::new();
    for item in body.split(|c: char| c == ',' || c == ';').map(str::trim) {
        if let Some((from, to)) = item.split_once(|c: char| matches!(c, '-' | '\u{2013}' | '\u{2014}')) {
            let (Ok(from), Ok(to)) = (from.trim().parse::<u32>(), to.trim().parse::<u32>()) else {
                continue;
            };
            if !is_reference_number(from) || !is_reference_number(to) {
                continue;
            }
            if from.abs_diff(to) + 1 > max_range_expansion {
                debug!(from, to, "Range wider than expansion limit");
                continue;
            }
            if from <= to {
                references.extend((from..=to).map(|n| n.to_string()));
            } else {
                references.extend((to..=from).rev().map(|n| n.to_string()));
            }
        } else if let Ok(n) = item.parse::<u32>() {
            if is_reference_number(n) {
                references.push(n.to_string());
            }
        }
    }
    references
}

fn is_reference_number(n: u32) -> bool {
    (1..=MAX_REFERENCE_NUMBER).contains(&n)
}

/// True when the word right before `start` names a figure, table, section or similar
fn follows_reference_keyword(text: &str, start: usize) -> bool {
    let before = &text[retreat_chars(text, start, NUMERIC_CONTEXT_CHARS)..start];
    let word = before
        .trim_end()
        .trim_end_matches('.')
        .rsplit(|c: char| !c.is_alphabetic())
        .next()
        .unwrap_or("");
    REFERENCE_KEYWORDS.contains(&word.to_lowercase().as_str())
}

fn in_narrative_keyword_window(text: &str, start: usize) -> bool {
    let window = text[retreat_chars(text, start, NARRATIVE_CONTEXT_CHARS)..start].to_lowercase();
    // keyword must open a word, so "baseline" does not trip "line"
    NARRATIVE_KEYWORDS.iter().any(|keyword| {
        window.match_indices(keyword).any(|(i, _)| {
            window[..i]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphabetic())
        })
    })
}

fn has_ordinal_suffix(after: &str) -> bool {
    let suffix: String = after.chars().take(2).collect::<String>().to_lowercase();
    matches!(suffix.as_str(), "st" | "nd" | "rd" | "th")
}
