// WHY: Mask ranges that look citation-like but are not (URLs, DOIs, figure refs, metrics)
// Masking happens before detection and is undone afterward; restore(protect(t)) == t

use regex_automata::meta::Regex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{compile, EngineError, Result};

const BASE_DELIMITER: &str = "§§";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectedKind {
    Url,
    Doi,
    Email,
    FigureRef,
    MetaParen,
    Copyright,
    Acronym,
    MonthYear,
    Metric,
}

impl ProtectedKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ProtectedKind::Url => "URL",
            ProtectedKind::Doi => "DOI",
            ProtectedKind::Email => "EMAIL",
            ProtectedKind::FigureRef => "FIGURE_REF",
            ProtectedKind::MetaParen => "META_PAREN",
            ProtectedKind::Copyright => "COPYRIGHT",
            ProtectedKind::Acronym => "ACRONYM",
            ProtectedKind::MonthYear => "MONTH_YEAR",
            ProtectedKind::Metric => "METRIC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedSpan {
    pub kind: ProtectedKind,
    pub original_text: String,
    pub placeholder: String,
}

/// Placeholder table for one invocation
#[derive(Debug, Clone, Default)]
pub struct ProtectionTable {
    delimiter: String,
    spans: Vec<ProtectedSpan>,
}

impl ProtectionTable {
    /// Pick a delimiter that does not already occur in `text`
    pub fn for_text(text: &str) -> Self {
        let mut delimiter = BASE_DELIMITER.to_string();
        while text.contains(&delimiter) {
            delimiter.push('§');
        }
        Self {
            delimiter,
            spans: Vec::new(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn spans(&self) -> &[ProtectedSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn insert(&mut self, kind: ProtectedKind, original_text: &str) -> String {
        let placeholder = format!(
            "{d}{tag}{n}{d}",
            d = self.delimiter,
            tag = kind.tag(),
            n = self.spans.len()
        );
        self.spans.push(ProtectedSpan {
            kind,
            original_text: original_text.to_string(),
            placeholder: placeholder.clone(),
        });
        placeholder
    }

    /// Byte ranges of placeholders currently present in `text`
    fn placeholder_ranges(&self, text: &str) -> Vec<(usize, usize)> {
        let mut ranges: Vec<(usize, usize)> = self
            .spans
            .iter()
            .flat_map(|span| {
                text.match_indices(span.placeholder.as_str())
                    .map(|(i, p)| (i, i + p.len()))
            })
            .collect();
        ranges.sort_unstable();
        ranges
    }

    /// Undo every substitution, newest first so nested placeholders unwind
    pub fn restore(&self, text: &str) -> String {
        let mut restored = text.to_string();
        for span in self.spans.iter().rev() {
            if restored.contains(span.placeholder.as_str()) {
                restored = restored.replacen(span.placeholder.as_str(), &span.original_text, 1);
            } else {
                warn!(placeholder = %span.placeholder, "Placeholder missing during restore");
            }
        }
        restored
    }
}

struct ProtectionRule {
    kind: ProtectedKind,
    pattern: Regex,
}

/// Ordered protection rules, highest priority first
pub struct Protector {
    rules: Vec<ProtectionRule>,
    budget: Duration,
}

impl Protector {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        // WHY: trailing-char classes keep sentence punctuation out of URLs and DOIs
        let url_tail = r#"[^\s<>"]*[^\s<>".,;:!?)\]'"]"#;
        let months = r"(?:(?:Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\.?|January|February|March|April|May|June|July|August|September|October|November|December)";
        let figure_words = r"(?i:fig(?:ure)?s?|tab(?:le)?s?|eq(?:uation)?s?|sec(?:tion)?s?|appendix|supplementary|alg(?:orithm)?s?|theorem|lemma|chapter)";
        // WHY: keyword must be followed by a label, else "Figueroa" or "Tabor" would match
        let figure_label = r"(?:\.\s*|\s+)[0-9IVXA-Z]";
        let year_range = r"(?:19|20)[0-9]{2}(?:\s*[-\x{2013}]\s*(?:19|20)[0-9]{2})?";
        let holder = r"(?:,?[ \t]+(?:\p{Lu}[\p{L}0-9&\-]*|of|and|&)){0,6}";

        let patterns: Vec<(ProtectedKind, String)> = vec![
            (ProtectedKind::Url, format!(r"(?i:(?:https?|ftp)://|www\.){url_tail}")),
            (ProtectedKind::Doi, format!(r"(?i:doi:\s*)?\b10\.[0-9]{{4,9}}/{url_tail}")),
            (ProtectedKind::Email, r"\b[\w.+\-]+@[\w\-]+(?:\.[\w\-]+)+\b".to_string()),
            (
                ProtectedKind::FigureRef,
                format!(r"\((?i:see\s+|cf\.\s+|e\.g\.,?\s+)?{figure_words}{figure_label}[^()]*\)"),
            ),
            (
                ProtectedKind::MetaParen,
                r"\((?i:received|accepted|published|submitted|revised|available\s+online|copyright|©)[^()]*\)".to_string(),
            ),
            (
                ProtectedKind::Copyright,
                // WHY: a notice needs a year after "Copyright"; holder words stop before any bracket
                format!(r"(?:(?:©|\b(?i:copyright)(?:\s*(?:©|\([cC]\)))?|\([cC]\))\s*{year_range}|©){holder}"),
            ),
            (ProtectedKind::Acronym, r"\(\p{Lu}[\p{Lu}0-9&\-]{1,9}s?\)".to_string()),
            (
                ProtectedKind::MonthYear,
                format!(r"\({months}\s+(?:[0-9]{{1,2}},?\s+)?(?:1[89]|20)[0-9]{{2}}\)"),
            ),
            (
                ProtectedKind::Metric,
                r"\b(?:(?:Macro|Micro)-)?F(?:_?1|2)(?:-score|\s+score)?\b|\b(?:P|R|Precision|Recall|Hits|MAP|MRR|nDCG|NDCG|Acc)@[0-9]+\b".to_string(),
            ),
        ];

        let mut rules = Vec::with_capacity(patterns.len());
        for (kind, pattern) in patterns {
            rules.push(ProtectionRule {
                kind,
                pattern: compile(kind.tag(), &pattern)?,
            });
        }

        Ok(Self {
            rules,
            budget: config.rule_time_budget(),
        })
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(&EngineConfig::default())
    }

    /// Mask protected ranges; returns the working text and its restore table
    pub fn protect(&self, text: &str) -> (String, ProtectionTable) {
        let mut table = ProtectionTable::for_text(text);
        let protected = self.protect_into(text, &mut table);
        (protected, table)
    }

    /// Mask protected ranges, recording placeholders into a caller-owned table
    pub fn protect_into(&self, text: &str, table: &mut ProtectionTable) -> String {
        let mut working = text.to_string();
        for rule in &self.rules {
            match self.apply_rule(rule, &working, table) {
                Ok(next) => working = next,
                Err(e) => warn!(error = %e, "Skipping protection rule for this call"),
            }
        }
        debug!("Protected {} spans", table.len());
        working
    }

    pub fn restore(&self, text: &str, table: &ProtectionTable) -> String {
        table.restore(text)
    }

    fn apply_rule(
        &self,
        rule: &ProtectionRule,
        text: &str,
        table: &mut ProtectionTable,
    ) -> Result<String> {
        let started = Instant::now();
        let existing = table.placeholder_ranges(text);

        // Collect first so a timeout leaves the table untouched
        let mut accepted = Vec::new();
        for m in rule.pattern.find_iter(text) {
            if started.elapsed() > self.budget {
                return Err(EngineError::PatternTimeout {
                    rule: rule.kind.tag(),
                    budget_ms: self.budget.as_millis() as u64,
                });
            }
            let (start, end) = (m.start(), m.end());
            if start == end {
                continue;
            }
            // A match may swallow whole placeholders but never cut one in half
            let cuts_placeholder = existing.iter().any(|&(ps, pe)| {
                ps < end && start < pe && !(start <= ps && pe <= end)
            });
            if !cuts_placeholder {
                accepted.push((start, end));
            }
        }

        if accepted.is_empty() {
            return Ok(text.to_string());
        }

        let mut result = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end) in accepted {
            result.push_str(&text[cursor..start]);
            result.push_str(&table.insert(rule.kind, &text[start..end]));
            cursor = end;
        }
        result.push_str(&text[cursor..]);
        Ok(result)
    }
}
