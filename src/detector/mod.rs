// WHY: Turn raw citations into sequential `[CITATION_n]` markers
// All grammars propose candidates against the same text; a single merge pass decides the winners

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::marker::{format_marker, MarkerScanner, MarkerToken};
use crate::position::BytePos;
use crate::protector::ProtectionTable;

mod grammar;

use grammar::{Candidate, CitationGrammars, Edit, ScanContext};

/// Which grammar produced a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationGrammar {
    Numeric,
    ParentheticalAuthorYear,
    NarrativeAuthorYear,
    Superscript,
    AsCitedIn,
    /// Token already present in the input
    Existing,
}

impl CitationGrammar {
    /// Tie-break order when two candidates start at the same offset
    pub fn priority(&self) -> u8 {
        match self {
            CitationGrammar::Existing => 0,
            CitationGrammar::Numeric => 1,
            CitationGrammar::AsCitedIn => 2,
            CitationGrammar::ParentheticalAuthorYear => 3,
            CitationGrammar::NarrativeAuthorYear => 4,
            CitationGrammar::Superscript => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationMarker {
    pub sequence_id: u32,
    /// Whole matched group, shared by every marker expanded from it
    pub matched_text: String,
    /// The individual item: `"5"`, `"Smith et al., 2020"`
    pub reference_text: String,
    /// Byte range of the matched group in the detector input
    pub start: BytePos,
    pub end: BytePos,
    pub grammar: CitationGrammar,
}

impl CitationMarker {
    pub fn token(&self) -> String {
        format_marker(self.sequence_id)
    }
}

/// Request-scoped numbering and protection state
#[derive(Debug, Clone)]
pub struct DetectionState {
    pub next_id: u32,
    pub protections: ProtectionTable,
}

impl DetectionState {
    /// Fresh state whose placeholder delimiter is collision-free for `text`
    pub fn for_text(text: &str) -> Self {
        Self {
            next_id: 1,
            protections: ProtectionTable::for_text(text),
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub struct CitationDetector {
    grammars: CitationGrammars,
    markers: MarkerScanner,
    max_range_expansion: u32,
    budget: Duration,
}

impl CitationDetector {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        info!("Compiling citation grammars");
        Ok(Self {
            grammars: CitationGrammars::new()?,
            markers: MarkerScanner::new()?,
            max_range_expansion: config.max_range_expansion,
            budget: config.rule_time_budget(),
        })
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(&EngineConfig::default())
    }

    /// Detect citations in `text` with fresh request state
    pub fn detect_and_mark(&self, text: &str) -> (String, Vec<CitationMarker>) {
        let mut state = DetectionState::for_text(text);
        self.detect_and_mark_with_state(text, &mut state)
    }

    /// Detect citations, numbering new markers from `state`
    ///
    /// Existing `[CITATION_n]` tokens are left in place, reported as
    /// [`CitationGrammar::Existing`], and new ids continue after the largest one.
    pub fn detect_and_mark_with_state(
        &self,
        text: &str,
        state: &mut DetectionState,
    ) -> (String, Vec<CitationMarker>) {
        let existing = self.markers.scan(text);
        if let Some(max_existing) = existing.iter().map(|t| t.id).max() {
            state.next_id = state.next_id.max(max_existing.saturating_add(1));
        }

        let ctx = ScanContext {
            text,
            protections: &state.protections,
            max_range_expansion: self.max_range_expansion,
            budget: self.budget,
        };

        let passes = [
            ("numeric", self.grammars.numeric(&ctx)),
            ("as-cited-in", self.grammars.as_cited_in(&ctx)),
            ("parenthetical", self.grammars.parenthetical(&ctx)),
            ("narrative", self.grammars.narrative(&ctx)),
            ("superscript", self.grammars.superscript(&ctx)),
        ];

        let mut candidates = Vec::new();
        for (rule, outcome) in passes {
            match outcome {
                Ok(found) => {
                    debug!(rule, count = found.len(), "Collected citation candidates");
                    candidates.extend(found);
                }
                Err(e) => warn!(rule, error = %e, "Skipping citation rule for this call"),
            }
        }

        let accepted = merge_candidates(candidates, &existing, text, state.protections.delimiter());
        let (marked, mut markers) = apply_candidates(text, accepted, state);

        let new_count = markers.len();
        markers.extend(existing.iter().map(|token| existing_marker(text, token)));
        markers.sort_by_key(|m| (m.start, m.sequence_id));

        info!(
            "Marked {} new citations ({} already present)",
            new_count,
            existing.len()
        );
        (marked, markers)
    }
}

/// Earliest start wins, ties broken by grammar priority; overlaps are dropped
fn merge_candidates(
    mut candidates: Vec<Candidate>,
    existing: &[MarkerToken],
    text: &str,
    delimiter: &str,
) -> Vec<Candidate> {
    candidates.sort_by_key(|c| (c.start, c.grammar.priority()));

    let mut accepted: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut cursor = 0;
    for candidate in candidates {
        if candidate.start < cursor {
            debug!(start = candidate.start, grammar = ?candidate.grammar, "Dropped overlapping candidate");
            continue;
        }
        let blocked = existing
            .iter()
            .any(|t| t.start.0 < candidate.end && candidate.start < t.end.0);
        // a candidate swallowing a placeholder would lose protected text on restore
        let swallows_placeholder =
            !delimiter.is_empty() && text[candidate.start..candidate.end].contains(delimiter);
        if blocked {
            // still claims its range so a weaker grammar cannot re-mark part of it
            cursor = candidate.end;
            continue;
        }
        if swallows_placeholder {
            continue;
        }
        cursor = candidate.end;
        accepted.push(candidate);
    }
    accepted
}

fn apply_candidates(
    text: &str,
    accepted: Vec<Candidate>,
    state: &mut DetectionState,
) -> (String, Vec<CitationMarker>) {
    let mut marked = String::with_capacity(text.len() + accepted.len() * 16);
    let mut markers = Vec::new();
    let mut cursor = 0;

    for candidate in accepted {
        let ids: Vec<u32> = candidate.references.iter().map(|_| state.allocate_id()).collect();
        let tokens = ids.iter().map(|id| format_marker(*id)).collect::<Vec<_>>().join(" ");

        match candidate.edit {
            Edit::Replace { start, end } => {
                marked.push_str(&text[cursor..start]);
                // keep the token off the previous word: "claim[1]" becomes "claim [CITATION_1]"
                if marked.chars().next_back().is_some_and(|c| c.is_alphanumeric()) {
                    marked.push(' ');
                }
                marked.push_str(&tokens);
                cursor = end;
            }
            Edit::Append { at } => {
                marked.push_str(&text[cursor..at]);
                marked.push(' ');
                marked.push_str(&tokens);
                cursor = at;
            }
        }

        let matched_text = &text[candidate.start..candidate.end];
        for (id, reference_text) in ids.into_iter().zip(candidate.references) {
            markers.push(CitationMarker {
                sequence_id: id,
                matched_text: matched_text.to_string(),
                reference_text,
                start: BytePos(candidate.start),
                end: BytePos(candidate.end),
                grammar: candidate.grammar,
            });
        }
    }
    marked.push_str(&text[cursor..]);
    (marked, markers)
}

fn existing_marker(text: &str, token: &MarkerToken) -> CitationMarker {
    CitationMarker {
        sequence_id: token.id,
        matched_text: text[token.range()].to_string(),
        reference_text: token.id.to_string(),
        start: token.start,
        end: token.end,
        grammar: CitationGrammar::Existing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protector::Protector;
    use std::sync::OnceLock;

    static SHARED_DETECTOR: OnceLock<CitationDetector> = OnceLock::new();

    fn detector() -> &'static CitationDetector {
        SHARED_DETECTOR.get_or_init(|| CitationDetector::with_default_rules().unwrap())
    }

    fn references(markers: &[CitationMarker]) -> Vec<&str> {
        markers.iter().map(|m| m.reference_text.as_str()).collect()
    }

    #[test]
    fn test_numeric_range_expands() {
        let (marked, markers) = detector().detect_and_mark("Prior work [5-7] shows this.");
        assert_eq!(marked, "Prior work [CITATION_1] [CITATION_2] [CITATION_3] shows this.");
        assert_eq!(references(&markers), vec!["5", "6", "7"]);
        assert!(markers.iter().all(|m| m.matched_text == "[5-7]"));
    }

    #[test]
    fn test_numeric_group_and_descending_range() {
        let (_, markers) = detector().detect_and_mark("Methods [2,5\u{2013}7] exist.");
        assert_eq!(references(&markers), vec!["2", "5", "6", "7"]);
        let ids: Vec<u32> = markers.iter().map(|m| m.sequence_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let (_, markers) = detector().detect_and_mark("Methods [7-5] exist.");
        assert_eq!(references(&markers), vec!["7", "6", "5"]);
    }

    #[test]
    fn test_numeric_negative_context() {
        let (marked, markers) = detector().detect_and_mark("As shown in Fig. [3] and Table [2].");
        assert!(markers.is_empty());
        assert_eq!(marked, "As shown in Fig. [3] and Table [2].");

        let (_, markers) = detector().detect_and_mark("Years [1990-2020] and pages [2019].");
        assert!(markers.is_empty());
    }

    #[test]
    fn test_metric_placeholder_blocks_numeric() {
        let protector = Protector::with_default_rules().unwrap();
        let text = "We report F1 [3] on the benchmark [4].";
        let mut state = DetectionState::for_text(text);
        let protected = protector.protect_into(text, &mut state.protections);

        let (marked, markers) = detector().detect_and_mark_with_state(&protected, &mut state);
        assert_eq!(references(&markers), vec!["4"]);
        assert_eq!(
            state.protections.restore(&marked),
            "We report F1 [3] on the benchmark [CITATION_1]."
        );
    }

    #[test]
    fn test_parenthetical_author_year() {
        let (marked, markers) =
            detector().detect_and_mark("This holds (Smith et al., 2020; Jones & Lee, 2019) widely.");
        assert_eq!(marked, "This holds [CITATION_1] [CITATION_2] widely.");
        assert_eq!(references(&markers), vec!["Smith et al., 2020", "Jones & Lee, 2019"]);
        assert!(markers
            .iter()
            .all(|m| m.grammar == CitationGrammar::ParentheticalAuthorYear));
    }

    #[test]
    fn test_parenthetical_without_mention_is_dropped() {
        let text = "Participants (n = 40, recruited 2019) took part.";
        let (marked, markers) = detector().detect_and_mark(text);
        assert!(markers.is_empty());
        assert_eq!(marked, text);
    }

    #[test]
    fn test_narrative_keeps_author_prose() {
        let (marked, markers) = detector().detect_and_mark("Smith et al. (2020) showed gains.");
        assert_eq!(marked, "Smith et al. [CITATION_1] showed gains.");
        assert_eq!(references(&markers), vec!["Smith et al., 2020"]);
        assert_eq!(markers[0].matched_text, "Smith et al. (2020)");
    }

    #[test]
    fn test_narrative_skips_leading_sentence_adverb() {
        let (marked, markers) = detector().detect_and_mark("Recently, Smith (2020) showed gains.");
        assert_eq!(marked, "Recently, Smith [CITATION_1] showed gains.");
        assert_eq!(references(&markers), vec!["Smith, 2020"]);
        assert_eq!(markers[0].matched_text, "Smith (2020)");

        let (_, markers) = detector().detect_and_mark("However, Smith, Jones and Lee (2019) disagree.");
        assert_eq!(references(&markers), vec!["Smith, Jones and Lee, 2019"]);
    }

    #[test]
    fn test_narrative_keyword_window() {
        let text = "Compare Table Results (2020) with ours.";
        let (marked, markers) = detector().detect_and_mark(text);
        assert!(markers.is_empty());
        assert_eq!(marked, text);
    }

    #[test]
    fn test_as_cited_in_appends_marker() {
        let (marked, markers) =
            detector().detect_and_mark("This holds (as cited in Smith, 2020) broadly.");
        assert_eq!(marked, "This holds (as cited in Smith, 2020) [CITATION_1] broadly.");
        assert_eq!(references(&markers), vec!["Smith, 2020"]);
        assert_eq!(markers[0].grammar, CitationGrammar::AsCitedIn);
    }

    #[test]
    fn test_superscript_groups() {
        let (marked, markers) = detector().detect_and_mark("Shown before^{5,6} in detail.");
        assert_eq!(marked, "Shown before [CITATION_1] [CITATION_2] in detail.");
        assert_eq!(references(&markers), vec!["5", "6"]);

        let (_, markers) = detector().detect_and_mark("She finished {2}nd overall.");
        assert!(markers.is_empty());
    }

    #[test]
    fn test_existing_markers_are_kept_and_numbering_continues() {
        let (marked, markers) = detector().detect_and_mark("A claim [CITATION_3] and another [4].");
        assert_eq!(marked, "A claim [CITATION_3] and another [CITATION_4].");
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].grammar, CitationGrammar::Existing);
        assert_eq!(markers[1].sequence_id, 4);
    }

    #[test]
    fn test_new_marker_before_existing_one_numbers_after_it() {
        let (marked, markers) =
            detector().detect_and_mark("First claim [5]. Second claim [CITATION_1].");
        assert_eq!(marked, "First claim [CITATION_2]. Second claim [CITATION_1].");
        assert_eq!(markers.len(), 2);
        assert!(markers
            .iter()
            .any(|m| m.sequence_id == 2 && m.reference_text == "5"));
    }

    #[test]
    fn test_detection_is_idempotent() {
        let text = "Claims [1], (Smith, 2020) and Jones (2019) and more^{2}.";
        let (first, first_markers) = detector().detect_and_mark(text);
        let (second, second_markers) = detector().detect_and_mark(&first);

        assert_eq!(first, second);
        let first_ids: Vec<u32> = first_markers.iter().map(|m| m.sequence_id).collect();
        let second_ids: Vec<u32> = second_markers.iter().map(|m| m.sequence_id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_as_cited_in_is_not_appended_twice() {
        let (first, _) = detector().detect_and_mark("This holds (as cited in Smith, 2020) broadly.");
        let (second, markers) = detector().detect_and_mark(&first);
        assert_eq!(second, first);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].grammar, CitationGrammar::Existing);
    }

    #[test]
    fn test_ids_are_monotonic_left_to_right() {
        let (_, markers) = detector().detect_and_mark("One [3]. Two (Lee, 2001). Three [1, 2].");
        let ids: Vec<u32> = markers.iter().map(|m| m.sequence_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
