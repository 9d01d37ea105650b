// WHY: Centralized abbreviation handling for sentence boundary detection
// A period inside "Fig.", "et al." or an initial must not end the claim sentence

use crate::config::DEFAULT_ABBREVIATIONS;
use crate::position::retreat_chars;

/// How many characters before a period are examined for an abbreviation
pub const LOOKBEHIND_CHARS: usize = 10;

/// Abbreviation lookup against the text preceding a candidate period
#[derive(Debug, Clone)]
pub struct AbbreviationChecker {
    abbreviations: Vec<String>,
}

impl AbbreviationChecker {
    /// Create checker from a configured table
    pub fn new(table: &[String]) -> Self {
        let mut abbreviations: Vec<String> = table
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| a.ends_with('.'))
            .collect();
        // WHY: longest first so "Refs." is tried before "s."-style suffixes
        abbreviations.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        abbreviations.dedup();
        Self { abbreviations }
    }

    pub fn with_defaults() -> Self {
        let table: Vec<String> = DEFAULT_ABBREVIATIONS.iter().map(|s| s.to_string()).collect();
        Self::new(&table)
    }

    /// Check if a word is a known abbreviation
    pub fn is_abbreviation(&self, word: &str) -> bool {
        self.abbreviations.iter().any(|a| a == word)
    }

    /// Check whether the period at `period_pos` belongs to an abbreviation
    /// WHY: only the LOOKBEHIND_CHARS before the period are consulted, so the cost is constant
    pub fn ends_with_abbreviation(&self, text: &str, period_pos: usize) -> bool {
        if text.as_bytes().get(period_pos) != Some(&b'.') {
            return false;
        }
        let end = period_pos + 1;
        let window_start = retreat_chars(text, period_pos, LOOKBEHIND_CHARS);
        let window = &text[window_start..end];

        for abbreviation in &self.abbreviations {
            if window.ends_with(abbreviation.as_str()) {
                let abbreviation_start = end - abbreviation.len();
                if starts_word(text, abbreviation_start) {
                    return true;
                }
            }
        }

        is_single_initial(text, period_pos)
    }
}

impl Default for AbbreviationChecker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// True when nothing alphanumeric directly precedes `pos`
fn starts_word(text: &str, pos: usize) -> bool {
    text[..pos]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

/// "J." style initials: one uppercase letter standing alone before the period
fn is_single_initial(text: &str, period_pos: usize) -> bool {
    let mut preceding = text[..period_pos].chars().rev();
    match preceding.next() {
        Some(c) if c.is_uppercase() => preceding.next().map_or(true, |p| !p.is_alphabetic()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    // WHY: Single shared checker instance reduces test overhead
    static SHARED_CHECKER: OnceLock<AbbreviationChecker> = OnceLock::new();

    fn get_checker() -> &'static AbbreviationChecker {
        SHARED_CHECKER.get_or_init(AbbreviationChecker::with_defaults)
    }

    fn period_after(text: &str, needle: &str) -> usize {
        text.find(needle).unwrap() + needle.len() - 1
    }

    #[test]
    fn test_table_abbreviations_detected() {
        let checker = get_checker();
        let cases = [
            ("He cited Fig. 2 here", "Fig."),
            ("Smith et al. [CITATION_1]", "et al."),
            ("tools, e.g. parsers", "e.g."),
            ("see Ref. [CITATION_1]", "Ref."),
            ("awarded a Ph.D. in 1990", "Ph.D."),
            ("in the U.S. market", "U.S."),
        ];
        for (text, needle) in cases {
            assert!(
                checker.ends_with_abbreviation(text, period_after(text, needle)),
                "{needle} should be an abbreviation in {text:?}"
            );
        }
    }

    #[test]
    fn test_word_endings_are_not_abbreviations() {
        let checker = get_checker();
        // "critical." ends with "al." but is a real word
        let text = "This is critical. Next";
        assert!(!checker.ends_with_abbreviation(text, period_after(text, "critical.")));

        let text = "The model converged. It";
        assert!(!checker.ends_with_abbreviation(text, period_after(text, "converged.")));
    }

    #[test]
    fn test_single_initials() {
        let checker = get_checker();
        let text = "written by J. Smith";
        assert!(checker.ends_with_abbreviation(text, period_after(text, "J.")));

        let text = "scored an A. Then";
        assert!(checker.ends_with_abbreviation(text, period_after(text, " A.")));

        let text = "in USA. Then";
        assert!(!checker.ends_with_abbreviation(text, period_after(text, "USA.")));
    }

    #[test]
    fn test_custom_table_and_membership() {
        let checker = AbbreviationChecker::new(&["approx.".to_string(), "bogus".to_string()]);
        assert!(checker.is_abbreviation("approx."));
        assert!(!checker.is_abbreviation("bogus"));
        let text = "took approx. 3 hours";
        assert!(checker.ends_with_abbreviation(text, period_after(text, "approx.")));
        let text = "He cited Fig. 2";
        assert!(!checker.ends_with_abbreviation(text, period_after(text, "Fig.")));
    }

    #[test]
    fn test_non_period_position_is_rejected() {
        let checker = get_checker();
        assert!(!checker.ends_with_abbreviation("Really? Yes", 6));
    }
}
