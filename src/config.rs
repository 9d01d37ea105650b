// WHY: One serde-backed config struct replaces per-version forks of the heuristics
// Every threshold the engine uses is named here so deployments can tune without code changes

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// How extracted span text is cleaned before it is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    /// Trim leading/trailing whitespace only; keeps substring alignment
    #[default]
    Preservative,
    /// Collapse whitespace and tidy punctuation; NOT reversible
    Cosmetic,
}

/// What a citation gets when it shares its sentence with non-adjacent citations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MultiCitationStrategy {
    /// Every citation in the sentence receives the full sentence
    #[default]
    SharedSentence,
    /// Each citation receives the text since the previous citation cluster
    SplitClause,
}

/// Abbreviations that end in a period without ending a sentence
pub const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "Fig.", "Figs.", "et al.", "al.", "i.e.", "e.g.", "etc.", "vs.", "cf.",
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "Ph.D.", "M.D.", "U.S.", "U.K.",
    "No.", "Vol.", "pp.", "p.", "Ref.", "Refs.", "Eq.", "Eqs.", "Sec.", "Tab.", "Ch.",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Abbreviations checked before accepting a period as a sentence end
    pub abbreviation_table: Vec<String>,
    /// Longest natural sentence (in chars) accepted before the safety valve fires
    pub safety_window_chars: usize,
    /// Half-width of the window used when the safety valve fires
    pub safety_half_window_chars: usize,
    /// Clauses shorter than this (in chars) are widened to the previous comma/semicolon
    pub short_span_expand_threshold: usize,
    /// Radius of the window used when a sentence-level span comes out empty
    pub fallback_window_chars: usize,
    /// Length of the document-head fallback
    pub document_head_chars: usize,
    pub normalize_mode: NormalizeMode,
    pub multi_citation_strategy: MultiCitationStrategy,
    /// Numeric ranges spanning more items than this are treated as non-citations
    pub max_range_expansion: u32,
    /// Wall-clock budget per detection or protection rule per call
    pub rule_time_budget_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            abbreviation_table: DEFAULT_ABBREVIATIONS.iter().map(|s| s.to_string()).collect(),
            safety_window_chars: 500,
            safety_half_window_chars: 150,
            short_span_expand_threshold: 20,
            fallback_window_chars: 50,
            document_head_chars: 200,
            normalize_mode: NormalizeMode::default(),
            multi_citation_strategy: MultiCitationStrategy::default(),
            max_range_expansion: 100,
            rule_time_budget_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML config file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn rule_time_budget(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rule_time_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.safety_window_chars, 500);
        assert_eq!(config.short_span_expand_threshold, 20);
        assert_eq!(config.normalize_mode, NormalizeMode::Preservative);
        assert_eq!(config.multi_citation_strategy, MultiCitationStrategy::SharedSentence);
        assert!(config.abbreviation_table.iter().any(|a| a == "et al."));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            "safety_window_chars = 300\nnormalize_mode = \"cosmetic\"\nmulti_citation_strategy = \"split_clause\"\n",
        )
        .unwrap();

        assert_eq!(config.safety_window_chars, 300);
        assert_eq!(config.normalize_mode, NormalizeMode::Cosmetic);
        assert_eq!(config.multi_citation_strategy, MultiCitationStrategy::SplitClause);
        assert_eq!(config.short_span_expand_threshold, 20);
    }

    #[test]
    fn test_abbreviation_override() {
        let config = EngineConfig::from_toml_str("abbreviation_table = [\"Fig.\", \"approx.\"]").unwrap();
        assert_eq!(config.abbreviation_table, vec!["Fig.", "approx."]);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("safety_window_chars = \"wide\"").unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("citespan.toml");
        std::fs::write(&path, "document_head_chars = 120\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.document_head_chars, 120);
    }
}
