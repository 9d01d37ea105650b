// WHY: Library-level error taxonomy; application edges wrap these in anyhow

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The only hard failure surfaced to callers of the engine
    #[error("input is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("failed to compile {rule} pattern: {source}")]
    PatternCompile {
        rule: &'static str,
        #[source]
        source: regex_automata::meta::BuildError,
    },

    #[error("{rule} rule exceeded its {budget_ms}ms budget")]
    PatternTimeout { rule: &'static str, budget_ms: u64 },

    #[error("marker [CITATION_{id}] not found in working text")]
    UnresolvableMarker { id: u32 },

    #[error("span for marker [CITATION_{id}] empty after cleanup")]
    EmptySpanAfterCleanup { id: u32 },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Compile a meta regex, tagging failures with the rule name
pub(crate) fn compile(
    rule: &'static str,
    pattern: &str,
) -> Result<regex_automata::meta::Regex> {
    regex_automata::meta::Regex::new(pattern)
        .map_err(|source| EngineError::PatternCompile { rule, source })
}
