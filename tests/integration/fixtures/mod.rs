// Test fixtures with known academic-style texts and expected spans
// WHY: Scenario tests need deterministic input/output pairs shared across test files
#![allow(dead_code)]

/// Claim sentence followed by a marker already in place
pub const TRAILING_MARKER_TEXT: &str = "The model achieved 95% accuracy. [CITATION_1]";
pub const TRAILING_MARKER_EXPECTED: &str = "The model achieved 95% accuracy.";

/// Three adjacent markers sharing one claim
pub const CLUSTER_TEXT: &str =
    "This is a claim [CITATION_1] [CITATION_2] [CITATION_3]. Another sentence.";
pub const CLUSTER_EXPECTED: &str = "This is a claim.";

/// Numeric range expanded into one marker per reference
pub const RANGE_TEXT: &str = "Prior work [5-7] shows this.";

/// Abbreviation directly before the marker
pub const REF_ABBREVIATION_TEXT: &str =
    "Prior work exists. We build on the idea; see Ref. [CITATION_1]. Then more.";
pub const REF_ABBREVIATION_SENTENCE_START: &str = "We build on the idea";

/// Figure abbreviation inside the claim sentence
pub const FIGURE_TEXT: &str = "He cited Fig. 2 and then [1] concluded. Next part.";

/// Mixed-grammar paragraph used by the property tests
pub const MIXED_TEXT: &str = "Deep learning changed vision [1, 3]. \
Smith et al. (2020) showed gains on ImageNet. \
Results hold broadly (Lee, 2019; Chen & Wu, 2021). \
The idea is older (as cited in Jones, 2001) than it looks. \
Transfer is effective^{4,5} in practice.";

/// Text with protected constructs that must survive untouched
pub const PROTECTED_TEXT: &str = "Code is at https://example.org/repo [2]. \
The F1 score [4] improved (see Table 2). \
Contact us at team@example.org for data (Received March 2021).";

/// Multi-paragraph document with headings
pub const PARAGRAPH_TEXT: &str = "Introduction\n\n\
Neural networks learn representations [1]. They scale well [2, 3].\n\n\
Related Work\n\n\
Earlier systems used rules [4], whereas modern systems learn from data [5] [6].";

/// Unicode prose, to check character offsets
pub const UNICODE_TEXT: &str = "Über Modelle — schön und schnell [1]. Zweiter Satz über Daten [2].";

/// Samples used for whole-engine properties
pub const PROPERTY_SAMPLES: &[&str] = &[
    TRAILING_MARKER_TEXT,
    CLUSTER_TEXT,
    RANGE_TEXT,
    REF_ABBREVIATION_TEXT,
    FIGURE_TEXT,
    MIXED_TEXT,
    PROTECTED_TEXT,
    PARAGRAPH_TEXT,
    UNICODE_TEXT,
    "[1]",
    "",
    "No citations anywhere in this sentence.",
    "Claim one is here. [1] [2] Another claim follows.",
];
