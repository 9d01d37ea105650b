//! Citation detection and claim-span extraction for plain-text academic documents.
//!
//! [`CitationEngine::extract`] replaces every in-text citation with a sequential
//! `[CITATION_n]` marker and reports, per marker, the span of text it supports.

pub mod allocator;
pub mod config;
pub mod detector;
pub mod discovery;
pub mod error;
pub mod incremental;
pub mod marker;
pub mod normalization;
pub mod parallel_processing;
pub mod pipeline;
pub mod position;
pub mod protector;
pub mod reader;
pub mod sentence_locator;

// Re-export main types for convenient access
pub use allocator::{CitationSpan, SpanAllocator, SpanResolution};
pub use config::{EngineConfig, MultiCitationStrategy, NormalizeMode};
pub use detector::{CitationDetector, CitationGrammar, CitationMarker, DetectionState};
pub use error::EngineError;
pub use marker::{format_marker, MarkerScanner, MarkerToken};
pub use normalization::normalize_span;
pub use pipeline::{CitationEngine, ExtractionResult, SpanRecord};
pub use position::{BytePos, CharPos};
pub use protector::{ProtectedKind, ProtectionTable, Protector};
pub use sentence_locator::{SentenceBounds, SentenceLocator};

// Re-export batch utilities used by the CLI and integration tests
pub use incremental::{generate_result_path, result_file_exists, write_result_file};
pub use parallel_processing::{process_files_parallel, should_process_file, FileStats, RunStats};
