// WHY: Wire protector, detector, locator, allocator and normalizer into one call per document
// The engine holds only compiled patterns, so one instance is shared by every worker

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::allocator::{CitationSpan, SpanAllocator, SpanResolution};
use crate::config::EngineConfig;
use crate::detector::{CitationDetector, CitationMarker, DetectionState};
use crate::error::{EngineError, Result};
use crate::marker::{format_marker, MarkerScanner, MarkerToken};
use crate::normalization::normalize_span_into;
use crate::position::{floor_char_boundary, BytePos, CharOffsets};
use crate::protector::Protector;
use crate::sentence_locator::SentenceLocator;

/// One emitted span; offsets are character offsets into `marked_text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub citation_id: String,
    pub span_text: String,
    pub start: usize,
    pub end: usize,
    pub is_shared: bool,
    pub resolution: SpanResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub marked_text: String,
    pub citation_spans: Vec<SpanRecord>,
    /// Detector output, kept for callers that want grammar and reference text
    #[serde(skip)]
    pub markers: Vec<CitationMarker>,
}

pub struct CitationEngine {
    config: EngineConfig,
    protector: Protector,
    detector: CitationDetector,
    locator: SentenceLocator,
    allocator: SpanAllocator,
    markers: MarkerScanner,
}

impl CitationEngine {
    /// Compile every pattern once; fails only on an invalid pattern
    pub fn new(config: EngineConfig) -> Result<Self> {
        info!("Building citation engine");
        Ok(Self {
            protector: Protector::new(&config)?,
            detector: CitationDetector::new(&config)?,
            locator: SentenceLocator::new(&config)?,
            allocator: SpanAllocator::new(&config)?,
            markers: MarkerScanner::new()?,
            config,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate UTF-8, then extract; the only hard failure of the engine
    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult> {
        let text = std::str::from_utf8(bytes)?;
        Ok(self.extract(text))
    }

    /// Mark citations in `text` and compute one span per marker token
    pub fn extract(&self, text: &str) -> ExtractionResult {
        let started = Instant::now();

        let mut state = DetectionState::for_text(text);
        let protected = self.protector.protect_into(text, &mut state.protections);
        let (detected, markers) = self.detector.detect_and_mark_with_state(&protected, &mut state);
        let marked_text = state.protections.restore(&detected);

        let tokens = self.markers.scan(&marked_text);
        let index = self.locator.index(&marked_text);
        debug!(
            boundaries = index.len(),
            paragraph_breaks = index.paragraph_breaks(),
            "Indexed sentence boundaries"
        );
        let offsets = CharOffsets::new(&marked_text);
        let by_id: HashMap<u32, &CitationMarker> =
            markers.iter().map(|m| (m.sequence_id, m)).collect();

        let mut citation_spans = Vec::with_capacity(tokens.len());
        let mut buffer = String::new();

        for token in &tokens {
            let bounds = self.locator.bounds_in(&index, token.start);
            let lo = tokens.partition_point(|t| t.start < bounds.start);
            let hi = tokens.partition_point(|t| t.start < bounds.end);
            let in_sentence: Vec<MarkerToken> = tokens[lo..hi]
                .iter()
                .copied()
                .filter(|t| t.end <= bounds.end)
                .collect();

            let span = self
                .allocator
                .allocate_spans(&marked_text, bounds, &in_sentence, token);
            let reference = by_id.get(&token.id).map(|m| m.reference_text.as_str());
            citation_spans.push(self.record(&span, reference, &offsets, &mut buffer));
        }

        // detector markers whose token did not survive into the marked text
        for marker in &markers {
            if tokens.iter().any(|t| t.id == marker.sequence_id) {
                continue;
            }
            let error = EngineError::UnresolvableMarker {
                id: marker.sequence_id,
            };
            warn!(error = %error, "Using window around approximate position");
            let approximate = floor_char_boundary(&marked_text, marker.start.0);
            let anchor = MarkerToken {
                id: marker.sequence_id,
                start: BytePos(approximate),
                end: BytePos(approximate),
            };
            let span = self.allocator.fallback_span(&marked_text, &anchor);
            citation_spans.push(self.record(
                &span,
                Some(marker.reference_text.as_str()),
                &offsets,
                &mut buffer,
            ));
        }

        info!(
            "Extracted {} citation spans from {} chars in {:?}",
            citation_spans.len(),
            offsets.len_chars(),
            started.elapsed()
        );

        ExtractionResult {
            marked_text,
            citation_spans,
            markers,
        }
    }

    fn record(
        &self,
        span: &CitationSpan,
        reference: Option<&str>,
        offsets: &CharOffsets,
        buffer: &mut String,
    ) -> SpanRecord {
        normalize_span_into(&span.span_text, self.config.normalize_mode, buffer);

        // last tier reports the citation's own reference text when the detector knows it
        if span.resolution == SpanResolution::MarkerText || buffer.is_empty() {
            if let Some(reference) = reference.filter(|r| !r.trim().is_empty()) {
                buffer.clear();
                buffer.push_str(reference.trim());
            }
        }
        if buffer.is_empty() {
            buffer.push_str(&format_marker(span.citation_id));
        }
        debug!(id = span.citation_id, resolution = ?span.resolution, "Allocated span");

        SpanRecord {
            citation_id: format_marker(span.citation_id),
            span_text: buffer.clone(),
            start: offsets.char_pos(span.start).0,
            end: offsets.char_pos(span.end).0,
            is_shared: span.is_shared,
            resolution: span.resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeMode;

    fn engine() -> CitationEngine {
        CitationEngine::with_defaults().unwrap()
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CitationEngine>();
    }

    #[test]
    fn test_extract_numeric_citation() {
        let result = engine().extract("Intro. Transformers dominate NLP [1]. Next sentence.");
        assert_eq!(result.marked_text, "Intro. Transformers dominate NLP [CITATION_1]. Next sentence.");
        assert_eq!(result.citation_spans.len(), 1);

        let record = &result.citation_spans[0];
        assert_eq!(record.citation_id, "[CITATION_1]");
        assert_eq!(record.span_text, "Transformers dominate NLP.");
        let region: String = result
            .marked_text
            .chars()
            .skip(record.start)
            .take(record.end - record.start)
            .collect();
        assert_eq!(region, "Transformers dominate NLP [CITATION_1].");
    }

    #[test]
    fn test_protected_url_survives() {
        let text = "Code is at https://example.org/repo [2]. Done.";
        let result = engine().extract(text);
        assert!(result.marked_text.contains("https://example.org/repo [CITATION_1]"));
        assert_eq!(result.markers[0].reference_text, "2");
    }

    #[test]
    fn test_char_offsets_with_multibyte_text() {
        let result = engine().extract("Über Modelle — schön [1].");
        let record = &result.citation_spans[0];
        assert_eq!(record.start, 0);
        assert_eq!(record.end, result.marked_text.chars().count());
    }

    #[test]
    fn test_extract_bytes_rejects_invalid_utf8() {
        let err = engine().extract_bytes(&[0x66, 0xff, 0x6f]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEncoding(_)));
    }

    #[test]
    fn test_cosmetic_mode() {
        let config = EngineConfig {
            normalize_mode: NormalizeMode::Cosmetic,
            ..EngineConfig::default()
        };
        let engine = CitationEngine::new(config).unwrap();
        let result = engine.extract("A claim\n   spread over   lines [1].");
        assert_eq!(result.citation_spans[0].span_text, "A claim spread over lines.");
    }

    #[test]
    fn test_result_serializes_to_expected_shape() {
        let result = engine().extract("A claim [1].");
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["marked_text"], "A claim [CITATION_1].");
        assert_eq!(json["citation_spans"][0]["citation_id"], "[CITATION_1]");
        assert_eq!(json["citation_spans"][0]["resolution"], "sentence");
        assert!(json.get("markers").is_none());
    }
}
