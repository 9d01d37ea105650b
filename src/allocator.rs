// WHY: Decide what text each citation supports when several citations share a sentence
// Tiers run in order and the first non-empty span wins, so no citation is ever left without a span

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EngineConfig, MultiCitationStrategy};
use crate::error::{EngineError, Result};
use crate::marker::{MarkerCluster, MarkerScanner, MarkerToken};
use crate::position::{advance_chars, char_len, retreat_chars, BytePos};
use crate::sentence_locator::SentenceBounds;

/// Which allocation tier produced a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanResolution {
    Sentence,
    Clause,
    Window,
    DocumentHead,
    MarkerText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationSpan {
    pub citation_id: u32,
    /// Region text with marker tokens removed and outer whitespace trimmed
    pub span_text: String,
    pub is_shared: bool,
    /// Byte range of the region in the marked text
    pub start: BytePos,
    pub end: BytePos,
    pub resolution: SpanResolution,
}

pub struct SpanAllocator {
    markers: MarkerScanner,
    strategy: MultiCitationStrategy,
    short_span_expand_threshold: usize,
    fallback_window_chars: usize,
    document_head_chars: usize,
}

impl SpanAllocator {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            markers: MarkerScanner::new()?,
            strategy: config.multi_citation_strategy,
            short_span_expand_threshold: config.short_span_expand_threshold,
            fallback_window_chars: config.fallback_window_chars,
            document_head_chars: config.document_head_chars,
        })
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(&EngineConfig::default())
    }

    /// Span for `target`, given every marker token inside `bounds`
    pub fn allocate_spans(
        &self,
        text: &str,
        bounds: SentenceBounds,
        markers_in_sentence: &[MarkerToken],
        target: &MarkerToken,
    ) -> CitationSpan {
        let (start, end, is_shared, resolution) =
            self.sentence_tier(text, bounds, markers_in_sentence, target);

        match self.region_span(text, target.id, start, end, is_shared, resolution) {
            Some(span) => span,
            None => {
                let reason = EngineError::EmptySpanAfterCleanup { id: target.id };
                warn!(error = %reason, "Falling back to window span");
                self.fallback_span(text, target)
            }
        }
    }

    /// Window, then document head, then the token itself; never empty
    pub fn fallback_span(&self, text: &str, target: &MarkerToken) -> CitationSpan {
        let window_start = retreat_chars(text, target.start.0, self.fallback_window_chars);
        let window_end = advance_chars(text, target.end.0, self.fallback_window_chars);
        if let Some(span) =
            self.region_span(text, target.id, window_start, window_end, false, SpanResolution::Window)
        {
            return span;
        }

        let mut head_end = advance_chars(text, 0, self.document_head_chars);
        // never cut a token in half
        if let Some(token) = self
            .markers
            .scan(text)
            .into_iter()
            .find(|t| t.start.0 < head_end && head_end < t.end.0)
        {
            head_end = token.end.0;
        }
        if let Some(span) =
            self.region_span(text, target.id, 0, head_end, false, SpanResolution::DocumentHead)
        {
            warn!(id = target.id, "Window fallback empty; using document head");
            return span;
        }

        warn!(id = target.id, "Document holds only markers; using marker text");
        CitationSpan {
            citation_id: target.id,
            span_text: text[target.range()].to_string(),
            is_shared: false,
            start: target.start,
            end: target.end,
            resolution: SpanResolution::MarkerText,
        }
    }

    /// Region and sharing decision before any fallback
    fn sentence_tier(
        &self,
        text: &str,
        bounds: SentenceBounds,
        markers_in_sentence: &[MarkerToken],
        target: &MarkerToken,
    ) -> (usize, usize, bool, SpanResolution) {
        let whole = (bounds.start.0, bounds.end.0);
        if markers_in_sentence.len() <= 1 {
            return (whole.0, whole.1, false, SpanResolution::Sentence);
        }

        let clusters = self.markers.clusters(text, markers_in_sentence);
        let Some(index) = clusters
            .iter()
            .position(|c| c.start() <= target.start && target.end <= c.end())
        else {
            return (whole.0, whole.1, false, SpanResolution::Sentence);
        };

        if clusters.len() == 1 {
            // every marker in the sentence sits in one adjacent run
            return (whole.0, whole.1, true, SpanResolution::Sentence);
        }

        let adjacent = clusters[index].len() > 1;
        match (adjacent, self.strategy) {
            (false, MultiCitationStrategy::SharedSentence) => {
                (whole.0, whole.1, true, SpanResolution::Sentence)
            }
            (adjacent, _) => {
                let (start, end) = self.clause_region(text, bounds, &clusters, index);
                let resolution = if (start, end) == whole {
                    SpanResolution::Sentence
                } else {
                    SpanResolution::Clause
                };
                (start, end, adjacent, resolution)
            }
        }
    }

    /// Text since the previous cluster, through the target cluster
    fn clause_region(
        &self,
        text: &str,
        bounds: SentenceBounds,
        clusters: &[MarkerCluster],
        index: usize,
    ) -> (usize, usize) {
        let cluster = &clusters[index];
        let is_last = index + 1 == clusters.len();

        let mut start = match index {
            0 => bounds.start.0,
            _ => clusters[index - 1].end().0,
        };
        let end = if is_last { bounds.end.0 } else { cluster.end().0 };
        // separators left over from the previous cluster do not belong to this clause
        let region = &text[start..end];
        start += region.len()
            - region
                .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ';')
                .len();

        if self.clean(&text[start..end]).is_empty() {
            // nothing before the cluster: take the text it introduces
            let after_end = clusters
                .get(index + 1)
                .map_or(bounds.end.0, |next| next.start().0);
            debug!(id = ?cluster.tokens.first().map(|t| t.id), "Empty clause; using following text");
            return (cluster.start().0, after_end);
        }

        if char_len(&self.clean(&text[start..end])) < self.short_span_expand_threshold {
            start = expand_to_separator(text, bounds.start.0, start, clusters);
        }
        (start, end)
    }

    fn region_span(
        &self,
        text: &str,
        citation_id: u32,
        start: usize,
        end: usize,
        is_shared: bool,
        resolution: SpanResolution,
    ) -> Option<CitationSpan> {
        let span_text = self.clean(&text[start..end]);
        if span_text.is_empty() {
            return None;
        }
        let region = &text[start..end];
        let leading = region.len() - region.trim_start().len();
        let trailing = region.len() - region.trim_end().len();
        Some(CitationSpan {
            citation_id,
            span_text,
            is_shared,
            start: BytePos(start + leading),
            end: BytePos(end - trailing),
            resolution,
        })
    }

    fn clean(&self, region: &str) -> String {
        self.markers.strip(region).trim().to_string()
    }
}

/// Move `start` back to just after the nearest `,`/`;` outside any marker cluster
fn expand_to_separator(text: &str, floor: usize, start: usize, clusters: &[MarkerCluster]) -> usize {
    let inside_cluster = |pos: usize| clusters.iter().any(|c| c.start().0 <= pos && pos < c.end().0);
    text[floor..start]
        .char_indices()
        .rev()
        .map(|(i, c)| (floor + i, c))
        .find(|&(pos, c)| (c == ',' || c == ';') && !inside_cluster(pos))
        .map_or(floor, |(pos, _)| pos + 1)
}
