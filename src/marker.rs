// WHY: Single owner of the `[CITATION_n]` token format
// Detector, locator, allocator and pipeline all scan or strip tokens through here

use regex_automata::{meta::Regex, Anchored, Input};

use crate::error::{compile, Result};
use crate::position::BytePos;

/// Render the normalized marker token for a sequence id
pub fn format_marker(id: u32) -> String {
    format!("[CITATION_{id}]")
}

/// A marker token located in a marked text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerToken {
    pub id: u32,
    pub start: BytePos,
    pub end: BytePos,
}

impl MarkerToken {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start.0..self.end.0
    }
}

/// Adjacent marker tokens separated only by whitespace, commas or semicolons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerCluster {
    pub tokens: Vec<MarkerToken>,
}

impl MarkerCluster {
    pub fn start(&self) -> BytePos {
        self.tokens.first().map(|t| t.start).unwrap_or(BytePos(0))
    }

    pub fn end(&self) -> BytePos {
        self.tokens.last().map(|t| t.end).unwrap_or(BytePos(0))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub struct MarkerScanner {
    token: Regex,
    /// A token plus any adjacent tokens and the whitespace before it
    cluster: Regex,
}

impl MarkerScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            token: compile("marker", r"\[CITATION_([0-9]{1,9})\]")?,
            cluster: compile(
                "marker-cluster",
                r"\s*\[CITATION_[0-9]{1,9}\](?:[\s,;]*\[CITATION_[0-9]{1,9}\])*",
            )?,
        })
    }

    /// All marker tokens in left-to-right order
    pub fn scan(&self, text: &str) -> Vec<MarkerToken> {
        let mut tokens = Vec::new();
        for caps in self.token.captures_iter(text) {
            let (Some(whole), Some(digits)) = (caps.get_match(), caps.get_group(1)) else {
                continue;
            };
            if let Ok(id) = text[digits.range()].parse::<u32>() {
                tokens.push(MarkerToken {
                    id,
                    start: BytePos(whole.start()),
                    end: BytePos(whole.end()),
                });
            }
        }
        tokens
    }

    /// Token starting exactly at `pos`, if any
    pub fn token_at(&self, text: &str, pos: usize) -> Option<MarkerToken> {
        let input = Input::new(text).range(pos..).anchored(Anchored::Yes);
        let mut caps = self.token.create_captures();
        self.token.captures(input, &mut caps);
        let whole = caps.get_match()?;
        let digits = caps.get_group(1)?;
        let id = text[digits.range()].parse::<u32>().ok()?;
        Some(MarkerToken {
            id,
            start: BytePos(whole.start()),
            end: BytePos(whole.end()),
        })
    }

    /// End of the run of adjacent tokens beginning at `pos`
    pub fn cluster_end(&self, text: &str, pos: usize) -> usize {
        let mut end = pos;
        let mut cursor = pos;
        while let Some(token) = self.token_at(text, cursor) {
            end = token.end.0;
            cursor = end;
            let rest = &text[cursor..];
            let skipped = rest.len()
                - rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ';').len();
            cursor += skipped;
        }
        end
    }

    /// Group tokens into adjacency clusters
    pub fn clusters(&self, text: &str, tokens: &[MarkerToken]) -> Vec<MarkerCluster> {
        let mut clusters: Vec<MarkerCluster> = Vec::new();
        for token in tokens {
            match clusters.last_mut() {
                Some(current) if is_separator_only(&text[current.end().0..token.start.0]) => {
                    current.tokens.push(*token);
                }
                _ => clusters.push(MarkerCluster { tokens: vec![*token] }),
            }
        }
        clusters
    }

    /// Remove marker tokens together with the whitespace before each cluster
    pub fn strip(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut cursor = 0;
        for m in self.cluster.find_iter(text) {
            result.push_str(&text[cursor..m.start()]);
            cursor = m.end();
        }
        result.push_str(&text[cursor..]);
        result
    }

    /// True when `text` holds nothing but tokens and separators
    pub fn is_marker_only(&self, text: &str) -> bool {
        self.strip(text)
            .chars()
            .all(|c| c.is_whitespace() || c == ',' || c == ';')
    }
}

fn is_separator_only(between: &str) -> bool {
    between.chars().all(|c| c.is_whitespace() || c == ',' || c == ';')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> MarkerScanner {
        MarkerScanner::new().unwrap()
    }

    #[test]
    fn test_scan_finds_tokens_in_order() {
        let text = "A [CITATION_2] b [CITATION_10].";
        let tokens = scanner().scan(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].id, 2);
        assert_eq!(&text[tokens[0].range()], "[CITATION_2]");
        assert_eq!(tokens[1].id, 10);
    }

    #[test]
    fn test_strip_removes_clusters_and_leading_space() {
        let s = scanner();
        assert_eq!(s.strip("claim [CITATION_1]."), "claim.");
        assert_eq!(s.strip("known [CITATION_1], [CITATION_2] and more"), "known and more");
        assert_eq!(s.strip("[CITATION_1] Start here"), " Start here");
        assert_eq!(s.strip("no markers"), "no markers");
    }

    #[test]
    fn test_clusters_split_on_prose() {
        let s = scanner();
        let text = "A [CITATION_1]; [CITATION_2] then B [CITATION_3].";
        let tokens = s.scan(text);
        let clusters = s.clusters(text, &tokens);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 2);
        assert_eq!(clusters[1].tokens[0].id, 3);
    }

    #[test]
    fn test_cluster_end_and_token_at() {
        let s = scanner();
        let text = "x [CITATION_1], [CITATION_2] y";
        assert_eq!(s.token_at(text, 2).map(|t| t.id), Some(1));
        assert!(s.token_at(text, 0).is_none());
        assert_eq!(s.cluster_end(text, 2), text.find(" y").unwrap());
    }

    #[test]
    fn test_marker_only() {
        let s = scanner();
        assert!(s.is_marker_only(" [CITATION_1], [CITATION_2] "));
        assert!(!s.is_marker_only("[CITATION_1] word"));
    }
}
