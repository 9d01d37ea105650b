// WHY: Type-safe position wrappers to prevent byte/char confusion
// Engine internals slice by byte; emitted span records are character offsets

use serde::{Deserialize, Serialize};

/// 0-based byte position in source text
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct BytePos(pub usize);

/// 0-based character position in source text
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct CharPos(pub usize);

impl From<BytePos> for usize {
    fn from(pos: BytePos) -> Self {
        pos.0
    }
}

impl From<CharPos> for usize {
    fn from(pos: CharPos) -> Self {
        pos.0
    }
}

/// Byte-to-char offset lookup built once per text
/// WHY: Span records are emitted in arbitrary order, so a forward-only tracker is not enough
#[derive(Debug)]
pub struct CharOffsets {
    /// Byte offset at which each character starts
    char_starts: Vec<usize>,
    text_len: usize,
}

impl CharOffsets {
    pub fn new(text: &str) -> Self {
        Self {
            char_starts: text.char_indices().map(|(i, _)| i).collect(),
            text_len: text.len(),
        }
    }

    /// Convert a byte position to the number of characters preceding it.
    /// Positions inside a multi-byte character resolve to that character.
    pub fn char_pos(&self, byte: BytePos) -> CharPos {
        if byte.0 >= self.text_len {
            return CharPos(self.char_starts.len());
        }
        CharPos(self.char_starts.partition_point(|&start| start <= byte.0) - 1)
    }

    pub fn len_chars(&self) -> usize {
        self.char_starts.len()
    }
}

/// Largest char boundary at or before `pos`
pub fn floor_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Move `n` characters backward from byte `pos`, stopping at 0
pub fn retreat_chars(text: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    let pos = floor_char_boundary(text, pos);
    text[..pos]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Move `n` characters forward from byte `pos`, stopping at the end of text
pub fn advance_chars(text: &str, pos: usize, n: usize) -> usize {
    let pos = floor_char_boundary(text, pos);
    text[pos..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| pos + i)
        .unwrap_or(text.len())
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_offsets_ascii_and_multibyte() {
        let text = "a§b ü c";
        let offsets = CharOffsets::new(text);

        assert_eq!(offsets.char_pos(BytePos(0)), CharPos(0));
        assert_eq!(offsets.char_pos(BytePos(1)), CharPos(1));
        // '§' is two bytes, so 'b' starts at byte 3 but is the third char
        assert_eq!(offsets.char_pos(BytePos(3)), CharPos(2));
        assert_eq!(offsets.char_pos(BytePos(text.len())), CharPos(7));
        assert_eq!(offsets.len_chars(), 7);
    }

    #[test]
    fn test_char_walking() {
        let text = "ab§cd";
        assert_eq!(advance_chars(text, 0, 3), 4);
        assert_eq!(retreat_chars(text, 4, 1), 2);
        assert_eq!(retreat_chars(text, 4, 10), 0);
        assert_eq!(advance_chars(text, 4, 10), text.len());
        assert_eq!(retreat_chars(text, 4, 0), 4);
    }

    #[test]
    fn test_char_boundaries() {
        let text = "a§b";
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(floor_char_boundary(text, 99), text.len());
    }
}
