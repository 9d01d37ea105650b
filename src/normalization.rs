// WHY: standalone span cleanup so the allocator stays offset-exact
// Preservative output stays a substring of the source; cosmetic output is for display only

use crate::config::NormalizeMode;

/// Normalize span text according to `mode`
pub fn normalize_span(text: &str, mode: NormalizeMode) -> String {
    let mut result = String::with_capacity(text.len());
    normalize_span_into(text, mode, &mut result);
    result
}

/// Normalize span text into supplied buffer to avoid allocation
/// WHY: enables buffer reuse when a document yields many spans
pub fn normalize_span_into(text: &str, mode: NormalizeMode, buffer: &mut String) {
    buffer.clear();
    match mode {
        NormalizeMode::Preservative => buffer.push_str(text.trim()),
        NormalizeMode::Cosmetic => cosmetic_into(text, buffer),
    }
}

/// Collapse whitespace runs, drop spaces before closing punctuation, collapse repeated periods.
/// NOT reversible: offsets into the source no longer line up with the output.
fn cosmetic_into(text: &str, buffer: &mut String) {
    buffer.reserve(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            // leading whitespace never produces a space
            pending_space = !buffer.is_empty();
            continue;
        }
        if matches!(ch, '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']') {
            pending_space = false;
        }
        if pending_space {
            buffer.push(' ');
            pending_space = false;
        }
        if ch == '.' && buffer.ends_with('.') {
            continue;
        }
        buffer.push(ch);
    }
}
