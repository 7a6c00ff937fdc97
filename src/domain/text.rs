//! Small character-safe string helpers

/// At most `max_chars` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Like [`truncate_chars`], appending `...` when something was cut
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut.trim_end())
    } else {
        cut.to_string()
    }
}
