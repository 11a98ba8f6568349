/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Rough token estimate for remote models without a local tokenizer:
/// ~4 characters per token for English prose.
pub fn estimate_tokens(s: &str) -> usize {
    s.len().div_ceil(4)
}

/// Truncate to a token budget using the character estimate.
pub fn truncate_to_tokens(s: &str, max_tokens: usize) -> &str {
    truncate_to_char_boundary(s, max_tokens * 4)
}
