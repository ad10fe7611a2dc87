//! Shared utility functions

use unicode_width::UnicodeWidthChar;

/// Longest prefix of `s` whose display width fits in `max_width` columns
///
/// Wide characters (CJK, emoji) count as two columns and are never split.
pub fn truncate_to_width(s: &str, max_width: usize) -> &str {
    let mut width = 0;
    for (idx, ch) in s.char_indices() {
        let w = ch.width().unwrap_or(0);
        if width + w > max_width {
            return &s[..idx];
        }
        width += w;
    }
    s
}

/// Pad or cut `s` to exactly `width` display columns
///
/// Used to re-render records in the bus logger's fixed-width layout.
/// If a wide character would straddle the edge it is dropped and the gap
/// padded with a space.
pub fn fit_column(s: &str, width: usize) -> String {
    let cut = truncate_to_width(s, width);
    let used: usize = cut.chars().map(|c| c.width().unwrap_or(0)).sum();
    let mut out = String::with_capacity(cut.len() + width.saturating_sub(used));
    out.push_str(cut);
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    out
}

/// Cut `s` to at most `max_chars` characters, marking the cut with "..."
pub fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
