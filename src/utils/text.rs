//! Text processing utilities.

/// Whether the text contains anything besides whitespace.
pub fn has_content(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace())
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head.trim_end())
    } else {
        head
    }
}
