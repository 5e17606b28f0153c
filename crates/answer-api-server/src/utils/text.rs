use once_cell::sync::Lazy;
use regex::Regex;

use super::error::AnswerError;

pub const MAX_QUERY_CHARS: usize = 5000;

static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

/// Validate and trim a raw query (1..=5000 characters)
pub fn validate_query(raw: Option<&str>) -> Result<String, AnswerError> {
    let raw = match raw {
        Some(q) if !q.is_empty() => q,
        _ => {
            return Err(AnswerError::Validation(
                "Query must be a non-empty string".to_string(),
            ))
        }
    };

    if raw.chars().count() > MAX_QUERY_CHARS {
        return Err(AnswerError::Validation(format!(
            "Query is too long (max {} characters)",
            MAX_QUERY_CHARS
        )));
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AnswerError::Validation(
            "Query must be a non-empty string".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Cut `text` to `max_chars` characters, marking the cut with "..."
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
    }
}

/// Keep the first `max_sentences` sentences longer than 20 characters
pub fn extract_key_sentences(text: &str, max_sentences: usize) -> String {
    let sentences: Vec<&str> = SENTENCE_BOUNDARY
        .split(text)
        .map(str::trim)
        .filter(|s| s.chars().count() > 20)
        .take(max_sentences)
        .collect();

    if sentences.is_empty() {
        return String::new();
    }

    format!("{}.", sentences.join(". "))
}

/// Short single-line preview for logs
pub fn log_preview(text: &str) -> String {
    let mut preview: String = text.chars().take(100).collect();
    if text.chars().count() > 100 {
        preview.push_str("...");
    }
    preview.replace('\n', " ")
}
