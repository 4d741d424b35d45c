//! Input rules for topics and posts.
//!
//! Content is trimmed before it is stored; the length limit applies to the
//! trimmed text and counts characters, not bytes.

use crate::domain::error::DomainError;

pub const MAX_TITLE_CHARS: usize = 255;

/// Trim and check a topic title.
pub fn normalize_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

/// Trim and check post content against the configured limit.
pub fn normalize_content(content: &str, max_chars: usize) -> Result<String, DomainError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(DomainError::validation("post content cannot be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(DomainError::validation(format!(
            "post content must be at most {max_chars} characters"
        )));
    }
    Ok(content.to_string())
}

/// Detector scores are probabilities.
pub fn check_ai_probability(probability: f32) -> Result<f32, DomainError> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(DomainError::validation(format!(
            "AI probability {probability} is outside [0, 1]"
        )))
    }
}
