use serde::Serialize;
use thiserror::Error;

/// Input validation failure surfaced to API clients as a 400.
#[derive(Error, Debug, Clone, Serialize, PartialEq)]
#[error("Validation failed for {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Reject empty / whitespace-only required strings.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

/// Scores are normalized to the 0.0..=1.0 range everywhere.
pub fn require_unit_range(field: &str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(ValidationError::new(field, "must be between 0.0 and 1.0"));
    }
    Ok(())
}

/// Minimal shape check; deliverability is the mail system's problem.
pub fn require_email_shape(field: &str, value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return Err(ValidationError::new(field, "must be an email address"));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ValidationError::new(field, "must be an email address"));
    }
    Ok(())
}

/// Truncate long strings for log lines and audit detail fields.
pub fn truncate(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        value.to_string()
    } else {
        let mut end = max_len;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &value[..end])
    }
}
