use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

/// Keeps only ASCII digits (`"11.222.333/0001-81"` -> `"11222333000181"`).
pub fn sanitize_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// CPF has 11 digits, CNPJ 14. Expects an already sanitized value.
pub fn validate_tax_id(tax_id: &str) -> AppResult<()> {
    if tax_id.len() != 11 && tax_id.len() != 14 {
        return Err(AppError::ValidationError("Invalid CPF/CNPJ".to_string()));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(AppError::ValidationError("Invalid email".to_string()));
    }
    Ok(())
}

/// Trims and rejects empty required text fields.
pub fn require_text<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("Missing {field}")));
    }
    Ok(trimmed)
}
