//! Validation helpers for DTOs.

use validator::ValidationError;

const SESSION_CODE_MIN: usize = 3;
const SESSION_CODE_MAX: usize = 32;

/// Validates that a session code is 3 to 32 characters of `[A-Za-z0-9_-]`.
///
/// # Examples
///
/// ```ignore
/// validate_session_code("QUIZ42")   // Ok
/// validate_session_code("QZ")       // Err - too short
/// validate_session_code("quiz 42")  // Err - space
/// ```
pub fn validate_session_code(code: &str) -> Result<(), ValidationError> {
    let len = code.chars().count();
    if !(SESSION_CODE_MIN..=SESSION_CODE_MAX).contains(&len) {
        let mut err = ValidationError::new("session_code_length");
        err.message = Some(
            format!(
                "Session code must be {SESSION_CODE_MIN} to {SESSION_CODE_MAX} characters (got {len})"
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new("session_code_format");
        err.message =
            Some("Session code may only contain ASCII letters, digits, `_` and `-`".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a string has visible content.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}
