//! Field-scoped validation results shared by the account forms and the
//! vitals capture.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collected field errors. Never constructed empty by the validators in this
/// workspace: an empty set means the input was valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

pub fn validate_email(value: &str) -> bool {
    email_pattern().is_match(value)
}

/// At least 8 characters with a lowercase letter, an uppercase letter, a digit
/// and a symbol.
pub fn validate_strong_password(value: &str) -> bool {
    value.chars().count() >= 8
        && value.chars().any(|c| c.is_ascii_lowercase())
        && value.chars().any(|c| c.is_ascii_uppercase())
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().any(|c| !c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("pat@example.com"));
        assert!(!validate_email("pat@example"));
        assert!(!validate_email("pat example@x.io"));
        assert!(!validate_email(""));
    }

    #[test]
    fn test_strong_password() {
        assert!(validate_strong_password("Str0ng!pass"));
        assert!(!validate_strong_password("Sh0rt!"));
        assert!(!validate_strong_password("alllower1!"));
        assert!(!validate_strong_password("NoDigits!!"));
        assert!(!validate_strong_password("NoSymbol123"));
    }

    #[test]
    fn test_errors_collect_per_field() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add("heightCm", "Required");
        errors.add("weightKg", "Value must be between 30 and 250");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.for_field("heightCm"), Some("Required"));
        assert_eq!(
            errors.to_string(),
            "heightCm: Required; weightKg: Value must be between 30 and 250"
        );
    }
}
