use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Field-level validation messages, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn first(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn all(&self) -> Vec<String> {
        self.0.values().flatten().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    // Exactly one @ separating a non-empty local part from a dotted domain
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || !domain.contains('.') {
        return false;
    }

    let domain_parts: Vec<&str> = domain.split('.').collect();
    domain_parts.len() >= 2 && domain_parts.iter().all(|part| !part.is_empty())
}

pub fn validate_email(email: &str, errors: &mut FieldErrors) {
    if email.trim().is_empty() {
        errors.add("email", "The email field is required.");
    } else if !is_valid_email(email.trim()) {
        errors.add("email", "The email must be a valid email address.");
    }
}

/// A password is mandatory when `required`; when present it must be long
/// enough and match its confirmation.
pub fn validate_password(
    password: Option<&str>,
    confirmation: Option<&str>,
    required: bool,
    errors: &mut FieldErrors,
) {
    let password = password.filter(|p| !p.is_empty());

    match password {
        None if required => errors.add("password", "The password field is required."),
        None => {}
        Some(password) => {
            if password.chars().count() < MIN_PASSWORD_LENGTH {
                errors.add(
                    "password",
                    format!(
                        "The password must be at least {} characters.",
                        MIN_PASSWORD_LENGTH
                    ),
                );
            }
            if confirmation != Some(password) {
                errors.add("password", "The password confirmation does not match.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("test.user+tag@domain.co.uk"));
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example."));
    }

    #[test]
    fn test_required_password_missing() {
        let mut errors = FieldErrors::new();
        validate_password(Some(""), None, true, &mut errors);

        assert_eq!(errors.first("password"), Some("The password field is required."));
    }

    #[test]
    fn test_optional_password_may_be_blank() {
        let mut errors = FieldErrors::new();
        validate_password(None, None, false, &mut errors);
        validate_password(Some(""), Some(""), false, &mut errors);

        assert!(errors.is_empty());
    }

    #[test]
    fn test_password_rules_collect_every_message() {
        let mut errors = FieldErrors::new();
        validate_password(Some("short"), Some("other"), false, &mut errors);

        assert_eq!(errors.all().len(), 2);
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_blank_email_is_required_error() {
        let mut errors = FieldErrors::new();
        validate_email("  ", &mut errors);

        assert!(errors.has("email"));
        assert_eq!(errors.first("email"), Some("The email field is required."));
    }
}
