//! Input validation helpers.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ApiError;

/// Collects field-level validation errors. The first message recorded for a
/// field wins.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Convert into a 422 if anything was recorded.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationFailed(self.errors))
        }
    }
}

/// True if every value in the slice is distinct.
pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v))
}

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is valid")
});

/// Matches the HTML5 email address grammar.
pub fn is_email(value: &str) -> bool {
    EMAIL_RX.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let mut v = Validator::new();
        v.check(false, "email", "must be provided");
        v.check(false, "email", "must be a valid email address");
        v.check(true, "name", "must be provided");

        assert!(!v.is_valid());
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()["email"], "must be provided");
    }

    #[test]
    fn test_finish() {
        assert!(Validator::new().finish().is_ok());

        let mut v = Validator::new();
        v.add_error("token", "must be provided");
        assert!(matches!(v.finish(), Err(ApiError::ValidationFailed(_))));
    }

    #[test]
    fn test_unique() {
        assert!(unique(&["drama", "comedy"]));
        assert!(!unique(&["drama", "drama"]));
        assert!(unique::<&str>(&[]));
    }

    #[test]
    fn test_email_accepts() {
        for email in [
            "alice@example.com",
            "alice@example",
            "first.last+tag@sub.example.co.uk",
            "o'brien@example.com",
            "x@a-b.io",
        ] {
            assert!(is_email(email), "{email} should be accepted");
        }
    }

    #[test]
    fn test_email_rejects() {
        let long_label = format!("alice@{}.com", "a".repeat(64));
        for email in [
            "",
            "@example.com",
            "alice",
            "alice@",
            "alice example@example.com",
            "alice@@example.com",
            "alice@-example.com",
            "alice@example-.com",
            "alice@example..com",
            "alice@.example.com",
            "alice@example.com.",
            long_label.as_str(),
        ] {
            assert!(!is_email(email), "{email} should be rejected");
        }
    }
}
