use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regular expression")
});

/// Collects validation failures for a single form submission.
///
/// Field errors keep the first message recorded per field. Non-field errors
/// keep every message in the order they were added.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Validator {
    field_errors: HashMap<String, String>,
    non_field_errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    pub fn add_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(field.into())
            .or_insert_with(|| message.into());
    }

    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    pub fn check_field(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_field_error(field, message);
        }
    }

    pub fn field_errors(&self) -> &HashMap<String, String> {
        &self.field_errors
    }

    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.field_errors.get(field).map(String::as_str)
    }

    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Counts characters, not bytes.
pub fn max_chars(value: &str, limit: usize) -> bool {
    value.chars().count() <= limit
}

pub fn min_chars(value: &str, limit: usize) -> bool {
    value.chars().count() >= limit
}

pub fn permitted_value<T: PartialEq>(value: T, permitted: &[T]) -> bool {
    permitted.contains(&value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}
