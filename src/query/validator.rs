//! Field name validation
//!
//! Field names are interpolated into query text, so every reference is
//! checked here first. Parameter values are always bound and never pass
//! through this module.

use std::sync::OnceLock;

use regex::Regex;

use super::ast::NESTED_SEPARATOR;
use super::errors::{QueryError, QueryResult};

/// SQL keywords rejected when they appear as a standalone token
const RESERVED_WORDS: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "union", "alter", "create", "truncate",
    "exec", "execute", "merge", "grant", "revoke",
];

/// Character sequences that never belong in a field name
const INJECTION_SEQUENCES: &[(&str, &str)] = &[
    ("'", "quote character"),
    ("\"", "quote character"),
    ("`", "quote character"),
    (";", "statement separator"),
    ("--", "line comment"),
    ("/*", "block comment"),
    ("*/", "block comment"),
];

fn segment_pattern() -> &'static Regex {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("segment pattern is a valid regex")
    })
}

/// Validates raw field names before interpolation
pub struct FieldValidator;

impl FieldValidator {
    /// Validates a field name, possibly nested with `->`.
    ///
    /// Injection checks run before the grammar check so that an attack
    /// attempt is never reported as a simple typo.
    pub fn validate(field: &str) -> QueryResult<()> {
        Self::check_injection(field)?;

        if field.is_empty() {
            return Err(QueryError::invalid_field_name(field, "field name is empty"));
        }

        for segment in field.split(NESTED_SEPARATOR) {
            Self::validate_segment(field, segment)?;
        }

        Ok(())
    }

    fn check_injection(field: &str) -> QueryResult<()> {
        for (sequence, reason) in INJECTION_SEQUENCES {
            if field.contains(sequence) {
                return Err(QueryError::potential_injection(field, *reason));
            }
        }

        let lowered = field.to_ascii_lowercase();
        let reserved = lowered
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .find(|token| RESERVED_WORDS.contains(token));

        if let Some(word) = reserved {
            return Err(QueryError::potential_injection(
                field,
                format!("reserved word '{}'", word),
            ));
        }

        Ok(())
    }

    fn validate_segment(field: &str, segment: &str) -> QueryResult<()> {
        if segment.is_empty() {
            return Err(QueryError::invalid_field_name(field, "empty path segment"));
        }

        if segment.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(QueryError::invalid_field_name(
                field,
                format!("segment '{}' starts with a digit", segment),
            ));
        }

        if !segment_pattern().is_match(segment) {
            return Err(QueryError::invalid_field_name(
                field,
                format!("segment '{}' contains disallowed characters", segment),
            ));
        }

        Ok(())
    }
}
