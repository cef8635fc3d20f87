//! Query layer error types
//!
//! Error codes:
//! - COSMOS_INVALID_FIELD_NAME (VALIDATION)
//! - COSMOS_POTENTIAL_INJECTION (VALIDATION)
//! - COSMOS_INVALID_CONDITION_TREE (STRUCTURAL)
//! - COSMOS_INVALID_COMPOSITE_ID (STRUCTURAL)
//! - COSMOS_INVALID_AGGREGATION (STRUCTURAL)
//! - COSMOS_UNSUPPORTED_OPERATOR (UNSUPPORTED)
//! - COSMOS_UNSUPPORTED_RELATION (UNSUPPORTED)
//! - COSMOS_UNSUPPORTED_AGGREGATION (UNSUPPORTED)

use std::fmt;

/// Error categories shared by the query and collection layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input shape, never retried
    Structural,
    /// Field name rejected before interpolation
    Validation,
    /// Feature deliberately not implemented
    Unsupported,
    /// Operation refused to protect data or resources
    SafetyGuard,
    /// Failure reported by the underlying document store
    Store,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Structural => write!(f, "STRUCTURAL"),
            ErrorCategory::Validation => write!(f, "VALIDATION"),
            ErrorCategory::Unsupported => write!(f, "UNSUPPORTED"),
            ErrorCategory::SafetyGuard => write!(f, "SAFETY_GUARD"),
            ErrorCategory::Store => write!(f, "STORE"),
        }
    }
}

/// Query-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    /// Field name does not follow the identifier grammar
    InvalidFieldName,
    /// Field name carries SQL control characters or keywords
    PotentialInjection,
    /// Condition tree shape is malformed
    InvalidConditionTree,
    /// Composite id cannot be decomposed
    InvalidCompositeId,
    /// Aggregation request is malformed
    InvalidAggregation,
    /// Operator has no query template
    UnsupportedOperator,
    /// Field crosses a relation
    UnsupportedRelation,
    /// Aggregation shape is not implemented
    UnsupportedAggregation,
}

impl QueryErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::InvalidFieldName => "COSMOS_INVALID_FIELD_NAME",
            QueryErrorCode::PotentialInjection => "COSMOS_POTENTIAL_INJECTION",
            QueryErrorCode::InvalidConditionTree => "COSMOS_INVALID_CONDITION_TREE",
            QueryErrorCode::InvalidCompositeId => "COSMOS_INVALID_COMPOSITE_ID",
            QueryErrorCode::InvalidAggregation => "COSMOS_INVALID_AGGREGATION",
            QueryErrorCode::UnsupportedOperator => "COSMOS_UNSUPPORTED_OPERATOR",
            QueryErrorCode::UnsupportedRelation => "COSMOS_UNSUPPORTED_RELATION",
            QueryErrorCode::UnsupportedAggregation => "COSMOS_UNSUPPORTED_AGGREGATION",
        }
    }

    /// Returns the category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryErrorCode::InvalidFieldName | QueryErrorCode::PotentialInjection => {
                ErrorCategory::Validation
            }
            QueryErrorCode::InvalidConditionTree
            | QueryErrorCode::InvalidCompositeId
            | QueryErrorCode::InvalidAggregation => ErrorCategory::Structural,
            QueryErrorCode::UnsupportedOperator
            | QueryErrorCode::UnsupportedRelation
            | QueryErrorCode::UnsupportedAggregation => ErrorCategory::Unsupported,
        }
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Query error type with full context
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    /// Error code
    code: QueryErrorCode,
    /// Human-readable message
    message: String,
    /// Offending field name if applicable
    field: Option<String>,
}

impl QueryError {
    fn new(code: QueryErrorCode, message: impl Into<String>, field: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field,
        }
    }

    /// Create an invalid field name error
    pub fn invalid_field_name(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            QueryErrorCode::InvalidFieldName,
            format!("Invalid field name '{}': {}", field, reason.into()),
            Some(field),
        )
    }

    /// Create a potential injection error
    pub fn potential_injection(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            QueryErrorCode::PotentialInjection,
            format!("Potential injection in field name '{}': {}", field, reason.into()),
            Some(field),
        )
    }

    /// Create a malformed condition tree error
    pub fn invalid_condition_tree(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::InvalidConditionTree, reason, None)
    }

    /// Create an invalid composite id error
    pub fn invalid_composite_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            QueryErrorCode::InvalidCompositeId,
            format!("Invalid composite id '{}': {}", id.into(), reason.into()),
            None,
        )
    }

    /// Create a malformed aggregation error
    pub fn invalid_aggregation(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::InvalidAggregation, reason, None)
    }

    /// Create an unsupported operator error
    pub fn unsupported_operator(operator: impl fmt::Display, field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            QueryErrorCode::UnsupportedOperator,
            format!("Unsupported operator: {} (field '{}')", operator, field),
            Some(field),
        )
    }

    /// Create an unsupported relation error
    pub fn unsupported_relation(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            QueryErrorCode::UnsupportedRelation,
            format!("Relation fields are not supported: '{}'", field),
            Some(field),
        )
    }

    /// Create an unsupported aggregation error
    pub fn unsupported_aggregation(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::UnsupportedAggregation, reason, None)
    }

    /// Returns the error code
    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    /// Returns the error category
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending field if applicable
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.category(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for QueryError {}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            QueryErrorCode::InvalidFieldName.code(),
            "COSMOS_INVALID_FIELD_NAME"
        );
        assert_eq!(
            QueryErrorCode::PotentialInjection.code(),
            "COSMOS_POTENTIAL_INJECTION"
        );
        assert_eq!(
            QueryErrorCode::UnsupportedOperator.code(),
            "COSMOS_UNSUPPORTED_OPERATOR"
        );
    }

    #[test]
    fn test_typo_and_attack_are_distinguishable() {
        let typo = QueryError::invalid_field_name("1abc", "leading digit");
        let attack = QueryError::potential_injection("a;b", "statement separator");

        assert_ne!(typo.code(), attack.code());
        assert_eq!(typo.category(), ErrorCategory::Validation);
        assert_eq!(attack.category(), ErrorCategory::Validation);
        assert_eq!(attack.field(), Some("a;b"));
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::invalid_condition_tree("empty branch");
        let display = format!("{}", err);
        assert!(display.contains("STRUCTURAL"));
        assert!(display.contains("COSMOS_INVALID_CONDITION_TREE"));
        assert!(display.contains("empty branch"));
    }
}
