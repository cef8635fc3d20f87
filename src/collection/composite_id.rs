//! Composite identifiers for virtualized array items
//!
//! Wire format: `parentId:index`. The parent id may itself be a composite
//! id (`root:0:2`), so parsing always splits on the last separator and
//! peels exactly one level.

use std::fmt;
use std::str::FromStr;

use crate::query::{QueryError, QueryResult};

/// Separator between the parent id and the array index
pub const COMPOSITE_SEPARATOR: char = ':';

/// Address of one element of a virtualized array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    pub parent_id: String,
    pub index: usize,
}

impl CompositeId {
    pub fn new(parent_id: impl Into<String>, index: usize) -> Self {
        Self {
            parent_id: parent_id.into(),
            index,
        }
    }

    /// Parses a composite id, splitting on the last separator
    pub fn parse(id: &str) -> QueryResult<Self> {
        let (parent_id, index) = id.rsplit_once(COMPOSITE_SEPARATOR).ok_or_else(|| {
            QueryError::invalid_composite_id(id, "missing ':' separator")
        })?;

        if parent_id.is_empty() {
            return Err(QueryError::invalid_composite_id(id, "empty parent id"));
        }

        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QueryError::invalid_composite_id(
                id,
                format!("index '{}' is not a non-negative integer", index),
            ));
        }

        let index = index.parse::<usize>().map_err(|e| {
            QueryError::invalid_composite_id(id, format!("index out of range: {}", e))
        })?;

        Ok(Self::new(parent_id, index))
    }

    /// Returns the nesting depth (1 for `doc:0`, 2 for `doc:0:1`)
    pub fn depth(&self) -> usize {
        1 + self.parent_id.matches(COMPOSITE_SEPARATOR).count()
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.parent_id, COMPOSITE_SEPARATOR, self.index)
    }
}

impl FromStr for CompositeId {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Builds the composite id string for an array element
pub fn make_composite_id(parent_id: &str, index: usize) -> String {
    CompositeId::new(parent_id, index).to_string()
}
