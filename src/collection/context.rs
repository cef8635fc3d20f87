//! Caller Context
//!
//! Identifies who issues a collection operation. Carried unchanged through
//! virtual collections down to the physical collection.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

/// Context carried with every collection operation
#[derive(Debug, Clone)]
pub struct Caller {
    /// Request ID for tracing
    pub request_id: Uuid,

    /// Identifier of the admin user, if known
    pub user_id: Option<String>,

    /// IANA timezone of the user (e.g. `Europe/Paris`)
    pub timezone: String,

    /// Free-form request metadata
    pub metadata: HashMap<String, Value>,
}

impl Caller {
    /// Create a caller for a known user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::anonymous()
        }
    }

    /// Create an anonymous caller
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: None,
            timezone: "UTC".to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for Caller {
    fn default() -> Self {
        Self::anonymous()
    }
}
