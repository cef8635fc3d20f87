//! Collection configuration

/// Rows an unpaginated virtual list may return
pub const DEFAULT_MAX_UNPAGINATED_ROWS: usize = 1000;

/// Page size above which a virtual list logs a warning
pub const DEFAULT_LARGE_PAGE_WARNING: usize = 500;

/// Configuration for a virtual array collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualCollectionConfig {
    /// Field carrying the composite id on virtual records
    pub id_field: String,
    /// Field carrying the parent id on virtual records
    pub parent_id_field: String,
    /// Primary key of the parent collection
    pub parent_primary_key: String,
    /// Hard cap on unpaginated results
    pub max_unpaginated_rows: usize,
    /// Page size that triggers a size warning
    pub large_page_warning: usize,
}

impl Default for VirtualCollectionConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            parent_id_field: "parentId".to_string(),
            parent_primary_key: "id".to_string(),
            max_unpaginated_rows: DEFAULT_MAX_UNPAGINATED_ROWS,
            large_page_warning: DEFAULT_LARGE_PAGE_WARNING,
        }
    }
}

impl VirtualCollectionConfig {
    pub fn with_parent_id_field(mut self, field: impl Into<String>) -> Self {
        self.parent_id_field = field.into();
        self
    }

    pub fn with_parent_primary_key(mut self, field: impl Into<String>) -> Self {
        self.parent_primary_key = field.into();
        self
    }

    pub fn with_max_unpaginated_rows(mut self, max: usize) -> Self {
        self.max_unpaginated_rows = max;
        self
    }

    pub fn with_large_page_warning(mut self, size: usize) -> Self {
        self.large_page_warning = size;
        self
    }
}

/// Configuration for a physical Cosmos DB container collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmosCollectionConfig {
    /// Collection name exposed to the host agent
    pub name: String,
    /// Container partition key path (e.g. `/tenantId`)
    pub partition_key_path: String,
    /// Document primary key
    pub primary_key: String,
}

impl CosmosCollectionConfig {
    pub fn new(name: impl Into<String>, partition_key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key_path: partition_key_path.into(),
            primary_key: "id".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_defaults() {
        let config = VirtualCollectionConfig::default();
        assert_eq!(config.id_field, "id");
        assert_eq!(config.parent_id_field, "parentId");
        assert_eq!(config.max_unpaginated_rows, 1000);
    }

    #[test]
    fn test_builders() {
        let config = VirtualCollectionConfig::default()
            .with_parent_id_field("orderId")
            .with_max_unpaginated_rows(10);
        assert_eq!(config.parent_id_field, "orderId");
        assert_eq!(config.max_unpaginated_rows, 10);
    }

    #[test]
    fn test_cosmos_config() {
        let config = CosmosCollectionConfig::new("orders", "/tenantId");
        assert_eq!(config.primary_key, "id");
        assert_eq!(config.partition_key_path, "/tenantId");
    }
}
