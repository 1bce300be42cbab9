//! Versioned collection of schema registries.

use crate::error::{InventoryError, Result};
use crate::schema::registry::SchemaRegistry;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// All loaded schema versions, oldest first.
///
/// Built once at startup and shared read-only through `Arc` for the process
/// lifetime; nothing mutates a catalog after construction.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    versions: Vec<Arc<SchemaRegistry>>,
}

impl SchemaCatalog {
    /// Build a catalog from registries ordered oldest to newest
    pub fn new(registries: Vec<SchemaRegistry>) -> Result<Self> {
        let mut catalog = Self::default();
        for registry in registries {
            catalog.push(registry)?;
        }
        Ok(catalog)
    }

    /// Build a catalog from JSON schema documents ordered oldest to newest
    pub fn from_json_documents<'a>(docs: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let registries = docs
            .into_iter()
            .map(SchemaRegistry::from_json)
            .collect::<Result<Vec<_>>>()?;
        Self::new(registries)
    }

    /// Load schema documents from files, in the given order
    pub async fn load_from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut registries = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            debug!("Loading schema document from {}", path.display());
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                InventoryError::config(format!(
                    "Failed to read schema file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            registries.push(SchemaRegistry::from_json(&content)?);
        }
        let catalog = Self::new(registries)?;
        info!("Schema catalog ready with versions {:?}", catalog.versions());
        Ok(catalog)
    }

    fn push(&mut self, registry: SchemaRegistry) -> Result<()> {
        if self.get(registry.version()).is_some() {
            return Err(InventoryError::schema(format!(
                "schema version {} loaded twice",
                registry.version()
            )));
        }
        self.versions.push(Arc::new(registry));
        Ok(())
    }

    /// Newest loaded version
    pub fn latest(&self) -> Result<Arc<SchemaRegistry>> {
        self.versions
            .last()
            .cloned()
            .ok_or_else(|| InventoryError::schema("no schema versions loaded"))
    }

    pub fn get(&self, version: &str) -> Option<Arc<SchemaRegistry>> {
        self.versions.iter().find(|r| r.version() == version).cloned()
    }

    /// A specific version, or a schema error naming it
    pub fn version(&self, version: &str) -> Result<Arc<SchemaRegistry>> {
        self.get(version)
            .ok_or_else(|| InventoryError::schema(format!("unknown schema version '{}'", version)))
    }

    pub fn versions(&self) -> Vec<&str> {
        self.versions.iter().map(|r| r.version()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;

    #[test]
    fn test_latest_is_last_loaded() {
        let catalog = fixtures::catalog();
        assert_eq!(catalog.versions(), vec!["v1", "v2"]);
        assert_eq!(catalog.latest().unwrap().version(), "v2");
        assert!(catalog.get("v1").is_some());
        assert!(catalog.version("v9").is_err());
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let result = SchemaCatalog::from_json_documents([fixtures::V1_JSON, fixtures::V1_JSON]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_catalog_has_no_latest() {
        assert!(SchemaCatalog::default().latest().is_err());
    }

    #[tokio::test]
    async fn test_load_from_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("v1.json");
        tokio::fs::write(&path, fixtures::V1_JSON).await.unwrap();

        let catalog = SchemaCatalog::load_from_paths(&[path]).await.unwrap();
        assert_eq!(catalog.versions(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_config_error() {
        let err = SchemaCatalog::load_from_paths(&["/definitely/not/here.json"])
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Config(_)));
    }
}
