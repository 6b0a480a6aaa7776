// External collaborator contracts
//
// Metadata and role sources feed the registry; executors and cache
// providers are driven by the query service. Implementations for real
// databases live outside this crate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{MetadataConfig, RoleDefinition, Row};

/// Source of schema and topology configuration
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn load(&self) -> Result<MetadataConfig>;
}

/// Source of role definitions
#[async_trait]
pub trait RoleProvider: Send + Sync {
    async fn load(&self) -> Result<Vec<RoleDefinition>>;
}

/// Runs generated SQL against one physical database
#[async_trait]
pub trait DbExecutor: Send + Sync {
    /// Execute a parameterized statement and return its rows
    ///
    /// # Arguments
    /// * `sql` - Statement text in the executor's dialect
    /// * `params` - Values bound to the placeholders, in placeholder order
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Liveness check
    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Key/value store holding pre-materialized rows
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Look up many keys at once; absent keys map to `None`
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Option<Row>>>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Reads a JSON `MetadataConfig` document from disk on every load
pub struct FileMetadataProvider {
    path: PathBuf,
}

impl FileMetadataProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MetadataProvider for FileMetadataProvider {
    async fn load(&self) -> Result<MetadataConfig> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read metadata file {}", self.path.display()))?;
        let config: MetadataConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid metadata file {}", self.path.display()))?;

        tracing::debug!(
            "Loaded metadata from {}: {} databases, {} tables",
            self.path.display(),
            config.databases.len(),
            config.tables.len()
        );
        Ok(config)
    }
}

/// Reads a JSON array of role definitions from disk on every load
pub struct FileRoleProvider {
    path: PathBuf,
}

impl FileRoleProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RoleProvider for FileRoleProvider {
    async fn load(&self) -> Result<Vec<RoleDefinition>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read roles file {}", self.path.display()))?;
        let roles: Vec<RoleDefinition> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid roles file {}", self.path.display()))?;

        tracing::debug!("Loaded {} roles from {}", roles.len(), self.path.display());
        Ok(roles)
    }
}

/// Fixed in-memory metadata, mostly for embedding and tests
pub struct StaticMetadataProvider {
    config: MetadataConfig,
}

impl StaticMetadataProvider {
    pub fn new(config: MetadataConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn load(&self) -> Result<MetadataConfig> {
        Ok(self.config.clone())
    }
}

pub struct StaticRoleProvider {
    roles: Vec<RoleDefinition>,
}

impl StaticRoleProvider {
    pub fn new(roles: Vec<RoleDefinition>) -> Self {
        Self { roles }
    }
}

#[async_trait]
impl RoleProvider for StaticRoleProvider {
    async fn load(&self) -> Result<Vec<RoleDefinition>> {
        Ok(self.roles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_file_metadata_provider() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "databases": [{{ "id": "pg-main", "engine": "postgres" }}],
                "tables": []
            }}"#
        )
        .unwrap();

        let config = FileMetadataProvider::new(file.path()).load().await.unwrap();
        assert_eq!(config.databases.len(), 1);
        assert!(!config.trino.enabled);
    }

    #[tokio::test]
    async fn test_file_role_provider() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{ "id": "admin", "tables": "*" }}]"#).unwrap();

        let roles = FileRoleProvider::new(file.path()).load().await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, "admin");
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let err = FileRoleProvider::new("/nonexistent/roles.json")
            .load()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/roles.json"));
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(FileMetadataProvider::new(file.path()).load().await.is_err());
    }
}
