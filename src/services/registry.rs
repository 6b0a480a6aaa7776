// Metadata registry
//
// Schema, topology and roles are loaded into an immutable snapshot. Reloads
// build a fresh snapshot and swap the pointer; readers keep whichever
// snapshot they already hold.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{
    CachedTableMeta, CrossDbSync, DatabaseMeta, MetadataConfig, RoleDefinition, TableSchema,
};
use crate::services::providers::{MetadataProvider, RoleProvider};

/// A cache that can serve a table
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub cache_id: String,
    pub table: CachedTableMeta,
}

/// Indexed, read-only view of one configuration generation
#[derive(Debug)]
pub struct RegistrySnapshot {
    config: MetadataConfig,
    tables_by_id: HashMap<String, usize>,
    tables_by_api_name: HashMap<String, usize>,
    databases_by_id: HashMap<String, usize>,
    syncs_by_table: HashMap<String, Vec<CrossDbSync>>,
    caches_by_table: HashMap<String, CacheEntry>,
    roles_by_id: HashMap<String, RoleDefinition>,
}

impl RegistrySnapshot {
    pub fn new(config: MetadataConfig, roles: Vec<RoleDefinition>) -> Self {
        let tables_by_id = config
            .tables
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.id.clone(), idx))
            .collect();
        let tables_by_api_name = config
            .tables
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.api_name.clone(), idx))
            .collect();
        let databases_by_id = config
            .databases
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.id.clone(), idx))
            .collect();

        let mut syncs_by_table: HashMap<String, Vec<CrossDbSync>> = HashMap::new();
        for sync in &config.external_syncs {
            syncs_by_table
                .entry(sync.source_table.clone())
                .or_default()
                .push(sync.clone());
        }

        // First cache listing a table wins
        let mut caches_by_table = HashMap::new();
        for cache in &config.caches {
            for table in &cache.tables {
                caches_by_table
                    .entry(table.table_id.clone())
                    .or_insert_with(|| CacheEntry {
                        cache_id: cache.id.clone(),
                        table: table.clone(),
                    });
            }
        }

        let roles_by_id = roles.into_iter().map(|r| (r.id.clone(), r)).collect();

        Self {
            config,
            tables_by_id,
            tables_by_api_name,
            databases_by_id,
            syncs_by_table,
            caches_by_table,
            roles_by_id,
        }
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    pub fn table(&self, id: &str) -> Option<&TableSchema> {
        self.tables_by_id.get(id).map(|&idx| &self.config.tables[idx])
    }

    pub fn table_by_api_name(&self, api_name: &str) -> Option<&TableSchema> {
        self.tables_by_api_name
            .get(api_name)
            .map(|&idx| &self.config.tables[idx])
    }

    pub fn database(&self, id: &str) -> Option<&DatabaseMeta> {
        self.databases_by_id
            .get(id)
            .map(|&idx| &self.config.databases[idx])
    }

    /// All databases in configuration order
    pub fn databases(&self) -> &[DatabaseMeta] {
        &self.config.databases
    }

    pub fn syncs_for(&self, table_id: &str) -> &[CrossDbSync] {
        self.syncs_by_table
            .get(table_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn cache_for(&self, table_id: &str) -> Option<&CacheEntry> {
        self.caches_by_table.get(table_id)
    }

    pub fn roles(&self) -> &HashMap<String, RoleDefinition> {
        &self.roles_by_id
    }

    pub fn trino_enabled(&self) -> bool {
        self.config.trino.enabled
    }
}

/// Holds the current snapshot and reloads it from the providers
pub struct Registry {
    metadata: Arc<dyn MetadataProvider>,
    roles: Arc<dyn RoleProvider>,
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Registry {
    /// Load the initial snapshot from both providers
    pub async fn load(
        metadata: Arc<dyn MetadataProvider>,
        roles: Arc<dyn RoleProvider>,
    ) -> Result<Self> {
        let snapshot = Self::build(metadata.as_ref(), roles.as_ref()).await?;
        Ok(Self {
            metadata,
            roles,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Snapshot to use for the whole of one request
    pub async fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().await.clone()
    }

    /// Rebuild from the providers and swap atomically
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn reload(&self) -> Result<()> {
        let snapshot = Self::build(self.metadata.as_ref(), self.roles.as_ref()).await?;
        let tables = snapshot.config.tables.len();
        let roles = snapshot.roles_by_id.len();

        *self.current.write().await = Arc::new(snapshot);
        tracing::info!("Registry reloaded: {} tables, {} roles", tables, roles);
        Ok(())
    }

    async fn build(
        metadata: &dyn MetadataProvider,
        roles: &dyn RoleProvider,
    ) -> Result<RegistrySnapshot> {
        let (config, roles) = tokio::try_join!(metadata.load(), roles.load())?;
        Ok(RegistrySnapshot::new(config, roles))
    }
}
