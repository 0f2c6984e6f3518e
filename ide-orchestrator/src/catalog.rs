//! Template and spec catalog with a read-through, whole-catalog cache.
//!
//! The catalog is small and changes rarely, so the first lookup loads every
//! template and spec at once. Readers share an immutable snapshot; a refresh
//! builds a new snapshot and swaps it in.

use crate::cluster::ResourceLimits;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

/// Container image plus default environment for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub kind: String,
    pub image: String,
    /// Provider credentials are injected into the container environment.
    pub inject_env: bool,
    /// Reserved for VIP callers when the premium restriction is enabled.
    pub premium: bool,
    pub enabled: bool,
}

/// Hardware resource limits for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Spec {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub cpu_spec: String,
    pub mem_spec: String,
    pub storage_spec: String,
}

impl Spec {
    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu: self.cpu_spec.clone(),
            memory: self.mem_spec.clone(),
            storage: self.storage_spec.clone(),
        }
    }
}

/// Backing lookup used on a cache miss.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load_all_templates(&self) -> Result<Vec<Template>>;
    async fn load_all_specs(&self) -> Result<Vec<Spec>>;
}

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogSource for SqliteCatalog {
    #[instrument(skip(self))]
    async fn load_all_templates(&self) -> Result<Vec<Template>> {
        let templates = sqlx::query_as::<_, Template>(
            "SELECT id, name, description, avatar, kind, image, inject_env, premium, enabled
             FROM space_templates WHERE enabled = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }

    #[instrument(skip(self))]
    async fn load_all_specs(&self) -> Result<Vec<Spec>> {
        let specs = sqlx::query_as::<_, Spec>(
            "SELECT id, name, description, cpu_spec, mem_spec, storage_spec
             FROM space_specs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(specs)
    }
}

/// One consistent view of the catalog.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    templates: BTreeMap<i64, Template>,
    specs: BTreeMap<i64, Spec>,
}

impl CatalogSnapshot {
    pub fn template(&self, id: i64) -> Option<&Template> {
        self.templates.get(&id)
    }

    pub fn spec(&self, id: i64) -> Option<&Spec> {
        self.specs.get(&id)
    }

    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn specs(&self) -> impl Iterator<Item = &Spec> {
        self.specs.values()
    }
}

pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    snapshot: RwLock<Option<Arc<CatalogSnapshot>>>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
        }
    }

    /// Current snapshot, loading the whole catalog on first use.
    pub async fn snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        debug!("Catalog not cached, loading from source");
        let loaded = Arc::new(self.load().await?);

        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent loader may have won; keep whichever landed first.
        let snapshot = guard.get_or_insert_with(|| loaded).clone();
        Ok(snapshot)
    }

    /// `Ok(None)` means the id is not in the catalog, which callers treat as bad input.
    pub async fn get_template(&self, id: i64) -> Result<Option<Template>> {
        Ok(self.snapshot().await?.template(id).cloned())
    }

    pub async fn get_spec(&self, id: i64) -> Result<Option<Spec>> {
        Ok(self.snapshot().await?.spec(id).cloned())
    }

    pub async fn templates(&self) -> Result<Vec<Template>> {
        Ok(self.snapshot().await?.templates().cloned().collect())
    }

    pub async fn specs(&self) -> Result<Vec<Spec>> {
        Ok(self.snapshot().await?.specs().cloned().collect())
    }

    /// Reload the catalog and atomically replace the snapshot.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let loaded = Arc::new(self.load().await?);
        info!(
            templates = loaded.templates.len(),
            specs = loaded.specs.len(),
            "Catalog refreshed"
        );

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded);
        Ok(())
    }

    fn current(&self) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn load(&self) -> Result<CatalogSnapshot> {
        let templates = self.source.load_all_templates().await?;
        let specs = self.source.load_all_specs().await?;

        Ok(CatalogSnapshot {
            templates: templates.into_iter().map(|t| (t.id, t)).collect(),
            specs: specs.into_iter().map(|s| (s.id, s)).collect(),
        })
    }
}
