//! Schema catalog.
//!
//! Holds the current [`Schema`] snapshot. Readers get an `Arc` to a complete
//! snapshot; a refresh swaps in a new one wholesale, so a reader never sees
//! half of an old schema and half of a new one.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::db::{DatabaseClient, Schema};
use crate::error::{Result, WardenError};

/// Caches the database schema and refreshes it on demand.
pub struct SchemaCatalog {
    db: Arc<dyn DatabaseClient>,
    snapshot: RwLock<Arc<Schema>>,
}

impl SchemaCatalog {
    /// Creates a catalog with an empty snapshot.
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self {
            db,
            snapshot: RwLock::new(Arc::new(Schema::default())),
        }
    }

    /// Creates a catalog and loads the first snapshot.
    pub async fn load(db: Arc<dyn DatabaseClient>) -> Result<Self> {
        let catalog = Self::new(db);
        catalog.refresh().await?;
        Ok(catalog)
    }

    /// The current snapshot.
    pub fn current_snapshot(&self) -> Arc<Schema> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Re-introspects the database and replaces the snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<Arc<Schema>> {
        let schema = self.db.introspect_schema().await.map_err(|e| match e {
            WardenError::Catalog(_) => e,
            other => WardenError::catalog(other.to_string()),
        })?;
        debug!(tables = schema.tables.len(), "Schema introspected");

        let schema = Arc::new(schema);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&schema);
        info!("Schema catalog refreshed");
        Ok(schema)
    }

    /// Looks up one table in the current snapshot.
    pub fn table(&self, name: &str) -> Result<crate::db::Table> {
        self.current_snapshot()
            .table(name)
            .cloned()
            .ok_or_else(|| WardenError::catalog(format!("Table '{name}' not found")))
    }
}

impl std::fmt::Debug for SchemaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCatalog")
            .field("tables", &self.current_snapshot().tables.len())
            .finish()
    }
}
