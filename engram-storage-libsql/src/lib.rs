#![allow(clippy::missing_errors_doc)]

//! # Engram Storage - libSQL
//!
//! Durable [`MetadataStore`] backend over libSQL/SQLite for the Engram
//! memory engine.
//!
//! This crate provides:
//! - Schema creation with the project-id check constraint and the unique
//!   `(project_id, chunk_id)` key
//! - Connection management through the core semaphore pool
//! - CRUD for chunks (with two-step write states), sessions, projects,
//!   patterns, conflicts, and audit events
//!
//! ## Example
//!
//! ```no_run
//! use engram_storage_libsql::LibsqlMetadataStore;
//!
//! # async fn example() -> engram_core::Result<()> {
//! let store = LibsqlMetadataStore::open("engram.db", Default::default()).await?;
//! store.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

mod schema;
mod store;

use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use engram_core::error::{Error, Result};
use engram_core::reliability::{ConnectionPool, PooledConnection};

/// Configuration for the libSQL backend.
#[derive(Debug, Clone)]
pub struct LibsqlConfig {
    /// Maximum concurrent connections
    pub pool_size: usize,
    /// Pool acquire deadline
    pub acquire_timeout: Duration,
}

impl Default for LibsqlConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// libSQL-backed metadata store.
pub struct LibsqlMetadataStore {
    db: Arc<Database>,
    pool: ConnectionPool<Connection>,
}

impl LibsqlMetadataStore {
    /// Open (or create) a local database file.
    pub async fn open(path: &str, config: LibsqlConfig) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("failed to open database: {e}")))?;
        info!(path, "opened libsql metadata store");
        Ok(Self::from_database(db, config))
    }

    /// Wrap an already-built database.
    #[must_use]
    pub fn from_database(db: Database, config: LibsqlConfig) -> Self {
        let db = Arc::new(db);
        let factory_db = Arc::clone(&db);
        let pool = ConnectionPool::new(
            "metadata",
            config.pool_size,
            config.acquire_timeout,
            move || {
                factory_db
                    .connect()
                    .map_err(|e| Error::Storage(format!("failed to connect: {e}")))
            },
        );
        Self { db, pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection().await?;
        for statement in schema::ALL_STATEMENTS {
            conn.get()
                .execute(statement, ())
                .await
                .map_err(|e| Error::Storage(format!("schema creation failed: {e}")))?;
        }
        info!("libsql schema initialized");
        Ok(())
    }

    pub(crate) async fn connection(&self) -> Result<PooledConnection<Connection>> {
        self.pool.acquire().await
    }

    /// The underlying database handle.
    #[must_use]
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }
}
