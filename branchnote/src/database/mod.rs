//! Local durable cache
//!
//! This module provides the on-device store that survives restarts and
//! offline periods:
//! - `LocalCache`, the get-all/put/delete contract the engine writes through
//! - Schema and migrations
//! - Model definitions
//! - `Repository`, the SQLite implementation

pub mod models;
pub mod repository;
pub mod schema;

pub use models::*;
pub use repository::Repository;
pub use schema::initialize_database;

use crate::error::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Key-value persistence of entities, keyed by `id`.
///
/// Identity remaps go through `replace`, which also repoints children of
/// the old id.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Every cached entity
    async fn get_all(&self) -> Result<Vec<Entity>>;

    /// Upsert by `id`
    async fn put(&self, entity: &Entity) -> Result<()>;

    /// Remove one record; missing ids are ignored
    async fn delete(&self, id: &str) -> Result<()>;

    /// Store `entity` under its new id, repoint every record whose
    /// `parent_id` is `old_id`, then remove `old_id`.
    ///
    /// Implementations backed by a transactional store apply all three
    /// steps at once. This fallback orders them so a failure part way
    /// leaves the old record in place for a retry.
    async fn replace(&self, old_id: &str, entity: &Entity) -> Result<()> {
        self.put(entity).await?;
        if old_id == entity.id {
            return Ok(());
        }
        for mut child in self.get_all().await? {
            if child.parent_id.as_deref() == Some(old_id) {
                child.parent_id = Some(entity.id.clone());
                self.put(&child).await?;
            }
        }
        self.delete(old_id).await
    }

    async fn pending_deletes(&self) -> Result<Vec<PendingDelete>>;

    async fn add_pending_delete(&self, pending: &PendingDelete) -> Result<()>;

    async fn clear_pending_delete(&self, id: &str) -> Result<()>;
}

/// Build connection options shared by migration and application connections.
fn connect_options(db_path: &Path) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display())).map(
        |opts| {
            opts.create_if_missing(true)
                .busy_timeout(Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal)
        },
    )
}

/// Create and initialize the cache connection pool.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is opened, so every pooled connection sees
/// the final schema.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::info!("Opening local cache at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path)?)
        .await?;

    initialize_database(&migration_pool).await?;
    migration_pool.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(db_path)?)
        .await?;

    tracing::info!("Local cache ready");

    Ok(pool)
}

/// In-memory cache pool with the schema applied. Nothing survives the pool.
pub async fn create_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    initialize_database(&pool).await?;

    Ok(pool)
}
