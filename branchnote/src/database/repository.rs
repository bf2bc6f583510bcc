//! Repository layer for the local cache
//!
//! SQLite implementation of `LocalCache`. One row per entity keyed by id;
//! full scans are fine at client-side volume.

use super::models::*;
use super::LocalCache;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

/// Row shape of the `entities` table
#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    title: String,
    content: String,
    tags: String,
    entity_type: String,
    parent_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    reminder_date: Option<DateTime<Utc>>,
    notification_sent: bool,
    synced: bool,
}

impl TryFrom<EntityRow> for Entity {
    type Error = AppError;

    fn try_from(row: EntityRow) -> Result<Self> {
        let entity_type = row
            .entity_type
            .parse()
            .map_err(|_| AppError::Storage(format!("Corrupt entity type for {}", row.id)))?;
        let tags: Vec<String> = serde_json::from_str(&row.tags)
            .map_err(|e| AppError::Storage(format!("Corrupt tags for {}: {}", row.id, e)))?;

        Ok(Entity {
            id: row.id,
            title: row.title,
            content: row.content,
            tags,
            entity_type,
            parent_id: row.parent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            reminder_date: row.reminder_date,
            notification_sent: row.notification_sent,
            synced: row.synced,
        })
    }
}

#[derive(Debug, FromRow)]
struct PendingDeleteRow {
    id: String,
    entity_type: String,
}

const UPSERT_ENTITY: &str = r#"
    INSERT INTO entities
        (id, title, content, tags, entity_type, parent_id, created_at, updated_at,
         reminder_date, notification_sent, synced)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        content = excluded.content,
        tags = excluded.tags,
        entity_type = excluded.entity_type,
        parent_id = excluded.parent_id,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        reminder_date = excluded.reminder_date,
        notification_sent = excluded.notification_sent,
        synced = excluded.synced
"#;

/// Repository for local cache operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get one cached entity by id
    pub async fn get(&self, id: &str) -> Result<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>("SELECT * FROM entities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Entity::try_from).transpose()
    }

    /// Count entities still waiting to be pushed
    pub async fn count_unsynced(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Close the pool. Later calls fail with a storage error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn encode_tags(entity: &Entity) -> Result<String> {
        Ok(serde_json::to_string(&entity.tags)?)
    }
}

#[async_trait]
impl LocalCache for Repository {
    async fn get_all(&self) -> Result<Vec<Entity>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT * FROM entities
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Entity::try_from).collect()
    }

    async fn put(&self, entity: &Entity) -> Result<()> {
        let tags = Self::encode_tags(entity)?;

        sqlx::query(UPSERT_ENTITY)
            .bind(&entity.id)
            .bind(&entity.title)
            .bind(&entity.content)
            .bind(tags)
            .bind(entity.entity_type.as_str())
            .bind(&entity.parent_id)
            .bind(entity.created_at)
            .bind(entity.updated_at)
            .bind(entity.reminder_date)
            .bind(entity.notification_sent)
            .bind(entity.synced)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Cached {} {} (synced: {})", entity.entity_type, entity.id, entity.synced);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Removed cached entity: {}", id);
        Ok(())
    }

    async fn replace(&self, old_id: &str, entity: &Entity) -> Result<()> {
        let tags = Self::encode_tags(entity)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_ENTITY)
            .bind(&entity.id)
            .bind(&entity.title)
            .bind(&entity.content)
            .bind(tags)
            .bind(entity.entity_type.as_str())
            .bind(&entity.parent_id)
            .bind(entity.created_at)
            .bind(entity.updated_at)
            .bind(entity.reminder_date)
            .bind(entity.notification_sent)
            .bind(entity.synced)
            .execute(&mut *tx)
            .await?;

        let mut reparented = 0;
        if old_id != entity.id {
            reparented = sqlx::query("UPDATE entities SET parent_id = ? WHERE parent_id = ?")
                .bind(&entity.id)
                .bind(old_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            sqlx::query("DELETE FROM entities WHERE id = ?")
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Remapped cached entity {} -> {} ({} children)",
            old_id,
            entity.id,
            reparented
        );
        Ok(())
    }

    async fn pending_deletes(&self) -> Result<Vec<PendingDelete>> {
        let rows = sqlx::query_as::<_, PendingDeleteRow>(
            "SELECT id, entity_type FROM pending_deletes ORDER BY deleted_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let entity_type = row.entity_type.parse().map_err(|_| {
                    AppError::Storage(format!("Corrupt pending delete for {}", row.id))
                })?;
                Ok(PendingDelete {
                    id: row.id,
                    entity_type,
                })
            })
            .collect()
    }

    async fn add_pending_delete(&self, pending: &PendingDelete) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_deletes (id, entity_type, deleted_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&pending.id)
        .bind(pending.entity_type.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Queued remote delete for {}", pending.id);
        Ok(())
    }

    async fn clear_pending_delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_deletes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_memory_pool;

    async fn create_test_repo() -> Repository {
        Repository::new(create_memory_pool().await.unwrap())
    }

    fn sample(title: &str) -> Entity {
        let mut entity = Entity::draft(NewEntity::file(None).with_title(title), Utc::now());
        entity.tags = vec!["a".to_string(), "b".to_string()];
        entity
    }

    #[tokio::test]
    async fn test_put_and_get_all() {
        let repo = create_test_repo().await;
        let entity = sample("First");

        repo.put(&entity).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, entity.id);
        assert_eq!(all[0].tags, vec!["a", "b"]);
        assert!(!all[0].synced);
    }

    #[tokio::test]
    async fn test_put_upserts_by_id() {
        let repo = create_test_repo().await;
        let mut entity = sample("Original");
        repo.put(&entity).await.unwrap();

        entity.title = "Updated".to_string();
        entity.synced = true;
        repo.put(&entity).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Updated");
        assert!(all[0].synced);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let repo = create_test_repo().await;
        repo.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_moves_record_to_new_id() {
        let repo = create_test_repo().await;
        let entity = sample("Offline");
        repo.put(&entity).await.unwrap();

        let mut pushed = entity.clone();
        pushed.id = "srv-1".to_string();
        pushed.synced = true;
        repo.replace(&entity.id, &pushed).await.unwrap();

        assert!(repo.get(&entity.id).await.unwrap().is_none());
        let stored = repo.get("srv-1").await.unwrap().unwrap();
        assert_eq!(stored.title, "Offline");
        assert!(stored.synced);
    }

    #[tokio::test]
    async fn test_replace_repoints_children() {
        let repo = create_test_repo().await;
        let folder = Entity::draft(NewEntity::folder(None), Utc::now());
        repo.put(&folder).await.unwrap();
        let child = Entity::draft(NewEntity::file(Some(folder.id.clone())), Utc::now());
        repo.put(&child).await.unwrap();
        let other = sample("Elsewhere");
        repo.put(&other).await.unwrap();

        let mut pushed = folder.clone();
        pushed.id = "srv-folder".to_string();
        pushed.synced = true;
        repo.replace(&folder.id, &pushed).await.unwrap();

        let stored = repo.get(&child.id).await.unwrap().unwrap();
        assert_eq!(stored.parent_id.as_deref(), Some("srv-folder"));
        assert!(!stored.synced);
        assert_eq!(repo.get(&other.id).await.unwrap().unwrap().parent_id, None);
    }

    #[tokio::test]
    async fn test_pending_deletes() {
        let repo = create_test_repo().await;
        let pending = PendingDelete {
            id: "srv-9".to_string(),
            entity_type: EntityType::Folder,
        };

        repo.add_pending_delete(&pending).await.unwrap();
        repo.add_pending_delete(&pending).await.unwrap();
        assert_eq!(repo.pending_deletes().await.unwrap(), vec![pending]);

        repo.clear_pending_delete("srv-9").await.unwrap();
        assert!(repo.pending_deletes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_unsynced() {
        let repo = create_test_repo().await;
        let mut synced = sample("Synced");
        synced.synced = true;
        repo.put(&synced).await.unwrap();
        repo.put(&sample("Pending")).await.unwrap();

        assert_eq!(repo.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_reports_storage_error() {
        let repo = create_test_repo().await;
        repo.close().await;

        let result = repo.put(&sample("Lost")).await;
        assert!(matches!(result, Err(AppError::Storage(_))));
    }
}
