//! # Dining Table Repository
//!
//! Tables are the one entity the terminal both pulls from the server and
//! edits locally. Local edits queue outbox items like every other entity;
//! a locally created table that has never been delivered can be deleted
//! outright, a delivered one cannot.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox::OutboxRepository;
use vela_core::{CoreError, DiningTable, OutboxAction, OutboxEntityType, SyncStatus};

const SELECT_TABLE: &str = r#"
    SELECT number, server_id, name, capacity, sync_status, created_at, updated_at
    FROM dining_tables
"#;

/// Repository for dining table database operations.
#[derive(Debug, Clone)]
pub struct TableRepository {
    pool: SqlitePool,
}

impl TableRepository {
    /// Creates a new TableRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TableRepository { pool }
    }

    /// Gets a table by its business key.
    pub async fn get(&self, number: &str) -> DbResult<Option<DiningTable>> {
        let table = sqlx::query_as::<_, DiningTable>(&format!("{SELECT_TABLE} WHERE number = ?1"))
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(table)
    }

    /// Lists all tables by name.
    pub async fn list(&self) -> DbResult<Vec<DiningTable>> {
        let tables = sqlx::query_as::<_, DiningTable>(&format!("{SELECT_TABLE} ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;

        Ok(tables)
    }

    /// Creates a table locally and queues it for delivery.
    pub async fn create(&self, name: &str, capacity: i64) -> DbResult<DiningTable> {
        let now = Utc::now();
        let table = DiningTable {
            number: Uuid::new_v4().to_string(),
            server_id: None,
            name: name.to_string(),
            capacity,
            sync_status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        debug!(number = %table.number, name = %name, "Creating table");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO dining_tables (number, server_id, name, capacity, sync_status,
                                       created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&table.number)
        .bind(table.server_id)
        .bind(&table.name)
        .bind(table.capacity)
        .bind(table.sync_status)
        .bind(table.created_at)
        .bind(table.updated_at)
        .execute(&mut *tx)
        .await?;

        let payload = serde_json::to_string(&table)?;
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Table,
            OutboxAction::Create,
            &table.number,
            &payload,
        )
        .await?;

        tx.commit().await?;
        Ok(table)
    }

    /// Updates a table. A previously synced row flips back to `pending` and
    /// queues an outbox `update`.
    pub async fn update(&self, number: &str, name: &str, capacity: i64) -> DbResult<DiningTable> {
        let mut table = self
            .get(number)
            .await?
            .ok_or_else(|| DbError::not_found("DiningTable", number))?;

        table.name = name.to_string();
        table.capacity = capacity;
        table.sync_status = SyncStatus::Pending;
        table.updated_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE dining_tables SET name = ?2, capacity = ?3, sync_status = 'pending',
                                     updated_at = ?4
            WHERE number = ?1
            "#,
        )
        .bind(number)
        .bind(&table.name)
        .bind(table.capacity)
        .bind(table.updated_at)
        .execute(&mut *tx)
        .await?;

        let payload = serde_json::to_string(&table)?;
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Table,
            OutboxAction::Update,
            number,
            &payload,
        )
        .await?;

        tx.commit().await?;
        Ok(table)
    }

    /// Deletes a table that has never been delivered to the server.
    pub async fn delete_unsynced(&self, number: &str) -> DbResult<()> {
        let result =
            sqlx::query("DELETE FROM dining_tables WHERE number = ?1 AND server_id IS NULL")
                .bind(number)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Domain(CoreError::validation(
                "only locally created, undelivered tables can be deleted",
            )));
        }

        Ok(())
    }

    /// Applies a server-side table record during an incremental pull.
    ///
    /// Matches by server id. Rows with a pending local edit are left alone so
    /// a pull never clobbers a change still waiting in the outbox; the
    /// server's version lands on the next pull after delivery.
    pub async fn apply_server_record(
        &self,
        server_id: i64,
        name: &str,
        capacity: i64,
    ) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE dining_tables SET name = ?2, capacity = ?3, updated_at = ?4
            WHERE server_id = ?1 AND sync_status = 'synced'
            "#,
        )
        .bind(server_id)
        .bind(name)
        .bind(capacity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let known: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM dining_tables WHERE server_id = ?1)")
                .bind(server_id)
                .fetch_one(&self.pool)
                .await?;
        if known {
            // Pending local edit wins for now
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO dining_tables (number, server_id, name, capacity, sync_status,
                                       created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 'synced', ?5, ?5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(server_id)
        .bind(name)
        .bind(capacity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Backfills the server id after confirmed delivery.
    pub async fn mark_synced(&self, number: &str, server_id: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE dining_tables SET server_id = ?2, sync_status = 'synced' WHERE number = ?1",
        )
        .bind(number)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_update_queue_outbox() {
        let db = test_db().await;
        let tables = db.tables();

        let table = tables.create("Patio 1", 4).await.unwrap();
        tables.mark_synced(&table.number, 7).await.unwrap();

        let updated = tables.update(&table.number, "Patio 1", 6).await.unwrap();
        assert_eq!(updated.sync_status, SyncStatus::Pending);
        assert_eq!(updated.capacity, 6);

        let items = db.outbox().list_pending(10).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].action, OutboxAction::Update);
    }

    #[tokio::test]
    async fn test_delete_only_unsynced() {
        let db = test_db().await;
        let tables = db.tables();

        let local = tables.create("Window", 2).await.unwrap();
        tables.delete_unsynced(&local.number).await.unwrap();

        let delivered = tables.create("Bar", 8).await.unwrap();
        tables.mark_synced(&delivered.number, 9).await.unwrap();
        assert!(tables.delete_unsynced(&delivered.number).await.is_err());
    }

    #[tokio::test]
    async fn test_server_record_respects_pending_edits() {
        let db = test_db().await;
        let tables = db.tables();

        // Unknown server id inserts a synced row with a fresh business key
        tables.apply_server_record(41, "Terrace", 4).await.unwrap();
        let list = tables.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].server_id, Some(41));
        assert_eq!(list[0].sync_status, SyncStatus::Synced);

        // A synced row takes the server's version
        tables.apply_server_record(41, "Terrace", 6).await.unwrap();
        assert_eq!(tables.list().await.unwrap()[0].capacity, 6);

        // A pending edit is not clobbered
        let number = list[0].number.clone();
        tables.update(&number, "Terrace A", 6).await.unwrap();
        tables.apply_server_record(41, "Terrace", 8).await.unwrap();
        let row = tables.get(&number).await.unwrap().unwrap();
        assert_eq!(row.name, "Terrace A");
        assert_eq!(row.capacity, 6);
    }
}
