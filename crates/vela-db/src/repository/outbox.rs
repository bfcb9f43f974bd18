//! # Sync Outbox Repository
//!
//! The durable replay queue behind offline-first synchronization.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g., mark_paid)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE orders SET status = 'paid' WHERE number = ?         │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO sync_outbox (entity_type, action, data_id,     │   │
//! │  │     payload) VALUES ('order', 'create', ?, <order JSON>)       │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail (atomicity guaranteed)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BACKGROUND DRAIN (vela-sync)                                           │
//! │    • items replayed in queue_id order                                   │
//! │    • success: DELETE item, backfill server_id, flip entity to synced    │
//! │    • failure: retry_count += 1, item retained, drain continues          │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • The entity is never lost (it's in the local store)                  │
//! │  • The queue item is never orphaned (same transaction)                 │
//! │  • Offline? No problem - items queue up                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `enqueue` takes a `&mut SqliteConnection` so it can ride the caller's
//! open transaction; every other method operates on the pool.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use vela_core::{OutboxAction, OutboxEntityType, OutboxItem};

/// Repository for the sync outbox queue.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Appends an item inside the caller's transaction.
    ///
    /// ## Arguments
    /// * `conn` - The connection of the transaction carrying the entity write
    /// * `data_id` - The entity's business key
    /// * `payload` - JSON snapshot of the fields needed to replay
    pub async fn enqueue(
        conn: &mut SqliteConnection,
        entity_type: OutboxEntityType,
        action: OutboxAction,
        data_id: &str,
        payload: &str,
    ) -> DbResult<()> {
        let now = Utc::now();

        debug!(?entity_type, ?action, data_id = %data_id, "Queuing for sync");

        sqlx::query(
            r#"
            INSERT INTO sync_outbox (entity_type, action, data_id, payload, retry_count, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(entity_type)
        .bind(action)
        .bind(data_id)
        .bind(payload)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Lists pending items in queue order (oldest first).
    pub async fn list_pending(&self, limit: u32) -> DbResult<Vec<OutboxItem>> {
        let items = sqlx::query_as::<_, OutboxItem>(
            r#"
            SELECT queue_id, entity_type, action, data_id, payload, retry_count, created_at
            FROM sync_outbox
            ORDER BY queue_id ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Removes an item after confirmed delivery.
    pub async fn delete(&self, queue_id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_outbox WHERE queue_id = ?1")
            .bind(queue_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a delivery failure. The item stays queued; the drain moves on
    /// to the next item.
    pub async fn bump_retry(&self, queue_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE sync_outbox SET retry_count = retry_count + 1 WHERE queue_id = ?1")
            .bind(queue_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts items awaiting delivery.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_outbox")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
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
    async fn test_enqueue_and_drain_order() {
        let db = test_db().await;
        let outbox = db.outbox();

        let mut tx = db.pool().begin().await.unwrap();
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Order,
            OutboxAction::Create,
            "FAAA-AAA-B",
            "{}",
        )
        .await
        .unwrap();
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Shift,
            OutboxAction::Close,
            "SAAA-AAA-C",
            "{}",
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let items = outbox.list_pending(100).await.unwrap();
        assert_eq!(items.len(), 2);
        // queue_id order = enqueue order
        assert!(items[0].queue_id < items[1].queue_id);
        assert_eq!(items[0].data_id, "FAAA-AAA-B");

        outbox.delete(items[0].queue_id).await.unwrap();
        assert_eq!(outbox.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_rolls_back_with_transaction() {
        let db = test_db().await;

        let mut tx = db.pool().begin().await.unwrap();
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Table,
            OutboxAction::Update,
            "t-1",
            "{}",
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bump_retry() {
        let db = test_db().await;
        let outbox = db.outbox();

        let mut tx = db.pool().begin().await.unwrap();
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Order,
            OutboxAction::Create,
            "F-1",
            "{}",
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let item = &outbox.list_pending(1).await.unwrap()[0];
        outbox.bump_retry(item.queue_id).await.unwrap();
        outbox.bump_retry(item.queue_id).await.unwrap();

        let item = &outbox.list_pending(1).await.unwrap()[0];
        assert_eq!(item.retry_count, 2);
    }
}
