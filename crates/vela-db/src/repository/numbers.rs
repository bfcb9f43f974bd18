//! # Document Number Repository
//!
//! Prefix lookup and atomic per-day sequences behind offline document
//! numbers.
//!
//! ## Two Number Shapes
//! - Orders/payments encode a second-precision timestamp and take no
//!   sequence; this module only resolves their prefix.
//! - Shifts/inventory entries take a per-(register, kind, day) counter,
//!   incremented atomically with `INSERT .. ON CONFLICT .. RETURNING`.
//!
//! Past-day counter rows carry no information once the day rolls over; a
//! cleanup pass deletes them, gated by a marker in `settings` so it runs at
//! most once per day.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use vela_core::docnum::{self, DocumentKind};

/// Settings key holding the day the last sequence cleanup ran.
const CLEANUP_MARKER_KEY: &str = "sequence_cleanup_day";

/// Repository for document prefixes and sequences.
#[derive(Debug, Clone)]
pub struct DocNumberRepository {
    pool: SqlitePool,
}

impl DocNumberRepository {
    /// Creates a new DocNumberRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocNumberRepository { pool }
    }

    /// Resolves the document prefix for a kind.
    ///
    /// Falls back to the hardcoded prefix when no synced configuration row
    /// exists yet (bootstrap, or the config pull has not run).
    pub async fn prefix_for(&self, kind: DocumentKind) -> DbResult<String> {
        let prefix: Option<String> =
            sqlx::query_scalar("SELECT prefix FROM doc_prefixes WHERE kind = ?1 LIMIT 1")
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(prefix.unwrap_or_else(|| kind.fallback_prefix().to_string()))
    }

    /// Atomically increments and returns the (register, kind, day) counter.
    ///
    /// First call on a fresh day returns 1. Single statement, so concurrent
    /// tasks on the same pool never observe the same value.
    pub async fn next_sequence(
        &self,
        register_id: &str,
        kind: DocumentKind,
        ts: DateTime<Utc>,
    ) -> DbResult<u64> {
        self.cleanup_past_days(ts).await?;

        let day = docnum::day_key(ts) as i64;

        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO doc_sequences (register_id, kind, day, value)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT (register_id, kind, day)
            DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(register_id)
        .bind(kind.as_str())
        .bind(day)
        .fetch_one(&self.pool)
        .await?;

        Ok(value as u64)
    }

    /// Generates a complete sequenced number for a shift or inventory entry.
    pub async fn sequenced_number(
        &self,
        register_id: &str,
        register_code: &str,
        kind: DocumentKind,
        ts: DateTime<Utc>,
    ) -> DbResult<String> {
        let prefix = self.prefix_for(kind).await?;
        let sequence = self.next_sequence(register_id, kind, ts).await?;
        Ok(docnum::sequenced_number(&prefix, register_code, ts, sequence))
    }

    /// Generates an order/payment number (no sequence).
    pub async fn order_number(
        &self,
        register_code: &str,
        kind: DocumentKind,
        ts: DateTime<Utc>,
    ) -> DbResult<String> {
        let prefix = self.prefix_for(kind).await?;
        Ok(docnum::order_number(&prefix, register_code, ts))
    }

    /// Deletes counter rows for past days, at most once per day.
    async fn cleanup_past_days(&self, ts: DateTime<Utc>) -> DbResult<()> {
        let today = docnum::day_key(ts) as i64;

        let marker: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
                .bind(CLEANUP_MARKER_KEY)
                .fetch_optional(&self.pool)
                .await?;

        if marker.as_deref() == Some(today.to_string().as_str()) {
            return Ok(());
        }

        let result = sqlx::query("DELETE FROM doc_sequences WHERE day < ?1")
            .bind(today)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            debug!(deleted = result.rows_affected(), "Pruned past-day sequences");
        }

        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(CLEANUP_MARKER_KEY)
        .bind(today.to_string())
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
    use chrono::TimeZone;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_sequence_monotonic() {
        let db = test_db().await;
        let numbers = db.numbers();

        for expected in 1..=5u64 {
            let value = numbers
                .next_sequence("reg-1", DocumentKind::Shift, ts(30))
                .await
                .unwrap();
            assert_eq!(value, expected);
        }
    }

    #[tokio::test]
    async fn test_sequences_independent_per_kind_and_register() {
        let db = test_db().await;
        let numbers = db.numbers();

        numbers
            .next_sequence("reg-1", DocumentKind::Shift, ts(30))
            .await
            .unwrap();
        numbers
            .next_sequence("reg-1", DocumentKind::Shift, ts(30))
            .await
            .unwrap();

        // Different kind on the same register starts at 1
        let inv = numbers
            .next_sequence("reg-1", DocumentKind::Inventory, ts(30))
            .await
            .unwrap();
        assert_eq!(inv, 1);

        // Same kind on another register starts at 1
        let other = numbers
            .next_sequence("reg-2", DocumentKind::Shift, ts(30))
            .await
            .unwrap();
        assert_eq!(other, 1);
    }

    #[tokio::test]
    async fn test_day_rollover_resets_and_prunes() {
        let db = test_db().await;
        let numbers = db.numbers();

        numbers
            .next_sequence("reg-1", DocumentKind::Shift, ts(29))
            .await
            .unwrap();
        numbers
            .next_sequence("reg-1", DocumentKind::Shift, ts(29))
            .await
            .unwrap();

        // New day: counter restarts, yesterday's row is gone
        let value = numbers
            .next_sequence("reg-1", DocumentKind::Shift, ts(30))
            .await
            .unwrap();
        assert_eq!(value, 1);

        let stale: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM doc_sequences WHERE day < 20260830")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(stale, 0);
    }

    #[tokio::test]
    async fn test_prefix_fallback_and_override() {
        let db = test_db().await;
        let numbers = db.numbers();

        assert_eq!(numbers.prefix_for(DocumentKind::Invoice).await.unwrap(), "F");

        sqlx::query("INSERT INTO doc_prefixes (store_id, kind, prefix) VALUES (0, 'invoice', 'INV')")
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(
            numbers.prefix_for(DocumentKind::Invoice).await.unwrap(),
            "INV"
        );
    }

    #[tokio::test]
    async fn test_order_number_shape() {
        let db = test_db().await;
        let number = db
            .numbers()
            .order_number("SAA-AAA", DocumentKind::Invoice, ts(30))
            .await
            .unwrap();
        assert!(number.starts_with("FSAA-AAA-"));
    }
}
