//! # Sync Watermark Repository
//!
//! Tracks, per pullable entity type, the timestamp up to which the terminal
//! has already pulled server changes.
//!
//! ## Fallback
//! A terminal that has never pulled a type uses its registration timestamp
//! (the `registered_at` setting) as the starting watermark, so the first
//! pull fetches everything created since the terminal joined the store.
//!
//! Watermarks advance even when a pull returns zero records; otherwise a
//! quiet entity type would be re-scanned from the registration timestamp
//! forever.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use vela_core::EntityType;

/// Settings key holding the terminal registration timestamp.
const REGISTERED_AT_KEY: &str = "registered_at";

/// Repository for incremental pull watermarks.
#[derive(Debug, Clone)]
pub struct WatermarkRepository {
    pool: SqlitePool,
}

impl WatermarkRepository {
    /// Creates a new WatermarkRepository.
    pub fn new(pool: SqlitePool) -> Self {
        WatermarkRepository { pool }
    }

    /// Returns the `since` timestamp to pull an entity type from.
    ///
    /// `store_id` 0 means the type is not store-scoped.
    pub async fn since_for(
        &self,
        entity_type: EntityType,
        store_id: i64,
    ) -> DbResult<DateTime<Utc>> {
        let stored: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT last_pulled_at FROM sync_watermarks WHERE entity_type = ?1 AND store_id = ?2",
        )
        .bind(entity_type.as_str())
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        match stored {
            Some(ts) => Ok(ts),
            None => self.registered_at().await,
        }
    }

    /// Advances the watermark for an entity type.
    pub async fn advance(
        &self,
        entity_type: EntityType,
        store_id: i64,
        pulled_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_watermarks (entity_type, store_id, last_pulled_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (entity_type, store_id)
            DO UPDATE SET last_pulled_at = excluded.last_pulled_at
            "#,
        )
        .bind(entity_type.as_str())
        .bind(store_id)
        .bind(pulled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads the terminal registration timestamp from settings.
    async fn registered_at(&self) -> DbResult<DateTime<Utc>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(REGISTERED_AT_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let raw = value.ok_or_else(|| DbError::not_found("Setting", REGISTERED_AT_KEY))?;
        let ts = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| DbError::BadJson(format!("registered_at: {e}")))?;
        Ok(ts.with_timezone(&Utc))
    }

    /// Records the terminal registration timestamp.
    pub async fn set_registered_at(&self, ts: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(REGISTERED_AT_KEY)
        .bind(ts.to_rfc3339())
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

    #[tokio::test]
    async fn test_fallback_to_registration_then_advance() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let watermarks = db.watermarks();

        let registered = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();
        watermarks.set_registered_at(registered).await.unwrap();

        // Never pulled: falls back to registration
        let since = watermarks.since_for(EntityType::Products, 0).await.unwrap();
        assert_eq!(since, registered);

        // Advance sticks, and is independent per entity type
        let pulled = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        watermarks
            .advance(EntityType::Products, 0, pulled)
            .await
            .unwrap();

        let since = watermarks.since_for(EntityType::Products, 0).await.unwrap();
        assert_eq!(since, pulled);

        let other = watermarks.since_for(EntityType::Recipes, 0).await.unwrap();
        assert_eq!(other, registered);
    }

    #[tokio::test]
    async fn test_missing_registration_is_an_error() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .watermarks()
            .since_for(EntityType::Products, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::DbError::NotFound { .. }));
    }
}
