//! # Inventory Repository
//!
//! Database operations for inventory entries and their detail lines.
//!
//! An entry is created whole with its details in one transaction and never
//! edited afterwards. One outbox item is appended for the entry and one per
//! detail line, so partially delivered entries replay line by line.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::numbers::DocNumberRepository;
use crate::repository::outbox::OutboxRepository;
use vela_core::docnum::DocumentKind;
use vela_core::{
    CoreError, EntryType, InventoryEntry, InventoryEntryDetail, OutboxAction, OutboxEntityType,
    SyncStatus,
};

const SELECT_ENTRY: &str = r#"
    SELECT number, server_id, entry_type, sync_status, register_id,
           shift_number, notes, created_at
    FROM inventory_entries
"#;

const SELECT_DETAILS: &str = r#"
    SELECT id, entry_number, server_id, item_id, item_name, unit,
           quantity, unit_cost_cents, created_at
    FROM inventory_entry_details
"#;

/// One line of a new inventory entry.
#[derive(Debug, Clone)]
pub struct DetailInput {
    pub item_id: i64,
    pub item_name: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_cost_cents: Option<i64>,
}

/// Repository for inventory entry database operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Gets an entry by its business key.
    pub async fn get(&self, number: &str) -> DbResult<Option<InventoryEntry>> {
        let entry =
            sqlx::query_as::<_, InventoryEntry>(&format!("{SELECT_ENTRY} WHERE number = ?1"))
                .bind(number)
                .fetch_optional(&self.pool)
                .await?;

        Ok(entry)
    }

    /// Gets the detail lines of an entry.
    pub async fn get_details(&self, number: &str) -> DbResult<Vec<InventoryEntryDetail>> {
        let details = sqlx::query_as::<_, InventoryEntryDetail>(&format!(
            "{SELECT_DETAILS} WHERE entry_number = ?1 ORDER BY created_at"
        ))
        .bind(number)
        .fetch_all(&self.pool)
        .await?;

        Ok(details)
    }

    /// Lists entries recorded under a shift, newest first.
    pub async fn list_for_shift(&self, shift_number: &str) -> DbResult<Vec<InventoryEntry>> {
        let entries = sqlx::query_as::<_, InventoryEntry>(&format!(
            "{SELECT_ENTRY} WHERE shift_number = ?1 ORDER BY created_at DESC"
        ))
        .bind(shift_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Records an inventory entry with its detail lines.
    ///
    /// Single transaction: entry, details, one outbox item for the entry and
    /// one per detail.
    pub async fn create(
        &self,
        entry_type: EntryType,
        register_id: &str,
        register_code: &str,
        shift_number: Option<&str>,
        notes: Option<&str>,
        details: &[DetailInput],
    ) -> DbResult<InventoryEntry> {
        if details.is_empty() {
            return Err(DbError::Domain(CoreError::validation(
                "an inventory entry needs at least one line",
            )));
        }
        for d in details {
            if d.quantity <= 0.0 {
                return Err(DbError::Domain(CoreError::validation(format!(
                    "quantity for '{}' must be positive",
                    d.item_name
                ))));
            }
        }

        let now = Utc::now();
        let number = DocNumberRepository::new(self.pool.clone())
            .sequenced_number(register_id, register_code, DocumentKind::Inventory, now)
            .await?;

        debug!(number = %number, ?entry_type, lines = details.len(), "Recording inventory entry");

        let entry = InventoryEntry {
            number: number.clone(),
            server_id: None,
            entry_type,
            sync_status: SyncStatus::Pending,
            register_id: register_id.to_string(),
            shift_number: shift_number.map(str::to_string),
            notes: notes.map(str::to_string),
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO inventory_entries (
                number, server_id, entry_type, sync_status, register_id,
                shift_number, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.number)
        .bind(entry.server_id)
        .bind(entry.entry_type)
        .bind(entry.sync_status)
        .bind(&entry.register_id)
        .bind(&entry.shift_number)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        let payload = serde_json::to_string(&entry)?;
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::InventoryEntry,
            OutboxAction::Create,
            &entry.number,
            &payload,
        )
        .await?;

        for input in details {
            let detail = InventoryEntryDetail {
                id: Uuid::new_v4().to_string(),
                entry_number: entry.number.clone(),
                server_id: None,
                item_id: input.item_id,
                item_name: input.item_name.clone(),
                unit: input.unit.clone(),
                quantity: input.quantity,
                unit_cost_cents: input.unit_cost_cents,
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO inventory_entry_details (
                    id, entry_number, server_id, item_id, item_name, unit,
                    quantity, unit_cost_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&detail.id)
            .bind(&detail.entry_number)
            .bind(detail.server_id)
            .bind(detail.item_id)
            .bind(&detail.item_name)
            .bind(&detail.unit)
            .bind(detail.quantity)
            .bind(detail.unit_cost_cents)
            .bind(detail.created_at)
            .execute(&mut *tx)
            .await?;

            let payload = serde_json::to_string(&detail)?;
            OutboxRepository::enqueue(
                &mut tx,
                OutboxEntityType::InventoryEntryDetail,
                OutboxAction::Create,
                &detail.id,
                &payload,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(entry)
    }

    /// Backfills the server id on a delivered entry.
    pub async fn mark_synced(&self, number: &str, server_id: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE inventory_entries SET server_id = ?2, sync_status = 'synced' WHERE number = ?1",
        )
        .bind(number)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Backfills the server id on a delivered detail line.
    pub async fn mark_detail_synced(&self, id: &str, server_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE inventory_entry_details SET server_id = ?2 WHERE id = ?1")
            .bind(id)
            .bind(server_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
