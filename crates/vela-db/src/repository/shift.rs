//! # Shift Repository
//!
//! Database operations for cash shifts and their running ledger.
//!
//! ## Shift Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Shift Lifecycle                                   │
//! │                                                                         │
//! │  1. OPEN (single transaction)                                           │
//! │     └── open() → Shift { status: Open }                                 │
//! │         + one summary row per tracked item (beginning balance)          │
//! │         + outbox 'create' item                                          │
//! │         + current-shift pointer in settings                             │
//! │                                                                         │
//! │  2. DURING THE SHIFT                                                    │
//! │     └── add_refill() → bounded slots on the ledger row                  │
//! │     └── (orders paid under the shift bump cash/bank totals and          │
//! │          material usage - see the order repository)                     │
//! │                                                                         │
//! │  3. CLOSE (single transaction)                                          │
//! │     └── close() → Shift { status: Closed }                              │
//! │         expected = initial + cash sales, difference = expected − final  │
//! │         per item: diff = beg + Σrefills − usage − end                   │
//! │         rows with no activity at all are pruned                         │
//! │         + outbox 'close' item, pointer cleared                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::numbers::DocNumberRepository;
use crate::repository::outbox::OutboxRepository;
use vela_core::docnum::DocumentKind;
use vela_core::validation::BalanceInput;
use vela_core::{
    summary, validation, Money, OutboxAction, OutboxEntityType, Shift, ShiftStatus,
    ShiftSummaryRow, SyncStatus,
};

/// Settings key pointing at the currently open shift.
const CURRENT_SHIFT_KEY: &str = "current_shift";

const SELECT_SHIFT: &str = r#"
    SELECT number, server_id, status, sync_status, register_id,
           initial_cash_cents, cash_total_cents, bank_total_cents,
           final_cash_cents, expected_cash_cents, cash_difference_cents,
           opened_at, closed_at
    FROM shifts
"#;

const SELECT_SUMMARY: &str = r#"
    SELECT id, shift_number, item_id, item_name, unit, is_material,
           beg_balance, refills_json, material_usage, end_balance, diff
    FROM shift_summary
"#;

/// An ending balance counted at close, one per tracked ledger row.
#[derive(Debug, Clone)]
pub struct EndingBalance {
    pub item_id: i64,
    pub unit: String,
    pub end_balance: f64,
}

/// Repository for shift database operations.
#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

impl ShiftRepository {
    /// Creates a new ShiftRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    /// Gets a shift by its business key.
    pub async fn get(&self, number: &str) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(&format!("{SELECT_SHIFT} WHERE number = ?1"))
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(shift)
    }

    /// Gets the ledger rows for a shift.
    pub async fn get_summary(&self, number: &str) -> DbResult<Vec<ShiftSummaryRow>> {
        let rows = sqlx::query_as::<_, ShiftSummaryRow>(&format!(
            "{SELECT_SUMMARY} WHERE shift_number = ?1 ORDER BY item_name"
        ))
        .bind(number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Returns the currently open shift, if any.
    pub async fn current_open(&self) -> DbResult<Option<Shift>> {
        let pointer: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
                .bind(CURRENT_SHIFT_KEY)
                .fetch_optional(&self.pool)
                .await?;

        let shift = match pointer {
            Some(number) => self.get(&number).await?,
            None => None,
        };

        // Pointer can lag a crash between commit and pointer write; the
        // status column is authoritative.
        match shift {
            Some(s) if s.status == ShiftStatus::Open => Ok(Some(s)),
            _ => {
                let fallback = sqlx::query_as::<_, Shift>(&format!(
                    "{SELECT_SHIFT} WHERE status = 'open' ORDER BY opened_at DESC LIMIT 1"
                ))
                .fetch_optional(&self.pool)
                .await?;
                Ok(fallback)
            }
        }
    }

    /// Opens a shift.
    ///
    /// Seeds one ledger row per tracked item with its beginning balance and
    /// appends the outbox `create` item, all in one transaction.
    pub async fn open(
        &self,
        register_id: &str,
        register_code: &str,
        initial_cash_cents: i64,
        balances: &[BalanceInput],
    ) -> DbResult<Shift> {
        validation::validate_open_shift(initial_cash_cents, balances)?;

        if let Some(open) = self.current_open().await? {
            return Err(DbError::Domain(vela_core::CoreError::validation(format!(
                "shift {} is already open",
                open.number
            ))));
        }

        let now = Utc::now();
        let number = DocNumberRepository::new(self.pool.clone())
            .sequenced_number(register_id, register_code, DocumentKind::Shift, now)
            .await?;

        debug!(number = %number, initial_cash_cents, "Opening shift");

        let shift = Shift {
            number: number.clone(),
            server_id: None,
            status: ShiftStatus::Open,
            sync_status: SyncStatus::Pending,
            register_id: register_id.to_string(),
            initial_cash_cents,
            cash_total_cents: 0,
            bank_total_cents: 0,
            final_cash_cents: None,
            expected_cash_cents: None,
            cash_difference_cents: None,
            opened_at: now,
            closed_at: None,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO shifts (
                number, server_id, status, sync_status, register_id,
                initial_cash_cents, cash_total_cents, bank_total_cents,
                final_cash_cents, expected_cash_cents, cash_difference_cents,
                opened_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, NULL, NULL, NULL, ?7, NULL)
            "#,
        )
        .bind(&shift.number)
        .bind(shift.server_id)
        .bind(shift.status)
        .bind(shift.sync_status)
        .bind(&shift.register_id)
        .bind(shift.initial_cash_cents)
        .bind(shift.opened_at)
        .execute(&mut *tx)
        .await?;

        for balance in balances {
            sqlx::query(
                r#"
                INSERT INTO shift_summary (
                    id, shift_number, item_id, item_name, unit, is_material,
                    beg_balance, refills_json, material_usage, end_balance, diff
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]', 0, NULL, NULL)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&shift.number)
            .bind(balance.item_id)
            .bind(&balance.item_name)
            .bind(&balance.unit)
            .bind(balance.is_material)
            .bind(balance.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let payload = serde_json::to_string(&serde_json::json!({
            "shift": shift,
            "summary": balances,
        }))?;
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Shift,
            OutboxAction::Create,
            &shift.number,
            &payload,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(CURRENT_SHIFT_KEY)
        .bind(&shift.number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(shift)
    }

    /// Records a refill on a ledger row.
    ///
    /// Slots are bounded; once full, further refills accumulate into the
    /// last slot (see [`vela_core::MAX_REFILL_SLOTS`]).
    pub async fn add_refill(
        &self,
        shift_number: &str,
        item_id: i64,
        unit: &str,
        quantity: f64,
    ) -> DbResult<()> {
        let shift = self.require(shift_number).await?;
        if shift.status != ShiftStatus::Open {
            return Err(DbError::Domain(vela_core::CoreError::InvalidTransition {
                entity: "shift",
                from: "closed".into(),
                to: "refill".into(),
            }));
        }

        let row = sqlx::query_as::<_, ShiftSummaryRow>(&format!(
            "{SELECT_SUMMARY} WHERE shift_number = ?1 AND item_id = ?2 AND unit = ?3"
        ))
        .bind(shift_number)
        .bind(item_id)
        .bind(unit)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("ShiftSummaryRow", format!("{item_id} ({unit})")))?;

        let mut slots = row.refills();
        summary::append_refill(&mut slots, quantity);

        sqlx::query("UPDATE shift_summary SET refills_json = ?2 WHERE id = ?1")
            .bind(&row.id)
            .bind(serde_json::to_string(&slots)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Closes a shift.
    ///
    /// ## Single Transaction
    /// 1. Cash reconciliation: `expected = initial + cash sales`,
    ///    `difference = expected − final`
    /// 2. Per ledger row: `diff = beg + Σrefills − usage − end`
    /// 3. Rows with no balances, refills, usage or inventory-entry activity
    ///    are pruned from the closed summary
    /// 4. Outbox `close` item with the full reconciliation snapshot
    /// 5. Current-shift pointer cleared
    pub async fn close(
        &self,
        number: &str,
        final_cash_cents: i64,
        ending: &[EndingBalance],
    ) -> DbResult<Shift> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let mut shift = sqlx::query_as::<_, Shift>(&format!("{SELECT_SHIFT} WHERE number = ?1"))
            .bind(number)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Shift", number))?;

        let rows = sqlx::query_as::<_, ShiftSummaryRow>(&format!(
            "{SELECT_SUMMARY} WHERE shift_number = ?1"
        ))
        .bind(number)
        .fetch_all(&mut *tx)
        .await?;

        let tracked_ids: Vec<i64> = rows.iter().map(|r| r.item_id).collect();
        let ending_ids: Vec<i64> = ending.iter().map(|e| e.item_id).collect();
        validation::validate_close_shift(shift.status, final_cash_cents, &tracked_ids, &ending_ids)?;

        let cash = summary::close_cash(
            Money::from_cents(shift.initial_cash_cents),
            Money::from_cents(shift.cash_total_cents),
            Money::from_cents(final_cash_cents),
        );

        shift.status = ShiftStatus::Closed;
        shift.sync_status = SyncStatus::Pending;
        shift.final_cash_cents = Some(final_cash_cents);
        shift.expected_cash_cents = Some(cash.expected_cents);
        shift.cash_difference_cents = Some(cash.difference_cents);
        shift.closed_at = Some(now);

        debug!(
            number = %number,
            expected = cash.expected_cents,
            difference = cash.difference_cents,
            "Closing shift"
        );

        let mut closed_rows = Vec::with_capacity(rows.len());
        for mut row in rows {
            let end_balance = ending
                .iter()
                .find(|e| e.item_id == row.item_id && e.unit == row.unit)
                .map(|e| e.end_balance);

            let refills = row.refills();
            let had_activity: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM inventory_entry_details d
                    JOIN inventory_entries e ON e.number = d.entry_number
                    WHERE e.shift_number = ?1 AND d.item_id = ?2
                )
                "#,
            )
            .bind(number)
            .bind(row.item_id)
            .fetch_one(&mut *tx)
            .await?;

            if summary::is_prunable(
                row.beg_balance,
                &refills,
                row.material_usage,
                end_balance,
                had_activity,
            ) {
                sqlx::query("DELETE FROM shift_summary WHERE id = ?1")
                    .bind(&row.id)
                    .execute(&mut *tx)
                    .await?;
                continue;
            }

            let end = end_balance.unwrap_or(0.0);
            let diff = summary::close_item_diff(row.beg_balance, &refills, row.material_usage, end);

            sqlx::query("UPDATE shift_summary SET end_balance = ?2, diff = ?3 WHERE id = ?1")
                .bind(&row.id)
                .bind(end)
                .bind(diff)
                .execute(&mut *tx)
                .await?;

            row.end_balance = Some(end);
            row.diff = Some(diff);
            closed_rows.push(row);
        }

        sqlx::query(
            r#"
            UPDATE shifts SET
                status = 'closed', sync_status = 'pending',
                final_cash_cents = ?2, expected_cash_cents = ?3,
                cash_difference_cents = ?4, closed_at = ?5
            WHERE number = ?1 AND status = 'open'
            "#,
        )
        .bind(number)
        .bind(final_cash_cents)
        .bind(cash.expected_cents)
        .bind(cash.difference_cents)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let payload = serde_json::to_string(&serde_json::json!({
            "shift": shift,
            "summary": closed_rows,
        }))?;
        OutboxRepository::enqueue(
            &mut tx,
            OutboxEntityType::Shift,
            OutboxAction::Close,
            number,
            &payload,
        )
        .await?;

        sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(CURRENT_SHIFT_KEY)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(shift)
    }

    /// Backfills the server id after confirmed delivery and flips the row to
    /// `synced`.
    pub async fn mark_synced(&self, number: &str, server_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE shifts SET server_id = ?2, sync_status = 'synced' WHERE number = ?1")
            .bind(number)
            .bind(server_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn require(&self, number: &str) -> DbResult<Shift> {
        self.get(number)
            .await?
            .ok_or_else(|| DbError::not_found("Shift", number))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
