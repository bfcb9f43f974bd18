//! # Outbox Processor
//!
//! Drains the durable outbox queue against the admin server.
//!
//! ## Drain Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Drain Cycle Flow                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    sync_outbox Table                            │   │
//! │  │                                                                 │   │
//! │  │  queue_id │ entity_type │ action │ data_id      │ retry_count  │   │
//! │  │  ─────────┼─────────────┼────────┼──────────────┼───────────── │   │
//! │  │  1        │ shift       │ create │ SSAA-AAA-B.. │ 0            │   │
//! │  │  2        │ order       │ create │ FSAA-AAA-B.. │ 2            │   │
//! │  │  3        │ order       │ create │ FSAA-AAA-C.. │ 0            │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │ queue_id order                          │
//! │                               ▼                                         │
//! │  For each item:                                                         │
//! │    • retry_count ≥ max_attempts?  skip with a warning                   │
//! │    • route by (entity_type, action) to one REST call                    │
//! │    • success:  DELETE item, backfill server id, entity → synced         │
//! │    • failure:  retry_count += 1, item retained, CONTINUE with next      │
//! │                (no head-of-line blocking)                               │
//! │                                                                         │
//! │  Overlap: cycles run on a timer AND on connectivity-restored/syncNow;   │
//! │  a try_lock guard skips a cycle that would overlap a running one.       │
//! │  Single-terminal assumption: no durable cross-process lock.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vela_core::{OutboxAction, OutboxEntityType, OutboxItem};
use vela_db::Database;

use crate::api::RemoteApi;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};

/// Items fetched per drain cycle.
const DRAIN_BATCH: u32 = 500;

/// Retry policy for failing outbox items.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Items at or over this retry count are skipped with a warning.
    pub max_attempts: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 10 }
    }
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drains the outbox queue in store order.
pub struct OutboxProcessor<A: RemoteApi> {
    db: Database,
    api: A,
    events: EventBus,
    policy: RetryPolicy,
    /// In-process reentrancy guard; an overlapping cycle is skipped, not
    /// queued.
    guard: Mutex<()>,
}

impl<A: RemoteApi> OutboxProcessor<A> {
    /// Creates a new processor.
    pub fn new(db: Database, api: A, events: EventBus, policy: RetryPolicy) -> Self {
        OutboxProcessor {
            db,
            api,
            events,
            policy,
            guard: Mutex::new(()),
        }
    }

    /// Runs one drain cycle.
    ///
    /// Returns `None` when another cycle is already running.
    pub async fn drain(&self) -> SyncResult<Option<DrainReport>> {
        let Ok(_running) = self.guard.try_lock() else {
            debug!("drain cycle already running, skipping");
            return Ok(None);
        };

        let items = self.db.outbox().list_pending(DRAIN_BATCH).await?;
        if items.is_empty() {
            return Ok(Some(DrainReport::default()));
        }

        info!(queued = items.len(), "draining outbox");

        let mut report = DrainReport::default();
        for item in items {
            if item.retry_count >= self.policy.max_attempts {
                warn!(
                    queue_id = item.queue_id,
                    data_id = %item.data_id,
                    retry_count = item.retry_count,
                    "item over retry limit, skipping"
                );
                report.skipped += 1;
                continue;
            }

            match self.deliver(&item).await {
                Ok(()) => {
                    self.db.outbox().delete(item.queue_id).await?;
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        queue_id = item.queue_id,
                        data_id = %item.data_id,
                        error = %e,
                        "delivery failed, item retained"
                    );
                    self.db.outbox().bump_retry(item.queue_id).await?;
                    report.failed += 1;
                    // Next item; a failing item never blocks the queue
                }
            }
        }

        self.events.emit(SyncEvent::OutboxDrained {
            delivered: report.delivered,
            failed: report.failed,
        });
        Ok(Some(report))
    }

    /// Replays one item against the server and backfills local state.
    async fn deliver(&self, item: &OutboxItem) -> SyncResult<()> {
        let payload: Value = serde_json::from_str(&item.payload)?;
        debug!(
            queue_id = item.queue_id,
            entity_type = ?item.entity_type,
            action = ?item.action,
            "delivering outbox item"
        );

        match (item.entity_type, item.action) {
            (OutboxEntityType::Order, OutboxAction::Create) => {
                let server_id = self.api.create_order(&payload).await?;
                self.db.orders().mark_synced(&item.data_id, server_id).await?;
            }
            (OutboxEntityType::Order, OutboxAction::Update) => {
                let server_id = self.order_server_id(&item.data_id).await?;
                self.api.update_order(server_id, &payload).await?;
                self.db.orders().mark_synced(&item.data_id, server_id).await?;
            }
            (OutboxEntityType::OrderItem, _) => {
                // Line changes replay as an update of the parent order
                let order_number = payload
                    .get("order_number")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SyncError::Serialization("order item payload lacks order_number".into())
                    })?;
                let server_id = self.order_server_id(order_number).await?;
                self.api.update_order(server_id, &payload).await?;
            }
            (OutboxEntityType::Shift, OutboxAction::Create) => {
                let server_id = self.api.open_shift(&payload).await?;
                self.db.shifts().mark_synced(&item.data_id, server_id).await?;
            }
            (OutboxEntityType::Shift, OutboxAction::Update) => {
                let server_id = self.shift_server_id(&item.data_id).await?;
                self.api.update_shift(server_id, &payload).await?;
                self.db.shifts().mark_synced(&item.data_id, server_id).await?;
            }
            (OutboxEntityType::Shift, OutboxAction::Close) => {
                let server_id = self.shift_server_id(&item.data_id).await?;
                self.api.close_shift(server_id, &payload).await?;
                self.db.shifts().mark_synced(&item.data_id, server_id).await?;
            }
            (OutboxEntityType::InventoryEntry, OutboxAction::Create) => {
                let server_id = self.api.create_inventory_entry(&payload).await?;
                self.db
                    .inventory()
                    .mark_synced(&item.data_id, server_id)
                    .await?;
            }
            (OutboxEntityType::InventoryEntryDetail, OutboxAction::Create) => {
                // The server addresses the parent entry by its id
                let entry_number = payload
                    .get("entry_number")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SyncError::Serialization("detail payload lacks entry_number".into())
                    })?;
                let entry = self
                    .db
                    .inventory()
                    .get(entry_number)
                    .await?
                    .ok_or_else(|| SyncError::MissingServerId {
                        entity: "InventoryEntry",
                        key: entry_number.to_string(),
                    })?;
                let entry_id = entry.server_id.ok_or_else(|| SyncError::MissingServerId {
                    entity: "InventoryEntry",
                    key: entry_number.to_string(),
                })?;

                let mut payload = payload;
                match payload.as_object_mut() {
                    Some(object) => {
                        object.insert("entry_id".into(), Value::from(entry_id));
                    }
                    None => {
                        return Err(SyncError::Serialization(
                            "detail payload is not a JSON object".into(),
                        ));
                    }
                }
                let server_id = self.api.create_inventory_transaction(&payload).await?;
                self.db
                    .inventory()
                    .mark_detail_synced(&item.data_id, server_id)
                    .await?;
            }
            (OutboxEntityType::Table, OutboxAction::Create) => {
                let server_id = self.api.create_table(&payload).await?;
                self.db.tables().mark_synced(&item.data_id, server_id).await?;
            }
            (OutboxEntityType::Table, OutboxAction::Update) => {
                let table = self
                    .db
                    .tables()
                    .get(&item.data_id)
                    .await?
                    .ok_or_else(|| SyncError::MissingServerId {
                        entity: "DiningTable",
                        key: item.data_id.clone(),
                    })?;
                let server_id = table.server_id.ok_or_else(|| SyncError::MissingServerId {
                    entity: "DiningTable",
                    key: item.data_id.clone(),
                })?;
                self.api.update_table(server_id, &payload).await?;
                self.db.tables().mark_synced(&item.data_id, server_id).await?;
            }
            (entity_type, action) => {
                return Err(SyncError::Serialization(format!(
                    "no route for outbox item {entity_type:?}/{action:?}"
                )));
            }
        }

        Ok(())
    }

    async fn order_server_id(&self, number: &str) -> SyncResult<i64> {
        let order = self
            .db
            .orders()
            .get(number)
            .await?
            .ok_or_else(|| SyncError::MissingServerId {
                entity: "Order",
                key: number.to_string(),
            })?;
        order.server_id.ok_or_else(|| SyncError::MissingServerId {
            entity: "Order",
            key: number.to_string(),
        })
    }

    async fn shift_server_id(&self, number: &str) -> SyncResult<i64> {
        let shift = self
            .db
            .shifts()
            .get(number)
            .await?
            .ok_or_else(|| SyncError::MissingServerId {
                entity: "Shift",
                key: number.to_string(),
            })?;
        shift.server_id.ok_or_else(|| SyncError::MissingServerId {
            entity: "Shift",
            key: number.to_string(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use chrono::Utc;
    use vela_core::{PaymentMethod, SyncStatus};
    use vela_db::DbConfig;

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO products (server_id, name, category_id, price_cents, tax_rate_bps,
                                  is_prepared, track_inventory, unit, updated_at)
            VALUES (1, 'Espresso', NULL, 300, 0, 0, 0, 'unit', ?1)
            "#,
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO shifts (number, status, sync_status, register_id,
                                initial_cash_cents, opened_at)
            VALUES ('SSAA-AAA-B', 'open', 'pending', 'reg-1', 0, ?1)
            "#,
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();
        db
    }

    async fn paid_order(db: &Database) -> String {
        let orders = db.orders();
        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        orders.add_item(&draft.number, 1).await.unwrap();
        orders
            .mark_paid(&draft.number, "SSAA-AAA-B", PaymentMethod::Cash, 300)
            .await
            .unwrap();
        draft.number
    }

    #[tokio::test]
    async fn test_failing_middle_item_does_not_block_queue() {
        let db = test_db().await;
        let a = paid_order(&db).await;
        let b = paid_order(&db).await;
        let c = paid_order(&db).await;

        let api = FakeApi::new();
        api.fail_order(&b);

        let processor =
            OutboxProcessor::new(db.clone(), api, EventBus::new(), RetryPolicy::default());
        let report = processor.drain().await.unwrap().unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);

        // Only the failing item remains, with its retry recorded
        let remaining = db.outbox().list_pending(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].data_id, b);
        assert_eq!(remaining[0].retry_count, 1);

        // Delivered entities got their server ids, the failed one did not
        let delivered = db.orders().get(&a).await.unwrap().unwrap();
        assert!(delivered.server_id.is_some());
        assert_eq!(delivered.sync_status, SyncStatus::Synced);

        let failed = db.orders().get(&b).await.unwrap().unwrap();
        assert_eq!(failed.server_id, None);
        assert_eq!(failed.sync_status, SyncStatus::Pending);

        let delivered = db.orders().get(&c).await.unwrap().unwrap();
        assert!(delivered.server_id.is_some());
    }

    #[tokio::test]
    async fn test_next_cycle_retries_the_failure() {
        let db = test_db().await;
        let number = paid_order(&db).await;

        let api = FakeApi::new();
        api.fail_order(&number);

        let processor =
            OutboxProcessor::new(db.clone(), api, EventBus::new(), RetryPolicy::default());
        processor.drain().await.unwrap();

        // Connectivity restored: unblock and drain again
        processor.api.clear_failures();
        let report = processor.drain().await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_items_over_retry_limit_are_skipped() {
        let db = test_db().await;
        let number = paid_order(&db).await;

        let api = FakeApi::new();
        api.fail_order(&number);

        let policy = RetryPolicy { max_attempts: 2 };
        let processor = OutboxProcessor::new(db.clone(), api, EventBus::new(), policy);

        processor.drain().await.unwrap(); // retry 1
        processor.drain().await.unwrap(); // retry 2
        let report = processor.drain().await.unwrap().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);

        // The item stays queued for a later manual resolution
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shift_close_routes_with_server_id() {
        let db = test_db().await;
        let shifts = db.shifts();
        shifts.mark_synced("SSAA-AAA-B", 77).await.unwrap();

        shifts.close("SSAA-AAA-B", 0, &[]).await.unwrap();

        let api = FakeApi::new();
        let processor =
            OutboxProcessor::new(db.clone(), api, EventBus::new(), RetryPolicy::default());
        let report = processor.drain().await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(processor.api.closed_shifts(), vec![77]);
    }

    #[tokio::test]
    async fn test_drain_emits_event() {
        let db = test_db().await;
        paid_order(&db).await;

        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let processor =
            OutboxProcessor::new(db.clone(), FakeApi::new(), bus, RetryPolicy::default());
        processor.drain().await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::OutboxDrained {
                delivered: 1,
                failed: 0
            }
        );
    }
}
