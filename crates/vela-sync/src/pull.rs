//! # Incremental Puller
//!
//! Pulls server-authoritative reference data down to the terminal.
//!
//! ## Pull Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Incremental Pull Flow                               │
//! │                                                                         │
//! │  for each entity type (products, categories, materials, ...):           │
//! │                                                                         │
//! │    sync_watermarks ──── since ───▶ GET /sync/incremental                │
//! │    (fallback: the terminal's          │                                 │
//! │     registration timestamp)           ▼                                 │
//! │                              upsert by server id                        │
//! │                                       │                                 │
//! │                                       ▼                                 │
//! │                         advance watermark to now                        │
//! │                         (EVEN for zero records)                         │
//! │                                                                         │
//! │  Types are isolated: a failing type is logged and the cycle moves on.   │
//! │  Records are server-keyed upserts, so replaying a pull is harmless.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Advancing on empty pulls keeps the `since` window from growing without
//! bound on quiet terminals.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use vela_core::docnum::DocumentKind;
use vela_core::{EntityType, MaterialRef, ProductRef, RecipeLine};
use vela_db::Database;

use crate::api::RemoteApi;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};

/// Outcome of a full pull cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Entity types that pulled and applied cleanly.
    pub succeeded: usize,
    /// Entity types whose pull failed; their watermarks did not move.
    pub failed: usize,
    /// Total records applied.
    pub records: usize,
}

/// Pulls reference data incrementally, one watermark per entity type.
pub struct IncrementalPuller<A: RemoteApi> {
    db: Database,
    api: A,
    events: EventBus,
    store_id: i64,
}

impl<A: RemoteApi> IncrementalPuller<A> {
    /// Creates a new puller for the given store.
    pub fn new(db: Database, api: A, events: EventBus, store_id: i64) -> Self {
        IncrementalPuller {
            db,
            api,
            events,
            store_id,
        }
    }

    /// Pulls every entity type. A failing type never aborts the rest, with
    /// one exception: an authentication failure is global and stops the
    /// cycle immediately.
    pub async fn pull_all(&self) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        for entity_type in EntityType::ALL {
            match self.pull_one(entity_type).await {
                Ok(count) => {
                    report.succeeded += 1;
                    report.records += count;
                }
                Err(e @ SyncError::AuthFailed(_)) => return Err(e),
                Err(e) => {
                    warn!(entity_type = %entity_type, error = %e, "pull failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            records = report.records,
            "pull cycle finished"
        );
        Ok(report)
    }

    /// Pulls entity types the server reports as changed since the oldest
    /// local watermark. Falls back to nothing when the check says so.
    pub async fn pull_changed(&self) -> SyncResult<PullReport> {
        let mut since = Utc::now();
        for entity_type in EntityType::ALL {
            let store_id = self.scope(entity_type);
            let mark = self.db.watermarks().since_for(entity_type, store_id).await?;
            since = since.min(mark);
        }

        let changed = self.api.sync_check(since, self.store_id).await?;
        debug!(changed = ?changed, "sync check");

        let mut report = PullReport::default();
        for name in changed {
            let Some(entity_type) = EntityType::parse(&name) else {
                warn!(entity_type = %name, "unknown entity type in sync check");
                continue;
            };
            match self.pull_one(entity_type).await {
                Ok(count) => {
                    report.succeeded += 1;
                    report.records += count;
                }
                Err(e @ SyncError::AuthFailed(_)) => return Err(e),
                Err(e) => {
                    warn!(entity_type = %entity_type, error = %e, "pull failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Pulls one entity type and returns how many records were applied.
    ///
    /// The watermark advances to the cycle start time even when the server
    /// returns nothing; it does NOT advance when the pull or apply fails.
    pub async fn pull_one(&self, entity_type: EntityType) -> SyncResult<usize> {
        let store_id = self.scope(entity_type);
        let since = self.db.watermarks().since_for(entity_type, store_id).await?;
        let started_at = Utc::now();

        let records = self
            .api
            .sync_incremental(entity_type, since, self.store_id)
            .await?;
        let count = records.len();
        debug!(entity_type = %entity_type, since = %since, count, "pulled");

        self.apply(entity_type, records).await?;
        self.db
            .watermarks()
            .advance(entity_type, store_id, started_at)
            .await?;

        self.events.emit(SyncEvent::PullCompleted {
            entity_type,
            records: count,
            pulled_at: started_at,
        });
        Ok(count)
    }

    fn scope(&self, entity_type: EntityType) -> i64 {
        if entity_type.store_scoped() {
            self.store_id
        } else {
            0
        }
    }

    /// Applies pulled records to the local store, keyed by server id.
    async fn apply(&self, entity_type: EntityType, records: Vec<Value>) -> SyncResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let reference = self.db.reference();

        match entity_type {
            EntityType::Products => {
                let products = decode::<ProductRef>(records)?;
                reference.upsert_products(&products).await?;
            }
            EntityType::Materials => {
                let materials = decode::<MaterialRef>(records)?;
                reference.upsert_materials(&materials).await?;
            }
            EntityType::Recipes => {
                let recipes = decode::<RecipeLine>(records)?;
                reference.upsert_recipes(&recipes).await?;
            }
            EntityType::Tables => {
                for record in records {
                    let Some(server_id) = record["id"].as_i64() else {
                        warn!(record = %record, "table record without id, skipping");
                        continue;
                    };
                    let name = record["name"].as_str().unwrap_or_default();
                    let capacity = record["capacity"].as_i64().unwrap_or(0);
                    self.db
                        .tables()
                        .apply_server_record(server_id, name, capacity)
                        .await?;
                }
            }
            EntityType::DocumentPrefixes => {
                for record in records {
                    let Some(kind) = record["kind"].as_str().and_then(document_kind) else {
                        warn!(record = %record, "prefix record for unknown kind, skipping");
                        continue;
                    };
                    let Some(prefix) = record["prefix"].as_str() else {
                        continue;
                    };
                    reference
                        .upsert_doc_prefix(self.store_id, kind, prefix)
                        .await?;
                }
            }
            EntityType::Settings => {
                for record in records {
                    let (Some(key), Some(value)) =
                        (record["key"].as_str(), record["value"].as_str())
                    else {
                        warn!(record = %record, "setting record without key/value, skipping");
                        continue;
                    };
                    reference.set_setting(key, value).await?;
                }
            }
            // Categories, units and inventory visibility have no dedicated
            // tables; they land as generic JSON documents
            EntityType::Categories | EntityType::Units | EntityType::InventoryVisibility => {
                for record in records {
                    let Some(server_id) = record["id"].as_i64() else {
                        warn!(record = %record, "record without id, skipping");
                        continue;
                    };
                    let payload = serde_json::to_string(&record)?;
                    reference
                        .upsert_document(entity_type, server_id, &payload, Utc::now())
                        .await?;
                }
            }
        }

        Ok(())
    }
}

/// Decodes wire records, renaming the server's `id` to our `server_id`.
fn decode<T: serde::de::DeserializeOwned>(records: Vec<Value>) -> SyncResult<Vec<T>> {
    records
        .into_iter()
        .map(|mut record| {
            if let Some(id) = record.get("id").cloned() {
                record["server_id"] = id;
            }
            Ok(serde_json::from_value(record)?)
        })
        .collect()
}

fn document_kind(s: &str) -> Option<DocumentKind> {
    [
        DocumentKind::Shift,
        DocumentKind::Invoice,
        DocumentKind::Inventory,
        DocumentKind::Payment,
    ]
    .into_iter()
    .find(|k| k.as_str() == s)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use serde_json::json;
    use vela_db::DbConfig;

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.watermarks().set_registered_at(Utc::now()).await.unwrap();
        db
    }

    fn product_record(id: i64, name: &str, price_cents: i64) -> Value {
        json!({
            "id": id,
            "name": name,
            "category_id": null,
            "price_cents": price_cents,
            "tax_rate_bps": 0,
            "is_prepared": false,
            "track_inventory": true,
            "unit": "unit",
            "updated_at": Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_pull_is_idempotent_and_advances_watermark_on_both_passes() {
        let db = test_db().await;
        let api = FakeApi::new();
        api.set_records(
            EntityType::Products,
            vec![product_record(1, "Espresso", 300)],
        );

        let puller = IncrementalPuller::new(db.clone(), api, EventBus::new(), 5);

        let count = puller.pull_one(EntityType::Products).await.unwrap();
        assert_eq!(count, 1);
        let first_mark = db
            .watermarks()
            .since_for(EntityType::Products, 0)
            .await
            .unwrap();

        // Second pass re-applies the same record without duplicating it and
        // still moves the watermark forward
        puller.pull_one(EntityType::Products).await.unwrap();
        let products = db.reference().list_products().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price_cents, 300);

        let second_mark = db
            .watermarks()
            .since_for(EntityType::Products, 0)
            .await
            .unwrap();
        assert!(second_mark >= first_mark);
    }

    #[tokio::test]
    async fn test_empty_pull_advances_watermark() {
        let db = test_db().await;
        let registered = db
            .watermarks()
            .since_for(EntityType::Materials, 0)
            .await
            .unwrap();

        let puller = IncrementalPuller::new(db.clone(), FakeApi::new(), EventBus::new(), 5);
        let count = puller.pull_one(EntityType::Materials).await.unwrap();
        assert_eq!(count, 0);

        let mark = db
            .watermarks()
            .since_for(EntityType::Materials, 0)
            .await
            .unwrap();
        assert!(mark > registered);
    }

    #[tokio::test]
    async fn test_full_pull_visits_every_type_in_declaration_order() {
        let db = test_db().await;
        let api = FakeApi::new();

        let puller = IncrementalPuller::new(db.clone(), api.clone(), EventBus::new(), 5);
        let report = puller.pull_all().await.unwrap();

        assert_eq!(report.succeeded, EntityType::ALL.len());
        assert_eq!(api.pulled(), EntityType::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_failing_type_does_not_abort_the_rest() {
        let db = test_db().await;
        let api = FakeApi::new();
        api.set_records(
            EntityType::Products,
            vec![product_record(1, "Espresso", 300)],
        );
        api.fail_pull(EntityType::Categories);

        let puller = IncrementalPuller::new(db.clone(), api, EventBus::new(), 5);
        let report = puller.pull_all().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, EntityType::ALL.len() - 1);
        assert_eq!(db.reference().list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_pull_feeds_number_generation() {
        let db = test_db().await;
        let api = FakeApi::new();
        api.set_records(
            EntityType::DocumentPrefixes,
            vec![json!({"kind": "invoice", "prefix": "X"})],
        );

        let puller = IncrementalPuller::new(db.clone(), api, EventBus::new(), 5);
        puller.pull_one(EntityType::DocumentPrefixes).await.unwrap();

        let prefix = db
            .numbers()
            .prefix_for(DocumentKind::Invoice)
            .await
            .unwrap();
        assert_eq!(prefix, "X");
    }

    #[tokio::test]
    async fn test_store_scoped_watermark_is_separate() {
        let db = test_db().await;
        let puller = IncrementalPuller::new(db.clone(), FakeApi::new(), EventBus::new(), 5);

        puller.pull_one(EntityType::Settings).await.unwrap();

        // Scoped mark moved; the unscoped slot for the same type did not
        let scoped = db
            .watermarks()
            .since_for(EntityType::Settings, 5)
            .await
            .unwrap();
        let unscoped = db
            .watermarks()
            .since_for(EntityType::Settings, 0)
            .await
            .unwrap();
        assert!(scoped > unscoped);
    }
}
