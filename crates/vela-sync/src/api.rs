//! # Remote API Seam
//!
//! The trait the engine drives instead of a concrete HTTP client, so the
//! drain and pull cycles can be exercised against an in-process fake.
//!
//! [`crate::client::ApiClient`] is the production implementation; tests
//! implement the trait over hash maps and failure scripts.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;

use crate::error::SyncResult;
use vela_core::EntityType;

/// Everything the sync engine asks of the admin server.
///
/// Replay calls return the server-assigned id where the server issues one;
/// the engine backfills it next to the business key.
pub trait RemoteApi: Send + Sync {
    // =========================================================================
    // Outbox Replay
    // =========================================================================

    /// `POST /orders` - delivers a paid order with its items.
    fn create_order(&self, payload: &Value) -> impl Future<Output = SyncResult<i64>> + Send;

    /// `PUT /orders/{id}` - updates a delivered order.
    fn update_order(
        &self,
        server_id: i64,
        payload: &Value,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// `POST /shifts/open` - delivers an opened shift.
    fn open_shift(&self, payload: &Value) -> impl Future<Output = SyncResult<i64>> + Send;

    /// `PUT /shifts/{id}` - updates a delivered shift.
    fn update_shift(
        &self,
        server_id: i64,
        payload: &Value,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// `POST /shifts/{id}/close-with-inventory` - delivers the close
    /// reconciliation together with the ledger summary.
    fn close_shift(
        &self,
        server_id: i64,
        payload: &Value,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// `POST /inventory-entries` - delivers an inventory entry header.
    fn create_inventory_entry(
        &self,
        payload: &Value,
    ) -> impl Future<Output = SyncResult<i64>> + Send;

    /// `POST /inventory-transactions` - delivers one entry detail line.
    fn create_inventory_transaction(
        &self,
        payload: &Value,
    ) -> impl Future<Output = SyncResult<i64>> + Send;

    /// `POST /tables` - delivers a locally created table.
    fn create_table(&self, payload: &Value) -> impl Future<Output = SyncResult<i64>> + Send;

    /// `PUT /tables/{id}` - updates a delivered table.
    fn update_table(
        &self,
        server_id: i64,
        payload: &Value,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    // =========================================================================
    // Incremental Pull
    // =========================================================================

    /// `GET /sync/check?since=&store_id=` - wire names of entity types with
    /// changes after `since`. Optional narrowing; a puller may skip it and
    /// pull every type.
    fn sync_check(
        &self,
        since: DateTime<Utc>,
        store_id: i64,
    ) -> impl Future<Output = SyncResult<Vec<String>>> + Send;

    /// `GET /sync/incremental?entity_type=&since=&store_id=` - the records
    /// of one type changed after `since`.
    fn sync_incremental(
        &self,
        entity_type: EntityType,
        since: DateTime<Utc>,
        store_id: i64,
    ) -> impl Future<Output = SyncResult<Vec<Value>>> + Send;
}
