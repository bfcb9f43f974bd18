//! In-process [`RemoteApi`] fake shared by the engine tests.
//!
//! Failure scripting is by business key: a scripted order number makes its
//! delivery fail with a transport error until the script is cleared, which
//! models the server coming back after an outage.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;

use vela_core::EntityType;

use crate::api::RemoteApi;
use crate::error::{SyncError, SyncResult};

#[derive(Default)]
struct FakeState {
    next_id: i64,
    auth_down: bool,
    fail_orders: HashSet<String>,
    fail_pulls: HashSet<EntityType>,
    closed_shifts: Vec<i64>,
    records: HashMap<EntityType, Vec<Value>>,
    pulled: Vec<EntityType>,
}

/// Scriptable fake server. Clones share state, so a test can keep a handle
/// for scripting after moving the fake into the engine.
#[derive(Clone)]
pub(crate) struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn new() -> Self {
        FakeApi {
            state: Arc::new(Mutex::new(FakeState {
                next_id: 100,
                ..FakeState::default()
            })),
        }
    }

    fn next_id(&self) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.next_id
    }

    /// Makes delivery of the order with this business key fail.
    pub fn fail_order(&self, number: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_orders
            .insert(number.to_string());
    }

    /// Makes pulling this entity type fail.
    pub fn fail_pull(&self, entity_type: EntityType) {
        self.state.lock().unwrap().fail_pulls.insert(entity_type);
    }

    /// Makes every call fail with an authentication error, as if the
    /// server started rejecting the token refresh.
    pub fn fail_auth(&self) {
        self.state.lock().unwrap().auth_down = true;
    }

    /// Clears every scripted failure, as if the outage ended.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.auth_down = false;
        state.fail_orders.clear();
        state.fail_pulls.clear();
    }

    /// Sets the records `/sync/incremental` returns for a type.
    pub fn set_records(&self, entity_type: EntityType, records: Vec<Value>) {
        self.state.lock().unwrap().records.insert(entity_type, records);
    }

    /// Server ids the close endpoint was called with.
    pub fn closed_shifts(&self) -> Vec<i64> {
        self.state.lock().unwrap().closed_shifts.clone()
    }

    /// Entity types pulled so far, in call order.
    pub fn pulled(&self) -> Vec<EntityType> {
        self.state.lock().unwrap().pulled.clone()
    }
}

fn outage(key: &str) -> SyncError {
    SyncError::Unreachable(format!("fake server down for {key}"))
}

fn auth_rejected() -> SyncError {
    SyncError::AuthFailed("fake server rejected the token refresh".into())
}

impl FakeApi {
    fn check_auth(&self) -> SyncResult<()> {
        if self.state.lock().unwrap().auth_down {
            return Err(auth_rejected());
        }
        Ok(())
    }
}

impl RemoteApi for FakeApi {
    async fn create_order(&self, payload: &Value) -> SyncResult<i64> {
        self.check_auth()?;
        let number = payload["order"]["number"].as_str().unwrap_or_default();
        if self.state.lock().unwrap().fail_orders.contains(number) {
            return Err(outage(number));
        }
        Ok(self.next_id())
    }

    async fn update_order(&self, _server_id: i64, _payload: &Value) -> SyncResult<()> {
        Ok(())
    }

    async fn open_shift(&self, _payload: &Value) -> SyncResult<i64> {
        Ok(self.next_id())
    }

    async fn update_shift(&self, _server_id: i64, _payload: &Value) -> SyncResult<()> {
        Ok(())
    }

    async fn close_shift(&self, server_id: i64, _payload: &Value) -> SyncResult<()> {
        self.state.lock().unwrap().closed_shifts.push(server_id);
        Ok(())
    }

    async fn create_inventory_entry(&self, _payload: &Value) -> SyncResult<i64> {
        Ok(self.next_id())
    }

    async fn create_inventory_transaction(&self, payload: &Value) -> SyncResult<i64> {
        // The processor must have resolved the parent's server id first
        assert!(
            payload.get("entry_id").is_some(),
            "detail payload missing entry_id"
        );
        Ok(self.next_id())
    }

    async fn create_table(&self, _payload: &Value) -> SyncResult<i64> {
        Ok(self.next_id())
    }

    async fn update_table(&self, _server_id: i64, _payload: &Value) -> SyncResult<()> {
        Ok(())
    }

    async fn sync_check(&self, _since: DateTime<Utc>, _store_id: i64) -> SyncResult<Vec<String>> {
        self.check_auth()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .keys()
            .map(|e| e.as_str().to_string())
            .collect())
    }

    async fn sync_incremental(
        &self,
        entity_type: EntityType,
        _since: DateTime<Utc>,
        _store_id: i64,
    ) -> SyncResult<Vec<Value>> {
        self.check_auth()?;
        let mut state = self.state.lock().unwrap();
        if state.fail_pulls.contains(&entity_type) {
            return Err(outage(entity_type.as_str()));
        }
        state.pulled.push(entity_type);
        Ok(state.records.get(&entity_type).cloned().unwrap_or_default())
    }
}
