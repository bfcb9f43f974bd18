//! # Sync Service
//!
//! Composition root of the sync engine. Owns the local store, the HTTP
//! client, the drain and pull cycles and the realtime channel; the embedding
//! application constructs exactly one and talks to it through methods and
//! the event bus, never through globals.
//!
//! ## Engine Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           SyncService                                   │
//! │                                                                         │
//! │   ┌──────────┐   ┌─────────────────┐   ┌───────────────────┐           │
//! │   │ Database │◀──│ OutboxProcessor │──▶│                   │           │
//! │   │ (sqlite) │   └─────────────────┘   │     ApiClient     │──▶ admin  │
//! │   │          │   ┌─────────────────┐   │    (REST/https)   │    server │
//! │   │          │◀──│IncrementalPuller│──▶│                   │           │
//! │   └──────────┘   └───────┬─────────┘   └───────────────────┘           │
//! │                          │ pull_one                                    │
//! │                  ┌───────┴────────┐    ┌───────────────────┐           │
//! │                  │ RealtimeClient │◀───│  wss /ws channel  │           │
//! │                  └────────────────┘    └───────────────────┘           │
//! │                                                                        │
//! │   run(): every poll_interval ──▶ drain outbox, pull changed types      │
//! │   sync_now() / connectivity_restored(): the same cycle, immediately    │
//! │   events: broadcast SyncEvent bus for the embedding UI                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use vela_db::Database;

use crate::api::RemoteApi;
use crate::auth::TokenStore;
use crate::client::ApiClient;
use crate::config::TerminalConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::outbox::{OutboxProcessor, RetryPolicy};
use crate::pull::IncrementalPuller;
use crate::realtime::{RealtimeClient, RealtimeHandle};

/// Point-in-time view of the engine, for status surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    /// Whether the last server exchange succeeded.
    pub is_online: bool,
    /// Whether a cycle is running right now.
    pub is_syncing: bool,
    /// Outbox items waiting for delivery.
    pub pending_count: i64,
    /// When the last successful cycle finished.
    pub last_sync: Option<DateTime<Utc>>,
    /// The last cycle's failure, if it failed.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct EngineState {
    is_online: bool,
    is_syncing: bool,
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Handle to a spawned background loop.
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ServiceHandle {
    /// Signals the loop to stop after the current cycle.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

/// The sync engine.
pub struct SyncService<A: RemoteApi = ApiClient> {
    db: Database,
    config: TerminalConfig,
    events: EventBus,
    processor: OutboxProcessor<A>,
    puller: Arc<IncrementalPuller<A>>,
    realtime: Mutex<Option<RealtimeHandle>>,
    state: Mutex<EngineState>,
}

impl SyncService {
    /// Builds the engine from a validated configuration.
    pub fn new(db: Database, config: TerminalConfig, tokens: TokenStore) -> SyncResult<Self> {
        config.validate()?;
        let api = ApiClient::new(&config.server.url, tokens)?;
        Ok(Self::with_api(db, config, api))
    }
}

impl<A: RemoteApi + Clone + 'static> SyncService<A> {
    /// Builds the engine over an explicit server implementation.
    pub fn with_api(db: Database, config: TerminalConfig, api: A) -> Self {
        let events = EventBus::new();

        let policy = RetryPolicy {
            max_attempts: config.sync.max_attempts,
        };
        let processor = OutboxProcessor::new(db.clone(), api.clone(), events.clone(), policy);
        let puller = Arc::new(IncrementalPuller::new(
            db.clone(),
            api,
            events.clone(),
            config.store.id,
        ));

        SyncService {
            db,
            config,
            events,
            processor,
            puller,
            realtime: Mutex::new(None),
            state: Mutex::new(EngineState::default()),
        }
    }

    /// The event bus UIs subscribe to.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The local store, for domain operations.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Current engine status.
    pub async fn status(&self) -> SyncResult<EngineStatus> {
        let pending_count = self.db.outbox().count_pending().await?;
        let state = self.state.lock().unwrap();
        Ok(EngineStatus {
            is_online: state.is_online,
            is_syncing: state.is_syncing,
            pending_count,
            last_sync: state.last_sync,
            last_error: state.last_error.clone(),
        })
    }

    /// Runs one full cycle immediately: drain the outbox, then pull.
    ///
    /// Transport failures inside the cycle are summarised in the returned
    /// status, not raised; only local-store failures error out.
    pub async fn sync_now(&self) -> SyncResult<EngineStatus> {
        self.state.lock().unwrap().is_syncing = true;
        let outcome = self.cycle().await;
        {
            let mut state = self.state.lock().unwrap();
            state.is_syncing = false;
            match &outcome {
                Ok(None) => {
                    state.is_online = true;
                    state.last_sync = Some(Utc::now());
                    state.last_error = None;
                }
                Ok(Some(summary)) => {
                    state.is_online = false;
                    state.last_error = Some(summary.clone());
                }
                Err(e) => {
                    state.last_error = Some(e.to_string());
                }
            }
        }
        // A background cycle never throws across the UI boundary; the
        // re-authenticate demand travels on the bus as the non-blocking
        // variant.
        if let Err(SyncError::AuthFailed(_)) = &outcome {
            self.events.emit(SyncEvent::AuthFailure { blocking: false });
        }
        self.emit_status().await;
        outcome?;
        self.status().await
    }

    /// Returns a failure summary, or `None` when the cycle was clean.
    async fn cycle(&self) -> SyncResult<Option<String>> {
        let drain = self.processor.drain().await?;
        let pull = self.puller.pull_all().await?;

        let deliveries_failed = drain.map(|d| d.failed).unwrap_or(0);
        if deliveries_failed == 0 && pull.failed == 0 {
            return Ok(None);
        }
        let summary = format!(
            "{deliveries_failed} deliveries and {} pulls failed",
            pull.failed
        );
        warn!(summary = %summary, "sync cycle incomplete");
        Ok(Some(summary))
    }

    /// Bootstrap pull after registration. Blocking by design: the terminal
    /// has no reference data yet, so domain operations cannot start.
    pub async fn first_sync(&self) -> SyncResult<()> {
        self.db.watermarks().set_registered_at(Utc::now()).await?;
        info!("running first sync");

        match self.puller.pull_all().await {
            Ok(report) => {
                info!(records = report.records, "first sync finished");
                let mut state = self.state.lock().unwrap();
                state.is_online = true;
                state.last_sync = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                if matches!(e, SyncError::AuthFailed(_)) {
                    self.events.emit(SyncEvent::AuthFailure { blocking: true });
                }
                Err(e)
            }
        }
    }

    /// Called when the embedding application detects connectivity returning:
    /// reconnects the realtime channel and runs a cycle immediately.
    pub async fn connectivity_restored(&self) -> SyncResult<()> {
        if let Some(handle) = self.realtime.lock().unwrap().as_ref() {
            handle.reconnect();
        }
        self.sync_now().await.map(|_| ())
    }

    /// Starts the realtime channel. Idempotent; the previous channel, if
    /// any, is shut down first.
    pub fn start_realtime(&self) {
        let client = RealtimeClient::new(
            &self.config.server.url,
            &self.config.register.id,
            Arc::clone(&self.puller),
            self.events.clone(),
            self.config.realtime,
        );
        let mut slot = self.realtime.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.shutdown();
        }
        *slot = Some(client.spawn());
    }

    /// Background loop: one cycle per poll interval until shut down.
    pub async fn run(&self, mut shutdown: mpsc::UnboundedReceiver<()>) {
        let mut timer = tokio::time::interval(self.config.poll_interval());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        timer.tick().await; // immediate first cycle

        loop {
            if let Err(e) = self.sync_now().await {
                warn!(error = %e, "sync cycle failed");
            }
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.recv() => break,
            }
        }

        if let Some(handle) = self.realtime.lock().unwrap().take() {
            handle.shutdown();
        }
        info!("sync service stopped");
    }

    /// Spawns [`run`](Self::run) on the runtime and returns its handle.
    pub fn spawn(self: Arc<Self>) -> ServiceHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move { self.run(rx).await });
        ServiceHandle { tx }
    }

    async fn emit_status(&self) {
        let pending_count = self.db.outbox().count_pending().await.unwrap_or(0);
        let is_online = self.state.lock().unwrap().is_online;
        self.events.emit(SyncEvent::Status {
            is_online,
            pending_count,
        });
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use vela_db::DbConfig;

    fn test_config() -> TerminalConfig {
        let mut config = TerminalConfig::default();
        config.server.url = "https://admin.example.com".into();
        config.register.id = "reg-1".into();
        config.register.code = "SAA-AAA".into();
        config.store.id = 3;
        config
    }

    async fn test_service() -> SyncService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        SyncService::new(db, test_config(), TokenStore::new()).unwrap()
    }

    async fn fake_service(api: FakeApi) -> SyncService<FakeApi> {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.watermarks().set_registered_at(Utc::now()).await.unwrap();
        SyncService::with_api(db, test_config(), api)
    }

    #[tokio::test]
    async fn test_new_rejects_incomplete_config() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = SyncService::new(db, TerminalConfig::default(), TokenStore::new());
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_status_reflects_queue() {
        let service = test_service().await;
        let status = service.status().await.unwrap();
        assert_eq!(status.pending_count, 0);
        assert!(!status.is_syncing);
        assert_eq!(status.last_sync, None);

        service.db().tables().create("Patio", 4).await.unwrap();
        assert_eq!(service.status().await.unwrap().pending_count, 1);
    }

    #[tokio::test]
    async fn test_background_auth_failure_reaches_the_bus() {
        let api = FakeApi::new();
        api.fail_auth();
        let service = fake_service(api).await;
        let mut rx = service.events().subscribe();

        let result = service.sync_now().await;
        assert!(matches!(result, Err(SyncError::AuthFailed(_))));
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::AuthFailure { blocking: false }
        );
    }

    #[tokio::test]
    async fn test_connectivity_restored_runs_a_cycle() {
        let service = fake_service(FakeApi::new()).await;
        service.connectivity_restored().await.unwrap();

        let status = service.status().await.unwrap();
        assert!(status.is_online);
        assert!(status.last_sync.is_some());
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn test_realtime_restart_is_idempotent() {
        let service = test_service().await;
        service.start_realtime();
        service.start_realtime();
        assert!(service.realtime.lock().unwrap().is_some());
    }
}
