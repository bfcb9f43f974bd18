//! # Vela Sync
//!
//! The sync engine of the Vela POS terminal: drains the durable outbox to
//! the admin server, pulls server-authoritative reference data behind
//! per-type watermarks, and listens on a realtime WebSocket channel for
//! invalidations.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            vela-sync                                    │
//! │                                                                         │
//! │  service      SyncService composition root + poll loop                  │
//! │  outbox       OutboxProcessor - replay the queue in store order         │
//! │  pull         IncrementalPuller - watermarked reference pulls           │
//! │  realtime     RealtimeClient - reconnecting WS invalidation channel     │
//! │  client/api   ApiClient (reqwest) behind the RemoteApi trait seam       │
//! │  auth         shared TokenStore (access + refresh)                      │
//! │  config       TerminalConfig (TOML)                                     │
//! │  events       SyncEvent broadcast bus                                   │
//! │                                                                         │
//! │  Everything here is best-effort infrastructure: domain operations in    │
//! │  vela-db commit locally first and never wait on this crate.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod outbox;
pub mod pull;
pub mod realtime;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use api::RemoteApi;
pub use auth::{TokenPair, TokenStore};
pub use client::ApiClient;
pub use config::{normalize_server_url, TerminalConfig};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use outbox::{DrainReport, OutboxProcessor, RetryPolicy};
pub use pull::{IncrementalPuller, PullReport};
pub use realtime::{RealtimeClient, RealtimeHandle, RealtimeMessage};
pub use service::{EngineStatus, ServiceHandle, SyncService};
