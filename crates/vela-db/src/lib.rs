//! # Vela DB - Local Durable Store
//!
//! SQLite persistence for the Vela POS terminal.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         vela-db                                         │
//! │                                                                         │
//! │   ┌──────────────┐      ┌──────────────────────────────────────────┐    │
//! │   │   Database   │─────▶│              Repositories                │    │
//! │   │  (SqlitePool)│      │                                          │    │
//! │   │   WAL mode   │      │  orders     shifts     inventory  tables │    │
//! │   └──────┬───────┘      │  outbox     numbers    watermarks        │    │
//! │          │              │  reference                               │    │
//! │   ┌──────▼───────┐      └──────────────────┬───────────────────────┘    │
//! │   │  Migrations  │                         │                            │
//! │   │ (embedded)   │         every state-changing domain op appends       │
//! │   │ user_version │         its outbox item in the SAME transaction      │
//! │   │    guard     │         as the entity write                          │
//! │   └──────────────┘                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! - **Business keys**: domain entities are keyed by their offline-generated
//!   `number`; the server id is backfilled next to it, never replacing it.
//! - **Offline-first**: every domain operation commits locally and never
//!   fails because of sync problems.
//! - **Single transactions**: order payment, shift open/close and inventory
//!   entries are atomic together with their outbox items.

pub mod autosave;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use autosave::{DraftAutosave, DEFAULT_DEBOUNCE};
pub use error::{DbError, DbResult};
pub use migrations::EXPECTED_SCHEMA_VERSION;
pub use pool::{Database, DbConfig};
pub use repository::{
    DetailInput, DocNumberRepository, EndingBalance, InventoryRepository, OrderRepository,
    OutboxRepository, ReferenceRepository, ShiftRepository, TableRepository, WatermarkRepository,
};
