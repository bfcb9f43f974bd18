//! # Repository Layer
//!
//! Database access organized by domain entity.
//!
//! ## Repository Pattern
//! Each repository owns a clone of the connection pool and exposes the
//! domain operations for one entity family. Multi-field mutations are a
//! single transaction; the outbox append always joins the entity write's
//! transaction (see [`outbox`]).
//!
//! ## Modules
//! - [`order`] - Draft lifecycle, payment, line items
//! - [`shift`] - Cash shift open/refill/close and the running ledger
//! - [`inventory`] - Inventory entries with detail lines
//! - [`table`] - Dining tables
//! - [`outbox`] - The durable replay queue
//! - [`numbers`] - Document prefixes and per-day sequences
//! - [`watermark`] - Incremental pull watermarks
//! - [`reference`] - Server-authoritative reference data and settings

pub mod inventory;
pub mod numbers;
pub mod order;
pub mod outbox;
pub mod reference;
pub mod shift;
pub mod table;
pub mod watermark;

pub use inventory::{DetailInput, InventoryRepository};
pub use numbers::DocNumberRepository;
pub use order::OrderRepository;
pub use outbox::OutboxRepository;
pub use reference::ReferenceRepository;
pub use shift::{EndingBalance, ShiftRepository};
pub use table::TableRepository;
pub use watermark::WatermarkRepository;
