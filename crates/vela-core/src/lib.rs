//! # vela-core: Pure Business Logic for Vela POS
//!
//! This crate is the **heart** of the Vela terminal. It contains all business
//! logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Vela POS Architecture                           │
//! │                                                                         │
//! │  UI-level actions (out of scope for this repository)                    │
//! │       │                                                                 │
//! │  ┌────▼────────────────────────────────────────────────────────────┐    │
//! │  │              ★ vela-core (THIS CRATE) ★                         │    │
//! │  │                                                                 │    │
//! │  │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐  │    │
//! │  │  │  types  │ │  money  │ │ base36  │ │ docnum  │ │ summary  │  │    │
//! │  │  │  Order  │ │  Money  │ │  codec  │ │ numbers │ │  ledger  │  │    │
//! │  │  │  Shift  │ │ TaxCalc │ │  A-Z0-9 │ │ F-AAA.. │ │   math   │  │    │
//! │  │  └─────────┘ └─────────┘ └─────────┘ └─────────┘ └──────────┘  │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └────┬────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │  ┌────▼────────────────────────────────────────────────────────────┐    │
//! │  │            vela-db (SQLite local durable store)                 │    │
//! │  └────┬────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │  ┌────▼────────────────────────────────────────────────────────────┐    │
//! │  │       vela-sync (outbox drain / pull / realtime channel)        │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Order, Shift, InventoryEntry, outbox items)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`base36`] - The A-Z,0-9 codec behind every document number
//! - [`docnum`] - Offline document number generation
//! - [`summary`] - Shift ledger arithmetic (refills, usage, close diffs)
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output, always
//! 2. **No I/O**: database, network and file system access are FORBIDDEN here
//! 3. **Integer Money**: all monetary values are in cents (i64)
//! 4. **Explicit Errors**: typed errors, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod base36;
pub mod docnum;
pub mod error;
pub mod money;
pub mod summary;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of refill slots tracked per shift summary row.
///
/// ## Business Reason
/// The closing screen shows at most six refill columns. Replenishments past
/// the sixth are accumulated into the last slot rather than dropped, so the
/// running total survives.
pub const MAX_REFILL_SLOTS: usize = 6;

/// Width of the base-36 sequence suffix on shift/inventory numbers.
///
/// Two symbols cover 36 * 36 = 1296 same-day documents per register and type,
/// far beyond what a single terminal produces in a day.
pub const SEQUENCE_WIDTH: usize = 2;
