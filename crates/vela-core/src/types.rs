//! # Domain Types
//!
//! Core domain records used throughout the Vela terminal.
//!
//! ## Dual-Identity Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every synchronizable record carries TWO identities:                    │
//! │                                                                         │
//! │  number     "FSAA-AAA-BXK2M9QS"   ← business key, generated offline,    │
//! │                                     PRIMARY KEY for every local         │
//! │                                     operation, immutable for life       │
//! │                                                                         │
//! │  server_id  Option<i64>           ← assigned by the admin server on     │
//! │                                     first successful delivery; used     │
//! │                                     ONLY to address the remote API,     │
//! │                                     written back without ever           │
//! │                                     replacing the business key          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Child records (order items, summary rows, entry details) join on the
//! parent's business key, never on the server id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Sync Status
// =============================================================================

/// Delivery state of a synchronizable record.
///
/// `Pending` means "has local changes not yet confirmed by the server".
/// The transition `Pending -> Synced` happens only after the outbox drain
/// confirms delivery; any further local mutation of a `Synced` record moves
/// it back to `Pending` (terminal records excepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Error,
}

// =============================================================================
// Order
// =============================================================================

/// The lifecycle of an order: `draft -> paid` or `draft -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Items being added; still editable and locally deletable.
    Draft,
    /// Paid and terminal: totals fixed, never edited or deleted again.
    Paid,
    /// Cancelled before payment.
    Cancelled,
}

/// How an order was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Physical cash - feeds the shift's cash running total.
    Cash,
    /// Card / bank transfer - feeds the shift's bank running total.
    Bank,
}

/// A sale order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    /// Local business key (see module docs). Immutable once assigned.
    pub number: String,
    /// Server-assigned id, backfilled after first successful delivery.
    pub server_id: Option<i64>,
    pub status: OrderStatus,
    pub sync_status: SyncStatus,
    pub register_id: String,
    /// Business key of the shift the order was paid under.
    pub shift_number: Option<String>,
    /// Business key of the dining table, when table service is in use.
    pub table_number: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub amount_paid_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns the order total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Recomputes totals from line items:
    /// `subtotal = Σ line.total`, `taxes = Σ line.tax`,
    /// `total = subtotal + taxes - discount`.
    pub fn apply_totals(&mut self, items: &[OrderItem]) {
        self.subtotal_cents = items.iter().map(|i| i.line_total_cents).sum();
        self.tax_cents = items.iter().map(|i| i.tax_cents).sum();
        self.total_cents = self.subtotal_cents + self.tax_cents - self.discount_cents;
    }
}

/// A line item on an order, joined to its parent by business key.
///
/// Product name and unit price are snapshots frozen at the time the line was
/// added, so catalog pulls never rewrite sale history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    /// Parent order's business key - the join key, before and after sync.
    pub order_number: String,
    /// Server catalog id of the product.
    pub product_id: i64,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub tax_rate_bps: i64,
    pub line_total_cents: i64,
    pub tax_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Re-derives the line total and tax from unit price and quantity.
    pub fn rederive(&mut self) {
        let line = Money::from_cents(self.unit_price_cents).times(self.quantity);
        self.line_total_cents = line.cents();
        self.tax_cents = line.tax_at_bps(self.tax_rate_bps as u32).cents();
    }
}

// =============================================================================
// Shift
// =============================================================================

/// The lifecycle of a cash shift: `open -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Open,
    Closed,
}

/// A cash shift on a register.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Shift {
    pub number: String,
    pub server_id: Option<i64>,
    pub status: ShiftStatus,
    pub sync_status: SyncStatus,
    pub register_id: String,
    /// Opening cash float.
    pub initial_cash_cents: i64,
    /// Running totals maintained as orders are paid.
    pub cash_total_cents: i64,
    pub bank_total_cents: i64,
    /// Set at close.
    pub final_cash_cents: Option<i64>,
    pub expected_cash_cents: Option<i64>,
    pub cash_difference_cents: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// One tracked product/material row in the shift's running ledger.
///
/// Beginning balances are seeded at open; refills accumulate during the
/// shift (bounded slots, see [`crate::MAX_REFILL_SLOTS`]); material usage is
/// derived from recipes as cash sales land; the close computes the diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ShiftSummaryRow {
    pub id: String,
    pub shift_number: String,
    /// Server catalog id of the product or material.
    pub item_id: i64,
    pub item_name: String,
    pub unit: String,
    pub is_material: bool,
    pub beg_balance: f64,
    /// JSON array of refill quantities, at most `MAX_REFILL_SLOTS` long.
    pub refills_json: String,
    pub material_usage: f64,
    pub end_balance: Option<f64>,
    pub diff: Option<f64>,
}

impl ShiftSummaryRow {
    /// Decodes the refill slots. An unreadable column is treated as empty
    /// rather than poisoning the close.
    pub fn refills(&self) -> Vec<f64> {
        serde_json::from_str(&self.refills_json).unwrap_or_default()
    }
}

// =============================================================================
// Inventory Entry
// =============================================================================

/// The kind of inventory movement an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Purchase,
    Sale,
    Adjustment,
    Transfer,
    Waste,
    Return,
}

/// An inventory movement. Single state (`recorded`); created whole with its
/// detail lines and never edited afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryEntry {
    pub number: String,
    pub server_id: Option<i64>,
    pub entry_type: EntryType,
    pub sync_status: SyncStatus,
    pub register_id: String,
    pub shift_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One line of an inventory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryEntryDetail {
    pub id: String,
    pub entry_number: String,
    pub server_id: Option<i64>,
    pub item_id: i64,
    pub item_name: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_cost_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Dining Table
// =============================================================================

/// A dining table (restaurant mode). Locally keyed like every other entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DiningTable {
    pub number: String,
    pub server_id: Option<i64>,
    pub name: String,
    pub capacity: i64,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Outbox
// =============================================================================

/// What kind of entity an outbox item replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OutboxEntityType {
    Order,
    OrderItem,
    Shift,
    InventoryEntry,
    InventoryEntryDetail,
    Table,
}

/// What operation the item replays against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OutboxAction {
    Create,
    Update,
    Close,
}

/// An entry in the durable outbox queue.
///
/// Exactly one item is appended per state-changing domain operation that must
/// reach the server, in the same transaction as the entity write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OutboxItem {
    /// Store-assigned, monotonic queue id; drain order.
    pub queue_id: i64,
    pub entity_type: OutboxEntityType,
    pub action: OutboxAction,
    /// Business key of the target entity.
    pub data_id: String,
    /// Snapshot of the fields needed to replay, as JSON.
    pub payload: String,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Incremental Pull
// =============================================================================

/// The server-authoritative reference collections a terminal pulls
/// incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Products,
    Categories,
    Materials,
    Units,
    Recipes,
    Settings,
    Tables,
    DocumentPrefixes,
    InventoryVisibility,
}

impl EntityType {
    /// Every pullable type, in pull order.
    pub const ALL: [EntityType; 9] = [
        EntityType::Products,
        EntityType::Categories,
        EntityType::Materials,
        EntityType::Units,
        EntityType::Recipes,
        EntityType::Settings,
        EntityType::Tables,
        EntityType::DocumentPrefixes,
        EntityType::InventoryVisibility,
    ];

    /// Wire name used in `/sync/check`, `/sync/incremental` and watermarks.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Products => "products",
            EntityType::Categories => "categories",
            EntityType::Materials => "materials",
            EntityType::Units => "units",
            EntityType::Recipes => "recipes",
            EntityType::Settings => "settings",
            EntityType::Tables => "tables",
            EntityType::DocumentPrefixes => "document_prefixes",
            EntityType::InventoryVisibility => "inventory_visibility",
        }
    }

    /// Parses a wire name back into the enum.
    pub fn parse(s: &str) -> Option<EntityType> {
        EntityType::ALL.into_iter().find(|e| e.as_str() == s)
    }

    /// Whether this type is scoped by store id on the server.
    pub const fn store_scoped(&self) -> bool {
        matches!(
            self,
            EntityType::Settings
                | EntityType::Tables
                | EntityType::DocumentPrefixes
                | EntityType::InventoryVisibility
        )
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Reference Records
// =============================================================================

/// A catalog product, server-authoritative, replaced wholesale on pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductRef {
    pub server_id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub price_cents: i64,
    pub tax_rate_bps: i64,
    /// Prepared goods consume materials through recipes when sold.
    pub is_prepared: bool,
    pub track_inventory: bool,
    pub unit: String,
    pub updated_at: DateTime<Utc>,
}

/// A raw material tracked in inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MaterialRef {
    pub server_id: i64,
    pub name: String,
    pub unit: String,
    pub track_inventory: bool,
    pub updated_at: DateTime<Utc>,
}

/// One recipe line: producing `yield_qty` of the product consumes
/// `material_qty` of the material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RecipeLine {
    pub server_id: i64,
    pub product_id: i64,
    pub material_id: i64,
    pub material_name: String,
    pub unit: String,
    pub yield_qty: f64,
    pub material_qty: f64,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(unit_price: i64, qty: i64, bps: i64) -> OrderItem {
        let mut it = OrderItem {
            id: "i1".into(),
            order_number: "FAAA-AAA-B".into(),
            product_id: 1,
            product_name: "Espresso".into(),
            unit_price_cents: unit_price,
            quantity: qty,
            tax_rate_bps: bps,
            line_total_cents: 0,
            tax_cents: 0,
            created_at: Utc::now(),
        };
        it.rederive();
        it
    }

    #[test]
    fn test_item_rederive() {
        let it = item(1000, 3, 825);
        assert_eq!(it.line_total_cents, 3000);
        assert_eq!(it.tax_cents, 248); // 3000 * 8.25%, half-up
    }

    #[test]
    fn test_order_totals() {
        let items = vec![item(1000, 2, 0), item(500, 1, 0)];
        let mut order = Order {
            number: "FAAA-AAA-B".into(),
            server_id: None,
            status: OrderStatus::Draft,
            sync_status: SyncStatus::Pending,
            register_id: "reg-1".into(),
            shift_number: None,
            table_number: None,
            subtotal_cents: 0,
            tax_cents: 0,
            discount_cents: 300,
            total_cents: 0,
            payment_method: None,
            amount_paid_cents: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            paid_at: None,
        };
        order.apply_totals(&items);
        assert_eq!(order.subtotal_cents, 2500);
        assert_eq!(order.tax_cents, 0);
        assert_eq!(order.total_cents, 2200); // subtotal + taxes - discount
    }

    #[test]
    fn test_entity_type_wire_names_round_trip() {
        for entity in EntityType::ALL {
            assert_eq!(EntityType::parse(entity.as_str()), Some(entity));
        }
        assert_eq!(EntityType::parse("nonsense"), None);
    }
}
