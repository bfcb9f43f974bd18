//! # Shift Ledger Arithmetic
//!
//! Pure math behind the shift summary: refill accumulation, recipe-based
//! material consumption, and the closing reconciliation.
//!
//! ## The Closing Equation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CASH                                                                   │
//! │    expected   = initial_cash + cash_sales                               │
//! │    difference = expected - final_cash     (positive = cash missing)     │
//! │                                                                         │
//! │  PRODUCTS                                                               │
//! │    diff = beg_balance + Σrefills - end_balance                          │
//! │                                                                         │
//! │  MATERIALS                                                              │
//! │    diff = beg_balance + Σrefills - material_usage - end_balance         │
//! │                                                                         │
//! │  RECIPE USAGE (per recipe line, per cash sale of a prepared product)    │
//! │    usage = (sold_qty / yield_qty) * material_qty                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::money::Money;
use crate::types::RecipeLine;
use crate::MAX_REFILL_SLOTS;

// =============================================================================
// Refills
// =============================================================================

/// Appends a refill quantity to a bounded slot list.
///
/// The closing screen shows `MAX_REFILL_SLOTS` columns; once they are full,
/// further replenishments are accumulated into the last slot rather than
/// dropped, so `Σrefills` stays correct.
pub fn append_refill(slots: &mut Vec<f64>, quantity: f64) {
    if slots.len() < MAX_REFILL_SLOTS {
        slots.push(quantity);
    } else if let Some(last) = slots.last_mut() {
        *last += quantity;
    }
}

// =============================================================================
// Recipe Usage
// =============================================================================

/// Material consumption caused by selling `sold_qty` of a prepared product,
/// per recipe line: `usage = (sold_qty / yield_qty) * material_qty`.
///
/// A zero or negative yield would divide the ledger into nonsense; such
/// lines contribute nothing.
pub fn recipe_usage(line: &RecipeLine, sold_qty: f64) -> f64 {
    if line.yield_qty <= 0.0 {
        return 0.0;
    }
    (sold_qty / line.yield_qty) * line.material_qty
}

// =============================================================================
// Close Arithmetic
// =============================================================================

/// Cash reconciliation computed when the shift closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashClose {
    pub expected_cents: i64,
    pub difference_cents: i64,
}

/// `expected = initial + cash_sales`, `difference = expected - final`.
pub fn close_cash(initial: Money, cash_sales: Money, final_cash: Money) -> CashClose {
    let expected = initial + cash_sales;
    CashClose {
        expected_cents: expected.cents(),
        difference_cents: (expected - final_cash).cents(),
    }
}

/// Per-item closing diff.
///
/// `material_usage` is zero for plain products, so the single formula covers
/// both cases: `beg + Σrefills - usage - end`.
pub fn close_item_diff(
    beg_balance: f64,
    refills: &[f64],
    material_usage: f64,
    end_balance: f64,
) -> f64 {
    beg_balance + refills.iter().sum::<f64>() - material_usage - end_balance
}

/// Whether a summary row should be pruned from the closed shift.
///
/// Rows with no beginning balance, no ending balance, no refills, no usage
/// and no inventory-entry activity during the shift carry no information and
/// are dropped from the closed summary.
pub fn is_prunable(
    beg_balance: f64,
    refills: &[f64],
    material_usage: f64,
    end_balance: Option<f64>,
    had_entry_activity: bool,
) -> bool {
    beg_balance == 0.0
        && refills.is_empty()
        && material_usage == 0.0
        && end_balance.unwrap_or(0.0) == 0.0
        && !had_entry_activity
}

// =============================================================================
// Unit Tests
// =============================================================================
