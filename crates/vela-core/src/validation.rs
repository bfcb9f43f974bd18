//! # Validation Module
//!
//! Business rule validation for domain operations. The repositories call
//! these before touching the store, so an invalid open/close request never
//! reaches a transaction.
//!
//! Sync problems are NOT validation problems: a domain operation that passes
//! validation always succeeds locally, whatever the network is doing.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::types::{Order, OrderStatus, ShiftStatus};

// =============================================================================
// Order Rules
// =============================================================================

/// A draft is the only editable order state.
pub fn validate_order_editable(order: &Order) -> CoreResult<()> {
    if order.status != OrderStatus::Draft {
        return Err(CoreError::InvalidTransition {
            entity: "order",
            from: format!("{:?}", order.status).to_lowercase(),
            to: "edited".into(),
        });
    }
    Ok(())
}

/// Line quantities must be positive; zero means "remove the line" and goes
/// through the remove operation instead.
pub fn validate_quantity(quantity: i64) -> CoreResult<()> {
    if quantity <= 0 {
        return Err(CoreError::validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

/// Paying requires a non-empty draft and an amount covering the total.
pub fn validate_payment(order: &Order, item_count: usize, amount_paid_cents: i64) -> CoreResult<()> {
    validate_order_editable(order)?;
    if item_count == 0 {
        return Err(CoreError::validation("cannot pay an empty order"));
    }
    if amount_paid_cents < order.total_cents {
        return Err(CoreError::validation(format!(
            "amount paid {} is below order total {}",
            amount_paid_cents, order.total_cents
        )));
    }
    Ok(())
}

// =============================================================================
// Shift Rules
// =============================================================================

/// A beginning or ending balance for one tracked item.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BalanceInput {
    pub item_id: i64,
    pub item_name: String,
    pub unit: String,
    pub is_material: bool,
    pub quantity: f64,
}

/// Opening requires a non-negative float and no duplicated tracked item.
pub fn validate_open_shift(initial_cash_cents: i64, balances: &[BalanceInput]) -> CoreResult<()> {
    if initial_cash_cents < 0 {
        return Err(CoreError::validation("initial cash cannot be negative"));
    }

    let mut seen = HashSet::new();
    for b in balances {
        if b.quantity < 0.0 {
            return Err(CoreError::validation(format!(
                "beginning balance for '{}' cannot be negative",
                b.item_name
            )));
        }
        if !seen.insert((b.item_id, b.unit.clone())) {
            return Err(CoreError::validation(format!(
                "duplicate beginning balance for '{}' ({})",
                b.item_name, b.unit
            )));
        }
    }
    Ok(())
}

/// Closing requires the shift to be open, a final cash count, and an ending
/// balance for every tracked row.
pub fn validate_close_shift(
    status: ShiftStatus,
    final_cash_cents: i64,
    tracked_item_ids: &[i64],
    ending_balance_ids: &[i64],
) -> CoreResult<()> {
    if status != ShiftStatus::Open {
        return Err(CoreError::InvalidTransition {
            entity: "shift",
            from: "closed".into(),
            to: "closed".into(),
        });
    }
    if final_cash_cents < 0 {
        return Err(CoreError::validation("final cash cannot be negative"));
    }

    let provided: HashSet<i64> = ending_balance_ids.iter().copied().collect();
    for id in tracked_item_ids {
        if !provided.contains(id) {
            return Err(CoreError::validation(format!(
                "missing ending balance for tracked item {id}"
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
