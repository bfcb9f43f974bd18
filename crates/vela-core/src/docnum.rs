//! # Offline Document Numbers
//!
//! Produces the human-readable business keys that act as local primary keys
//! for orders, payments, shifts and inventory entries — with no network round
//! trip.
//!
//! ## Number Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Order / Payment (second precision, no sequence)                        │
//! │                                                                         │
//! │    F SAA-AAA - <base36(YYYYMMDDHHMMSS)>                                 │
//! │    └┬ └──┬──┘  └──────────┬──────────┘                                  │
//! │  prefix register     encoded timestamp                                  │
//! │                                                                         │
//! │  Shift / Inventory (day precision + per-day sequence)                   │
//! │                                                                         │
//! │    S SAA-AAA - <base36(YYYYMMDD)><base36(seq, 2)>                       │
//! │                                  └───────┬──────┘                       │
//! │                        atomic (register, kind, day) counter             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! (The spaces above are illustrative; the generated strings contain none.)
//!
//! Two order numbers issued on the same register within the same second are
//! not guaranteed unique — this matches the admin server's expectation of the
//! wire format, so the collision window is accepted rather than hardened.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::base36;
use crate::SEQUENCE_WIDTH;

// =============================================================================
// Document Kinds
// =============================================================================

/// The document families a terminal numbers independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Shift,
    Invoice,
    Inventory,
    Payment,
}

impl DocumentKind {
    /// Hardcoded prefix fallback, used when no synced prefix configuration
    /// exists for the store (bootstrap, or config pull not yet run).
    pub const fn fallback_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Shift => "S",
            DocumentKind::Invoice => "F",
            DocumentKind::Inventory => "E",
            DocumentKind::Payment => "P",
        }
    }

    /// Stable key used to look the prefix up in synced configuration.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Shift => "shift",
            DocumentKind::Invoice => "invoice",
            DocumentKind::Inventory => "inventory",
            DocumentKind::Payment => "payment",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Timestamp Reduction
// =============================================================================

/// Precision at which a timestamp is reduced to an integer by decimal
/// concatenation: `Year` -> `YYYY`, `Second` -> `YYYYMMDDHHMMSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Reduces a timestamp to an integer at the given precision.
///
/// Decimal concatenation keeps the integer ordered the same way as the
/// timestamp, so the base-36 encoding stays sortable.
pub fn reduce_timestamp(ts: DateTime<Utc>, precision: Precision) -> u64 {
    let mut value = ts.year() as u64;
    if precision == Precision::Year {
        return value;
    }
    value = value * 100 + ts.month() as u64;
    if precision == Precision::Month {
        return value;
    }
    value = value * 100 + ts.day() as u64;
    if precision == Precision::Day {
        return value;
    }
    value = value * 100 + ts.hour() as u64;
    if precision == Precision::Hour {
        return value;
    }
    value = value * 100 + ts.minute() as u64;
    if precision == Precision::Minute {
        return value;
    }
    value * 100 + ts.second() as u64
}

/// The day-precision integer key (`YYYYMMDD`) used by sequence counters.
pub fn day_key(ts: DateTime<Utc>) -> u64 {
    reduce_timestamp(ts, Precision::Day)
}

// =============================================================================
// Number Formatting
// =============================================================================

/// Formats an order/payment number: `<prefix><registerCode>-<b36(secondTs)>`.
///
/// No collision-avoidance sequence is appended; see the module docs.
pub fn order_number(prefix: &str, register_code: &str, ts: DateTime<Utc>) -> String {
    let encoded = base36::encode(reduce_timestamp(ts, Precision::Second), 0);
    format!("{prefix}{register_code}-{encoded}")
}

/// Formats a shift/inventory number:
/// `<prefix><registerCode>-<b36(dayTs)><b36(seq, 2)>`.
///
/// The caller obtains `sequence` from the atomic per-(register, kind, day)
/// counter; uniqueness holds as long as generation is single-threaded on the
/// terminal.
pub fn sequenced_number(
    prefix: &str,
    register_code: &str,
    ts: DateTime<Utc>,
    sequence: u64,
) -> String {
    let day = base36::encode(day_key(ts), 0);
    let seq = base36::encode(sequence, SEQUENCE_WIDTH);
    format!("{prefix}{register_code}-{day}{seq}")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 30, 15, 4, 9).unwrap()
    }

    #[test]
    fn test_reduce_timestamp_precisions() {
        let ts = sample_ts();
        assert_eq!(reduce_timestamp(ts, Precision::Year), 2026);
        assert_eq!(reduce_timestamp(ts, Precision::Month), 202608);
        assert_eq!(reduce_timestamp(ts, Precision::Day), 20260830);
        assert_eq!(reduce_timestamp(ts, Precision::Hour), 2026083015);
        assert_eq!(reduce_timestamp(ts, Precision::Minute), 202608301504);
        assert_eq!(reduce_timestamp(ts, Precision::Second), 20260830150409);
    }

    #[test]
    fn test_order_number_shape() {
        let number = order_number("F", "SAA-AAA", sample_ts());
        let (head, encoded) = number.rsplit_once('-').unwrap();
        assert_eq!(head, "FSAA-AAA");
        // Second-precision timestamp, base-36, no embedded sequence
        assert_eq!(
            crate::base36::decode(encoded).unwrap(),
            20260830150409
        );
    }

    #[test]
    fn test_sequenced_number_shape() {
        let number = sequenced_number("S", "SAA-AAA", sample_ts(), 3);
        let (head, tail) = number.rsplit_once('-').unwrap();
        assert_eq!(head, "SSAA-AAA");
        // Last two symbols are the padded sequence
        let (day, seq) = tail.split_at(tail.len() - 2);
        assert_eq!(crate::base36::decode(day).unwrap(), 20260830);
        assert_eq!(crate::base36::decode(seq).unwrap(), 3);
    }

    #[test]
    fn test_same_second_orders_collide_by_design() {
        let ts = sample_ts();
        assert_eq!(
            order_number("F", "SAA-AAA", ts),
            order_number("F", "SAA-AAA", ts)
        );
    }

    #[test]
    fn test_fallback_prefixes() {
        assert_eq!(DocumentKind::Invoice.fallback_prefix(), "F");
        assert_eq!(DocumentKind::Shift.fallback_prefix(), "S");
    }
}
