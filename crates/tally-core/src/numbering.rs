//! # Business Numbers
//!
//! Human-readable keys that sit next to the UUID ids.
//!
//! ```text
//! order:   ORD-20260315-7K2QX9      date + random suffix
//! return:  RET-20260316-A01BC3
//! ledger:  CSH-2026-0042            per tenant, reset every calendar year
//! ```

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

/// Builds an order number: `{prefix}-{YYYYMMDD}-{6 random chars}`.
///
/// Collisions are possible but negligible; the column is unique so a
/// collision fails the insert instead of producing two equal numbers.
pub fn order_number(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix)
}

/// Formats a cash-ledger number.
///
/// ```rust
/// use tally_core::numbering::ledger_number;
///
/// assert_eq!(ledger_number("CSH", 2026, 7), "CSH-2026-0007");
/// assert_eq!(ledger_number("CSH", 2026, 12345), "CSH-2026-12345");
/// ```
pub fn ledger_number(prefix: &str, year: i32, seq: u32) -> String {
    format!("{}-{}-{:04}", prefix, year, seq)
}

/// Extracts the sequence from a ledger number of the given prefix and year.
///
/// Returns `None` for numbers that belong to another prefix or year, or that
/// do not parse.
pub fn parse_ledger_sequence(number: &str, prefix: &str, year: i32) -> Option<u32> {
    let head = format!("{}-{}-", prefix, year);
    number.strip_prefix(&head)?.parse().ok()
}

/// Next ledger number given the last number issued this year, if any.
pub fn next_ledger_number(prefix: &str, at: DateTime<Utc>, last: Option<&str>) -> String {
    let year = at.year();
    let next = last
        .and_then(|n| parse_ledger_sequence(n, prefix, year))
        .map(|seq| seq + 1)
        .unwrap_or(1);
    ledger_number(prefix, year, next)
}
