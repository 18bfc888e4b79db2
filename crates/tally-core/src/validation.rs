//! # Validation Module
//!
//! Input validation run before any write is attempted.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure)                                           │
//! │  ├── quantities, amounts, reasons, tax rates, ids                      │
//! │  └── fails fast, nothing to roll back                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: tally-db services                                            │
//! │  ├── scope checks (tenant, branch, open shift)                         │
//! │  └── stock / balance / credit checks inside the transaction            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE (open shift per user, ledger sequence per branch)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_quantity, validate_reason};
//!
//! validate_quantity(5).unwrap();
//! assert!(validate_reason("reason", "  ").is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_ITEMS, MAX_REASON_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a free-text reason (refund, cancel, adjustment, variance).
///
/// ## Returns
/// The trimmed reason.
pub fn validate_reason(field: &str, reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required(field));
    }

    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(reason.to_string())
}

/// Validates an optional reason, treating blank as absent.
pub fn validate_optional_reason(field: &str, reason: Option<&str>) -> ValidationResult<Option<String>> {
    match reason.map(str::trim) {
        None | Some("") => Ok(None),
        Some(r) => validate_reason(field, r).map(Some),
    }
}

/// Validates a document prefix such as `CSH` or `ORD`.
///
/// ## Rules
/// - 1 to 8 characters
/// - ASCII uppercase letters and digits only
pub fn validate_prefix(field: &str, prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() {
        return Err(ValidationError::required(field));
    }
    if prefix.len() > 8 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 8,
        });
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only uppercase letters and digits".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ```text
/// validate_quantity(qty)
///       ├── qty <= 0?   → "quantity must be positive"
///       ├── qty > 999?  → "quantity must be between 1 and 999"
///       └── OK
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a non-negative amount in cents (discounts, floats, counts).
///
/// ```rust
/// use tally_core::validation::validate_non_negative_cents;
///
/// assert!(validate_non_negative_cents("discount", 0).is_ok());
/// assert!(validate_non_negative_cents("discount", -1).is_err());
/// ```
pub fn validate_non_negative_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a strictly positive amount in cents.
pub fn validate_positive_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of distinct lines on an order.
pub fn validate_order_size(lines: usize) -> ValidationResult<()> {
    if lines > MAX_ORDER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
