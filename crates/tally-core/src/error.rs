//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Coarse category every failure maps to          │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── PosError         - What every service returns                     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → PosError → caller                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Kinds
//! | Kind                  | Rollback needed | Example                        |
//! |-----------------------|-----------------|--------------------------------|
//! | Validation            | no              | empty order, bad quantity      |
//! | NotFound              | no              | unknown order id               |
//! | StateConflict         | no              | completing a cancelled order   |
//! | InsufficientResource  | no              | stock or cash shortfall        |
//! | ConcurrencyConflict   | yes             | shift closed by another close  |
//! | System                | yes             | storage failure                |

use serde::Serialize;
use thiserror::Error;

use crate::types::OrderStatus;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of every failure the core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    InsufficientResource,
    ConcurrencyConflict,
    System,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent expected business failures. Programming errors and
/// storage failures never appear here; they surface as `System` in tally-db.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity cannot be found (or is outside the caller's tenant/branch scope).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An order must contain at least one item.
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// The order state machine does not allow the requested move.
    ///
    /// ## When This Occurs
    /// - Adding items to a completed order
    /// - Cancelling a completed order
    /// - Refunding a cancelled or already refunded order
    #[error("Order {order_id} cannot move from {from:?} to {to:?}")]
    InvalidStateTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Insufficient stock to complete the operation.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Order (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 in stock (short by 2)"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Source branch does not hold enough cash.
    #[error("Insufficient cash in branch {branch_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        branch_id: String,
        requested: i64,
        available: i64,
    },

    /// Tendered payments do not cover the order total.
    #[error("Payment of {tendered} does not cover order total {required}")]
    PaymentInsufficient { required: i64, tendered: i64 },

    /// Tendered payments exceed the anti-typo overpayment guard.
    #[error("Payment of {tendered} exceeds the allowed maximum of {limit}")]
    OverpaymentLimit { limit: i64, tendered: i64 },

    /// Customer credit tender would exceed the customer's credit limit.
    #[error("Credit limit exceeded for customer {customer_id}: limit {limit}, requested {requested}")]
    CreditLimitExceeded {
        customer_id: String,
        limit: i64,
        requested: i64,
    },

    /// The acting user has no open shift at the acting branch.
    #[error("No open shift for this user at this branch")]
    NoOpenShift,

    /// The acting user already has an open shift at the acting branch.
    #[error("Shift {shift_id} is already open")]
    ShiftAlreadyOpen { shift_id: String },

    /// The shift is closed and cannot be changed this way.
    #[error("Shift {shift_id} is closed")]
    ShiftClosed { shift_id: String },

    /// The shift has already been reconciled.
    #[error("Shift {shift_id} has already been reconciled")]
    ShiftAlreadyReconciled { shift_id: String },

    /// Optimistic concurrency check failed; the caller must refresh.
    #[error("{entity} {id} was modified by another request, refresh and retry")]
    ConcurrencyConflict { entity: String, id: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a ConcurrencyConflict error.
    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::ConcurrencyConflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns the coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::EmptyOrder => ErrorKind::Validation,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InvalidStateTransition { .. }
            | CoreError::NoOpenShift
            | CoreError::ShiftAlreadyOpen { .. }
            | CoreError::ShiftClosed { .. }
            | CoreError::ShiftAlreadyReconciled { .. } => ErrorKind::StateConflict,
            CoreError::InsufficientStock { .. }
            | CoreError::InsufficientBalance { .. }
            | CoreError::PaymentInsufficient { .. }
            | CoreError::OverpaymentLimit { .. }
            | CoreError::CreditLimitExceeded { .. } => ErrorKind::InsufficientResource,
            CoreError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before any write is attempted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value breaks a business rule tied to a specific item.
    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ValidationError {
    /// Creates an `Invalid` error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Required` error.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            requested: 5,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p-1: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("reason");
        assert_eq!(err.to_string(), "reason is required");

        let err = ValidationError::invalid("items[0].quantity", "exceeds refundable quantity 1");
        assert_eq!(
            err.to_string(),
            "items[0].quantity: exceeds refundable quantity 1"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("sku").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(CoreError::EmptyOrder.kind(), ErrorKind::Validation);
        assert_eq!(CoreError::not_found("Order", "x").kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::NoOpenShift.kind(), ErrorKind::StateConflict);
        assert_eq!(
            CoreError::PaymentInsufficient {
                required: 100,
                tendered: 50
            }
            .kind(),
            ErrorKind::InsufficientResource
        );
        assert_eq!(
            CoreError::conflict("Shift", "s-1").kind(),
            ErrorKind::ConcurrencyConflict
        );
    }
}
