//! # tally-core: Pure Business Logic for Tally POS
//!
//! Everything about orders, ledgers, and refunds that can be decided without
//! touching storage lives here, as pure functions over plain data.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              API layer (out of this workspace)                  │   │
//! │  │    create_order, complete_order, refund_order, close_shift ...  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (services)                          │   │
//! │  │  OrderService ─► StockLedger + CashLedger + CustomerStats       │   │
//! │  │  ShiftService ─► CashLedger                                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌────────┐ ┌────────┐  │   │
//! │  │   │  money  │ │ pricing │ │ lifecycle │ │ refund │ │  cash  │  │   │
//! │  │   │  Money  │ │ totals  │ │  states   │ │  plan  │ │  signs │  │   │
//! │  │   └─────────┘ └─────────┘ └───────────┘ └────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, OrderItem, Shift, CashLedgerEntry, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Line and order totals, tax resolution
//! - [`lifecycle`] - Order state machine
//! - [`settlement`] - Tenders to paid/change/cash amounts
//! - [`refund`] - Proportional refund planning
//! - [`cash`] - Cash movement sign table
//! - [`numbering`] - Order and ledger numbers
//! - [`clock`] - Injectable time source
//! - [`context`] - Acting tenant/branch/user
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::types::TaxRate;
//!
//! // 200.00 net at 14% is 28.00 tax
//! let net = Money::from_cents(20000);
//! let tax = net.calculate_tax(TaxRate::from_bps(1400));
//! assert_eq!(tax.cents(), 2800);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod clock;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod numbering;
pub mod pricing;
pub mod refund;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::TenantContext;
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use refund::{RefundPlan, RefundSelection};
pub use settlement::{Settlement, Tender};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines on one order.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Catches typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of refund, cancel, adjustment, and variance reasons.
pub const MAX_REASON_LENGTH: usize = 500;

/// Tendered total may not exceed this many basis points of the order total.
pub const DEFAULT_MAX_OVERPAYMENT_RATIO_BPS: u32 = 20_000;
