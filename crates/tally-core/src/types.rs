//! # Domain Types
//!
//! Core domain types used throughout Tally POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog (read-only here)      Ledgers (append-only)                   │
//! │  ┌──────────┐ ┌──────────┐     ┌─────────────────┐ ┌───────────────┐   │
//! │  │ Tenant   │ │ Branch   │     │ CashLedgerEntry │ │ StockMovement │   │
//! │  │ Product  │ │ Customer │     │ before → after  │ │ before → after│   │
//! │  └──────────┘ └──────────┘     └─────────────────┘ └───────────────┘   │
//! │                                                                         │
//! │  Orders                         Sessions                               │
//! │  ┌──────────┐ ┌──────────┐     ┌──────────┐  ┌────────────┐            │
//! │  │  Order   │ │OrderItem │     │  Shift   │  │ RefundLog  │            │
//! │  │ Payment  │ │ snapshot │     │ version  │  │ audit JSON │            │
//! │  └──────────┘ └──────────┘     └──────────┘  └────────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, order_number, ledger number) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1400 bps = 14%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Catalog: Tenant, Branch, Product, Customer
// =============================================================================

/// A tenant (retail company). Owns tax and stock policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// When false, every item is taxed at zero regardless of product rates.
    pub tax_enabled: bool,
    /// Default tax rate for products without their own rate.
    pub default_tax_rate_bps: u32,
    /// Allow stock to go below zero on sale.
    pub allow_negative_stock: bool,
    pub currency_code: String,
    pub created_at: DateTime<Utc>,
}

/// A physical store belonging to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Branch {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub address: Option<String>,
    pub currency_code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this product belongs to.
    pub tenant_id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Net price in cents (tax is always added on top).
    pub price_cents: i64,

    /// Cost in cents (for margin reporting).
    pub cost_cents: Option<i64>,

    /// Product-specific tax rate; `None` inherits the tenant default.
    pub tax_rate_bps: Option<u32>,

    /// Whether to track inventory for this product.
    pub track_inventory: bool,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// A loyalty customer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Completed sale orders attributed to this customer.
    pub total_orders: i64,
    pub total_spent_cents: i64,
    pub loyalty_points: i64,
    /// Maximum outstanding store credit.
    pub credit_limit_cents: i64,
    /// Store credit currently owed by the customer.
    pub outstanding_balance_cents: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Order Status & Type
// =============================================================================

/// The status of an order.
///
/// ```text
/// Draft ──► Pending ──► Completed ──► PartiallyRefunded ──► Refunded
///   │          │            │                 ▲  │
///   │          ▼            └─────────────────┼──┴──────────► Refunded
///   └──────► Cancelled                        └─ (repeat)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order is in progress (items being added).
    Draft,
    /// Order is parked awaiting payment.
    Pending,
    /// Order has been paid and finalized.
    Completed,
    /// Order was abandoned before payment (terminal).
    Cancelled,
    /// Some units have been refunded.
    PartiallyRefunded,
    /// Every unit has been refunded (terminal).
    Refunded,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Draft
    }
}

/// Whether an order is a sale or a synthetic return produced by a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Sale,
    Return,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment. The only tender that touches the cash ledger.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Bank transfer / instant payment.
    BankTransfer,
    /// Store credit charged to the customer's account.
    CustomerCredit,
}

impl PaymentMethod {
    /// Returns true for physical cash.
    #[inline]
    pub fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A sale or a return.
///
/// ## Arithmetic Invariant
/// `total = Σ item.total − discount + service_charge`, every term already
/// rounded to cents.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    /// Shift the order belongs to. Return orders created without an open
    /// shift carry `None`.
    pub shift_id: Option<String>,
    pub order_number: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub customer_id: Option<String>,

    /// Σ item.subtotal (net of item discounts, before tax).
    pub subtotal_cents: i64,
    /// Σ item.tax.
    pub tax_cents: i64,
    /// Order-level discount.
    pub discount_cents: i64,
    /// Order-level service charge.
    pub service_charge_cents: i64,
    pub total_cents: i64,

    /// Amount applied to the order (equals total once completed).
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
    /// Change handed back in cash.
    pub change_cents: i64,
    /// Portion of the total settled in cash (tendered cash minus change).
    pub cash_paid_cents: i64,
    /// Portion of the total charged to customer credit.
    pub credit_paid_cents: i64,
    /// Cumulative refunded amount. Never exceeds `total_cents`.
    pub refund_amount_cents: i64,

    /// Branch snapshot at creation.
    pub branch_name: String,
    pub branch_address: Option<String>,
    pub currency_code: String,

    /// For return orders: the sale being refunded.
    pub original_order_id: Option<String>,
    pub notes: Option<String>,

    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,
    #[ts(as = "Option<String>")]
    pub refunded_at: Option<DateTime<Utc>>,
    pub refunded_by: Option<String>,
    pub refund_reason: Option<String>,
}

impl Order {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Returns the cumulative refunded amount as Money.
    #[inline]
    pub fn refunded(&self) -> Money {
        Money::from_cents(self.refund_amount_cents)
    }
}

// =============================================================================
// Order Item
// =============================================================================

/// A line item in an order.
/// Uses snapshot pattern to freeze product data at time of sale.
///
/// ## Arithmetic Invariant
/// `subtotal = unit_price × quantity − discount`,
/// `tax = round(subtotal × rate)`, `total = subtotal + tax`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Barcode at time of sale (frozen).
    pub barcode_snapshot: Option<String>,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// Resolved tax rate at time of sale (frozen).
    pub tax_rate_bps: u32,
    /// Line discount.
    pub discount_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    /// Units of this line already refunded.
    pub refunded_quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the line total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Units that can still be refunded.
    #[inline]
    pub fn refundable_quantity(&self) -> i64 {
        self.quantity - self.refunded_quantity
    }
}

// =============================================================================
// Payment
// =============================================================================

/// One tender applied to an order. Written only at completion.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    /// Amount tendered in cents.
    pub amount_cents: i64,
    /// External reference (card auth code, transfer id, etc.).
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Shift
// =============================================================================

/// One cashier working session at one branch.
///
/// `version` is the optimistic concurrency token: every write to a shift
/// is `... WHERE version = ?` and increments it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub user_id: String,
    pub opening_balance_cents: i64,
    pub closing_balance_cents: Option<i64>,
    pub expected_balance_cents: Option<i64>,
    pub difference_cents: Option<i64>,
    pub total_orders: i64,
    pub total_cash_cents: i64,
    pub total_card_cents: i64,
    pub is_closed: bool,
    pub force_closed: bool,
    pub version: i64,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    pub notes: Option<String>,
    pub reconciled_balance_cents: Option<i64>,
    pub variance_cents: Option<i64>,
    pub variance_reason: Option<String>,
    #[ts(as = "Option<String>")]
    pub reconciled_at: Option<DateTime<Utc>>,
    pub reconciled_by: Option<String>,
}

// =============================================================================
// Cash Ledger
// =============================================================================

/// Kind of cash movement.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashTransactionType {
    Opening,
    Sale,
    Refund,
    Deposit,
    Withdrawal,
    Adjustment,
    Transfer,
    Expense,
    SupplierPayment,
}

/// One atomic cash movement.
///
/// For a branch, entries form a chain:
/// `entry(n).balance_before == entry(n-1).balance_after`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashLedgerEntry {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub shift_id: Option<String>,
    /// Human-readable number, `CSH-2026-0001`.
    pub number: String,
    /// Position in the branch chain, starting at 1.
    pub branch_seq: i64,
    pub transaction_type: CashTransactionType,
    /// Signed by type: positive adds to the drawer, negative removes.
    pub amount_cents: i64,
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    /// For transfers: id of the paired entry in the other branch.
    pub transfer_ref_id: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// What caused a stock movement.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockReferenceType {
    Sale,
    Refund,
    Adjustment,
    Initial,
}

/// One immutable quantity change.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub product_id: String,
    pub delta: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference_type: StockReferenceType,
    pub reference_id: Option<String>,
    pub reason: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Refund Log
// =============================================================================

/// One restored product line, as recorded in the refund audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockChange {
    pub product_id: String,
    pub quantity: i64,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// Audit record of one refund operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RefundLog {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub original_order_id: String,
    pub return_order_id: String,
    pub refund_amount_cents: i64,
    pub reason: Option<String>,
    /// JSON array of [`StockChange`].
    pub stock_changes: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl RefundLog {
    /// Decodes the serialized stock-change audit list.
    pub fn stock_changes(&self) -> Result<Vec<StockChange>, serde_json::Error> {
        serde_json::from_str(&self.stock_changes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
