//! # Customer Stats Updater
//!
//! Order count, total spent, loyalty points and outstanding credit. Runs only
//! inside the caller's transaction; it never opens one.
//!
//! Points are `floor(amount in whole units) × points_per_unit`. A refund
//! removes the points the refunded amount would have earned, so a sale
//! refunded in parts can leave a point or two behind; counters never go
//! below zero.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use tally_core::{CoreError, Customer, Money};

use crate::error::PosResult;
use crate::repository::customer;

fn ensure_customer(rows: u64, customer_id: &str) -> PosResult<()> {
    if rows == 0 {
        return Err(CoreError::not_found("Customer", customer_id).into());
    }
    Ok(())
}

/// Points earned by `amount`.
pub fn loyalty_points(amount: Money, points_per_unit: i64) -> i64 {
    amount.whole_units_floor() * points_per_unit.max(0)
}

/// Fails with `CreditLimitExceeded` when charging `amount` to the customer's
/// account would take it past the limit.
pub fn ensure_credit_available(customer: &Customer, amount: Money) -> Result<(), CoreError> {
    let requested = customer.outstanding_balance_cents + amount.cents();
    if requested > customer.credit_limit_cents {
        return Err(CoreError::CreditLimitExceeded {
            customer_id: customer.id.clone(),
            limit: customer.credit_limit_cents,
            requested,
        });
    }
    Ok(())
}

/// Adds a completed sale to the customer's counters.
pub(crate) async fn record_sale(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
    total: Money,
    points_per_unit: i64,
    now: DateTime<Utc>,
) -> PosResult<()> {
    let points = loyalty_points(total, points_per_unit);
    let rows = customer::add_sale(conn, tenant_id, customer_id, total.cents().max(0), points, now).await?;
    ensure_customer(rows, customer_id)?;
    debug!(customer_id, spent_cents = total.cents(), points, "Customer stats updated");
    Ok(())
}

/// Takes a refund back out of the customer's counters.
///
/// The order count only drops when the sale is fully refunded.
pub(crate) async fn record_refund(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
    refund: Money,
    points_per_unit: i64,
    fully_refunded: bool,
    now: DateTime<Utc>,
) -> PosResult<()> {
    let points = loyalty_points(refund, points_per_unit);
    let orders = i64::from(fully_refunded);
    let rows = customer::subtract_refund(
        conn,
        tenant_id,
        customer_id,
        refund.cents().max(0),
        points,
        orders,
        now,
    )
    .await?;
    ensure_customer(rows, customer_id)?;
    debug!(customer_id, refunded_cents = refund.cents(), points, orders, "Customer stats reduced");
    Ok(())
}

/// Charges a credit tender to the customer's account.
pub(crate) async fn charge_credit(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
    amount: Money,
    now: DateTime<Utc>,
) -> PosResult<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let rows = customer::adjust_outstanding(conn, tenant_id, customer_id, amount.cents(), now).await?;
    ensure_customer(rows, customer_id)
}

/// Releases refunded credit back to the customer.
pub(crate) async fn release_credit(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
    amount: Money,
    now: DateTime<Utc>,
) -> PosResult<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let rows = customer::adjust_outstanding(conn, tenant_id, customer_id, -amount.cents(), now).await?;
    ensure_customer(rows, customer_id)
}
