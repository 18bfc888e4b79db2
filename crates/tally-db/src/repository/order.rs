//! # Order Repository
//!
//! SQL for orders, order items, payments and refund logs.
//!
//! Every function takes a `&mut SqliteConnection` so it can run inside the
//! transaction the Order Lifecycle Engine owns. Status changes are guarded by
//! the status the caller read (`WHERE status = ?`); a return value of `0`
//! rows means another writer moved the order first.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use tally_core::pricing::{LineAmounts, OrderTotals};
use tally_core::{Order, OrderItem, OrderStatus, Payment, RefundLog, Settlement};

use crate::error::DbResult;

const ORDER_COLUMNS: &str = r#"
    id, tenant_id, branch_id, shift_id, order_number, order_type, status, customer_id,
    subtotal_cents, tax_cents, discount_cents, service_charge_cents, total_cents,
    amount_paid_cents, amount_due_cents, change_cents, cash_paid_cents, credit_paid_cents,
    refund_amount_cents, branch_name, branch_address, currency_code,
    original_order_id, notes, created_by, created_at, updated_at, completed_at,
    cancelled_at, cancelled_by, cancel_reason, refunded_at, refunded_by, refund_reason
"#;

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, name_snapshot, sku_snapshot, barcode_snapshot,
    unit_price_cents, quantity, tax_rate_bps, discount_cents,
    subtotal_cents, tax_cents, total_cents, refunded_quantity, created_at
"#;

const PAYMENT_COLUMNS: &str = "id, order_id, method, amount_cents, reference, created_at";

const REFUND_LOG_COLUMNS: &str = r#"
    id, tenant_id, branch_id, original_order_id, return_order_id,
    refund_amount_cents, reason, stock_changes, created_by, created_at
"#;

// =============================================================================
// Orders
// =============================================================================

pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(id = %order.id, order_number = %order.order_number, "Inserting order");

    let sql = format!(
        "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22,
            ?23, ?24, ?25, ?26, ?27, ?28,
            ?29, ?30, ?31, ?32, ?33, ?34
        )"
    );
    sqlx::query(&sql)
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.branch_id)
        .bind(&order.shift_id)
        .bind(&order.order_number)
        .bind(order.order_type)
        .bind(order.status)
        .bind(&order.customer_id)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.discount_cents)
        .bind(order.service_charge_cents)
        .bind(order.total_cents)
        .bind(order.amount_paid_cents)
        .bind(order.amount_due_cents)
        .bind(order.change_cents)
        .bind(order.cash_paid_cents)
        .bind(order.credit_paid_cents)
        .bind(order.refund_amount_cents)
        .bind(&order.branch_name)
        .bind(&order.branch_address)
        .bind(&order.currency_code)
        .bind(&order.original_order_id)
        .bind(&order.notes)
        .bind(&order.created_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(&order.cancelled_by)
        .bind(&order.cancel_reason)
        .bind(order.refunded_at)
        .bind(&order.refunded_by)
        .bind(&order.refund_reason)
        .execute(conn)
        .await?;

    Ok(())
}

/// Loads an order scoped to its tenant.
pub async fn find_order(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    order_id: &str,
) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = ?1 AND id = ?2");
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Orders tagged with a shift, oldest first.
pub async fn list_by_shift(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> DbResult<Vec<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE tenant_id = ?1 AND shift_id = ?2
         ORDER BY created_at, rowid"
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// Return orders produced from `original_order_id`, oldest first.
pub async fn list_returns(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    original_order_id: &str,
) -> DbResult<Vec<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE tenant_id = ?1 AND original_order_id = ?2
         ORDER BY created_at, rowid"
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(tenant_id)
        .bind(original_order_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// Writes recomputed totals onto a Draft order.
pub async fn update_totals(
    conn: &mut SqliteConnection,
    order_id: &str,
    totals: &OrderTotals,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            subtotal_cents = ?1,
            tax_cents = ?2,
            discount_cents = ?3,
            service_charge_cents = ?4,
            total_cents = ?5,
            amount_due_cents = ?5,
            updated_at = ?6
        WHERE id = ?7 AND status = 'draft'
        "#,
    )
    .bind(totals.subtotal.cents())
    .bind(totals.tax.cents())
    .bind(totals.discount.cents())
    .bind(totals.service_charge.cents())
    .bind(totals.total.cents())
    .bind(now)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Moves an order between two non-terminal, non-settling statuses.
pub async fn set_status(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
    )
    .bind(to)
    .bind(now)
    .bind(order_id)
    .bind(from)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Stamps settlement amounts and moves the order to Completed.
pub async fn mark_completed(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
    settlement: &Settlement,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = 'completed',
            amount_paid_cents = ?1,
            amount_due_cents = ?2,
            change_cents = ?3,
            cash_paid_cents = ?4,
            credit_paid_cents = ?5,
            completed_at = ?6,
            updated_at = ?6
        WHERE id = ?7 AND status = ?8
        "#,
    )
    .bind(settlement.amount_paid.cents())
    .bind(settlement.amount_due.cents())
    .bind(settlement.change.cents())
    .bind(settlement.cash_paid.cents())
    .bind(settlement.credit_paid.cents())
    .bind(now)
    .bind(order_id)
    .bind(from)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn mark_cancelled(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
    cancelled_by: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = 'cancelled',
            cancelled_at = ?1,
            cancelled_by = ?2,
            cancel_reason = ?3,
            updated_at = ?1
        WHERE id = ?4 AND status = ?5
        "#,
    )
    .bind(now)
    .bind(cancelled_by)
    .bind(reason)
    .bind(order_id)
    .bind(from)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Accumulates a refund onto the original sale.
#[allow(clippy::too_many_arguments)]
pub async fn record_refund(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    refund_amount_cents: i64,
    refunded_by: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = ?1,
            refund_amount_cents = refund_amount_cents + ?2,
            refunded_at = ?3,
            refunded_by = ?4,
            refund_reason = COALESCE(?5, refund_reason),
            updated_at = ?3
        WHERE id = ?6 AND status = ?7
        "#,
    )
    .bind(to)
    .bind(refund_amount_cents)
    .bind(now)
    .bind(refunded_by)
    .bind(reason)
    .bind(order_id)
    .bind(from)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Completed-sale figures for a shift: `(orders, cash_cents, card_cents)`.
///
/// Cash is what stayed in the drawer (`cash_paid`), card is the sum of card
/// tenders. Refunds do not reduce these totals; they are cash-ledger entries.
pub async fn shift_sales_totals(
    conn: &mut SqliteConnection,
    shift_id: &str,
) -> DbResult<(i64, i64, i64)> {
    let totals: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(o.cash_paid_cents), 0),
            COALESCE(SUM((
                SELECT COALESCE(SUM(p.amount_cents), 0)
                FROM payments p
                WHERE p.order_id = o.id AND p.method = 'card'
            )), 0)
        FROM orders o
        WHERE o.shift_id = ?1
          AND o.order_type = 'sale'
          AND o.status IN ('completed', 'partially_refunded', 'refunded')
        "#,
    )
    .bind(shift_id)
    .fetch_one(conn)
    .await?;
    Ok(totals)
}

// =============================================================================
// Order Items
// =============================================================================

pub async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
    debug!(order_id = %item.order_id, product_id = %item.product_id, "Adding order item");

    let sql = format!(
        "INSERT INTO order_items ({ITEM_COLUMNS}) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15
        )"
    );
    sqlx::query(&sql)
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(&item.sku_snapshot)
        .bind(&item.barcode_snapshot)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.tax_rate_bps)
        .bind(item.discount_cents)
        .bind(item.subtotal_cents)
        .bind(item.tax_cents)
        .bind(item.total_cents)
        .bind(item.refunded_quantity)
        .bind(item.created_at)
        .execute(conn)
        .await?;

    Ok(())
}

/// Items of an order in insertion order.
pub async fn list_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ?1 ORDER BY rowid");
    let items = sqlx::query_as::<_, OrderItem>(&sql)
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Replaces quantity and line amounts of a Draft item.
pub async fn update_item_amounts(
    conn: &mut SqliteConnection,
    item_id: &str,
    quantity: i64,
    amounts: &LineAmounts,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE order_items SET
            quantity = ?1,
            subtotal_cents = ?2,
            tax_cents = ?3,
            total_cents = ?4
        WHERE id = ?5
        "#,
    )
    .bind(quantity)
    .bind(amounts.subtotal.cents())
    .bind(amounts.tax.cents())
    .bind(amounts.total.cents())
    .bind(item_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_item(conn: &mut SqliteConnection, order_id: &str, item_id: &str) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM order_items WHERE id = ?1 AND order_id = ?2")
        .bind(item_id)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Sets `refunded_quantity`, guarded by the value the refund plan was built on.
pub async fn set_refunded_quantity(
    conn: &mut SqliteConnection,
    item_id: &str,
    before: i64,
    after: i64,
) -> DbResult<u64> {
    let result = sqlx::query(
        "UPDATE order_items SET refunded_quantity = ?1 WHERE id = ?2 AND refunded_quantity = ?3",
    )
    .bind(after)
    .bind(item_id)
    .bind(before)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Payments
// =============================================================================

pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(order_id = %payment.order_id, method = ?payment.method, amount = payment.amount_cents, "Adding payment");

    let sql = format!("INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)");
    sqlx::query(&sql)
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn list_payments(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<Payment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = ?1 ORDER BY rowid");
    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

// =============================================================================
// Refund Logs
// =============================================================================

pub async fn insert_refund_log(conn: &mut SqliteConnection, log: &RefundLog) -> DbResult<()> {
    let sql = format!(
        "INSERT INTO refund_logs ({REFUND_LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    );
    sqlx::query(&sql)
        .bind(&log.id)
        .bind(&log.tenant_id)
        .bind(&log.branch_id)
        .bind(&log.original_order_id)
        .bind(&log.return_order_id)
        .bind(log.refund_amount_cents)
        .bind(&log.reason)
        .bind(&log.stock_changes)
        .bind(&log.created_by)
        .bind(log.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn list_refund_logs(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    original_order_id: &str,
) -> DbResult<Vec<RefundLog>> {
    let sql = format!(
        "SELECT {REFUND_LOG_COLUMNS} FROM refund_logs
         WHERE tenant_id = ?1 AND original_order_id = ?2
         ORDER BY created_at, rowid"
    );
    let logs = sqlx::query_as::<_, RefundLog>(&sql)
        .bind(tenant_id)
        .bind(original_order_id)
        .fetch_all(conn)
        .await?;
    Ok(logs)
}
