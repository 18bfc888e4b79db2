//! # Customer Counters
//!
//! Order count, spend, loyalty points and outstanding credit. Decrements are
//! clamped at zero in SQL.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;

pub async fn add_sale(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
    spent_cents: i64,
    points: i64,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            total_orders = total_orders + 1,
            total_spent_cents = total_spent_cents + ?1,
            loyalty_points = loyalty_points + ?2,
            updated_at = ?3
        WHERE tenant_id = ?4 AND id = ?5
        "#,
    )
    .bind(spent_cents)
    .bind(points)
    .bind(now)
    .bind(tenant_id)
    .bind(customer_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

#[allow(clippy::too_many_arguments)]
pub async fn subtract_refund(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
    refunded_cents: i64,
    points: i64,
    orders: i64,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            total_orders = MAX(0, total_orders - ?1),
            total_spent_cents = MAX(0, total_spent_cents - ?2),
            loyalty_points = MAX(0, loyalty_points - ?3),
            updated_at = ?4
        WHERE tenant_id = ?5 AND id = ?6
        "#,
    )
    .bind(orders)
    .bind(refunded_cents)
    .bind(points)
    .bind(now)
    .bind(tenant_id)
    .bind(customer_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Moves the outstanding credit balance by `delta_cents`, never below zero.
pub async fn adjust_outstanding(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
    delta_cents: i64,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            outstanding_balance_cents = MAX(0, outstanding_balance_cents + ?1),
            updated_at = ?2
        WHERE tenant_id = ?3 AND id = ?4
        "#,
    )
    .bind(delta_cents)
    .bind(now)
    .bind(tenant_id)
    .bind(customer_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
