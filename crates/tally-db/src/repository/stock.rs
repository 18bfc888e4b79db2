//! # Stock Repository
//!
//! Current quantity per (branch, product) and the append-only movement log.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use tally_core::StockMovement;

use crate::error::DbResult;

const MOVEMENT_COLUMNS: &str = r#"
    id, tenant_id, branch_id, product_id, delta, balance_before, balance_after,
    reference_type, reference_id, reason, created_by, created_at
"#;

/// Current quantity, `0` when the product has never been stocked here.
pub async fn get_quantity(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    product_id: &str,
) -> DbResult<i64> {
    let quantity: Option<i64> = sqlx::query_scalar(
        "SELECT quantity FROM branch_stock WHERE tenant_id = ?1 AND branch_id = ?2 AND product_id = ?3",
    )
    .bind(tenant_id)
    .bind(branch_id)
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    Ok(quantity.unwrap_or(0))
}

/// Upserts the current quantity.
pub async fn set_quantity(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    product_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO branch_stock (tenant_id, branch_id, product_id, quantity, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (branch_id, product_id)
        DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
        "#,
    )
    .bind(tenant_id)
    .bind(branch_id)
    .bind(product_id)
    .bind(quantity)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_movement(conn: &mut SqliteConnection, movement: &StockMovement) -> DbResult<()> {
    let sql = format!(
        "INSERT INTO stock_movements ({MOVEMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
    );
    sqlx::query(&sql)
        .bind(&movement.id)
        .bind(&movement.tenant_id)
        .bind(&movement.branch_id)
        .bind(&movement.product_id)
        .bind(movement.delta)
        .bind(movement.balance_before)
        .bind(movement.balance_after)
        .bind(movement.reference_type)
        .bind(&movement.reference_id)
        .bind(&movement.reason)
        .bind(&movement.created_by)
        .bind(movement.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Movements for one product at one branch, newest first.
pub async fn history(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    product_id: &str,
    limit: i64,
) -> DbResult<Vec<StockMovement>> {
    let sql = format!(
        "SELECT {MOVEMENT_COLUMNS} FROM stock_movements
         WHERE tenant_id = ?1 AND branch_id = ?2 AND product_id = ?3
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?4"
    );
    let movements = sqlx::query_as::<_, StockMovement>(&sql)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(product_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(movements)
}

/// Number of movements referencing `reference_id` (an order id).
pub async fn count_for_reference(conn: &mut SqliteConnection, reference_id: &str) -> DbResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE reference_id = ?1")
            .bind(reference_id)
            .fetch_one(conn)
            .await?;
    Ok(count)
}
