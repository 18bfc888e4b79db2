//! # Shift Repository
//!
//! Every write after insert is a compare-and-swap on `version`:
//!
//! ```text
//! UPDATE shifts SET ..., version = version + 1
//! WHERE id = ? AND version = ? AND <state guard>
//! ```
//!
//! Zero rows affected means another request changed the shift first.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use tally_core::Shift;

use crate::error::DbResult;

const SHIFT_COLUMNS: &str = r#"
    id, tenant_id, branch_id, user_id, opening_balance_cents, closing_balance_cents,
    expected_balance_cents, difference_cents, total_orders, total_cash_cents,
    total_card_cents, is_closed, force_closed, version, opened_at, closed_at,
    closed_by, notes, reconciled_balance_cents, variance_cents, variance_reason,
    reconciled_at, reconciled_by
"#;

/// Values written when a shift closes.
#[derive(Debug, Clone)]
pub struct ShiftClosing<'a> {
    pub closing_balance_cents: i64,
    pub expected_balance_cents: i64,
    pub difference_cents: i64,
    pub total_orders: i64,
    pub total_cash_cents: i64,
    pub total_card_cents: i64,
    pub force_closed: bool,
    pub closed_by: &'a str,
    pub notes: Option<&'a str>,
    pub closed_at: DateTime<Utc>,
}

/// Values written when a closed shift is reconciled.
#[derive(Debug, Clone)]
pub struct ShiftReconciliation<'a> {
    pub reconciled_balance_cents: i64,
    pub variance_cents: i64,
    pub variance_reason: Option<&'a str>,
    pub reconciled_by: &'a str,
    pub reconciled_at: DateTime<Utc>,
}

pub async fn find_open(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    user_id: &str,
) -> DbResult<Option<Shift>> {
    let sql = format!(
        "SELECT {SHIFT_COLUMNS} FROM shifts
         WHERE tenant_id = ?1 AND branch_id = ?2 AND user_id = ?3 AND is_closed = 0
         LIMIT 1"
    );
    let shift = sqlx::query_as::<_, Shift>(&sql)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(shift)
}

pub async fn find_shift(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> DbResult<Option<Shift>> {
    let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE tenant_id = ?1 AND id = ?2");
    let shift = sqlx::query_as::<_, Shift>(&sql)
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_optional(conn)
        .await?;
    Ok(shift)
}

/// A shift of one branch; shifts of other branches read as missing.
pub async fn find_in_branch(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    shift_id: &str,
) -> DbResult<Option<Shift>> {
    let sql = format!(
        "SELECT {SHIFT_COLUMNS} FROM shifts WHERE tenant_id = ?1 AND branch_id = ?2 AND id = ?3"
    );
    let shift = sqlx::query_as::<_, Shift>(&sql)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(shift_id)
        .fetch_optional(conn)
        .await?;
    Ok(shift)
}

/// Shifts of a branch, newest first.
pub async fn list(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    limit: i64,
) -> DbResult<Vec<Shift>> {
    let sql = format!(
        "SELECT {SHIFT_COLUMNS} FROM shifts
         WHERE tenant_id = ?1 AND branch_id = ?2
         ORDER BY opened_at DESC, rowid DESC
         LIMIT ?3"
    );
    let shifts = sqlx::query_as::<_, Shift>(&sql)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(shifts)
}

/// Inserts an open shift. A second open shift for the same user and branch
/// violates `idx_shifts_one_open`.
pub async fn insert_shift(conn: &mut SqliteConnection, shift: &Shift) -> DbResult<()> {
    debug!(id = %shift.id, user_id = %shift.user_id, "Inserting shift");

    sqlx::query(
        r#"
        INSERT INTO shifts (
            id, tenant_id, branch_id, user_id, opening_balance_cents,
            total_orders, total_cash_cents, total_card_cents,
            is_closed, force_closed, version, opened_at, notes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&shift.id)
    .bind(&shift.tenant_id)
    .bind(&shift.branch_id)
    .bind(&shift.user_id)
    .bind(shift.opening_balance_cents)
    .bind(shift.total_orders)
    .bind(shift.total_cash_cents)
    .bind(shift.total_card_cents)
    .bind(shift.is_closed)
    .bind(shift.force_closed)
    .bind(shift.version)
    .bind(shift.opened_at)
    .bind(&shift.notes)
    .execute(conn)
    .await?;

    Ok(())
}

/// Closes an open shift if `version` still matches.
pub async fn close(
    conn: &mut SqliteConnection,
    shift_id: &str,
    version: i64,
    closing: &ShiftClosing<'_>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE shifts SET
            is_closed = 1,
            closing_balance_cents = ?1,
            expected_balance_cents = ?2,
            difference_cents = ?3,
            total_orders = ?4,
            total_cash_cents = ?5,
            total_card_cents = ?6,
            force_closed = ?7,
            closed_by = ?8,
            notes = COALESCE(?9, notes),
            closed_at = ?10,
            version = version + 1
        WHERE id = ?11 AND version = ?12 AND is_closed = 0
        "#,
    )
    .bind(closing.closing_balance_cents)
    .bind(closing.expected_balance_cents)
    .bind(closing.difference_cents)
    .bind(closing.total_orders)
    .bind(closing.total_cash_cents)
    .bind(closing.total_card_cents)
    .bind(closing.force_closed)
    .bind(closing.closed_by)
    .bind(closing.notes)
    .bind(closing.closed_at)
    .bind(shift_id)
    .bind(version)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Stores a reconciliation on a closed, not yet reconciled shift.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    shift_id: &str,
    version: i64,
    rec: &ShiftReconciliation<'_>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE shifts SET
            reconciled_balance_cents = ?1,
            variance_cents = ?2,
            variance_reason = ?3,
            reconciled_by = ?4,
            reconciled_at = ?5,
            version = version + 1
        WHERE id = ?6 AND version = ?7 AND is_closed = 1 AND reconciled_at IS NULL
        "#,
    )
    .bind(rec.reconciled_balance_cents)
    .bind(rec.variance_cents)
    .bind(rec.variance_reason)
    .bind(rec.reconciled_by)
    .bind(rec.reconciled_at)
    .bind(shift_id)
    .bind(version)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Number of open shifts for a (tenant, branch, user).
pub async fn count_open(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    user_id: &str,
) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM shifts WHERE tenant_id = ?1 AND branch_id = ?2 AND user_id = ?3 AND is_closed = 0",
    )
    .bind(tenant_id)
    .bind(branch_id)
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}
