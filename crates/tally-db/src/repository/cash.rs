//! # Cash Ledger Repository
//!
//! Append-only cash entries. The branch chain is ordered by `branch_seq`;
//! the tail of that chain is the branch's current balance.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use tally_core::CashLedgerEntry;

use crate::error::DbResult;

const ENTRY_COLUMNS: &str = r#"
    id, tenant_id, branch_id, shift_id, number, branch_seq, transaction_type,
    amount_cents, balance_before_cents, balance_after_cents, description,
    reference_type, reference_id, transfer_ref_id, created_by, created_at
"#;

/// Tail of the branch chain: `(branch_seq, balance_after_cents)`.
pub async fn tail(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
) -> DbResult<Option<(i64, i64)>> {
    let tail: Option<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT branch_seq, balance_after_cents FROM cash_ledger
        WHERE tenant_id = ?1 AND branch_id = ?2
        ORDER BY branch_seq DESC
        LIMIT 1
        "#,
    )
    .bind(tenant_id)
    .bind(branch_id)
    .fetch_optional(conn)
    .await?;
    Ok(tail)
}

/// Highest ledger number issued to the tenant under `{prefix}-{year}-`.
///
/// Ordered by length first so `CSH-2026-10000` sorts after `CSH-2026-9999`.
pub async fn last_number(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    prefix: &str,
    year: i32,
) -> DbResult<Option<String>> {
    let pattern = format!("{}-{}-%", prefix, year);
    let number: Option<String> = sqlx::query_scalar(
        r#"
        SELECT number FROM cash_ledger
        WHERE tenant_id = ?1 AND number LIKE ?2
        ORDER BY length(number) DESC, number DESC
        LIMIT 1
        "#,
    )
    .bind(tenant_id)
    .bind(pattern)
    .fetch_optional(conn)
    .await?;
    Ok(number)
}

pub async fn insert_entry(conn: &mut SqliteConnection, entry: &CashLedgerEntry) -> DbResult<()> {
    let sql = format!(
        "INSERT INTO cash_ledger ({ENTRY_COLUMNS}) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16
        )"
    );
    sqlx::query(&sql)
        .bind(&entry.id)
        .bind(&entry.tenant_id)
        .bind(&entry.branch_id)
        .bind(&entry.shift_id)
        .bind(&entry.number)
        .bind(entry.branch_seq)
        .bind(entry.transaction_type)
        .bind(entry.amount_cents)
        .bind(entry.balance_before_cents)
        .bind(entry.balance_after_cents)
        .bind(&entry.description)
        .bind(&entry.reference_type)
        .bind(&entry.reference_id)
        .bind(&entry.transfer_ref_id)
        .bind(&entry.created_by)
        .bind(entry.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn find_entry(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    entry_id: &str,
) -> DbResult<Option<CashLedgerEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM cash_ledger WHERE tenant_id = ?1 AND id = ?2");
    let entry = sqlx::query_as::<_, CashLedgerEntry>(&sql)
        .bind(tenant_id)
        .bind(entry_id)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

/// Newest entries of a branch first.
pub async fn history(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    limit: i64,
) -> DbResult<Vec<CashLedgerEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM cash_ledger
         WHERE tenant_id = ?1 AND branch_id = ?2
         ORDER BY branch_seq DESC
         LIMIT ?3"
    );
    let entries = sqlx::query_as::<_, CashLedgerEntry>(&sql)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// Entries created in `[from, to)`, in chain order.
pub async fn entries_between(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> DbResult<Vec<CashLedgerEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM cash_ledger
         WHERE tenant_id = ?1 AND branch_id = ?2 AND created_at >= ?3 AND created_at < ?4
         ORDER BY branch_seq"
    );
    let entries = sqlx::query_as::<_, CashLedgerEntry>(&sql)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(from)
        .bind(to)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// Balance of the branch just before `at` (0 when nothing was recorded yet).
pub async fn balance_before(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    at: DateTime<Utc>,
) -> DbResult<i64> {
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT balance_after_cents FROM cash_ledger
        WHERE tenant_id = ?1 AND branch_id = ?2 AND created_at < ?3
        ORDER BY branch_seq DESC
        LIMIT 1
        "#,
    )
    .bind(tenant_id)
    .bind(branch_id)
    .bind(at)
    .fetch_optional(conn)
    .await?;
    Ok(balance.unwrap_or(0))
}

/// Signed sum of every non-opening entry tagged with a shift.
pub async fn shift_movement_sum(conn: &mut SqliteConnection, shift_id: &str) -> DbResult<i64> {
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0) FROM cash_ledger
        WHERE shift_id = ?1 AND transaction_type <> 'opening'
        "#,
    )
    .bind(shift_id)
    .fetch_one(conn)
    .await?;
    Ok(sum)
}

/// Entries tagged with a shift, in chain order.
pub async fn list_by_shift(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> DbResult<Vec<CashLedgerEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM cash_ledger
         WHERE tenant_id = ?1 AND shift_id = ?2
         ORDER BY branch_seq"
    );
    let entries = sqlx::query_as::<_, CashLedgerEntry>(&sql)
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
