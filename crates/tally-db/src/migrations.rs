//! # Schema Migrations
//!
//! The schema ships inside the binary (`migrations/sqlite/*.sql`, embedded
//! at compile time) and is brought up to date when a [`Database`] opens.
//!
//! ## What the schema guarantees
//! ```text
//!   catalog      tenants  branches  products  customers      (read by the core)
//!   documents    orders  order_items  shifts                 (guarded updates)
//!   ledgers      stock_movements  cash_ledger  payments      (insert only)
//!                refund_logs
//!   projections  branch_stock                                (= Σ stock_movements)
//! ```
//!
//! Some invariants live in the schema rather than in code:
//! - `idx_shifts_one_open`: at most one open shift per tenant, branch and user
//! - `cash_ledger(tenant_id, branch_id, branch_seq)` is unique, so two writers
//!   cannot extend a branch's balance chain from the same predecessor
//! - order numbers are unique; cash entry numbers are unique per tenant
//! - catalog tax rates are `CHECK`ed to 0..=10000 basis points
//!
//! A new migration only ever adds: new tables, new nullable columns, new
//! indexes. Rows already in a ledger table are never rewritten.
//!
//! [`Database`]: crate::pool::Database

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// How far the database is behind the embedded schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStatus {
    /// Migrations compiled into this binary.
    pub embedded: usize,
    /// Migrations recorded as applied in the database.
    pub applied: usize,
}

impl SchemaStatus {
    pub fn is_current(&self) -> bool {
        self.applied >= self.embedded
    }
}

/// Applies pending migrations in filename order, each in its own
/// transaction. Running it against an up-to-date database is a no-op.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<SchemaStatus> {
    debug!(embedded = MIGRATOR.migrations.len(), "Applying ledger schema");
    MIGRATOR.run(pool).await?;

    let status = schema_status(pool).await?;
    info!(applied = status.applied, embedded = status.embedded, "Ledger schema up to date");
    Ok(status)
}

/// Compares the embedded migrations with those recorded in the database.
pub async fn schema_status(pool: &SqlitePool) -> DbResult<SchemaStatus> {
    let recorded: i64 = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    let applied: i64 = if recorded != 0 {
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    } else {
        0
    };

    Ok(SchemaStatus {
        embedded: MIGRATOR.migrations.len(),
        applied: applied.max(0) as usize,
    })
}
