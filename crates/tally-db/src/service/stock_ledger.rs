//! # Stock Ledger
//!
//! Per-branch, per-product quantity with an append-only movement log.
//!
//! ```text
//! read quantity ─► check policy ─► write quantity ─► append movement
//!      q                q + Δ < 0 and           q + Δ      (q, Δ, q + Δ)
//!                       no negative stock
//!                       → InsufficientStock
//! ```
//!
//! Products with `track_inventory = false` are never counted: every
//! operation on them is a no-op that writes nothing.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use tally_core::validation::{validate_quantity, validate_reason};
use tally_core::{
    CoreError, Product, StockMovement, StockReferenceType, TenantContext, ValidationError,
};

use crate::error::PosResult;
use crate::pool::Database;
use crate::repository::{catalog, stock};
use crate::service::{load_scope, new_id};

/// Who and what a movement is attributed to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MovementSource<'a> {
    pub tenant_id: &'a str,
    pub branch_id: &'a str,
    pub reference_type: StockReferenceType,
    pub reference_id: Option<&'a str>,
    pub reason: Option<&'a str>,
    pub created_by: &'a str,
    pub allow_negative: bool,
    pub now: DateTime<Utc>,
}

/// Applies `delta` to one product inside the caller's transaction.
///
/// Returns `None` for untracked products.
pub(crate) async fn apply_delta(
    conn: &mut SqliteConnection,
    product: &Product,
    delta: i64,
    source: &MovementSource<'_>,
) -> PosResult<Option<StockMovement>> {
    if !product.track_inventory {
        debug!(product_id = %product.id, "Untracked product, no stock movement");
        return Ok(None);
    }

    let before =
        stock::get_quantity(&mut *conn, source.tenant_id, source.branch_id, &product.id).await?;
    let after = before + delta;
    if delta < 0 && after < 0 && !source.allow_negative {
        return Err(CoreError::InsufficientStock {
            product_id: product.id.clone(),
            requested: -delta,
            available: before,
        }
        .into());
    }

    stock::set_quantity(
        &mut *conn,
        source.tenant_id,
        source.branch_id,
        &product.id,
        after,
        source.now,
    )
    .await?;

    let movement = StockMovement {
        id: new_id(),
        tenant_id: source.tenant_id.to_string(),
        branch_id: source.branch_id.to_string(),
        product_id: product.id.clone(),
        delta,
        balance_before: before,
        balance_after: after,
        reference_type: source.reference_type,
        reference_id: source.reference_id.map(str::to_string),
        reason: source.reason.map(str::to_string),
        created_by: source.created_by.to_string(),
        created_at: source.now,
    };
    stock::insert_movement(conn, &movement).await?;

    debug!(
        product_id = %product.id,
        before,
        after,
        reference = ?source.reference_type,
        "Stock movement recorded"
    );
    Ok(Some(movement))
}

/// Folds repeated products together, keeping first-seen order.
pub(crate) fn merge_lines(lines: &[(String, i64)]) -> Vec<(String, i64)> {
    let mut merged: Vec<(String, i64)> = Vec::with_capacity(lines.len());
    for (product_id, qty) in lines {
        match merged.iter_mut().find(|(id, _)| id == product_id) {
            Some((_, total)) => *total += qty,
            None => merged.push((product_id.clone(), *qty)),
        }
    }
    merged
}

/// Applies one signed batch inside the caller's transaction.
///
/// Every product is checked against its merged quantity, so two lines of the
/// same product cannot each pass the stock check on their own.
pub(crate) async fn apply_batch(
    conn: &mut SqliteConnection,
    lines: &[(String, i64)],
    sign: i64,
    source: &MovementSource<'_>,
) -> PosResult<Vec<StockMovement>> {
    let mut movements = Vec::new();
    for (i, (product_id, qty)) in merge_lines(lines).iter().enumerate() {
        if *qty <= 0 {
            return Err(ValidationError::MustBePositive {
                field: format!("lines[{}].quantity", i),
            }
            .into());
        }
        let product = catalog::find_product(&mut *conn, source.tenant_id, product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", product_id.as_str()))?;
        if let Some(m) = apply_delta(&mut *conn, &product, sign * qty, source).await? {
            movements.push(m);
        }
    }
    Ok(movements)
}

/// The Stock Ledger service.
#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Database,
}

impl StockLedger {
    pub fn new(db: Database) -> Self {
        StockLedger { db }
    }

    /// Removes `quantity` units, enforcing the tenant's negative-stock policy.
    pub async fn decrement(
        &self,
        ctx: &TenantContext,
        product_id: &str,
        quantity: i64,
        reference_type: StockReferenceType,
        reference_id: Option<&str>,
    ) -> PosResult<Option<StockMovement>> {
        validate_quantity(quantity)?;
        self.mutate(ctx, product_id, -quantity, reference_type, reference_id, None)
            .await
    }

    /// Restores `quantity` units.
    pub async fn increment(
        &self,
        ctx: &TenantContext,
        product_id: &str,
        quantity: i64,
        reference_type: StockReferenceType,
        reference_id: Option<&str>,
    ) -> PosResult<Option<StockMovement>> {
        validate_quantity(quantity)?;
        self.mutate(ctx, product_id, quantity, reference_type, reference_id, None)
            .await
    }

    /// Manual correction by a signed `delta`. A reason is required.
    pub async fn adjust(
        &self,
        ctx: &TenantContext,
        product_id: &str,
        delta: i64,
        reason: &str,
    ) -> PosResult<Option<StockMovement>> {
        let reason = validate_reason("reason", reason)?;
        if delta == 0 {
            return Err(ValidationError::invalid("delta", "must not be zero").into());
        }
        self.mutate(
            ctx,
            product_id,
            delta,
            StockReferenceType::Adjustment,
            None,
            Some(reason.as_str()),
        )
        .await
    }

    /// Removes several products at once; all or nothing.
    pub async fn batch_decrement(
        &self,
        ctx: &TenantContext,
        lines: &[(String, i64)],
        reference_type: StockReferenceType,
        reference_id: Option<&str>,
    ) -> PosResult<Vec<StockMovement>> {
        self.batch(ctx, lines, -1, reference_type, reference_id).await
    }

    /// Restores several products at once; all or nothing.
    pub async fn batch_increment(
        &self,
        ctx: &TenantContext,
        lines: &[(String, i64)],
        reference_type: StockReferenceType,
        reference_id: Option<&str>,
    ) -> PosResult<Vec<StockMovement>> {
        self.batch(ctx, lines, 1, reference_type, reference_id).await
    }

    /// Sets the opening quantity of a product, recorded as an `initial`
    /// movement of the difference.
    pub async fn set_initial(
        &self,
        ctx: &TenantContext,
        product_id: &str,
        quantity: i64,
    ) -> PosResult<Option<StockMovement>> {
        ctx.validate()?;
        if quantity < 0 {
            return Err(ValidationError::OutOfRange {
                field: "quantity".into(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (tenant, _) = load_scope(&mut *tx, ctx).await?;
        let product = catalog::find_product(&mut *tx, &ctx.tenant_id, product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", product_id))?;

        let current = stock::get_quantity(&mut *tx, &ctx.tenant_id, &ctx.branch_id, product_id).await?;
        let delta = quantity - current;
        if delta == 0 {
            return Ok(None);
        }
        let source = MovementSource {
            tenant_id: &ctx.tenant_id,
            branch_id: &ctx.branch_id,
            reference_type: StockReferenceType::Initial,
            reference_id: None,
            reason: None,
            created_by: &ctx.user_id,
            allow_negative: tenant.allow_negative_stock,
            now: self.db.now(),
        };
        let movement = apply_delta(&mut *tx, &product, delta, &source).await?;
        tx.commit().await?;

        info!(product_id, quantity, branch_id = %ctx.branch_id, "Initial stock set");
        Ok(movement)
    }

    /// Current quantity at the acting branch.
    pub async fn get_quantity(&self, ctx: &TenantContext, product_id: &str) -> PosResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        let quantity =
            stock::get_quantity(&mut *conn, &ctx.tenant_id, &ctx.branch_id, product_id).await?;
        Ok(quantity)
    }

    /// Movements of a product at the acting branch, newest first.
    pub async fn get_history(
        &self,
        ctx: &TenantContext,
        product_id: &str,
        limit: i64,
    ) -> PosResult<Vec<StockMovement>> {
        let mut conn = self.db.pool().acquire().await?;
        let movements = stock::history(
            &mut *conn,
            &ctx.tenant_id,
            &ctx.branch_id,
            product_id,
            limit.max(1),
        )
        .await?;
        Ok(movements)
    }

    async fn mutate(
        &self,
        ctx: &TenantContext,
        product_id: &str,
        delta: i64,
        reference_type: StockReferenceType,
        reference_id: Option<&str>,
        reason: Option<&str>,
    ) -> PosResult<Option<StockMovement>> {
        ctx.validate()?;
        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;

        let (tenant, _) = load_scope(&mut *tx, ctx).await?;
        let product = catalog::find_product(&mut *tx, &ctx.tenant_id, product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", product_id))?;

        let source = MovementSource {
            tenant_id: &ctx.tenant_id,
            branch_id: &ctx.branch_id,
            reference_type,
            reference_id,
            reason,
            created_by: &ctx.user_id,
            allow_negative: tenant.allow_negative_stock,
            now: self.db.now(),
        };
        let movement = apply_delta(&mut *tx, &product, delta, &source).await?;
        tx.commit().await?;

        if let Some(m) = &movement {
            info!(
                product_id,
                delta,
                balance_after = m.balance_after,
                branch_id = %ctx.branch_id,
                "Stock updated"
            );
        }
        Ok(movement)
    }

    async fn batch(
        &self,
        ctx: &TenantContext,
        lines: &[(String, i64)],
        sign: i64,
        reference_type: StockReferenceType,
        reference_id: Option<&str>,
    ) -> PosResult<Vec<StockMovement>> {
        ctx.validate()?;
        if lines.is_empty() {
            return Err(ValidationError::required("lines").into());
        }

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (tenant, _) = load_scope(&mut *tx, ctx).await?;

        let source = MovementSource {
            tenant_id: &ctx.tenant_id,
            branch_id: &ctx.branch_id,
            reference_type,
            reference_id,
            reason: None,
            created_by: &ctx.user_id,
            allow_negative: tenant.allow_negative_stock,
            now: self.db.now(),
        };
        let movements = apply_batch(&mut *tx, lines, sign, &source).await?;
        tx.commit().await?;

        info!(
            lines = lines.len(),
            movements = movements.len(),
            branch_id = %ctx.branch_id,
            "Stock batch applied"
        );
        Ok(movements)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
