//! # Cash Ledger
//!
//! Per-branch running cash balance, kept as a chain of signed entries.
//!
//! ```text
//!  seq  number          type        amount   before    after
//!   1   CSH-2026-0001   opening    +500.00     0.00   500.00
//!   2   CSH-2026-0002   sale       +228.00   500.00   728.00
//!   3   CSH-2026-0003   refund     -114.00   728.00   614.00
//! ```
//!
//! The current balance is the `balance_after` of the highest `branch_seq`.
//! Appends read that tail and write the next link, so every append runs
//! under the tenant's [`LedgerGuard`] and inside a transaction. Order
//! completion, refunds and shifts call [`append`] with their own
//! transaction; the public methods open one of their own.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use tally_core::cash::signed_amount;
use tally_core::numbering::next_ledger_number;
use tally_core::validation::{
    validate_non_negative_cents, validate_optional_reason, validate_positive_cents, validate_reason,
};
use tally_core::{
    CashLedgerEntry, CashTransactionType, CoreError, Money, Shift, TenantContext, ValidationError,
};

use crate::error::{DbError, PosResult};
use crate::locks::LedgerGuard;
use crate::pool::Database;
use crate::repository::{cash, shift as shift_repo};
use crate::service::{ensure_updated, load_branch, load_scope, new_id};

// =============================================================================
// Requests
// =============================================================================

/// One cash movement to record.
#[derive(Debug, Clone)]
pub struct CashEntryRequest {
    pub transaction_type: CashTransactionType,
    /// Sign is applied from the transaction type; only `adjustment` and
    /// `transfer` keep the sign given here.
    pub amount: Money,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub shift_id: Option<String>,
}

impl CashEntryRequest {
    pub fn new(
        transaction_type: CashTransactionType,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        CashEntryRequest {
            transaction_type,
            amount,
            description: description.into(),
            reference_type: None,
            reference_id: None,
            shift_id: None,
        }
    }

    pub fn reference(mut self, reference_type: &str, reference_id: &str) -> Self {
        self.reference_type = Some(reference_type.to_string());
        self.reference_id = Some(reference_id.to_string());
        self
    }

    pub fn shift(mut self, shift_id: Option<&str>) -> Self {
        self.shift_id = shift_id.map(str::to_string);
        self
    }
}

/// Both legs of a transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    /// Entry in the source branch (negative).
    pub outgoing: CashLedgerEntry,
    /// Entry in the target branch (positive).
    pub incoming: CashLedgerEntry,
}

/// Totals for one transaction type within a summary window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeTotal {
    pub transaction_type: CashTransactionType,
    pub count: i64,
    pub amount_cents: i64,
}

/// Cash activity of a branch over `[from, to)`.
#[derive(Debug, Clone, Serialize)]
pub struct CashSummary {
    pub branch_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub opening_balance_cents: i64,
    pub closing_balance_cents: i64,
    pub current_balance_cents: i64,
    pub total_in_cents: i64,
    pub total_out_cents: i64,
    pub net_cents: i64,
    pub entry_count: i64,
    /// Only types that occurred, in declaration order.
    pub by_type: Vec<TypeTotal>,
}

// =============================================================================
// In-transaction append
// =============================================================================

/// Where and by whom an entry is written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryTarget<'a> {
    pub tenant_id: &'a str,
    pub branch_id: &'a str,
    pub created_by: &'a str,
    pub prefix: &'a str,
    pub now: DateTime<Utc>,
}

/// Appends one entry to the branch chain inside the caller's transaction.
///
/// `id` and `transfer_ref_id` are supplied by transfers, which must know
/// both ids before either leg is written.
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    guard: &LedgerGuard,
    target: &EntryTarget<'_>,
    request: &CashEntryRequest,
    ids: Option<(String, String)>,
) -> PosResult<CashLedgerEntry> {
    if guard.tenant_id() != target.tenant_id {
        return Err(DbError::Internal(format!(
            "ledger guard for {} used to write tenant {}",
            guard.tenant_id(),
            target.tenant_id
        ))
        .into());
    }

    let amount = signed_amount(request.transaction_type, request.amount)?;
    let (seq, balance) = cash::tail(&mut *conn, target.tenant_id, target.branch_id)
        .await?
        .unwrap_or((0, 0));
    let last = cash::last_number(&mut *conn, target.tenant_id, target.prefix, target.now.year())
        .await?;
    let number = next_ledger_number(target.prefix, target.now, last.as_deref());

    let (id, transfer_ref_id) = match ids {
        Some((id, other)) => (id, Some(other)),
        None => (new_id(), None),
    };
    let entry = CashLedgerEntry {
        id,
        tenant_id: target.tenant_id.to_string(),
        branch_id: target.branch_id.to_string(),
        shift_id: request.shift_id.clone(),
        number,
        branch_seq: seq + 1,
        transaction_type: request.transaction_type,
        amount_cents: amount.cents(),
        balance_before_cents: balance,
        balance_after_cents: balance + amount.cents(),
        description: request.description.clone(),
        reference_type: request.reference_type.clone(),
        reference_id: request.reference_id.clone(),
        transfer_ref_id,
        created_by: target.created_by.to_string(),
        created_at: target.now,
    };
    cash::insert_entry(conn, &entry).await?;

    debug!(
        number = %entry.number,
        branch_id = %entry.branch_id,
        kind = entry.transaction_type.as_str(),
        amount_cents = entry.amount_cents,
        balance_after = entry.balance_after_cents,
        "Cash entry appended"
    );
    Ok(entry)
}

/// Current balance of a branch (0 before the first entry).
pub(crate) async fn balance_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
) -> PosResult<Money> {
    let balance = cash::tail(conn, tenant_id, branch_id)
        .await?
        .map(|(_, b)| b)
        .unwrap_or(0);
    Ok(Money::from_cents(balance))
}

// =============================================================================
// CashLedger
// =============================================================================

/// The Cash Ledger service.
#[derive(Debug, Clone)]
pub struct CashLedger {
    db: Database,
}

impl CashLedger {
    pub fn new(db: Database) -> Self {
        CashLedger { db }
    }

    fn target<'a>(&'a self, ctx: &'a TenantContext, branch_id: &'a str) -> EntryTarget<'a> {
        EntryTarget {
            tenant_id: &ctx.tenant_id,
            branch_id,
            created_by: &ctx.user_id,
            prefix: &self.db.config().ledger.cash_prefix,
            now: self.db.now(),
        }
    }

    /// Records one movement at the acting branch in its own transaction.
    pub async fn record_transaction(
        &self,
        ctx: &TenantContext,
        request: CashEntryRequest,
    ) -> PosResult<CashLedgerEntry> {
        ctx.validate()?;
        if request.description.trim().is_empty() {
            return Err(ValidationError::required("description").into());
        }

        let guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        load_scope(&mut *tx, ctx).await?;

        if let Some(shift_id) = &request.shift_id {
            shift_repo::find_in_branch(&mut *tx, &ctx.tenant_id, &ctx.branch_id, shift_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Shift", shift_id.as_str()))?;
        }

        let entry = append(&mut *tx, &guard, &self.target(ctx, &ctx.branch_id), &request, None).await?;
        tx.commit().await?;

        info!(
            number = %entry.number,
            branch_id = %entry.branch_id,
            kind = entry.transaction_type.as_str(),
            amount_cents = entry.amount_cents,
            "Cash transaction recorded"
        );
        Ok(entry)
    }

    /// Cash put into the drawer.
    pub async fn deposit(
        &self,
        ctx: &TenantContext,
        amount: Money,
        description: &str,
    ) -> PosResult<CashLedgerEntry> {
        self.simple(ctx, CashTransactionType::Deposit, amount, description).await
    }

    /// Cash taken out of the drawer.
    pub async fn withdraw(
        &self,
        ctx: &TenantContext,
        amount: Money,
        description: &str,
    ) -> PosResult<CashLedgerEntry> {
        self.simple(ctx, CashTransactionType::Withdrawal, amount, description).await
    }

    pub async fn expense(
        &self,
        ctx: &TenantContext,
        amount: Money,
        description: &str,
    ) -> PosResult<CashLedgerEntry> {
        self.simple(ctx, CashTransactionType::Expense, amount, description).await
    }

    pub async fn supplier_payment(
        &self,
        ctx: &TenantContext,
        amount: Money,
        description: &str,
    ) -> PosResult<CashLedgerEntry> {
        self.simple(ctx, CashTransactionType::SupplierPayment, amount, description)
            .await
    }

    /// Convenience movements are attributed to the acting user's open shift.
    async fn simple(
        &self,
        ctx: &TenantContext,
        kind: CashTransactionType,
        amount: Money,
        description: &str,
    ) -> PosResult<CashLedgerEntry> {
        validate_positive_cents("amount", amount.cents())?;
        let shift = self.db.shifts().current(ctx).await?;
        let request = CashEntryRequest::new(kind, amount, description)
            .shift(shift.as_ref().map(|s| s.id.as_str()));
        self.record_transaction(ctx, request).await
    }

    /// Moves cash from the acting branch to `target_branch_id`.
    ///
    /// Both legs are `transfer` entries whose `transfer_ref_id` names the
    /// other leg.
    pub async fn transfer(
        &self,
        ctx: &TenantContext,
        target_branch_id: &str,
        amount: Money,
        description: &str,
    ) -> PosResult<TransferResult> {
        ctx.validate()?;
        validate_positive_cents("amount", amount.cents())?;
        if target_branch_id == ctx.branch_id {
            return Err(ValidationError::invalid(
                "target_branch_id",
                "must differ from the source branch",
            )
            .into());
        }
        let description = validate_reason("description", description)?;

        let guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (_, source) = load_scope(&mut *tx, ctx).await?;
        let target = load_branch(&mut *tx, &ctx.tenant_id, target_branch_id).await?;

        let available = balance_in(&mut *tx, &ctx.tenant_id, &source.id).await?;
        if available < amount {
            return Err(CoreError::InsufficientBalance {
                branch_id: source.id.clone(),
                requested: amount.cents(),
                available: available.cents(),
            }
            .into());
        }

        let outgoing_id = new_id();
        let incoming_id = new_id();

        let out_request = CashEntryRequest::new(
            CashTransactionType::Transfer,
            -amount,
            format!("Transfer to {}: {}", target.name, description),
        )
        .reference("transfer", &target.id);
        let outgoing = append(
            &mut *tx,
            &guard,
            &self.target(ctx, &source.id),
            &out_request,
            Some((outgoing_id.clone(), incoming_id.clone())),
        )
        .await?;

        let in_request = CashEntryRequest::new(
            CashTransactionType::Transfer,
            amount,
            format!("Transfer from {}: {}", source.name, description),
        )
        .reference("transfer", &source.id);
        let incoming = append(
            &mut *tx,
            &guard,
            &self.target(ctx, &target.id),
            &in_request,
            Some((incoming_id, outgoing_id)),
        )
        .await?;

        tx.commit().await?;

        info!(
            from = %source.id,
            to = %target.id,
            amount_cents = amount.cents(),
            "Cash transferred"
        );
        Ok(TransferResult { outgoing, incoming })
    }

    /// Records the counted cash of a closed shift.
    ///
    /// Expected balance is the opening float plus every non-opening entry
    /// tagged with the shift. A non-zero variance needs a reason and appends
    /// an `adjustment` entry so the ledger matches the drawer. Allowed once
    /// per shift.
    pub async fn reconcile(
        &self,
        ctx: &TenantContext,
        shift_id: &str,
        actual: Money,
        variance_reason: Option<&str>,
    ) -> PosResult<Shift> {
        ctx.validate()?;
        validate_non_negative_cents("actual_balance", actual.cents())?;
        let reason = validate_optional_reason("variance_reason", variance_reason)?;

        let guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;

        let shift = shift_repo::find_in_branch(&mut *tx, &ctx.tenant_id, &ctx.branch_id, shift_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Shift", shift_id))?;
        if !shift.is_closed {
            return Err(CoreError::ShiftAlreadyOpen {
                shift_id: shift.id.clone(),
            }
            .into());
        }
        if shift.reconciled_at.is_some() {
            return Err(CoreError::ShiftAlreadyReconciled {
                shift_id: shift.id.clone(),
            }
            .into());
        }

        let movements = cash::shift_movement_sum(&mut *tx, &shift.id).await?;
        let expected = Money::from_cents(shift.opening_balance_cents + movements);
        let variance = actual - expected;

        if !variance.is_zero() {
            let reason = reason
                .as_deref()
                .ok_or_else(|| ValidationError::required("variance_reason"))?;
            let request = CashEntryRequest::new(
                CashTransactionType::Adjustment,
                variance,
                format!("Shift reconciliation: {}", reason),
            )
            .reference("shift", &shift.id)
            .shift(Some(shift.id.as_str()));
            append(
                &mut *tx,
                &guard,
                &self.target(ctx, &shift.branch_id),
                &request,
                None,
            )
            .await?;
        }

        let rows = shift_repo::reconcile(
            &mut *tx,
            &shift.id,
            shift.version,
            &shift_repo::ShiftReconciliation {
                reconciled_balance_cents: actual.cents(),
                variance_cents: variance.cents(),
                variance_reason: reason.as_deref(),
                reconciled_by: &ctx.user_id,
                reconciled_at: self.db.now(),
            },
        )
        .await?;
        ensure_updated(rows, "Shift", &shift.id)?;

        let reconciled = shift_repo::find_shift(&mut *tx, &ctx.tenant_id, &shift.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Shift", shift_id))?;
        tx.commit().await?;

        info!(
            shift_id = %shift.id,
            expected_cents = expected.cents(),
            actual_cents = actual.cents(),
            variance_cents = variance.cents(),
            "Shift reconciled"
        );
        Ok(reconciled)
    }

    /// Current balance of the acting branch.
    pub async fn get_balance(&self, ctx: &TenantContext) -> PosResult<Money> {
        let mut conn = self.db.pool().acquire().await?;
        balance_in(&mut *conn, &ctx.tenant_id, &ctx.branch_id).await
    }

    /// Newest entries of the acting branch first.
    pub async fn history(&self, ctx: &TenantContext, limit: i64) -> PosResult<Vec<CashLedgerEntry>> {
        let mut conn = self.db.pool().acquire().await?;
        let entries = cash::history(&mut *conn, &ctx.tenant_id, &ctx.branch_id, limit.max(1)).await?;
        Ok(entries)
    }

    /// Entries tagged with a shift, oldest first.
    pub async fn shift_entries(
        &self,
        ctx: &TenantContext,
        shift_id: &str,
    ) -> PosResult<Vec<CashLedgerEntry>> {
        let mut conn = self.db.pool().acquire().await?;
        let entries = cash::list_by_shift(&mut *conn, &ctx.tenant_id, shift_id).await?;
        Ok(entries)
    }

    pub async fn get_entry(&self, ctx: &TenantContext, entry_id: &str) -> PosResult<CashLedgerEntry> {
        let mut conn = self.db.pool().acquire().await?;
        let entry = cash::find_entry(&mut *conn, &ctx.tenant_id, entry_id)
            .await?
            .ok_or_else(|| CoreError::not_found("CashLedgerEntry", entry_id))?;
        Ok(entry)
    }

    /// Activity of the acting branch over `[from, to)`.
    pub async fn get_summary(
        &self,
        ctx: &TenantContext,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PosResult<CashSummary> {
        if to <= from {
            return Err(ValidationError::invalid("to", "must be after from").into());
        }
        let mut conn = self.db.pool().acquire().await?;
        let opening = cash::balance_before(&mut *conn, &ctx.tenant_id, &ctx.branch_id, from).await?;
        let entries =
            cash::entries_between(&mut *conn, &ctx.tenant_id, &ctx.branch_id, from, to).await?;
        let current = balance_in(&mut *conn, &ctx.tenant_id, &ctx.branch_id).await?;

        Ok(summarize(&ctx.branch_id, from, to, opening, &entries, current))
    }
}

fn summarize(
    branch_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    opening: i64,
    entries: &[CashLedgerEntry],
    current: Money,
) -> CashSummary {
    let total_in: i64 = entries
        .iter()
        .filter(|e| e.amount_cents > 0)
        .map(|e| e.amount_cents)
        .sum();
    let total_out: i64 = entries
        .iter()
        .filter(|e| e.amount_cents < 0)
        .map(|e| -e.amount_cents)
        .sum();
    let by_type = CashTransactionType::ALL
        .iter()
        .filter_map(|kind| {
            let of_kind: Vec<&CashLedgerEntry> =
                entries.iter().filter(|e| e.transaction_type == *kind).collect();
            if of_kind.is_empty() {
                return None;
            }
            Some(TypeTotal {
                transaction_type: *kind,
                count: of_kind.len() as i64,
                amount_cents: of_kind.iter().map(|e| e.amount_cents).sum(),
            })
        })
        .collect();

    CashSummary {
        branch_id: branch_id.to_string(),
        from,
        to,
        opening_balance_cents: opening,
        closing_balance_cents: entries.last().map(|e| e.balance_after_cents).unwrap_or(opening),
        current_balance_cents: current.cents(),
        total_in_cents: total_in,
        total_out_cents: total_out,
        net_cents: total_in - total_out,
        entry_count: entries.len() as i64,
        by_type,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{fixture, BRANCH, OTHER_BRANCH};
    use chrono::Duration;
    use tally_core::ErrorKind;

    #[tokio::test]
    async fn test_sign_table_and_numbering() {
        let f = fixture().await;
        let cash = f.db.cash();

        cash.deposit(&f.ctx, Money::from_cents(10_000), "float top-up").await.unwrap();
        cash.expense(&f.ctx, Money::from_cents(1_500), "cleaning").await.unwrap();
        let entry = cash
            .record_transaction(
                &f.ctx,
                CashEntryRequest::new(CashTransactionType::Adjustment, Money::from_cents(-250), "count fix"),
            )
            .await
            .unwrap();

        assert_eq!(entry.number, "CSH-2026-0003");
        assert_eq!(entry.amount_cents, -250);
        assert_eq!(entry.balance_before_cents, 8_500);
        assert_eq!(cash.get_balance(&f.ctx).await.unwrap().cents(), 8_250);
        assert_eq!(cash.get_entry(&f.ctx, &entry.id).await.unwrap().number, entry.number);
        let err = cash.get_entry(&f.ctx, "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        f.assert_cash_chain(BRANCH).await;
    }

    #[tokio::test]
    async fn test_numbers_are_per_tenant_year() {
        let f = fixture().await;
        let cash = f.db.cash();
        let other = f.ctx.at_branch(OTHER_BRANCH).unwrap();

        cash.deposit(&f.ctx, Money::from_cents(100), "a").await.unwrap();
        let second = cash.deposit(&other, Money::from_cents(100), "b").await.unwrap();
        assert_eq!(second.number, "CSH-2026-0002");
        assert_eq!(second.branch_seq, 1);

        f.clock.advance(Duration::days(365));
        let next_year = cash.deposit(&f.ctx, Money::from_cents(100), "c").await.unwrap();
        assert_eq!(next_year.number, "CSH-2027-0001");
        assert_eq!(next_year.branch_seq, 2);
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected() {
        let f = fixture().await;
        let err = f
            .db
            .cash()
            .record_transaction(
                &f.ctx,
                CashEntryRequest::new(CashTransactionType::Adjustment, Money::zero(), "nothing"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.db.cash().history(&f.ctx, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_is_branch_scoped() {
        let f = fixture().await;
        let shift = f.open_shift(4_000).await;
        f.db.shifts()
            .close(&f.ctx, crate::service::shifts::CloseShiftRequest::default())
            .await
            .unwrap();

        let other = f.ctx.at_branch(OTHER_BRANCH).unwrap();
        let err = f
            .db
            .cash()
            .reconcile(&other, &shift.id, Money::from_cents(4_000), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = f
            .db
            .cash()
            .record_transaction(
                &other,
                CashEntryRequest::new(CashTransactionType::Deposit, Money::from_cents(100), "wrong till")
                    .shift(Some(shift.id.as_str())),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let reconciled = f
            .db
            .cash()
            .reconcile(&f.ctx, &shift.id, Money::from_cents(4_000), None)
            .await
            .unwrap();
        assert_eq!(reconciled.variance_cents, Some(0));
    }

    #[tokio::test]
    async fn test_transfer_links_both_legs() {
        let f = fixture().await;
        let cash = f.db.cash();
        cash.deposit(&f.ctx, Money::from_cents(50_000), "bank run").await.unwrap();

        let result = cash
            .transfer(&f.ctx, OTHER_BRANCH, Money::from_cents(20_000), "change float")
            .await
            .unwrap();

        assert_eq!(result.outgoing.amount_cents, -20_000);
        assert_eq!(result.incoming.amount_cents, 20_000);
        assert_eq!(result.outgoing.transfer_ref_id.as_deref(), Some(result.incoming.id.as_str()));
        assert_eq!(result.incoming.transfer_ref_id.as_deref(), Some(result.outgoing.id.as_str()));

        let other = f.ctx.at_branch(OTHER_BRANCH).unwrap();
        assert_eq!(cash.get_balance(&f.ctx).await.unwrap().cents(), 30_000);
        assert_eq!(cash.get_balance(&other).await.unwrap().cents(), 20_000);
        f.assert_cash_chain(BRANCH).await;
        f.assert_cash_chain(OTHER_BRANCH).await;
    }

    #[tokio::test]
    async fn test_transfer_requires_balance() {
        let f = fixture().await;
        let cash = f.db.cash();
        cash.deposit(&f.ctx, Money::from_cents(1_000), "float").await.unwrap();

        let err = cash
            .transfer(&f.ctx, OTHER_BRANCH, Money::from_cents(1_001), "too much")
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientBalance { available: 1_000, .. })
        ));
        assert_eq!(cash.history(&f.ctx, 10).await.unwrap().len(), 1);

        let err = cash
            .transfer(&f.ctx, BRANCH, Money::from_cents(10), "self")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = cash
            .transfer(&f.ctx, "branch-elsewhere", Money::from_cents(10), "nowhere")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_the_chain() {
        let f = fixture().await;
        let cash = f.db.cash();

        let mut handles = Vec::new();
        for i in 0..10 {
            let cash = cash.clone();
            let ctx = f.ctx.clone();
            handles.push(tokio::spawn(async move {
                cash.deposit(&ctx, Money::from_cents(100 + i), "parallel").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let chain = f.assert_cash_chain(BRANCH).await;
        assert_eq!(chain.len(), 10);
        assert_eq!(chain.last().unwrap().balance_after_cents, (100..110).sum::<i64>());
    }

    #[tokio::test]
    async fn test_summary_window() {
        let f = fixture().await;
        let cash = f.db.cash();
        cash.deposit(&f.ctx, Money::from_cents(5_000), "before window").await.unwrap();

        f.clock.advance(Duration::hours(1));
        let from = f.db.now();
        cash.deposit(&f.ctx, Money::from_cents(2_000), "in").await.unwrap();
        cash.expense(&f.ctx, Money::from_cents(700), "out").await.unwrap();
        f.clock.advance(Duration::hours(1));
        let to = f.db.now();
        cash.withdraw(&f.ctx, Money::from_cents(100), "after window").await.unwrap();

        let summary = cash.get_summary(&f.ctx, from, to).await.unwrap();
        assert_eq!(summary.opening_balance_cents, 5_000);
        assert_eq!(summary.closing_balance_cents, 6_300);
        assert_eq!(summary.current_balance_cents, 6_200);
        assert_eq!(summary.total_in_cents, 2_000);
        assert_eq!(summary.total_out_cents, 700);
        assert_eq!(summary.net_cents, 1_300);
        assert_eq!(summary.entry_count, 2);
        assert_eq!(
            summary.by_type,
            vec![
                TypeTotal {
                    transaction_type: CashTransactionType::Deposit,
                    count: 1,
                    amount_cents: 2_000
                },
                TypeTotal {
                    transaction_type: CashTransactionType::Expense,
                    count: 1,
                    amount_cents: -700
                },
            ]
        );
    }
}
