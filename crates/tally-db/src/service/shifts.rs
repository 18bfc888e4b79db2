//! # Shift Session Manager
//!
//! A shift is one cashier's working session at one branch.
//!
//! ```text
//!   open ──► (orders, cash movements tagged with the shift) ──► close ──► reconcile
//!    │                                                            │
//!    └─ opening cash entry                          CAS on `version`, exactly once
//! ```
//!
//! Closing is the only irreversible step. Every close path (normal, forced,
//! handover) writes through the same version check, so of two racing closes
//! exactly one wins and the other gets `ConcurrencyConflict`.

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;

use tally_core::validation::{validate_non_negative_cents, validate_optional_reason, validate_reason};
use tally_core::{CashTransactionType, CoreError, Money, Shift, TenantContext, ValidationError};

use crate::error::PosResult;
use crate::locks::LedgerGuard;
use crate::notify::{dispatch, PosEvent};
use crate::pool::Database;
use crate::repository::{order as order_repo, shift as shift_repo};
use crate::service::cash_ledger::{self, CashEntryRequest, EntryTarget};
use crate::service::{ensure_updated, load_scope, new_id};

/// The version a caller read, for an optimistic close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftVersion {
    pub shift_id: String,
    pub version: i64,
}

impl From<&Shift> for ShiftVersion {
    fn from(shift: &Shift) -> Self {
        ShiftVersion {
            shift_id: shift.id.clone(),
            version: shift.version,
        }
    }
}

/// Close of the acting user's shift.
#[derive(Debug, Clone, Default)]
pub struct CloseShiftRequest {
    /// Counted cash in the drawer.
    pub closing_balance: Money,
    pub notes: Option<String>,
    /// When set, the close only succeeds against exactly this version.
    /// When unset, the open shift is read as the request starts.
    pub expected: Option<ShiftVersion>,
}

/// Hands the drawer from the acting user to another cashier.
#[derive(Debug, Clone)]
pub struct HandoverRequest {
    pub to_user_id: String,
    pub to_user_email: String,
    /// Cash counted at handover; closes one shift and opens the next.
    pub counted_cash: Money,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoverResult {
    pub closed: Shift,
    pub opened: Shift,
}

/// How a shift is being closed.
struct Closing<'a> {
    counted: Option<Money>,
    force: bool,
    notes: Option<&'a str>,
}

/// The Shift Session Manager.
#[derive(Debug, Clone)]
pub struct ShiftService {
    db: Database,
}

impl ShiftService {
    pub fn new(db: Database) -> Self {
        ShiftService { db }
    }

    /// Opens a shift and records the opening float.
    pub async fn open(
        &self,
        ctx: &TenantContext,
        opening_balance: Money,
        notes: Option<&str>,
    ) -> PosResult<Shift> {
        ctx.validate()?;
        validate_non_negative_cents("opening_balance", opening_balance.cents())?;
        let notes = validate_optional_reason("notes", notes)?;

        let guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        load_scope(&mut *tx, ctx).await?;

        let shift = self
            .open_in(&mut *tx, &guard, ctx, opening_balance, notes, true)
            .await?;
        tx.commit().await?;

        info!(
            shift_id = %shift.id,
            user_id = %ctx.user_id,
            branch_id = %ctx.branch_id,
            opening_cents = opening_balance.cents(),
            "Shift opened"
        );
        Ok(shift)
    }

    /// Open shift of the acting user at the acting branch.
    pub async fn current(&self, ctx: &TenantContext) -> PosResult<Option<Shift>> {
        let mut conn = self.db.pool().acquire().await?;
        let shift =
            shift_repo::find_open(&mut *conn, &ctx.tenant_id, &ctx.branch_id, &ctx.user_id).await?;
        Ok(shift)
    }

    /// A shift of the acting branch.
    pub async fn get(&self, ctx: &TenantContext, shift_id: &str) -> PosResult<Shift> {
        let mut conn = self.db.pool().acquire().await?;
        let shift = shift_repo::find_in_branch(&mut *conn, &ctx.tenant_id, &ctx.branch_id, shift_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Shift", shift_id))?;
        Ok(shift)
    }

    /// Shifts of the acting branch, newest first.
    pub async fn list(&self, ctx: &TenantContext, limit: i64) -> PosResult<Vec<Shift>> {
        let mut conn = self.db.pool().acquire().await?;
        let shifts =
            shift_repo::list(&mut *conn, &ctx.tenant_id, &ctx.branch_id, limit.max(1)).await?;
        Ok(shifts)
    }

    /// Closes the acting user's shift with a cash count.
    pub async fn close(&self, ctx: &TenantContext, request: CloseShiftRequest) -> PosResult<Shift> {
        ctx.validate()?;
        validate_non_negative_cents("closing_balance", request.closing_balance.cents())?;
        let notes = validate_optional_reason("notes", request.notes.as_deref())?;

        let expected = match request.expected {
            Some(expected) => expected,
            None => self.snapshot_open(ctx).await?,
        };

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;

        let shift = reload_unchanged(&mut *tx, ctx, &expected).await?;
        if shift.user_id != ctx.user_id {
            return Err(CoreError::not_found("Shift", expected.shift_id.as_str()).into());
        }

        let closing = Closing {
            counted: Some(request.closing_balance),
            force: false,
            notes: notes.as_deref(),
        };
        let closed = self.close_in(&mut *tx, ctx, &shift, expected.version, &closing).await?;
        tx.commit().await?;

        self.announce(&closed);
        Ok(closed)
    }

    /// Administrative close without a cash count: the closing balance is
    /// the expected balance and the difference is zero.
    pub async fn force_close(
        &self,
        ctx: &TenantContext,
        shift_id: &str,
        reason: &str,
    ) -> PosResult<Shift> {
        ctx.validate()?;
        let reason = validate_reason("reason", reason)?;

        let seen = self.get(ctx, shift_id).await?;
        if seen.is_closed {
            return Err(CoreError::conflict("Shift", seen.id.as_str()).into());
        }
        let expected = ShiftVersion::from(&seen);

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;

        let shift = reload_unchanged(&mut *tx, ctx, &expected).await?;
        let closing = Closing {
            counted: None,
            force: true,
            notes: Some(reason.as_str()),
        };
        let closed = self.close_in(&mut *tx, ctx, &shift, expected.version, &closing).await?;
        tx.commit().await?;

        self.announce(&closed);
        Ok(closed)
    }

    /// Closes the acting user's shift with the counted cash and opens a shift
    /// for `to_user_id` at the same branch, carrying the counted cash over as
    /// its opening balance. The drawer does not move, so no opening entry is
    /// written for the new shift.
    pub async fn handover(
        &self,
        ctx: &TenantContext,
        request: HandoverRequest,
    ) -> PosResult<HandoverResult> {
        ctx.validate()?;
        validate_non_negative_cents("counted_cash", request.counted_cash.cents())?;
        let notes = validate_optional_reason("notes", request.notes.as_deref())?;
        let next = ctx.as_user(request.to_user_id.as_str(), request.to_user_email.as_str())?;
        if next.user_id == ctx.user_id {
            return Err(ValidationError::invalid("to_user_id", "must be another user").into());
        }

        let expected = self.snapshot_open(ctx).await?;

        let guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        load_scope(&mut *tx, ctx).await?;

        let shift = reload_unchanged(&mut *tx, ctx, &expected).await?;
        let closing = Closing {
            counted: Some(request.counted_cash),
            force: false,
            notes: notes.as_deref(),
        };
        let closed = self.close_in(&mut *tx, ctx, &shift, expected.version, &closing).await?;

        let carried = format!("Handover from {}", ctx.user_email);
        let opened = self
            .open_in(&mut *tx, &guard, &next, request.counted_cash, Some(carried), false)
            .await?;
        tx.commit().await?;

        info!(
            closed = %closed.id,
            opened = %opened.id,
            to_user = %next.user_id,
            counted_cents = request.counted_cash.cents(),
            "Shift handed over"
        );
        self.announce(&closed);
        Ok(HandoverResult { closed, opened })
    }

    /// Version of the acting user's open shift as the request starts, read
    /// before the ledger lock is taken.
    async fn snapshot_open(&self, ctx: &TenantContext) -> PosResult<ShiftVersion> {
        let shift = self.current(ctx).await?.ok_or(CoreError::NoOpenShift)?;
        Ok(ShiftVersion::from(&shift))
    }

    async fn open_in(
        &self,
        conn: &mut SqliteConnection,
        guard: &LedgerGuard,
        ctx: &TenantContext,
        opening_balance: Money,
        notes: Option<String>,
        record_float: bool,
    ) -> PosResult<Shift> {
        if let Some(open) =
            shift_repo::find_open(&mut *conn, &ctx.tenant_id, &ctx.branch_id, &ctx.user_id).await?
        {
            return Err(CoreError::ShiftAlreadyOpen { shift_id: open.id }.into());
        }

        let now = self.db.now();
        let shift = Shift {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            branch_id: ctx.branch_id.clone(),
            user_id: ctx.user_id.clone(),
            opening_balance_cents: opening_balance.cents(),
            closing_balance_cents: None,
            expected_balance_cents: None,
            difference_cents: None,
            total_orders: 0,
            total_cash_cents: 0,
            total_card_cents: 0,
            is_closed: false,
            force_closed: false,
            version: 1,
            opened_at: now,
            closed_at: None,
            closed_by: None,
            notes,
            reconciled_balance_cents: None,
            variance_cents: None,
            variance_reason: None,
            reconciled_at: None,
            reconciled_by: None,
        };
        shift_repo::insert_shift(&mut *conn, &shift).await?;

        if record_float && opening_balance.is_positive() {
            let request = CashEntryRequest::new(
                CashTransactionType::Opening,
                opening_balance,
                format!("Opening float for shift of {}", ctx.user_email),
            )
            .reference("shift", &shift.id)
            .shift(Some(shift.id.as_str()));
            let target = EntryTarget {
                tenant_id: &ctx.tenant_id,
                branch_id: &ctx.branch_id,
                created_by: &ctx.user_id,
                prefix: &self.db.config().ledger.cash_prefix,
                now,
            };
            cash_ledger::append(conn, guard, &target, &request, None).await?;
        }

        Ok(shift)
    }

    async fn close_in(
        &self,
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        shift: &Shift,
        version: i64,
        closing: &Closing<'_>,
    ) -> PosResult<Shift> {
        let (orders, cash_cents, card_cents) =
            order_repo::shift_sales_totals(&mut *conn, &shift.id).await?;
        let expected = cash_ledger::balance_in(&mut *conn, &shift.tenant_id, &shift.branch_id).await?;
        let counted = closing.counted.unwrap_or(expected);
        let difference = counted - expected;

        let rows = shift_repo::close(
            &mut *conn,
            &shift.id,
            version,
            &shift_repo::ShiftClosing {
                closing_balance_cents: counted.cents(),
                expected_balance_cents: expected.cents(),
                difference_cents: difference.cents(),
                total_orders: orders,
                total_cash_cents: cash_cents,
                total_card_cents: card_cents,
                force_closed: closing.force,
                closed_by: &ctx.user_id,
                notes: closing.notes,
                closed_at: self.db.now(),
            },
        )
        .await?;
        ensure_updated(rows, "Shift", &shift.id)?;

        let closed = shift_repo::find_shift(conn, &shift.tenant_id, &shift.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Shift", shift.id.as_str()))?;

        info!(
            shift_id = %closed.id,
            expected_cents = expected.cents(),
            counted_cents = counted.cents(),
            difference_cents = difference.cents(),
            force = closing.force,
            "Shift closed"
        );
        Ok(closed)
    }

    fn announce(&self, shift: &Shift) {
        dispatch(
            self.db.notifier(),
            PosEvent::ShiftClosed {
                tenant_id: shift.tenant_id.clone(),
                shift_id: shift.id.clone(),
                difference_cents: shift.difference_cents.unwrap_or(0),
                force_closed: shift.force_closed,
            },
        );
    }
}

/// Re-reads a shift inside the transaction. A shift closed or changed since
/// `expected` was read is a `ConcurrencyConflict`.
async fn reload_unchanged(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    expected: &ShiftVersion,
) -> PosResult<Shift> {
    let shift = shift_repo::find_in_branch(conn, &ctx.tenant_id, &ctx.branch_id, &expected.shift_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Shift", expected.shift_id.as_str()))?;
    if shift.is_closed || shift.version != expected.version {
        return Err(CoreError::conflict("Shift", shift.id.as_str()).into());
    }
    Ok(shift)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::service::testing::{fixture, Recorder, BRANCH, CASHIER, OTHER_BRANCH, TENANT};
    use tally_core::ErrorKind;

    #[tokio::test]
    async fn test_open_records_float() {
        let f = fixture().await;
        let shift = f.open_shift(50_000).await;

        assert_eq!(shift.version, 1);
        assert!(!shift.is_closed);
        let entries = f.db.cash().shift_entries(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_type, CashTransactionType::Opening);
        assert_eq!(entries[0].amount_cents, 50_000);
    }

    #[tokio::test]
    async fn test_one_open_shift_per_user_and_branch() {
        let f = fixture().await;
        let first = f.open_shift(1_000).await;

        let err = f
            .db
            .shifts()
            .open(&f.ctx, Money::from_cents(1_000), None)
            .await
            .unwrap_err();
        match err.as_domain() {
            Some(CoreError::ShiftAlreadyOpen { shift_id }) => assert_eq!(shift_id, &first.id),
            other => panic!("expected ShiftAlreadyOpen, got {:?}", other),
        }

        // Another cashier at the same branch may open their own.
        let colleague = f.ctx.as_user("user-2", "second@example.com").unwrap();
        f.db.shifts().open(&colleague, Money::zero(), None).await.unwrap();

        let mut conn = f.db.pool().acquire().await.unwrap();
        let open = shift_repo::count_open(&mut *conn, TENANT, BRANCH, CASHIER).await.unwrap();
        assert_eq!(open, 1);
    }

    #[tokio::test]
    async fn test_close_computes_difference() {
        let recorder = Arc::new(Recorder::default());
        let mut f = fixture().await;
        f.db = f.db.clone().with_notifier(recorder.clone());
        f.open_shift(50_000).await;
        f.db.cash().deposit(&f.ctx, Money::from_cents(2_000), "top-up").await.unwrap();

        let closed = f
            .db
            .shifts()
            .close(
                &f.ctx,
                CloseShiftRequest {
                    closing_balance: Money::from_cents(51_500),
                    notes: Some("short".into()),
                    expected: None,
                },
            )
            .await
            .unwrap();

        assert!(closed.is_closed);
        assert_eq!(closed.version, 2);
        assert_eq!(closed.expected_balance_cents, Some(52_000));
        assert_eq!(closed.difference_cents, Some(-500));
        assert_eq!(closed.closed_by.as_deref(), Some(CASHIER));
        assert!(f.db.shifts().current(&f.ctx).await.unwrap().is_none());

        let events = recorder.events.lock().unwrap();
        assert!(matches!(
            events.as_slice(),
            [PosEvent::ShiftClosed { difference_cents: -500, force_closed: false, .. }]
        ));
    }

    #[tokio::test]
    async fn test_close_without_open_shift() {
        let f = fixture().await;
        let err = f
            .db
            .shifts()
            .close(&f.ctx, CloseShiftRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NoOpenShift)));
    }

    #[tokio::test]
    async fn test_concurrent_close_exactly_one_wins() {
        let f = fixture().await;
        let shift = f.open_shift(10_000).await;
        let shifts = f.db.shifts();
        let request = CloseShiftRequest {
            closing_balance: Money::from_cents(10_000),
            notes: None,
            expected: Some(ShiftVersion::from(&shift)),
        };

        let (a, b) = tokio::join!(
            shifts.close(&f.ctx, request.clone()),
            shifts.close(&f.ctx, request.clone())
        );

        let results = [a, b];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::ConcurrencyConflict);

        let stored = shifts.get(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let f = fixture().await;
        let shift = f.open_shift(0).await;
        let request = CloseShiftRequest {
            closing_balance: Money::zero(),
            notes: None,
            expected: Some(ShiftVersion {
                shift_id: shift.id.clone(),
                version: shift.version + 1,
            }),
        };
        let err = f.db.shifts().close(&f.ctx, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        assert!(!f.db.shifts().get(&f.ctx, &shift.id).await.unwrap().is_closed);
    }

    #[tokio::test]
    async fn test_force_close() {
        let f = fixture().await;
        let shift = f.open_shift(7_500).await;
        let manager = f.ctx.as_user("manager", "manager@example.com").unwrap();

        let err = f.db.shifts().force_close(&manager, &shift.id, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let closed = f
            .db
            .shifts()
            .force_close(&manager, &shift.id, "cashier went home")
            .await
            .unwrap();
        assert!(closed.force_closed);
        assert_eq!(closed.closing_balance_cents, Some(7_500));
        assert_eq!(closed.difference_cents, Some(0));
        assert_eq!(closed.notes.as_deref(), Some("cashier went home"));

        let err = f
            .db
            .shifts()
            .force_close(&manager, &shift.id, "again")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn test_concurrent_default_closes_one_conflicts() {
        let f = fixture().await;
        let shift = f.open_shift(10_000).await;
        let shifts = f.db.shifts();

        let (a, b) = tokio::join!(
            shifts.close(&f.ctx, CloseShiftRequest::default()),
            shifts.close(&f.ctx, CloseShiftRequest::default())
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::ConcurrencyConflict);
        assert!(matches!(
            loser.as_domain(),
            Some(CoreError::ConcurrencyConflict { id, .. }) if id == &shift.id
        ));
        assert_eq!(shifts.get(&f.ctx, &shift.id).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_close_racing_force_close() {
        let f = fixture().await;
        let shift = f.open_shift(3_000).await;
        let manager = f.ctx.as_user("manager", "manager@example.com").unwrap();
        let shifts = f.db.shifts();

        let (a, b) = tokio::join!(
            shifts.close(&f.ctx, CloseShiftRequest::default()),
            shifts.force_close(&manager, &shift.id, "end of day")
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn test_shift_of_other_branch_is_not_found() {
        let f = fixture().await;
        let shift = f.open_shift(1_000).await;
        let elsewhere = f
            .ctx
            .at_branch(OTHER_BRANCH)
            .unwrap()
            .as_user("manager", "manager@example.com")
            .unwrap();

        let err = f.db.shifts().get(&elsewhere, &shift.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = f
            .db
            .shifts()
            .force_close(&elsewhere, &shift.id, "wrong till")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!f.db.shifts().get(&f.ctx, &shift.id).await.unwrap().is_closed);
    }

    #[tokio::test]
    async fn test_handover_carries_cash() {
        let f = fixture().await;
        let first = f.open_shift(20_000).await;

        let result = f
            .db
            .shifts()
            .handover(
                &f.ctx,
                HandoverRequest {
                    to_user_id: "user-2".into(),
                    to_user_email: "second@example.com".into(),
                    counted_cash: Money::from_cents(20_000),
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.closed.id, first.id);
        assert!(result.closed.is_closed);
        assert_eq!(result.opened.user_id, "user-2");
        assert_eq!(result.opened.opening_balance_cents, 20_000);
        assert!(f.db.cash().shift_entries(&f.ctx, &result.opened.id).await.unwrap().is_empty());
        assert_eq!(f.db.cash().get_balance(&f.ctx).await.unwrap().cents(), 20_000);
    }

    #[tokio::test]
    async fn test_reconcile_once_with_variance_entry() {
        let f = fixture().await;
        let shift = f.open_shift(10_000).await;
        f.db.cash().expense(&f.ctx, Money::from_cents(1_000), "milk").await.unwrap();

        let err = f
            .db
            .cash()
            .reconcile(&f.ctx, &shift.id, Money::from_cents(9_000), None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::ShiftAlreadyOpen { .. })));

        f.db.shifts()
            .close(
                &f.ctx,
                CloseShiftRequest {
                    closing_balance: Money::from_cents(8_800),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = f
            .db
            .cash()
            .reconcile(&f.ctx, &shift.id, Money::from_cents(8_800), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let reconciled = f
            .db
            .cash()
            .reconcile(&f.ctx, &shift.id, Money::from_cents(8_800), Some("coins miscounted"))
            .await
            .unwrap();
        assert_eq!(reconciled.reconciled_balance_cents, Some(8_800));
        assert_eq!(reconciled.variance_cents, Some(-200));
        assert_eq!(reconciled.variance_reason.as_deref(), Some("coins miscounted"));
        assert_eq!(f.db.cash().get_balance(&f.ctx).await.unwrap().cents(), 8_800);

        let err = f
            .db
            .cash()
            .reconcile(&f.ctx, &shift.id, Money::from_cents(8_800), None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::ShiftAlreadyReconciled { .. })));
        f.assert_cash_chain(BRANCH).await;
    }
}
