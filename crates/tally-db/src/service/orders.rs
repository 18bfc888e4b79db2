//! # Order Lifecycle Engine
//!
//! Creates and edits draft orders, and fans completion and refunds out into
//! the stock ledger, the cash ledger and the customer counters inside one
//! transaction.
//!
//! ## Completion
//! ```text
//! complete(order, tenders)
//!   ├── Draft/Pending → Completed allowed?       InvalidStateTransition
//!   ├── order's shift still open?                ShiftClosed
//!   ├── settle tenders                           PaymentInsufficient / OverpaymentLimit
//!   ├── credit tender within limit?              CreditLimitExceeded
//!   ├── payments, status (guarded on old status)
//!   ├── stock batch decrement                    InsufficientStock
//!   ├── customer counters, credit outstanding
//!   └── cash `sale` entry for the cash share only
//! ```
//!
//! ## Refund
//! A refund never edits the sale's lines. It writes a new `return` order
//! whose lines are the negated refunded share, restocks, accumulates the
//! refunded amount on the sale, and pays the cash share out of the drawer.
//! The amounts come from [`tally_core::refund::plan_refund`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use tally_core::lifecycle::{ensure_editable, ensure_transition};
use tally_core::numbering;
use tally_core::pricing::{
    order_totals, price_line, resolve_tax_rate, totals_for_items, LineAmounts, LineInput, OrderTotals,
};
use tally_core::refund::plan_refund;
use tally_core::settlement::settle;
use tally_core::validation::{
    validate_non_negative_cents, validate_optional_reason, validate_order_size, validate_quantity,
    validate_reason,
};
use tally_core::{
    CashTransactionType, CoreError, Money, Order, OrderItem, OrderStatus, OrderType,
    Payment, Product, RefundLog, RefundSelection, StockChange, StockReferenceType, TaxRate, Tender,
    Tenant, TenantContext, ValidationError,
};

use crate::error::PosResult;
use crate::notify::{dispatch, PosEvent};
use crate::pool::Database;
use crate::repository::{catalog, order as order_repo, shift as shift_repo, stock};
use crate::service::cash_ledger::{self, CashEntryRequest, EntryTarget};
use crate::service::stock_ledger::{apply_batch, MovementSource};
use crate::service::{customer_stats, ensure_updated, load_scope, new_id};

// =============================================================================
// Requests and Responses
// =============================================================================

/// One requested line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
    /// Line discount.
    #[serde(default)]
    pub discount: Money,
}

impl OrderLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        OrderLine {
            product_id: product_id.into(),
            quantity,
            discount: Money::zero(),
        }
    }

    pub fn discounted(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub order_type: OrderType,
    pub items: Vec<OrderLine>,
    pub customer_id: Option<String>,
    /// Order-level discount.
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub service_charge: Money,
    pub notes: Option<String>,
}

impl CreateOrderRequest {
    /// A plain sale of `items`.
    pub fn sale(items: Vec<OrderLine>) -> Self {
        CreateOrderRequest {
            order_type: OrderType::Sale,
            items,
            customer_id: None,
            discount: Money::zero(),
            service_charge: Money::zero(),
            notes: None,
        }
    }
}

/// An order with its lines and tenders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

// =============================================================================
// OrderService
// =============================================================================

/// The Order Lifecycle Engine.
#[derive(Debug, Clone)]
pub struct OrderService {
    db: Database,
}

impl OrderService {
    pub fn new(db: Database) -> Self {
        OrderService { db }
    }

    /// Creates a Draft sale in the acting user's open shift.
    pub async fn create(
        &self,
        ctx: &TenantContext,
        request: CreateOrderRequest,
    ) -> PosResult<OrderDetails> {
        ctx.validate()?;
        if request.order_type != OrderType::Sale {
            return Err(ValidationError::invalid(
                "order_type",
                "only sales can be created, returns come from refunds",
            )
            .into());
        }
        if request.items.is_empty() {
            return Err(CoreError::EmptyOrder.into());
        }
        validate_order_size(request.items.len())?;
        for line in &request.items {
            validate_quantity(line.quantity)?;
            validate_non_negative_cents("discount", line.discount.cents())?;
        }
        let notes = validate_optional_reason("notes", request.notes.as_deref())?;

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (tenant, branch) = load_scope(&mut *tx, ctx).await?;

        let shift = shift_repo::find_open(&mut *tx, &ctx.tenant_id, &ctx.branch_id, &ctx.user_id)
            .await?
            .ok_or(CoreError::NoOpenShift)?;

        if let Some(customer_id) = &request.customer_id {
            let customer = catalog::find_customer(&mut *tx, &ctx.tenant_id, customer_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Customer", customer_id.as_str()))?;
            if !customer.is_active {
                return Err(ValidationError::invalid("customer_id", "customer is inactive").into());
            }
        }

        let now = self.db.now();
        let order_id = new_id();
        let mut products = Vec::with_capacity(request.items.len());
        for line in &request.items {
            products.push(load_sellable(&mut *tx, &ctx.tenant_id, &line.product_id).await?);
        }
        for product in &products {
            let wanted: i64 = request
                .items
                .iter()
                .filter(|l| l.product_id == product.id)
                .map(|l| l.quantity)
                .sum();
            ensure_stock(&mut *tx, &tenant, &ctx.branch_id, product, wanted).await?;
        }

        let mut items = Vec::with_capacity(request.items.len());
        for (line, product) in request.items.iter().zip(&products) {
            let rate = resolve_tax_rate(product, &tenant);
            items.push(new_item(&order_id, product, line.quantity, rate, line.discount, now)?);
        }
        let amounts: Vec<LineAmounts> = items.iter().map(line_amounts).collect();
        let totals = order_totals(&amounts, request.discount, request.service_charge)?;

        let order = Order {
            id: order_id,
            tenant_id: ctx.tenant_id.clone(),
            branch_id: ctx.branch_id.clone(),
            shift_id: Some(shift.id),
            order_number: numbering::order_number(&self.db.config().ledger.order_prefix, now),
            order_type: OrderType::Sale,
            status: OrderStatus::Draft,
            customer_id: request.customer_id.clone(),
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            service_charge_cents: totals.service_charge.cents(),
            total_cents: totals.total.cents(),
            amount_paid_cents: 0,
            amount_due_cents: totals.total.cents(),
            change_cents: 0,
            cash_paid_cents: 0,
            credit_paid_cents: 0,
            refund_amount_cents: 0,
            branch_name: branch.name.clone(),
            branch_address: branch.address.clone(),
            currency_code: branch.currency_code.clone(),
            original_order_id: None,
            notes,
            created_by: ctx.user_id.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            refunded_at: None,
            refunded_by: None,
            refund_reason: None,
        };
        order_repo::insert_order(&mut *tx, &order).await?;
        for item in &items {
            order_repo::insert_item(&mut *tx, item).await?;
        }
        tx.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = items.len(),
            total_cents = order.total_cents,
            "Order created"
        );
        Ok(OrderDetails {
            order,
            items,
            payments: Vec::new(),
        })
    }

    /// Adds a line to a Draft order.
    pub async fn add_item(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        line: OrderLine,
    ) -> PosResult<OrderDetails> {
        ctx.validate()?;
        validate_quantity(line.quantity)?;
        validate_non_negative_cents("discount", line.discount.cents())?;

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (tenant, _) = load_scope(&mut *tx, ctx).await?;
        let order = load_order(&mut *tx, ctx, order_id).await?;
        ensure_editable(&order.id, order.status)?;

        let product = load_sellable(&mut *tx, &ctx.tenant_id, &line.product_id).await?;
        let items = order_repo::list_items(&mut *tx, &order.id).await?;
        validate_order_size(items.len() + 1)?;
        let reserved: i64 = items
            .iter()
            .filter(|i| i.product_id == product.id)
            .map(|i| i.quantity)
            .sum();
        ensure_stock(&mut *tx, &tenant, &order.branch_id, &product, reserved + line.quantity).await?;

        let rate = resolve_tax_rate(&product, &tenant);
        let item = new_item(&order.id, &product, line.quantity, rate, line.discount, self.db.now())?;
        order_repo::insert_item(&mut *tx, &item).await?;
        self.recompute(&mut *tx, &order).await?;

        let details = load_details(&mut *tx, &ctx.tenant_id, &order.id).await?;
        tx.commit().await?;

        debug!(order_id = %order.id, product_id = %item.product_id, "Item added");
        Ok(details)
    }

    /// Changes the quantity of a Draft line, keeping its frozen price.
    pub async fn update_item_quantity(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        item_id: &str,
        quantity: i64,
    ) -> PosResult<OrderDetails> {
        ctx.validate()?;
        validate_quantity(quantity)?;

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (tenant, _) = load_scope(&mut *tx, ctx).await?;
        let order = load_order(&mut *tx, ctx, order_id).await?;
        ensure_editable(&order.id, order.status)?;

        let items = order_repo::list_items(&mut *tx, &order.id).await?;
        let item = items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CoreError::not_found("OrderItem", item_id))?;
        let product = catalog::find_product(&mut *tx, &ctx.tenant_id, &item.product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", item.product_id.as_str()))?;
        let elsewhere: i64 = items
            .iter()
            .filter(|i| i.product_id == item.product_id && i.id != item.id)
            .map(|i| i.quantity)
            .sum();
        ensure_stock(&mut *tx, &tenant, &order.branch_id, &product, elsewhere + quantity).await?;

        let amounts = price_line(&LineInput {
            unit_price: Money::from_cents(item.unit_price_cents),
            quantity,
            tax_rate: TaxRate::from_bps(item.tax_rate_bps),
            discount: Money::from_cents(item.discount_cents),
        })?;
        let rows = order_repo::update_item_amounts(&mut *tx, &item.id, quantity, &amounts).await?;
        ensure_updated(rows, "OrderItem", &item.id)?;
        self.recompute(&mut *tx, &order).await?;

        let details = load_details(&mut *tx, &ctx.tenant_id, &order.id).await?;
        tx.commit().await?;

        debug!(order_id = %order.id, item_id, quantity, "Item quantity changed");
        Ok(details)
    }

    /// Removes a Draft line. The last line cannot be removed.
    pub async fn remove_item(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        item_id: &str,
    ) -> PosResult<OrderDetails> {
        ctx.validate()?;

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        load_scope(&mut *tx, ctx).await?;
        let order = load_order(&mut *tx, ctx, order_id).await?;
        ensure_editable(&order.id, order.status)?;

        let rows = order_repo::delete_item(&mut *tx, &order.id, item_id).await?;
        if rows == 0 {
            return Err(CoreError::not_found("OrderItem", item_id).into());
        }
        self.recompute(&mut *tx, &order).await?;

        let details = load_details(&mut *tx, &ctx.tenant_id, &order.id).await?;
        tx.commit().await?;

        debug!(order_id = %order.id, item_id, "Item removed");
        Ok(details)
    }

    /// Parks a Draft order awaiting payment.
    pub async fn hold(&self, ctx: &TenantContext, order_id: &str) -> PosResult<Order> {
        ctx.validate()?;

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let order = load_order(&mut *tx, ctx, order_id).await?;
        ensure_transition(&order.id, order.status, OrderStatus::Pending)?;

        let rows = order_repo::set_status(
            &mut *tx,
            &order.id,
            order.status,
            OrderStatus::Pending,
            self.db.now(),
        )
        .await?;
        ensure_updated(rows, "Order", &order.id)?;
        let held = reload(&mut *tx, &ctx.tenant_id, &order.id).await?;
        tx.commit().await?;

        info!(order_id = %held.id, "Order held");
        Ok(held)
    }

    /// Abandons a Draft or Pending order. Nothing was committed to stock or
    /// cash, so nothing is reversed.
    pub async fn cancel(&self, ctx: &TenantContext, order_id: &str, reason: &str) -> PosResult<Order> {
        ctx.validate()?;
        let reason = validate_reason("reason", reason)?;

        let _guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let order = load_order(&mut *tx, ctx, order_id).await?;
        ensure_transition(&order.id, order.status, OrderStatus::Cancelled)?;

        let rows = order_repo::mark_cancelled(
            &mut *tx,
            &order.id,
            order.status,
            &ctx.user_id,
            &reason,
            self.db.now(),
        )
        .await?;
        ensure_updated(rows, "Order", &order.id)?;
        let cancelled = reload(&mut *tx, &ctx.tenant_id, &order.id).await?;
        tx.commit().await?;

        info!(order_id = %cancelled.id, reason = %reason, "Order cancelled");
        Ok(cancelled)
    }

    /// Settles an order and commits it to every ledger.
    pub async fn complete(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        tenders: Vec<Tender>,
    ) -> PosResult<OrderDetails> {
        ctx.validate()?;

        let guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (tenant, _) = load_scope(&mut *tx, ctx).await?;
        let order = load_order(&mut *tx, ctx, order_id).await?;
        ensure_transition(&order.id, order.status, OrderStatus::Completed)?;

        let shift_id = order.shift_id.clone().unwrap_or_default();
        let shift = shift_repo::find_shift(&mut *tx, &ctx.tenant_id, &shift_id).await?;
        let shift = match shift {
            Some(s) if !s.is_closed => s,
            _ => return Err(CoreError::ShiftClosed { shift_id }.into()),
        };

        let items = order_repo::list_items(&mut *tx, &order.id).await?;
        if items.is_empty() {
            return Err(CoreError::EmptyOrder.into());
        }

        let config = self.db.config();
        let settlement = settle(order.total(), &tenders, config.payments.max_overpayment_ratio_bps)?;
        if settlement.credit_paid.is_positive() {
            let customer_id = order
                .customer_id
                .as_deref()
                .ok_or_else(|| ValidationError::required("customer_id"))?;
            let customer = catalog::find_customer(&mut *tx, &ctx.tenant_id, customer_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Customer", customer_id))?;
            customer_stats::ensure_credit_available(&customer, settlement.credit_paid)?;
        }

        let now = self.db.now();
        for tender in &tenders {
            order_repo::insert_payment(
                &mut *tx,
                &Payment {
                    id: new_id(),
                    order_id: order.id.clone(),
                    method: tender.method,
                    amount_cents: tender.amount_cents,
                    reference: tender.reference.clone(),
                    created_at: now,
                },
            )
            .await?;
        }

        let rows = order_repo::mark_completed(&mut *tx, &order.id, order.status, &settlement, now).await?;
        ensure_updated(rows, "Order", &order.id)?;

        let lines: Vec<(String, i64)> = items
            .iter()
            .map(|i| (i.product_id.clone(), i.quantity))
            .collect();
        let source = MovementSource {
            tenant_id: &ctx.tenant_id,
            branch_id: &order.branch_id,
            reference_type: StockReferenceType::Sale,
            reference_id: Some(order.id.as_str()),
            reason: None,
            created_by: &ctx.user_id,
            allow_negative: tenant.allow_negative_stock,
            now,
        };
        let movements = apply_batch(&mut *tx, &lines, -1, &source).await?;

        if let Some(customer_id) = &order.customer_id {
            customer_stats::record_sale(
                &mut *tx,
                &ctx.tenant_id,
                customer_id,
                order.total(),
                config.loyalty.points_per_unit,
                now,
            )
            .await?;
            customer_stats::charge_credit(&mut *tx, &ctx.tenant_id, customer_id, settlement.credit_paid, now)
                .await?;
        }

        if settlement.cash_paid.is_positive() {
            let request = CashEntryRequest::new(
                CashTransactionType::Sale,
                settlement.cash_paid,
                format!("Sale {}", order.order_number),
            )
            .reference("order", &order.id)
            .shift(Some(shift.id.as_str()));
            let target = EntryTarget {
                tenant_id: &ctx.tenant_id,
                branch_id: &order.branch_id,
                created_by: &ctx.user_id,
                prefix: &config.ledger.cash_prefix,
                now,
            };
            cash_ledger::append(&mut *tx, &guard, &target, &request, None).await?;
        }

        let details = load_details(&mut *tx, &ctx.tenant_id, &order.id).await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total_cents = order.total_cents,
            cash_cents = settlement.cash_paid.cents(),
            change_cents = settlement.change.cents(),
            stock_movements = movements.len(),
            "Order completed"
        );
        dispatch(
            self.db.notifier(),
            PosEvent::OrderCompleted {
                tenant_id: ctx.tenant_id.clone(),
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                total_cents: order.total_cents,
            },
        );
        Ok(details)
    }

    /// Refunds all remaining units (`RefundSelection::Full`, reason required)
    /// or the listed `(item_id, quantity)` pairs, and returns the return order.
    pub async fn refund(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        selection: RefundSelection,
        reason: Option<&str>,
    ) -> PosResult<OrderDetails> {
        ctx.validate()?;
        let reason = validate_optional_reason("reason", reason)?;

        let guard = self.db.locks().acquire(&ctx.tenant_id).await;
        let mut tx = self.db.pool().begin().await?;
        let (tenant, branch) = load_scope(&mut *tx, ctx).await?;
        let original = load_order(&mut *tx, ctx, order_id).await?;
        let items = order_repo::list_items(&mut *tx, &original.id).await?;
        let plan = plan_refund(&original, &items, &selection, reason.as_deref())?;

        let shift = shift_repo::find_open(&mut *tx, &ctx.tenant_id, &ctx.branch_id, &ctx.user_id).await?;
        let shift_id = shift.as_ref().map(|s| s.id.clone());
        let config = self.db.config();
        let now = self.db.now();

        let total = plan.total();
        let return_order = Order {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            branch_id: original.branch_id.clone(),
            shift_id: shift_id.clone(),
            order_number: numbering::order_number(&config.ledger.return_prefix, now),
            order_type: OrderType::Return,
            status: OrderStatus::Completed,
            customer_id: original.customer_id.clone(),
            subtotal_cents: plan.subtotal().cents(),
            tax_cents: plan.tax().cents(),
            discount_cents: -plan.discount_share.cents(),
            service_charge_cents: -plan.service_charge_share.cents(),
            total_cents: total.cents(),
            amount_paid_cents: total.cents(),
            amount_due_cents: 0,
            change_cents: 0,
            cash_paid_cents: -plan.cash_refund.cents(),
            credit_paid_cents: -plan.credit_refund.cents(),
            refund_amount_cents: 0,
            branch_name: branch.name.clone(),
            branch_address: branch.address.clone(),
            currency_code: branch.currency_code.clone(),
            original_order_id: Some(original.id.clone()),
            notes: reason.clone(),
            created_by: ctx.user_id.clone(),
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            refunded_at: None,
            refunded_by: None,
            refund_reason: None,
        };
        order_repo::insert_order(&mut *tx, &return_order).await?;

        for line in &plan.lines {
            let sold = items
                .iter()
                .find(|i| i.id == line.original_item_id)
                .ok_or_else(|| CoreError::not_found("OrderItem", line.original_item_id.as_str()))?;
            let item = OrderItem {
                id: new_id(),
                order_id: return_order.id.clone(),
                product_id: line.product_id.clone(),
                name_snapshot: sold.name_snapshot.clone(),
                sku_snapshot: sold.sku_snapshot.clone(),
                barcode_snapshot: sold.barcode_snapshot.clone(),
                unit_price_cents: line.unit_price.cents(),
                quantity: line.quantity,
                tax_rate_bps: sold.tax_rate_bps,
                discount_cents: line.discount.cents(),
                subtotal_cents: line.subtotal.cents(),
                tax_cents: line.tax.cents(),
                total_cents: line.total.cents(),
                refunded_quantity: 0,
                created_at: now,
            };
            order_repo::insert_item(&mut *tx, &item).await?;
            let rows = order_repo::set_refunded_quantity(
                &mut *tx,
                &sold.id,
                sold.refunded_quantity,
                line.refunded_quantity_after,
            )
            .await?;
            ensure_updated(rows, "OrderItem", &sold.id)?;
        }

        let source = MovementSource {
            tenant_id: &ctx.tenant_id,
            branch_id: &original.branch_id,
            reference_type: StockReferenceType::Refund,
            reference_id: Some(return_order.id.as_str()),
            reason: reason.as_deref(),
            created_by: &ctx.user_id,
            allow_negative: tenant.allow_negative_stock,
            now,
        };
        let movements = apply_batch(&mut *tx, &plan.restock(), 1, &source).await?;
        let stock_changes: Vec<StockChange> = movements
            .iter()
            .map(|m| StockChange {
                product_id: m.product_id.clone(),
                quantity: m.delta,
                balance_before: m.balance_before,
                balance_after: m.balance_after,
            })
            .collect();

        let rows = order_repo::record_refund(
            &mut *tx,
            &original.id,
            original.status,
            plan.new_status,
            plan.refund_amount.cents(),
            &ctx.user_id,
            reason.as_deref(),
            now,
        )
        .await?;
        ensure_updated(rows, "Order", &original.id)?;

        order_repo::insert_refund_log(
            &mut *tx,
            &RefundLog {
                id: new_id(),
                tenant_id: ctx.tenant_id.clone(),
                branch_id: original.branch_id.clone(),
                original_order_id: original.id.clone(),
                return_order_id: return_order.id.clone(),
                refund_amount_cents: plan.refund_amount.cents(),
                reason: reason.clone(),
                stock_changes: serde_json::to_string(&stock_changes)?,
                created_by: ctx.user_id.clone(),
                created_at: now,
            },
        )
        .await?;

        if let Some(customer_id) = &original.customer_id {
            customer_stats::record_refund(
                &mut *tx,
                &ctx.tenant_id,
                customer_id,
                plan.refund_amount,
                config.loyalty.points_per_unit,
                plan.fully_refunded(),
                now,
            )
            .await?;
            customer_stats::release_credit(&mut *tx, &ctx.tenant_id, customer_id, plan.credit_refund, now)
                .await?;
        }

        if plan.cash_refund.is_positive() {
            let request = CashEntryRequest::new(
                CashTransactionType::Refund,
                plan.cash_refund,
                format!("Refund {} for {}", return_order.order_number, original.order_number),
            )
            .reference("order", &return_order.id)
            .shift(shift_id.as_deref());
            let target = EntryTarget {
                tenant_id: &ctx.tenant_id,
                branch_id: &original.branch_id,
                created_by: &ctx.user_id,
                prefix: &config.ledger.cash_prefix,
                now,
            };
            cash_ledger::append(&mut *tx, &guard, &target, &request, None).await?;
        }

        let details = load_details(&mut *tx, &ctx.tenant_id, &return_order.id).await?;
        tx.commit().await?;

        info!(
            order_id = %original.id,
            return_order_id = %return_order.id,
            refund_cents = plan.refund_amount.cents(),
            cash_cents = plan.cash_refund.cents(),
            status = ?plan.new_status,
            "Order refunded"
        );
        dispatch(
            self.db.notifier(),
            PosEvent::OrderRefunded {
                tenant_id: ctx.tenant_id.clone(),
                order_id: original.id.clone(),
                return_order_id: return_order.id.clone(),
                refund_amount_cents: plan.refund_amount.cents(),
            },
        );
        Ok(details)
    }

    /// An order of the acting branch with its lines and payments.
    pub async fn get(&self, ctx: &TenantContext, order_id: &str) -> PosResult<OrderDetails> {
        let mut conn = self.db.pool().acquire().await?;
        let order = load_order(&mut *conn, ctx, order_id).await?;
        load_details(&mut *conn, &ctx.tenant_id, &order.id).await
    }

    /// Orders of one shift, oldest first.
    pub async fn list_by_shift(&self, ctx: &TenantContext, shift_id: &str) -> PosResult<Vec<Order>> {
        let mut conn = self.db.pool().acquire().await?;
        let orders = order_repo::list_by_shift(&mut *conn, &ctx.tenant_id, shift_id).await?;
        Ok(orders)
    }

    /// Return orders produced from a sale, oldest first.
    pub async fn returns_of(&self, ctx: &TenantContext, order_id: &str) -> PosResult<Vec<Order>> {
        let mut conn = self.db.pool().acquire().await?;
        let orders = order_repo::list_returns(&mut *conn, &ctx.tenant_id, order_id).await?;
        Ok(orders)
    }

    /// Refund audit records of a sale, oldest first.
    pub async fn refund_logs(&self, ctx: &TenantContext, order_id: &str) -> PosResult<Vec<RefundLog>> {
        let mut conn = self.db.pool().acquire().await?;
        let logs = order_repo::list_refund_logs(&mut *conn, &ctx.tenant_id, order_id).await?;
        Ok(logs)
    }

    /// Rewrites a Draft order's totals from its persisted lines.
    async fn recompute(&self, conn: &mut SqliteConnection, order: &Order) -> PosResult<OrderTotals> {
        let items = order_repo::list_items(&mut *conn, &order.id).await?;
        if items.is_empty() {
            return Err(CoreError::EmptyOrder.into());
        }
        let totals = totals_for_items(
            &items,
            Money::from_cents(order.discount_cents),
            Money::from_cents(order.service_charge_cents),
        )?;
        let rows = order_repo::update_totals(conn, &order.id, &totals, self.db.now()).await?;
        ensure_updated(rows, "Order", &order.id)?;
        Ok(totals)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Loads an order of the acting tenant and branch.
async fn load_order(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    order_id: &str,
) -> PosResult<Order> {
    let order = order_repo::find_order(conn, &ctx.tenant_id, order_id)
        .await?
        .filter(|o| o.branch_id == ctx.branch_id)
        .ok_or_else(|| CoreError::not_found("Order", order_id))?;
    Ok(order)
}

async fn reload(conn: &mut SqliteConnection, tenant_id: &str, order_id: &str) -> PosResult<Order> {
    let order = order_repo::find_order(conn, tenant_id, order_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Order", order_id))?;
    Ok(order)
}

async fn load_details(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    order_id: &str,
) -> PosResult<OrderDetails> {
    let order = reload(&mut *conn, tenant_id, order_id).await?;
    let items = order_repo::list_items(&mut *conn, order_id).await?;
    let payments = order_repo::list_payments(conn, order_id).await?;
    Ok(OrderDetails {
        order,
        items,
        payments,
    })
}

/// Loads a product that may be sold.
async fn load_sellable(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
) -> PosResult<Product> {
    let product = catalog::find_product(conn, tenant_id, product_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Product", product_id))?;
    if !product.is_active {
        return Err(ValidationError::invalid(
            format!("items[{}]", product_id),
            "product is inactive",
        )
        .into());
    }
    Ok(product)
}

/// Checks that `wanted` units of a tracked product are on hand, unless the
/// tenant sells into negative stock.
async fn ensure_stock(
    conn: &mut SqliteConnection,
    tenant: &Tenant,
    branch_id: &str,
    product: &Product,
    wanted: i64,
) -> PosResult<()> {
    if !product.track_inventory || tenant.allow_negative_stock {
        return Ok(());
    }
    let available = stock::get_quantity(conn, &tenant.id, branch_id, &product.id).await?;
    if wanted > available {
        return Err(CoreError::InsufficientStock {
            product_id: product.id.clone(),
            requested: wanted,
            available,
        }
        .into());
    }
    Ok(())
}

/// Prices a new line and freezes the product snapshot onto it.
fn new_item(
    order_id: &str,
    product: &Product,
    quantity: i64,
    tax_rate: TaxRate,
    discount: Money,
    now: DateTime<Utc>,
) -> PosResult<OrderItem> {
    let amounts = price_line(&LineInput {
        unit_price: product.price(),
        quantity,
        tax_rate,
        discount,
    })?;
    Ok(OrderItem {
        id: new_id(),
        order_id: order_id.to_string(),
        product_id: product.id.clone(),
        name_snapshot: product.name.clone(),
        sku_snapshot: product.sku.clone(),
        barcode_snapshot: product.barcode.clone(),
        unit_price_cents: product.price_cents,
        quantity,
        tax_rate_bps: tax_rate.bps(),
        discount_cents: discount.cents(),
        subtotal_cents: amounts.subtotal.cents(),
        tax_cents: amounts.tax.cents(),
        total_cents: amounts.total.cents(),
        refunded_quantity: 0,
        created_at: now,
    })
}

fn line_amounts(item: &OrderItem) -> LineAmounts {
    LineAmounts {
        subtotal: Money::from_cents(item.subtotal_cents),
        tax: Money::from_cents(item.tax_cents),
        total: Money::from_cents(item.total_cents),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::service::testing::{
        fixture, fixture_with, Fixture, Offline, Recorder, BRANCH, OTHER_BRANCH, TENANT,
    };
    use tally_core::{ErrorKind, PaymentMethod};

    async fn draft(f: &Fixture, lines: Vec<OrderLine>) -> OrderDetails {
        f.db.orders()
            .create(&f.ctx, CreateOrderRequest::sale(lines))
            .await
            .unwrap()
    }

    /// Scenario A order, completed with 250.00 cash.
    async fn completed_sale(f: &Fixture) -> (Product, OrderDetails) {
        let product = f.stocked("COF-1", 10_000, 10).await;
        let order = draft(f, vec![OrderLine::new(&product.id, 2)]).await;
        let done = f
            .db
            .orders()
            .complete(&f.ctx, &order.order.id, vec![Tender::cash(25_000)])
            .await
            .unwrap();
        (product, done)
    }

    fn assert_arithmetic(details: &OrderDetails) {
        let o = &details.order;
        for item in &details.items {
            assert_eq!(item.total_cents, item.subtotal_cents + item.tax_cents);
        }
        let items_total: i64 = details.items.iter().map(|i| i.total_cents).sum();
        assert_eq!(o.total_cents, items_total - o.discount_cents + o.service_charge_cents);
        assert_eq!(o.subtotal_cents, details.items.iter().map(|i| i.subtotal_cents).sum::<i64>());
        assert_eq!(o.tax_cents, details.items.iter().map(|i| i.tax_cents).sum::<i64>());
    }

    #[tokio::test]
    async fn test_scenario_a_totals() {
        let f = fixture().await;
        f.open_shift(0).await;
        let product = f.stocked("COF-1", 10_000, 10).await;

        let details = draft(&f, vec![OrderLine::new(&product.id, 2)]).await;

        let item = &details.items[0];
        assert_eq!(item.subtotal_cents, 20_000);
        assert_eq!(item.tax_cents, 2_800);
        assert_eq!(item.total_cents, 22_800);
        assert_eq!(item.tax_rate_bps, 1400);
        assert_eq!(details.order.total_cents, 22_800);
        assert_eq!(details.order.status, OrderStatus::Draft);
        assert_eq!(details.order.branch_name, "Downtown");
        assert!(details.order.order_number.starts_with("ORD-20260315-"));
        // Drafts reserve nothing.
        assert_eq!(f.db.stock().get_quantity(&f.ctx, &product.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_arithmetic_with_discounts_and_service_charge() {
        let f = fixture().await;
        f.open_shift(0).await;
        let tea = f.stocked("TEA-1", 1_999, 10).await;
        let cake = f
            .product_with("CAKE-1", 4_550, |p| {
                p.tax_rate_bps = Some(500);
                p.track_inventory = false;
            })
            .await;

        let mut request = CreateOrderRequest::sale(vec![
            OrderLine::new(&tea.id, 3).discounted(Money::from_cents(333)),
            OrderLine::new(&cake.id, 1),
        ]);
        request.discount = Money::from_cents(250);
        request.service_charge = Money::from_cents(1_200);
        let details = f.db.orders().create(&f.ctx, request).await.unwrap();

        // 3 × 19.99 − 3.33 = 56.64, tax 7.93; 45.50 at 5% = 2.28
        assert_eq!(details.items[0].subtotal_cents, 5_664);
        assert_eq!(details.items[0].tax_cents, 793);
        assert_eq!(details.items[1].tax_cents, 228);
        assert_eq!(details.order.total_cents, 6_457 + 4_778 - 250 + 1_200);
        assert_arithmetic(&details);
    }

    #[tokio::test]
    async fn test_tax_disabled_tenant() {
        let f = fixture_with(|t| t.tax_enabled = false).await;
        f.open_shift(0).await;
        let product = f.product_with("X", 10_000, |p| p.tax_rate_bps = Some(1400)).await;
        f.db.stock().set_initial(&f.ctx, &product.id, 3).await.unwrap();

        let details = draft(&f, vec![OrderLine::new(&product.id, 1)]).await;
        assert_eq!(details.items[0].tax_cents, 0);
        assert_eq!(details.order.tax_cents, 0);
        assert_eq!(details.order.total_cents, 10_000);

        let done = f
            .db
            .orders()
            .complete(&f.ctx, &details.order.id, vec![Tender::cash(10_000)])
            .await
            .unwrap();
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert_eq!(done.order.change_cents, 0);
    }

    #[tokio::test]
    async fn test_create_preconditions() {
        let f = fixture().await;
        let product = f.stocked("COF-1", 10_000, 5).await;
        let orders = f.db.orders();

        let err = orders
            .create(&f.ctx, CreateOrderRequest::sale(vec![OrderLine::new(&product.id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NoOpenShift)));

        f.open_shift(0).await;
        let err = orders.create(&f.ctx, CreateOrderRequest::sale(vec![])).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::EmptyOrder)));

        // Two lines of the same product are checked together.
        let err = orders
            .create(
                &f.ctx,
                CreateOrderRequest::sale(vec![
                    OrderLine::new(&product.id, 3),
                    OrderLine::new(&product.id, 3),
                ]),
            )
            .await
            .unwrap_err();
        match err.as_domain() {
            Some(CoreError::InsufficientStock { requested, available, .. }) => {
                assert_eq!((*requested, *available), (6, 5));
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }

        let retired = f.product_with("OLD", 100, |p| p.is_active = false).await;
        let err = orders
            .create(&f.ctx, CreateOrderRequest::sale(vec![OrderLine::new(&retired.id, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = CreateOrderRequest::sale(vec![OrderLine::new(&product.id, 1)]);
        request.order_type = OrderType::Return;
        let err = orders.create(&f.ctx, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = orders
            .create(&f.ctx, CreateOrderRequest::sale(vec![OrderLine::new("nope", 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_draft_edits_recompute_totals() {
        let f = fixture().await;
        f.open_shift(0).await;
        let coffee = f.stocked("COF-1", 10_000, 4).await;
        let tea = f.stocked("TEA-1", 500, 10).await;
        let orders = f.db.orders();
        let order = draft(&f, vec![OrderLine::new(&coffee.id, 2)]).await;
        let id = order.order.id.clone();

        let details = orders.add_item(&f.ctx, &id, OrderLine::new(&tea.id, 2)).await.unwrap();
        assert_eq!(details.items.len(), 2);
        assert_eq!(details.order.total_cents, 22_800 + 1_140);
        assert_arithmetic(&details);

        // 2 already on the order, 3 more would exceed the 4 on hand.
        let err = orders
            .add_item(&f.ctx, &id, OrderLine::new(&coffee.id, 3))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InsufficientStock { requested: 5, .. })));

        let coffee_line = details.items[0].id.clone();
        let details = orders.update_item_quantity(&f.ctx, &id, &coffee_line, 1).await.unwrap();
        assert_eq!(details.order.total_cents, 11_400 + 1_140);

        let tea_line = details.items[1].id.clone();
        let details = orders.remove_item(&f.ctx, &id, &tea_line).await.unwrap();
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.order.total_cents, 11_400);
        assert_eq!(details.order.amount_due_cents, 11_400);

        let err = orders.remove_item(&f.ctx, &id, &coffee_line).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::EmptyOrder)));
        assert_eq!(orders.get(&f.ctx, &id).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_hold_and_cancel() {
        let f = fixture().await;
        f.open_shift(0).await;
        let product = f.stocked("COF-1", 10_000, 5).await;
        let orders = f.db.orders();
        let order = draft(&f, vec![OrderLine::new(&product.id, 1)]).await;
        let id = order.order.id.clone();

        let held = orders.hold(&f.ctx, &id).await.unwrap();
        assert_eq!(held.status, OrderStatus::Pending);
        let err = orders
            .add_item(&f.ctx, &id, OrderLine::new(&product.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidStateTransition { .. })));

        let err = orders.cancel(&f.ctx, &id, "  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let cancelled = orders.cancel(&f.ctx, &id, "customer left").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("customer left"));

        let err = orders
            .complete(&f.ctx, &id, vec![Tender::cash(11_400)])
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InvalidStateTransition { from: OrderStatus::Cancelled, .. })
        ));
        assert_eq!(f.db.stock().get_quantity(&f.ctx, &product.id).await.unwrap(), 5);
        assert!(f.db.cash().history(&f.ctx, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_b_cash_completion() {
        let recorder = Arc::new(Recorder::default());
        let mut f = fixture().await;
        f.db = f.db.clone().with_notifier(recorder.clone());
        f.open_shift(0).await;

        let (product, done) = completed_sale(&f).await;

        let order = &done.order;
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.amount_paid_cents, 22_800);
        assert_eq!(order.amount_due_cents, 0);
        assert_eq!(order.change_cents, 2_200);
        assert_eq!(order.cash_paid_cents, 22_800);
        assert!(order.completed_at.is_some());
        assert_eq!(done.payments.len(), 1);
        assert_eq!(done.payments[0].amount_cents, 25_000);

        let cash = f.assert_cash_chain(BRANCH).await;
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].transaction_type, CashTransactionType::Sale);
        assert_eq!(cash[0].amount_cents, 22_800);
        assert_eq!(cash[0].reference_id.as_deref(), Some(order.id.as_str()));
        assert_eq!(cash[0].shift_id, order.shift_id);

        assert_eq!(f.db.stock().get_quantity(&f.ctx, &product.id).await.unwrap(), 8);
        let history = f.db.stock().get_history(&f.ctx, &product.id, 10).await.unwrap();
        assert_eq!(history[0].delta, -2);
        assert_eq!(history[0].reference_type, StockReferenceType::Sale);

        let events = recorder.events.lock().unwrap();
        assert!(matches!(
            events.as_slice(),
            [PosEvent::OrderCompleted { total_cents: 22_800, .. }]
        ));
    }

    #[tokio::test]
    async fn test_card_payment_skips_cash_ledger() {
        let f = fixture().await;
        f.open_shift(0).await;
        let product = f.stocked("COF-1", 10_000, 10).await;
        let order = draft(&f, vec![OrderLine::new(&product.id, 2)]).await;

        let done = f
            .db
            .orders()
            .complete(
                &f.ctx,
                &order.order.id,
                vec![Tender::card(20_000, Some("AUTH-1".into())), Tender::cash(5_000)],
            )
            .await
            .unwrap();

        assert_eq!(done.order.change_cents, 2_200);
        assert_eq!(done.order.cash_paid_cents, 2_800);
        let cash = f.db.cash().history(&f.ctx, 10).await.unwrap();
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].amount_cents, 2_800);

        let shift = f.db.shifts().current(&f.ctx).await.unwrap().unwrap();
        let listed = f.db.orders().list_by_shift(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_payment_guards() {
        let f = fixture().await;
        f.open_shift(0).await;
        let product = f.stocked("COF-1", 10_000, 10).await;
        let order = draft(&f, vec![OrderLine::new(&product.id, 2)]).await;
        let orders = f.db.orders();

        let err = orders
            .complete(&f.ctx, &order.order.id, vec![Tender::cash(20_000)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::PaymentInsufficient { .. })));

        let err = orders
            .complete(&f.ctx, &order.order.id, vec![Tender::cash(50_000)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::OverpaymentLimit { limit: 45_600, .. })));

        let err = orders
            .complete(&f.ctx, &order.order.id, vec![Tender::card(25_000, None)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let details = orders.get(&f.ctx, &order.order.id).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Draft);
        assert!(details.payments.is_empty());
    }

    #[tokio::test]
    async fn test_failed_completion_rolls_everything_back() {
        let f = fixture().await;
        f.open_shift(0).await;
        let product = f.stocked("COF-1", 10_000, 2).await;
        let order = draft(&f, vec![OrderLine::new(&product.id, 2)]).await;

        // Stock shrinks between drafting and payment.
        f.db.stock().adjust(&f.ctx, &product.id, -1, "breakage").await.unwrap();

        let err = f
            .db
            .orders()
            .complete(&f.ctx, &order.order.id, vec![Tender::cash(22_800)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InsufficientStock { .. })));

        let details = f.db.orders().get(&f.ctx, &order.order.id).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Draft);
        assert!(details.payments.is_empty());
        assert!(f.db.cash().history(&f.ctx, 10).await.unwrap().is_empty());
        assert_eq!(f.db.stock().get_quantity(&f.ctx, &product.id).await.unwrap(), 1);
        assert_eq!(f.db.stock().get_history(&f.ctx, &product.id, 10).await.unwrap().len(), 2);
        let mut conn = f.db.pool().acquire().await.unwrap();
        assert_eq!(stock::count_for_reference(&mut *conn, &order.order.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_completion_requires_open_shift() {
        let f = fixture().await;
        f.open_shift(0).await;
        let product = f.stocked("COF-1", 10_000, 5).await;
        let order = draft(&f, vec![OrderLine::new(&product.id, 1)]).await;
        f.db.shifts()
            .close(&f.ctx, crate::service::shifts::CloseShiftRequest::default())
            .await
            .unwrap();

        let err = f
            .db
            .orders()
            .complete(&f.ctx, &order.order.id, vec![Tender::cash(11_400)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::ShiftClosed { .. })));
    }

    #[tokio::test]
    async fn test_scenario_c_full_refund() {
        let recorder = Arc::new(Recorder::default());
        let mut f = fixture().await;
        f.db = f.db.clone().with_notifier(recorder.clone());
        f.open_shift(0).await;
        let (product, sale) = completed_sale(&f).await;
        let orders = f.db.orders();

        let err = orders
            .refund(&f.ctx, &sale.order.id, RefundSelection::Full, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let ret = orders
            .refund(&f.ctx, &sale.order.id, RefundSelection::Full, Some("damaged"))
            .await
            .unwrap();

        assert_eq!(ret.order.order_type, OrderType::Return);
        assert_eq!(ret.order.status, OrderStatus::Completed);
        assert_eq!(ret.order.original_order_id.as_deref(), Some(sale.order.id.as_str()));
        assert!(ret.order.order_number.starts_with("RET-"));
        assert_eq!(ret.order.total_cents, -22_800);
        assert_eq!(ret.order.amount_paid_cents, -22_800);
        assert_eq!(ret.items.len(), 1);
        assert_eq!(ret.items[0].quantity, 2);
        assert_eq!(ret.items[0].total_cents, -22_800);
        assert_eq!(ret.items[0].tax_cents, -2_800);
        assert_arithmetic(&ret);

        let original = orders.get(&f.ctx, &sale.order.id).await.unwrap();
        assert_eq!(original.order.status, OrderStatus::Refunded);
        assert_eq!(original.order.refund_amount_cents, 22_800);
        assert_eq!(original.order.refund_reason.as_deref(), Some("damaged"));
        assert_eq!(original.items[0].refunded_quantity, 2);

        let cash = f.assert_cash_chain(BRANCH).await;
        assert_eq!(cash.last().unwrap().transaction_type, CashTransactionType::Refund);
        assert_eq!(cash.last().unwrap().amount_cents, -22_800);
        assert_eq!(f.db.cash().get_balance(&f.ctx).await.unwrap(), Money::zero());

        assert_eq!(f.db.stock().get_quantity(&f.ctx, &product.id).await.unwrap(), 10);
        let logs = orders.refund_logs(&f.ctx, &sale.order.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].stock_changes().unwrap(),
            vec![StockChange {
                product_id: product.id.clone(),
                quantity: 2,
                balance_before: 8,
                balance_after: 10,
            }]
        );

        let err = orders
            .refund(&f.ctx, &sale.order.id, RefundSelection::Full, Some("again"))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidStateTransition { .. })));

        let events = recorder.events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(PosEvent::OrderRefunded { refund_amount_cents: 22_800, .. })
        ));
    }

    #[tokio::test]
    async fn test_scenario_d_partial_refund() {
        let f = fixture().await;
        f.open_shift(0).await;
        let (_, sale) = completed_sale(&f).await;
        let orders = f.db.orders();
        let line = sale.items[0].id.clone();

        let ret = orders
            .refund(&f.ctx, &sale.order.id, RefundSelection::Partial(vec![(line.clone(), 1)]), None)
            .await
            .unwrap();
        assert_eq!(ret.items[0].total_cents, -11_400);
        assert_eq!(ret.order.total_cents, -11_400);

        let original = orders.get(&f.ctx, &sale.order.id).await.unwrap().order;
        assert_eq!(original.refund_amount_cents, 11_400);
        assert_eq!(original.status, OrderStatus::PartiallyRefunded);

        let err = orders
            .refund(&f.ctx, &sale.order.id, RefundSelection::Partial(vec![(line.clone(), 2)]), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        orders
            .refund(&f.ctx, &sale.order.id, RefundSelection::Partial(vec![(line, 1)]), None)
            .await
            .unwrap();
        let original = orders.get(&f.ctx, &sale.order.id).await.unwrap().order;
        assert_eq!(original.status, OrderStatus::Refunded);
        assert_eq!(original.refund_amount_cents, original.total_cents);
        assert_eq!(orders.returns_of(&f.ctx, &sale.order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stacked_partial_refunds_conserve_money() {
        let f = fixture().await;
        f.open_shift(5_000).await;
        let product = f.stocked("JAM-1", 877, 10).await;
        let mut request = CreateOrderRequest::sale(vec![OrderLine::new(&product.id, 3)]);
        request.discount = Money::from_cents(99);
        let order = f.db.orders().create(&f.ctx, request).await.unwrap();
        // 26.31 net, 3.68 tax, 0.99 off
        assert_eq!(order.order.total_cents, 2_900);

        let orders = f.db.orders();
        orders
            .complete(&f.ctx, &order.order.id, vec![Tender::cash(2_900)])
            .await
            .unwrap();

        let line = order.items[0].id.clone();
        let mut refunded = Vec::new();
        for _ in 0..3 {
            let ret = orders
                .refund(&f.ctx, &order.order.id, RefundSelection::Partial(vec![(line.clone(), 1)]), None)
                .await
                .unwrap();
            assert_arithmetic(&ret);
            refunded.push(-ret.order.total_cents);
        }

        assert_eq!(refunded, vec![967, 966, 967]);
        assert_eq!(refunded.iter().sum::<i64>(), 2_900);
        let original = orders.get(&f.ctx, &order.order.id).await.unwrap().order;
        assert_eq!(original.refund_amount_cents, 2_900);
        assert_eq!(original.status, OrderStatus::Refunded);
        assert_eq!(f.db.cash().get_balance(&f.ctx).await.unwrap().cents(), 5_000);
        f.assert_cash_chain(BRANCH).await;
    }

    #[tokio::test]
    async fn test_customer_stats_and_credit() {
        let f = fixture().await;
        f.open_shift(0).await;
        let product = f.stocked("COF-1", 10_000, 10).await;
        let tight = f.customer(10_000).await;
        let trusted = f.customer(50_000).await;
        let orders = f.db.orders();
        let credit = |cents| Tender {
            method: PaymentMethod::CustomerCredit,
            amount_cents: cents,
            reference: None,
        };

        let mut request = CreateOrderRequest::sale(vec![OrderLine::new(&product.id, 2)]);
        request.customer_id = Some(tight.id.clone());
        let order = orders.create(&f.ctx, request.clone()).await.unwrap();
        let err = orders
            .complete(&f.ctx, &order.order.id, vec![credit(22_800)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::CreditLimitExceeded { .. })));

        request.customer_id = Some(trusted.id.clone());
        let order = orders.create(&f.ctx, request).await.unwrap();
        let done = orders
            .complete(&f.ctx, &order.order.id, vec![credit(12_800), Tender::cash(10_000)])
            .await
            .unwrap();
        assert_eq!(done.order.credit_paid_cents, 12_800);
        assert_eq!(done.order.cash_paid_cents, 10_000);

        let stored = f.db.catalog().get_customer(TENANT, &trusted.id).await.unwrap().unwrap();
        assert_eq!(stored.total_orders, 1);
        assert_eq!(stored.total_spent_cents, 22_800);
        assert_eq!(stored.loyalty_points, 228);
        assert_eq!(stored.outstanding_balance_cents, 12_800);

        let ret = orders
            .refund(&f.ctx, &order.order.id, RefundSelection::Full, Some("wrong size"))
            .await
            .unwrap();
        assert_eq!(ret.order.cash_paid_cents, -10_000);
        assert_eq!(ret.order.credit_paid_cents, -12_800);

        let stored = f.db.catalog().get_customer(TENANT, &trusted.id).await.unwrap().unwrap();
        assert_eq!(stored.total_orders, 0);
        assert_eq!(stored.total_spent_cents, 0);
        assert_eq!(stored.loyalty_points, 0);
        assert_eq!(stored.outstanding_balance_cents, 0);
    }

    #[tokio::test]
    async fn test_untracked_products_leave_stock_alone() {
        let f = fixture().await;
        f.open_shift(0).await;
        let service = f.product_with("SVC-1", 5_000, |p| p.track_inventory = false).await;
        let order = draft(&f, vec![OrderLine::new(&service.id, 3)]).await;
        f.db.orders()
            .complete(&f.ctx, &order.order.id, vec![Tender::cash(17_100)])
            .await
            .unwrap();
        assert!(f.db.stock().get_history(&f.ctx, &service.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_the_commit() {
        let mut f = fixture().await;
        f.db = f.db.clone().with_notifier(Arc::new(Offline));
        f.open_shift(0).await;

        let (_, done) = completed_sale(&f).await;

        let stored = f.db.orders().get(&f.ctx, &done.order.id).await.unwrap();
        assert_eq!(stored.order.status, OrderStatus::Completed);
        assert_eq!(f.db.cash().get_balance(&f.ctx).await.unwrap().cents(), 22_800);
    }

    #[tokio::test]
    async fn test_orders_are_branch_scoped() {
        let f = fixture().await;
        f.open_shift(0).await;
        let (_, sale) = completed_sale(&f).await;

        let elsewhere = f.ctx.at_branch(OTHER_BRANCH).unwrap();
        let err = f.db.orders().get(&elsewhere, &sale.order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = f
            .db
            .orders()
            .refund(&elsewhere, &sale.order.id, RefundSelection::Full, Some("x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
