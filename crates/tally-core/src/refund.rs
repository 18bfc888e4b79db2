//! # Refund Planning
//!
//! Computes everything a refund writes before anything is written.
//!
//! ## Cumulative Allocation
//! ```text
//! line total 10.00, qty 3, refunded one unit at a time
//!
//!   naive:       3.33 + 3.33 + 3.33            =  9.99  (a cent lost)
//!   cumulative:  round(10×1/3) − round(10×0/3) =  3.33
//!                round(10×2/3) − round(10×1/3) =  3.34
//!                round(10×3/3) − round(10×2/3) =  3.33
//!                                               ─────
//!                                               10.00
//! ```
//! Every share (line total, line tax, line discount, order discount,
//! service charge, cash, credit) is computed as "allocated after this refund
//! minus allocated before it". The sum of all refunds telescopes to the
//! original amount exactly.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Order, OrderItem, OrderStatus, OrderType};

/// Which units to refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundSelection {
    /// Every remaining unit of every line.
    Full,
    /// `(order_item_id, quantity)` pairs.
    Partial(Vec<(String, i64)>),
}

/// One negated line of the return order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnLine {
    pub original_item_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Negated original unit price.
    pub unit_price: Money,
    pub discount: Money,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    /// `refunded_quantity` of the original line after this refund.
    pub refunded_quantity_after: i64,
}

/// Result of planning one refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    pub lines: Vec<ReturnLine>,
    /// Positive amount handed back for this refund.
    pub refund_amount: Money,
    /// Share of the order discount reversed by this refund (positive).
    pub discount_share: Money,
    /// Share of the service charge reversed by this refund (positive).
    pub service_charge_share: Money,
    /// Cash to pay out of the drawer (positive).
    pub cash_refund: Money,
    /// Store credit to release back to the customer (positive).
    pub credit_refund: Money,
    /// Status the original order moves to.
    pub new_status: OrderStatus,
}

impl RefundPlan {
    /// Return-order subtotal (negative).
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(|l| l.subtotal).sum()
    }

    /// Return-order tax (negative).
    pub fn tax(&self) -> Money {
        self.lines.iter().map(|l| l.tax).sum()
    }

    /// Return-order total, `−refund_amount`.
    pub fn total(&self) -> Money {
        -self.refund_amount
    }

    /// Units restored per product, in line order.
    pub fn restock(&self) -> Vec<(String, i64)> {
        self.lines
            .iter()
            .map(|l| (l.product_id.clone(), l.quantity))
            .collect()
    }

    pub fn fully_refunded(&self) -> bool {
        self.new_status == OrderStatus::Refunded
    }
}

/// Allocation of `amount` after `part` of `whole` units.
fn allocated(amount: Money, part: i64, whole: i64) -> Money {
    if part >= whole {
        amount
    } else {
        amount.mul_div_round(part, whole)
    }
}

/// Share of `amount` for moving from `before` to `after` of `whole`.
fn share(amount: Money, before: i64, after: i64, whole: i64) -> Money {
    allocated(amount, after, whole) - allocated(amount, before, whole)
}

fn line_gross(item: &OrderItem) -> Money {
    Money::from_cents(item.unit_price_cents).multiply_quantity(item.quantity)
}

/// Gross amount of a line attributable to `units` refunded units.
fn gross_allocated(item: &OrderItem, units: i64) -> Money {
    allocated(line_gross(item), units, item.quantity)
}

/// Plans a refund of `selection` against `order` and its `items`.
///
/// ## Errors
/// - `InvalidStateTransition` when the order is not a completed sale
/// - `Validation` for a missing reason on full refunds, non-positive or
///   excessive quantities, duplicated lines, or nothing left to refund
/// - `NotFound` for an item id that is not on the order
pub fn plan_refund(
    order: &Order,
    items: &[OrderItem],
    selection: &RefundSelection,
    reason: Option<&str>,
) -> CoreResult<RefundPlan> {
    if order.order_type != OrderType::Sale
        || !matches!(
            order.status,
            OrderStatus::Completed | OrderStatus::PartiallyRefunded
        )
    {
        return Err(CoreError::InvalidStateTransition {
            order_id: order.id.clone(),
            from: order.status,
            to: OrderStatus::Refunded,
        });
    }

    let requested: Vec<(&OrderItem, i64)> = match selection {
        RefundSelection::Full => {
            if reason.map(str::trim).unwrap_or("").is_empty() {
                return Err(ValidationError::required("reason").into());
            }
            items
                .iter()
                .filter(|i| i.refundable_quantity() > 0)
                .map(|i| (i, i.refundable_quantity()))
                .collect()
        }
        RefundSelection::Partial(wanted) => {
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(wanted.len());
            for (item_id, qty) in wanted {
                let item = items
                    .iter()
                    .find(|i| &i.id == item_id)
                    .ok_or_else(|| CoreError::not_found("OrderItem", item_id.as_str()))?;
                if !seen.insert(item_id.as_str()) {
                    return Err(ValidationError::invalid(
                        format!("items[{}]", item_id),
                        "listed more than once",
                    )
                    .into());
                }
                if *qty <= 0 {
                    return Err(ValidationError::MustBePositive {
                        field: format!("items[{}].quantity", item_id),
                    }
                    .into());
                }
                if *qty > item.refundable_quantity() {
                    return Err(ValidationError::OutOfRange {
                        field: format!("items[{}].quantity", item_id),
                        min: 1,
                        max: item.refundable_quantity(),
                    }
                    .into());
                }
                out.push((item, *qty));
            }
            out
        }
    };

    if requested.is_empty() {
        return Err(ValidationError::invalid("items", "nothing left to refund").into());
    }

    let mut lines = Vec::with_capacity(requested.len());
    let mut lines_total = Money::zero();
    for (item, qty) in &requested {
        let before = item.refunded_quantity;
        let after = before + qty;
        let total = share(item.total(), before, after, item.quantity);
        let tax = share(Money::from_cents(item.tax_cents), before, after, item.quantity);
        let discount = share(
            Money::from_cents(item.discount_cents),
            before,
            after,
            item.quantity,
        );
        lines_total += total;
        lines.push(ReturnLine {
            original_item_id: item.id.clone(),
            product_id: item.product_id.clone(),
            quantity: *qty,
            unit_price: -Money::from_cents(item.unit_price_cents),
            discount: -discount,
            subtotal: -(total - tax),
            tax: -tax,
            total: -total,
            refunded_quantity_after: after,
        });
    }

    // Order-level adjustments follow the refunded gross across all lines.
    let gross_total: Money = items.iter().map(line_gross).sum();
    let gross_before: Money = items
        .iter()
        .map(|i| gross_allocated(i, i.refunded_quantity))
        .sum();
    let gross_after: Money = items
        .iter()
        .map(|i| {
            let extra = requested
                .iter()
                .find(|(r, _)| r.id == i.id)
                .map(|(_, q)| *q)
                .unwrap_or(0);
            gross_allocated(i, i.refunded_quantity + extra)
        })
        .sum();

    let fully_refunded = items.iter().all(|i| {
        let extra = requested
            .iter()
            .find(|(r, _)| r.id == i.id)
            .map(|(_, q)| *q)
            .unwrap_or(0);
        i.refunded_quantity + extra >= i.quantity
    });

    let (discount_share, service_charge_share) = if fully_refunded {
        (
            Money::from_cents(order.discount_cents) - allocated_adjustment(order.discount_cents, gross_before, gross_total),
            Money::from_cents(order.service_charge_cents)
                - allocated_adjustment(order.service_charge_cents, gross_before, gross_total),
        )
    } else {
        (
            adjustment_share(order.discount_cents, gross_before, gross_after, gross_total),
            adjustment_share(order.service_charge_cents, gross_before, gross_after, gross_total),
        )
    };

    let mut refund_amount = lines_total - discount_share + service_charge_share;
    // Never hand back more than what is left on the order.
    let remaining = order.total() - order.refunded();
    if fully_refunded || refund_amount > remaining {
        refund_amount = remaining;
    }

    let refunded_after = order.refunded() + refund_amount;
    let cash_refund = tender_share(order.cash_paid_cents, order, refunded_after, fully_refunded);
    let credit_refund = tender_share(order.credit_paid_cents, order, refunded_after, fully_refunded);

    Ok(RefundPlan {
        lines,
        refund_amount,
        discount_share,
        service_charge_share,
        cash_refund,
        credit_refund,
        new_status: if fully_refunded {
            OrderStatus::Refunded
        } else {
            OrderStatus::PartiallyRefunded
        },
    })
}

fn allocated_adjustment(amount_cents: i64, gross_part: Money, gross_total: Money) -> Money {
    allocated(
        Money::from_cents(amount_cents),
        gross_part.cents(),
        gross_total.cents(),
    )
}

fn adjustment_share(amount_cents: i64, before: Money, after: Money, total: Money) -> Money {
    allocated_adjustment(amount_cents, after, total) - allocated_adjustment(amount_cents, before, total)
}

/// Portion of a tender (cash or credit) released by this refund.
///
/// Denominators are the original order total and the original tender.
fn tender_share(paid_cents: i64, order: &Order, refunded_after: Money, full: bool) -> Money {
    let paid = Money::from_cents(paid_cents);
    let total = order.total_cents;
    let after = if full {
        paid
    } else {
        allocated(paid, refunded_after.cents(), total)
    };
    let before = allocated(paid, order.refund_amount_cents, total);
    after - before
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, price: i64, qty: i64, bps: u32, discount: i64) -> OrderItem {
        let subtotal = price * qty - discount;
        let tax = Money::from_cents(subtotal)
            .calculate_tax(crate::types::TaxRate::from_bps(bps))
            .cents();
        OrderItem {
            id: id.into(),
            order_id: "o-1".into(),
            product_id: format!("p-{}", id),
            name_snapshot: "Item".into(),
            sku_snapshot: "SKU".into(),
            barcode_snapshot: None,
            unit_price_cents: price,
            quantity: qty,
            tax_rate_bps: bps,
            discount_cents: discount,
            subtotal_cents: subtotal,
            tax_cents: tax,
            total_cents: subtotal + tax,
            refunded_quantity: 0,
            created_at: Utc::now(),
        }
    }

    fn order(items: &[OrderItem], discount: i64, service: i64, cash_paid: Option<i64>) -> Order {
        let total: i64 = items.iter().map(|i| i.total_cents).sum::<i64>() - discount + service;
        Order {
            id: "o-1".into(),
            tenant_id: "t".into(),
            branch_id: "b".into(),
            shift_id: Some("s".into()),
            order_number: "ORD-20260101-ABCDEF".into(),
            order_type: OrderType::Sale,
            status: OrderStatus::Completed,
            customer_id: None,
            subtotal_cents: items.iter().map(|i| i.subtotal_cents).sum(),
            tax_cents: items.iter().map(|i| i.tax_cents).sum(),
            discount_cents: discount,
            service_charge_cents: service,
            total_cents: total,
            amount_paid_cents: total,
            amount_due_cents: 0,
            change_cents: 0,
            cash_paid_cents: cash_paid.unwrap_or(total),
            credit_paid_cents: 0,
            refund_amount_cents: 0,
            branch_name: "Main".into(),
            branch_address: None,
            currency_code: "EGP".into(),
            original_order_id: None,
            notes: None,
            created_by: "u".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: Some(Utc::now()),
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            refunded_at: None,
            refunded_by: None,
            refund_reason: None,
        }
    }

    /// Applies a plan to the in-memory order, the way persistence does.
    fn apply(order: &mut Order, items: &mut [OrderItem], plan: &RefundPlan) {
        for line in &plan.lines {
            let it = items
                .iter_mut()
                .find(|i| i.id == line.original_item_id)
                .unwrap();
            it.refunded_quantity = line.refunded_quantity_after;
        }
        order.refund_amount_cents += plan.refund_amount.cents();
        order.status = plan.new_status;
    }

    #[test]
    fn test_scenario_c_full_refund() {
        let items = vec![item("a", 10000, 2, 1400, 0)];
        let o = order(&items, 0, 0, None);
        let plan = plan_refund(&o, &items, &RefundSelection::Full, Some("damaged")).unwrap();

        assert_eq!(plan.lines.len(), 1);
        let line = &plan.lines[0];
        assert_eq!(line.quantity, 2);
        assert_eq!(line.total.cents(), -22800);
        assert_eq!(line.tax.cents(), -2800);
        assert_eq!(line.subtotal.cents(), -20000);
        assert_eq!(line.unit_price.cents(), -10000);
        assert_eq!(plan.refund_amount.cents(), 22800);
        assert_eq!(plan.total().cents(), -22800);
        assert_eq!(plan.cash_refund.cents(), 22800);
        assert_eq!(plan.new_status, OrderStatus::Refunded);
    }

    #[test]
    fn test_scenario_d_partial_refund() {
        let items = vec![item("a", 10000, 2, 1400, 0)];
        let o = order(&items, 0, 0, None);
        let plan = plan_refund(
            &o,
            &items,
            &RefundSelection::Partial(vec![("a".into(), 1)]),
            None,
        )
        .unwrap();

        assert_eq!(plan.lines[0].total.cents(), -11400);
        assert_eq!(plan.lines[0].tax.cents(), -1400);
        assert_eq!(plan.refund_amount.cents(), 11400);
        assert_eq!(plan.cash_refund.cents(), 11400);
        assert_eq!(plan.new_status, OrderStatus::PartiallyRefunded);
    }

    #[test]
    fn test_full_refund_requires_reason() {
        let items = vec![item("a", 10000, 2, 1400, 0)];
        let o = order(&items, 0, 0, None);
        let err = plan_refund(&o, &items, &RefundSelection::Full, Some("  ")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_partial_quantity_checks_name_the_item() {
        let items = vec![item("a", 10000, 2, 1400, 0)];
        let o = order(&items, 0, 0, None);

        let err = plan_refund(&o, &items, &RefundSelection::Partial(vec![("a".into(), 3)]), None)
            .unwrap_err();
        assert!(err.to_string().contains("items[a].quantity"));

        let err = plan_refund(&o, &items, &RefundSelection::Partial(vec![("a".into(), 0)]), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = plan_refund(
            &o,
            &items,
            &RefundSelection::Partial(vec![("a".into(), 1), ("a".into(), 1)]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = plan_refund(&o, &items, &RefundSelection::Partial(vec![("zz".into(), 1)]), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_only_completed_sales_refund() {
        let items = vec![item("a", 10000, 2, 1400, 0)];
        let mut o = order(&items, 0, 0, None);
        o.status = OrderStatus::Pending;
        assert!(matches!(
            plan_refund(&o, &items, &RefundSelection::Full, Some("x")).unwrap_err(),
            CoreError::InvalidStateTransition { .. }
        ));
        o.status = OrderStatus::Refunded;
        assert!(plan_refund(&o, &items, &RefundSelection::Full, Some("x")).is_err());
        o.status = OrderStatus::Completed;
        o.order_type = OrderType::Return;
        assert!(plan_refund(&o, &items, &RefundSelection::Full, Some("x")).is_err());
    }

    #[test]
    fn test_stacked_partials_conserve_every_cent() {
        // 10.00 net, no tax, qty 3, with an order discount and service charge
        let mut items = vec![item("a", 333, 3, 0, 0), item("b", 1001, 1, 825, 0)];
        let mut o = order(&items, 101, 57, Some(500));
        let total = o.total_cents;

        let mut refunded = 0;
        let mut cash = 0;
        let mut return_totals = 0;
        for sel in [
            vec![("a".to_string(), 1)],
            vec![("a".to_string(), 1), ("b".to_string(), 1)],
            vec![("a".to_string(), 1)],
        ] {
            let plan = plan_refund(&o, &items, &RefundSelection::Partial(sel), None).unwrap();
            let lines_total: i64 = plan.lines.iter().map(|l| l.total.cents()).sum();
            assert_eq!(
                lines_total + plan.discount_share.cents() - plan.service_charge_share.cents(),
                plan.total().cents()
            );
            refunded += plan.refund_amount.cents();
            cash += plan.cash_refund.cents();
            return_totals += plan.total().cents();
            assert!(refunded <= total);
            apply(&mut o, &mut items, &plan);
        }

        assert_eq!(refunded, total);
        assert_eq!(return_totals, -total);
        assert_eq!(cash, 500);
        assert_eq!(o.status, OrderStatus::Refunded);
    }

    #[test]
    fn test_full_after_partial_refunds_only_the_rest() {
        let mut items = vec![item("a", 10000, 2, 1400, 0)];
        let mut o = order(&items, 0, 0, None);
        let first = plan_refund(&o, &items, &RefundSelection::Partial(vec![("a".into(), 1)]), None)
            .unwrap();
        apply(&mut o, &mut items, &first);

        let rest = plan_refund(&o, &items, &RefundSelection::Full, Some("rest")).unwrap();
        assert_eq!(rest.lines[0].quantity, 1);
        assert_eq!(rest.refund_amount.cents(), 11400);
        assert_eq!(rest.cash_refund.cents(), 11400);
        assert!(rest.fully_refunded());
    }

    #[test]
    fn test_split_tender_refund_is_proportional() {
        // 228.00 paid 100.00 cash + 128.00 card; refund half
        let items = vec![item("a", 10000, 2, 1400, 0)];
        let o = order(&items, 0, 0, Some(10000));
        let plan = plan_refund(&o, &items, &RefundSelection::Partial(vec![("a".into(), 1)]), None)
            .unwrap();
        assert_eq!(plan.cash_refund.cents(), 5000);
        assert_eq!(plan.credit_refund.cents(), 0);
    }
}
