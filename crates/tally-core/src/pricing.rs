//! # Pricing
//!
//! Line and order arithmetic. Tax is always additive: stored prices are net,
//! tax is computed on the discounted line and added on top.
//!
//! ```text
//! unit_price × qty ─► − item discount ─► subtotal ─► + round(subtotal × rate) ─► line total
//!
//! Σ line totals ─► − order discount ─► + service charge ─► order total
//! ```

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{OrderItem, Product, TaxRate, Tenant};

/// Inputs for pricing one line.
#[derive(Debug, Clone, Copy)]
pub struct LineInput {
    pub unit_price: Money,
    pub quantity: i64,
    pub tax_rate: TaxRate,
    pub discount: Money,
}

/// Computed amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

/// Computed order totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub service_charge: Money,
    pub total: Money,
}

/// Prices one line.
///
/// Fails when the discount exceeds the gross line amount.
///
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::pricing::{price_line, LineInput};
/// use tally_core::types::TaxRate;
///
/// let amounts = price_line(&LineInput {
///     unit_price: Money::from_cents(10000),
///     quantity: 2,
///     tax_rate: TaxRate::from_bps(1400),
///     discount: Money::zero(),
/// })
/// .unwrap();
/// assert_eq!(amounts.total.cents(), 22800);
/// ```
pub fn price_line(input: &LineInput) -> CoreResult<LineAmounts> {
    let gross = input.unit_price.multiply_quantity(input.quantity);
    if input.discount.is_negative() {
        return Err(ValidationError::invalid("discount", "must not be negative").into());
    }
    if input.discount > gross {
        return Err(ValidationError::invalid(
            "discount",
            format!("{} exceeds line amount {}", input.discount, gross),
        )
        .into());
    }
    let subtotal = gross - input.discount;
    let tax = subtotal.calculate_tax(input.tax_rate);
    Ok(LineAmounts {
        subtotal,
        tax,
        total: subtotal + tax,
    })
}

/// Sums line amounts into order totals.
///
/// The order discount may not exceed the sum of line totals.
pub fn order_totals(
    lines: &[LineAmounts],
    discount: Money,
    service_charge: Money,
) -> CoreResult<OrderTotals> {
    if discount.is_negative() || service_charge.is_negative() {
        return Err(ValidationError::invalid(
            "discount",
            "order discount and service charge must not be negative",
        )
        .into());
    }
    let subtotal: Money = lines.iter().map(|l| l.subtotal).sum();
    let tax: Money = lines.iter().map(|l| l.tax).sum();
    let items_total: Money = lines.iter().map(|l| l.total).sum();
    if discount > items_total {
        return Err(ValidationError::invalid(
            "discount",
            format!("{} exceeds items total {}", discount, items_total),
        )
        .into());
    }
    Ok(OrderTotals {
        subtotal,
        tax,
        discount,
        service_charge,
        total: items_total - discount + service_charge,
    })
}

/// Recomputes totals from persisted items.
pub fn totals_for_items(
    items: &[OrderItem],
    discount: Money,
    service_charge: Money,
) -> CoreResult<OrderTotals> {
    let lines: Vec<LineAmounts> = items
        .iter()
        .map(|i| LineAmounts {
            subtotal: Money::from_cents(i.subtotal_cents),
            tax: Money::from_cents(i.tax_cents),
            total: Money::from_cents(i.total_cents),
        })
        .collect();
    order_totals(&lines, discount, service_charge)
}

/// Resolves the tax rate for a product.
///
/// ## Priority
/// 1. Tenant tax disabled → zero
/// 2. Product-specific rate
/// 3. Tenant default rate
pub fn resolve_tax_rate(product: &Product, tenant: &Tenant) -> TaxRate {
    if !tenant.tax_enabled {
        return TaxRate::zero();
    }
    product
        .tax_rate_bps
        .map(TaxRate::from_bps)
        .unwrap_or_else(|| TaxRate::from_bps(tenant.default_tax_rate_bps))
}

// =============================================================================
// Unit Tests
// =============================================================================
