//! # Payment Settlement
//!
//! Turns the tenders a cashier collected into the amounts stored on a
//! completed order.
//!
//! ## Rules
//! ```text
//! total == 0                        → no tenders allowed; settles to all zeros
//! tendered < total                  → PaymentInsufficient
//! tendered > total × max_ratio      → OverpaymentLimit   (typo / fraud guard)
//! non-cash tenders > total          → ValidationError    (no change from cards)
//! change      = tendered − total    (always handed back in cash)
//! cash_paid   = cash tendered − change
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::PaymentMethod;

/// One tender as entered at the till.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tender {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reference: Option<String>,
}

impl Tender {
    /// Cash tender without reference.
    pub fn cash(amount_cents: i64) -> Self {
        Tender {
            method: PaymentMethod::Cash,
            amount_cents,
            reference: None,
        }
    }

    /// Card tender with an optional authorisation reference.
    pub fn card(amount_cents: i64, reference: Option<String>) -> Self {
        Tender {
            method: PaymentMethod::Card,
            amount_cents,
            reference,
        }
    }
}

/// Amounts derived from the tenders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub tendered: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
    pub change: Money,
    pub cash_paid: Money,
    pub card_paid: Money,
    pub credit_paid: Money,
}

/// Settles `tenders` against `total`.
///
/// `max_ratio_bps` is the overpayment guard in basis points of the total
/// (20000 = 2×).
pub fn settle(total: Money, tenders: &[Tender], max_ratio_bps: u32) -> CoreResult<Settlement> {
    if total.is_zero() {
        if !tenders.is_empty() {
            return Err(
                ValidationError::invalid("payments", "a zero-total order takes no payments").into(),
            );
        }
        return Ok(Settlement {
            tendered: Money::zero(),
            amount_paid: Money::zero(),
            amount_due: Money::zero(),
            change: Money::zero(),
            cash_paid: Money::zero(),
            card_paid: Money::zero(),
            credit_paid: Money::zero(),
        });
    }
    if tenders.is_empty() {
        return Err(ValidationError::required("payments").into());
    }
    for (i, tender) in tenders.iter().enumerate() {
        if tender.amount_cents <= 0 {
            return Err(ValidationError::MustBePositive {
                field: format!("payments[{}].amount", i),
            }
            .into());
        }
    }

    let sum_of = |pred: fn(&PaymentMethod) -> bool| -> Money {
        tenders
            .iter()
            .filter(|t| pred(&t.method))
            .map(|t| Money::from_cents(t.amount_cents))
            .sum()
    };
    let tendered = sum_of(|_| true);
    let cash = sum_of(|m| m.is_cash());
    let card = sum_of(|m| matches!(m, PaymentMethod::Card));
    let credit = sum_of(|m| matches!(m, PaymentMethod::CustomerCredit));
    let non_cash = tendered - cash;

    if tendered < total {
        return Err(CoreError::PaymentInsufficient {
            required: total.cents(),
            tendered: tendered.cents(),
        });
    }

    let limit = total.mul_div_round(max_ratio_bps as i64, 10_000);
    if tendered > limit {
        return Err(CoreError::OverpaymentLimit {
            limit: limit.cents(),
            tendered: tendered.cents(),
        });
    }

    if non_cash > total {
        return Err(ValidationError::invalid(
            "payments",
            format!("non-cash tenders {} exceed order total {}", non_cash, total),
        )
        .into());
    }

    let change = tendered - total;
    Ok(Settlement {
        tendered,
        amount_paid: total,
        amount_due: Money::zero(),
        change,
        cash_paid: cash - change,
        card_paid: card,
        credit_paid: credit,
    })
}
