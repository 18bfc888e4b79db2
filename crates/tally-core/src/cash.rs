//! # Cash Movement Rules
//!
//! How a requested amount turns into a signed drawer movement.
//!
//! | Type                                           | Effect on balance   |
//! |------------------------------------------------|---------------------|
//! | opening, sale, deposit                         | `+ |amount|`        |
//! | refund, withdrawal, expense, supplier_payment  | `− |amount|`        |
//! | adjustment, transfer                           | `+ amount` (signed) |

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::CashTransactionType;

impl CashTransactionType {
    /// Stable text used in ledger descriptions and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CashTransactionType::Opening => "opening",
            CashTransactionType::Sale => "sale",
            CashTransactionType::Refund => "refund",
            CashTransactionType::Deposit => "deposit",
            CashTransactionType::Withdrawal => "withdrawal",
            CashTransactionType::Adjustment => "adjustment",
            CashTransactionType::Transfer => "transfer",
            CashTransactionType::Expense => "expense",
            CashTransactionType::SupplierPayment => "supplier_payment",
        }
    }

    /// Every variant, in declaration order.
    pub const ALL: [CashTransactionType; 9] = [
        CashTransactionType::Opening,
        CashTransactionType::Sale,
        CashTransactionType::Refund,
        CashTransactionType::Deposit,
        CashTransactionType::Withdrawal,
        CashTransactionType::Adjustment,
        CashTransactionType::Transfer,
        CashTransactionType::Expense,
        CashTransactionType::SupplierPayment,
    ];
}

/// Applies the sign table.
///
/// Zero amounts are rejected: an entry must move the drawer.
///
/// ```rust
/// use tally_core::cash::signed_amount;
/// use tally_core::money::Money;
/// use tally_core::types::CashTransactionType;
///
/// let m = Money::from_cents(22800);
/// assert_eq!(signed_amount(CashTransactionType::Sale, m).unwrap().cents(), 22800);
/// assert_eq!(signed_amount(CashTransactionType::Refund, m).unwrap().cents(), -22800);
/// assert_eq!(signed_amount(CashTransactionType::Adjustment, -m).unwrap().cents(), -22800);
/// ```
pub fn signed_amount(kind: CashTransactionType, amount: Money) -> CoreResult<Money> {
    if amount.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        }
        .into());
    }
    let signed = match kind {
        CashTransactionType::Opening
        | CashTransactionType::Sale
        | CashTransactionType::Deposit => amount.abs(),
        CashTransactionType::Refund
        | CashTransactionType::Withdrawal
        | CashTransactionType::Expense
        | CashTransactionType::SupplierPayment => -amount.abs(),
        CashTransactionType::Adjustment | CashTransactionType::Transfer => amount,
    };
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_table() {
        let m = Money::from_cents(500);
        for kind in CashTransactionType::ALL {
            let plus = signed_amount(kind, m).unwrap().cents();
            let minus = signed_amount(kind, -m).unwrap().cents();
            match kind {
                CashTransactionType::Opening
                | CashTransactionType::Sale
                | CashTransactionType::Deposit => assert_eq!((plus, minus), (500, 500)),
                CashTransactionType::Adjustment | CashTransactionType::Transfer => {
                    assert_eq!((plus, minus), (500, -500))
                }
                _ => assert_eq!((plus, minus), (-500, -500)),
            }
        }
    }

    #[test]
    fn test_zero_amount_rejected() {
        assert!(signed_amount(CashTransactionType::Deposit, Money::zero()).is_err());
    }

    #[test]
    fn test_as_str_matches_serde() {
        for kind in CashTransactionType::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
