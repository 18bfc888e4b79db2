//! # Order State Machine
//!
//! Every status change goes through [`ensure_transition`]. The table:
//!
//! | From              | To                                       |
//! |-------------------|------------------------------------------|
//! | Draft             | Pending, Completed, Cancelled            |
//! | Pending           | Completed, Cancelled                     |
//! | Completed         | PartiallyRefunded, Refunded              |
//! | PartiallyRefunded | PartiallyRefunded, Refunded              |
//! | Cancelled         | (terminal)                               |
//! | Refunded          | (terminal)                               |

use crate::error::{CoreError, CoreResult};
use crate::types::OrderStatus;

impl OrderStatus {
    /// Returns true when the table allows `self → to`.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Draft, Pending)
                | (Draft, Completed)
                | (Draft, Cancelled)
                | (Pending, Completed)
                | (Pending, Cancelled)
                | (Completed, PartiallyRefunded)
                | (Completed, Refunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    /// Cancelled and Refunded orders never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Items and adjustments may only change while Draft.
    pub fn is_editable(self) -> bool {
        matches!(self, OrderStatus::Draft)
    }

    /// Statuses whose order counts as a committed sale.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::PartiallyRefunded | OrderStatus::Refunded
        )
    }
}

/// Checks a transition against the table.
pub fn ensure_transition(order_id: &str, from: OrderStatus, to: OrderStatus) -> CoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidStateTransition {
            order_id: order_id.to_string(),
            from,
            to,
        })
    }
}

/// Checks that an order can still be edited.
///
/// Reported as a failed transition to Draft so callers see the current state.
pub fn ensure_editable(order_id: &str, status: OrderStatus) -> CoreResult<()> {
    if status.is_editable() {
        Ok(())
    } else {
        Err(CoreError::InvalidStateTransition {
            order_id: order_id.to_string(),
            from: status,
            to: OrderStatus::Draft,
        })
    }
}
