//! # Notifications
//!
//! Post-commit, best-effort event dispatch (receipt printing, displays,
//! webhooks). Dispatch happens after the transaction commits; a failing
//! notifier is logged and ignored.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Something worth telling the outside world about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PosEvent {
    OrderCompleted {
        tenant_id: String,
        order_id: String,
        order_number: String,
        total_cents: i64,
    },
    OrderRefunded {
        tenant_id: String,
        order_id: String,
        return_order_id: String,
        refund_amount_cents: i64,
    },
    ShiftClosed {
        tenant_id: String,
        shift_id: String,
        difference_cents: i64,
        force_closed: bool,
    },
}

/// Dispatch failure.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives events after commit.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &PosEvent) -> Result<(), NotifyError>;
}

/// Default notifier: writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &PosEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event).map_err(|e| NotifyError(e.to_string()))?;
        info!(event = %payload, "POS event");
        Ok(())
    }
}

/// Sends `event`, logging instead of failing.
pub(crate) fn dispatch(notifier: &dyn Notifier, event: PosEvent) {
    if let Err(e) = notifier.notify(&event) {
        warn!(error = %e, ?event, "Notification dispatch failed");
    }
}
