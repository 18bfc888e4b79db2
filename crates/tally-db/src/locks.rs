//! # Ledger Locks
//!
//! Serializes ledger writers per tenant inside this process.
//!
//! ```text
//!   complete(order A) ──┐
//!   refund(order B)  ───┼──► LedgerLocks["tenant-1"] ──► one writer at a time
//!   close(shift S)   ───┘         │
//!                                 ▼
//!                     read tail ─► append ─► commit ─► release
//! ```
//!
//! The cash balance is "the balance_after of the newest entry", so reading
//! the tail and appending must not interleave with another writer. The lock
//! covers every branch of the tenant because ledger numbers are sequenced per
//! tenant. The `UNIQUE (tenant_id, branch_id, branch_seq)` constraint is the
//! storage-level backstop.
//!
//! Always acquire the guard *before* beginning the transaction: a task
//! holding a pooled connection must never wait on this lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Registry of per-tenant async mutexes.
#[derive(Debug, Clone, Default)]
pub struct LedgerLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Proof that the holder is the only ledger writer for `tenant_id`.
///
/// In-transaction ledger appends take `&LedgerGuard`, so they cannot be
/// called without holding the lock.
#[derive(Debug)]
pub struct LedgerGuard {
    tenant_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl LedgerGuard {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

impl LedgerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until this task is the only writer for `tenant_id`.
    pub async fn acquire(&self, tenant_id: &str) -> LedgerGuard {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = mutex.lock_owned().await;
        debug!(tenant_id, "Ledger lock acquired");
        LedgerGuard {
            tenant_id: tenant_id.to_string(),
            _guard: guard,
        }
    }
}
