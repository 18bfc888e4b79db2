//! # Services
//!
//! The consistency core. Each service holds a [`Database`](crate::Database)
//! handle and owns the transaction boundary of its operations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      One Operation                                      │
//! │                                                                         │
//! │  validate input            (no writes, no rollback needed)              │
//! │       │                                                                 │
//! │  locks.acquire(tenant)     (before the pool hands out a connection)     │
//! │       │                                                                 │
//! │  pool.begin()                                                           │
//! │       │   scope checks, stock / cash / shift / order writes             │
//! │       │   any `?` drops the transaction → rollback                      │
//! │  tx.commit()                                                            │
//! │       │                                                                 │
//! │  notify (best effort)                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dependency order: orders → {stock, cash, shifts, customer stats};
//! shifts → cash; nothing depends on orders.

pub mod cash_ledger;
pub mod customer_stats;
pub mod orders;
pub mod shifts;
pub mod stock_ledger;

use sqlx::SqliteConnection;
use uuid::Uuid;

use tally_core::{Branch, CoreError, Tenant, TenantContext};

use crate::error::PosResult;
use crate::repository::catalog;

/// New UUID v4 primary key.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Loads the acting tenant and branch, failing with `NotFound` when the
/// branch is not the tenant's.
pub(crate) async fn load_scope(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
) -> PosResult<(Tenant, Branch)> {
    let tenant = catalog::find_tenant(&mut *conn, &ctx.tenant_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Tenant", ctx.tenant_id.as_str()))?;
    let branch = load_branch(conn, &ctx.tenant_id, &ctx.branch_id).await?;
    Ok((tenant, branch))
}

pub(crate) async fn load_branch(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
) -> PosResult<Branch> {
    let branch = catalog::find_branch(conn, tenant_id, branch_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Branch", branch_id))?;
    Ok(branch)
}

/// Turns a guarded update that touched nothing into `ConcurrencyConflict`.
pub(crate) fn ensure_updated(rows: u64, entity: &str, id: &str) -> PosResult<()> {
    if rows == 0 {
        Err(CoreError::conflict(entity, id).into())
    } else {
        Ok(())
    }
}

/// In-memory fixtures shared by the service tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use tally_core::{Clock, Customer, FixedClock, Money, Product, Tenant, TenantContext};

    use crate::notify::{Notifier, NotifyError, PosEvent};
    use crate::pool::{Database, DbConfig};

    use super::*;

    pub const TENANT: &str = "tenant-1";
    pub const BRANCH: &str = "branch-1";
    pub const OTHER_BRANCH: &str = "branch-2";
    pub const CASHIER: &str = "user-1";

    /// Records every event it is handed.
    #[derive(Default)]
    pub struct Recorder {
        pub events: std::sync::Mutex<Vec<PosEvent>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, event: &PosEvent) -> Result<(), NotifyError> {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event.clone());
            Ok(())
        }
    }

    /// Fails every dispatch.
    pub struct Offline;

    impl Notifier for Offline {
        fn notify(&self, _event: &PosEvent) -> Result<(), NotifyError> {
            Err(NotifyError("printer offline".into()))
        }
    }

    pub struct Fixture {
        pub db: Database,
        pub clock: Arc<FixedClock>,
        pub ctx: TenantContext,
    }

    pub fn ctx() -> TenantContext {
        TenantContext::new(TENANT, BRANCH, CASHIER, "cashier@example.com").unwrap()
    }

    /// Tenant with 14% default tax, two branches, no negative stock.
    pub async fn fixture() -> Fixture {
        fixture_with(|_| {}).await
    }

    pub async fn fixture_with(adjust: impl FnOnce(&mut Tenant)) -> Fixture {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap(),
        ));
        let db = Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_clock(clock.clone());

        let now = clock.now();
        let mut tenant = Tenant {
            id: TENANT.into(),
            name: "Corner Shop".into(),
            tax_enabled: true,
            default_tax_rate_bps: 1400,
            allow_negative_stock: false,
            currency_code: "EGP".into(),
            created_at: now,
        };
        adjust(&mut tenant);
        let catalog = db.catalog();
        catalog.insert_tenant(&tenant).await.unwrap();
        for (id, name) in [(BRANCH, "Downtown"), (OTHER_BRANCH, "Harbour")] {
            catalog
                .insert_branch(&Branch {
                    id: id.into(),
                    tenant_id: TENANT.into(),
                    name: name.into(),
                    address: Some(format!("{name} Street 1")),
                    currency_code: "EGP".into(),
                    is_active: true,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        Fixture {
            db,
            clock,
            ctx: ctx(),
        }
    }

    impl Fixture {
        /// Tracked product priced `price_cents` net, tenant tax rate.
        pub async fn product(&self, sku: &str, price_cents: i64) -> Product {
            self.product_with(sku, price_cents, |_| {}).await
        }

        pub async fn product_with(
            &self,
            sku: &str,
            price_cents: i64,
            adjust: impl FnOnce(&mut Product),
        ) -> Product {
            let now = self.clock.now();
            let mut product = Product {
                id: new_id(),
                tenant_id: TENANT.into(),
                sku: sku.into(),
                barcode: None,
                name: format!("Product {sku}"),
                price_cents,
                cost_cents: None,
                tax_rate_bps: None,
                track_inventory: true,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            adjust(&mut product);
            self.db.catalog().insert_product(&product).await.unwrap();
            product
        }

        /// Tracked product with opening stock at the acting branch.
        pub async fn stocked(&self, sku: &str, price_cents: i64, quantity: i64) -> Product {
            let product = self.product(sku, price_cents).await;
            self.db
                .stock()
                .set_initial(&self.ctx, &product.id, quantity)
                .await
                .unwrap();
            product
        }

        pub async fn customer(&self, credit_limit_cents: i64) -> Customer {
            let now = self.clock.now();
            let customer = Customer {
                id: new_id(),
                tenant_id: TENANT.into(),
                name: "Mona".into(),
                phone: Some("+20100000000".into()),
                total_orders: 0,
                total_spent_cents: 0,
                loyalty_points: 0,
                credit_limit_cents,
                outstanding_balance_cents: 0,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            self.db.catalog().insert_customer(&customer).await.unwrap();
            customer
        }

        pub async fn open_shift(&self, opening_cents: i64) -> tally_core::Shift {
            self.db
                .shifts()
                .open(&self.ctx, Money::from_cents(opening_cents), None)
                .await
                .unwrap()
        }

        /// Asserts the branch cash chain links up and returns it oldest first.
        pub async fn assert_cash_chain(&self, branch_id: &str) -> Vec<tally_core::CashLedgerEntry> {
            let ctx = self.ctx.at_branch(branch_id).unwrap();
            let mut entries = self.db.cash().history(&ctx, 10_000).await.unwrap();
            entries.reverse();
            let mut previous = 0;
            for (i, entry) in entries.iter().enumerate() {
                assert_eq!(entry.branch_seq, i as i64 + 1, "gap in {}", entry.number);
                assert_eq!(entry.balance_before_cents, previous, "fork at {}", entry.number);
                assert_eq!(
                    entry.balance_after_cents,
                    entry.balance_before_cents + entry.amount_cents
                );
                previous = entry.balance_after_cents;
            }
            entries
        }
    }
}
