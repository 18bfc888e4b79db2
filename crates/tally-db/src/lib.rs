//! # tally-db: Persistence and Ledger Services for Tally POS
//!
//! Owns the SQLite schema, the repositories and every transaction boundary.
//! Arithmetic lives in `tally-core`; this crate decides what is written,
//! in which order, under which lock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  Caller (API handler, terminal, seed binary)                           │
//! │       │  TenantContext + request                                       │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   service/   OrderService  ShiftService  CashLedger  StockLedger│   │
//! │  │      │        (one sqlx Transaction per operation)              │   │
//! │  │      ▼                                                          │   │
//! │  │   repository/   order  shift  cash  stock  customer  catalog    │   │
//! │  │      │                                                          │   │
//! │  │      ▼                                                          │   │
//! │  │   pool.rs (SqlitePool, clock, ledger locks, notifier)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)  ~/.local/share/tally-pos/tally.db                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and the shared [`Database`] handle
//! - [`config`] - `tally.toml` plus `TALLY_*` overrides
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - [`DbError`] and the service-level [`PosError`]
//! - [`locks`] - Per-tenant ledger writer locks
//! - [`notify`] - Post-commit notifications
//! - [`repository`] - SQL only, no business rules
//! - [`service`] - Stock ledger, cash ledger, shifts, customer stats, orders
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::{Money, TenantContext, Tender};
//! use tally_db::{CreateOrderRequest, Database, OrderLine, PosConfig};
//!
//! let config = PosConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?.with_config(config);
//! let ctx = TenantContext::new("tenant-1", "branch-1", "user-1", "cashier@example.com")?;
//!
//! db.shifts().open(&ctx, Money::from_cents(50_000), None).await?;
//! let order = db
//!     .orders()
//!     .create(&ctx, CreateOrderRequest::sale(vec![OrderLine::new(product_id, 2)]))
//!     .await?;
//! db.orders().complete(&ctx, &order.order.id, vec![Tender::cash(25_000)]).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod locks;
pub mod migrations;
pub mod notify;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::PosConfig;
pub use error::{DbError, DbResult, PosError, PosResult};
pub use migrations::SchemaStatus;
pub use notify::{LogNotifier, Notifier, NotifyError, PosEvent};
pub use pool::{Database, DbConfig};

// Services and their request types
pub use repository::catalog::CatalogRepository;
pub use service::cash_ledger::CashLedger;
pub use service::orders::{CreateOrderRequest, OrderDetails, OrderLine, OrderService};
pub use service::shifts::{CloseShiftRequest, HandoverRequest, HandoverResult, ShiftService, ShiftVersion};
pub use service::stock_ledger::StockLedger;
