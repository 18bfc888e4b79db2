//! # Repository Module
//!
//! SQL for Tally POS, one module per table family.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Services                            │
//! │                                                                         │
//! │  OrderService::complete(ctx, order_id, tenders)                        │
//! │       │                                                                 │
//! │       │  let mut tx = pool.begin().await?;                             │
//! │       ▼                                                                 │
//! │  repository::order::mark_completed(&mut tx, ...)                       │
//! │  repository::stock::set_quantity(&mut tx, ...)                         │
//! │  repository::cash::insert_entry(&mut tx, ...)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.commit()  (or drop → rollback)                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Functions take `&mut SqliteConnection`, so one transaction can span
//! several repositories. Only [`catalog::CatalogRepository`] owns a pool; the
//! catalog is read-mostly and written only by seeding and fixtures.
//!
//! Repositories never decide business rules; guarded updates report rows
//! affected and the services turn `0` into the right error.

pub mod cash;
pub mod catalog;
pub mod customer;
pub mod order;
pub mod shift;
pub mod stock;

pub use catalog::CatalogRepository;
