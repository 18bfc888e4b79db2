//! # Catalog Repository
//!
//! Tenants, branches, products, and customers. The core only reads these;
//! the inserts exist for seeding and test fixtures.
//!
//! Every lookup is scoped by `tenant_id`, so an id from another tenant reads
//! as "not found".

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use tally_core::validation::validate_tax_rate_bps;
use tally_core::{Branch, Customer, Product, Tenant};

use crate::error::{DbResult, PosResult};

const TENANT_COLUMNS: &str =
    "id, name, tax_enabled, default_tax_rate_bps, allow_negative_stock, currency_code, created_at";
const BRANCH_COLUMNS: &str =
    "id, tenant_id, name, address, currency_code, is_active, created_at";
const PRODUCT_COLUMNS: &str = "id, tenant_id, sku, barcode, name, price_cents, cost_cents, \
     tax_rate_bps, track_inventory, is_active, created_at, updated_at";
const CUSTOMER_COLUMNS: &str = "id, tenant_id, name, phone, total_orders, total_spent_cents, \
     loyalty_points, credit_limit_cents, outstanding_balance_cents, is_active, created_at, updated_at";

// =============================================================================
// In-transaction lookups
// =============================================================================

pub async fn find_tenant(conn: &mut SqliteConnection, tenant_id: &str) -> DbResult<Option<Tenant>> {
    let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?");
    let tenant = sqlx::query_as::<_, Tenant>(&sql)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await?;
    Ok(tenant)
}

pub async fn find_branch(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
) -> DbResult<Option<Branch>> {
    let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE tenant_id = ? AND id = ?");
    let branch = sqlx::query_as::<_, Branch>(&sql)
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_optional(conn)
        .await?;
    Ok(branch)
}

pub async fn find_product(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = ? AND id = ?");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(tenant_id)
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(product)
}

pub async fn find_customer(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
) -> DbResult<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant_id = ? AND id = ?");
    let customer = sqlx::query_as::<_, Customer>(&sql)
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
    Ok(customer)
}

// =============================================================================
// CatalogRepository
// =============================================================================

/// Pool-backed catalog access.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    pub async fn insert_tenant(&self, tenant: &Tenant) -> PosResult<()> {
        validate_tax_rate_bps(tenant.default_tax_rate_bps)?;
        debug!(id = %tenant.id, "Inserting tenant");
        let sql = format!("INSERT INTO tenants ({TENANT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(&tenant.id)
            .bind(&tenant.name)
            .bind(tenant.tax_enabled)
            .bind(tenant.default_tax_rate_bps)
            .bind(tenant.allow_negative_stock)
            .bind(&tenant.currency_code)
            .bind(tenant.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_branch(&self, branch: &Branch) -> DbResult<()> {
        debug!(id = %branch.id, "Inserting branch");
        let sql = format!("INSERT INTO branches ({BRANCH_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(&branch.id)
            .bind(&branch.tenant_id)
            .bind(&branch.name)
            .bind(&branch.address)
            .bind(&branch.currency_code)
            .bind(branch.is_active)
            .bind(branch.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Products without their own rate fall back to the tenant rate.
    pub async fn insert_product(&self, product: &Product) -> PosResult<()> {
        if let Some(bps) = product.tax_rate_bps {
            validate_tax_rate_bps(bps)?;
        }
        debug!(id = %product.id, sku = %product.sku, "Inserting product");
        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(&product.id)
            .bind(&product.tenant_id)
            .bind(&product.sku)
            .bind(&product.barcode)
            .bind(&product.name)
            .bind(product.price_cents)
            .bind(product.cost_cents)
            .bind(product.tax_rate_bps)
            .bind(product.track_inventory)
            .bind(product.is_active)
            .bind(product.created_at)
            .bind(product.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");
        let sql = format!(
            "INSERT INTO customers ({CUSTOMER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(&customer.id)
            .bind(&customer.tenant_id)
            .bind(&customer.name)
            .bind(&customer.phone)
            .bind(customer.total_orders)
            .bind(customer.total_spent_cents)
            .bind(customer.loyalty_points)
            .bind(customer.credit_limit_cents)
            .bind(customer.outstanding_balance_cents)
            .bind(customer.is_active)
            .bind(customer.created_at)
            .bind(customer.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_tenant(&self, tenant_id: &str) -> DbResult<Option<Tenant>> {
        let mut conn = self.pool.acquire().await?;
        find_tenant(&mut conn, tenant_id).await
    }

    pub async fn get_branch(&self, tenant_id: &str, branch_id: &str) -> DbResult<Option<Branch>> {
        let mut conn = self.pool.acquire().await?;
        find_branch(&mut conn, tenant_id, branch_id).await
    }

    pub async fn get_product(&self, tenant_id: &str, product_id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find_product(&mut conn, tenant_id, product_id).await
    }

    pub async fn get_customer(
        &self,
        tenant_id: &str,
        customer_id: &str,
    ) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        find_customer(&mut conn, tenant_id, customer_id).await
    }
}
