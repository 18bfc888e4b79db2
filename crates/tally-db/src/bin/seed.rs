//! # Seed Data Generator
//!
//! Populates a database with a demo tenant for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally_dev.db
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//!
//! # Also open a shift and ring up one sale
//! cargo run -p tally-db --bin seed -- --demo-sale
//! ```
//!
//! ## Generated Data
//! - Tenant `demo` with 14% default tax
//! - Branches `main` and `airport`
//! - One credit customer
//! - A product per category/name pair, with opening stock at `main`
//!
//! Each product has:
//! - Unique SKU: `{CATEGORY}-{NAME}-{INDEX}`
//! - Price: 5.00 - 44.99
//! - Opening stock: 10 - 60
//! - Tax rate: tenant default, 0% or 5%

use chrono::Utc;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tally_core::{Branch, Customer, Money, Product, Tenant, TenantContext, Tender};
use tally_db::{CreateOrderRequest, Database, OrderLine, PosConfig};

const TENANT_ID: &str = "demo";
const BRANCHES: &[(&str, &str)] = &[("main", "Main Street"), ("airport", "Airport Kiosk")];

/// Product categories for demo data
const CATEGORIES: &[(&str, &[&str])] = &[
    ("BEV", &["Espresso", "Cappuccino", "Iced Tea", "Orange Juice", "Water"]),
    ("BAK", &["Croissant", "Muffin", "Bagel", "Cinnamon Roll"]),
    ("SNK", &["Crisps", "Granola Bar", "Mixed Nuts", "Chocolate Bar"]),
    ("SVC", &["Gift Wrap", "Delivery"]),
];

/// Tax overrides in basis points; `None` falls back to the tenant rate
const TAX_RATES: &[Option<u32>] = &[None, None, Some(0), Some(500)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./tally_dev.db");
    let mut demo_sale = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--demo-sale" => demo_sale = true,
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("      --demo-sale    Open a shift and complete one cash sale");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = PosConfig::load_or_default(None);
    config.database.path = db_path.clone().into();
    let db = Database::new(config.db_config()).await?.with_config(config);

    println!("Tally POS Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    let schema = db.schema_status().await?;
    println!("Schema:   {}/{} migrations applied", schema.applied, schema.embedded);
    println!();

    let catalog = db.catalog();
    if catalog.get_tenant(TENANT_ID).await?.is_some() {
        println!("Tenant '{}' already exists, skipping seed.", TENANT_ID);
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    catalog
        .insert_tenant(&Tenant {
            id: TENANT_ID.into(),
            name: "Demo Coffee Co.".into(),
            tax_enabled: true,
            default_tax_rate_bps: 1400,
            allow_negative_stock: false,
            currency_code: "EGP".into(),
            created_at: now,
        })
        .await?;
    for (id, name) in BRANCHES {
        catalog
            .insert_branch(&Branch {
                id: (*id).into(),
                tenant_id: TENANT_ID.into(),
                name: (*name).into(),
                address: Some(format!("{} 1", name)),
                currency_code: "EGP".into(),
                is_active: true,
                created_at: now,
            })
            .await?;
    }

    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        tenant_id: TENANT_ID.into(),
        name: "Regular Customer".into(),
        phone: Some("+201000000000".into()),
        total_orders: 0,
        total_spent_cents: 0,
        loyalty_points: 0,
        credit_limit_cents: 100_000,
        outstanding_balance_cents: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    catalog.insert_customer(&customer).await?;

    let ctx = TenantContext::new(TENANT_ID, BRANCHES[0].0, "seed", "seed@example.com")?;
    let start = std::time::Instant::now();
    let mut products = Vec::new();
    for (category_idx, (category, names)) in CATEGORIES.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            let seed = category_idx * 100 + name_idx;
            let product = generate_product(category, name, seed);
            catalog.insert_product(&product).await?;
            if product.track_inventory {
                db.stock()
                    .set_initial(&ctx, &product.id, 10 + (seed % 51) as i64)
                    .await?;
            }
            products.push(product);
        }
    }

    println!("Generated {} products in {:?}", products.len(), start.elapsed());
    println!("Customer: {} ({})", customer.name, customer.id);

    if demo_sale {
        let product = products
            .iter()
            .find(|p| p.track_inventory && p.sku.starts_with("BEV"))
            .ok_or("no beverage to sell")?;
        db.shifts().open(&ctx, Money::from_cents(50_000), None).await?;
        let order = db
            .orders()
            .create(&ctx, CreateOrderRequest::sale(vec![OrderLine::new(&product.id, 1)]))
            .await?;
        let total = order.order.total_cents;
        let done = db
            .orders()
            .complete(&ctx, &order.order.id, vec![Tender::cash(total)])
            .await?;
        info!(order_number = %done.order.order_number, "Demo sale completed");
        println!(
            "Demo sale {}: {} paid, drawer now {}",
            done.order.order_number,
            Money::from_cents(total),
            db.cash().get_balance(&ctx).await?
        );
    }

    println!();
    println!("Seed complete!");
    db.close().await;

    Ok(())
}

/// Generates a single product with deterministic data.
fn generate_product(category: &str, name: &str, seed: usize) -> Product {
    let now = Utc::now();
    let compact: String = name.chars().filter(|c| c.is_alphanumeric()).take(3).collect();
    let sku = format!("{}-{}-{:03}", category, compact.to_uppercase(), seed);
    let price_cents = 500 + ((seed * 37) % 4000) as i64;

    Product {
        id: Uuid::new_v4().to_string(),
        tenant_id: TENANT_ID.into(),
        sku,
        barcode: Some(format!("622{:010}", seed)),
        name: name.to_string(),
        price_cents,
        cost_cents: Some(price_cents * (55 + (seed % 20) as i64) / 100),
        tax_rate_bps: TAX_RATES[seed % TAX_RATES.len()],
        track_inventory: category != "SVC",
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
