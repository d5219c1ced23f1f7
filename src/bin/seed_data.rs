//! Seed data script - populates the database with a small demo catalog
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - 3 colors and 3 sizes
//! - 4 products, each with one stocked item per size
//! - 1 default shipping address for the demo user

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tracing::info;
use uuid::Uuid;

use shop_api::{
    config, db,
    entities::{address, product, product_color, product_item, product_size},
};

/// Fixed so tokens minted for local testing can reference the seeded address.
const DEMO_USER_ID: Uuid = Uuid::from_u128(0x5eed_0000_0000_4000_8000_0000_0000_0001);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Shop API Seed Data ===");

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => config::load_config()?.database_url,
    };

    let pool = db::establish_connection_with_config(&db::DbConfig {
        url: database_url.clone(),
        max_connections: 2,
        ..Default::default()
    })
    .await?;
    db::run_migrations(&pool).await?;
    info!("Connected to {}", database_url);

    let colors = create_colors(&pool).await?;
    let sizes = create_sizes(&pool).await?;
    let items = create_catalog(&pool, &colors, &sizes).await?;
    info!("  Created {} product items", items);

    let address_id = create_address(&pool).await?;
    info!("  Demo user {} has address {}", DEMO_USER_ID, address_id);

    info!("Seed complete");
    Ok(())
}

async fn create_colors(db: &DatabaseConnection) -> anyhow::Result<Vec<Uuid>> {
    let mut ids = Vec::new();
    for value in ["Black", "Sand", "Olive"] {
        let model = product_color::ActiveModel {
            id: Set(Uuid::new_v4()),
            value: Set(value.to_string()),
        }
        .insert(db)
        .await?;
        ids.push(model.id);
    }
    Ok(ids)
}

async fn create_sizes(db: &DatabaseConnection) -> anyhow::Result<Vec<Uuid>> {
    let mut ids = Vec::new();
    for value in ["S", "M", "L"] {
        let model = product_size::ActiveModel {
            id: Set(Uuid::new_v4()),
            value: Set(value.to_string()),
        }
        .insert(db)
        .await?;
        ids.push(model.id);
    }
    Ok(ids)
}

async fn create_catalog(
    db: &DatabaseConnection,
    colors: &[Uuid],
    sizes: &[Uuid],
) -> anyhow::Result<usize> {
    let catalog: [(&str, Decimal, i32); 4] = [
        ("Linen Shirt", dec!(25.00), 12),
        ("Wool Overshirt", dec!(89.50), 4),
        ("Canvas Tote", dec!(14.99), 30),
        ("Rain Shell", dec!(120.00), 2),
    ];

    let now = Utc::now();
    let mut created = 0;
    for (index, (name, price, stock)) in catalog.into_iter().enumerate() {
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(format!("{} from the demo catalog", name))),
            avatar: Set(Some(format!(
                "https://cdn.example.com/products/{}.jpg",
                name.to_lowercase().replace(' ', "-")
            ))),
            price: Set(price),
            product_color_id: Set(colors.get(index % colors.len().max(1)).copied()),
            created_at: Set(now),
        }
        .insert(db)
        .await?;

        for size in sizes {
            product_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product.id),
                product_size_id: Set(Some(*size)),
                quantity: Set(stock),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
            created += 1;
        }
    }
    Ok(created)
}

async fn create_address(db: &DatabaseConnection) -> anyhow::Result<Uuid> {
    let model = address::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(DEMO_USER_ID),
        province: Set("01-Hanoi".into()),
        district: Set("001-Ba Dinh".into()),
        ward: Set("00001-Phuc Xa".into()),
        specify: Set("12 Hang Bai".into()),
        full_name: Set("Demo Shopper".into()),
        phone_number: Set("0900000001".into()),
        is_default: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;
    Ok(model.id)
}
