//! Seed the catalog with sample products.

use mobimarket_core::{Price, ProductImage};
use mobimarket_server::db::PgCatalogStore;
use mobimarket_server::store::{CatalogStore, NewProduct, ProductFilter};

use super::{CommandError, connect};

/// `(title, category, price in cents, stock)`
const SAMPLE_PRODUCTS: &[(&str, &str, u32, u32)] = &[
    ("Google Pixel 9", "phones", 79_900, 25),
    ("Samsung Galaxy S24", "phones", 85_000, 18),
    ("iPhone 16", "phones", 99_900, 30),
    ("iPad Air", "tablets", 59_900, 12),
    ("Galaxy Tab S9", "tablets", 64_900, 8),
    ("AirPods Pro", "audio", 24_900, 40),
    ("USB-C Charger 65W", "accessories", 3_999, 100),
];

fn sample(title: &str, category: &str, cents: u32, stock: u32) -> NewProduct {
    let slug: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    NewProduct {
        title: title.to_string(),
        description: format!("Sample {category} listing"),
        price: Price::from_cents(cents),
        stock,
        category: category.to_string(),
        image: ProductImage {
            public_id: format!("samples/{slug}"),
            url: format!("https://cdn.mobimarket.example/samples/{slug}.png"),
        },
    }
}

/// Insert the sample catalog.
///
/// Does nothing when the catalog already has products, unless `force` is set.
pub async fn catalog(force: bool) -> Result<(), CommandError> {
    let pool = connect().await?;
    let store = PgCatalogStore::new(pool.clone());

    let existing = store.count_products(&ProductFilter::default()).await?;
    if existing > 0 && !force {
        tracing::info!(existing, "Catalog already has products, skipping seed");
        return Ok(());
    }

    for &(title, category, cents, stock) in SAMPLE_PRODUCTS {
        let product = store
            .create_product(&sample(title, category, cents, stock))
            .await?;
        tracing::info!(product_id = %product.id, title, "Seeded product");
    }

    tracing::info!(count = SAMPLE_PRODUCTS.len(), "Seed complete");
    pool.close().await;
    Ok(())
}
