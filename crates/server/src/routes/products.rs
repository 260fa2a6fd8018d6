//! Product and review handlers.
//!
//! Every mutation writes to the store first and invalidates the affected
//! cached views before it responds.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use mobimarket_core::{Price, ProductId, ProductImage, Rating, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::{BodyId, envelope, message, optional, parse_id, required};
use crate::cache::CatalogChange;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;
use crate::store::{
    NewProduct, Page, PriceOrder, ProductFilter, ProductQuery, ProductUpdate, ReviewInput,
    ReviewOutcome,
};

// =============================================================================
// Cached views
// =============================================================================

/// `GET /product/latest`
pub async fn latest(State(state): State<AppState>) -> Result<Json<Value>> {
    let products = state.reader().latest_products().await?;
    Ok(envelope("Latest products", "products", products))
}

/// `GET /product/categories`
pub async fn categories(State(state): State<AppState>) -> Result<Json<Value>> {
    let categories = state.reader().categories().await?;
    Ok(envelope("Categories", "categories", categories))
}

/// `GET /product/admin-products`
pub async fn admin_products(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Value>> {
    let products = state.reader().all_products().await?;
    Ok(envelope("All products", "products", products))
}

/// `GET /product/{id}`
pub async fn detail(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let id: ProductId = parse_id(&id, "product")?;
    let product = state.reader().product_detail(id).await?;
    Ok(envelope("Product details", "product", product))
}

// =============================================================================
// Search
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    search: Option<String>,
    /// Upper bound on price.
    price: Option<String>,
    category: Option<String>,
    /// `asc`, or anything else for descending.
    sort: Option<String>,
    page: Option<String>,
}

impl SearchParams {
    fn into_query(self, page_size: u32) -> Result<ProductQuery> {
        let max_price = optional(self.price)
            .map(|raw| {
                raw.parse::<Decimal>()
                    .ok()
                    .and_then(|amount| Price::new(amount).ok())
                    .ok_or_else(|| AppError::BadRequest("Invalid price".to_string()))
            })
            .transpose()?;

        let order = optional(self.sort).map(|sort| {
            if sort.eq_ignore_ascii_case("asc") {
                PriceOrder::Ascending
            } else {
                PriceOrder::Descending
            }
        });

        let number = optional(self.page)
            .map(|raw| {
                raw.parse::<u32>()
                    .map_err(|_| AppError::BadRequest("Invalid page".to_string()))
            })
            .transpose()?
            .unwrap_or(1);

        Ok(ProductQuery {
            filter: ProductFilter::new(
                self.search.as_deref(),
                max_price,
                self.category.as_deref(),
            ),
            order,
            page: Some(Page::new(number, page_size)),
        })
    }
}

/// `GET /product/all`
///
/// Filtered views are never cached, and the aggregate views are cleared
/// before every search.
pub async fn search(
    State(state): State<AppState>,
    params: std::result::Result<Query<SearchParams>, axum::extract::rejection::QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(params) = params?;
    let page_size = state.config().catalog.products_per_page;
    let query = params.into_query(page_size)?;

    state.cache().invalidate(&CatalogChange::CatalogSearched).await;

    let catalog = state.catalog();
    let (products, total) = tokio::try_join!(
        catalog.search_products(&query),
        catalog.count_products(&query.filter),
    )?;
    let total_pages = Page::count_for(total, page_size);

    let Json(mut body) = envelope("Products", "products", products);
    if let Some(map) = body.as_object_mut() {
        map.insert("totalPages".to_string(), total_pages.into());
    }
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(body),
    ))
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct NewProductBody {
    title: Option<String>,
    description: Option<String>,
    price: Option<Decimal>,
    stock: Option<u32>,
    category: Option<String>,
    image_url: Option<String>,
    image_public_id: Option<String>,
}

fn price_of(amount: Decimal) -> Result<Price> {
    Price::new(amount).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// `POST /product/new`
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: std::result::Result<Json<NewProductBody>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) = body?;
    let input = NewProduct {
        title: required(body.title, "title")?,
        description: body.description.unwrap_or_default().trim().to_string(),
        price: price_of(
            body.price
                .ok_or_else(|| AppError::BadRequest("Please enter price".to_string()))?,
        )?,
        stock: body
            .stock
            .ok_or_else(|| AppError::BadRequest("Please enter stock".to_string()))?,
        category: required(body.category, "category")?.to_lowercase(),
        image: ProductImage {
            url: required(body.image_url, "image_url")?,
            public_id: required(body.image_public_id, "image_public_id")?,
        },
    };

    let product = state.catalog().create_product(&input).await?;
    state.cache().invalidate(&CatalogChange::ProductCreated).await;

    tracing::info!(product_id = %product.id, admin = %admin.id, "Product created");
    Ok((
        StatusCode::CREATED,
        envelope("Product created successfully", "product", product),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductBody {
    title: Option<String>,
    description: Option<String>,
    price: Option<Decimal>,
    stock: Option<u32>,
    category: Option<String>,
    image_url: Option<String>,
    image_public_id: Option<String>,
}

impl UpdateProductBody {
    fn into_update(self) -> Result<ProductUpdate> {
        let image = match (optional(self.image_url), optional(self.image_public_id)) {
            (Some(url), Some(public_id)) => Some(ProductImage { public_id, url }),
            (None, None) => None,
            _ => {
                return Err(AppError::BadRequest(
                    "image_url and image_public_id must be sent together".to_string(),
                ));
            }
        };
        Ok(ProductUpdate {
            title: optional(self.title),
            price: self.price.map(price_of).transpose()?,
            stock: self.stock,
            category: optional(self.category).map(|c| c.to_lowercase()),
            description: self.description.unwrap_or_default().trim().to_string(),
            image,
        })
    }
}

/// `PUT /product/{id}`
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    body: std::result::Result<Json<UpdateProductBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let id: ProductId = parse_id(&id, "product")?;
    let Json(body) = body?;
    let update = body.into_update()?;

    let product = state.catalog().update_product(id, &update).await?;
    state.cache().invalidate(&CatalogChange::ProductUpdated { id }).await;

    tracing::info!(product_id = %id, admin = %admin.id, "Product updated");
    Ok(envelope("Product updated successfully", "product", product))
}

/// `DELETE /product/{id}`
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id: ProductId = parse_id(&id, "product")?;

    let product = state.catalog().delete_product(id).await?;
    state.cache().invalidate(&CatalogChange::ProductDeleted { id }).await;

    tracing::info!(
        product_id = %id,
        image = %product.image.public_id,
        admin = %admin.id,
        "Product deleted"
    );
    Ok(message("Product deleted successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewBody {
    /// Product id.
    id: Option<BodyId>,
    user: Option<BodyId>,
    rating: Option<i64>,
    comment: Option<String>,
}

/// `PUT /product/review`
pub async fn review(
    State(state): State<AppState>,
    body: std::result::Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(body) = body?;
    let product_id: ProductId =
        parse_id(&required(body.id.map(BodyId::into_text), "product id")?, "product")?;
    let user_id: UserId =
        parse_id(&required(body.user.map(BodyId::into_text), "user id")?, "user")?;
    let rating = body
        .rating
        .ok_or_else(|| AppError::BadRequest("Please enter rating".to_string()))
        .and_then(|r| Rating::new(r).map_err(|e| AppError::BadRequest(e.to_string())))?;

    let input = ReviewInput {
        product_id,
        user_id,
        rating,
        comment: body.comment.unwrap_or_default().trim().to_string(),
    };
    let outcome = state.catalog().upsert_review(&input).await?;
    state
        .cache()
        .invalidate(&CatalogChange::ReviewChanged { product_id })
        .await;

    Ok(message(match outcome {
        ReviewOutcome::Created => "Review added",
        ReviewOutcome::Updated => "Review updated",
    }))
}
