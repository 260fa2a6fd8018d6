//! Database operations for products and reviews.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mobimarket_core::{
    Price, Product, ProductDetail, ProductId, ProductImage, Rating, Review, ReviewAuthor,
    ReviewId, UserId, UserSummary,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::RepositoryError;
use crate::store::{
    CatalogStore, NewProduct, PriceOrder, ProductFilter, ProductQuery, ProductUpdate, ReviewInput,
    ReviewOutcome,
};

const PRODUCT_COLUMNS: &str = "id, title, description, price, stock, category, \
     image_public_id, image_url, ratings, num_of_reviews, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    title: String,
    description: String,
    price: Decimal,
    stock: i32,
    category: String,
    image_public_id: String,
    image_url: String,
    ratings: f64,
    num_of_reviews: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            price: Price::new(row.price).map_err(|e| RepositoryError::corrupt("price", e))?,
            stock: u32::try_from(row.stock).map_err(|e| RepositoryError::corrupt("stock", e))?,
            category: row.category,
            image: ProductImage {
                public_id: row.image_public_id,
                url: row.image_url,
            },
            ratings: row.ratings,
            num_of_reviews: u32::try_from(row.num_of_reviews)
                .map_err(|e| RepositoryError::corrupt("review count", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A review joined with its author's profile.
#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: ReviewId,
    user_id: UserId,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_name: Option<String>,
    author_email: Option<String>,
    author_image: Option<String>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let author = match (row.author_name, row.author_email, row.author_image) {
            (Some(name), Some(email), Some(image)) => ReviewAuthor::Resolved(UserSummary {
                id: row.user_id,
                name,
                email: mobimarket_core::Email::parse(&email)
                    .map_err(|e| RepositoryError::corrupt("email", e))?,
                image,
            }),
            _ => ReviewAuthor::Reference(row.user_id),
        };
        Ok(Self {
            id: row.id,
            author,
            rating: Rating::new(i64::from(row.rating))
                .map_err(|e| RepositoryError::corrupt("rating", e))?,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

fn to_db_int(value: u32, what: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::Conflict(format!("{what} out of range")))
}

/// Escape `LIKE` wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if let Some(search) = &filter.search {
        qb.push(" AND title ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max.amount());
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
}

// =============================================================================
// Store
// =============================================================================

/// `PostgreSQL` catalog store.
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn reviews_for(&self, id: ProductId) -> Result<Vec<Review>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            r#"
            SELECT r.id, r.user_id, r.rating, r.comment, r.created_at, r.updated_at,
                   u.name AS author_name, u.email AS author_email, u.image AS author_image
            FROM market.review r
            LEFT JOIN market."user" u ON u.id = r.user_id
            WHERE r.product_id = $1
            ORDER BY r.created_at, r.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Review::try_from).collect()
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM market.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn product_detail(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductDetail>, RepositoryError> {
        let Some(product) = self.find_product(id).await? else {
            return Ok(None);
        };
        let reviews = self.reviews_for(id).await?;
        Ok(Some(ProductDetail { product, reviews }))
    }

    #[instrument(skip(self))]
    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM market.product WHERE TRUE"
        ));
        push_filter(&mut qb, &query.filter);

        qb.push(match query.order {
            Some(PriceOrder::Ascending) => " ORDER BY price ASC, id ASC",
            Some(PriceOrder::Descending) => " ORDER BY price DESC, id ASC",
            None => " ORDER BY id ASC",
        });
        if let Some(page) = query.page {
            qb.push(" LIMIT ")
                .push_bind(i64::from(page.size))
                .push(" OFFSET ")
                .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        }

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?;
        into_products(rows)
    }

    #[instrument(skip(self))]
    async fn count_products(&self, filter: &ProductFilter) -> Result<u64, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM market.product WHERE TRUE");
        push_filter(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        u64::try_from(count).map_err(|e| RepositoryError::corrupt("count", e))
    }

    #[instrument(skip(self))]
    async fn latest_products(&self, limit: u32) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM market.product \
             ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        into_products(rows)
    }

    #[instrument(skip(self))]
    async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM market.product ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    async fn create_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO market.product \
                 (title, description, price, stock, category, image_public_id, image_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.price.amount())
        .bind(to_db_int(input.stock, "stock")?)
        .bind(input.category.to_lowercase())
        .bind(&input.image.public_id)
        .bind(&input.image.url)
        .fetch_one(&self.pool)
        .await?;

        Product::try_from(row)
    }

    #[instrument(skip(self, update), fields(product_id = %id))]
    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let stock = update
            .stock
            .map(|stock| to_db_int(stock, "stock"))
            .transpose()?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE market.product SET \
                 title = COALESCE($2, title), \
                 price = COALESCE($3, price), \
                 stock = COALESCE($4, stock), \
                 category = COALESCE($5, category), \
                 description = $6, \
                 image_public_id = COALESCE($7, image_public_id), \
                 image_url = COALESCE($8, image_url), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(update.title.as_deref())
        .bind(update.price.map(|p| p.amount()))
        .bind(stock)
        .bind(update.category.as_deref().map(str::to_lowercase))
        .bind(&update.description)
        .bind(update.image.as_ref().map(|image| image.public_id.as_str()))
        .bind(update.image.as_ref().map(|image| image.url.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(
            || Err(RepositoryError::NotFound(format!("product {id}"))),
            Product::try_from,
        )
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn delete_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "DELETE FROM market.product WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(
            || Err(RepositoryError::NotFound(format!("product {id}"))),
            Product::try_from,
        )
    }

    #[instrument(skip(self, input), fields(product_id = %input.product_id, user_id = %input.user_id))]
    async fn upsert_review(&self, input: &ReviewInput) -> Result<ReviewOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let product: Option<ProductId> =
            sqlx::query_scalar("SELECT id FROM market.product WHERE id = $1 FOR UPDATE")
                .bind(input.product_id)
                .fetch_optional(&mut *tx)
                .await?;
        if product.is_none() {
            return Err(RepositoryError::NotFound(format!(
                "product {}",
                input.product_id
            )));
        }

        let user: Option<UserId> = sqlx::query_scalar(r#"SELECT id FROM market."user" WHERE id = $1"#)
            .bind(input.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(RepositoryError::NotFound(format!("user {}", input.user_id)));
        }

        let inserted: bool = sqlx::query_scalar(
            r"
            INSERT INTO market.review (product_id, user_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, user_id) DO UPDATE
                SET rating = EXCLUDED.rating,
                    comment = EXCLUDED.comment,
                    updated_at = NOW()
            RETURNING (xmax = 0)
            ",
        )
        .bind(input.product_id)
        .bind(input.user_id)
        .bind(i16::from(input.rating.value()))
        .bind(&input.comment)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE market.product p
            SET ratings = COALESCE(s.average, 0),
                num_of_reviews = s.total,
                updated_at = NOW()
            FROM (
                SELECT AVG(rating)::float8 AS average, COUNT(*)::int4 AS total
                FROM market.review
                WHERE product_id = $1
            ) s
            WHERE p.id = $1
            ",
        )
        .bind(input.product_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(if inserted {
            ReviewOutcome::Created
        } else {
            ReviewOutcome::Updated
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("pixel"), "pixel");
    }

    #[test]
    fn test_filter_sql() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM market.product WHERE TRUE");
        let filter = ProductFilter::new(Some("pixel"), Some(Price::from_cents(100)), Some("Phones"));
        push_filter(&mut qb, &filter);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM market.product WHERE TRUE AND title ILIKE $1 AND price <= $2 AND category = $3"
        );
    }

    #[test]
    fn test_negative_stock_is_corruption() {
        let row = ProductRow {
            id: ProductId::new(1),
            title: "Phone".to_string(),
            description: String::new(),
            price: Decimal::new(1000, 2),
            stock: -1,
            category: "phones".to_string(),
            image_public_id: "p".to_string(),
            image_url: "u".to_string(),
            ratings: 0.0,
            num_of_reviews: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            Product::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_review_without_author_profile_is_reference() {
        let row = ReviewRow {
            id: ReviewId::new(1),
            user_id: UserId::new(9),
            rating: 4,
            comment: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author_name: None,
            author_email: None,
            author_image: None,
        };
        let review = Review::try_from(row).map_err(|e| e.to_string());
        assert_eq!(review.map(|r| r.author), Ok(ReviewAuthor::Reference(UserId::new(9))));
    }
}
