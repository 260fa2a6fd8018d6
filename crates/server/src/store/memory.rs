//! In-memory implementation of every store trait.
//!
//! All state sits behind one `tokio::sync::RwLock`, so each trait call is
//! atomic with respect to the others. It also counts reads and can be switched
//! into an "unavailable" mode, which the cache tests use to observe hits and
//! store failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mobimarket_core::{
    Email, NewOrder, Order, OrderId, OrderStatus, Product, ProductDetail, ProductId, Rating,
    Review, ReviewAuthor, ReviewId, User, UserId, UserRole, average_rating,
};
use tokio::sync::RwLock;

use super::{
    CatalogStore, NewProduct, NewUser, OrderStore, PriceOrder, ProductFilter, ProductQuery,
    ProductUpdate, ReviewInput, ReviewOutcome, UserStore,
};
use crate::db::RepositoryError;

#[derive(Debug, Clone)]
struct StoredReview {
    id: ReviewId,
    product_id: ProductId,
    user_id: UserId,
    rating: Rating,
    comment: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    reviews: BTreeMap<ReviewId, StoredReview>,
    orders: BTreeMap<OrderId, Order>,
    last_id: i32,
}

impl MemoryState {
    const fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn refresh_ratings(&mut self, product_id: ProductId) {
        let ratings: Vec<Rating> = self
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.rating)
            .collect();
        if let Some(product) = self.products.get_mut(&product_id) {
            product.ratings = average_rating(ratings.iter().copied());
            product.num_of_reviews = u32::try_from(ratings.len()).unwrap_or(u32::MAX);
            product.updated_at = Utc::now();
        }
    }

    fn detail(&self, product: &Product) -> ProductDetail {
        let mut reviews: Vec<Review> = self
            .reviews
            .values()
            .filter(|r| r.product_id == product.id)
            .map(|r| Review {
                id: r.id,
                author: self.users.get(&r.user_id).map_or(
                    ReviewAuthor::Reference(r.user_id),
                    |user| ReviewAuthor::Resolved(user.summary()),
                ),
                rating: r.rating,
                comment: r.comment.clone(),
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();
        reviews.sort_by_key(|r| (r.created_at, r.id));
        ProductDetail {
            product: product.clone(),
            reviews,
        }
    }
}

/// Store backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    reads: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `RepositoryError::Unavailable`
    /// (or succeed again with `false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of catalog read queries served so far.
    #[must_use]
    pub fn catalog_reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "memory store switched off".to_string(),
            ));
        }
        Ok(())
    }

    fn begin_read(&self) -> Result<(), RepositoryError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::NotFound(format!("{what} {id}"))
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check()
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.begin_read()?;
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn product_detail(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductDetail>, RepositoryError> {
        self.begin_read()?;
        let state = self.state.read().await;
        Ok(state.products.get(&id).map(|p| state.detail(p)))
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>, RepositoryError> {
        self.begin_read()?;
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| query.filter.matches(p))
            .cloned()
            .collect();
        match query.order {
            Some(PriceOrder::Ascending) => products.sort_by_key(|p| (p.price, p.id)),
            Some(PriceOrder::Descending) => {
                products.sort_by(|a, b| b.price.cmp(&a.price).then(a.id.cmp(&b.id)));
            }
            None => {}
        }
        if let Some(page) = query.page {
            let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let take = usize::try_from(page.size).unwrap_or(usize::MAX);
            products = products.into_iter().skip(skip).take(take).collect();
        }
        Ok(products)
    }

    async fn count_products(&self, filter: &ProductFilter) -> Result<u64, RepositoryError> {
        self.begin_read()?;
        let state = self.state.read().await;
        Ok(state.products.values().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn latest_products(&self, limit: u32) -> Result<Vec<Product>, RepositoryError> {
        self.begin_read()?;
        let state = self.state.read().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        products.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(products)
    }

    async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        self.begin_read()?;
        let state = self.state.read().await;
        let mut categories: Vec<String> =
            state.products.values().map(|p| p.category.clone()).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn create_product(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(state.next_id()),
            title: input.title.clone(),
            description: input.description.clone(),
            price: input.price,
            stock: input.stock,
            category: input.category.to_lowercase(),
            image: input.image.clone(),
            ratings: 0.0,
            num_of_reviews: 0,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| not_found("product", id))?;
        update.apply_to(product);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        let product = state
            .products
            .remove(&id)
            .ok_or_else(|| not_found("product", id))?;
        state.reviews.retain(|_, r| r.product_id != id);
        Ok(product)
    }

    async fn upsert_review(&self, input: &ReviewInput) -> Result<ReviewOutcome, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        if !state.products.contains_key(&input.product_id) {
            return Err(not_found("product", input.product_id));
        }
        if !state.users.contains_key(&input.user_id) {
            return Err(not_found("user", input.user_id));
        }

        let now = Utc::now();
        let existing = state
            .reviews
            .values_mut()
            .find(|r| r.product_id == input.product_id && r.user_id == input.user_id);
        let outcome = if let Some(review) = existing {
            review.rating = input.rating;
            review.comment.clone_from(&input.comment);
            review.updated_at = now;
            ReviewOutcome::Updated
        } else {
            let id = ReviewId::new(state.next_id());
            state.reviews.insert(
                id,
                StoredReview {
                    id,
                    product_id: input.product_id,
                    user_id: input.user_id,
                    rating: input.rating,
                    comment: input.comment.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
            ReviewOutcome::Created
        };
        state.refresh_ratings(input.product_id);
        Ok(outcome)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.check()?;
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| &u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        self.check()?;
        Ok(self.state.read().await.users.values().cloned().collect())
    }

    async fn create_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == input.email) {
            return Err(RepositoryError::Conflict("email already exists".to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: UserId::new(state.next_id()),
            name: input.name.clone(),
            email: input.email.clone(),
            image: input.image.clone(),
            role: UserRole::User,
            gender: input.gender,
            dob: input.dob,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: UserId) -> Result<User, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        if !state.users.contains_key(&id) {
            return Err(not_found("user", id));
        }
        if state.reviews.values().any(|r| r.user_id == id)
            || state.orders.values().any(|o| o.user == id)
        {
            return Err(RepositoryError::Conflict(
                "user still has reviews or orders".to_string(),
            ));
        }
        state.users.remove(&id).ok_or_else(|| not_found("user", id))
    }

    async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or_else(|| not_found("user", id))?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        self.check()?;
        let mut state = self.state.write().await;
        if !state.users.contains_key(&order.user) {
            return Err(not_found("user", order.user));
        }

        // Validate every line against the summed quantity before touching stock.
        let wanted = order.quantities();
        for (&product_id, &requested) in &wanted {
            let product = state
                .products
                .get(&product_id)
                .ok_or_else(|| not_found("product", product_id))?;
            if !product.can_fulfil(requested) {
                return Err(RepositoryError::InsufficientStock {
                    product: product_id,
                    requested,
                    available: product.stock,
                });
            }
        }

        let now = Utc::now();
        for (product_id, requested) in wanted {
            if let Some(product) = state.products.get_mut(&product_id) {
                // Checked above: requested <= stock.
                product.stock = u32::try_from(u64::from(product.stock) - requested).unwrap_or(0);
                product.updated_at = now;
            }
        }

        let placed = Order {
            id: OrderId::new(state.next_id()),
            user: order.user,
            shipping_info: order.shipping_info.clone(),
            items: order.items.clone(),
            subtotal: order.subtotal,
            tax: order.tax,
            shipping_charges: order.shipping_charges,
            discount: order.discount,
            total: order.total,
            status: OrderStatus::Processing,
            created_at: now,
        };
        state.orders.insert(placed.id, placed.clone());
        Ok(placed)
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.check()?;
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user == user)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use mobimarket_core::{Gender, OrderItem, Price, ProductImage, ShippingInfo};

    use super::*;

    fn new_product(title: &str, stock: u32) -> NewProduct {
        NewProduct {
            title: title.to_string(),
            description: String::new(),
            price: Price::from_cents(1000),
            stock,
            category: "Phones".to_string(),
            image: ProductImage {
                public_id: format!("img-{title}"),
                url: format!("https://cdn.example/{title}.png"),
            },
        }
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            email: Email::parse(email).unwrap(),
            image: "ada.png".to_string(),
            gender: Gender::Female,
            dob: NaiveDate::from_ymd_opt(1995, 3, 1).unwrap(),
        }
    }

    fn order_for(user: UserId, product: ProductId, quantity: u32) -> NewOrder {
        NewOrder {
            user,
            shipping_info: ShippingInfo {
                address: "1 Mall Rd".to_string(),
                city: "Lahore".to_string(),
                state: "Punjab".to_string(),
                country: "PK".to_string(),
                postal_code: "54000".to_string(),
            },
            items: vec![OrderItem {
                product_id: product,
                quantity,
                price: Price::from_cents(1000),
                title: "Phone".to_string(),
                image: String::new(),
            }],
            subtotal: Price::from_cents(1000),
            tax: Price::ZERO,
            shipping_charges: Price::ZERO,
            discount: Price::ZERO,
            total: Price::from_cents(1000),
        }
    }

    #[tokio::test]
    async fn test_create_lowercases_category() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("a", 1)).await.unwrap();
        assert_eq!(product.category, "phones");
        assert_eq!(store.categories().await.unwrap(), vec!["phones"]);
    }

    #[tokio::test]
    async fn test_review_upsert_recomputes_ratings() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("a", 1)).await.unwrap();
        let ada = store.create_user(&new_user("ada@shop.com")).await.unwrap();
        let bob = store.create_user(&new_user("bob@shop.com")).await.unwrap();

        let review = |user: UserId, rating: i64| ReviewInput {
            product_id: product.id,
            user_id: user,
            rating: Rating::new(rating).unwrap(),
            comment: "ok".to_string(),
        };

        assert_eq!(store.upsert_review(&review(ada.id, 5)).await.unwrap(), ReviewOutcome::Created);
        assert_eq!(store.upsert_review(&review(bob.id, 2)).await.unwrap(), ReviewOutcome::Created);
        assert_eq!(store.upsert_review(&review(ada.id, 4)).await.unwrap(), ReviewOutcome::Updated);

        let detail = store.product_detail(product.id).await.unwrap().unwrap();
        assert_eq!(detail.product.num_of_reviews, 2);
        assert!((detail.product.ratings - 3.0).abs() < f64::EPSILON);
        assert!(detail.has_resolved_authors());
    }

    #[tokio::test]
    async fn test_review_for_missing_product_is_not_found() {
        let store = MemoryStore::new();
        let ada = store.create_user(&new_user("ada@shop.com")).await.unwrap();
        let err = store
            .upsert_review(&ReviewInput {
                product_id: ProductId::new(99),
                user_id: ada.id,
                rating: Rating::new(3).unwrap(),
                comment: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("a", 2)).await.unwrap();
        let ada = store.create_user(&new_user("ada@shop.com")).await.unwrap();

        let err = store.place_order(&order_for(ada.id, product.id, 3)).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::InsufficientStock { requested: 3, available: 2, .. }
        ));
        let after = store.find_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 2);
        assert!(store.orders_for_user(ada.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_lines_cannot_wrap_past_stock() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("a", 5)).await.unwrap();
        let ada = store.create_user(&new_user("ada@shop.com")).await.unwrap();

        let mut order = order_for(ada.id, product.id, 1 << 31);
        order.items.push(order.items[0].clone());

        let err = store.place_order(&order).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::InsufficientStock { requested: 4_294_967_296, available: 5, .. }
        ));
        assert_eq!(store.find_product(product.id).await.unwrap().unwrap().stock, 5);
        assert!(store.orders_for_user(ada.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_decrements_stock() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("a", 5)).await.unwrap();
        let ada = store.create_user(&new_user("ada@shop.com")).await.unwrap();

        let order = store.place_order(&order_for(ada.id, product.id, 2)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(store.find_product(product.id).await.unwrap().unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_user_with_orders_cannot_be_deleted() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("a", 5)).await.unwrap();
        let ada = store.create_user(&new_user("ada@shop.com")).await.unwrap();
        store.place_order(&order_for(ada.id, product.id, 1)).await.unwrap();

        let err = store.delete_user(ada.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create_user(&new_user("ada@shop.com")).await.unwrap();
        let err = store.create_user(&new_user("ADA@shop.com")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unavailable_fails_reads() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.latest_products(12).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.catalog_reads(), 0);
    }

    #[tokio::test]
    async fn test_search_sorts_and_paginates() {
        let store = MemoryStore::new();
        for (title, cents) in [("a", 300), ("b", 100), ("c", 200)] {
            let mut input = new_product(title, 1);
            input.price = Price::from_cents(cents);
            store.create_product(&input).await.unwrap();
        }
        let query = ProductQuery {
            filter: ProductFilter::default(),
            order: Some(PriceOrder::Descending),
            page: Some(crate::store::Page::new(1, 2)),
        };
        let titles: Vec<String> = store
            .search_products(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["a", "c"]);
    }
}
