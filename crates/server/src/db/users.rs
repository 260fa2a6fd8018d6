//! Database operations for user accounts.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mobimarket_core::{Email, User, UserId, UserRole};
use sqlx::PgPool;
use tracing::instrument;

use super::{RepositoryError, conflict_on_unique};
use crate::store::{NewUser, UserStore};

const USER_COLUMNS: &str = "id, name, email, image, role, gender, dob, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    image: String,
    role: String,
    gender: String,
    dob: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            email: Email::parse(&row.email).map_err(|e| RepositoryError::corrupt("email", e))?,
            image: row.image,
            role: row.role.parse().map_err(|e: String| RepositoryError::corrupt("role", e))?,
            gender: row
                .gender
                .parse()
                .map_err(|e: String| RepositoryError::corrupt("gender", e))?,
            dob: row.dob,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `PostgreSQL` user store.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"SELECT {USER_COLUMNS} FROM market."user" WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self, email))]
    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"SELECT {USER_COLUMNS} FROM market."user" WHERE email = $1"#
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"SELECT {USER_COLUMNS} FROM market."user" ORDER BY id"#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    #[instrument(skip(self, input))]
    async fn create_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"INSERT INTO market."user" (name, email, image, gender, dob)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(&input.name)
        .bind(input.email.as_str())
        .bind(&input.image)
        .bind(input.gender.to_string())
        .bind(input.dob)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        User::try_from(row)
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn delete_user(&self, id: UserId) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM market.review WHERE user_id = $1)
                OR EXISTS (SELECT 1 FROM market."order" WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"SELECT {USER_COLUMNS} FROM market."user" WHERE id = $1 FOR UPDATE"#
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;

        if in_use {
            return Err(RepositoryError::Conflict(
                "user still has reviews or orders".to_string(),
            ));
        }

        sqlx::query(r#"DELETE FROM market."user" WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        User::try_from(row)
    }

    #[instrument(skip(self), fields(user_id = %id, role = %role))]
    async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"UPDATE market."user" SET role = $2, updated_at = NOW()
               WHERE id = $1
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(id)
        .bind(role.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(
            || Err(RepositoryError::NotFound(format!("user {id}"))),
            User::try_from,
        )
    }
}
