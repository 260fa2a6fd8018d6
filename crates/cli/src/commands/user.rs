//! User role management.
//!
//! Running servers keep no user data in the catalog cache, so role changes
//! take effect on the next request.

use mobimarket_core::{UserId, UserRole};
use mobimarket_server::db::PgUserStore;
use mobimarket_server::store::UserStore;

use super::{CommandError, connect};

async fn set_role(id: i32, role: UserRole) -> Result<(), CommandError> {
    let pool = connect().await?;
    let store = PgUserStore::new(pool.clone());

    let user = store.set_role(UserId::new(id), role).await?;
    tracing::info!(user_id = %user.id, email = %user.email, role = %user.role, "Role updated");

    pool.close().await;
    Ok(())
}

/// Give user `id` the admin role.
pub async fn promote(id: i32) -> Result<(), CommandError> {
    set_role(id, UserRole::Admin).await
}

/// Return user `id` to the regular user role.
pub async fn demote(id: i32) -> Result<(), CommandError> {
    set_role(id, UserRole::User).await
}
