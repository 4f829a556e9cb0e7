//! Persistence boundary.
//!
//! Services talk to storage only through the traits in this module:
//! - `CredentialStore` / `CredentialTx`: users and refresh tokens
//! - `CatalogStore` / `CatalogTx`: perfume pricing, orders and telemetry counters
//!
//! A transaction handle rolls back when dropped without `commit`, so an early
//! `?` return or a cancelled request never leaves partial writes behind.
//!
//! Two implementations exist: [`PgStore`] (PostgreSQL via sqlx) and
//! [`MemoryStore`] (in-process, used by tests and local runs).
//!
//! Only one transaction of a store may be open per task at a time, and
//! non-transactional calls must not be made on the same store while one is
//! open. `MemoryStore` serializes on a single lock and would deadlock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    order::{NewOrder, Order},
    perfume::{PerfumeRecord, StockLevel},
    refresh_token::{NewRefreshToken, RefreshToken},
    user::{NewUser, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors produced by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (duplicate email, token hash).
    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Users and refresh tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Open a transaction.
    async fn begin_credentials(&self) -> StoreResult<Box<dyn CredentialTx>>;

    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>>;

    /// Lookup among non-anonymous users by normalized email.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Insert a user; a taken email yields [`StoreError::UniqueViolation`].
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> StoreResult<RefreshToken>;

    /// Revoke the token with this hash if it is not yet revoked.
    ///
    /// Returns whether a row changed. No match is not an error.
    async fn revoke_refresh_token(&self, token_hash: &str, now: DateTime<Utc>)
    -> StoreResult<bool>;

    /// Connectivity check for the health endpoint.
    async fn ping(&self) -> StoreResult<()>;
}

/// Transaction over users and refresh tokens.
#[async_trait]
pub trait CredentialTx: Send {
    /// Lock and return the token with this hash if it is unrevoked and unexpired at `now`.
    async fn find_active_refresh_for_update(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshToken>>;

    async fn insert_refresh_token(&mut self, token: NewRefreshToken) -> StoreResult<RefreshToken>;

    /// Revoke `id` and link it to `replaced_by`, only if still unrevoked.
    ///
    /// Returns whether exactly one row changed.
    async fn mark_refresh_replaced(
        &mut self,
        id: Uuid,
        replaced_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Revoke every active refresh token of a user. Returns the number revoked.
    async fn revoke_user_refresh_tokens(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn find_user_for_update(&mut self, id: &str) -> StoreResult<Option<User>>;

    /// Lock every non-anonymous admin row and return their ids.
    ///
    /// Concurrent demotions serialize here, so two admins cannot demote each
    /// other at once and leave none behind.
    async fn lock_admin_ids(&mut self) -> StoreResult<Vec<String>>;

    async fn set_admin(&mut self, id: &str, is_admin: bool, now: DateTime<Utc>)
    -> StoreResult<User>;

    async fn delete_user(&mut self, id: &str) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Perfume pricing, orders and telemetry counters.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open a transaction.
    async fn begin_catalog(&self) -> StoreResult<Box<dyn CatalogTx>>;

    async fn find_perfume(&self, id: &str) -> StoreResult<Option<PerfumeRecord>>;

    /// Add one to the `(day, perfume_id, event_type)` counter.
    async fn record_stat_event(
        &self,
        day: NaiveDate,
        perfume_id: &str,
        event_type: &str,
    ) -> StoreResult<()>;
}

/// Transaction over the catalog and orders.
#[async_trait]
pub trait CatalogTx: Send {
    /// Catalog rows for the given ids; unknown ids are simply absent.
    async fn find_perfumes(&mut self, ids: &[String]) -> StoreResult<Vec<PerfumeRecord>>;

    async fn lock_perfume(&mut self, id: &str) -> StoreResult<Option<PerfumeRecord>>;

    async fn increment_order_count(&mut self, perfume_id: &str, by: i64) -> StoreResult<()>;

    async fn update_stock(
        &mut self,
        perfume_id: &str,
        stock: StockLevel,
        in_stock: bool,
    ) -> StoreResult<()>;

    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order>;

    async fn find_order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn set_order_fulfilled(&mut self, id: Uuid, fulfilled: bool) -> StoreResult<Order>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
