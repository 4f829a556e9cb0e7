//! PostgreSQL store backed by sqlx.
//!
//! Each transaction handle owns a `sqlx::Transaction<'static, Postgres>`;
//! dropping it without `commit` rolls back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, Transaction, types::Json};
use uuid::Uuid;

use super::{CatalogStore, CatalogTx, CredentialStore, CredentialTx, StoreError, StoreResult};
use crate::db::DbPool;
use crate::models::{
    order::{NewOrder, Order},
    perfume::{PerfumeRecord, StockLevel},
    refresh_token::{NewRefreshToken, RefreshToken},
    user::{NewUser, User},
};

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, is_admin, is_anonymous, created_at, updated_at";

const REFRESH_COLUMNS: &str =
    "id, user_id, token_hash, expires_at, revoked_at, replaced_by, created_at";

const PERFUME_COLUMNS: &str =
    "id, price, base_price, currency, stock_qty, in_stock, order_count";

const ORDER_COLUMNS: &str = "id, user_id, is_anonymous, email, display_name, phone, items, \
     total, currency, channel, delivery_method, delivery_address, fulfilled, created_at";

/// Map unique-constraint failures to [`StoreError::UniqueViolation`].
fn map_unique(err: sqlx::Error) -> StoreError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => StoreError::UniqueViolation,
        _ => StoreError::Database(err),
    }
}

/// Store implementation over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub struct PgCredentialTx {
    tx: Transaction<'static, Postgres>,
}

pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn begin_credentials(&self) -> StoreResult<Box<dyn CredentialTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCredentialTx { tx }))
    }

    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_anonymous = false"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, display_name, is_admin, is_anonymous)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.is_admin)
        .bind(user.is_anonymous)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        sqlx::query_as::<_, RefreshToken>(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING {REFRESH_COLUMNS}
            "#
        ))
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool is closed".to_string()));
        }
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialTx for PgCredentialTx {
    async fn find_active_refresh_for_update(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshToken>> {
        // Row lock: a concurrent rotation of the same secret waits here, then
        // sees revoked_at set and finds nothing.
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            r#"
            SELECT {REFRESH_COLUMNS} FROM refresh_tokens
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2
            FOR UPDATE
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(token)
    }

    async fn insert_refresh_token(&mut self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        sqlx::query_as::<_, RefreshToken>(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING {REFRESH_COLUMNS}
            "#
        ))
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_unique)
    }

    async fn mark_refresh_replaced(
        &mut self,
        id: Uuid,
        replaced_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, replaced_by = $3
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(replaced_by)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_user_refresh_tokens(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_user_for_update(&mut self, id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn lock_admin_ids(&mut self) -> StoreResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM users
            WHERE is_admin = true AND is_anonymous = false
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids)
    }

    async fn set_admin(
        &mut self,
        id: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_admin = $2, updated_at = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(is_admin)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn delete_user(&mut self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn begin_catalog(&self) -> StoreResult<Box<dyn CatalogTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCatalogTx { tx }))
    }

    async fn find_perfume(&self, id: &str) -> StoreResult<Option<PerfumeRecord>> {
        let perfume = sqlx::query_as::<_, PerfumeRecord>(&format!(
            "SELECT {PERFUME_COLUMNS} FROM perfumes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(perfume)
    }

    async fn record_stat_event(
        &self,
        day: NaiveDate,
        perfume_id: &str,
        event_type: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stat_events_daily (day, perfume_id, type, count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (day, perfume_id, type)
            DO UPDATE SET count = stat_events_daily.count + 1
            "#,
        )
        .bind(day)
        .bind(perfume_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn find_perfumes(&mut self, ids: &[String]) -> StoreResult<Vec<PerfumeRecord>> {
        let perfumes = sqlx::query_as::<_, PerfumeRecord>(&format!(
            "SELECT {PERFUME_COLUMNS} FROM perfumes WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(perfumes)
    }

    async fn lock_perfume(&mut self, id: &str) -> StoreResult<Option<PerfumeRecord>> {
        let perfume = sqlx::query_as::<_, PerfumeRecord>(&format!(
            "SELECT {PERFUME_COLUMNS} FROM perfumes WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(perfume)
    }

    async fn increment_order_count(&mut self, perfume_id: &str, by: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE perfumes SET order_count = order_count + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(perfume_id)
        .bind(by)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_stock(
        &mut self,
        perfume_id: &str,
        stock: StockLevel,
        in_stock: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE perfumes SET stock_qty = $2, in_stock = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(perfume_id)
        .bind(stock.to_column())
        .bind(in_stock)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (
                user_id, is_anonymous, email, display_name, phone, items,
                total, currency, channel, delivery_method, delivery_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&order.user_id)
        .bind(order.is_anonymous)
        .bind(&order.email)
        .bind(&order.display_name)
        .bind(&order.phone)
        .bind(Json(&order.items))
        .bind(order.total)
        .bind(&order.currency)
        .bind(&order.channel)
        .bind(&order.delivery_method)
        .bind(&order.delivery_address)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(order)
    }

    async fn find_order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(order)
    }

    async fn set_order_fulfilled(&mut self, id: Uuid, fulfilled: bool) -> StoreResult<Order> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET fulfilled = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(fulfilled)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(order)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
