//! In-memory store implementation.
//!
//! All data lives behind one async mutex. A transaction holds the lock for its
//! whole lifetime and works on a copy of the state; `commit` writes the copy
//! back, dropping the handle discards it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{CatalogStore, CatalogTx, CredentialStore, CredentialTx, StoreError, StoreResult};
use crate::models::{
    order::{NewOrder, Order},
    perfume::{PerfumeRecord, StockLevel},
    refresh_token::{NewRefreshToken, RefreshToken},
    user::{NewUser, User},
};

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<String, User>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    perfumes: HashMap<String, PerfumeRecord>,
    orders: HashMap<Uuid, Order>,
    stats: HashMap<(NaiveDate, String, String), i64>,
}

impl State {
    fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        if self.users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation);
        }
        if let Some(email) = &user.email {
            let taken = self
                .users
                .values()
                .any(|u| u.email.as_deref() == Some(email.as_str()));
            if taken {
                return Err(StoreError::UniqueViolation);
            }
        }

        let user = User {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            display_name: user.display_name,
            is_admin: user.is_admin,
            is_anonymous: user.is_anonymous,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn insert_refresh_token(&mut self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        if !self.users.contains_key(&token.user_id) {
            return Err(StoreError::Unavailable(format!(
                "refresh token references unknown user {}",
                token.user_id
            )));
        }
        if self
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(StoreError::UniqueViolation);
        }

        let token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            revoked_at: None,
            replaced_by: None,
            created_at: Utc::now(),
        };
        self.refresh_tokens.insert(token.id, token.clone());
        Ok(token)
    }
}

/// In-process store. Cloning shares the underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog row.
    pub async fn put_perfume(&self, perfume: PerfumeRecord) {
        let mut state = self.state.lock().await;
        state.perfumes.insert(perfume.id.clone(), perfume);
    }

    /// Insert a user directly, bypassing registration.
    pub async fn put_user(&self, user: NewUser) -> StoreResult<User> {
        self.state.lock().await.insert_user(user)
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn order(&self, id: Uuid) -> Option<Order> {
        self.state.lock().await.orders.get(&id).cloned()
    }

    pub async fn refresh_tokens_of(&self, user_id: &str) -> Vec<RefreshToken> {
        let state = self.state.lock().await;
        let mut tokens: Vec<RefreshToken> = state
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        tokens
    }

    pub async fn stat_count(&self, day: NaiveDate, perfume_id: &str, event_type: &str) -> i64 {
        let state = self.state.lock().await;
        state
            .stats
            .get(&(day, perfume_id.to_string(), event_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    async fn begin(&self) -> MemoryTx {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        MemoryTx { guard, working }
    }
}

/// Transaction handle: exclusive lock plus a working copy.
pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

impl MemoryTx {
    fn commit_inner(mut self) {
        *self.guard = std::mem::take(&mut self.working);
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn begin_credentials(&self) -> StoreResult<Box<dyn CredentialTx>> {
        Ok(Box::new(self.begin().await))
    }

    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| !u.is_anonymous && u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.state.lock().await.insert_user(user)
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        self.state.lock().await.insert_refresh_token(token)
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let token = state
            .refresh_tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && t.revoked_at.is_none());

        Ok(match token {
            Some(token) => {
                token.revoked_at = Some(now);
                true
            }
            None => false,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CredentialTx for MemoryTx {
    async fn find_active_refresh_for_update(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshToken>> {
        Ok(self
            .working
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.is_active_at(now))
            .cloned())
    }

    async fn insert_refresh_token(&mut self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        self.working.insert_refresh_token(token)
    }

    async fn mark_refresh_replaced(
        &mut self,
        id: Uuid,
        replaced_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.working.refresh_tokens.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(now);
                token.replaced_by = Some(replaced_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_refresh_tokens(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut revoked = 0;
        for token in self.working.refresh_tokens.values_mut() {
            if token.user_id == user_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find_user_for_update(&mut self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(id).cloned())
    }

    async fn lock_admin_ids(&mut self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .working
            .users
            .values()
            .filter(|u| u.is_admin && !u.is_anonymous)
            .map(|u| u.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn set_admin(
        &mut self,
        id: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let user = self
            .working
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))?;
        user.is_admin = is_admin;
        user.updated_at = Some(now);
        Ok(user.clone())
    }

    async fn delete_user(&mut self, id: &str) -> StoreResult<bool> {
        let removed = self.working.users.remove(id).is_some();
        if removed {
            // ON DELETE CASCADE
            self.working.refresh_tokens.retain(|_, t| t.user_id != id);
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        (*self).commit_inner();
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn begin_catalog(&self) -> StoreResult<Box<dyn CatalogTx>> {
        Ok(Box::new(self.begin().await))
    }

    async fn find_perfume(&self, id: &str) -> StoreResult<Option<PerfumeRecord>> {
        Ok(self.state.lock().await.perfumes.get(id).cloned())
    }

    async fn record_stat_event(
        &self,
        day: NaiveDate,
        perfume_id: &str,
        event_type: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        *state
            .stats
            .entry((day, perfume_id.to_string(), event_type.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for MemoryTx {
    async fn find_perfumes(&mut self, ids: &[String]) -> StoreResult<Vec<PerfumeRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.perfumes.get(id).cloned())
            .collect())
    }

    async fn lock_perfume(&mut self, id: &str) -> StoreResult<Option<PerfumeRecord>> {
        Ok(self.working.perfumes.get(id).cloned())
    }

    async fn increment_order_count(&mut self, perfume_id: &str, by: i64) -> StoreResult<()> {
        if let Some(perfume) = self.working.perfumes.get_mut(perfume_id) {
            perfume.order_count += by;
        }
        Ok(())
    }

    async fn update_stock(
        &mut self,
        perfume_id: &str,
        stock: StockLevel,
        in_stock: bool,
    ) -> StoreResult<()> {
        if let Some(perfume) = self.working.perfumes.get_mut(perfume_id) {
            perfume.stock_qty = stock.to_column();
            perfume.in_stock = in_stock;
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            is_anonymous: order.is_anonymous,
            email: order.email,
            display_name: order.display_name,
            phone: order.phone,
            items: Json(order.items),
            total: order.total,
            currency: order.currency,
            channel: order.channel,
            delivery_method: order.delivery_method,
            delivery_address: order.delivery_address,
            fulfilled: false,
            created_at: Utc::now(),
        };
        self.working.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn set_order_fulfilled(&mut self, id: Uuid, fulfilled: bool) -> StoreResult<Order> {
        let order = self
            .working
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))?;
        order.fulfilled = fulfilled;
        Ok(order.clone())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        (*self).commit_inner();
        Ok(())
    }
}
