//! Shared application state injected into handlers and middleware.

use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::services::{
    order_service::OrderWorkflow,
    password::PasswordService,
    rate_limiter::RateLimitPolicy,
    session_service::{SessionManager, SessionSettings},
    stats_service::StatsRecorder,
    token_service::TokenService,
};
use crate::store::{CatalogStore, CredentialStore};

/// Attributes of the refresh cookie.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub orders: OrderWorkflow,
    pub stats: StatsRecorder,
    pub credentials: Arc<dyn CredentialStore>,
    pub cookies: CookieSettings,
}

impl AppState {
    /// Wire every service over one store implementing both store traits.
    pub fn new<S>(store: S, config: &Config, passwords: PasswordService) -> Self
    where
        S: CredentialStore + CatalogStore + Clone + 'static,
    {
        let credentials: Arc<dyn CredentialStore> = Arc::new(store.clone());
        let catalog: Arc<dyn CatalogStore> = Arc::new(store);

        let tokens = TokenService::new(
            &config.jwt_secret,
            Duration::days(config.refresh_token_ttl_days),
            Arc::clone(&credentials),
        );

        let sessions = SessionManager::new(
            Arc::clone(&credentials),
            tokens,
            passwords,
            RateLimitPolicy::per_minute("auth", config.auth_rate_limit_per_minute),
            SessionSettings {
                access_ttl: Duration::seconds(config.access_token_ttl_secs),
                guest_ttl: Duration::seconds(config.guest_token_ttl_secs),
            },
        );

        let orders = OrderWorkflow::new(
            Arc::clone(&catalog),
            Arc::clone(&credentials),
            config.default_currency.clone(),
        );

        let stats = StatsRecorder::new(
            catalog,
            RateLimitPolicy::per_minute("stats", config.stats_rate_limit_per_minute),
        );

        Self {
            sessions,
            orders,
            stats,
            credentials,
            cookies: CookieSettings {
                secure: config.cookie_secure,
            },
        }
    }
}
