//! Common test utilities for HTTP integration tests.

#![allow(dead_code)]

use argon2::Params;
use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestRequest, TestServer};
use chrono::{Duration, Utc};
use parfum_commerce_server::{
    app::build_router,
    config::Config,
    models::{order::DEFAULT_CURRENCY, perfume::PerfumeRecord, user::Identity},
    services::password::PasswordService,
    state::AppState,
    store::{CredentialStore, MemoryStore},
};
use rust_decimal::Decimal;
use serde_json::{Value, json};

pub const JWT_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub server: TestServer,
    pub store: MemoryStore,
    pub state: AppState,
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        server_port: 0,
        cookie_secure: false,
        cors_origins: vec!["http://localhost:3000".to_string()],
        access_token_ttl_secs: 900,
        guest_token_ttl_secs: 43_200,
        refresh_token_ttl_days: 30,
        auth_rate_limit_per_minute: 1_000,
        stats_rate_limit_per_minute: 1_000,
        request_timeout_secs: 30,
        default_currency: DEFAULT_CURRENCY.to_string(),
        db_max_connections: 1,
    }
}

/// Create a test server over a fresh in-memory store.
pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config())
}

pub fn spawn_app_with(config: Config) -> TestApp {
    let store = MemoryStore::new();
    let passwords = PasswordService::with_params(Params::new(8, 1, 1, None).unwrap()).unwrap();
    let state = AppState::new(store.clone(), &config, passwords);
    let router = build_router(state.clone(), &config);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        store,
        state,
    }
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

pub fn with_token(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(header::AUTHORIZATION, bearer(token))
}

pub fn from_client(request: TestRequest, ip: &'static str) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_static(ip),
    )
}

/// A registered account as seen by the client.
pub struct Registered {
    pub user_id: String,
    pub token: String,
    pub refresh: String,
}

/// Register through the API and capture the access token and refresh cookie.
pub async fn register(app: &TestApp, email: &str) -> Registered {
    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "email": email,
            "password": "secret1",
            "displayName": "Tester",
        }))
        .await;
    assert_eq!(response.status_code(), 201);

    let body: Value = response.json();
    Registered {
        user_id: body["user"]["id"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
        refresh: response.cookie("refresh_token").value().to_string(),
    }
}

/// Start a guest session and return its access token.
pub async fn guest_token(app: &TestApp) -> String {
    let response = app.server.post("/api/auth/guest").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    body["token"].as_str().unwrap().to_string()
}

/// Flip a stored user's admin flag and return a token carrying it.
pub async fn promote(app: &TestApp, user_id: &str) -> String {
    let mut tx = app.store.begin_credentials().await.unwrap();
    tx.set_admin(user_id, true, Utc::now()).await.unwrap();
    tx.commit().await.unwrap();

    app.state
        .sessions
        .tokens()
        .issue_access(
            &Identity {
                user_id: user_id.to_string(),
                is_admin: true,
                is_anonymous: false,
            },
            Duration::minutes(15),
        )
        .unwrap()
}

pub async fn seed_perfume(app: &TestApp, id: &str, price: i64, currency: &str, stock: Option<i32>) {
    app.store
        .put_perfume(PerfumeRecord {
            id: id.to_string(),
            price: Some(Decimal::from(price)),
            base_price: None,
            currency: currency.to_string(),
            stock_qty: stock,
            in_stock: true,
            order_count: 0,
        })
        .await;
}
