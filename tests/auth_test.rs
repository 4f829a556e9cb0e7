//! Session endpoint integration tests.

mod common;

use common::{Registered, from_client, guest_token, register, spawn_app, spawn_app_with, test_config, with_token};
use serde_json::{Value, json};
use tower_cookies::{Cookie, cookie::SameSite};

#[tokio::test]
async fn register_sets_refresh_cookie_and_returns_profile() {
    let app = spawn_app();

    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "email": "  Alice@Example.COM ",
            "password": "secret1",
            "displayName": "Alice",
        }))
        .await;

    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["displayName"], "Alice");
    assert_eq!(body["user"]["isAdmin"], false);
    assert_eq!(body["user"]["isAnonymous"], false);

    let cookie = response.cookie("refresh_token");
    assert_eq!(cookie.value().len(), 64);
    assert_eq!(cookie.path(), Some("/api/auth"));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
}

#[tokio::test]
async fn duplicate_email_conflicts_case_insensitively() {
    let app = spawn_app();
    register(&app, "bob@example.com").await;

    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({ "email": "BOB@example.com", "password": "another1" }))
        .await;

    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn register_rejects_bad_email_and_short_password() {
    let app = spawn_app();

    let bad_email = app
        .server
        .post("/api/auth/register")
        .json(&json!({ "email": "no-at-sign", "password": "secret1" }))
        .await;
    assert_eq!(bad_email.status_code(), 400);

    let short_password = app
        .server
        .post("/api/auth/register")
        .json(&json!({ "email": "carol@example.com", "password": "12345" }))
        .await;
    assert_eq!(short_password.status_code(), 400);
    let body: Value = short_password.json();
    assert_eq!(body["error"]["code"], "invalid_input");
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = spawn_app();
    register(&app, "dave@example.com").await;

    let wrong_password = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "dave@example.com", "password": "wrong-one" }))
        .await;
    let unknown_email = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "nobody@example.com", "password": "secret1" }))
        .await;

    assert_eq!(wrong_password.status_code(), 401);
    assert_eq!(unknown_email.status_code(), 401);
    assert_eq!(wrong_password.text(), unknown_email.text());
}

#[tokio::test]
async fn login_then_me_returns_profile() {
    let app = spawn_app();
    let registered = register(&app, "erin@example.com").await;

    let login = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "ERIN@example.com", "password": "secret1" }))
        .await;
    assert_eq!(login.status_code(), 200);
    assert!(login.maybe_cookie("refresh_token").is_some());
    let token = login.json::<Value>()["token"].as_str().unwrap().to_string();

    let me = with_token(app.server.get("/api/auth/me"), &token).await;
    assert_eq!(me.status_code(), 200);
    let body: Value = me.json();
    assert_eq!(body["id"], registered.user_id.as_str());
    assert_eq!(body["email"], "erin@example.com");
}

#[tokio::test]
async fn me_requires_a_valid_bearer_token() {
    let app = spawn_app();

    let missing = app.server.get("/api/auth/me").await;
    assert_eq!(missing.status_code(), 401);

    let garbage = with_token(app.server.get("/api/auth/me"), "not-a-jwt").await;
    assert_eq!(garbage.status_code(), 401);
    let body: Value = garbage.json();
    assert_eq!(body["error"]["code"], "unauthenticated");
}

#[tokio::test]
async fn guest_session_has_no_refresh_cookie() {
    let app = spawn_app();

    let response = app.server.post("/api/auth/guest").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.maybe_cookie("refresh_token").is_none());

    let body: Value = response.json();
    assert!(body["user"]["id"].as_str().unwrap().starts_with("guest_"));
    assert_eq!(body["user"]["isAnonymous"], true);

    let token = body["token"].as_str().unwrap();
    let me = with_token(app.server.get("/api/auth/me"), token).await;
    let profile: Value = me.json();
    assert_eq!(profile["isAnonymous"], true);
    assert_eq!(profile["displayName"], "Гость");
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let app = spawn_app();
    let Registered { refresh, user_id, .. } = register(&app, "frank@example.com").await;

    let first = app
        .server
        .post("/api/auth/refresh")
        .add_cookie(Cookie::new("refresh_token", refresh.clone()))
        .await;
    assert_eq!(first.status_code(), 200);
    let rotated = first.cookie("refresh_token").value().to_string();
    assert_ne!(rotated, refresh);
    let body: Value = first.json();
    assert_eq!(body["user"]["id"], user_id.as_str());

    let replay = app
        .server
        .post("/api/auth/refresh")
        .add_cookie(Cookie::new("refresh_token", refresh))
        .await;
    assert_eq!(replay.status_code(), 401);

    let second = app
        .server
        .post("/api/auth/refresh")
        .add_cookie(Cookie::new("refresh_token", rotated))
        .await;
    assert_eq!(second.status_code(), 200);
}

#[tokio::test]
async fn refresh_without_cookie_is_unauthenticated() {
    let app = spawn_app();

    let response = app.server.post("/api/auth/refresh").await;

    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn logout_revokes_and_clears_cookie() {
    let app = spawn_app();
    let registered = register(&app, "grace@example.com").await;

    let logout = app
        .server
        .post("/api/auth/logout")
        .add_cookie(Cookie::new("refresh_token", registered.refresh.clone()))
        .await;
    assert_eq!(logout.status_code(), 200);
    assert_eq!(logout.json::<Value>(), json!({ "status": "ok" }));
    assert_eq!(logout.cookie("refresh_token").value(), "");

    let refresh = app
        .server
        .post("/api/auth/refresh")
        .add_cookie(Cookie::new("refresh_token", registered.refresh))
        .await;
    assert_eq!(refresh.status_code(), 401);

    let anonymous_logout = app.server.post("/api/auth/logout").await;
    assert_eq!(anonymous_logout.status_code(), 200);
}

#[tokio::test]
async fn auth_endpoints_are_rate_limited_per_client() {
    let mut config = test_config();
    config.auth_rate_limit_per_minute = 2;
    let app = spawn_app_with(config);

    for _ in 0..2 {
        let response = from_client(app.server.post("/api/auth/guest"), "203.0.113.7").await;
        assert_eq!(response.status_code(), 200);
    }

    let limited = from_client(app.server.post("/api/auth/guest"), "203.0.113.7").await;
    assert_eq!(limited.status_code(), 429);
    let body: Value = limited.json();
    assert_eq!(body["error"]["code"], "rate_limited");

    let other_client = from_client(app.server.post("/api/auth/guest"), "198.51.100.1").await;
    assert_eq!(other_client.status_code(), 200);
}

#[tokio::test]
async fn guest_token_is_not_admin() {
    let app = spawn_app();
    let token = guest_token(&app).await;

    let response = with_token(app.server.delete("/api/users/someone"), &token).await;

    assert_eq!(response.status_code(), 403);
}
