//! Authentication HTTP handlers.
//!
//! This module implements the session endpoints:
//! - POST /api/auth/register - Create an account and open a session
//! - POST /api/auth/login - Open a session with email and password
//! - POST /api/auth/guest - Issue a guest identity
//! - POST /api/auth/refresh - Rotate the refresh cookie, issue a new access credential
//! - POST /api/auth/logout - Revoke the refresh cookie and clear it
//! - GET /api/auth/me - Profile of the caller
//!
//! The access credential travels in the JSON body; the refresh secret only
//! ever travels in the `refresh_token` cookie.

use axum::{Extension, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite, time::Duration as CookieDuration, time::OffsetDateTime},
};

use crate::{
    error::AppError,
    extract::Json,
    middleware::client_ip::ClientId,
    models::user::{AuthResponse, Identity, LoginRequest, RegisterRequest, UserResponse},
    services::{session_service::Session, token_service::IssuedRefresh},
    state::{AppState, CookieSettings},
};

/// Name of the cookie carrying the refresh secret.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Path the refresh cookie is scoped to.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

fn set_refresh_cookie(cookies: &Cookies, settings: CookieSettings, refresh: &IssuedRefresh) {
    let mut cookie = Cookie::build((REFRESH_COOKIE, refresh.secret.clone()))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
        .build();
    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(refresh.token.expires_at.timestamp()) {
        cookie.set_expires(expires);
    }
    cookies.add(cookie);
}

fn clear_refresh_cookie(cookies: &Cookies, settings: CookieSettings) {
    let cookie = Cookie::build((REFRESH_COOKIE, ""))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
        .max_age(CookieDuration::ZERO)
        .build();
    cookies.add(cookie);
}

fn refresh_secret(cookies: &Cookies) -> Option<String> {
    cookies
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Set the refresh cookie (when the session has one) and build the body.
fn respond(cookies: &Cookies, settings: CookieSettings, session: Session) -> AuthResponse {
    if let Some(refresh) = &session.refresh {
        set_refresh_cookie(cookies, settings, refresh);
    }
    AuthResponse {
        token: session.access_token,
        user: session.user,
    }
}

/// Register a new account.
///
/// # Endpoint
///
/// `POST /api/auth/register`
///
/// # Request Body
///
/// ```json
/// { "email": "alice@example.com", "password": "secret1", "displayName": "Alice" }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: `{ "token": "...", "user": { ... } }` plus the refresh cookie
/// - **Error (400)**: malformed email or password shorter than 6 characters
/// - **Error (409)**: email already registered
/// - **Error (429)**: too many auth requests from this client
pub async fn register(
    State(state): State<AppState>,
    client: ClientId,
    cookies: Cookies,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let session = state.sessions.register(client.as_str(), request).await?;
    Ok((
        StatusCode::CREATED,
        Json(respond(&cookies, state.cookies, session)),
    ))
}

/// Log in with email and password.
///
/// # Response
///
/// - **Success (200 OK)**: `{ "token": "...", "user": { ... } }` plus the refresh cookie
/// - **Error (401)**: `invalid_credentials`, same for unknown email and wrong password
pub async fn login(
    State(state): State<AppState>,
    client: ClientId,
    cookies: Cookies,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = state.sessions.login(client.as_str(), request).await?;
    Ok(Json(respond(&cookies, state.cookies, session)))
}

/// Issue a guest identity. No refresh cookie is set.
pub async fn guest(
    State(state): State<AppState>,
    client: ClientId,
    cookies: Cookies,
) -> Result<Json<AuthResponse>, AppError> {
    let session = state.sessions.guest(client.as_str()).await?;
    Ok(Json(respond(&cookies, state.cookies, session)))
}

/// Exchange the refresh cookie for a new access credential and a rotated cookie.
///
/// Every failure is 401 `unauthenticated`.
pub async fn refresh(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<AuthResponse>, AppError> {
    let secret = refresh_secret(&cookies);
    let session = state.sessions.refresh(secret.as_deref()).await?;
    Ok(Json(respond(&cookies, state.cookies, session)))
}

/// Revoke the presented refresh secret (best effort) and clear the cookie.
///
/// Always `200 {"status": "ok"}`.
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Json<Value> {
    let secret = refresh_secret(&cookies);
    state.sessions.logout(secret.as_deref()).await;
    clear_refresh_cookie(&cookies, state.cookies);
    Json(json!({ "status": "ok" }))
}

/// Profile of the authenticated caller.
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserResponse>, AppError> {
    let profile = state.sessions.me(&identity).await?;
    Ok(Json(profile))
}
