//! Bearer credential authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the access credential from the Authorization header
//! 2. Verify its signature and expiry
//! 3. Inject the caller's `Identity` into the request
//! 4. Reject unauthenticated requests with HTTP 401 (and non-admins on admin
//!    routes with HTTP 403)

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, models::user::Identity, state::AppState};

/// Extract `<token>` from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthenticated)?;
    state.sessions.tokens().verify_access(token)
}

/// Require a valid access credential.
///
/// # Flow
///
/// 1. Read `Authorization: Bearer <token>`
/// 2. Verify the token (HS256, unexpired)
/// 3. On success insert `Identity` into request extensions and call the next handler
/// 4. Otherwise return 401
///
/// Handlers extract it with `Extension<Identity>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = authenticate(&state, request.headers())?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Require a valid access credential that carries the admin flag.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = authenticate(&state, request.headers())?;
    if !identity.is_admin {
        tracing::warn!(user_id = %identity.user_id, path = %request.uri().path(), "admin route denied");
        return Err(AppError::Forbidden("admin only".to_string()));
    }
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
