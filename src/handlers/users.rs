//! User administration handlers (admin only).
//!
//! - PUT /api/users/{id}/admin - Promote or demote
//! - DELETE /api/users/{id} - Delete, revoking the user's refresh tokens

use axum::{
    Extension,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::{
    error::AppError,
    extract::Json,
    models::user::{Identity, SetAdminRequest, UserResponse},
    state::AppState,
};

/// Promote or demote a user.
///
/// # Response
///
/// - **Success (200 OK)**: the updated profile
/// - **Error (403)**: demoting self, or demoting the last admin
/// - **Error (404)**: unknown user
pub async fn set_admin(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<String>,
    Json(request): Json<SetAdminRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .sessions
        .set_admin(&actor, id.trim(), request.is_admin)
        .await?;
    Ok(Json(user))
}

/// Delete a user.
///
/// # Response
///
/// - **Success (200 OK)**: `{"status": "ok"}`
/// - **Error (403)**: deleting self, or deleting the last admin
/// - **Error (404)**: unknown user
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.sessions.delete_user(&actor, id.trim()).await?;
    Ok(Json(json!({ "status": "ok" })))
}
