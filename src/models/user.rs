//! User data models and auth request/response types.
//!
//! This module defines:
//! - `User`: Database entity for registered accounts and persisted guests
//! - `Identity`: the verified claims carried by an access credential
//! - Request bodies for register/login and the `AuthResponse` returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display label used for guest identities.
pub const GUEST_DISPLAY_NAME: &str = "Гость";

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. A user is either:
/// - a registered account (`email` and `password_hash` present), or
/// - a guest (`is_anonymous = true`, no credentials)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// UUID string for registered users, `guest_<hex>` for guests
    pub id: String,

    /// Trimmed, lowercased email; unique among users that have one
    pub email: Option<String>,

    /// Argon2 PHC string; never serialized
    pub password_hash: Option<String>,

    pub display_name: Option<String>,

    pub is_admin: bool,

    pub is_anonymous: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// The identity an access credential for this user asserts.
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id.clone(),
            is_admin: self.is_admin,
            is_anonymous: self.is_anonymous,
        }
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub is_anonymous: bool,
}

/// Verified identity of the caller.
///
/// Produced by the token service from an access credential and passed
/// explicitly to every operation that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub is_admin: bool,
    pub is_anonymous: bool,
}

/// Request body for `POST /api/auth/register`.
///
/// ```json
/// { "email": "alice@example.com", "password": "secret1", "displayName": "Alice" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub display_name: String,
}

/// Request body for `POST /api/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,
}

/// Public profile returned to clients. Never includes the password hash.
///
/// ```json
/// {
///   "id": "3f1c...",
///   "email": "alice@example.com",
///   "displayName": "Alice",
///   "isAdmin": false,
///   "isAnonymous": false,
///   "createdAt": "2025-12-20T10:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    pub is_admin: bool,

    pub is_anonymous: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserResponse {
    /// Profile synthesized for a guest credential without a store lookup.
    pub fn guest(user_id: &str) -> Self {
        Self {
            id: user_id.to_string(),
            email: None,
            display_name: Some(GUEST_DISPLAY_NAME.to_string()),
            is_admin: false,
            is_anonymous: true,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Convert database User to API UserResponse (drops the password hash).
impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            is_admin: user.is_admin,
            is_anonymous: user.is_anonymous,
            created_at: Some(user.created_at),
            updated_at: user.updated_at,
        }
    }
}

/// Body returned by register, login, guest and refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Access credential for `Authorization: Bearer <token>`
    pub token: String,

    pub user: UserResponse,
}

/// Request body for `PUT /api/users/{id}/admin`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminRequest {
    pub is_admin: bool,
}
