//! Refresh token model.
//!
//! Refresh tokens are stored as SHA-256 hashes of the opaque secret handed to
//! the client. Each row is one link in a rotation chain:
//!
//! ```text
//! Active --rotate--> Revoked (replaced_by = next link)
//! Active --logout--> Revoked (replaced_by = NULL)
//! ```
//!
//! Expiry is derived from `expires_at`; it is never written as a state change.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a refresh token record from the database.
///
/// # Database Table
///
/// Maps to the `refresh_tokens` table with a unique index on `token_hash`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,

    pub user_id: String,

    /// SHA-256 hash of the raw secret (64 hex characters)
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,

    /// Set once; a revoked token never authenticates again
    pub revoked_at: Option<DateTime<Utc>>,

    /// Token that superseded this one during rotation
    pub replaced_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Whether this token may still be exchanged at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Fields needed to insert a refresh token.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}
