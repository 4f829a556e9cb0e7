//! Access credentials and the refresh token rotation chain.
//!
//! # Access credentials
//!
//! HS256-signed JWTs carrying `{sub, adm, anon, iat, exp}`. They are never
//! stored; validity is signature plus expiry. Every verification failure
//! (bad signature, wrong algorithm, malformed, expired) collapses into
//! `AppError::Unauthenticated`.
//!
//! # Refresh tokens
//!
//! 32 random bytes, hex-encoded, handed to the client once. Only the SHA-256
//! hash is stored. Rotation revokes the presented token and links it to its
//! replacement in one store transaction; concurrent presentations of the same
//! secret yield at most one success.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::{
    refresh_token::{NewRefreshToken, RefreshToken},
    user::Identity,
};
use crate::store::CredentialStore;

/// JWT claims of an access credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    /// Administrator flag
    pub adm: bool,
    /// Guest flag
    pub anon: bool,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// A freshly minted refresh secret together with its stored record.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    /// Raw secret; returned to the client once and never stored
    pub secret: String,
    pub token: RefreshToken,
}

/// Hash a refresh secret for storage and lookup (SHA-256, hex).
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_secret() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Mints and verifies access credentials; manages refresh tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    refresh_ttl: Duration,
    store: Arc<dyn CredentialStore>,
}

impl TokenService {
    pub fn new(secret: &str, refresh_ttl: Duration, store: Arc<dyn CredentialStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock in `verify_access_at`.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            refresh_ttl,
            store,
        }
    }

    /// Sign an access credential for `identity` valid for `ttl`.
    ///
    /// # Errors
    ///
    /// `AppError::Internal` if signing fails.
    pub fn issue_access(&self, identity: &Identity, ttl: Duration) -> Result<String, AppError> {
        self.issue_access_at(identity, ttl, Utc::now())
    }

    pub fn issue_access_at(
        &self,
        identity: &Identity,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = AccessClaims {
            sub: identity.user_id.clone(),
            adm: identity.is_admin,
            anon: identity.is_anonymous,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign access token: {e}")))
    }

    /// Verify an access credential and return the identity it asserts.
    ///
    /// # Errors
    ///
    /// `AppError::Unauthenticated` for any invalid, foreign or expired token.
    pub fn verify_access(&self, token: &str) -> Result<Identity, AppError> {
        self.verify_access_at(token, Utc::now())
    }

    /// Verify against an explicit clock. Tokens are invalid at and after `exp`.
    pub fn verify_access_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AppError> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AppError::Unauthenticated)?;
        let claims = data.claims;

        if now.timestamp() >= claims.exp || claims.sub.is_empty() {
            return Err(AppError::Unauthenticated);
        }

        Ok(Identity {
            user_id: claims.sub,
            is_admin: claims.adm,
            is_anonymous: claims.anon,
        })
    }

    /// Start a new rotation chain for `user_id`.
    ///
    /// # Errors
    ///
    /// `AppError::Store` if the token cannot be persisted.
    pub async fn create_refresh(&self, user_id: &str) -> Result<IssuedRefresh, AppError> {
        let secret = generate_secret();
        let token = self
            .store
            .insert_refresh_token(NewRefreshToken {
                user_id: user_id.to_string(),
                token_hash: hash_secret(&secret),
                expires_at: Utc::now() + self.refresh_ttl,
            })
            .await?;

        Ok(IssuedRefresh { secret, token })
    }

    /// Exchange a refresh secret for the next link in its chain.
    ///
    /// # Process
    ///
    /// 1. Lock the active token matching the secret's hash
    /// 2. Insert the replacement token
    /// 3. Revoke the presented token, linking it to the replacement
    /// 4. Commit; any failure rolls back all three steps
    ///
    /// # Errors
    ///
    /// - `Unauthenticated`: unknown, revoked or expired secret, or lost a race
    /// - `Store`: store failure
    pub async fn rotate_refresh(&self, secret: &str) -> Result<IssuedRefresh, AppError> {
        if secret.is_empty() {
            return Err(AppError::Unauthenticated);
        }

        let now = Utc::now();
        let mut tx = self.store.begin_credentials().await?;

        let current = tx
            .find_active_refresh_for_update(&hash_secret(secret), now)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let next_secret = generate_secret();
        let next = tx
            .insert_refresh_token(NewRefreshToken {
                user_id: current.user_id.clone(),
                token_hash: hash_secret(&next_secret),
                expires_at: now + self.refresh_ttl,
            })
            .await?;

        if !tx.mark_refresh_replaced(current.id, next.id, now).await? {
            // Someone else rotated it first; dropping `tx` discards `next`.
            return Err(AppError::Unauthenticated);
        }

        tx.commit().await?;

        tracing::debug!(user_id = %next.user_id, token_id = %next.id, "refresh token rotated");

        Ok(IssuedRefresh {
            secret: next_secret,
            token: next,
        })
    }

    /// Revoke a refresh secret. Idempotent: unknown or already revoked is fine.
    ///
    /// # Errors
    ///
    /// `AppError::Store` on store failure only.
    pub async fn revoke(&self, secret: &str) -> Result<(), AppError> {
        if secret.is_empty() {
            return Ok(());
        }
        self.store
            .revoke_refresh_token(&hash_secret(secret), Utc::now())
            .await?;
        Ok(())
    }
}
