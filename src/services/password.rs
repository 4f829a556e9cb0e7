//! Argon2id password hashing.
//!
//! Hashing and verification are CPU-bound, so both run on the blocking pool.

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AppError;

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Validate password meets requirements.
///
/// # Errors
///
/// `AppError::InvalidInput` when shorter than [`MIN_PASSWORD_LENGTH`].
pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Salted password hasher with a precomputed dummy hash.
///
/// The dummy hash is verified against when a login names an unknown email, so
/// that path costs the same as a wrong password.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    dummy_hash: Arc<str>,
}

impl PasswordService {
    /// Argon2id with the library's default cost parameters.
    ///
    /// # Errors
    ///
    /// Fails only if the dummy hash cannot be computed.
    pub fn new() -> Result<Self, AppError> {
        Self::with_params(Params::default())
    }

    /// Argon2id with explicit cost parameters (tests use cheap ones).
    pub fn with_params(params: Params) -> Result<Self, AppError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, &hex::encode(rand::random::<[u8; 16]>()))?;
        Ok(Self {
            argon2,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash a password into a PHC string.
    ///
    /// # Errors
    ///
    /// `AppError::Internal` if hashing fails or the blocking task panics.
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hash_with(&argon2, &password))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
    }

    /// Verify `password` against `hash`, or against the dummy hash when `None`.
    ///
    /// Returns `false` for a `None` hash even if the dummy happens to match.
    pub async fn verify(&self, password: &str, hash: Option<&str>) -> Result<bool, AppError> {
        let known = hash.is_some();
        let hash = hash.map_or_else(|| self.dummy_hash.to_string(), str::to_string);
        let argon2 = self.argon2.clone();
        let password = password.to_string();

        let matched = tokio::task::spawn_blocking(move || {
            PasswordHash::new(&hash)
                .map(|parsed| argon2.verify_password(password.as_bytes(), &parsed).is_ok())
                .unwrap_or(false)
        })
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))?;

        Ok(known && matched)
    }
}

fn hash_with(argon2: &Argon2<'static>, password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}
