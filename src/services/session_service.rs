//! Session lifecycle and account administration.
//!
//! This service handles:
//! - Registration, login and guest bootstrap (all rate limited per client)
//! - Refresh rotation and logout
//! - Promotion/demotion and deletion of users, guarded so that at least one
//!   non-anonymous administrator always remains

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::AppError;
use crate::models::{
    email::EmailAddress,
    user::{
        GUEST_DISPLAY_NAME, Identity, LoginRequest, NewUser, RegisterRequest, User, UserResponse,
    },
};
use crate::services::{
    password::{PasswordService, validate_password},
    rate_limiter::RateLimitPolicy,
    token_service::{IssuedRefresh, TokenService},
};
use crate::store::{CredentialStore, StoreError};

/// Lifetimes of issued access credentials.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub access_ttl: Duration,
    pub guest_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            guest_ttl: Duration::hours(12),
        }
    }
}

/// Outcome of a successful register/login/guest/refresh.
#[derive(Debug)]
pub struct Session {
    pub access_token: String,

    /// Absent for guests, which have no refresh chain
    pub refresh: Option<IssuedRefresh>,

    pub user: UserResponse,
}

fn new_guest_id() -> String {
    format!("guest_{}", hex::encode(rand::random::<[u8; 16]>()))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    passwords: PasswordService,
    auth_limit: RateLimitPolicy,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenService,
        passwords: PasswordService,
        auth_limit: RateLimitPolicy,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            tokens,
            passwords,
            auth_limit,
            settings,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create a registered account and open a session for it.
    ///
    /// # Process
    ///
    /// 1. Check the client's auth budget
    /// 2. Normalize and validate email, validate password length
    /// 3. Hash the password and insert the user
    /// 4. Issue an access credential and start a refresh chain
    ///
    /// # Errors
    ///
    /// - `RateLimited`: client exceeded the auth budget
    /// - `InvalidInput`: malformed email or short password
    /// - `Conflict`: email already registered
    pub async fn register(
        &self,
        client_id: &str,
        request: RegisterRequest,
    ) -> Result<Session, AppError> {
        self.auth_limit.check(client_id)?;

        let email = EmailAddress::parse(&request.email)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        validate_password(&request.password)?;

        let password_hash = self.passwords.hash(&request.password).await?;

        let user = self
            .store
            .insert_user(NewUser {
                id: uuid::Uuid::new_v4().to_string(),
                email: Some(email.into_inner()),
                password_hash: Some(password_hash),
                display_name: non_empty(&request.display_name),
                is_admin: false,
                is_anonymous: false,
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation => {
                    AppError::Conflict("email already exists".to_string())
                }
                other => AppError::Store(other),
            })?;

        tracing::info!(user_id = %user.id, "user registered");

        self.open_session(user).await
    }

    /// Authenticate with email and password.
    ///
    /// Unknown email and wrong password yield the same `InvalidCredentials`
    /// and cost the same: an unknown email is verified against a dummy hash.
    pub async fn login(&self, client_id: &str, request: LoginRequest) -> Result<Session, AppError> {
        self.auth_limit.check(client_id)?;

        let email = request.email.trim().to_lowercase();
        if email.is_empty() || request.password.is_empty() {
            return Err(AppError::InvalidInput("missing credentials".to_string()));
        }

        let user = self.store.find_user_by_email(&email).await?;
        let stored_hash = user.as_ref().and_then(|u| u.password_hash.as_deref());

        let verified = self.passwords.verify(&request.password, stored_hash).await?;

        let user = match user {
            Some(user) if verified => user,
            _ => {
                tracing::info!("login rejected");
                return Err(AppError::InvalidCredentials);
            }
        };

        tracing::info!(user_id = %user.id, "user logged in");

        self.open_session(user).await
    }

    /// Create a persisted anonymous identity with a long-lived access credential.
    pub async fn guest(&self, client_id: &str) -> Result<Session, AppError> {
        self.auth_limit.check(client_id)?;

        let user = self
            .store
            .insert_user(NewUser {
                id: new_guest_id(),
                email: None,
                password_hash: None,
                display_name: Some(GUEST_DISPLAY_NAME.to_string()),
                is_admin: false,
                is_anonymous: true,
            })
            .await?;

        let access_token = self
            .tokens
            .issue_access(&user.identity(), self.settings.guest_ttl)?;

        tracing::info!(user_id = %user.id, "guest identity issued");

        Ok(Session {
            access_token,
            refresh: None,
            user: user.into(),
        })
    }

    /// Rotate the presented refresh secret and issue a fresh access credential.
    ///
    /// Admin and guest flags are re-read from the store, so a demotion takes
    /// effect at the next refresh.
    ///
    /// # Errors
    ///
    /// Every failure, including store failures, is `Unauthenticated`.
    pub async fn refresh(&self, secret: Option<&str>) -> Result<Session, AppError> {
        let secret = secret.ok_or(AppError::Unauthenticated)?;

        let issued = self.tokens.rotate_refresh(secret).await.map_err(|e| {
            if !matches!(e, AppError::Unauthenticated) {
                tracing::error!(error = %e, "refresh rotation failed");
            }
            tracing::info!("refresh rejected");
            AppError::Unauthenticated
        })?;

        let user = self
            .store
            .find_user_by_id(&issued.token.user_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "cannot load user for refresh");
                AppError::Unauthenticated
            })?
            .ok_or(AppError::Unauthenticated)?;

        let access_token = self
            .tokens
            .issue_access(&user.identity(), self.settings.access_ttl)?;

        tracing::info!(user_id = %user.id, "session refreshed");

        Ok(Session {
            access_token,
            refresh: Some(issued),
            user: user.into(),
        })
    }

    /// Best-effort revocation of the presented refresh secret. Never fails.
    pub async fn logout(&self, secret: Option<&str>) {
        let Some(secret) = secret else {
            return;
        };
        if let Err(e) = self.tokens.revoke(secret).await {
            tracing::warn!(error = %e, "refresh revocation failed during logout");
        }
    }

    /// Profile of the caller. Guests get a synthesized profile.
    pub async fn me(&self, identity: &Identity) -> Result<UserResponse, AppError> {
        if identity.is_anonymous {
            return Ok(UserResponse::guest(&identity.user_id));
        }

        let user = self
            .store
            .find_user_by_id(&identity.user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(user.into())
    }

    /// Promote or demote `target_id`.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: actor demotes self, or target is the last admin
    /// - `NotFound`: unknown target
    pub async fn set_admin(
        &self,
        actor: &Identity,
        target_id: &str,
        is_admin: bool,
    ) -> Result<UserResponse, AppError> {
        if actor.user_id == target_id && !is_admin {
            tracing::warn!(actor = %actor.user_id, "self-demotion rejected");
            return Err(AppError::Forbidden("cannot demote self".to_string()));
        }

        let mut tx = self.store.begin_credentials().await?;

        // Admin rows first, then the target: one lock order for every caller.
        let admin_ids = tx.lock_admin_ids().await?;
        let target = tx
            .find_user_for_update(target_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if target.is_admin && !is_admin && !has_other_admin(&admin_ids, target_id) {
            tracing::warn!(actor = %actor.user_id, target = %target_id, "last admin demotion rejected");
            return Err(AppError::Forbidden("cannot demote last admin".to_string()));
        }

        let updated = tx.set_admin(target_id, is_admin, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            actor = %actor.user_id,
            target = %target_id,
            is_admin,
            "admin flag updated"
        );

        Ok(updated.into())
    }

    /// Delete `target_id` and revoke its refresh tokens in one transaction.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: actor deletes self, or target is the last admin
    /// - `NotFound`: unknown target
    pub async fn delete_user(&self, actor: &Identity, target_id: &str) -> Result<(), AppError> {
        if actor.user_id == target_id {
            tracing::warn!(actor = %actor.user_id, "self-deletion rejected");
            return Err(AppError::Forbidden("cannot delete self".to_string()));
        }

        let mut tx = self.store.begin_credentials().await?;

        let admin_ids = tx.lock_admin_ids().await?;
        let target: User = tx
            .find_user_for_update(target_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if target.is_admin && !has_other_admin(&admin_ids, target_id) {
            tracing::warn!(actor = %actor.user_id, target = %target_id, "last admin deletion rejected");
            return Err(AppError::Forbidden("cannot delete last admin".to_string()));
        }

        let revoked = tx.revoke_user_refresh_tokens(target_id, Utc::now()).await?;
        if !tx.delete_user(target_id).await? {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;

        tracing::info!(actor = %actor.user_id, target = %target_id, revoked, "user deleted");

        Ok(())
    }

    async fn open_session(&self, user: User) -> Result<Session, AppError> {
        let access_token = self
            .tokens
            .issue_access(&user.identity(), self.settings.access_ttl)?;
        let refresh = self.tokens.create_refresh(&user.id).await?;

        Ok(Session {
            access_token,
            refresh: Some(refresh),
            user: user.into(),
        })
    }
}

fn has_other_admin(admin_ids: &[String], target_id: &str) -> bool {
    admin_ids.iter().any(|id| id != target_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use argon2::Params;

    fn manager(store: &MemoryStore, auth_limit: u32) -> SessionManager {
        let store: Arc<dyn CredentialStore> = Arc::new(store.clone());
        let tokens = TokenService::new("session-test", Duration::days(30), Arc::clone(&store));
        let passwords = PasswordService::with_params(Params::new(8, 1, 1, None).unwrap()).unwrap();
        SessionManager::new(
            store,
            tokens,
            passwords,
            RateLimitPolicy::per_minute("auth", auth_limit),
            SessionSettings::default(),
        )
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "secret1".to_string(),
            display_name: " Alice ".to_string(),
        }
    }

    async fn put_admin(store: &MemoryStore, id: &str) -> Identity {
        store
            .put_user(NewUser {
                id: id.to_string(),
                email: Some(format!("{id}@example.com")),
                password_hash: None,
                display_name: None,
                is_admin: true,
                is_anonymous: false,
            })
            .await
            .unwrap()
            .identity()
    }

    #[tokio::test]
    async fn register_issues_token_for_persisted_user() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);

        let session = sessions
            .register("ip", register_request("  Alice@Example.com "))
            .await
            .unwrap();

        let identity = sessions.tokens().verify_access(&session.access_token).unwrap();
        assert_eq!(identity.user_id, session.user.id);
        assert_eq!(session.user.email.as_deref(), Some("alice@example.com"));
        assert_eq!(session.user.display_name.as_deref(), Some("Alice"));
        assert!(session.refresh.is_some());
        assert!(store.find_user_by_id(&session.user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_case_insensitively() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);

        sessions.register("ip", register_request("a@b.io")).await.unwrap();
        let err = sessions.register("ip", register_request("A@B.IO")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);
        sessions.register("ip", register_request("a@b.io")).await.unwrap();

        let wrong = sessions
            .login(
                "ip",
                LoginRequest {
                    email: "a@b.io".to_string(),
                    password: "nope-nope".to_string(),
                },
            )
            .await
            .unwrap_err();
        let unknown = sessions
            .login(
                "ip",
                LoginRequest {
                    email: "x@b.io".to_string(),
                    password: "secret1".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn auth_budget_is_enforced() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 2);

        sessions.guest("ip").await.unwrap();
        sessions.guest("ip").await.unwrap();
        assert!(matches!(sessions.guest("ip").await, Err(AppError::RateLimited)));
        assert!(sessions.guest("other-ip").await.is_ok());
    }

    #[tokio::test]
    async fn guest_has_no_refresh_chain() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);

        let session = sessions.guest("ip").await.unwrap();
        assert!(session.refresh.is_none());
        assert!(session.user.id.starts_with("guest_"));
        assert_eq!(session.user.id.len(), "guest_".len() + 32);
        assert_eq!(session.user.display_name.as_deref(), Some(GUEST_DISPLAY_NAME));

        let identity = sessions.tokens().verify_access(&session.access_token).unwrap();
        assert!(identity.is_anonymous);
        assert_eq!(sessions.me(&identity).await.unwrap(), UserResponse::guest(&identity.user_id));
    }

    #[tokio::test]
    async fn refresh_picks_up_demotion() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);
        let root = put_admin(&store, "root").await;

        let session = sessions.register("ip", register_request("a@b.io")).await.unwrap();
        sessions.set_admin(&root, &session.user.id, true).await.unwrap();

        let secret = session.refresh.unwrap().secret;
        let refreshed = sessions.refresh(Some(&secret)).await.unwrap();
        let identity = sessions.tokens().verify_access(&refreshed.access_token).unwrap();
        assert!(identity.is_admin);

        assert!(matches!(sessions.refresh(Some(&secret)).await, Err(AppError::Unauthenticated)));
        assert!(matches!(sessions.refresh(None).await, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn logout_revokes_and_tolerates_garbage() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);
        let session = sessions.register("ip", register_request("a@b.io")).await.unwrap();
        let secret = session.refresh.unwrap().secret;

        sessions.logout(Some(&secret)).await;
        sessions.logout(Some(&secret)).await;
        sessions.logout(Some("garbage")).await;
        sessions.logout(None).await;

        assert!(matches!(sessions.refresh(Some(&secret)).await, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn sole_admin_cannot_be_demoted_but_second_admin_can() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);
        let root = put_admin(&store, "root").await;
        let other = put_admin(&store, "other").await;

        // Two admins: demoting one is fine.
        sessions.set_admin(&root, &other.user_id, false).await.unwrap();

        // `root` is now the only admin.
        let err = sessions.set_admin(&other, &root.user_id, false).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(msg) if msg == "cannot demote last admin"));

        let err = sessions.set_admin(&root, &root.user_id, false).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(msg) if msg == "cannot demote self"));
    }

    #[tokio::test]
    async fn delete_guard_and_token_revocation() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);
        let root = put_admin(&store, "root").await;

        let session = sessions.register("ip", register_request("a@b.io")).await.unwrap();
        let victim = session.user.id.clone();

        assert!(matches!(
            sessions.delete_user(&root, &root.user_id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            sessions.delete_user(&root, "missing").await,
            Err(AppError::NotFound)
        ));

        sessions.delete_user(&root, &victim).await.unwrap();
        assert!(store.find_user_by_id(&victim).await.unwrap().is_none());

        let secret = session.refresh.unwrap().secret;
        assert!(matches!(sessions.refresh(Some(&secret)).await, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn deleting_the_last_admin_is_rejected() {
        let store = MemoryStore::new();
        let sessions = manager(&store, 20);
        let root = put_admin(&store, "root").await;
        let actor = Identity {
            user_id: "someone-else".to_string(),
            is_admin: true,
            is_anonymous: false,
        };

        let err = sessions.delete_user(&actor, &root.user_id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(msg) if msg == "cannot delete last admin"));
    }
}
