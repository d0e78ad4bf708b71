use super::rows::RowStore;
use crate::config::jwt::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::models::IdentityModel;
use crate::utils::jwt::{decode_session_token, encode_session_token};
use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use utoipa::ToSchema;
use uuid::Uuid;

/// Result of a successful sign-up or sign-in.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
}

/// Who a valid token belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: Uuid },
    SignedOut { user_id: Uuid },
}

/// Receives auth-state changes until dropped or unsubscribed.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event, or `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Auth subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

/// Authentication collaborator: credentials in, opaque session tokens out.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<AuthSession>;

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession>;

    /// Invalidate the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> AppResult<()>;

    /// Resolve a token to its identity. Expired, revoked or forged tokens fail.
    async fn session(&self, access_token: &str) -> AppResult<AuthIdentity>;

    fn subscribe(&self) -> AuthSubscription;
}

/// bcrypt credentials in the row store, HS256 session tokens, and an
/// in-memory revocation list keyed by token id.
pub struct TokenAuthProvider {
    store: Arc<dyn RowStore>,
    jwt: JwtConfig,
    hash_cost: u32,
    revoked: DashMap<String, usize>,
    events: broadcast::Sender<AuthEvent>,
}

impl TokenAuthProvider {
    pub fn new(store: Arc<dyn RowStore>, jwt: JwtConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            jwt,
            hash_cost: bcrypt::DEFAULT_COST,
            revoked: DashMap::new(),
            events,
        }
    }

    /// Lower cost for tests; bcrypt's minimum is 4.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost.max(4);
        self
    }

    fn issue(&self, user_id: Uuid, email: &str) -> AppResult<AuthSession> {
        let (access_token, _) = encode_session_token(&self.jwt, user_id, email)?;
        let _ = self.events.send(AuthEvent::SignedIn { user_id });
        Ok(AuthSession {
            user_id,
            email: email.to_string(),
            access_token,
            expires_in: self.jwt.access_token_expiry,
        })
    }

    fn prune_revoked(&self) {
        let now = chrono::Utc::now().timestamp() as usize;
        self.revoked.retain(|_, exp| *exp > now);
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}

#[async_trait]
impl AuthProvider for TokenAuthProvider {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let email = normalize_email(email);
        if self.store.find_identity_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let identity = IdentityModel {
            id: Uuid::new_v4(),
            email,
            password_hash: hash_password(password, self.hash_cost)?,
            created_at: chrono::Utc::now().naive_utc(),
        };
        let identity = self.store.insert_identity(identity).await?;
        tracing::info!(user_id = %identity.id, "Identity created");

        self.issue(identity.id, &identity.email)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let identity = self
            .store
            .find_identity_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(password, &identity.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        self.issue(identity.id, &identity.email)
    }

    async fn sign_out(&self, access_token: &str) -> AppResult<()> {
        let claims =
            decode_session_token(&self.jwt, access_token).map_err(|_| AppError::Unauthorized)?;
        let user_id = claims.user_id().ok_or(AppError::Unauthorized)?;

        self.prune_revoked();
        self.revoked.insert(claims.jti, claims.exp);
        let _ = self.events.send(AuthEvent::SignedOut { user_id });
        Ok(())
    }

    async fn session(&self, access_token: &str) -> AppResult<AuthIdentity> {
        let claims =
            decode_session_token(&self.jwt, access_token).map_err(|_| AppError::Unauthorized)?;
        if self.revoked.contains_key(&claims.jti) {
            return Err(AppError::Unauthorized);
        }
        let user_id = claims.user_id().ok_or(AppError::Unauthorized)?;

        Ok(AuthIdentity {
            user_id,
            email: claims.email,
            session_id: claims.jti,
        })
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            rx: self.events.subscribe(),
        }
    }
}
