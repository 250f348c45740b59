//! Session-token authentication.
//!
//! [`AuthProvider`] is the server-side seam: it issues bearer tokens and
//! resolves them back to users. [`AuthSession`] is the client-side handle
//! that remembers the current token and publishes sign-in state to
//! subscribers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::queries;
use crate::db::store::{Collection, Filter, ListQuery, RecordStore, StoreError};
use crate::errors::AppError;
use crate::models::{Session, User};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Opens a session for an existing user.
    async fn sign_in(&self, user_id: &str) -> Result<Session, AppError>;

    /// The user behind `token`. Unknown and expired tokens are `Unauthorized`.
    async fn me(&self, token: &str) -> Result<User, AppError>;

    /// Ends the session. Logging out twice is not an error.
    async fn logout(&self, token: &str) -> Result<(), AppError>;

    /// Ends every session of `user_id`, returning how many were open.
    async fn revoke_user(&self, user_id: &str) -> Result<usize, AppError>;
}

/// Sessions kept in the record store's `sessions` collection.
pub struct StoreAuth {
    store: Arc<dyn RecordStore>,
    ttl: Duration,
}

impl StoreAuth {
    pub fn new(store: Arc<dyn RecordStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait]
impl AuthProvider for StoreAuth {
    async fn sign_in(&self, user_id: &str) -> Result<Session, AppError> {
        let user = queries::get_user(self.store.as_ref(), user_id).await?;

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Validation("session lifetime is out of range".to_string()))?;
        let session = Session {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user.id.clone(),
            created_at: now,
            expires_at,
        };
        let session = queries::create_as(self.store.as_ref(), Collection::Sessions, &session).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "session opened");
        Ok(session)
    }

    async fn me(&self, token: &str) -> Result<User, AppError> {
        let Some(session) = queries::get_session(self.store.as_ref(), token).await? else {
            return Err(AppError::Unauthorized);
        };

        if session.is_expired(Utc::now()) {
            tracing::debug!(user_id = %session.user_id, "session expired");
            match self.store.delete(Collection::Sessions, token).await {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            return Err(AppError::Unauthorized);
        }

        match queries::get_user(self.store.as_ref(), &session.user_id).await {
            Ok(user) => Ok(user),
            Err(AppError::NotFound(_)) => Err(AppError::Unauthorized),
            Err(e) => Err(e),
        }
    }

    async fn logout(&self, token: &str) -> Result<(), AppError> {
        match self.store.delete(Collection::Sessions, token).await {
            Ok(()) => {
                tracing::info!("session closed");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn revoke_user(&self, user_id: &str) -> Result<usize, AppError> {
        let query = ListQuery::new().filter(Filter::eq("user_id", user_id));
        let sessions = self.store.list(Collection::Sessions, &query).await?;

        let mut revoked = 0;
        for session in sessions {
            let Some(token) = session.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            match self.store.delete(Collection::Sessions, token).await {
                Ok(()) => revoked += 1,
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(user_id = %user_id, revoked, "sessions revoked");
        Ok(revoked)
    }
}

/// What subscribers of an [`AuthSession`] see.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    /// True until the first `restore` or `sign_in` settles.
    pub is_loading: bool,
}

/// Client-side view of who is signed in.
pub struct AuthSession {
    provider: Arc<dyn AuthProvider>,
    token: Mutex<Option<String>>,
    state: watch::Sender<AuthState>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        let (state, _) = watch::channel(AuthState {
            user: None,
            is_loading: true,
        });
        Self {
            provider,
            token: Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = token;
        }
    }

    fn publish(&self, user: Option<User>) {
        self.state.send_replace(AuthState {
            user,
            is_loading: false,
        });
    }

    /// Resumes a previously issued token. A stale token signs the session out
    /// instead of failing.
    pub async fn restore(&self, token: Option<String>) -> Result<AuthState, AppError> {
        let user = match token {
            Some(token) => match self.provider.me(&token).await {
                Ok(user) => {
                    self.set_token(Some(token));
                    Some(user)
                }
                Err(AppError::Unauthorized) => {
                    self.set_token(None);
                    None
                }
                Err(e) => {
                    self.publish(None);
                    return Err(e);
                }
            },
            None => None,
        };
        self.publish(user);
        Ok(self.state())
    }

    pub async fn sign_in(&self, user_id: &str) -> Result<User, AppError> {
        let session = self.provider.sign_in(user_id).await?;
        let user = self.provider.me(&session.id).await?;
        self.set_token(Some(session.id));
        self.publish(Some(user.clone()));
        Ok(user)
    }

    pub async fn me(&self) -> Result<User, AppError> {
        let token = self.token().ok_or(AppError::Unauthorized)?;
        self.provider.me(&token).await
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        let token = self.token();
        self.set_token(None);
        if let Some(token) = token {
            self.provider.logout(&token).await?;
        }
        self.publish(None);
        Ok(())
    }

    /// Calls `callback` with the current state, then again after every change.
    /// Rapid changes may be coalesced into the latest one.
    pub fn on_auth_state_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(AuthState) + Send + 'static,
    {
        let mut rx = self.state.subscribe();
        let handle = tokio::spawn(async move {
            let current = rx.borrow_and_update().clone();
            callback(current);
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                callback(next);
            }
        });
        Subscription { handle }
    }
}

/// Stops delivery when unsubscribed or dropped.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
