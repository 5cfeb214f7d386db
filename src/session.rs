//! Explicit session state.
//!
//! [`SessionContext`] is the shared, injected handle the client reads its bearer
//! token from. [`SessionManager`] owns the lifecycle: `init` restores a persisted
//! session, `login`/`register` establish one, `logout` tears it down, and
//! `refresh`/`ensure_fresh` swap in a new access token using the refresh token.

use std::sync::{Arc, RwLock};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    domain::models::User,
    error::{ApiError, ApiResult},
    shelf_client::{AuthResponse, RegisterRequest, ShelfClient},
    storage::SessionStore,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access: String,
    pub refresh: String,
    pub user: User,
    pub signed_in_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

impl Session {
    pub fn new(access: String, refresh: String, user: User) -> Self {
        Self {
            access,
            refresh,
            user,
            signed_in_at: Utc::now(),
        }
    }

    /// Expiry from the access token's `exp` claim. `None` if the token is not a JWT.
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        jwt_expiry(&self.access)
    }

    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at().is_some_and(|exp| exp <= now)
    }
}

fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Cloneable handle to the current session, shared between the client and the manager.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn set(&self, session: Session) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(session);
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn current(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.access.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.user.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn replace_tokens(&self, access: String, refresh: Option<String>) -> Option<Session> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let session = guard.as_mut()?;
        session.access = access;
        if let Some(r) = refresh {
            session.refresh = r;
        }
        Some(session.clone())
    }
}

pub struct SessionManager {
    client: ShelfClient,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    /// The manager drives the same context the client was built with.
    pub fn new(client: ShelfClient, store: Arc<dyn SessionStore>) -> Self {
        Self { client, store }
    }

    pub fn context(&self) -> &SessionContext {
        self.client.session()
    }

    /// Restore a persisted session, if any. A store failure leaves the user signed out.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn init(&self) -> Option<User> {
        match self.store.load().await {
            Ok(Some(session)) => {
                let user = session.user.clone();
                tracing::info!(user_id = user.id, username = %user.username, "restored session");
                self.context().set(session);
                Some(user)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load stored session");
                None
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<User> {
        let auth = self.client.login(username, password).await?;
        Ok(self.establish(auth).await)
    }

    #[tracing::instrument(level = "debug", skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<User> {
        let auth = self.client.register(request).await?;
        Ok(self.establish(auth).await)
    }

    async fn establish(&self, auth: AuthResponse) -> User {
        let session = Session::new(auth.access, auth.refresh, auth.user);
        let user = session.user.clone();
        if let Err(e) = self.store.save(&session).await {
            // still signed in for this run
            tracing::warn!(error = %e, "failed to persist session");
        }
        self.context().set(session);
        tracing::info!(user_id = user.id, role = user.role.as_str(), "signed in");
        user
    }

    /// Teardown: forget the session in memory and on disk.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn logout(&self) {
        self.context().clear();
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "failed to clear stored session");
        }
        tracing::info!("signed out");
    }

    /// Exchange the refresh token for a new access token. A rejected refresh
    /// token ends the session.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn refresh(&self) -> ApiResult<()> {
        let current = self.context().current().ok_or(ApiError::Unauthorized)?;
        match self.client.refresh_token(&current.refresh).await {
            Ok(tokens) => {
                if let Some(updated) = self.context().replace_tokens(tokens.access, tokens.refresh)
                {
                    if let Err(e) = self.store.save(&updated).await {
                        tracing::warn!(error = %e, "failed to persist refreshed session");
                    }
                }
                tracing::debug!("access token refreshed");
                Ok(())
            }
            Err(ApiError::Unauthorized) | Err(ApiError::Validation(_)) => {
                tracing::info!("refresh token rejected, signing out");
                self.logout().await;
                Err(ApiError::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh only when the access token has already expired.
    pub async fn ensure_fresh(&self) -> ApiResult<()> {
        match self.context().current() {
            None => Err(ApiError::Unauthorized),
            Some(s) if s.is_access_expired(Utc::now()) => self.refresh().await,
            Some(_) => Ok(()),
        }
    }
}
