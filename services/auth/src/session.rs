//! Session management using the shared store

use chrono::Utc;
use common::error::CacheError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::AuthSettings,
    error::{AuthError, AuthResult},
    models::LoginUser,
    session_store::SessionStore,
};

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Session manager for handling login sessions
#[derive(Clone)]
pub struct SessionManager {
    store: SessionStore,
    session_seconds: u64,
    refresh_threshold_millis: i64,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(store: SessionStore, settings: &AuthSettings) -> Self {
        Self {
            store,
            session_seconds: settings.session_seconds(),
            refresh_threshold_millis: settings.refresh_threshold_millis(),
        }
    }

    fn session_millis(&self) -> i64 {
        (self.session_seconds as i64) * 1000
    }

    /// Mint a token, drop every earlier session of the same user and persist
    /// the new one. Returns the token.
    ///
    /// The scan, deletes and final write are separate store calls; a session
    /// written concurrently by another login of the same user may be removed.
    pub async fn create_session(&self, mut session: LoginUser) -> AuthResult<String> {
        let token = Uuid::new_v4().simple().to_string();
        let now = now_millis();
        session.token = token.clone();
        session.login_time = now;
        session.expire_time = now + self.session_millis();

        for previous in self.store.scan_by_user(session.user_id).await? {
            info!(
                "Invalidating previous session of user {}",
                session.user_id
            );
            self.store.delete(&previous).await?;
        }

        self.store
            .put(&token, &session, self.session_seconds)
            .await?;
        info!("Created session for user: {}", session.user_id);

        Ok(token)
    }

    /// Look up a live session
    pub async fn get_session(&self, token: &str) -> AuthResult<LoginUser> {
        let session = match self.store.get(token).await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(AuthError::SessionExpired),
            Err(AuthError::Store(CacheError::Serialization(e))) => {
                error!("Undecodable session record, rejecting: {}", e);
                return Err(AuthError::SessionMismatch);
            }
            Err(e) => return Err(e),
        };

        if session.token != token {
            error!(
                "Session record under a different token (user {}), rejecting",
                session.user_id
            );
            return Err(AuthError::SessionMismatch);
        }

        if session.is_expired_at(now_millis()) {
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }

    /// Refresh when the session is within the threshold of expiring.
    ///
    /// Refresh failures are logged and swallowed.
    pub async fn verify_and_maybe_refresh(&self, session: &mut LoginUser) {
        if self.needs_refresh(session, now_millis()) {
            if let Err(e) = self.refresh(session).await {
                warn!(
                    "Failed to refresh session of user {}: {}",
                    session.user_id, e
                );
            }
        }
    }

    fn needs_refresh(&self, session: &LoginUser, now: i64) -> bool {
        session.expire_time - now <= self.refresh_threshold_millis
    }

    /// Restart the session window from now with a full TTL.
    ///
    /// A session deleted in the meantime (logout, newer login) stays
    /// deleted; the result is `false` then.
    pub async fn refresh(&self, session: &mut LoginUser) -> AuthResult<bool> {
        let now = now_millis();
        session.login_time = now;
        session.expire_time = now + self.session_millis();
        let refreshed = self
            .store
            .put_if_exists(&session.token, session, self.session_seconds)
            .await?;
        if !refreshed {
            debug!(
                "Session of user {} was removed before its refresh, not restoring it",
                session.user_id
            );
        }
        Ok(refreshed)
    }

    /// Delete a session; a missing key is fine
    pub async fn delete_session(&self, token: &str) -> AuthResult<()> {
        self.store.delete(token).await
    }
}
