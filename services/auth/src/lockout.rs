//! Password verification gated by a per-username failure counter
//!
//! The counter lives in the shared store under `pwd_err_cnt:<username>` with
//! a TTL equal to the lock window. Reaching `max_retry_count` locks the
//! account until the key expires; a correct password deletes the key.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use common::cache::CacheStore;
use tracing::{error, info, warn};

use crate::{
    config::AuthSettings,
    error::{AuthError, AuthResult},
    models::User,
};

pub const PWD_ERR_CNT_KEY: &str = "pwd_err_cnt:";

/// Hash a raw password into an argon2 PHC string
pub fn hash_password(raw_password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(raw_password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

/// Check a raw password against a stored PHC string.
///
/// A malformed stored hash never matches.
pub fn verify_password(raw_password: &str, password_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(raw_password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Failed-attempt tracker
#[derive(Clone)]
pub struct LockoutTracker {
    store: Arc<dyn CacheStore>,
    max_retry_count: u32,
    lock_minutes: u64,
}

impl LockoutTracker {
    pub fn new(store: Arc<dyn CacheStore>, max_retry_count: u32, lock_minutes: u64) -> Self {
        Self {
            store,
            max_retry_count,
            lock_minutes,
        }
    }

    pub fn from_settings(store: Arc<dyn CacheStore>, settings: &AuthSettings) -> Self {
        Self::new(store, settings.max_retry_count, settings.lock_minutes)
    }

    fn key(username: &str) -> String {
        format!("{}{}", PWD_ERR_CNT_KEY, username)
    }

    fn locked_error(&self) -> AuthError {
        AuthError::AccountLocked {
            max_retry_count: self.max_retry_count,
            lock_minutes: self.lock_minutes,
        }
    }

    /// Current failure count inside the lock window
    pub async fn retry_count(&self, username: &str) -> AuthResult<u32> {
        let value = self.store.get(&Self::key(username)).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    pub async fn is_locked(&self, username: &str) -> AuthResult<bool> {
        Ok(self.retry_count(username).await? >= self.max_retry_count)
    }

    /// Fail fast with the lockout error if the account is locked
    pub async fn ensure_unlocked(&self, username: &str) -> AuthResult<()> {
        if self.is_locked(username).await? {
            return Err(self.locked_error());
        }
        Ok(())
    }

    /// Validate a password for a user.
    ///
    /// A locked account is rejected without touching the password hash.
    pub async fn validate(&self, user: &User, raw_password: &str) -> AuthResult<()> {
        let username = user.user_name.as_str();
        self.ensure_unlocked(username).await?;

        if !verify_password(raw_password, &user.password) {
            let count = self
                .store
                .incr_with_expiry(&Self::key(username), self.lock_minutes * 60)
                .await?;
            warn!(
                "Password mismatch for {} ({}/{})",
                username, count, self.max_retry_count
            );
            return Err(AuthError::InvalidCredentials);
        }

        self.clear(username).await?;
        Ok(())
    }

    /// Forget all failures for a username
    pub async fn clear(&self, username: &str) -> AuthResult<()> {
        self.store.delete(&Self::key(username)).await?;
        info!("Cleared failed login counter for {}", username);
        Ok(())
    }
}
