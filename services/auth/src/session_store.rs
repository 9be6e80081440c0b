//! Session records in the shared store, keyed `login_tokens:<token>`

use std::sync::Arc;

use common::{cache::CacheStore, error::CacheError};
use tracing::warn;

use crate::{error::AuthResult, models::LoginUser};

pub const LOGIN_TOKEN_KEY: &str = "login_tokens:";

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn CacheStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    fn key(token: &str) -> String {
        format!("{}{}", LOGIN_TOKEN_KEY, token)
    }

    /// Serialize and store, replacing any record and TTL under the token
    pub async fn put(&self, token: &str, session: &LoginUser, ttl_seconds: u64) -> AuthResult<()> {
        let value = serde_json::to_string(session)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.store
            .set(&Self::key(token), &value, Some(ttl_seconds))
            .await?;
        Ok(())
    }

    /// Overwrite only a session that still exists, so a refresh racing a
    /// logout or a newer login cannot bring a deleted token back.
    /// Returns `false` when the key was gone.
    pub async fn put_if_exists(
        &self,
        token: &str,
        session: &LoginUser,
        ttl_seconds: u64,
    ) -> AuthResult<bool> {
        let value = serde_json::to_string(session)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let written = self
            .store
            .set_if_exists(&Self::key(token), &value, ttl_seconds)
            .await?;
        Ok(written)
    }

    /// `None` when the key is missing or already expired
    pub async fn get(&self, token: &str) -> AuthResult<Option<LoginUser>> {
        match self.store.get(&Self::key(token)).await? {
            Some(value) => {
                let session = serde_json::from_str(&value)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, token: &str) -> AuthResult<()> {
        self.store.delete(&Self::key(token)).await?;
        Ok(())
    }

    /// Tokens of every live session owned by `user_id`.
    ///
    /// Scans the whole session key space; records that fail to decode are
    /// skipped.
    pub async fn scan_by_user(&self, user_id: i64) -> AuthResult<Vec<String>> {
        let keys = self.store.keys(&format!("{}*", LOGIN_TOKEN_KEY)).await?;
        let mut tokens = Vec::new();

        for key in keys {
            let Some(value) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<LoginUser>(&value) {
                Ok(session) if session.user_id == user_id => {
                    if let Some(token) = key.strip_prefix(LOGIN_TOKEN_KEY) {
                        tokens.push(token.to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping undecodable session record {}: {}", key, e),
            }
        }

        Ok(tokens)
    }
}
