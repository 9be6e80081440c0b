//! Single-use captcha answers kept in the shared store

use std::sync::Arc;

use async_trait::async_trait;
use common::cache::CacheStore;
use uuid::Uuid;

use crate::error::AuthResult;

pub const CAPTCHA_CODE_KEY: &str = "captcha_codes:";

#[async_trait]
pub trait CaptchaValidator: Send + Sync {
    /// Consume the captcha behind `uuid` and report whether `code` answers it.
    /// The captcha is gone afterwards whatever the outcome.
    async fn verify(&self, uuid: &str, code: &str) -> AuthResult<bool>;
}

#[derive(Clone)]
pub struct CacheCaptchaValidator {
    store: Arc<dyn CacheStore>,
    ttl_seconds: u64,
}

impl CacheCaptchaValidator {
    pub fn new(store: Arc<dyn CacheStore>, ttl_minutes: u64) -> Self {
        Self {
            store,
            ttl_seconds: ttl_minutes * 60,
        }
    }

    fn key(uuid: &str) -> String {
        format!("{}{}", CAPTCHA_CODE_KEY, uuid)
    }

    /// Register the expected answer of a freshly rendered captcha
    pub async fn issue(&self, code: &str) -> AuthResult<String> {
        let uuid = Uuid::new_v4().simple().to_string();
        self.store
            .set(&Self::key(&uuid), code, Some(self.ttl_seconds))
            .await?;
        Ok(uuid)
    }
}

#[async_trait]
impl CaptchaValidator for CacheCaptchaValidator {
    async fn verify(&self, uuid: &str, code: &str) -> AuthResult<bool> {
        let key = Self::key(uuid);
        let expected = self.store.get(&key).await?;
        self.store.delete(&key).await?;

        Ok(expected.is_some_and(|expected| expected.eq_ignore_ascii_case(code.trim())))
    }
}
