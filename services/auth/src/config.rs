//! Engine settings
//!
//! Built-in defaults layered under `AUTH_*` environment variables, e.g.
//! `AUTH_MAX_RETRY_COUNT=3` or `AUTH_CAPTCHA_ENABLED=false`.

use anyhow::{Context, Result, bail};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::client::TrustedProxies;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Failed attempts before the account locks
    pub max_retry_count: u32,
    /// Lockout window; the failure counter lives this long after the last miss
    pub lock_minutes: u64,
    /// Session lifetime, re-armed on every refresh
    pub session_minutes: u64,
    /// Sessions closer than this to expiry are refreshed on use
    pub refresh_threshold_minutes: u64,
    pub captcha_enabled: bool,
    pub captcha_minutes: u64,
    pub username_min_length: usize,
    pub username_max_length: usize,
    pub password_min_length: usize,
    pub password_max_length: usize,
    /// Fallback blacklist when the store holds no runtime override
    pub ip_blacklist: String,
    /// Proxies whose `X-Forwarded-For` is believed; CIDRs or addresses
    #[serde(default)]
    pub trusted_proxies: String,
    pub super_admin_id: i64,
    pub audit_queue_capacity: usize,
    /// Geography lookup endpoint; unset disables lookups
    #[serde(default)]
    pub address_lookup_url: Option<String>,
    pub listen_addr: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_retry_count: 5,
            lock_minutes: 10,
            session_minutes: 120,
            refresh_threshold_minutes: 20,
            captcha_enabled: true,
            captcha_minutes: 2,
            username_min_length: 2,
            username_max_length: 20,
            password_min_length: 5,
            password_max_length: 20,
            ip_blacklist: String::new(),
            trusted_proxies: String::new(),
            super_admin_id: 1,
            audit_queue_capacity: 1024,
            address_lookup_url: None,
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AuthSettings {
    /// Load settings from defaults and the environment, then validate them
    pub fn load() -> Result<Self> {
        let defaults =
            Config::try_from(&AuthSettings::default()).context("failed to encode defaults")?;

        let settings: AuthSettings = Config::builder()
            .add_source(defaults)
            .add_source(Environment::with_prefix("AUTH").try_parsing(true))
            .build()
            .context("failed to read AUTH_* settings")?
            .try_deserialize()
            .context("failed to deserialize AUTH_* settings")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retry_count == 0 {
            bail!("max_retry_count must be at least 1");
        }
        if self.lock_minutes == 0 || self.session_minutes == 0 || self.captcha_minutes == 0 {
            bail!("lock, session and captcha durations must be non-zero");
        }
        if self.refresh_threshold_minutes >= self.session_minutes {
            bail!(
                "refresh_threshold_minutes ({}) must be below session_minutes ({})",
                self.refresh_threshold_minutes,
                self.session_minutes
            );
        }
        if self.username_min_length > self.username_max_length {
            bail!("username length bounds are inverted");
        }
        if self.password_min_length > self.password_max_length {
            bail!("password length bounds are inverted");
        }
        if self.audit_queue_capacity == 0 {
            bail!("audit_queue_capacity must be non-zero");
        }
        TrustedProxies::parse(&self.trusted_proxies)?;
        Ok(())
    }

    pub fn session_seconds(&self) -> u64 {
        self.session_minutes * 60
    }

    pub fn refresh_threshold_millis(&self) -> i64 {
        (self.refresh_threshold_minutes as i64) * 60 * 1000
    }
}
