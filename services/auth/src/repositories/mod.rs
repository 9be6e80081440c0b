//! Persistence collaborators consumed by the engine

pub mod login_log;
pub mod memory;
pub mod user;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{LoginLogEntry, User};

pub use login_log::PgLoginLogSink;
pub use user::PgUserRepository;

/// User lookups; returned users always carry their roles
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_login_name(&self, user_name: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>>;

    async fn touch_last_login(&self, user_id: i64, ip: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Raw permission strings reachable from a user's active roles
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn menu_permissions(&self, user_id: i64) -> Result<Vec<String>>;
}

/// Destination of login audit entries
#[async_trait]
pub trait LoginLogSink: Send + Sync {
    async fn record(&self, entry: &LoginLogEntry) -> Result<()>;
}
