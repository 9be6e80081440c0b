//! In-memory collaborators for tests and local development

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{LoginLogSink, PermissionSource, UserRepository};
use crate::models::{LoginLogEntry, User};

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<i64, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.user_id, user);
    }

    /// Apply an in-place change, e.g. disabling a role mid-session
    pub async fn update<F>(&self, user_id: i64, change: F) -> bool
    where
        F: FnOnce(&mut User),
    {
        match self.users.write().await.get_mut(&user_id) {
            Some(user) => {
                change(user);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_user_by_login_name(&self, user_name: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.user_name == user_name)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn touch_last_login(&self, user_id: i64, ip: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.login_ip = Some(ip.to_string());
            user.login_date = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionSource for InMemoryUserRepository {
    async fn menu_permissions(&self, user_id: i64) -> Result<Vec<String>> {
        let users = self.users.read().await;
        Ok(users
            .get(&user_id)
            .map(|user| {
                user.roles
                    .iter()
                    .filter(|role| role.is_normal())
                    .flat_map(|role| role.permissions.iter().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Keeps every recorded entry in order
#[derive(Debug, Default)]
pub struct InMemoryLoginLog {
    entries: Mutex<Vec<LoginLogEntry>>,
}

impl InMemoryLoginLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<LoginLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl LoginLogSink for InMemoryLoginLog {
    async fn record(&self, entry: &LoginLogEntry) -> Result<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
