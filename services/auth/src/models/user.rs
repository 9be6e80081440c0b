//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;

/// Account status as stored in `sys_user.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Disabled,
}

impl UserStatus {
    /// Map the single-character column code (`'0'` active, `'1'` disabled)
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => UserStatus::Active,
            _ => UserStatus::Disabled,
        }
    }
}

/// User entity, loaded together with its assigned roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub dept_id: Option<i64>,
    pub user_name: String,
    pub nick_name: String,
    /// Argon2 PHC string; never written into session records
    #[serde(skip_serializing, default)]
    pub password: String,
    pub status: UserStatus,
    pub deleted: bool,
    pub login_ip: Option<String>,
    pub login_date: Option<DateTime<Utc>>,
    /// Assigned roles in display order, no duplicate role ids
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Role keys of the user's normal-status roles
    pub fn role_keys(&self) -> Vec<String> {
        self.roles
            .iter()
            .filter(|role| role.is_normal())
            .map(|role| role.role_key.clone())
            .collect()
    }
}

/// Login request credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
    /// Captcha answer
    #[serde(default)]
    pub code: Option<String>,
    /// Captcha correlation id
    #[serde(default)]
    pub uuid: Option<String>,
}
