//! Session record (the authenticated login user)

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::user::User;

/// Authentication state stored under `login_tokens:<token>`.
///
/// Permissions are frozen at login; the embedded user is a display snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub token: String,
    pub user_id: i64,
    pub dept_id: Option<i64>,
    /// Epoch milliseconds
    pub login_time: i64,
    /// Epoch milliseconds
    pub expire_time: i64,
    pub ipaddr: String,
    pub login_location: String,
    pub browser: String,
    pub os: String,
    pub permissions: BTreeSet<String>,
    pub user: User,
}

impl LoginUser {
    pub fn user_name(&self) -> &str {
        &self.user.user_name
    }

    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expire_time <= now_millis
    }
}
