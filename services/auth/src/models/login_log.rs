//! Login audit record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Success,
    Failure,
    Logout,
}

impl LoginStatus {
    /// `sys_logininfor.status` code; logout counts as a successful event
    pub fn code(&self) -> &'static str {
        match self {
            LoginStatus::Success | LoginStatus::Logout => "0",
            LoginStatus::Failure => "1",
        }
    }
}

/// One entry of the login log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLogEntry {
    pub user_name: String,
    pub status: LoginStatus,
    pub message: String,
    pub ipaddr: String,
    pub login_location: String,
    pub browser: String,
    pub os: String,
    pub user_agent: String,
    pub login_time: DateTime<Utc>,
}
