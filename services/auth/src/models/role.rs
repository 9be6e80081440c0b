//! Role model and related functionality

use serde::{Deserialize, Serialize};

/// Which rows a role may see for the permissions it grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataScope {
    /// Every row
    All,
    /// Rows of the departments explicitly bound to the role
    Custom,
    /// Rows of the user's own department
    Dept,
    /// Rows of the user's department and its descendants
    DeptAndChild,
    /// Only rows the user owns or created
    #[serde(rename = "SELF")]
    SelfOnly,
}

impl DataScope {
    /// Map the `sys_role.data_scope` column code (`'1'`..`'5'`)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(DataScope::All),
            "2" => Some(DataScope::Custom),
            "3" => Some(DataScope::Dept),
            "4" => Some(DataScope::DeptAndChild),
            "5" => Some(DataScope::SelfOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleStatus {
    Normal,
    Disabled,
}

impl RoleStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => RoleStatus::Normal,
            _ => RoleStatus::Disabled,
        }
    }
}

/// Role entity with its flattened permission strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub role_id: i64,
    pub role_name: String,
    pub role_key: String,
    pub role_sort: i32,
    pub data_scope: DataScope,
    pub status: RoleStatus,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Role {
    pub fn is_normal(&self) -> bool {
        self.status == RoleStatus::Normal
    }
}
