//! Permission resolution and `domain:resource:action` matching

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::{error::AuthResult, models::User, repositories::PermissionSource};

/// Granted to the super-admin; matches every permission
pub const ALL_PERMISSION: &str = "*:*:*";

/// Role key that passes every role check
pub const SUPER_ADMIN_ROLE_KEY: &str = "admin";

const WILDCARD: &str = "*";

/// Computes the frozen permission set placed in a session at login
#[derive(Clone)]
pub struct PermissionResolver {
    source: Arc<dyn PermissionSource>,
    super_admin_id: i64,
}

impl PermissionResolver {
    pub fn new(source: Arc<dyn PermissionSource>, super_admin_id: i64) -> Self {
        Self {
            source,
            super_admin_id,
        }
    }

    pub fn is_super_admin(&self, user_id: i64) -> bool {
        user_id == self.super_admin_id
    }

    pub async fn resolve_permissions(&self, user: &User) -> AuthResult<BTreeSet<String>> {
        if self.is_super_admin(user.user_id) {
            return Ok(BTreeSet::from([ALL_PERMISSION.to_string()]));
        }

        // menu perms columns may hold comma-joined lists
        let permissions: BTreeSet<String> = self
            .source
            .menu_permissions(user.user_id)
            .await?
            .iter()
            .flat_map(|perms| perms.split(','))
            .map(str::trim)
            .filter(|perm| !perm.is_empty())
            .map(str::to_string)
            .collect();

        debug!(
            "Resolved {} permission(s) for user {}",
            permissions.len(),
            user.user_id
        );
        Ok(permissions)
    }
}

/// Does one granted permission cover the required one?
///
/// Segments are compared positionally; a granted `*` segment matches any
/// value and `*:*:*` matches everything.
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == ALL_PERMISSION || granted == required {
        return true;
    }

    let granted: Vec<&str> = granted.split(':').collect();
    let required: Vec<&str> = required.split(':').collect();
    granted.len() == required.len()
        && granted
            .iter()
            .zip(&required)
            .all(|(g, r)| *g == WILDCARD || g == r)
}

pub fn has_permission<'a, I>(granted: I, required: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    if required.trim().is_empty() {
        return false;
    }
    granted
        .into_iter()
        .any(|perm| permission_matches(perm, required.trim()))
}

pub fn lacks_permission<'a, I>(granted: I, required: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    !has_permission(granted, required)
}

/// `required` is a comma-separated list; any single match is enough
pub fn has_any_permission(granted: &BTreeSet<String>, required: &str) -> bool {
    required
        .split(',')
        .map(str::trim)
        .filter(|perm| !perm.is_empty())
        .any(|perm| has_permission(granted, perm))
}

pub fn has_role(role_keys: &[String], required: &str) -> bool {
    let required = required.trim();
    if required.is_empty() {
        return false;
    }
    role_keys
        .iter()
        .any(|key| key == SUPER_ADMIN_ROLE_KEY || key == required)
}

pub fn has_any_role(role_keys: &[String], required: &str) -> bool {
    required.split(',').any(|key| has_role(role_keys, key))
}
