//! Row-level data scope
//!
//! Turns a user's roles into a [`Predicate`] over caller-named table aliases.
//! Roles are visited in assignment order; the first qualifying role of each
//! scope value contributes, and an `ALL` role wipes every other fragment.

pub mod predicate;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    error::{AuthError, AuthResult},
    models::{DataScope, LoginUser, Role, User},
    repositories::UserRepository,
    validation::is_table_alias,
};

pub use predicate::{Column, Predicate, SqlFragment, Value};

/// Per-query scope settings supplied by the list endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataScopeConfig {
    /// Alias of the department table
    pub dept_alias: String,
    /// Alias of the user table
    pub user_alias: String,
    /// Alias of the table carrying `create_by`
    pub creator_alias: String,
    /// Comma-separated permissions; only roles granting one of them count.
    /// Empty means every role counts.
    pub permission: String,
}

impl DataScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dept(mut self, alias: &str) -> Self {
        self.dept_alias = alias.to_string();
        self
    }

    pub fn user(mut self, alias: &str) -> Self {
        self.user_alias = alias.to_string();
        self
    }

    pub fn creator(mut self, alias: &str) -> Self {
        self.creator_alias = alias.to_string();
        self
    }

    pub fn permission(mut self, permission: &str) -> Self {
        self.permission = permission.to_string();
        self
    }

    pub fn validate(&self) -> AuthResult<()> {
        for (name, alias) in [
            ("deptAlias", &self.dept_alias),
            ("userAlias", &self.user_alias),
            ("creatorAlias", &self.creator_alias),
        ] {
            if !is_table_alias(alias) {
                return Err(AuthError::DataScopeConfigInvalid(format!(
                    "{} {:?} is not a table alias",
                    name, alias
                )));
            }
        }
        Ok(())
    }

    fn required_permissions(&self) -> Vec<&str> {
        self.permission
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }
}

/// Build the row filter for a user.
///
/// Never fails: configuration problems degrade to the deny-all fragment.
pub fn build_predicate(user: &User, config: &DataScopeConfig, super_admin_id: i64) -> Predicate {
    if user.user_id == super_admin_id {
        return Predicate::True;
    }

    if let Err(e) = config.validate() {
        warn!("Data scope for user {} denied: {}", user.user_id, e);
        let dept_alias = if is_table_alias(&config.dept_alias) {
            config.dept_alias.as_str()
        } else {
            ""
        };
        return Predicate::deny_all(dept_alias);
    }

    let deny_all = || Predicate::deny_all(&config.dept_alias);

    if user.roles.is_empty() {
        return deny_all();
    }

    let required = config.required_permissions();
    let qualifies = |role: &Role| {
        role.is_normal()
            && (required.is_empty()
                || role
                    .permissions
                    .iter()
                    .any(|perm| required.contains(&perm.as_str())))
    };

    let custom_role_ids: Vec<i64> = user
        .roles
        .iter()
        .filter(|role| role.data_scope == DataScope::Custom && qualifies(*role))
        .map(|role| role.role_id)
        .collect();

    let mut processed: HashSet<DataScope> = HashSet::new();
    let mut fragments: Vec<Predicate> = Vec::new();

    for role in &user.roles {
        if processed.contains(&role.data_scope) || !qualifies(role) {
            continue;
        }

        match role.data_scope {
            DataScope::All => {
                fragments.clear();
                processed.insert(DataScope::All);
                break;
            }
            DataScope::Custom => {
                if custom_role_ids.is_empty() {
                    fragments.push(deny_all());
                } else {
                    fragments.push(Predicate::CustomDepts {
                        column: Column::new(&config.dept_alias, "dept_id"),
                        role_ids: custom_role_ids.clone(),
                    });
                }
            }
            DataScope::Dept => fragments.push(match user.dept_id {
                Some(dept_id) => Predicate::Eq {
                    column: Column::new(&config.dept_alias, "dept_id"),
                    value: Value::Int(dept_id),
                },
                None => deny_all(),
            }),
            DataScope::DeptAndChild => fragments.push(match user.dept_id {
                Some(dept_id) => Predicate::DeptSubtree {
                    column: Column::new(&config.dept_alias, "dept_id"),
                    dept_id,
                },
                None => deny_all(),
            }),
            DataScope::SelfOnly => {
                let mut own = Vec::new();
                if !config.user_alias.is_empty() {
                    own.push(Predicate::Eq {
                        column: Column::new(&config.user_alias, "user_id"),
                        value: Value::Int(user.user_id),
                    });
                }
                if !config.creator_alias.is_empty() {
                    own.push(Predicate::Eq {
                        column: Column::new(&config.creator_alias, "create_by"),
                        value: Value::Text(user.user_name.clone()),
                    });
                }
                if own.is_empty() {
                    warn!(
                        "SELF data scope for user {} has no user or creator alias",
                        user.user_id
                    );
                    fragments.push(deny_all());
                } else {
                    fragments.push(Predicate::any(own));
                }
            }
        }

        processed.insert(role.data_scope);
    }

    if processed.is_empty() {
        return deny_all();
    }
    if processed.contains(&DataScope::All) {
        return Predicate::True;
    }

    let predicate = Predicate::any(fragments);
    debug!("Data scope for user {}: {}", user.user_id, predicate);
    predicate
}

/// Builds predicates from live role state rather than the session snapshot
#[derive(Clone)]
pub struct DataScopeService {
    users: Arc<dyn UserRepository>,
    super_admin_id: i64,
}

impl DataScopeService {
    pub fn new(users: Arc<dyn UserRepository>, super_admin_id: i64) -> Self {
        Self {
            users,
            super_admin_id,
        }
    }

    pub async fn predicate_for(
        &self,
        session: &LoginUser,
        config: &DataScopeConfig,
    ) -> AuthResult<Predicate> {
        match self.users.find_user_by_id(session.user_id).await? {
            Some(user) if user.is_active() && !user.deleted => {
                Ok(build_predicate(&user, config, self.super_admin_id))
            }
            _ => {
                warn!(
                    "User {} is gone or inactive, denying all rows",
                    session.user_id
                );
                Ok(Predicate::deny_all(if is_table_alias(&config.dept_alias) {
                    config.dept_alias.as_str()
                } else {
                    ""
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoleStatus, UserStatus};

    const SUPER_ADMIN: i64 = 1;

    fn role(id: i64, scope: DataScope) -> Role {
        Role {
            role_id: id,
            role_name: format!("role{}", id),
            role_key: format!("role{}", id),
            role_sort: id as i32,
            data_scope: scope,
            status: RoleStatus::Normal,
            permissions: vec!["system:user:list".to_string()],
        }
    }

    fn user(id: i64, roles: Vec<Role>) -> User {
        User {
            user_id: id,
            dept_id: Some(105),
            user_name: "ry".to_string(),
            nick_name: "ry".to_string(),
            password: String::new(),
            status: UserStatus::Active,
            deleted: false,
            login_ip: None,
            login_date: None,
            roles,
        }
    }

    fn full_config() -> DataScopeConfig {
        DataScopeConfig::new().dept("d").user("u").creator("c")
    }

    #[test]
    fn super_admin_is_unrestricted() {
        let admin = user(SUPER_ADMIN, vec![role(1, DataScope::All), role(2, DataScope::SelfOnly)]);
        assert_eq!(build_predicate(&admin, &full_config(), SUPER_ADMIN).render(), "");

        let roleless_admin = user(SUPER_ADMIN, vec![]);
        assert!(build_predicate(&roleless_admin, &full_config(), SUPER_ADMIN).is_unrestricted());
    }

    #[test]
    fn no_roles_denies_all() {
        let u = user(2, vec![]);
        assert_eq!(
            build_predicate(&u, &full_config(), SUPER_ADMIN).render(),
            "d.dept_id = 0"
        );
    }

    #[test]
    fn all_scope_wins_regardless_of_order() {
        let before = user(2, vec![role(3, DataScope::Dept), role(4, DataScope::All)]);
        let after = user(2, vec![role(4, DataScope::All), role(3, DataScope::SelfOnly)]);
        assert!(build_predicate(&before, &full_config(), SUPER_ADMIN).is_unrestricted());
        assert!(build_predicate(&after, &full_config(), SUPER_ADMIN).is_unrestricted());
    }

    #[test]
    fn disabled_all_role_does_not_count() {
        let mut all = role(4, DataScope::All);
        all.status = RoleStatus::Disabled;
        let u = user(2, vec![all, role(3, DataScope::Dept)]);
        assert_eq!(
            build_predicate(&u, &full_config(), SUPER_ADMIN).render(),
            "d.dept_id = 105"
        );
    }

    #[test]
    fn duplicate_scope_contributes_once() {
        let u = user(2, vec![role(3, DataScope::Dept), role(5, DataScope::Dept)]);
        assert_eq!(
            build_predicate(&u, &full_config(), SUPER_ADMIN),
            Predicate::Eq {
                column: Column::new("d", "dept_id"),
                value: Value::Int(105),
            }
        );
    }

    #[test]
    fn self_scope_with_creator_only() {
        let u = user(2, vec![role(3, DataScope::SelfOnly)]);
        let config = DataScopeConfig::new().dept("d").creator("c");
        assert_eq!(
            build_predicate(&u, &config, SUPER_ADMIN).render(),
            "c.create_by = 'ry'"
        );
    }

    #[test]
    fn self_scope_with_both_aliases() {
        let u = user(2, vec![role(3, DataScope::SelfOnly)]);
        assert_eq!(
            build_predicate(&u, &full_config(), SUPER_ADMIN).render(),
            "u.user_id = 2 OR c.create_by = 'ry'"
        );
    }

    #[test]
    fn self_scope_without_aliases_denies_all() {
        let u = user(2, vec![role(3, DataScope::SelfOnly)]);
        let config = DataScopeConfig::new().dept("d");
        assert_eq!(
            build_predicate(&u, &config, SUPER_ADMIN).render(),
            "d.dept_id = 0"
        );
    }

    #[test]
    fn custom_scope_collects_every_qualifying_custom_role() {
        let mut disabled = role(9, DataScope::Custom);
        disabled.status = RoleStatus::Disabled;
        let u = user(
            2,
            vec![role(6, DataScope::Custom), disabled, role(7, DataScope::Custom)],
        );
        assert_eq!(
            build_predicate(&u, &full_config(), SUPER_ADMIN).render(),
            "d.dept_id IN (SELECT dept_id FROM sys_role_dept WHERE role_id IN (6, 7))"
        );
    }

    #[test]
    fn dept_scopes_without_department_deny() {
        let mut u = user(2, vec![role(3, DataScope::Dept), role(4, DataScope::DeptAndChild)]);
        u.dept_id = None;
        assert_eq!(
            build_predicate(&u, &full_config(), SUPER_ADMIN).render(),
            "d.dept_id = 0 OR d.dept_id = 0"
        );
    }

    #[test]
    fn mixed_scopes_are_or_joined_in_role_order() {
        let u = user(
            2,
            vec![role(4, DataScope::DeptAndChild), role(3, DataScope::SelfOnly)],
        );
        assert_eq!(
            build_predicate(&u, &full_config(), SUPER_ADMIN).render(),
            "d.dept_id IN (SELECT dept_id FROM sys_dept WHERE dept_id = 105 \
             OR 105 = ANY(string_to_array(ancestors, ',')::bigint[])) \
             OR u.user_id = 2 OR c.create_by = 'ry'"
        );
    }

    #[test]
    fn permission_filter_selects_roles() {
        let mut all = role(4, DataScope::All);
        all.permissions = vec!["system:role:list".to_string()];
        let u = user(2, vec![all, role(3, DataScope::Dept)]);

        let config = full_config().permission("system:user:list");
        assert_eq!(
            build_predicate(&u, &config, SUPER_ADMIN).render(),
            "d.dept_id = 105"
        );

        let config = full_config().permission("system:role:list, system:user:list");
        assert!(build_predicate(&u, &config, SUPER_ADMIN).is_unrestricted());

        let config = full_config().permission("monitor:job:list");
        assert_eq!(
            build_predicate(&u, &config, SUPER_ADMIN).render(),
            "d.dept_id = 0"
        );
    }

    #[test]
    fn bad_alias_degrades_to_deny_all() {
        let u = user(2, vec![role(4, DataScope::All)]);
        let config = DataScopeConfig::new().dept("d").user("u; DROP TABLE sys_user");
        assert_eq!(
            build_predicate(&u, &config, SUPER_ADMIN).render(),
            "d.dept_id = 0"
        );
        let config = DataScopeConfig::new().dept("d) OR (1=1");
        assert_eq!(
            build_predicate(&u, &config, SUPER_ADMIN).render(),
            "dept_id = 0"
        );
    }
}
