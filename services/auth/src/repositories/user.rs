//! User repository for database operations

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{debug, warn};

use super::{PermissionSource, UserRepository};
use crate::models::{DataScope, Role, RoleStatus, User, UserStatus};

const USER_COLUMNS: &str = r#"
    SELECT u.user_id, u.dept_id, u.user_name, u.nick_name, u.password,
           u.status, u.del_flag, u.login_ip, u.login_date
    FROM sys_user u
"#;

/// User repository backed by the `sys_*` tables
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_user(row: &PgRow) -> Result<User> {
        let status: String = row.try_get("status")?;
        let del_flag: String = row.try_get("del_flag")?;

        Ok(User {
            user_id: row.try_get("user_id")?,
            dept_id: row.try_get("dept_id")?,
            user_name: row.try_get("user_name")?,
            nick_name: row.try_get("nick_name")?,
            password: row.try_get("password")?,
            status: UserStatus::from_code(&status),
            deleted: del_flag.trim() != "0",
            login_ip: row.try_get("login_ip")?,
            login_date: row.try_get("login_date")?,
            roles: Vec::new(),
        })
    }

    /// Roles assigned to a user, each with the permission strings of its
    /// enabled menus
    async fn find_roles(&self, user_id: i64) -> Result<Vec<Role>> {
        let rows = sqlx::query(
            r#"
            SELECT r.role_id, r.role_name, r.role_key, r.role_sort, r.data_scope, r.status,
                   COALESCE(
                       string_agg(m.perms, ',') FILTER (WHERE m.perms IS NOT NULL AND m.perms <> ''),
                       ''
                   ) AS perms
            FROM sys_role r
            JOIN sys_user_role ur ON ur.role_id = r.role_id
            LEFT JOIN sys_role_menu rm ON rm.role_id = r.role_id
            LEFT JOIN sys_menu m ON m.menu_id = rm.menu_id AND m.status = '0'
            WHERE ur.user_id = $1 AND r.del_flag = '0'
            GROUP BY r.role_id, r.role_name, r.role_key, r.role_sort, r.data_scope, r.status
            ORDER BY r.role_sort, r.role_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load roles")?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in rows {
            let role_id: i64 = row.try_get("role_id")?;
            let data_scope: String = row.try_get("data_scope")?;
            let Some(data_scope) = DataScope::from_code(&data_scope) else {
                warn!(
                    "Role {} has unknown data scope code {:?}, skipping",
                    role_id, data_scope
                );
                continue;
            };
            let status: String = row.try_get("status")?;
            let perms: String = row.try_get("perms")?;

            roles.push(Role {
                role_id,
                role_name: row.try_get("role_name")?,
                role_key: row.try_get("role_key")?,
                role_sort: row.try_get("role_sort")?,
                data_scope,
                status: RoleStatus::from_code(&status),
                permissions: perms
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
            });
        }

        Ok(roles)
    }

    async fn with_roles(&self, row: Option<PgRow>) -> Result<Option<User>> {
        match row {
            Some(row) => {
                let mut user = Self::map_user(&row)?;
                user.roles = self.find_roles(user.user_id).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_user_by_login_name(&self, user_name: &str) -> Result<Option<User>> {
        debug!("Finding user by login name: {}", user_name);

        let row = sqlx::query(&format!("{} WHERE u.user_name = $1", USER_COLUMNS))
            .bind(user_name)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load user by name")?;

        self.with_roles(row).await
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        debug!("Finding user by ID: {}", user_id);

        let row = sqlx::query(&format!("{} WHERE u.user_id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load user by id")?;

        self.with_roles(row).await
    }

    async fn touch_last_login(&self, user_id: i64, ip: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sys_user SET login_ip = $2, login_date = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(ip)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("failed to record last login")?;
        Ok(())
    }
}

#[async_trait]
impl PermissionSource for PgUserRepository {
    async fn menu_permissions(&self, user_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT m.perms
            FROM sys_menu m
            JOIN sys_role_menu rm ON rm.menu_id = m.menu_id
            JOIN sys_user_role ur ON ur.role_id = rm.role_id
            JOIN sys_role r ON r.role_id = ur.role_id
            WHERE ur.user_id = $1
              AND m.status = '0'
              AND r.status = '0'
              AND r.del_flag = '0'
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load menu permissions")?;

        let mut perms = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(perm) = row.try_get::<Option<String>, _>("perms")? {
                perms.push(perm);
            }
        }
        Ok(perms)
    }
}
