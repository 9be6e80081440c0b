//! Login log persistence

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::LoginLogSink;
use crate::models::LoginLogEntry;

/// Writes login audit entries to `sys_logininfor`
#[derive(Clone)]
pub struct PgLoginLogSink {
    pool: PgPool,
}

impl PgLoginLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginLogSink for PgLoginLogSink {
    async fn record(&self, entry: &LoginLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sys_logininfor
                (user_name, ipaddr, login_location, browser, os, status, msg, login_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.user_name)
        .bind(&entry.ipaddr)
        .bind(&entry.login_location)
        .bind(&entry.browser)
        .bind(&entry.os)
        .bind(entry.status.code())
        .bind(&entry.message)
        .bind(entry.login_time)
        .execute(&self.pool)
        .await
        .context("failed to insert login log")?;

        Ok(())
    }
}
