//! Application state shared across handlers

use std::sync::Arc;

use common::cache::CacheStore;
use sqlx::PgPool;

use crate::engine::AuthEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: AuthEngine,
    pub store: Arc<dyn CacheStore>,
    /// Absent when the service runs on in-memory collaborators
    pub db_pool: Option<PgPool>,
}
