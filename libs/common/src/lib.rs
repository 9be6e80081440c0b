//! Common library for the admin panel backend
//!
//! This crate provides shared infrastructure used by the services: database
//! connectivity, the TTL key-value store and its backends, and
//! infrastructure error types.

pub mod cache;
pub mod database;
pub mod error;

pub use cache::{CacheStore, MemoryStore, RedisConfig, RedisPool};
pub use error::{CacheError, CacheResult, DatabaseError, DatabaseResult};
