//! Session and authorization engine of the admin panel
//!
//! Login with retry lockout, opaque-token sessions in the shared store,
//! permission resolution and row-level data-scope predicates.

pub mod blacklist;
pub mod captcha;
pub mod client;
pub mod config;
pub mod datascope;
pub mod engine;
pub mod error;
pub mod lockout;
pub mod login;
pub mod middleware;
pub mod models;
pub mod permission;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod session_store;
pub mod state;
pub mod tasks;
pub mod validation;

pub use config::AuthSettings;
pub use engine::{AuthEngine, Collaborators};
pub use error::{AuthError, AuthResult};
pub use state::AppState;
