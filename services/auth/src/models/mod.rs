//! Authentication service models

pub mod login_log;
pub mod role;
pub mod session;
pub mod user;

// Re-export for convenience
pub use login_log::{LoginLogEntry, LoginStatus};
pub use role::{DataScope, Role, RoleStatus};
pub use session::LoginUser;
pub use user::{LoginCredentials, User, UserStatus};
