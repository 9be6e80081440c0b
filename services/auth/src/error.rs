//! Error taxonomy for the session and authorization engine

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::CacheError;
use serde_json::json;
use thiserror::Error;

/// Every way a login, session lookup or authorization check can fail
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("captcha code or correlation id missing")]
    CaptchaMissing,

    #[error("captcha invalid or expired")]
    CaptchaInvalid,

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("login ip is blacklisted")]
    IpBlacklisted,

    #[error("account locked after {max_retry_count} failures for {lock_minutes} minutes")]
    AccountLocked {
        max_retry_count: u32,
        lock_minutes: u64,
    },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account disabled")]
    AccountDisabled,

    #[error("account deleted")]
    AccountDeleted,

    #[error("session expired or not found")]
    SessionExpired,

    #[error("stored session token does not match lookup key")]
    SessionMismatch,

    #[error("invalid data scope configuration: {0}")]
    DataScopeConfigInvalid(String),

    #[error("missing permission: {0}")]
    Forbidden(String),

    #[error("store error: {0}")]
    Store(#[from] CacheError),

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

impl AuthError {
    /// Message safe to show an end user.
    ///
    /// Lockout and credential failures use the same wording family and
    /// never reveal whether the account exists.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::CaptchaMissing => "Captcha is required".to_string(),
            AuthError::CaptchaInvalid => "Captcha is invalid or expired".to_string(),
            AuthError::PreconditionFailed(msg) => msg.clone(),
            AuthError::IpBlacklisted => "Login from this IP address is not allowed".to_string(),
            AuthError::AccountLocked {
                max_retry_count,
                lock_minutes,
            } => format!(
                "Invalid username or password: {} failed attempts, account locked for {} minutes",
                max_retry_count, lock_minutes
            ),
            AuthError::InvalidCredentials => "Invalid username or password".to_string(),
            AuthError::AccountDisabled => "This account has been disabled".to_string(),
            AuthError::AccountDeleted => "This account has been deleted".to_string(),
            AuthError::SessionExpired | AuthError::SessionMismatch => {
                "Session expired, please log in again".to_string()
            }
            AuthError::DataScopeConfigInvalid(_) => "Access denied".to_string(),
            AuthError::Forbidden(_) => "Access denied".to_string(),
            AuthError::Store(_) | AuthError::Repository(_) => {
                "Service temporarily unavailable".to_string()
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::CaptchaMissing
            | AuthError::CaptchaInvalid
            | AuthError::PreconditionFailed(_) => StatusCode::BAD_REQUEST,
            AuthError::AccountLocked { .. }
            | AuthError::InvalidCredentials
            | AuthError::AccountDisabled
            | AuthError::AccountDeleted
            | AuthError::SessionExpired
            | AuthError::SessionMismatch => StatusCode::UNAUTHORIZED,
            AuthError::IpBlacklisted
            | AuthError::DataScopeConfigInvalid(_)
            | AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Store(_) | AuthError::Repository(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "code": status.as_u16(),
            "msg": self.user_message(),
        }));

        (status, body).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
