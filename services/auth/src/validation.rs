//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::{config::AuthSettings, error::AuthError};

/// Validate username shape: non-empty, within bounds, no markup characters
pub fn validate_username(username: &str, min: usize, max: usize) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    let len = username.chars().count();
    if len < min || len > max {
        return Err(format!(
            "Username must be between {} and {} characters long",
            min, max
        ));
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[\p{L}\p{N}_.@-]+$").expect("Failed to compile username regex")
    });

    if !regex.is_match(username) {
        return Err(
            "Username can only contain letters, numbers, and the characters _ . @ -".to_string(),
        );
    }

    Ok(())
}

/// Validate password shape; strength rules belong to account management
pub fn validate_password(password: &str, min: usize, max: usize) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    let len = password.chars().count();
    if len < min || len > max {
        return Err(format!(
            "Password must be between {} and {} characters long",
            min, max
        ));
    }

    Ok(())
}

/// Shape checks run before any credential lookup
pub fn validate_login_input(
    username: &str,
    password: &str,
    settings: &AuthSettings,
) -> Result<(), AuthError> {
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::PreconditionFailed(
            "Username and password are required".to_string(),
        ));
    }

    validate_username(
        username,
        settings.username_min_length,
        settings.username_max_length,
    )
    .map_err(AuthError::PreconditionFailed)?;

    validate_password(
        password,
        settings.password_min_length,
        settings.password_max_length,
    )
    .map_err(AuthError::PreconditionFailed)?;

    Ok(())
}

/// True for an empty string or a plain SQL identifier usable as a table alias
pub fn is_table_alias(alias: &str) -> bool {
    static ALIAS_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = ALIAS_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("Failed to compile alias regex")
    });

    alias.is_empty() || regex.is_match(alias)
}
