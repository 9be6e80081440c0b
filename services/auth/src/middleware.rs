//! Session authentication and permission checks for protected routes

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{
    error::{AuthError, AuthResult},
    models::LoginUser,
    permission::has_permission,
    state::AppState,
};

/// Bearer token from the Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the caller's session and make it available to handlers as an
/// `Extension<LoginUser>`. Sessions close to expiry are refreshed in passing.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers()).ok_or(AuthError::SessionExpired)?;

    let mut session = state.engine.sessions().get_session(token).await?;
    state
        .engine
        .sessions()
        .verify_and_maybe_refresh(&mut session)
        .await;

    debug!("Authenticated request for user {}", session.user_id);
    req.extensions_mut().insert(session);

    Ok(next.run(req).await)
}

/// Fail with `Forbidden` unless the session grants `permission`
pub fn require_permission(session: &LoginUser, permission: &str) -> AuthResult<()> {
    if has_permission(&session.permissions, permission) {
        Ok(())
    } else {
        warn!(
            "User {} lacks permission {}",
            session.user_id, permission
        );
        Err(AuthError::Forbidden(permission.to_string()))
    }
}
