//! Authentication service routes

use std::net::SocketAddr;

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, UserAgent, authorization::Bearer},
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    client::ClientInfo,
    error::AuthError,
    middleware::require_session,
    models::{LoginCredentials, LoginUser, User},
    permission::SUPER_ADMIN_ROLE_KEY,
    state::AppState,
};

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct InfoResponse {
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/getInfo", get(get_info))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health_check))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(protected)
        .with_state(state)
}

fn client_info(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    agent: Option<TypedHeader<UserAgent>>,
) -> ClientInfo {
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());
    ClientInfo::new(
        state
            .engine
            .trusted_proxies()
            .client_ip(forwarded_for, peer.map(|ConnectInfo(addr)| addr.ip())),
        agent
            .map(|TypedHeader(agent)| agent.as_str().to_string())
            .unwrap_or_default(),
    )
}

/// Store and database reachability
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = match state.store.health_check().await {
        Ok(ok) => ok,
        Err(e) => {
            error!("Store health check failed: {}", e);
            false
        }
    };
    let database_ok = match &state.db_pool {
        Some(pool) => matches!(common::database::health_check(pool).await, Ok(true)),
        None => true,
    };

    let status = if store_ok && database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "service": "auth-service",
            "store": store_ok,
            "database": database_ok,
        })),
    )
}

pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    agent: Option<TypedHeader<UserAgent>>,
    headers: HeaderMap,
    Json(credentials): Json<LoginCredentials>,
) -> Result<impl IntoResponse, AuthError> {
    let client = client_info(&state, &headers, peer, agent);
    info!("Login attempt for user {} from {}", credentials.username, client.ip);

    let token = state.engine.login().login(&credentials, &client).await?;
    Ok((StatusCode::OK, Json(TokenResponse { token })))
}

/// Always succeeds; a missing or stale token simply has nothing to delete
pub async fn logout(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    agent: Option<TypedHeader<UserAgent>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        let client = client_info(&state, &headers, peer, agent);
        state.engine.login().logout(bearer.token(), &client).await?;
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "code": 200, "msg": "Logged out successfully" })),
    ))
}

pub async fn get_info(
    State(state): State<AppState>,
    Extension(session): Extension<LoginUser>,
) -> Json<InfoResponse> {
    let roles = if session.user_id == state.engine.settings().super_admin_id {
        vec![SUPER_ADMIN_ROLE_KEY.to_string()]
    } else {
        session.user.role_keys()
    };

    Json(InfoResponse {
        roles,
        permissions: session.permissions.into_iter().collect(),
        user: session.user,
    })
}
