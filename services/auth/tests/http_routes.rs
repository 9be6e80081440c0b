//! HTTP surface: session middleware, login, logout and client address

use std::net::SocketAddr;
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString};
use auth::{
    AppState, AuthEngine, AuthSettings, Collaborators,
    models::{DataScope, Role, RoleStatus, User, UserStatus},
    repositories::memory::{InMemoryLoginLog, InMemoryUserRepository},
    routes::create_router,
    tasks::TaskWorker,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::cache::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

fn seeded_user() -> User {
    let params = Params::new(8, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut rand::thread_rng());
    let password = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(b"ry123456", &salt)
        .unwrap()
        .to_string();

    User {
        user_id: 2,
        dept_id: Some(105),
        user_name: "ry".to_string(),
        nick_name: "ry".to_string(),
        password,
        status: UserStatus::Active,
        deleted: false,
        login_ip: None,
        login_date: None,
        roles: vec![Role {
            role_id: 2,
            role_name: "common".to_string(),
            role_key: "common".to_string(),
            role_sort: 2,
            data_scope: DataScope::Dept,
            status: RoleStatus::Normal,
            permissions: vec!["system:user:list".to_string()],
        }],
    }
}

async fn app(settings: AuthSettings) -> (Router, TaskWorker) {
    let store = Arc::new(MemoryStore::new());
    let users = Arc::new(InMemoryUserRepository::new());
    users.insert(seeded_user()).await;

    let (engine, worker) = AuthEngine::start(
        AuthSettings {
            captcha_enabled: false,
            ..settings
        },
        Collaborators {
            store: store.clone(),
            users: users.clone(),
            permissions: users,
            login_log: Arc::new(InMemoryLoginLog::new()),
        },
    )
    .unwrap();

    let router = create_router(AppState {
        engine,
        store,
        db_pool: None,
    });
    (router, worker)
}

fn login_request(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = forwarded_for {
        builder = builder.header("x-forwarded-for", value);
    }
    let mut req = builder
        .body(Body::from(
            json!({ "username": "ry", "password": "ry123456" }).to_string(),
        ))
        .unwrap();
    let peer: SocketAddr = peer.parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

fn get_info(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/getInfo");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login_token(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(login_request("127.0.0.1:50000", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn bearer_token_unlocks_get_info() {
    let (router, _worker) = app(AuthSettings::default()).await;
    let token = login_token(&router).await;

    let response = router
        .clone()
        .oneshot(get_info(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["roles"], json!(["common"]));
    assert_eq!(body["permissions"], json!(["system:user:list"]));
    assert_eq!(body["user"]["user_name"], "ry");
}

#[tokio::test]
async fn get_info_rejects_missing_or_foreign_credentials() {
    let (router, _worker) = app(AuthSettings::default()).await;
    let token = login_token(&router).await;

    for authorization in [
        None,
        Some(format!("Basic {}", token)),
        Some("Bearer ".to_string()),
        Some("Bearer not-a-session".to_string()),
    ] {
        let response = router
            .clone()
            .oneshot(get_info(authorization.as_deref()))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "authorization {:?}",
            authorization
        );
        assert_eq!(json_body(response).await["code"], 401);
    }
}

#[tokio::test]
async fn logout_always_succeeds_and_ends_the_session() {
    let (router, _worker) = app(AuthSettings::default()).await;

    let anonymous = Request::builder()
        .method("POST")
        .uri("/logout")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        router.clone().oneshot(anonymous).await.unwrap().status(),
        StatusCode::OK
    );

    let token = login_token(&router).await;
    let logout = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        router.clone().oneshot(logout).await.unwrap().status(),
        StatusCode::OK
    );

    let response = router
        .clone()
        .oneshot(get_info(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_forwarded_for_does_not_bypass_the_blacklist() {
    let (router, _worker) = app(AuthSettings {
        ip_blacklist: "203.0.113.7".to_string(),
        ..AuthSettings::default()
    })
    .await;

    let response = router
        .clone()
        .oneshot(login_request("203.0.113.7:41000", Some("198.51.100.1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn trusted_proxy_forwards_the_client_address() {
    let (router, _worker) = app(AuthSettings {
        ip_blacklist: "203.0.113.7".to_string(),
        trusted_proxies: "10.0.0.0/8".to_string(),
        ..AuthSettings::default()
    })
    .await;

    let blocked = router
        .clone()
        .oneshot(login_request("10.0.0.5:41000", Some("203.0.113.7")))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);

    let allowed = router
        .clone()
        .oneshot(login_request("10.0.0.5:41000", Some("198.51.100.1")))
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}
