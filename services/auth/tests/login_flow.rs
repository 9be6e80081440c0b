//! End-to-end login flows against in-memory collaborators

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString};
use auth::{
    AuthEngine, AuthError, AuthSettings, Collaborators,
    blacklist::BLACKLIST_CONFIG_KEY,
    client::ClientInfo,
    datascope::DataScopeConfig,
    models::{DataScope, LoginCredentials, LoginStatus, Role, RoleStatus, User, UserStatus},
    repositories::{
        LoginLogSink, UserRepository,
        memory::{InMemoryLoginLog, InMemoryUserRepository},
    },
    tasks::TaskWorker,
};
use common::cache::{CacheStore, MemoryStore};

const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn cheap_hash(raw: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(raw.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn role(id: i64, key: &str, scope: DataScope, permissions: &[&str]) -> Role {
    Role {
        role_id: id,
        role_name: key.to_string(),
        role_key: key.to_string(),
        role_sort: id as i32,
        data_scope: scope,
        status: RoleStatus::Normal,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

fn user(id: i64, name: &str, password: &str, roles: Vec<Role>) -> User {
    User {
        user_id: id,
        dept_id: Some(105),
        user_name: name.to_string(),
        nick_name: name.to_string(),
        password: cheap_hash(password),
        status: UserStatus::Active,
        deleted: false,
        login_ip: None,
        login_date: None,
        roles,
    }
}

fn credentials(username: &str, password: &str) -> LoginCredentials {
    LoginCredentials {
        username: username.to_string(),
        password: password.to_string(),
        code: None,
        uuid: None,
    }
}

fn client(ip: &str) -> ClientInfo {
    ClientInfo::new(ip, CHROME)
}

struct Harness {
    engine: AuthEngine,
    store: Arc<MemoryStore>,
    users: Arc<InMemoryUserRepository>,
    log: Arc<InMemoryLoginLog>,
    _worker: TaskWorker,
}

async fn harness(settings: AuthSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let users = Arc::new(InMemoryUserRepository::new());
    let log = Arc::new(InMemoryLoginLog::new());

    users
        .insert(user(
            1,
            "admin",
            "admin123",
            vec![role(1, "admin", DataScope::All, &["system:user:list"])],
        ))
        .await;
    users
        .insert(user(
            2,
            "ry",
            "ry123456",
            vec![role(
                2,
                "common",
                DataScope::Dept,
                &["system:user:list", "system:user:query"],
            )],
        ))
        .await;

    let (engine, worker) = AuthEngine::start(
        settings,
        Collaborators {
            store: store.clone(),
            users: users.clone(),
            permissions: users.clone(),
            login_log: log.clone(),
        },
    )
    .unwrap();

    Harness {
        engine,
        store,
        users,
        log,
        _worker: worker,
    }
}

fn no_captcha() -> AuthSettings {
    AuthSettings {
        captcha_enabled: false,
        ..AuthSettings::default()
    }
}

#[tokio::test]
async fn valid_login_opens_a_session() {
    let h = harness(no_captcha()).await;

    let token = h
        .engine
        .login()
        .login(&credentials("ry", "ry123456"), &client("192.168.1.20"))
        .await
        .unwrap();

    let session = h.engine.sessions().get_session(&token).await.unwrap();
    assert_eq!(session.user_id, 2);
    assert_eq!(session.token, token);
    assert!(session.permissions.contains("system:user:query"));
    assert_eq!(session.login_location, "Intranet IP");
    assert_eq!(session.browser, "Chrome 120");
    assert_eq!(session.os, "Windows 10");
    assert!(session.expire_time - session.login_time == 120 * 60 * 1000);

    h.engine.tasks().flush().await;
    let entries = h.log.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, LoginStatus::Success);

    let stored = h.users.find_user_by_id(2).await.unwrap().unwrap();
    assert_eq!(stored.login_ip.as_deref(), Some("192.168.1.20"));
    assert!(stored.login_date.is_some());
}

#[tokio::test]
async fn super_admin_gets_every_permission() {
    let h = harness(no_captcha()).await;

    let token = h
        .engine
        .login()
        .login(&credentials("admin", "admin123"), &client("127.0.0.1"))
        .await
        .unwrap();

    let session = h.engine.sessions().get_session(&token).await.unwrap();
    assert_eq!(
        session.permissions.iter().collect::<Vec<_>>(),
        vec!["*:*:*"]
    );
}

#[tokio::test]
async fn second_login_invalidates_the_first() {
    let h = harness(no_captcha()).await;
    let login = h.engine.login();

    let first = login
        .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
        .await
        .unwrap();
    let second = login
        .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert!(matches!(
        h.engine.sessions().get_session(&first).await,
        Err(AuthError::SessionExpired)
    ));
    assert!(h.engine.sessions().get_session(&second).await.is_ok());
}

#[tokio::test]
async fn five_failures_lock_out_the_correct_password() {
    let h = harness(AuthSettings {
        lock_minutes: 15,
        ..no_captcha()
    })
    .await;
    let login = h.engine.login();

    for _ in 0..5 {
        let result = login
            .login(&credentials("ry", "wrongpass"), &client("127.0.0.1"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let result = login
        .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
        .await;
    match result {
        Err(e @ AuthError::AccountLocked { .. }) => {
            assert!(e.user_message().contains("15 minutes"));
        }
        other => panic!("expected AccountLocked, got {:?}", other.map(|_| ())),
    }

    h.engine.tasks().flush().await;
    let entries = h.log.entries().await;
    assert_eq!(entries.len(), 6);
    assert!(entries.iter().all(|e| e.status == LoginStatus::Failure));
    assert_eq!(entries[0].message, "invalid credentials");
    assert_eq!(
        entries[5].message,
        "account locked after 5 failures for 15 minutes"
    );
}

struct UnreachableUsers;

#[async_trait]
impl UserRepository for UnreachableUsers {
    async fn find_user_by_login_name(&self, _: &str) -> anyhow::Result<Option<User>> {
        anyhow::bail!("connection refused to 10.0.0.7:5432")
    }

    async fn find_user_by_id(&self, _: i64) -> anyhow::Result<Option<User>> {
        anyhow::bail!("connection refused to 10.0.0.7:5432")
    }

    async fn touch_last_login(&self, _: i64, _: &str, _: DateTime<Utc>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failure_log_keeps_the_internal_cause() {
    let users = Arc::new(UnreachableUsers);
    let log = Arc::new(InMemoryLoginLog::new());
    let (engine, _worker) = AuthEngine::start(
        no_captcha(),
        Collaborators {
            store: Arc::new(MemoryStore::new()),
            users: users.clone(),
            permissions: Arc::new(InMemoryUserRepository::new()),
            login_log: log.clone() as Arc<dyn LoginLogSink>,
        },
    )
    .unwrap();

    let err = engine
        .login()
        .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Service temporarily unavailable");

    engine.tasks().flush().await;
    let entries = log.entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].message.contains("connection refused to 10.0.0.7:5432"));
}

#[tokio::test]
async fn successful_login_resets_the_counter() {
    let h = harness(no_captcha()).await;
    let login = h.engine.login();

    for _ in 0..4 {
        let _ = login
            .login(&credentials("ry", "wrongpass"), &client("127.0.0.1"))
            .await;
    }
    assert_eq!(h.engine.lockout().retry_count("ry").await.unwrap(), 4);

    login
        .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
        .await
        .unwrap();
    assert_eq!(h.engine.lockout().retry_count("ry").await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_user_looks_like_a_bad_password() {
    let h = harness(no_captcha()).await;

    let result = h
        .engine
        .login()
        .login(&credentials("ghost", "whatever1"), &client("127.0.0.1"))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(err.user_message(), "Invalid username or password");
    assert_eq!(h.engine.lockout().retry_count("ghost").await.unwrap(), 0);
}

#[tokio::test]
async fn disabled_and_deleted_accounts_are_refused() {
    let h = harness(no_captcha()).await;

    let mut disabled = user(3, "frozen", "frozen123", vec![]);
    disabled.status = UserStatus::Disabled;
    h.users.insert(disabled).await;

    let mut deleted = user(4, "gone", "gone1234", vec![]);
    deleted.deleted = true;
    h.users.insert(deleted).await;

    let login = h.engine.login();
    assert!(matches!(
        login
            .login(&credentials("frozen", "frozen123"), &client("127.0.0.1"))
            .await,
        Err(AuthError::AccountDisabled)
    ));
    assert!(matches!(
        login
            .login(&credentials("gone", "gone1234"), &client("127.0.0.1"))
            .await,
        Err(AuthError::AccountDeleted)
    ));
}

#[tokio::test]
async fn malformed_input_fails_preconditions() {
    let h = harness(no_captcha()).await;
    let login = h.engine.login();

    assert!(matches!(
        login
            .login(&credentials("<script>", "ry123456"), &client("127.0.0.1"))
            .await,
        Err(AuthError::PreconditionFailed(_))
    ));
    assert!(matches!(
        login
            .login(&credentials("ry", ""), &client("127.0.0.1"))
            .await,
        Err(AuthError::PreconditionFailed(_))
    ));
}

#[tokio::test]
async fn blacklisted_ip_is_refused() {
    let h = harness(AuthSettings {
        ip_blacklist: "10.9.0.0/16".to_string(),
        ..no_captcha()
    })
    .await;
    let login = h.engine.login();

    assert!(matches!(
        login
            .login(&credentials("ry", "ry123456"), &client("10.9.3.4"))
            .await,
        Err(AuthError::IpBlacklisted)
    ));
    assert!(
        login
            .login(&credentials("ry", "ry123456"), &client("10.8.3.4"))
            .await
            .is_ok()
    );

    // runtime override replaces the configured list
    h.store
        .set(BLACKLIST_CONFIG_KEY, "10.8.*", None)
        .await
        .unwrap();
    assert!(matches!(
        login
            .login(&credentials("ry", "ry123456"), &client("10.8.3.4"))
            .await,
        Err(AuthError::IpBlacklisted)
    ));
    assert!(
        login
            .login(&credentials("ry", "ry123456"), &client("10.9.3.4"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn captcha_is_checked_and_single_use() {
    let h = harness(AuthSettings::default()).await;
    let login = h.engine.login();

    assert!(matches!(
        login
            .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
            .await,
        Err(AuthError::CaptchaMissing)
    ));

    let uuid = h.engine.captcha().issue("x7Kp").await.unwrap();
    let mut creds = credentials("ry", "ry123456");
    creds.uuid = Some(uuid.clone());
    creds.code = Some("nope".to_string());
    assert!(matches!(
        login.login(&creds, &client("127.0.0.1")).await,
        Err(AuthError::CaptchaInvalid)
    ));

    // consumed by the failed attempt
    creds.code = Some("x7Kp".to_string());
    assert!(matches!(
        login.login(&creds, &client("127.0.0.1")).await,
        Err(AuthError::CaptchaInvalid)
    ));

    creds.uuid = Some(h.engine.captcha().issue("x7Kp").await.unwrap());
    creds.code = Some("X7KP".to_string());
    assert!(login.login(&creds, &client("127.0.0.1")).await.is_ok());
}

#[tokio::test]
async fn logout_deletes_the_session_and_is_audited() {
    let h = harness(no_captcha()).await;
    let login = h.engine.login();

    let token = login
        .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
        .await
        .unwrap();
    login.logout(&token, &client("127.0.0.1")).await.unwrap();

    assert!(matches!(
        h.engine.sessions().get_session(&token).await,
        Err(AuthError::SessionExpired)
    ));

    // unknown tokens are fine
    login.logout("no-such-token", &client("127.0.0.1")).await.unwrap();

    h.engine.tasks().flush().await;
    let statuses: Vec<LoginStatus> = h.log.entries().await.into_iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![LoginStatus::Success, LoginStatus::Logout]);
}

#[tokio::test]
async fn data_scope_follows_live_role_state() {
    let h = harness(no_captcha()).await;

    let token = h
        .engine
        .login()
        .login(&credentials("ry", "ry123456"), &client("127.0.0.1"))
        .await
        .unwrap();
    let session = h.engine.sessions().get_session(&token).await.unwrap();
    let config = DataScopeConfig::new().dept("d").user("u");

    let predicate = h
        .engine
        .data_scope()
        .predicate_for(&session, &config)
        .await
        .unwrap();
    assert_eq!(predicate.render(), "d.dept_id = 105");

    // disabling the role mid-session narrows the scope immediately
    h.users
        .update(2, |user| user.roles[0].status = RoleStatus::Disabled)
        .await;
    let predicate = h
        .engine
        .data_scope()
        .predicate_for(&session, &config)
        .await
        .unwrap();
    assert_eq!(predicate.render(), "d.dept_id = 0");

    h.users
        .update(2, |user| user.status = UserStatus::Disabled)
        .await;
    let predicate = h
        .engine
        .data_scope()
        .predicate_for(&session, &config)
        .await
        .unwrap();
    assert_eq!(predicate.render(), "d.dept_id = 0");
}
