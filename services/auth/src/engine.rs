//! Wiring of the session and authorization engine

use std::sync::Arc;

use anyhow::Result;
use common::cache::CacheStore;
use tracing::info;

use crate::{
    blacklist::BlacklistSource,
    captcha::CacheCaptchaValidator,
    client::{AddressResolver, TrustedProxies},
    config::AuthSettings,
    datascope::DataScopeService,
    lockout::LockoutTracker,
    login::{LoginDependencies, LoginService},
    permission::PermissionResolver,
    repositories::{LoginLogSink, PermissionSource, UserRepository},
    session::SessionManager,
    session_store::SessionStore,
    tasks::{TaskQueue, TaskWorker},
};

/// External collaborators the engine is built on
pub struct Collaborators {
    pub store: Arc<dyn CacheStore>,
    pub users: Arc<dyn UserRepository>,
    pub permissions: Arc<dyn PermissionSource>,
    pub login_log: Arc<dyn LoginLogSink>,
}

#[derive(Clone)]
pub struct AuthEngine {
    settings: Arc<AuthSettings>,
    login: LoginService,
    sessions: SessionManager,
    data_scope: DataScopeService,
    captcha: CacheCaptchaValidator,
    lockout: LockoutTracker,
    trusted_proxies: TrustedProxies,
    tasks: TaskQueue,
}

impl AuthEngine {
    /// Build every service and spawn the background worker.
    ///
    /// Must run inside a tokio runtime.
    pub fn start(settings: AuthSettings, collaborators: Collaborators) -> Result<(Self, TaskWorker)> {
        settings.validate()?;
        let settings = Arc::new(settings);
        let Collaborators {
            store,
            users,
            permissions,
            login_log,
        } = collaborators;

        let (tasks, worker) =
            TaskQueue::start(settings.audit_queue_capacity, login_log, users.clone());

        let sessions = SessionManager::new(SessionStore::new(store.clone()), &settings);
        let captcha = CacheCaptchaValidator::new(store.clone(), settings.captcha_minutes);
        let lockout = LockoutTracker::from_settings(store.clone(), &settings);
        let address = AddressResolver::new(settings.address_lookup_url.clone())?;
        let trusted_proxies = TrustedProxies::parse(&settings.trusted_proxies)?;

        let login = LoginService::new(
            settings.clone(),
            LoginDependencies {
                users: users.clone(),
                captcha: Arc::new(captcha.clone()),
                blacklist: BlacklistSource::new(store, &settings.ip_blacklist),
                lockout: lockout.clone(),
                permissions: PermissionResolver::new(permissions, settings.super_admin_id),
                sessions: sessions.clone(),
                address,
                tasks: tasks.clone(),
            },
        );
        let data_scope = DataScopeService::new(users, settings.super_admin_id);

        info!(
            "Auth engine ready (captcha {}, session {} min, lock after {} failures)",
            if settings.captcha_enabled { "on" } else { "off" },
            settings.session_minutes,
            settings.max_retry_count
        );

        Ok((
            Self {
                settings,
                login,
                sessions,
                data_scope,
                captcha,
                lockout,
                trusted_proxies,
                tasks,
            },
            worker,
        ))
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn login(&self) -> &LoginService {
        &self.login
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn data_scope(&self) -> &DataScopeService {
        &self.data_scope
    }

    /// Issues captcha answers; rendering the image is left to the caller
    pub fn captcha(&self) -> &CacheCaptchaValidator {
        &self.captcha
    }

    pub fn lockout(&self) -> &LockoutTracker {
        &self.lockout
    }

    pub fn trusted_proxies(&self) -> &TrustedProxies {
        &self.trusted_proxies
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }
}
