//! Login pipeline
//!
//! captcha -> shape, lock and IP checks -> user lookup -> account state ->
//! password -> session. Every failure is written to the login log before it
//! is returned; the log write itself is queued and never delays the reply.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    blacklist::BlacklistSource,
    captcha::CaptchaValidator,
    client::{AddressResolver, ClientInfo, UserAgentInfo},
    config::AuthSettings,
    error::{AuthError, AuthResult},
    lockout::LockoutTracker,
    models::{LoginCredentials, LoginLogEntry, LoginStatus, LoginUser, User},
    permission::PermissionResolver,
    repositories::UserRepository,
    session::SessionManager,
    tasks::TaskQueue,
    validation::validate_login_input,
};

#[derive(Clone)]
pub struct LoginService {
    settings: Arc<AuthSettings>,
    users: Arc<dyn UserRepository>,
    captcha: Arc<dyn CaptchaValidator>,
    blacklist: BlacklistSource,
    lockout: LockoutTracker,
    permissions: PermissionResolver,
    sessions: SessionManager,
    address: AddressResolver,
    tasks: TaskQueue,
}

/// Everything the pipeline talks to
pub struct LoginDependencies {
    pub users: Arc<dyn UserRepository>,
    pub captcha: Arc<dyn CaptchaValidator>,
    pub blacklist: BlacklistSource,
    pub lockout: LockoutTracker,
    pub permissions: PermissionResolver,
    pub sessions: SessionManager,
    pub address: AddressResolver,
    pub tasks: TaskQueue,
}

impl LoginService {
    pub fn new(settings: Arc<AuthSettings>, deps: LoginDependencies) -> Self {
        Self {
            settings,
            users: deps.users,
            captcha: deps.captcha,
            blacklist: deps.blacklist,
            lockout: deps.lockout,
            permissions: deps.permissions,
            sessions: deps.sessions,
            address: deps.address,
            tasks: deps.tasks,
        }
    }

    /// Authenticate and open a session, returning its token
    pub async fn login(
        &self,
        credentials: &LoginCredentials,
        client: &ClientInfo,
    ) -> AuthResult<String> {
        let agent = UserAgentInfo::parse(&client.user_agent);

        let user = match self.authenticate(credentials, client).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Login failed for {} from {}: {}", credentials.username, client.ip, e);
                self.audit(
                    &credentials.username,
                    LoginStatus::Failure,
                    &e.to_string(),
                    client,
                    &agent,
                    None,
                );
                return Err(e);
            }
        };

        let location = self.address.resolve(&client.ip).await;
        self.tasks.touch_last_login(user.user_id, &client.ip);
        self.audit(
            &user.user_name,
            LoginStatus::Success,
            "Login successful",
            client,
            &agent,
            Some(&location),
        );

        let permissions = self.permissions.resolve_permissions(&user).await?;
        let session = LoginUser {
            token: String::new(),
            user_id: user.user_id,
            dept_id: user.dept_id,
            login_time: 0,
            expire_time: 0,
            ipaddr: client.ip.clone(),
            login_location: location,
            browser: agent.browser,
            os: agent.os,
            permissions,
            user,
        };

        let token = self.sessions.create_session(session).await?;
        info!("User {} logged in from {}", credentials.username, client.ip);
        Ok(token)
    }

    async fn authenticate(
        &self,
        credentials: &LoginCredentials,
        client: &ClientInfo,
    ) -> AuthResult<User> {
        if self.settings.captcha_enabled {
            self.check_captcha(credentials).await?;
        }

        let username = credentials.username.as_str();
        validate_login_input(username, &credentials.password, &self.settings)?;
        self.lockout.ensure_unlocked(username).await?;
        if self.blacklist.current().await?.contains(&client.ip) {
            return Err(AuthError::IpBlacklisted);
        }

        let user = self
            .users
            .find_user_by_login_name(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if user.deleted {
            return Err(AuthError::AccountDeleted);
        }
        if !user.is_active() {
            return Err(AuthError::AccountDisabled);
        }

        self.lockout.validate(&user, &credentials.password).await?;
        Ok(user)
    }

    async fn check_captcha(&self, credentials: &LoginCredentials) -> AuthResult<()> {
        let code = credentials.code.as_deref().unwrap_or("").trim();
        let uuid = credentials.uuid.as_deref().unwrap_or("").trim();
        if code.is_empty() || uuid.is_empty() {
            return Err(AuthError::CaptchaMissing);
        }
        if !self.captcha.verify(uuid, code).await? {
            return Err(AuthError::CaptchaInvalid);
        }
        Ok(())
    }

    /// Delete the session behind `token`; an unknown token is not an error
    pub async fn logout(&self, token: &str, client: &ClientInfo) -> AuthResult<()> {
        if let Ok(session) = self.sessions.get_session(token).await {
            let agent = UserAgentInfo {
                browser: session.browser.clone(),
                os: session.os.clone(),
            };
            self.audit(
                session.user_name(),
                LoginStatus::Logout,
                "Logout successful",
                client,
                &agent,
                Some(&session.login_location),
            );
            info!("User {} logged out", session.user_name());
        }
        self.sessions.delete_session(token).await
    }

    fn audit(
        &self,
        user_name: &str,
        status: LoginStatus,
        message: &str,
        client: &ClientInfo,
        agent: &UserAgentInfo,
        location: Option<&str>,
    ) {
        self.tasks.record_login(LoginLogEntry {
            user_name: user_name.to_string(),
            status,
            message: message.to_string(),
            ipaddr: client.ip.clone(),
            login_location: location.unwrap_or_default().to_string(),
            browser: agent.browser.clone(),
            os: agent.os.clone(),
            user_agent: client.user_agent.clone(),
            login_time: Utc::now(),
        });
    }
}
