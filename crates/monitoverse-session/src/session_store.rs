use std::sync::Arc;

use anyhow::Context;

use crate::auth_api_client::{AuthApiError, AuthBackend};
use crate::session_storage::{SessionStorage, SESSION_TOKEN_KEY, SESSION_USER_KEY};
use crate::session_types::{
    EnrollmentOutcome, LoginOutcome, PendingChallenge, RegisterOutcome, Session, SessionGrant,
    SessionUser, TotpEnrollment,
};

const ALREADY_SIGNED_IN: &str = "already signed in; log out first";
const NO_PENDING_CHALLENGE: &str = "no pending login awaiting a verification code";
const NO_ENROLLMENT_EMAIL: &str = "no account is waiting for two-factor setup";
const CODE_REQUIRED: &str = "verification code is required";
const INVALID_ENROLLMENT_CODE: &str = "Invalid verification code";
const SESSION_NOT_SAVED: &str = "signed in, but the session could not be saved";

/// Owner of the authenticated session and the in-progress authentication flows.
///
/// Every operation reports failure through [`SessionStore::last_error`] rather
/// than returning an error.
pub struct SessionStore {
    backend: Arc<dyn AuthBackend>,
    storage: Box<dyn SessionStorage>,
    session: Option<Session>,
    pending_challenge: Option<PendingChallenge>,
    pending_enrollment_email: Option<String>,
    last_error: Option<String>,
}

impl SessionStore {
    /// Builds a store and rehydrates any session left in `storage`.
    ///
    /// Stored data that cannot be turned into a complete session is discarded.
    pub fn open(backend: Arc<dyn AuthBackend>, storage: Box<dyn SessionStorage>) -> Self {
        let mut store = Self {
            backend,
            storage,
            session: None,
            pending_challenge: None,
            pending_enrollment_email: None,
            last_error: None,
        };
        store.session = store.rehydrate();
        store
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.token.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn pending_challenge(&self) -> Option<&PendingChallenge> {
        self.pending_challenge.as_ref()
    }

    pub fn pending_enrollment_email(&self) -> Option<&str> {
        self.pending_enrollment_email.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Submits first-factor credentials.
    pub async fn login(&mut self, email: &str, password: &str) -> LoginOutcome {
        self.last_error = None;
        if self.session.is_some() {
            self.last_error = Some(ALREADY_SIGNED_IN.to_string());
            return LoginOutcome::Failed;
        }

        let response = match self.backend.login(email.trim(), password).await {
            Ok(response) => response,
            Err(error) => return self.fail_login(error),
        };

        if response.totp_required {
            tracing::info!(email = email.trim(), "login requires a second factor");
            self.pending_challenge = Some(PendingChallenge {
                email: email.trim().to_string(),
                password: password.to_string(),
            });
            return LoginOutcome::SecondFactorRequired;
        }

        match (response.user, response.token) {
            (Some(user), Some(token)) if !token.trim().is_empty() => {
                match self.install_session(SessionGrant { user, token }) {
                    Some(session) => LoginOutcome::Authenticated(session),
                    None => LoginOutcome::Failed,
                }
            }
            _ => {
                self.last_error = Some("Login failed: no session was issued".to_string());
                LoginOutcome::Failed
            }
        }
    }

    /// Completes a pending login with a TOTP code.
    ///
    /// The challenge survives a failed attempt so the code can be retried.
    pub async fn verify_second_factor(&mut self, code: &str) -> LoginOutcome {
        self.last_error = None;
        let Some(challenge) = self.pending_challenge.clone() else {
            self.last_error = Some(NO_PENDING_CHALLENGE.to_string());
            return LoginOutcome::Failed;
        };
        let code = code.trim();
        if code.is_empty() {
            self.last_error = Some(CODE_REQUIRED.to_string());
            return LoginOutcome::Failed;
        }

        match self
            .backend
            .login_with_totp(&challenge.email, &challenge.password, code)
            .await
        {
            Ok(grant) => match self.install_session(grant) {
                Some(session) => LoginOutcome::Authenticated(session),
                None => LoginOutcome::Failed,
            },
            Err(error) => self.fail_login(error),
        }
    }

    /// Creates an account; no session is installed.
    pub async fn register(&mut self, name: &str, email: &str, password: &str) -> RegisterOutcome {
        self.last_error = None;
        let email = email.trim();
        match self.backend.register(name.trim(), email, password).await {
            Ok(response) if response.totp_setup_required => {
                self.pending_enrollment_email = Some(email.to_string());
                RegisterOutcome::EnrollmentRequired {
                    email: email.to_string(),
                }
            }
            Ok(_) => RegisterOutcome::Registered,
            Err(error) => {
                self.record_error(error);
                RegisterOutcome::Failed
            }
        }
    }

    /// Requests TOTP secret material for the pending registration, or for the
    /// signed-in user when no registration is pending.
    pub async fn begin_enrollment(&mut self) -> Option<TotpEnrollment> {
        self.last_error = None;
        let Some(email) = self.enrollment_email() else {
            self.last_error = Some(NO_ENROLLMENT_EMAIL.to_string());
            return None;
        };
        match self.backend.generate_totp(&email).await {
            Ok(enrollment) => Some(enrollment),
            Err(error) => {
                self.record_error(error);
                None
            }
        }
    }

    /// Starts enrollment for an explicit account email.
    pub fn request_enrollment(&mut self, email: &str) {
        let email = email.trim();
        if !email.is_empty() {
            self.pending_enrollment_email = Some(email.to_string());
        }
    }

    /// Verifies the first code from the authenticator and enables TOTP.
    pub async fn confirm_enrollment(&mut self, code: &str) -> EnrollmentOutcome {
        self.last_error = None;
        let Some(email) = self.enrollment_email() else {
            self.last_error = Some(NO_ENROLLMENT_EMAIL.to_string());
            return EnrollmentOutcome::Failed;
        };
        let code = code.trim();
        if code.is_empty() {
            self.last_error = Some(CODE_REQUIRED.to_string());
            return EnrollmentOutcome::Failed;
        }

        match self.backend.verify_totp(&email, code).await {
            Ok(true) => {}
            Ok(false) => {
                self.last_error = Some(INVALID_ENROLLMENT_CODE.to_string());
                return EnrollmentOutcome::InvalidCode;
            }
            Err(error) => {
                self.record_error(error);
                return EnrollmentOutcome::Failed;
            }
        }

        if let Err(error) = self.backend.enable_totp(&email).await {
            self.record_error(error);
            return EnrollmentOutcome::Failed;
        }

        self.pending_enrollment_email = None;
        let updated_user = match self.session.as_mut() {
            Some(session) if session.user.email.eq_ignore_ascii_case(&email) => {
                session.user.totp_enabled = true;
                Some(session.user.clone())
            }
            _ => None,
        };
        if let Some(user) = updated_user {
            if let Err(error) = self.persist_user(&user) {
                tracing::warn!(error = %format!("{error:#}"), "failed to persist enrolled user");
            }
        }
        tracing::info!(email = %email, "two-factor authentication enabled");
        EnrollmentOutcome::Enabled
    }

    pub fn cancel_enrollment(&mut self) {
        self.pending_enrollment_email = None;
    }

    /// Drops the session and pending challenge, in memory and in storage.
    pub fn logout(&mut self) {
        self.session = None;
        self.pending_challenge = None;
        self.clear_persisted();
        tracing::info!("session cleared");
    }

    fn enrollment_email(&self) -> Option<String> {
        self.pending_enrollment_email
            .clone()
            .or_else(|| self.session.as_ref().map(|session| session.user.email.clone()))
    }

    fn fail_login(&mut self, error: AuthApiError) -> LoginOutcome {
        self.record_error(error);
        LoginOutcome::Failed
    }

    fn record_error(&mut self, error: AuthApiError) {
        tracing::warn!(error = %error, "auth collaborator call failed");
        self.last_error = Some(error.to_string());
    }

    /// Persists `grant` and makes it the current session.
    ///
    /// Nothing is installed unless both the user and the token were stored;
    /// a partial write is rolled back and reported through `last_error`.
    fn install_session(&mut self, grant: SessionGrant) -> Option<Session> {
        let session = Session {
            user: grant.user,
            token: grant.token,
        };
        if let Err(error) = self.persist_session(&session) {
            tracing::warn!(error = %format!("{error:#}"), "failed to persist session");
            self.clear_persisted();
            self.last_error = Some(format!("{SESSION_NOT_SAVED}: {error:#}"));
            return None;
        }
        self.pending_challenge = None;
        tracing::info!(user_id = %session.user.id, email = %session.user.email, "session installed");
        self.session = Some(session.clone());
        Some(session)
    }

    fn persist_session(&mut self, session: &Session) -> anyhow::Result<()> {
        self.persist_user(&session.user)?;
        self.storage
            .set_item(SESSION_TOKEN_KEY, &session.token)
            .context("failed to store session token")
    }

    fn persist_user(&mut self, user: &SessionUser) -> anyhow::Result<()> {
        let payload = serde_json::to_string(user).context("failed to encode session user")?;
        self.storage
            .set_item(SESSION_USER_KEY, &payload)
            .context("failed to store session user")
    }

    fn clear_persisted(&mut self) {
        for key in [SESSION_USER_KEY, SESSION_TOKEN_KEY] {
            if let Err(error) = self.storage.remove_item(key) {
                tracing::warn!(key, error = %error, "failed to remove session storage item");
            }
        }
    }

    fn rehydrate(&mut self) -> Option<Session> {
        let stored_user = match self.storage.get_item(SESSION_USER_KEY) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(error = %error, "session storage unreadable; starting signed out");
                self.clear_persisted();
                return None;
            }
        };
        let Some(raw_user) = stored_user else {
            if matches!(self.storage.get_item(SESSION_TOKEN_KEY), Ok(Some(_))) {
                tracing::debug!("removing stored token without a session user");
                self.clear_persisted();
            }
            return None;
        };

        let user = match serde_json::from_str::<SessionUser>(&raw_user) {
            Ok(user) => user,
            Err(error) => {
                tracing::warn!(error = %error, "discarding malformed stored session user");
                self.clear_persisted();
                return None;
            }
        };

        let token = self
            .storage
            .get_item(SESSION_TOKEN_KEY)
            .ok()
            .flatten()
            .filter(|token| !token.trim().is_empty());
        let Some(token) = token else {
            tracing::warn!("discarding stored session user without a token");
            self.clear_persisted();
            return None;
        };

        tracing::debug!(user_id = %user.id, "rehydrated session from storage");
        Some(Session { user, token })
    }
}
