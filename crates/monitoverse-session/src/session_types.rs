use serde::{Deserialize, Serialize};

/// Authenticated user as reported by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, rename = "totp")]
    pub totp_enabled: bool,
}

/// An authenticated user together with the bearer token that proves it.
///
/// The token is mandatory, so a session can never exist without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: SessionUser,
    pub token: String,
}

/// First-factor credentials held while the collaborator waits for a TOTP code.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for PendingChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingChallenge")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Secret material returned when TOTP enrollment starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TotpEnrollment {
    /// `otpauth://` provisioning URL, suitable for rendering as a QR code.
    pub qr_code: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub totp_required: bool,
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionGrant {
    pub user: SessionUser,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub totp_setup_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(Session),
    SecondFactorRequired,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    EnrollmentRequired { email: String },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    Enabled,
    InvalidCode,
    Failed,
}
