//! Authentication slice: the session entity and its reducer.
//!
//! The session is held as a single `Option<Session>`, so the access token,
//! refresh token, user profile and last-login time are always set and
//! cleared together. `is_logged_in` is derived from it rather than stored.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::EpochMillis;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Customer profile as returned by the API.
///
/// Fields the client does not model are kept in `extra` so a round trip
/// through the client does not lose them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub phone: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// A profile must carry a non-empty id and phone to be trusted.
    pub fn check_identity(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("user id is empty".into()));
        }
        if self.phone.trim().is_empty() {
            return Err(CoreError::Validation("user phone is empty".into()));
        }
        Ok(())
    }

    /// Merge the fields present in `patch`; absent fields are left as-is.
    pub fn apply(&mut self, patch: ProfilePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(email) = patch.email {
            self.email = Some(email);
        }
        if let Some(address) = patch.address {
            self.address = Some(address);
        }
    }
}

/// Partial profile update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    pub refresh_token: Option<String>,
    pub user: UserProfile,
    /// When the OTP verification that created this session succeeded.
    pub last_login_time: EpochMillis,
}

// ---------------------------------------------------------------------------
// Slice state
// ---------------------------------------------------------------------------

/// State of the authentication slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub is_loading: bool,
    /// Last user-facing error, cleared on the next attempt.
    pub error: Option<String>,
}

impl AuthState {
    /// Build a logged-in state around an existing session.
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.refresh_token.as_deref())
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn last_login_time(&self) -> Option<EpochMillis> {
        self.session.as_ref().map(|s| s.last_login_time)
    }

    /// Apply an action. Pure: no I/O, no clock reads.
    pub fn reduce(&mut self, action: AuthAction) {
        match action {
            AuthAction::SendOtpPending | AuthAction::VerifyOtpPending => {
                self.is_loading = true;
                self.error = None;
            }
            AuthAction::SendOtpFulfilled => {
                self.is_loading = false;
            }
            AuthAction::SendOtpRejected(message) | AuthAction::VerifyOtpRejected(message) => {
                self.is_loading = false;
                self.error = Some(message);
            }
            AuthAction::LoginSucceeded(session) => {
                self.session = Some(session);
                self.is_loading = false;
                self.error = None;
            }
            AuthAction::TokenRefreshed {
                token,
                refresh_token,
            } => {
                if let Some(session) = self.session.as_mut() {
                    session.token = token;
                    if refresh_token.is_some() {
                        session.refresh_token = refresh_token;
                    }
                }
            }
            AuthAction::ProfileUpdated(patch) => {
                if let Some(session) = self.session.as_mut() {
                    session.user.apply(patch);
                }
            }
            AuthAction::Logout => {
                self.session = None;
                self.is_loading = false;
                self.error = None;
            }
            AuthAction::ClearError => {
                self.error = None;
            }
        }
    }
}

/// Every transition the auth slice accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    SendOtpPending,
    SendOtpFulfilled,
    SendOtpRejected(String),
    VerifyOtpPending,
    LoginSucceeded(Session),
    VerifyOtpRejected(String),
    TokenRefreshed {
        token: String,
        refresh_token: Option<String>,
    },
    ProfileUpdated(ProfilePatch),
    Logout,
    ClearError,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
