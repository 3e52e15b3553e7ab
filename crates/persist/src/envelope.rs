//! On-disk shape of the persisted state.
//!
//! ```json
//! { "auth": { ...PersistedAuth... }, "_persist": { "version": 2, "rehydrated": true } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use solarcare_core::types::EpochMillis;
use solarcare_core::{AuthState, Session, UserProfile};

/// Top-level key holding the auth slice.
pub const AUTH_SLICE_KEY: &str = "auth";

/// Top-level key holding [`PersistMeta`].
pub const META_KEY: &str = "_persist";

/// Bookkeeping stored next to the slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistMeta {
    pub version: u32,
    #[serde(default)]
    pub rehydrated: bool,
}

/// The persisted projection of [`AuthState`].
///
/// Transient fields (`is_loading`, `error`) are not part of it. Every
/// field is optional on the way in so partially written or legacy slices
/// still parse; whether they form a session is decided on conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAuth {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub last_login_time: Option<EpochMillis>,
}

impl PersistedAuth {
    /// The logged-out shape.
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl From<&AuthState> for PersistedAuth {
    fn from(state: &AuthState) -> Self {
        match &state.session {
            Some(session) => Self {
                token: Some(session.token.clone()),
                refresh_token: session.refresh_token.clone(),
                user: Some(session.user.clone()),
                is_logged_in: true,
                last_login_time: Some(session.last_login_time),
            },
            None => Self::logged_out(),
        }
    }
}

impl From<PersistedAuth> for AuthState {
    /// A session is restored only when token, user and last-login time
    /// are all present; anything less is treated as logged out.
    fn from(persisted: PersistedAuth) -> Self {
        match (persisted.token, persisted.user, persisted.last_login_time) {
            (Some(token), Some(user), Some(last_login_time)) if !token.is_empty() => {
                AuthState::with_session(Session {
                    token,
                    refresh_token: persisted.refresh_token,
                    user,
                    last_login_time,
                })
            }
            (None, None, None) => AuthState::default(),
            _ => {
                tracing::warn!("Persisted auth slice held a partial session, discarding it");
                AuthState::default()
            }
        }
    }
}

/// An envelope in flight through the migration table.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedEnvelope {
    pub version: u32,
    /// The raw auth slice, still loosely typed.
    pub auth: Map<String, Value>,
}

impl VersionedEnvelope {
    pub fn new(version: u32, auth: Map<String, Value>) -> Self {
        Self { version, auth }
    }

    /// Encode for storage.
    pub fn into_value(self, rehydrated: bool) -> Value {
        let meta = PersistMeta {
            version: self.version,
            rehydrated,
        };
        let mut root = Map::new();
        root.insert(AUTH_SLICE_KEY.into(), Value::Object(self.auth));
        root.insert(
            META_KEY.into(),
            serde_json::to_value(meta).unwrap_or(Value::Null),
        );
        Value::Object(root)
    }
}
