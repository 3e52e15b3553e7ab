//! Inbound and outbound transforms applied around storage.

use std::time::Duration;

use serde_json::{Map, Value};
use solarcare_core::types::EpochMillis;

use crate::envelope::PersistedAuth;

/// Substrings that mark a user field as a credential.
const SENSITIVE_MARKERS: &[&str] = &["password", "passwd", "secret"];

/// Field names that are credentials on their own.
const SENSITIVE_FIELDS: &[&str] = &["pin", "otp"];

fn is_sensitive(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    SENSITIVE_FIELDS.contains(&lower.as_str())
        || SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Outbound: remove password-like fields from the user object.
///
/// Returns the number of fields removed.
pub fn strip_sensitive(auth: &mut Map<String, Value>) -> usize {
    let Some(Value::Object(user)) = auth.get_mut("user") else {
        return 0;
    };
    let before = user.len();
    user.retain(|field, _| !is_sensitive(field));
    before - user.len()
}

/// Inbound: discard a session older than `max_age`.
///
/// A token without a login time cannot be aged and is discarded too.
pub fn expire_stale(auth: PersistedAuth, now: EpochMillis, max_age: Duration) -> PersistedAuth {
    if auth.token.is_none() {
        return auth;
    }
    match auth.last_login_time {
        Some(at) if now.saturating_sub(at) <= max_age.as_millis() as i64 => auth,
        Some(at) => {
            tracing::info!(age_ms = now.saturating_sub(at), "Persisted session expired, starting logged out");
            PersistedAuth::logged_out()
        }
        None => {
            tracing::warn!("Persisted session has no login time, starting logged out");
            PersistedAuth::logged_out()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn session_at(at: EpochMillis) -> PersistedAuth {
        serde_json::from_value(json!({
            "token": "t",
            "user": {"id": "1", "phone": "1234567890"},
            "isLoggedIn": true,
            "lastLoginTime": at
        }))
        .unwrap()
    }

    #[test]
    fn strips_password_like_user_fields() {
        let mut auth = json!({
            "token": "t",
            "user": {"id": "1", "phone": "2", "password": "x", "PasswordHash": "y", "otp": "123456", "name": "n"}
        })
        .as_object()
        .cloned()
        .unwrap();

        assert_eq!(strip_sensitive(&mut auth), 3);
        let user = auth["user"].as_object().unwrap();
        assert!(user.contains_key("name"));
        assert!(!user.contains_key("password"));
        assert!(!user.contains_key("PasswordHash"));
        assert!(!user.contains_key("otp"));
        assert_eq!(auth["token"], "t");
    }

    #[test]
    fn strip_without_user_is_noop() {
        let mut auth = json!({"token": null, "user": null}).as_object().cloned().unwrap();
        assert_eq!(strip_sensitive(&mut auth), 0);
    }

    #[test]
    fn fresh_session_survives() {
        let now = 100 * HOUR_MS;
        let auth = session_at(now - HOUR_MS);
        assert_eq!(expire_stale(auth.clone(), now, DAY), auth);
    }

    #[test]
    fn day_old_session_is_discarded() {
        let now = 100 * HOUR_MS;
        let out = expire_stale(session_at(now - 25 * HOUR_MS), now, DAY);
        assert_eq!(out, PersistedAuth::logged_out());
    }

    #[test]
    fn token_without_login_time_is_discarded() {
        let mut auth = session_at(0);
        auth.last_login_time = None;
        assert_eq!(expire_stale(auth, 1, DAY), PersistedAuth::logged_out());
    }
}
