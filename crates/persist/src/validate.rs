//! Structural validation of rehydrated state.
//!
//! Invalid envelopes are discarded wholesale; nothing here repairs data.

use serde_json::{Map, Value};

use crate::envelope::{PersistMeta, PersistedAuth, VersionedEnvelope, AUTH_SLICE_KEY, META_KEY};

/// Outcome of validating a migrated auth slice.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid(PersistedAuth),
    Invalid(InvalidReason),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidReason {
    #[error("stored state is not valid JSON: {0}")]
    NotJson(String),

    #[error("stored state is not a JSON object")]
    NotAnObject,

    #[error("envelope has no auth slice")]
    MissingSlice,

    #[error("auth slice is not a JSON object")]
    SliceNotAnObject,

    #[error("persist metadata is malformed: {0}")]
    BadMeta(String),

    #[error("auth slice does not match the expected shape: {0}")]
    MalformedSlice(String),

    #[error("user is missing identity: {0}")]
    UserMissingIdentity(String),
}

/// Split a raw stored envelope into its version and auth slice.
///
/// An envelope without `_persist` predates versioning and is version 0.
pub fn parse_envelope(raw: &str) -> Result<VersionedEnvelope, InvalidReason> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| InvalidReason::NotJson(e.to_string()))?;
    let Value::Object(mut root) = value else {
        return Err(InvalidReason::NotAnObject);
    };

    let version = match root.remove(META_KEY) {
        None | Some(Value::Null) => 0,
        Some(meta) => {
            serde_json::from_value::<PersistMeta>(meta)
                .map_err(|e| InvalidReason::BadMeta(e.to_string()))?
                .version
        }
    };

    match root.remove(AUTH_SLICE_KEY) {
        Some(Value::Object(auth)) => Ok(VersionedEnvelope::new(version, auth)),
        Some(_) => Err(InvalidReason::SliceNotAnObject),
        None => Err(InvalidReason::MissingSlice),
    }
}

/// Check a migrated auth slice and type it.
///
/// A present user must carry a non-empty id and phone.
pub fn validate_auth(auth: &Map<String, Value>) -> ValidationResult {
    let persisted: PersistedAuth = match serde_json::from_value(Value::Object(auth.clone())) {
        Ok(p) => p,
        Err(e) => return ValidationResult::Invalid(InvalidReason::MalformedSlice(e.to_string())),
    };

    if let Some(user) = &persisted.user {
        if let Err(e) = user.check_identity() {
            return ValidationResult::Invalid(InvalidReason::UserMissingIdentity(e.to_string()));
        }
    }

    ValidationResult::Valid(persisted)
}
