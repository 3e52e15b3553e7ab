//! Merge rehydrated state over freshly initialised state.

use serde_json::{Map, Value};
use solarcare_core::AuthState;

use crate::envelope::PersistedAuth;

/// Shallow merge: every top-level key present in `inbound` replaces the
/// same key of `initial`; keys `inbound` lacks keep their initial value.
/// Transient fields of `initial` (`is_loading`, `error`) are kept.
pub fn reconcile(initial: &AuthState, inbound: &Map<String, Value>) -> AuthState {
    let mut merged = PersistedAuth::from(initial).to_map();
    for (key, value) in inbound {
        merged.insert(key.clone(), value.clone());
    }

    let persisted: PersistedAuth = match serde_json::from_value(Value::Object(merged)) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Reconciled auth slice failed to parse, keeping initial state");
            return initial.clone();
        }
    };

    let mut state = AuthState::from(persisted);
    state.is_loading = initial.is_loading;
    state.error = initial.error.clone();
    state
}
