//! Version-indexed migration table.
//!
//! Each [`MigrationStep`] is registered under the version it migrates
//! *from* and must produce exactly `from + 1`. Steps run strictly in
//! increasing order; a gap in the table aborts the migration. The latest
//! schema version is `max(registered) + 1`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::envelope::VersionedEnvelope;
use crate::error::MigrationError;

/// A pure transformation from one schema version to the next.
pub trait MigrationStep: Send + Sync {
    /// Short label for logs.
    fn description(&self) -> &'static str;

    /// Transform `envelope` and bump its version by one.
    fn apply(&self, envelope: VersionedEnvelope) -> Result<VersionedEnvelope, MigrationError>;
}

#[derive(Default)]
pub struct MigrationTable {
    steps: BTreeMap<u32, Box<dyn MigrationStep>>,
}

impl MigrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `step` as the migration out of version `from`.
    pub fn with_step(mut self, from: u32, step: impl MigrationStep + 'static) -> Self {
        self.steps.insert(from, Box::new(step));
        self
    }

    /// The version every stored envelope is brought up to.
    pub fn latest_version(&self) -> u32 {
        self.steps
            .last_key_value()
            .map(|(from, _)| from + 1)
            .unwrap_or(0)
    }

    /// Run every step between `envelope.version` and the latest version.
    pub fn migrate(
        &self,
        mut envelope: VersionedEnvelope,
    ) -> Result<VersionedEnvelope, MigrationError> {
        let latest = self.latest_version();
        if envelope.version > latest {
            return Err(MigrationError::FutureVersion {
                found: envelope.version,
                latest,
            });
        }

        while envelope.version < latest {
            let from = envelope.version;
            let step = self
                .steps
                .get(&from)
                .ok_or(MigrationError::MissingStep(from))?;

            envelope = step.apply(envelope)?;
            if envelope.version != from + 1 {
                return Err(MigrationError::BadVersionBump {
                    from,
                    produced: envelope.version,
                });
            }
            tracing::info!(from, to = envelope.version, step = step.description(), "Applied migration");
        }

        Ok(envelope)
    }
}

// ---------------------------------------------------------------------------
// Built-in steps
// ---------------------------------------------------------------------------

/// v0 -> v1: early builds stored `phone` at the top of the slice; it now
/// lives on the user object. Dropped when there is no user to carry it.
pub struct NestPhoneInUser;

impl MigrationStep for NestPhoneInUser {
    fn description(&self) -> &'static str {
        "nest top-level phone under user"
    }

    fn apply(&self, mut envelope: VersionedEnvelope) -> Result<VersionedEnvelope, MigrationError> {
        if let Some(phone) = envelope.auth.remove("phone") {
            match envelope.auth.get_mut("user") {
                Some(Value::Object(user)) => {
                    let has_phone = matches!(user.get("phone"), Some(Value::String(p)) if !p.is_empty());
                    if !has_phone {
                        user.insert("phone".into(), phone);
                    }
                }
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(MigrationError::Step {
                        from: envelope.version,
                        reason: "user is not an object".into(),
                    })
                }
            }
        }
        envelope.version += 1;
        Ok(envelope)
    }
}

/// v1 -> v2: transient request flags were persisted by mistake. Drop them
/// and derive `isLoggedIn` from token presence.
pub struct DropTransientFields;

const TRANSIENT_FIELDS: &[&str] = &["isLoading", "loading", "error"];

impl MigrationStep for DropTransientFields {
    fn description(&self) -> &'static str {
        "drop transient flags, derive isLoggedIn"
    }

    fn apply(&self, mut envelope: VersionedEnvelope) -> Result<VersionedEnvelope, MigrationError> {
        for field in TRANSIENT_FIELDS {
            envelope.auth.remove(*field);
        }
        let has_token = matches!(envelope.auth.get("token"), Some(Value::String(t)) if !t.is_empty());
        envelope
            .auth
            .insert("isLoggedIn".into(), Value::Bool(has_token));
        envelope.version += 1;
        Ok(envelope)
    }
}

/// The table shipped with this build.
pub fn default_migrations() -> MigrationTable {
    MigrationTable::new()
        .with_step(0, NestPhoneInUser)
        .with_step(1, DropTransientFields)
}
