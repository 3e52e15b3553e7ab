//! Persistence and migration guard for the auth slice.
//!
//! Only the session survives an app restart. On write the slice is
//! projected to [`PersistedAuth`], password-like user fields are stripped
//! and the result is wrapped in a versioned envelope. On boot the
//! envelope is migrated step by step to the latest schema, validated,
//! expired if the session is too old, and shallow-merged over the fresh
//! in-memory state. Every failure on the read path falls back to the
//! logged-out default; nothing on that path returns an error.

pub mod envelope;
pub mod error;
pub mod migrate;
pub mod persistor;
pub mod reconcile;
pub mod transform;
pub mod validate;

pub use envelope::{PersistMeta, PersistedAuth, VersionedEnvelope};
pub use error::{MigrationError, PersistError};
pub use migrate::{default_migrations, MigrationStep, MigrationTable};
pub use persistor::{spawn_persistence, PersistConfig, Persistor, DEFAULT_MAX_SESSION_AGE};
pub use validate::{InvalidReason, ValidationResult};
