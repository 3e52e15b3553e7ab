//! Writes the auth slice to storage and restores it on boot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use solarcare_core::{AuthState, Clock, Store};
use solarcare_storage::{keys, StorageHelper};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::envelope::{PersistedAuth, VersionedEnvelope};
use crate::error::PersistError;
use crate::migrate::MigrationTable;
use crate::reconcile::reconcile;
use crate::transform::{expire_stale, strip_sensitive};
use crate::validate::{parse_envelope, validate_auth, ValidationResult};

/// Sessions older than this are discarded on rehydration.
pub const DEFAULT_MAX_SESSION_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Storage key holding the envelope.
    pub key: String,
    pub max_session_age: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            key: keys::PERSIST_ROOT.to_string(),
            max_session_age: DEFAULT_MAX_SESSION_AGE,
        }
    }
}

pub struct Persistor {
    storage: StorageHelper,
    migrations: MigrationTable,
    clock: Arc<dyn Clock>,
    config: PersistConfig,
    rehydrated: AtomicBool,
}

impl Persistor {
    pub fn new(
        storage: StorageHelper,
        migrations: MigrationTable,
        clock: Arc<dyn Clock>,
        config: PersistConfig,
    ) -> Self {
        Self {
            storage,
            migrations,
            clock,
            config,
            rehydrated: AtomicBool::new(false),
        }
    }

    /// Schema version written by this build.
    pub fn version(&self) -> u32 {
        self.migrations.latest_version()
    }

    /// Whether [`rehydrate`](Self::rehydrate) has completed.
    pub fn is_rehydrated(&self) -> bool {
        self.rehydrated.load(Ordering::SeqCst)
    }

    /// Write the persisted projection of `auth`.
    pub async fn persist(&self, auth: &AuthState) -> Result<(), PersistError> {
        let mut slice = PersistedAuth::from(auth).to_map();
        let stripped = strip_sensitive(&mut slice);
        if stripped > 0 {
            tracing::debug!(stripped, "Stripped sensitive user fields before persisting");
        }

        let envelope = VersionedEnvelope::new(self.version(), slice).into_value(self.is_rehydrated());
        self.storage.set(&self.config.key, &envelope).await?;
        tracing::debug!(logged_in = auth.is_logged_in(), "Persisted auth slice");
        Ok(())
    }

    /// Restore the auth slice, falling back to the logged-out default.
    pub async fn rehydrate(&self) -> AuthState {
        self.rehydrate_over(&AuthState::default()).await
    }

    /// Restore the auth slice over `initial`. Never fails.
    ///
    /// An envelope that had to be migrated or whose session expired is
    /// written back in its current form straight away.
    pub async fn rehydrate_over(&self, initial: &AuthState) -> AuthState {
        let (state, outdated) = match self.load_inbound().await {
            Some((inbound, outdated)) => (reconcile(initial, &inbound.to_map()), outdated),
            None => (initial.clone(), false),
        };
        self.rehydrated.store(true, Ordering::SeqCst);
        tracing::info!(logged_in = state.is_logged_in(), "Rehydrated auth slice");

        if outdated {
            match self.persist(&state).await {
                Ok(()) => tracing::debug!("Rewrote outdated persisted envelope"),
                Err(e) => tracing::warn!(error = %e, "Failed to rewrite outdated persisted envelope"),
            }
        }
        state
    }

    /// Read, migrate, validate and age-check the stored envelope. The flag
    /// is set when what is on disk no longer matches what was loaded.
    async fn load_inbound(&self) -> Option<(PersistedAuth, bool)> {
        let raw = self.storage.get_raw(&self.config.key).await?;

        let envelope = match parse_envelope(&raw) {
            Ok(envelope) => envelope,
            Err(reason) => {
                tracing::warn!(%reason, "Discarding persisted envelope");
                return None;
            }
        };

        let stored_version = envelope.version;
        let migrated = match self.migrations.migrate(envelope) {
            Ok(migrated) => migrated,
            Err(e) => {
                tracing::warn!(error = %e, "Persisted envelope failed to migrate, discarding");
                return None;
            }
        };

        let persisted = match validate_auth(&migrated.auth) {
            ValidationResult::Valid(persisted) => persisted,
            ValidationResult::Invalid(reason) => {
                tracing::warn!(%reason, "Persisted auth slice failed validation, discarding");
                return None;
            }
        };

        let migrated_now = migrated.version != stored_version;
        let current = expire_stale(
            persisted.clone(),
            self.clock.now_millis(),
            self.config.max_session_age,
        );
        let expired_now = current != persisted;
        Some((current, migrated_now || expired_now))
    }

    /// Delete the stored envelope.
    pub async fn purge(&self) -> Result<(), PersistError> {
        self.storage.remove(&self.config.key).await?;
        Ok(())
    }
}

/// Persist the auth slice every time its persisted projection changes.
///
/// Only the auth slice is written; UI state and transient auth flags
/// never trigger a write. The task stops when `cancel` fires or the
/// store is dropped.
pub fn spawn_persistence(
    store: Store,
    persistor: Arc<Persistor>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    drop(store);

    tokio::spawn(async move {
        let mut last = PersistedAuth::from(&rx.borrow_and_update().auth);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Persistence task cancelled");
                    break;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Store dropped, stopping persistence task");
                        break;
                    }
                    let auth = rx.borrow_and_update().auth.clone();
                    let projection = PersistedAuth::from(&auth);
                    if projection == last {
                        continue;
                    }
                    match persistor.persist(&auth).await {
                        Ok(()) => last = projection,
                        Err(e) => tracing::error!(error = %e, "Failed to persist auth slice"),
                    }
                }
            }
        }
    })
}
