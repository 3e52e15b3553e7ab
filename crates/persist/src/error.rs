use solarcare_storage::StorageError;

/// Failures while writing or purging the persisted envelope.
///
/// The read path never surfaces these; it logs and falls back instead.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why an envelope could not be brought up to the latest schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    /// Stored by a newer app build than this one.
    #[error("Envelope version {found} is newer than latest {latest}")]
    FutureVersion { found: u32, latest: u32 },

    /// The table has a gap; versions are never skipped.
    #[error("No migration registered for version {0}")]
    MissingStep(u32),

    /// A step ran but did not advance the version by exactly one.
    #[error("Migration from version {from} produced version {produced}")]
    BadVersionBump { from: u32, produced: u32 },

    /// A step rejected the input shape.
    #[error("Migration from version {from} failed: {reason}")]
    Step { from: u32, reason: String },
}
