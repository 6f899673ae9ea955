use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading or applying migration units.
///
/// Database errors are carried unchanged so the operator sees the original
/// message from SQLite.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The directory or a unit file could not be read.
    #[error("failed to read migrations from {path}: {source}")]
    Io {
        /// Directory or file being read.
        path: PathBuf,
        /// Error reported by the filesystem.
        #[source]
        source: std::io::Error,
    },

    /// A `.sql` file without a `<version>_<description>` name.
    #[error("invalid migration file name '{0}': expected <version>_<description>.sql")]
    InvalidFileName(String),

    #[error("duplicate migration version {version}: '{first}' and '{second}'")]
    /// Two files share a version.
    DuplicateVersion {
        /// The shared version.
        version: i64,
        /// First file name.
        first: String,
        /// Second file name.
        second: String,
    },

    /// An applied unit's file no longer matches the recorded checksum.
    #[error("migration {version} ({description}) was modified after it was applied")]
    ChecksumMismatch {
        /// Unit version.
        version: i64,
        /// Unit description.
        description: String,
    },

    /// `baseline` was given a version with no unit.
    #[error("no migration with version {0}")]
    UnknownVersion(i64),

    #[error("migration {version} ({description}) failed: {source}")]
    /// A unit's statements failed; nothing of it was kept.
    Failed {
        /// Unit version.
        version: i64,
        /// Unit description.
        description: String,
        /// Error reported by the database.
        #[source]
        source: sqlx::Error,
    },

    /// Reading or writing the ledger failed.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
