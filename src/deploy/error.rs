use std::path::PathBuf;
use thiserror::Error;

use crate::database::migrations::MigrationError;

/// Failures of a single deployment step.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The working copy to deploy into is not a directory.
    #[error("checkout directory {0} does not exist")]
    MissingCheckout(PathBuf),

    /// An environment file outside the checkout is configured but absent.
    #[error("environment file {0} does not exist")]
    MissingEnvFile(PathBuf),

    /// The database could not be opened or queried.
    #[error("database {url} unreachable: {source}")]
    Database {
        /// Masked connection URL.
        url: String,
        /// Error reported by the driver.
        #[source]
        source: sqlx::Error,
    },

    /// Database settings could not be resolved.
    #[error(transparent)]
    Config(#[from] anyhow::Error),

    /// The program could not be started at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// Error reported by the operating system.
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        /// Command line that ran.
        command: String,
        /// Exit code or signal, as text.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// Copying the environment file aside or back failed.
    #[error("failed to {action} {path}: {source}")]
    EnvFile {
        /// What was being done, e.g. `back up`.
        action: &'static str,
        /// File the action concerned.
        path: PathBuf,
        /// Error reported by the filesystem.
        #[source]
        source: std::io::Error,
    },

    /// Loading or applying migration units failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_database_error_keeps_driver_error() {
        let error = DeployError::Database {
            url: "sqlite:.../bot.db".to_string(),
            source: sqlx::Error::PoolTimedOut,
        };

        assert!(error.to_string().starts_with("database sqlite:.../bot.db unreachable"));
        let source = error.source().expect("driver error kept as source");
        assert!(source.downcast_ref::<sqlx::Error>().is_some());
    }
}
