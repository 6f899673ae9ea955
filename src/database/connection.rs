use anyhow::Result;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::database::migrations::{MigrationReport, MigrationSet, Migrator};

/// Owns the connection pool to the bot's SQLite store.
#[derive(Clone)]
pub struct DatabaseManager {
    /// Pool with foreign keys enforced on every connection.
    pub pool: SqlitePool,
}

impl DatabaseManager {
    /// Connects, creating the database file and its directory when missing.
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir(database_url)?;

        // Create database if it doesn't exist
        if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
            info!("Creating database {}", database_url);
            Sqlite::create_database(database_url).await?;
        }

        // Cascading deletes on attendances depend on this pragma.
        let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Ok(Self { pool })
    }

    /// Connects to a database that must already exist. Nothing is created.
    pub async fn open_existing(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(false)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Ok(Self { pool })
    }

    /// Applies every pending unit found in `migrations_dir`.
    pub async fn run_migrations(&self, migrations_dir: &Path) -> Result<MigrationReport> {
        info!("Running database migrations from {}", migrations_dir.display());
        let migrator = Migrator::new(MigrationSet::from_dir(migrations_dir)?);
        Ok(migrator.run(&self.pool).await?)
    }
}

/// SQLite creates the database file but not the directory holding it.
fn ensure_sqlite_parent_dir(database_url: &str) -> Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let path = path.strip_prefix("//").unwrap_or(path);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating directory {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
