use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection, FromRow, SqlitePool};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use super::{MigrationError, MigrationSet, MigrationUnit};
use crate::utils::logging::{log_migration_applied, log_migration_failed, log_migration_skipped};

/// Table recording which migration versions have been applied.
pub const LEDGER_TABLE: &str = "schema_version";

const CREATE_LEDGER: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        description TEXT NOT NULL,
        checksum TEXT NOT NULL,
        applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
        execution_ms INTEGER NOT NULL
    )
"#;

#[derive(Debug, Clone, FromRow)]
struct LedgerEntry {
    version: i64,
    description: String,
    checksum: String,
    applied_at: String,
}

/// A unit executed by [`Migrator::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    /// Unit version.
    pub version: i64,
    /// Unit description.
    pub description: String,
    /// Wall-clock time spent executing the unit.
    pub execution_ms: i64,
}

/// Outcome of a successful [`Migrator::run`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Units executed by this run, in order.
    pub applied: Vec<AppliedMigration>,
    /// Units skipped because the ledger already records them.
    pub already_applied: usize,
}

impl MigrationReport {
    /// Nothing was pending.
    pub fn is_up_to_date(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Ledger state of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Unit version.
    pub version: i64,
    /// Unit description.
    pub description: String,
    /// `None` while the unit is pending.
    pub applied_at: Option<String>,
}

/// Applies a [`MigrationSet`] to a database, recording progress in the ledger.
pub struct Migrator {
    set: MigrationSet,
}

impl Migrator {
    /// Wraps an already loaded set.
    pub fn new(set: MigrationSet) -> Self {
        Self { set }
    }

    /// The units this migrator knows about.
    pub fn set(&self) -> &MigrationSet {
        &self.set
    }

    /// Applies every unit not yet recorded in the ledger, in version order.
    ///
    /// Each unit and its ledger row commit together. The first failing unit
    /// stops the run; units applied before it stay applied.
    pub async fn run(&self, pool: &SqlitePool) -> Result<MigrationReport, MigrationError> {
        let mut conn = pool.acquire().await?;
        ensure_ledger(&mut conn).await?;

        let ledger = load_ledger(&mut conn).await?;
        self.verify_ledger(&ledger)?;

        if self.set.is_empty() {
            warn!("No migration units found; nothing to apply");
        }

        let mut report = MigrationReport::default();
        for unit in self.set.units() {
            if ledger.contains_key(&unit.version) {
                log_migration_skipped(unit.version, &unit.description);
                report.already_applied += 1;
                continue;
            }

            let applied = apply_unit(&mut conn, unit).await.map_err(|source| {
                log_migration_failed(unit.version, &unit.description, &source.to_string());
                MigrationError::Failed {
                    version: unit.version,
                    description: unit.description.clone(),
                    source,
                }
            })?;
            log_migration_applied(applied.version, &applied.description, applied.execution_ms);
            report.applied.push(applied);
        }

        info!(
            "Migrations complete: {} applied, {} already applied",
            report.applied.len(),
            report.already_applied
        );
        Ok(report)
    }

    /// Lists every known unit with its ledger state. Does not create the ledger.
    pub async fn status(&self, pool: &SqlitePool) -> Result<Vec<MigrationStatus>, MigrationError> {
        let mut conn = pool.acquire().await?;
        let ledger = if ledger_exists(&mut conn).await? {
            load_ledger(&mut conn).await?
        } else {
            BTreeMap::new()
        };

        Ok(self
            .set
            .units()
            .iter()
            .map(|unit| MigrationStatus {
                version: unit.version,
                description: unit.description.clone(),
                applied_at: ledger.get(&unit.version).map(|entry| entry.applied_at.clone()),
            })
            .collect())
    }

    /// Records every unit up to and including `version` as applied without
    /// executing it. Used to adopt a database whose schema already matches.
    pub async fn baseline(&self, pool: &SqlitePool, version: i64) -> Result<usize, MigrationError> {
        if self.set.get(version).is_none() {
            return Err(MigrationError::UnknownVersion(version));
        }

        let mut conn = pool.acquire().await?;
        ensure_ledger(&mut conn).await?;
        let ledger = load_ledger(&mut conn).await?;
        self.verify_ledger(&ledger)?;

        let mut tx = conn.begin().await?;
        let mut recorded = 0;
        for unit in self.set.units().iter().filter(|unit| unit.version <= version) {
            if ledger.contains_key(&unit.version) {
                continue;
            }
            record_unit(&mut tx, unit, 0).await?;
            recorded += 1;
        }
        tx.commit().await?;

        info!("Baselined {} migration(s) up to version {}", recorded, version);
        Ok(recorded)
    }

    fn verify_ledger(&self, ledger: &BTreeMap<i64, LedgerEntry>) -> Result<(), MigrationError> {
        for entry in ledger.values() {
            match self.set.get(entry.version) {
                Some(unit) if unit.checksum != entry.checksum => {
                    return Err(MigrationError::ChecksumMismatch {
                        version: unit.version,
                        description: unit.description.clone(),
                    });
                }
                Some(_) => {}
                None => warn!(
                    "Database records migration {} ({}) which is not present in this migration set",
                    entry.version, entry.description
                ),
            }
        }
        Ok(())
    }
}

async fn apply_unit(conn: &mut SqliteConnection, unit: &MigrationUnit) -> Result<AppliedMigration, sqlx::Error> {
    let started = Instant::now();

    // Dropping the transaction on error rolls the unit back.
    let mut tx = conn.begin().await?;
    sqlx::raw_sql(&unit.sql).execute(&mut *tx).await?;
    let execution_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    record_unit(&mut tx, unit, execution_ms).await?;
    tx.commit().await?;

    Ok(AppliedMigration {
        version: unit.version,
        description: unit.description.clone(),
        execution_ms,
    })
}

async fn record_unit(conn: &mut SqliteConnection, unit: &MigrationUnit, execution_ms: i64) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO schema_version (version, description, checksum, execution_ms) VALUES (?, ?, ?, ?)")
        .bind(unit.version)
        .bind(&unit.description)
        .bind(&unit.checksum)
        .bind(execution_ms)
        .execute(conn)
        .await?;
    Ok(())
}

async fn ensure_ledger(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_LEDGER).execute(conn).await?;
    Ok(())
}

async fn ledger_exists(conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let found: Option<(String,)> = sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(LEDGER_TABLE)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

async fn load_ledger(conn: &mut SqliteConnection) -> Result<BTreeMap<i64, LedgerEntry>, sqlx::Error> {
    let entries = sqlx::query_as::<_, LedgerEntry>(
        "SELECT version, description, checksum, applied_at FROM schema_version ORDER BY version",
    )
    .fetch_all(conn)
    .await?;

    Ok(entries.into_iter().map(|entry| (entry.version, entry)).collect())
}
