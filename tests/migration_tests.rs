use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};
use tusabot_ops::database::connection::DatabaseManager;
use tusabot_ops::database::migrations::{MigrationError, MigrationSet, Migrator, LEDGER_TABLE};

type SchemaSnapshot = Vec<(String, String, Option<String>)>;

fn project_migrations() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

async fn empty_db() -> Result<(DatabaseManager, TempDir)> {
    let temp_dir = tempdir()?;
    let database_url = format!("sqlite:{}", temp_dir.path().join("test.db").display());
    let db = DatabaseManager::new(&database_url).await?;
    Ok((db, temp_dir))
}

fn write_units(dir: &Path, units: &[(&str, &str)]) -> Result<()> {
    for (name, sql) in units {
        fs::write(dir.join(name), sql)?;
    }
    Ok(())
}

async fn column_names(db: &DatabaseManager, table: &str) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(&db.pool)
        .await?;
    Ok(names)
}

async fn table_exists(db: &DatabaseManager, table: &str) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_one(&db.pool)
        .await?;
    Ok(count > 0)
}

async fn ledger_versions(db: &DatabaseManager) -> Result<Vec<i64>> {
    let versions = sqlx::query_scalar::<_, i64>("SELECT version FROM schema_version ORDER BY version")
        .fetch_all(&db.pool)
        .await?;
    Ok(versions)
}

async fn schema_snapshot(db: &DatabaseManager) -> Result<SchemaSnapshot> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
        "SELECT type, name, sql FROM sqlite_master WHERE name != ? ORDER BY type, name",
    )
    .bind(LEDGER_TABLE)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows)
}

#[tokio::test]
async fn test_project_migrations_build_current_schema() -> Result<()> {
    let (db, _temp_dir) = empty_db().await?;

    let report = db.run_migrations(&project_migrations()).await?;
    let versions: Vec<i64> = report.applied.iter().map(|a| a.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(report.already_applied, 0);

    let users = column_names(&db, "users").await?;
    for column in ["tg_id", "name", "gender", "age", "vk_id", "username", "registered_at", "created_at", "updated_at"] {
        assert!(users.iter().any(|c| c == column), "users.{column} missing");
    }
    assert!(!users.iter().any(|c| c == "birthdate"));

    assert_eq!(
        column_names(&db, "posters").await?,
        vec!["id", "file_id", "caption", "ticket_url", "created_at", "is_active"]
    );
    assert_eq!(
        column_names(&db, "attendances").await?,
        vec!["id", "user_id", "poster_id", "marked_at"]
    );

    assert_eq!(ledger_versions(&db).await?, vec![1, 2, 3, 4, 5, 6, 7]);

    Ok(())
}

#[tokio::test]
async fn test_second_run_is_a_no_op() -> Result<()> {
    let (db, _temp_dir) = empty_db().await?;

    db.run_migrations(&project_migrations()).await?;
    let before = schema_snapshot(&db).await?;

    let report = db.run_migrations(&project_migrations()).await?;
    assert!(report.is_up_to_date());
    assert_eq!(report.already_applied, 7);

    assert_eq!(schema_snapshot(&db).await?, before);
    assert_eq!(ledger_versions(&db).await?, vec![1, 2, 3, 4, 5, 6, 7]);

    Ok(())
}

#[tokio::test]
async fn test_failing_unit_stops_the_run() -> Result<()> {
    let (db, temp_dir) = empty_db().await?;
    let dir = temp_dir.path().join("migrations");
    fs::create_dir(&dir)?;
    write_units(
        &dir,
        &[
            ("0001_create_first.sql", "CREATE TABLE first (id INTEGER PRIMARY KEY);"),
            (
                "0002_broken.sql",
                "CREATE TABLE half_done (id INTEGER PRIMARY KEY);\nINSERT INTO no_such_table VALUES (1);",
            ),
            ("0003_create_third.sql", "CREATE TABLE third (id INTEGER PRIMARY KEY);"),
        ],
    )?;

    let migrator = Migrator::new(MigrationSet::from_dir(&dir)?);
    let error = migrator.run(&db.pool).await.unwrap_err();
    match &error {
        MigrationError::Failed { version, description, .. } => {
            assert_eq!(*version, 2);
            assert_eq!(description, "broken");
        }
        other => panic!("expected a failed unit, got {other:?}"),
    }
    assert!(error.to_string().contains("no_such_table"));

    // The unit before the failure stays applied; the failing unit leaves nothing behind.
    assert!(table_exists(&db, "first").await?);
    assert!(!table_exists(&db, "half_done").await?);
    assert!(!table_exists(&db, "third").await?);
    assert_eq!(ledger_versions(&db).await?, vec![1]);

    // Fixing the unit lets a later run pick up where this one stopped.
    write_units(&dir, &[("0002_broken.sql", "CREATE TABLE half_done (id INTEGER PRIMARY KEY);")])?;
    let migrator = Migrator::new(MigrationSet::from_dir(&dir)?);
    let report = migrator.run(&db.pool).await?;
    let versions: Vec<i64> = report.applied.iter().map(|a| a.version).collect();
    assert_eq!(versions, vec![2, 3]);
    assert_eq!(report.already_applied, 1);
    assert!(table_exists(&db, "third").await?);

    Ok(())
}

#[tokio::test]
async fn test_modified_unit_is_detected() -> Result<()> {
    let (db, temp_dir) = empty_db().await?;
    let dir = temp_dir.path().join("migrations");
    fs::create_dir(&dir)?;
    write_units(&dir, &[("0001_create_first.sql", "CREATE TABLE first (id INTEGER PRIMARY KEY);")])?;

    Migrator::new(MigrationSet::from_dir(&dir)?).run(&db.pool).await?;

    write_units(
        &dir,
        &[
            ("0001_create_first.sql", "CREATE TABLE first (id INTEGER PRIMARY KEY, extra TEXT);"),
            ("0002_create_second.sql", "CREATE TABLE second (id INTEGER PRIMARY KEY);"),
        ],
    )?;

    let result = Migrator::new(MigrationSet::from_dir(&dir)?).run(&db.pool).await;
    assert!(matches!(result, Err(MigrationError::ChecksumMismatch { version: 1, .. })));
    assert!(!table_exists(&db, "second").await?);

    Ok(())
}

#[tokio::test]
async fn test_status_lists_pending_units() -> Result<()> {
    let (db, _temp_dir) = empty_db().await?;
    let migrator = Migrator::new(MigrationSet::from_dir(&project_migrations())?);

    // Status is read-only: no ledger is created on a fresh database.
    let statuses = migrator.status(&db.pool).await?;
    assert_eq!(statuses.len(), 7);
    assert!(statuses.iter().all(|s| s.applied_at.is_none()));
    assert!(!table_exists(&db, LEDGER_TABLE).await?);

    migrator.run(&db.pool).await?;
    let statuses = migrator.status(&db.pool).await?;
    assert!(statuses.iter().all(|s| s.applied_at.is_some()));
    assert_eq!(statuses[3].description, "add username column");

    Ok(())
}

#[tokio::test]
async fn test_baseline_adopts_existing_schema() -> Result<()> {
    let (db, _temp_dir) = empty_db().await?;
    let migrator = Migrator::new(MigrationSet::from_dir(&project_migrations())?);

    // A database built by hand before the ledger existed.
    sqlx::raw_sql(
        r#"
        CREATE TABLE users (
            tg_id INTEGER PRIMARY KEY,
            name TEXT,
            gender TEXT,
            vk_id TEXT,
            username TEXT,
            age INTEGER,
            registered_at TEXT,
            created_at TEXT,
            updated_at TEXT
        );
        CREATE TABLE posters (id INTEGER PRIMARY KEY AUTOINCREMENT, file_id TEXT NOT NULL);
        "#,
    )
    .execute(&db.pool)
    .await?;

    let error = migrator.run(&db.pool).await.unwrap_err();
    assert!(matches!(error, MigrationError::Failed { version: 4, .. }));
    assert_eq!(ledger_versions(&db).await?, vec![1, 2, 3]);

    assert!(matches!(
        migrator.baseline(&db.pool, 42).await,
        Err(MigrationError::UnknownVersion(42))
    ));

    let recorded = migrator.baseline(&db.pool, 5).await?;
    assert_eq!(recorded, 2);
    assert_eq!(ledger_versions(&db).await?, vec![1, 2, 3, 4, 5]);

    // Units newer than the baseline still run.
    let report = migrator.run(&db.pool).await?;
    let versions: Vec<i64> = report.applied.iter().map(|a| a.version).collect();
    assert_eq!(versions, vec![6, 7]);
    assert_eq!(report.already_applied, 5);

    let report = migrator.run(&db.pool).await?;
    assert!(report.is_up_to_date());

    Ok(())
}

#[tokio::test]
async fn test_loading_rejects_bad_directories() -> Result<()> {
    let temp_dir = tempdir()?;

    let missing = MigrationSet::from_dir(&temp_dir.path().join("nope"));
    assert!(matches!(missing, Err(MigrationError::Io { .. })));

    let dir = temp_dir.path().join("bad_name");
    fs::create_dir(&dir)?;
    write_units(&dir, &[("create_users.sql", "SELECT 1;")])?;
    assert!(matches!(
        MigrationSet::from_dir(&dir),
        Err(MigrationError::InvalidFileName(_))
    ));

    let dir = temp_dir.path().join("duplicates");
    fs::create_dir(&dir)?;
    write_units(&dir, &[("0003_a.sql", "SELECT 1;"), ("3_b.sql", "SELECT 2;")])?;
    assert!(matches!(
        MigrationSet::from_dir(&dir),
        Err(MigrationError::DuplicateVersion { version: 3, .. })
    ));

    let dir = temp_dir.path().join("mixed");
    fs::create_dir(&dir)?;
    write_units(&dir, &[("0001_a.sql", "SELECT 1;"), ("README.md", "notes")])?;
    assert_eq!(MigrationSet::from_dir(&dir)?.units().len(), 1);

    Ok(())
}
