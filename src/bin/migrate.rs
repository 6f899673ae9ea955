//! # TusaBot Migration Tool
//!
//! Applies, lists and baselines the schema migration units of the bot database.

use anyhow::{anyhow, Result};
use std::env;
use std::io;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tusabot_ops::config::Config;
use tusabot_ops::database::connection::DatabaseManager;
use tusabot_ops::database::migrations::{MigrationSet, Migrator, LEDGER_TABLE};
use tusabot_ops::utils::mask::mask_url;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tusabot_ops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("migrate");

    let result = match command {
        "migrate" | "up" => run_migrations().await,
        "status" => show_status().await,
        "check" => check_database().await,
        "baseline" => match args.get(2).map(|v| v.trim().parse::<i64>()) {
            Some(Ok(version)) => baseline(version).await,
            _ => Err(anyhow!("baseline requires a numeric version, e.g. `migrate baseline 5`")),
        },
        "reset" => reset_database().await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {command}");
            print_help();
            std::process::exit(1);
        }
    };

    // The failing unit's error is printed verbatim; the exit code tells the caller.
    if let Err(e) = result {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn load() -> Result<(Config, Migrator)> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let migrator = Migrator::new(MigrationSet::from_dir(&config.migrations_dir)?);
    Ok((config, migrator))
}

async fn connect(config: &Config) -> Result<DatabaseManager> {
    DatabaseManager::new(&config.database_url)
        .await
        .map_err(|e| anyhow!("Failed to connect to database: {}", e))
}

async fn run_migrations() -> Result<()> {
    println!("🔧 TusaBot - Database Migration Tool");
    println!("====================================");

    let (config, migrator) = load()?;
    println!("📊 Database URL: {}", mask_url(&config.database_url));
    println!(
        "📂 Migrations: {} ({} units)",
        config.migrations_dir.display(),
        migrator.set().units().len()
    );

    let db = connect(&config).await?;

    println!("🚀 Running database migrations...");
    let report = migrator.run(&db.pool).await?;

    for applied in &report.applied {
        println!("  ✅ {:>4} {} ({}ms)", applied.version, applied.description, applied.execution_ms);
    }
    if report.is_up_to_date() {
        println!("✅ Database already up to date ({} applied)", report.already_applied);
    } else {
        println!("✅ Applied {} migration(s)", report.applied.len());
    }

    Ok(())
}

async fn show_status() -> Result<()> {
    let (config, migrator) = load()?;
    println!("📊 Database URL: {}", mask_url(&config.database_url));

    let db = connect(&config).await?;
    let statuses = migrator.status(&db.pool).await?;

    let pending = statuses.iter().filter(|s| s.applied_at.is_none()).count();
    for status in &statuses {
        match &status.applied_at {
            Some(at) => println!("  ✅ {:>4} {} (applied {})", status.version, status.description, at),
            None => println!("  ⏳ {:>4} {} (pending)", status.version, status.description),
        }
    }
    println!("📋 {} pending of {}", pending, statuses.len());

    Ok(())
}

async fn check_database() -> Result<()> {
    println!("🔍 Checking database connection and schema...");

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    println!("📊 Database URL: {}", mask_url(&config.database_url));
    let server = &config.server;
    println!(
        "🔑 Server settings: {}@{}:{} (password {}), not used by the SQLite store",
        server.user,
        server.host,
        server.port,
        if server.password.is_some() { "set" } else { "not set" }
    );

    let db = connect(&config).await?;

    match check_tables(&db).await {
        Ok(tables) => {
            println!("✅ Database connection successful!");
            println!("📋 Found tables:");
            for table in &tables {
                println!("  • {table}");
            }
            if !tables.iter().any(|t| t == LEDGER_TABLE) {
                println!("💡 No {LEDGER_TABLE} table yet - run 'migrate up', or 'migrate baseline <version>' for an existing schema");
            }
        }
        Err(e) => {
            println!("⚠️  Database check failed: {e}");
            println!("💡 Try running 'migrate up' to create the schema");
        }
    }

    Ok(())
}

async fn baseline(version: i64) -> Result<()> {
    let (config, migrator) = load()?;
    println!("📊 Database URL: {}", mask_url(&config.database_url));

    let db = connect(&config).await?;
    let recorded = migrator.baseline(&db.pool, version).await?;
    println!("✅ Recorded {recorded} migration(s) up to version {version} as applied");

    Ok(())
}

async fn reset_database() -> Result<()> {
    println!("⚠️  WARNING: This will delete ALL data in the database!");
    println!("🤔 Are you sure you want to continue? (yes/no)");

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    if input.trim().to_lowercase() != "yes" {
        println!("❌ Reset cancelled.");
        return Ok(());
    }

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // For SQLite, we can just delete the file
    let Some(db_path) = config.database_url.strip_prefix("sqlite:") else {
        return Err(anyhow!("Reset is only supported for SQLite databases"));
    };
    let db_path = db_path.strip_prefix("//").unwrap_or(db_path);
    if Path::new(db_path).exists() {
        std::fs::remove_file(db_path)?;
        println!("🗑️  Deleted database file: {db_path}");
    }

    println!("🔄 Recreating database schema...");
    run_migrations().await?;

    println!("✅ Database reset completed!");

    Ok(())
}

async fn check_tables(db: &DatabaseManager) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&db.pool)
    .await?;

    Ok(tables)
}

fn print_help() {
    println!("🎉 TusaBot - Database Migration Tool");
    println!();
    println!("USAGE:");
    println!("    migrate [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    migrate, up          Apply pending migrations (default)");
    println!("    status               List migrations and whether they are applied");
    println!("    check                Check database connection and schema");
    println!("    baseline <version>   Mark migrations up to <version> as applied without running them");
    println!("    reset                Reset database (SQLite only) - DESTRUCTIVE!");
    println!("    help                 Show this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    DATABASE_URL     Database connection string (default: sqlite:<DB_DIR>/<DB_NAME>.db)");
    println!("    DB_NAME          Database name (default: largent)");
    println!("    DB_DIR           Directory for the database file (default: ./data)");
    println!("    DB_HOST, DB_PORT Server address (default: 127.0.0.1, 5432), validated and reported");
    println!("    DB_USER          Database user (default: tusabot_user)");
    println!("    DB_PASSWORD      Database password (no default)");
    println!("    MIGRATIONS_DIR   Directory of <version>_<description>.sql files (default: ./migrations)");
    println!();
    println!("EXAMPLES:");
    println!("    migrate                    # Apply pending migrations");
    println!("    migrate status             # Show applied and pending migrations");
    println!("    migrate baseline 5         # Adopt a database created before the ledger existed");
    println!();
}
