use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;
use tusabot_ops::config::{Config, DeployConfig, MigrationFailurePolicy};

// Mutex to ensure config tests run sequentially to avoid environment variable conflicts
static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

const ALL_VARS: &[&str] = &[
    "DATABASE_URL",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_DIR",
    "MIGRATIONS_DIR",
    "DEPLOY_CHECKOUT_DIR",
    "DEPLOY_SERVICE",
    "DEPLOY_REMOTE",
    "DEPLOY_BRANCH",
    "DEPLOY_ENV_FILE",
    "DEPLOY_BACKUP_DIR",
    "DEPLOY_INSTALL_CMD",
    "DEPLOY_MIGRATIONS_DIR",
    "DEPLOY_ON_MIGRATION_FAILURE",
    "DEPLOY_SYSTEMCTL",
    "DEPLOY_GIT",
];

fn clear_env() {
    for var in ALL_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_config_from_env_with_database_url() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    env::set_var("DATABASE_URL", "sqlite:test.db");
    env::set_var("MIGRATIONS_DIR", "/srv/tusabot/migrations");

    let config = Config::from_env().unwrap();

    assert_eq!(config.database_url, "sqlite:test.db");
    assert_eq!(config.migrations_dir, PathBuf::from("/srv/tusabot/migrations"));

    clear_env();
}

#[test]
fn test_config_from_env_with_defaults() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    let config = Config::from_env().unwrap();

    assert_eq!(config.database_url, "sqlite:./data/largent.db");
    assert_eq!(config.migrations_dir, PathBuf::from("./migrations"));
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 5432);
    assert_eq!(config.server.user, "tusabot_user");
    assert_eq!(config.server.password, None);
}

#[test]
fn test_config_reads_server_settings() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    env::set_var("DB_HOST", "db.internal");
    env::set_var("DB_PORT", "6432");
    env::set_var("DB_USER", "bot");
    env::set_var("DB_PASSWORD", "hunter2");

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.host, "db.internal");
    assert_eq!(config.server.port, 6432);
    assert_eq!(config.server.user, "bot");
    assert_eq!(config.server.password.as_deref(), Some("hunter2"));

    env::set_var("DB_PORT", "postgres");
    let error_msg = Config::from_env().unwrap_err().to_string();
    assert!(error_msg.contains("Invalid DB_PORT"));

    clear_env();
}

#[test]
fn test_config_builds_url_from_db_name() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    env::set_var("DB_NAME", "tusabot");
    env::set_var("DB_DIR", "/var/lib/tusabot/");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database_url, "sqlite:/var/lib/tusabot/tusabot.db");

    clear_env();
}

#[test]
fn test_config_invalid_db_name() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    env::set_var("DB_NAME", "../escape");

    let result = Config::from_env();
    assert!(result.is_err());

    let error_msg = result.unwrap_err().to_string();
    assert!(error_msg.contains("Invalid DB_NAME"));

    clear_env();
}

#[test]
fn test_deploy_config_defaults() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    let config = DeployConfig::from_env().unwrap();

    assert_eq!(config.checkout_dir, PathBuf::from("/opt/tusabot"));
    assert_eq!(config.service, "tusabot");
    assert_eq!(config.remote, "origin");
    assert_eq!(config.branch, "main");
    assert_eq!(config.env_file, Some(PathBuf::from(".env")));
    assert_eq!(config.resolved_env_file(), Some(PathBuf::from("/opt/tusabot/.env")));
    assert_eq!(config.resolved_migrations_dir(), PathBuf::from("/opt/tusabot/migrations"));
    assert_eq!(config.on_migration_failure, MigrationFailurePolicy::Continue);
    assert_eq!(
        config.install_command,
        Some(vec![
            "venv/bin/pip".to_string(),
            "install".to_string(),
            "-r".to_string(),
            "requirements.txt".to_string(),
        ])
    );
    assert_eq!(config.backup_dir, env::temp_dir());
}

#[test]
fn test_deploy_config_overrides() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    env::set_var("DEPLOY_CHECKOUT_DIR", "/home/bot/tusabot");
    env::set_var("DEPLOY_ENV_FILE", "/etc/tusabot/bot.env");
    env::set_var("DEPLOY_INSTALL_CMD", "");
    env::set_var("DEPLOY_MIGRATIONS_DIR", "/home/bot/schema");
    env::set_var("DEPLOY_ON_MIGRATION_FAILURE", "abort");
    env::set_var("DEPLOY_BACKUP_DIR", "/var/backups/tusabot");

    let config = DeployConfig::from_env().unwrap();

    assert_eq!(config.resolved_env_file(), Some(PathBuf::from("/etc/tusabot/bot.env")));
    assert_eq!(config.install_command, None);
    assert_eq!(config.resolved_migrations_dir(), PathBuf::from("/home/bot/schema"));
    assert_eq!(config.on_migration_failure, MigrationFailurePolicy::Abort);
    assert_eq!(config.backup_dir, PathBuf::from("/var/backups/tusabot"));

    clear_env();
}

#[test]
fn test_deploy_config_empty_env_file_disables_backup() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    env::set_var("DEPLOY_ENV_FILE", "");

    let config = DeployConfig::from_env().unwrap();
    assert_eq!(config.env_file, None);
    assert_eq!(config.resolved_env_file(), None);

    clear_env();
}

#[test]
fn test_deploy_config_invalid_values() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    env::set_var("DEPLOY_ON_MIGRATION_FAILURE", "retry");
    let error_msg = DeployConfig::from_env().unwrap_err().to_string();
    assert!(error_msg.contains("Invalid DEPLOY_ON_MIGRATION_FAILURE"));
    env::remove_var("DEPLOY_ON_MIGRATION_FAILURE");

    env::set_var("DEPLOY_SERVICE", "tusa bot");
    let error_msg = DeployConfig::from_env().unwrap_err().to_string();
    assert!(error_msg.contains("Invalid DEPLOY_SERVICE"));

    clear_env();
}

#[test]
fn test_deploy_database_follows_service_env_file() {
    let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
    clear_env();

    let temp_dir = tempdir().unwrap();
    let checkout = temp_dir.path().join("checkout");
    fs::create_dir_all(&checkout).unwrap();
    env::set_var("DEPLOY_CHECKOUT_DIR", &checkout);
    env::set_var("DB_USER", "from_process");

    let config = DeployConfig::from_env().unwrap();

    // No env file yet: the process settings are used as they are.
    let database = config.database_config().unwrap();
    assert_eq!(database.database_url, "sqlite:./data/largent.db");

    // An env file without database keys changes nothing.
    fs::write(checkout.join(".env"), "BOT_TOKEN=secret\n").unwrap();
    let database = config.database_config().unwrap();
    assert_eq!(database.database_url, "sqlite:./data/largent.db");

    // Relative locations in the file are taken from the checkout.
    fs::write(
        checkout.join(".env"),
        "BOT_TOKEN=secret\nDB_DIR=./data\nDB_NAME=service\nDB_PORT=5433\n",
    )
    .unwrap();
    let database = config.database_config().unwrap();
    assert_eq!(
        database.database_url,
        format!("sqlite:{}", checkout.join("./data/service.db").display())
    );
    assert_eq!(database.server.port, 5433);
    assert_eq!(database.server.user, "from_process");

    fs::write(checkout.join(".env"), "DB_PORT=not-a-port\n").unwrap();
    let error = config.database_config().unwrap_err();
    assert!(format!("{error:#}").contains("Invalid DB_PORT"));

    clear_env();
}
