use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::utils::mask::mask_url;

const DEFAULT_DB_NAME: &str = "largent";
const DEFAULT_DB_DIR: &str = "./data";
const DEFAULT_DB_HOST: &str = "127.0.0.1";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_USER: &str = "tusabot_user";
const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

/// Keys that select the bot's database. An environment file defining any of
/// them takes over database resolution for a deployment.
pub const DATABASE_KEYS: &[&str] = &[
    "DATABASE_URL",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_DIR",
];

/// Server-style connection settings the bot's environment carries.
///
/// The SQLite store is addressed by file, so these are validated and reported
/// but do not take part in connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// `DB_HOST`, default `127.0.0.1`.
    pub host: String,
    /// `DB_PORT`, default `5432`.
    pub port: u16,
    /// `DB_USER`, default `tusabot_user`.
    pub user: String,
    /// `DB_PASSWORD`. No default.
    pub password: Option<String>,
}

/// Database and migration settings shared by both binaries.
#[derive(Debug, Clone)]
pub struct Config {
    /// sqlx connection URL of the SQLite store.
    pub database_url: String,
    /// Directory holding the migration units.
    pub migrations_dir: PathBuf,
    /// Host, port and credentials from the environment.
    pub server: ServerSettings,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let name = var("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
        let name = name.trim();
        if name.contains('/') || name.contains('\\') {
            return Err(anyhow!("Invalid DB_NAME: must not contain path separators"));
        }

        let database_url = match var("DATABASE_URL") {
            Some(url) => {
                let url = url.trim().to_string();
                if !url.starts_with("sqlite:") {
                    return Err(anyhow!(
                        "Unsupported DATABASE_URL {}: only sqlite: URLs are supported",
                        mask_url(&url)
                    ));
                }
                url
            }
            None => {
                let dir = var("DB_DIR").unwrap_or_else(|| DEFAULT_DB_DIR.to_string());
                format!("sqlite:{}/{}.db", dir.trim().trim_end_matches('/'), name)
            }
        };

        let port = match var("DB_PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| anyhow!("Invalid DB_PORT '{}': must be a port number", value.trim()))?,
            None => DEFAULT_DB_PORT,
        };
        let server = ServerSettings {
            host: var("DB_HOST")
                .map(|host| host.trim().to_string())
                .unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            port,
            user: var("DB_USER")
                .map(|user| user.trim().to_string())
                .unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
            password: var("DB_PASSWORD"),
        };

        let migrations_dir = var("MIGRATIONS_DIR")
            .map(|dir| PathBuf::from(dir.trim()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR));

        Ok(Config {
            database_url,
            migrations_dir,
            server,
        })
    }

    /// Resolves a relative SQLite path against `base` instead of the current directory.
    pub fn anchored_at(mut self, base: &Path) -> Self {
        self.database_url = anchor_sqlite_url(&self.database_url, base);
        self
    }
}

/// What the orchestrator does when the migrating step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationFailurePolicy {
    /// Record the failure and start the service anyway.
    #[default]
    Continue,
    /// Stop the deployment without starting the service.
    Abort,
}

impl std::str::FromStr for MigrationFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(anyhow!(
                "Invalid DEPLOY_ON_MIGRATION_FAILURE '{}': expected 'abort' or 'continue'",
                other
            )),
        }
    }
}

/// Settings for one deployment run of the bot service.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Database settings from the deploy tool's own environment.
    pub database: Config,
    /// Working copy of the bot's repository.
    pub checkout_dir: PathBuf,
    /// Supervisor unit name.
    pub service: String,
    /// Git remote to fetch from.
    pub remote: String,
    /// Branch deployed from `remote`.
    pub branch: String,
    /// Relative paths are resolved against `checkout_dir`. `None` means the
    /// service receives its configuration some other way.
    pub env_file: Option<PathBuf>,
    /// Where an environment file inside the checkout is copied during the sync.
    pub backup_dir: PathBuf,
    /// Program followed by its arguments.
    pub install_command: Option<Vec<String>>,
    /// Relative to `checkout_dir` unless absolute.
    pub migrations_dir: PathBuf,
    /// Behavior after a failed migrating step.
    pub on_migration_failure: MigrationFailurePolicy,
    /// Supervisor CLI.
    pub systemctl: String,
    /// Git CLI.
    pub git: String,
}

impl DeployConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        let database = Config::from_env()?;

        let checkout_dir = PathBuf::from(var_or("DEPLOY_CHECKOUT_DIR", "/opt/tusabot"));

        let service = var_or("DEPLOY_SERVICE", "tusabot");
        if service.trim().is_empty() || service.contains(char::is_whitespace) {
            return Err(anyhow!("Invalid DEPLOY_SERVICE '{}'", service));
        }

        // An explicitly empty value disables the copy-aside step.
        let env_file = match env::var("DEPLOY_ENV_FILE") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(PathBuf::from(value.trim())),
            Err(_) => Some(PathBuf::from(".env")),
        };

        let install_command = match env::var("DEPLOY_INSTALL_CMD") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(split_command(&value)),
            Err(_) => Some(split_command("venv/bin/pip install -r requirements.txt")),
        };

        let on_migration_failure = match non_empty_var("DEPLOY_ON_MIGRATION_FAILURE") {
            Some(value) => value.parse()?,
            None => MigrationFailurePolicy::default(),
        };

        Ok(DeployConfig {
            database,
            checkout_dir,
            service,
            remote: var_or("DEPLOY_REMOTE", "origin"),
            branch: var_or("DEPLOY_BRANCH", "main"),
            env_file,
            backup_dir: non_empty_var("DEPLOY_BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            install_command,
            migrations_dir: PathBuf::from(var_or("DEPLOY_MIGRATIONS_DIR", "migrations")),
            on_migration_failure,
            systemctl: var_or("DEPLOY_SYSTEMCTL", "systemctl"),
            git: var_or("DEPLOY_GIT", "git"),
        })
    }

    /// Environment file path with relative paths anchored at the checkout.
    pub fn resolved_env_file(&self) -> Option<PathBuf> {
        self.env_file.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.checkout_dir.join(path)
            }
        })
    }

    /// Migrations directory with relative paths anchored at the checkout.
    pub fn resolved_migrations_dir(&self) -> PathBuf {
        if self.migrations_dir.is_absolute() {
            self.migrations_dir.clone()
        } else {
            self.checkout_dir.join(&self.migrations_dir)
        }
    }

    /// Database the service itself will use.
    ///
    /// When the service's environment file defines any database key, the
    /// settings come from that file, falling back to the process environment
    /// for keys it leaves out, and relative SQLite paths are taken from the
    /// checkout. Otherwise [`DeployConfig::database`] applies.
    pub fn database_config(&self) -> Result<Config> {
        let Some(path) = self.resolved_env_file() else {
            return Ok(self.database.clone());
        };
        if !path.is_file() {
            return Ok(self.database.clone());
        }

        let vars = read_env_file(&path)?;
        if !DATABASE_KEYS.iter().any(|key| vars.contains_key(*key)) {
            return Ok(self.database.clone());
        }

        let config = Config::from_lookup(|key| vars.get(key).cloned().or_else(|| env::var(key).ok()))
            .with_context(|| format!("Invalid database settings in {}", path.display()))?;
        Ok(config.anchored_at(&self.checkout_dir))
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    dotenvy::from_path_iter(path)
        .and_then(|iter| iter.collect::<Result<HashMap<_, _>, _>>())
        .with_context(|| format!("Failed to read environment file {}", path.display()))
}

fn anchor_sqlite_url(url: &str, base: &Path) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };
    if path.is_empty() || path.starts_with(":memory:") || Path::new(path).is_absolute() {
        return url.to_string();
    }

    let anchored = base.join(path);
    match query {
        Some(query) => format!("sqlite:{}?{}", anchored.display(), query),
        None => format!("sqlite:{}", anchored.display()),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    non_empty_var(key)
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| default.to_string())
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
