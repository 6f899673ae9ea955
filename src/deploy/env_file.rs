use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::DeployError;

/// Copies the environment file out of the checkout before a destructive sync.
///
/// The copy is named after the run so earlier backups are never overwritten.
pub async fn backup_env_file(
    env_file: &Path,
    backup_dir: &Path,
    run_id: Uuid,
) -> Result<PathBuf, DeployError> {
    let name = env_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "env".to_string());
    let target = backup_dir.join(format!("{name}.{run_id}.bak"));

    fs::create_dir_all(backup_dir)
        .await
        .map_err(|source| DeployError::EnvFile {
            action: "create backup directory",
            path: backup_dir.to_path_buf(),
            source,
        })?;
    fs::copy(env_file, &target)
        .await
        .map_err(|source| DeployError::EnvFile {
            action: "back up",
            path: env_file.to_path_buf(),
            source,
        })?;

    Ok(target)
}

/// Puts a backed-up environment file back in place. The backup is kept.
pub async fn restore_env_file(backup: &Path, env_file: &Path) -> Result<(), DeployError> {
    if let Some(parent) = env_file.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| DeployError::EnvFile {
                action: "create directory for",
                path: env_file.to_path_buf(),
                source,
            })?;
    }
    fs::copy(backup, env_file)
        .await
        .map_err(|source| DeployError::EnvFile {
            action: "restore",
            path: env_file.to_path_buf(),
            source,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_backup_and_restore_round_trip() {
        let checkout = tempdir().unwrap();
        let backups = tempdir().unwrap();
        let env_file = checkout.path().join(".env");
        std::fs::write(&env_file, "TELEGRAM_BOT_TOKEN=secret\n").unwrap();

        let run_id = Uuid::new_v4();
        let backup = backup_env_file(&env_file, backups.path(), run_id).await.unwrap();
        assert_eq!(backup, backups.path().join(format!(".env.{run_id}.bak")));

        std::fs::remove_file(&env_file).unwrap();
        restore_env_file(&backup, &env_file).await.unwrap();

        assert_eq!(std::fs::read_to_string(&env_file).unwrap(), "TELEGRAM_BOT_TOKEN=secret\n");
        assert!(backup.exists());
    }

    #[tokio::test]
    async fn test_backup_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = backup_env_file(&dir.path().join(".env"), dir.path(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(DeployError::EnvFile { action: "back up", .. })));
    }
}
