use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::command::{run_checked, run_unchecked};
use super::{
    backup_env_file, restore_env_file, CommandOutput, CommandRunner, CommandSpec, DeployError, DeployReport,
    DeployState, GitCheckout, StepOutcome, Supervisor,
};
use crate::config::{Config, DeployConfig, MigrationFailurePolicy};
use crate::database::connection::DatabaseManager;
use crate::database::migrations::{MigrationSet, Migrator};
use crate::utils::logging::{log_step_start, log_system_event};
use crate::utils::mask::mask_url;

/// Where the service's environment file lives relative to the checkout.
enum EnvFilePlacement {
    None,
    /// Overwritten by the sync, so it is copied aside and restored.
    InsideCheckout(PathBuf),
    External(PathBuf),
}

/// Mutable state carried between the steps of one run.
struct RunContext {
    report: DeployReport,
    env_backup: Option<PathBuf>,
}

impl RunContext {
    fn fail(&mut self, state: DeployState, step: &'static str, error: &DeployError) -> DeployState {
        self.report.record(state, step, StepOutcome::Failed, Some(error.to_string()));
        DeployState::Failed
    }
}

/// Drives one service through the deployment lifecycle.
pub struct Deployer {
    config: DeployConfig,
    runner: Arc<dyn CommandRunner>,
    supervisor: Supervisor,
    git: GitCheckout,
}

impl Deployer {
    /// External commands go through `runner`.
    pub fn new(config: DeployConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let supervisor = Supervisor::new(&config.systemctl, &config.service);
        let git = GitCheckout::new(&config.git, &config.checkout_dir, &config.remote, &config.branch);
        Self {
            config,
            runner,
            supervisor,
            git,
        }
    }

    /// Runs one deployment to completion. Failures are reported, never returned.
    pub async fn run(&self) -> DeployReport {
        let mut ctx = RunContext {
            report: DeployReport::new(self.supervisor.service()),
            env_backup: None,
        };
        let span = tracing::info_span!("deploy", run_id = %ctx.report.run_id);

        async move {
            log_system_event(
                "Deployment started",
                Some(&format!(
                    "service {} from {}/{} into {}",
                    self.supervisor.service(),
                    self.config.remote,
                    self.config.branch,
                    self.config.checkout_dir.display()
                )),
            );

            let mut state = DeployState::Idle;
            while !state.is_terminal() {
                log_step_start(state.as_str(), None);
                state = self.enter(state, &mut ctx).await;
            }

            let report = ctx.report.finish(state);
            log_system_event("Deployment finished", Some(&format!("final state {}", report.final_state)));
            report
        }
        .instrument(span)
        .await
    }

    /// Queries the supervisor without changing anything.
    pub async fn service_status(&self) -> Result<CommandOutput, DeployError> {
        run_unchecked(self.runner.as_ref(), &self.supervisor.status_command()).await
    }

    async fn enter(&self, state: DeployState, ctx: &mut RunContext) -> DeployState {
        match state {
            DeployState::Idle => match self.preflight().await {
                Ok(()) => {
                    ctx.report.record(state, "preflight", StepOutcome::Succeeded, None);
                    state.next()
                }
                Err(e) => ctx.fail(state, "preflight", &e),
            },

            DeployState::Stopping => {
                let command = self.supervisor.stop_command();
                match run_checked(self.runner.as_ref(), &command).await {
                    Ok(_) => ctx.report.record(state, "stop service", StepOutcome::Succeeded, None),
                    // The service may simply not be running.
                    Err(e) => ctx.report.record(state, "stop service", StepOutcome::Tolerated, Some(e.to_string())),
                }
                state.next()
            }

            DeployState::Syncing => {
                if let EnvFilePlacement::InsideCheckout(env_file) = self.env_file_placement() {
                    match backup_env_file(&env_file, &self.config.backup_dir, ctx.report.run_id).await {
                        Ok(backup) => {
                            ctx.report.record(
                                state,
                                "back up configuration",
                                StepOutcome::Succeeded,
                                Some(backup.display().to_string()),
                            );
                            ctx.env_backup = Some(backup);
                        }
                        Err(e) => ctx.report.record(
                            state,
                            "back up configuration",
                            StepOutcome::Tolerated,
                            Some(e.to_string()),
                        ),
                    }
                }

                if let Err(e) = run_checked(self.runner.as_ref(), &self.git.fetch_command()).await {
                    return ctx.fail(state, "fetch", &e);
                }
                ctx.report.record(state, "fetch", StepOutcome::Succeeded, None);

                if let Err(e) = run_checked(self.runner.as_ref(), &self.git.reset_command()).await {
                    return ctx.fail(state, "reset", &e);
                }
                ctx.report.record(state, "reset", StepOutcome::Succeeded, None);
                state.next()
            }

            DeployState::Configuring => {
                match (self.env_file_placement(), ctx.env_backup.clone()) {
                    (EnvFilePlacement::InsideCheckout(env_file), Some(backup)) => {
                        if let Err(e) = restore_env_file(&backup, &env_file).await {
                            return ctx.fail(state, "restore configuration", &e);
                        }
                        ctx.report.record(
                            state,
                            "restore configuration",
                            StepOutcome::Succeeded,
                            Some(env_file.display().to_string()),
                        );
                    }
                    (EnvFilePlacement::InsideCheckout(_), None) => ctx.report.record(
                        state,
                        "restore configuration",
                        StepOutcome::Skipped,
                        Some("no backup was taken".to_string()),
                    ),
                    (EnvFilePlacement::External(env_file), _) => ctx.report.record(
                        state,
                        "restore configuration",
                        StepOutcome::Skipped,
                        Some(format!("configuration supplied from {}", env_file.display())),
                    ),
                    (EnvFilePlacement::None, _) => ctx.report.record(
                        state,
                        "restore configuration",
                        StepOutcome::Skipped,
                        Some("no environment file configured".to_string()),
                    ),
                }
                state.next()
            }

            DeployState::InstallingDeps => {
                let Some(command) = self.install_command() else {
                    ctx.report.record(
                        state,
                        "install dependencies",
                        StepOutcome::Skipped,
                        Some("no install command configured".to_string()),
                    );
                    return state.next();
                };

                match run_checked(self.runner.as_ref(), &command).await {
                    Ok(_) => {
                        ctx.report.record(state, "install dependencies", StepOutcome::Succeeded, Some(command.to_string()));
                        state.next()
                    }
                    Err(e) => ctx.fail(state, "install dependencies", &e),
                }
            }

            DeployState::Migrating => match self.migrate(ctx).await {
                Ok(()) => state.next(),
                Err(e) => {
                    ctx.report.record(state, "apply migrations", StepOutcome::Failed, Some(e.to_string()));
                    match self.config.on_migration_failure {
                        MigrationFailurePolicy::Abort => {
                            for (skipped_state, step) in [
                                (DeployState::Starting, "start service"),
                                (DeployState::Verifying, "query status"),
                            ] {
                                ctx.report.record(
                                    skipped_state,
                                    step,
                                    StepOutcome::Skipped,
                                    Some("migration failed; service left stopped".to_string()),
                                );
                            }
                            DeployState::Failed
                        }
                        MigrationFailurePolicy::Continue => {
                            warn!("Starting the service despite the failed migration");
                            state.next()
                        }
                    }
                }
            },

            DeployState::Starting => {
                match run_checked(self.runner.as_ref(), &self.supervisor.start_command()).await {
                    Ok(_) => {
                        ctx.report.record(state, "start service", StepOutcome::Succeeded, None);
                        state.next()
                    }
                    Err(e) => ctx.fail(state, "start service", &e),
                }
            }

            DeployState::Verifying => {
                // Observational only: whatever the supervisor says, the run is done.
                match run_unchecked(self.runner.as_ref(), &self.supervisor.status_command()).await {
                    Ok(output) => {
                        let status = output.stdout.trim().to_string();
                        if output.success() {
                            ctx.report.record(state, "query status", StepOutcome::Succeeded, None);
                        } else {
                            ctx.report.record(
                                state,
                                "query status",
                                StepOutcome::Tolerated,
                                Some(format!("supervisor exited with {}", output.status_text())),
                            );
                        }
                        info!("Service status:\n{}", status);
                        ctx.report.supervisor_status = Some(status);
                    }
                    Err(e) => ctx.report.record(state, "query status", StepOutcome::Tolerated, Some(e.to_string())),
                }
                state.next()
            }

            DeployState::Done | DeployState::Failed => state,
        }
    }

    /// Checks that nothing required is missing before the service is touched.
    async fn preflight(&self) -> Result<(), DeployError> {
        let checkout = &self.config.checkout_dir;
        if !tokio::fs::metadata(checkout).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(DeployError::MissingCheckout(checkout.clone()));
        }

        if let EnvFilePlacement::External(env_file) = self.env_file_placement() {
            if !tokio::fs::try_exists(&env_file).await.unwrap_or(false) {
                return Err(DeployError::MissingEnvFile(env_file));
            }
        }

        let database = self.config.database_config()?;
        info!("Checking database {}", mask_url(&database.database_url));
        let db = open_database(&database).await?;
        let result = sqlx::query("SELECT 1").execute(&db.pool).await;
        db.pool.close().await;
        result.map_err(|source| DeployError::Database {
            url: mask_url(&database.database_url),
            source,
        })?;
        Ok(())
    }

    async fn migrate(&self, ctx: &mut RunContext) -> Result<(), DeployError> {
        let migrator = Migrator::new(MigrationSet::from_dir(&self.config.resolved_migrations_dir())?);

        // Settings are read again now that the service's configuration is back in place.
        let database = self.config.database_config()?;
        let db = open_database(&database).await?;
        let result = migrator.run(&db.pool).await;
        db.pool.close().await;
        let report = result?;
        ctx.report.record(
            DeployState::Migrating,
            "apply migrations",
            StepOutcome::Succeeded,
            Some(format!(
                "{} applied, {} already applied",
                report.applied.len(),
                report.already_applied
            )),
        );
        ctx.report.migrations = Some(report);
        Ok(())
    }

    fn env_file_placement(&self) -> EnvFilePlacement {
        match self.config.resolved_env_file() {
            None => EnvFilePlacement::None,
            Some(path) if path.starts_with(&self.config.checkout_dir) => EnvFilePlacement::InsideCheckout(path),
            Some(path) => EnvFilePlacement::External(path),
        }
    }

    fn install_command(&self) -> Option<CommandSpec> {
        let mut parts = self.config.install_command.as_ref()?.iter();
        let program = parts.next()?;
        Some(CommandSpec::new(program, parts.cloned()).current_dir(&self.config.checkout_dir))
    }
}

/// Opens the store without creating it. A missing database is an error.
async fn open_database(database: &Config) -> Result<DatabaseManager, DeployError> {
    DatabaseManager::open_existing(&database.database_url)
        .await
        .map_err(|source| DeployError::Database {
            url: mask_url(&database.database_url),
            source,
        })
}
