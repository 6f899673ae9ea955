//! Deployment of the bot service.
//!
//! A run walks `Idle → Stopping → Syncing → Configuring → InstallingDeps →
//! Migrating → Starting → Verifying → Done`, strictly in sequence. Any
//! unrecoverable step moves the run to `Failed`; nothing is rolled back
//! automatically.

mod command;
mod env_file;
mod error;
mod orchestrator;
mod report;
mod state;
mod supervisor;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use env_file::{backup_env_file, restore_env_file};
pub use error::DeployError;
pub use orchestrator::Deployer;
pub use report::{DeployReport, StepOutcome, StepRecord};
pub use state::DeployState;
pub use supervisor::{GitCheckout, Supervisor};
