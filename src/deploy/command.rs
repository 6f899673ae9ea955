use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use super::DeployError;

/// An external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments, passed without a shell.
    pub args: Vec<String>,
    /// Working directory; inherited when `None`.
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// A command with no working directory set.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            current_dir: None,
        }
    }

    /// Runs the command inside `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code zero.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub(crate) fn status_text(&self) -> String {
        match self.status {
            Some(code) => format!("exit code {code}"),
            None => "a signal".to_string(),
        }
    }
}

/// Seam between the orchestrator and the operating system.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion. Only a failure to spawn is an `Err`.
    async fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Spawns real processes and waits for them to exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput> {
        let mut process = tokio::process::Command::new(&command.program);
        process.args(&command.args).stdin(Stdio::null());
        if let Some(dir) = &command.current_dir {
            process.current_dir(dir);
        }

        let output = process.output().await?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `command`, treating a spawn error or non-zero exit as failure.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    command: &CommandSpec,
) -> Result<CommandOutput, DeployError> {
    let output = run_unchecked(runner, command).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(DeployError::CommandFailed {
            command: command.to_string(),
            status: output.status_text(),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Runs `command`; only a spawn error is a failure.
pub(crate) async fn run_unchecked(
    runner: &dyn CommandRunner,
    command: &CommandSpec,
) -> Result<CommandOutput, DeployError> {
    runner.run(command).await.map_err(|source| DeployError::Spawn {
        command: command.to_string(),
        source,
    })
}
