use std::path::{Path, PathBuf};

use super::CommandSpec;

/// The process supervisor that keeps the bot running and restarts it on crash.
#[derive(Debug, Clone)]
pub struct Supervisor {
    program: String,
    service: String,
}

impl Supervisor {
    /// `program` is the supervisor CLI, usually `systemctl`.
    pub fn new(program: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            service: service.into(),
        }
    }

    /// Unit name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// `<program> stop <service>`.
    pub fn stop_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program, ["stop", self.service.as_str()])
    }

    /// `<program> start <service>`.
    pub fn start_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program, ["start", self.service.as_str()])
    }

    /// `<program> status <service> --no-pager`.
    pub fn status_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program, ["status", self.service.as_str(), "--no-pager"])
    }
}

/// Git working copy that is forced onto the tip of a remote branch.
#[derive(Debug, Clone)]
pub struct GitCheckout {
    program: String,
    dir: PathBuf,
    remote: String,
    branch: String,
}

impl GitCheckout {
    /// `program` is the git CLI; every command runs inside `dir`.
    pub fn new(
        program: impl Into<String>,
        dir: &Path,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            dir: dir.to_path_buf(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    /// `git fetch <remote> <branch>`.
    pub fn fetch_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program, ["fetch", self.remote.as_str(), self.branch.as_str()])
            .current_dir(&self.dir)
    }

    /// Discards local commits and edits to tracked files.
    pub fn reset_command(&self) -> CommandSpec {
        CommandSpec::new(
            &self.program,
            ["reset".to_string(), "--hard".to_string(), format!("{}/{}", self.remote, self.branch)],
        )
        .current_dir(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_commands() {
        let supervisor = Supervisor::new("systemctl", "tusabot");
        assert_eq!(supervisor.stop_command().to_string(), "systemctl stop tusabot");
        assert_eq!(supervisor.start_command().to_string(), "systemctl start tusabot");
        assert_eq!(supervisor.status_command().to_string(), "systemctl status tusabot --no-pager");
    }

    #[test]
    fn test_git_commands_run_in_checkout() {
        let git = GitCheckout::new("git", Path::new("/opt/tusabot"), "origin", "main");
        let fetch = git.fetch_command();
        assert_eq!(fetch.to_string(), "git fetch origin main");
        assert_eq!(fetch.current_dir.as_deref(), Some(Path::new("/opt/tusabot")));
        assert_eq!(git.reset_command().to_string(), "git reset --hard origin/main");
    }
}
