use serde::Serialize;
use std::fmt;

/// Position of a deployment run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployState {
    /// Preflight checks.
    Idle,
    /// Stopping the running service.
    Stopping,
    /// Forcing the checkout onto the deployed revision.
    Syncing,
    /// Putting the service's environment file back.
    Configuring,
    /// Running the dependency install command.
    InstallingDeps,
    /// Applying pending migration units.
    Migrating,
    /// Starting the service.
    Starting,
    /// Querying the supervisor.
    Verifying,
    /// Every step ran.
    Done,
    /// A step failed and the run stopped.
    Failed,
}

impl DeployState {
    /// The state that follows a successful step. Terminal states map to themselves.
    pub fn next(self) -> Self {
        match self {
            DeployState::Idle => DeployState::Stopping,
            DeployState::Stopping => DeployState::Syncing,
            DeployState::Syncing => DeployState::Configuring,
            DeployState::Configuring => DeployState::InstallingDeps,
            DeployState::InstallingDeps => DeployState::Migrating,
            DeployState::Migrating => DeployState::Starting,
            DeployState::Starting => DeployState::Verifying,
            DeployState::Verifying => DeployState::Done,
            DeployState::Done => DeployState::Done,
            DeployState::Failed => DeployState::Failed,
        }
    }

    /// `Done` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeployState::Done | DeployState::Failed)
    }

    /// Kebab-case name used in logs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            DeployState::Idle => "idle",
            DeployState::Stopping => "stopping",
            DeployState::Syncing => "syncing",
            DeployState::Configuring => "configuring",
            DeployState::InstallingDeps => "installing-deps",
            DeployState::Migrating => "migrating",
            DeployState::Starting => "starting",
            DeployState::Verifying => "verifying",
            DeployState::Done => "done",
            DeployState::Failed => "failed",
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_order() {
        let mut state = DeployState::Idle;
        let mut visited = vec![state];
        while !state.is_terminal() {
            state = state.next();
            visited.push(state);
        }

        let names: Vec<&str> = visited.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "idle",
                "stopping",
                "syncing",
                "configuring",
                "installing-deps",
                "migrating",
                "starting",
                "verifying",
                "done"
            ]
        );
    }

    #[test]
    fn test_terminal_states_are_fixed_points() {
        assert_eq!(DeployState::Done.next(), DeployState::Done);
        assert_eq!(DeployState::Failed.next(), DeployState::Failed);
        assert!(!DeployState::Verifying.is_terminal());
    }
}
