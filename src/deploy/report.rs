use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::DeployState;
use crate::database::migrations::MigrationReport;
use crate::utils::logging::{log_step_failed, log_step_skipped, log_step_success, log_step_tolerated};

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// Completed as intended.
    Succeeded,
    /// Failed, but the step is best-effort.
    Tolerated,
    /// Failed; the run cannot be a success.
    Failed,
    /// Not attempted.
    Skipped,
}

/// One entry of a [`DeployReport`].
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// State the step belongs to.
    pub state: DeployState,
    /// Short step name, e.g. `stop service`.
    pub step: &'static str,
    /// How it ended.
    pub outcome: StepOutcome,
    /// Error text or other context.
    pub detail: Option<String>,
}

/// Everything a deployment run did, in order.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    /// Identifies the run in logs and backup file names.
    pub run_id: Uuid,
    /// Supervisor unit that was deployed.
    pub service: String,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// Set once the run reaches a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// `Done` or `Failed` once finished.
    pub final_state: DeployState,
    /// Steps in the order they were recorded.
    pub steps: Vec<StepRecord>,
    /// Present when the migrating step succeeded.
    pub migrations: Option<MigrationReport>,
    /// Textual status reported by the supervisor after start.
    pub supervisor_status: Option<String>,
}

impl DeployReport {
    /// An empty report with a fresh run id.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            service: service.into(),
            started_at: Utc::now(),
            finished_at: None,
            final_state: DeployState::Idle,
            steps: Vec::new(),
            migrations: None,
            supervisor_status: None,
        }
    }

    pub(crate) fn record(
        &mut self,
        state: DeployState,
        step: &'static str,
        outcome: StepOutcome,
        detail: Option<String>,
    ) {
        let label = format!("{state}/{step}");
        let text = detail.as_deref().unwrap_or("");
        match outcome {
            StepOutcome::Succeeded => log_step_success(&label, detail.as_deref()),
            StepOutcome::Tolerated => log_step_tolerated(&label, text),
            StepOutcome::Failed => log_step_failed(&label, text),
            StepOutcome::Skipped => log_step_skipped(&label, text),
        }

        self.steps.push(StepRecord {
            state,
            step,
            outcome,
            detail,
        });
    }

    pub(crate) fn finish(mut self, final_state: DeployState) -> Self {
        self.final_state = final_state;
        self.finished_at = Some(Utc::now());
        self
    }

    /// True only for a run that reached `Done` with no failed step.
    pub fn succeeded(&self) -> bool {
        self.final_state == DeployState::Done
            && !self.steps.iter().any(|s| s.outcome == StepOutcome::Failed)
    }

    /// Whether any step of `state` was actually tried.
    pub fn attempted(&self, state: DeployState) -> bool {
        self.steps
            .iter()
            .any(|s| s.state == state && s.outcome != StepOutcome::Skipped)
    }

    /// First record with the given step name.
    pub fn step(&self, step: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == step)
    }

    /// Process exit code for the run: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_with_failed_step_is_not_success() {
        let mut report = DeployReport::new("tusabot");
        report.record(DeployState::Migrating, "apply migrations", StepOutcome::Failed, Some("boom".into()));
        report.record(DeployState::Starting, "start service", StepOutcome::Succeeded, None);
        let report = report.finish(DeployState::Done);

        assert!(!report.succeeded());
        assert_eq!(report.exit_code(), 1);
        assert!(report.attempted(DeployState::Starting));
    }

    #[test]
    fn test_tolerated_steps_do_not_fail_the_run() {
        let mut report = DeployReport::new("tusabot");
        report.record(DeployState::Stopping, "stop service", StepOutcome::Tolerated, Some("not loaded".into()));
        report.record(DeployState::Configuring, "restore configuration", StepOutcome::Skipped, None);
        let report = report.finish(DeployState::Done);

        assert!(report.succeeded());
        assert_eq!(report.exit_code(), 0);
        assert!(!report.attempted(DeployState::Configuring));
        assert!(report.finished_at.is_some());
    }
}
