//! The per-feature control loop.
//!
//! One iteration: detect the current phase from durable evidence, execute
//! it, interpret the outcome, persist the feature's record, repeat. There
//! is no stored program counter; killing the process anywhere and
//! restarting re-detects the same phase from the artifacts, which is the
//! entire recovery story.

use crate::activity::ActivityLog;
use crate::artifacts::FeatureDocs;
use crate::config::Config;
use crate::errors::WorkflowError;
use crate::executor::PhaseExecutor;
use crate::hosting::{PrState, ReviewHost};
use crate::inspect::detect_phase;
use crate::phase::WorkflowPhase;
use crate::signals::PhaseOutcome;
use crate::state::{StateStore, TaskStatus};
use crate::vcs::{VersionControl, WorkspaceManager};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// How one feature's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEnd {
    Complete,
    NeedsInput,
    Paused,
    MaxIterations,
    /// Shutdown requested; the feature resumes on the next run.
    Stopped,
}

pub struct FeatureWorkflow {
    config: Config,
    executor: Arc<PhaseExecutor>,
    host: Arc<dyn ReviewHost>,
    vcs: Arc<dyn VersionControl>,
    workspaces: Arc<WorkspaceManager>,
    store: Arc<StateStore>,
    activity: Arc<ActivityLog>,
    shutdown: watch::Receiver<bool>,
}

impl FeatureWorkflow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        executor: Arc<PhaseExecutor>,
        host: Arc<dyn ReviewHost>,
        vcs: Arc<dyn VersionControl>,
        workspaces: Arc<WorkspaceManager>,
        store: Arc<StateStore>,
        activity: Arc<ActivityLog>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            executor,
            host,
            vcs,
            workspaces,
            store,
            activity,
            shutdown,
        }
    }

    /// Drive `feature_id` until terminal, escalated, out of budget, or
    /// stopped. Resumes transparently from whatever the artifacts say.
    pub async fn run(&mut self, feature_id: &str) -> Result<WorkflowEnd, WorkflowError> {
        let docs = FeatureDocs::new(&self.config.features_root(), feature_id);
        let branch = WorkspaceManager::branch_name(feature_id);
        let workflow_cfg = self.config.toml.workflow.clone();

        // Pick the counters up where the last run left them.
        let (mut iterations, mut failures) = {
            let doc = self.store.load()?;
            doc.features
                .get(feature_id)
                .map(|t| (t.iterations, t.consecutive_failures))
                .unwrap_or((0, 0))
        };

        loop {
            if *self.shutdown.borrow() {
                return Ok(WorkflowEnd::Stopped);
            }

            let snapshot = docs.snapshot();
            let branch_exists = self.vcs.branch_exists(&branch).unwrap_or_else(|err| {
                warn!(feature = feature_id, "branch query failed: {err}");
                false
            });
            let pr_state = match self.host.pull_request_state(&branch).await {
                Ok(state) => state,
                Err(err) => {
                    // Unknown review state detects as the earlier phase.
                    warn!(feature = feature_id, "pull request query failed: {err}");
                    PrState::None
                }
            };
            let phase = detect_phase(
                &snapshot,
                branch_exists,
                pr_state,
                &self.config.toml.detection,
            );

            if phase.is_terminal() {
                self.store.update_feature(feature_id, |task| {
                    task.phase = WorkflowPhase::Complete;
                    task.status = TaskStatus::Complete;
                    task.consecutive_failures = 0;
                })?;
                self.activity
                    .record(&format!("feature {feature_id} workflow complete"))?;
                return Ok(WorkflowEnd::Complete);
            }

            self.store.update_feature(feature_id, |task| {
                task.phase = phase;
                task.status = TaskStatus::Running;
            })?;

            let outcome = self.executor.execute(phase, &docs, iterations + 1).await?;
            iterations += 1;

            match outcome {
                PhaseOutcome::Success => {
                    failures = 0;
                    if phase == WorkflowPhase::Branch {
                        // Provisioning is idempotent; re-deriving the path
                        // here keeps the record accurate across resumes.
                        let path = self.workspaces.provision(feature_id)?;
                        self.store.update_feature(feature_id, |task| {
                            task.workspace_path = Some(path.clone());
                        })?;
                    }
                    info!(feature = feature_id, %phase, "phase completed");
                    self.activity
                        .record(&format!("feature {feature_id} phase {phase} completed"))?;
                }
                PhaseOutcome::Progress => {
                    failures = 0;
                }
                PhaseOutcome::NeedsInput => {
                    // Expected escalation, not a failure.
                    self.store.update_feature(feature_id, |task| {
                        task.status = TaskStatus::NeedsInput;
                        task.iterations = iterations;
                    })?;
                    self.activity.record(&format!(
                        "feature {feature_id} needs human input at phase {phase}"
                    ))?;
                    return Ok(WorkflowEnd::NeedsInput);
                }
                PhaseOutcome::Failed => {
                    failures = (failures + 1).min(workflow_cfg.failure_threshold);
                    if failures >= workflow_cfg.failure_threshold {
                        self.store.update_feature(feature_id, |task| {
                            task.status = TaskStatus::Paused;
                            task.iterations = iterations;
                            task.consecutive_failures = failures;
                        })?;
                        self.activity.record(&format!(
                            "feature {feature_id} paused at phase {phase} after {failures} consecutive failures"
                        ))?;
                        return Ok(WorkflowEnd::Paused);
                    }
                }
            }

            self.store.update_feature(feature_id, |task| {
                task.iterations = iterations;
                task.consecutive_failures = failures;
            })?;

            if iterations >= workflow_cfg.max_iterations {
                self.store.update_feature(feature_id, |task| {
                    task.status = TaskStatus::MaxIterations;
                })?;
                self.activity.record(&format!(
                    "feature {feature_id} reached the iteration budget ({iterations}) at phase {phase}"
                ))?;
                return Ok(WorkflowEnd::MaxIterations);
            }

            // A merge still awaiting review re-polls after a cooldown
            // instead of busy-looping; the wait is cancellable.
            if phase == WorkflowPhase::Merge && outcome == PhaseOutcome::Progress {
                self.store.update_feature(feature_id, |task| {
                    task.status = TaskStatus::Waiting;
                })?;
                if self.wait_cooldown().await {
                    return Ok(WorkflowEnd::Stopped);
                }
            }
        }
    }

    /// Sleep the merge-poll cooldown; true when interrupted by shutdown.
    async fn wait_cooldown(&mut self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.merge_poll_cooldown()) => false,
            _ = self.shutdown.changed() => *self.shutdown.borrow(),
        }
    }
}
