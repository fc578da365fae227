//! Phase execution: one instruction to the external agent per phase, one
//! interpreted outcome back.
//!
//! Instructions are always scoped to exactly one phase, never a
//! multi-phase instruction, and name the artifacts to read, the artifacts
//! to produce, and the completion tokens to emit. Interpretation rules per
//! phase live here; the raw token scanning lives in `signals`. Every
//! `execute` call appends one timestamped line to the feature's session
//! log, whatever the outcome.

use crate::agent::{AgentRequest, CodingAgent};
use crate::artifacts::{DESIGN_DOC, FeatureDocs, SPEC_DOC, TASKS_DOC, WRAPUP_DOC};
use crate::config::Config;
use crate::errors::WorkflowError;
use crate::hosting::{PrState, ReviewHost};
use crate::phase::WorkflowPhase;
use crate::signals::{
    self, FEATURE_COMPLETE, NEEDS_INPUT, PHASE_COMPLETE, PhaseOutcome, scan_tokens,
};
use crate::vcs::{VersionControl, WorkspaceManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PhaseExecutor {
    config: Config,
    agent: Arc<dyn CodingAgent>,
    host: Arc<dyn ReviewHost>,
    vcs: Arc<dyn VersionControl>,
    workspaces: Arc<WorkspaceManager>,
}

impl PhaseExecutor {
    pub fn new(
        config: Config,
        agent: Arc<dyn CodingAgent>,
        host: Arc<dyn ReviewHost>,
        vcs: Arc<dyn VersionControl>,
        workspaces: Arc<WorkspaceManager>,
    ) -> Self {
        Self {
            config,
            agent,
            host,
            vcs,
            workspaces,
        }
    }

    /// Execute one phase for one feature. Collaborator failures (agent,
    /// VCS, hosting) come back as `Failed` outcomes and feed the normal
    /// escalation policy; only session-log I/O errors surface as `Err`.
    pub async fn execute(
        &self,
        phase: WorkflowPhase,
        docs: &FeatureDocs,
        iteration: u32,
    ) -> Result<PhaseOutcome, WorkflowError> {
        let (outcome, note) = match phase {
            WorkflowPhase::Interview => self.run_interview(docs, iteration).await,
            WorkflowPhase::Plan => self.run_plan(docs, iteration).await,
            WorkflowPhase::Branch => self.run_branch(docs, iteration).await,
            WorkflowPhase::Implement => self.run_implement(docs, iteration).await,
            WorkflowPhase::Pr => self.run_pr(docs).await,
            WorkflowPhase::Merge => self.run_merge(docs).await,
            WorkflowPhase::WrapUp => self.run_wrapup(docs, iteration).await,
            WorkflowPhase::Complete => (PhaseOutcome::Success, String::new()),
        };

        docs.append_session_log(phase.as_str(), outcome.as_str(), &note)?;
        Ok(outcome)
    }

    /// Invoke the agent, mapping process-level failure to a phase failure.
    async fn invoke_agent(
        &self,
        docs: &FeatureDocs,
        phase: WorkflowPhase,
        iteration: u32,
        instruction: &str,
    ) -> Result<String, String> {
        let working_dir = self.working_dir(docs);
        let request = AgentRequest {
            feature_id: &docs.id,
            phase,
            iteration,
            instruction,
            working_dir: &working_dir,
        };
        self.agent.invoke(request).await.map_err(|err| {
            warn!(feature = %docs.id, %phase, "agent invocation failed: {err:#}");
            err.to_string()
        })
    }

    /// The agent runs inside the feature's workspace once one exists,
    /// project root before that.
    fn working_dir(&self, docs: &FeatureDocs) -> PathBuf {
        let branch = WorkspaceManager::branch_name(&docs.id);
        let candidate = self
            .config
            .workspaces_dir()
            .join(crate::vcs::slugify(&branch));
        if candidate.is_dir() {
            candidate
        } else {
            self.config.project_dir.clone()
        }
    }

    async fn run_interview(&self, docs: &FeatureDocs, iteration: u32) -> (PhaseOutcome, String) {
        let instruction = format!(
            "You are completing the interview phase for feature {id}.\n\n\
             Read {spec} in {dir} and fill in every decision row of its decision \
             table, replacing each TBD placeholder with a concrete choice. Do not \
             touch any other document.\n\n\
             When every required decision is filled, output {done}.\n\
             If a decision cannot be made without human input, output {input} and \
             name the missing decision.",
            id = docs.id,
            spec = SPEC_DOC,
            dir = docs.dir().display(),
            done = PHASE_COMPLETE,
            input = NEEDS_INPUT,
        );
        match self
            .invoke_agent(docs, WorkflowPhase::Interview, iteration, &instruction)
            .await
        {
            Ok(output) => (signals::parse_outcome(&output), String::new()),
            Err(err) => (PhaseOutcome::Failed, err),
        }
    }

    async fn run_plan(&self, docs: &FeatureDocs, iteration: u32) -> (PhaseOutcome, String) {
        let instruction = format!(
            "You are completing the planning phase for feature {id}.\n\n\
             Read the completed {spec} in {dir} and produce two documents next to \
             it: {design} (the technical design) and {tasks} (a markdown checklist \
             of implementation tasks, one `- [ ]` item per task).\n\n\
             When both documents exist and cover the specification, output {done}.",
            id = docs.id,
            spec = SPEC_DOC,
            dir = docs.dir().display(),
            design = DESIGN_DOC,
            tasks = TASKS_DOC,
            done = PHASE_COMPLETE,
        );
        if let Err(err) = self
            .invoke_agent(docs, WorkflowPhase::Plan, iteration, &instruction)
            .await
        {
            return (PhaseOutcome::Failed, err);
        }
        // Planning succeeds on evidence, not on the agent's say-so.
        let snap = docs.snapshot();
        if snap.has_design && snap.has_tasks {
            (PhaseOutcome::Success, String::new())
        } else {
            (
                PhaseOutcome::Failed,
                "design or task checklist missing after planning".into(),
            )
        }
    }

    async fn run_branch(&self, docs: &FeatureDocs, iteration: u32) -> (PhaseOutcome, String) {
        let branch = WorkspaceManager::branch_name(&docs.id);
        match self.vcs.branch_exists(&branch) {
            Ok(true) => {
                // Idempotent: the branch (and its workspace binding) already
                // exists; nothing to ask the agent.
                debug!(feature = %docs.id, %branch, "branch already exists");
                return (PhaseOutcome::Success, format!("branch {branch} exists"));
            }
            Ok(false) => {}
            Err(err) => return (PhaseOutcome::Failed, err.to_string()),
        }

        if let Err(err) = self.workspaces.provision(&docs.id) {
            return (PhaseOutcome::Failed, err.to_string());
        }

        let instruction = format!(
            "The working branch {branch} for feature {id} was just created.\n\n\
             Update {status} in {dir} to record that implementation is starting on \
             {branch}. Do not change any other document.\n\n\
             When the status table is updated, output {done}.",
            branch = branch,
            id = docs.id,
            status = crate::artifacts::STATUS_DOC,
            dir = docs.dir().display(),
            done = PHASE_COMPLETE,
        );
        // Bookkeeping failures are noted, not counted against the phase.
        let note = match self
            .invoke_agent(docs, WorkflowPhase::Branch, iteration, &instruction)
            .await
        {
            Ok(_) => format!("created {branch}"),
            Err(err) => format!("created {branch}; bookkeeping skipped: {err}"),
        };
        (PhaseOutcome::Success, note)
    }

    async fn run_implement(&self, docs: &FeatureDocs, iteration: u32) -> (PhaseOutcome, String) {
        let before = docs.checklist();
        let pending = docs.unchecked_tasks();
        let batch: Vec<&str> = pending
            .iter()
            .take(self.config.toml.detection.implement_batch)
            .map(|s| s.as_str())
            .collect();

        let task_list = batch
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        let instruction = format!(
            "You are implementing feature {id} on its working branch.\n\n\
             Read {design} and {tasks} in {dir}. Complete the following task \
             items, committing your work, and mark each finished item `- [x]` in \
             {tasks}:\n\n{list}\n\n\
             Work on these items only. When every listed item is done and checked \
             off, output {done}.",
            id = docs.id,
            design = DESIGN_DOC,
            tasks = TASKS_DOC,
            dir = docs.dir().display(),
            list = task_list,
            done = PHASE_COMPLETE,
        );
        if let Err(err) = self
            .invoke_agent(docs, WorkflowPhase::Implement, iteration, &instruction)
            .await
        {
            return (PhaseOutcome::Failed, err);
        }

        // Progress is judged from the checklist, not from tokens.
        let after = docs.checklist();
        let note = format!("checklist {}/{}", after.checked, after.total);
        if after.total > 0 && after.unchecked() == 0 {
            (PhaseOutcome::Success, note)
        } else if after.checked > before.checked || after.total != before.total {
            (PhaseOutcome::Progress, note)
        } else {
            (PhaseOutcome::Failed, "no detectable checklist change".into())
        }
    }

    async fn run_pr(&self, docs: &FeatureDocs) -> (PhaseOutcome, String) {
        let branch = WorkspaceManager::branch_name(&docs.id);
        match self.host.pull_request_state(&branch).await {
            Ok(state) if state.exists() => {
                // Idempotent: a PR already exists, whatever its state.
                return (PhaseOutcome::Success, format!("pull request already {state:?}"));
            }
            Ok(_) => {}
            Err(err) => return (PhaseOutcome::Failed, err.to_string()),
        }

        if let Err(err) = self.vcs.push_branch(&branch) {
            return (PhaseOutcome::Failed, err.to_string());
        }
        let title = format!("{}: {}", docs.id, branch);
        let body = format!(
            "Automated pull request for feature {}.\n\nSee `{}` in the feature \
             directory for the specification.",
            docs.id, SPEC_DOC
        );
        match self.host.create_pull_request(&branch, &title, &body).await {
            Ok(number) => (PhaseOutcome::Success, format!("opened pull request #{number}")),
            Err(err) => (PhaseOutcome::Failed, err.to_string()),
        }
    }

    /// Merge never invokes the agent; it is purely a review-state poll.
    async fn run_merge(&self, docs: &FeatureDocs) -> (PhaseOutcome, String) {
        let branch = WorkspaceManager::branch_name(&docs.id);
        match self.host.pull_request_state(&branch).await {
            Ok(PrState::Merged) => (PhaseOutcome::Success, String::new()),
            Ok(PrState::Open) => (PhaseOutcome::Progress, "awaiting review".into()),
            Ok(PrState::Closed) => (
                PhaseOutcome::Failed,
                "pull request closed without merge".into(),
            ),
            Ok(PrState::None) => (PhaseOutcome::Failed, "pull request disappeared".into()),
            Err(err) => (PhaseOutcome::Failed, err.to_string()),
        }
    }

    async fn run_wrapup(&self, docs: &FeatureDocs, iteration: u32) -> (PhaseOutcome, String) {
        let instruction = format!(
            "Feature {id} has been merged. You are completing its wrap-up phase.\n\n\
             Write {wrapup} in {dir}: summarize what shipped, note any follow-ups, \
             and include the literal marker {feature_done} in the document so the \
             record is recognizably final. Update {status} to its final state.\n\n\
             When the wrap-up record is written, output both {done} and \
             {feature_done}.",
            id = docs.id,
            wrapup = WRAPUP_DOC,
            dir = docs.dir().display(),
            status = crate::artifacts::STATUS_DOC,
            done = PHASE_COMPLETE,
            feature_done = FEATURE_COMPLETE,
        );
        match self
            .invoke_agent(docs, WorkflowPhase::WrapUp, iteration, &instruction)
            .await
        {
            Ok(output) => {
                let tokens = scan_tokens(&output);
                if tokens.needs_input {
                    (PhaseOutcome::NeedsInput, String::new())
                } else if tokens.phase_complete && tokens.feature_complete {
                    (PhaseOutcome::Success, String::new())
                } else {
                    (
                        PhaseOutcome::Failed,
                        "wrap-up did not signal feature completion".into(),
                    )
                }
            }
            Err(err) => (PhaseOutcome::Failed, err),
        }
    }
}
