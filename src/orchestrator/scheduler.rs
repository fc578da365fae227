//! The top-level scheduler: one long-lived control loop that discovers
//! pending features, runs up to `max_parallel` feature workflows as
//! independent tokio tasks, reconciles merged features, and persists
//! global status.
//!
//! Failures inside one feature never reach this loop: workflow tasks are
//! caught, recorded, and retired; the scheduler itself only stops on
//! shutdown or when all work is done.

use super::reconcile::MergeWatcher;
use crate::activity::ActivityLog;
use crate::agent::CodingAgent;
use crate::artifacts::pending_features;
use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::executor::PhaseExecutor;
use crate::hosting::ReviewHost;
use crate::state::{FeatureTask, OrchestratorStatus, StateStore, TaskStatus};
use crate::vcs::{VersionControl, WorkspaceManager};
use crate::workflow::{FeatureWorkflow, WorkflowEnd};
use anyhow::Context;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long a graceful shutdown waits for workflows to reach a checkpoint
/// before abandoning them (they resume on the next run either way).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Orchestrator {
    config: Config,
    store: Arc<StateStore>,
    activity: Arc<ActivityLog>,
    agent: Arc<dyn CodingAgent>,
    host: Arc<dyn ReviewHost>,
    vcs: Arc<dyn VersionControl>,
    workspaces: Arc<WorkspaceManager>,
    shutdown_tx: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        agent: Arc<dyn CodingAgent>,
        host: Arc<dyn ReviewHost>,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        let store = Arc::new(StateStore::new(config.state_file()));
        let activity = Arc::new(ActivityLog::new(config.activity_log()));
        let workspaces = Arc::new(WorkspaceManager::new(
            vcs.clone(),
            &config.toml.vcs.mainline,
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            store,
            activity,
            agent,
            host,
            vcs,
            workspaces,
            shutdown_tx,
        }
    }

    /// Handle used to request shutdown from outside the control loop
    /// (signal handlers, tests).
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    pub fn store(&self) -> Arc<StateStore> {
        self.store.clone()
    }

    /// The control loop. Returns when all features are done or shutdown is
    /// requested. `max_parallel` overrides the configured value for this
    /// run only.
    pub async fn run(&self, max_parallel: Option<usize>) -> Result<(), OrchestratorError> {
        let max_parallel = max_parallel.unwrap_or(self.config.toml.orchestrator.max_parallel);
        self.config.ensure_directories()?;

        // One orchestrator per state file; the lock lives for the run.
        let lock = File::create(self.config.lock_file()).map_err(|source| {
            OrchestratorError::LockFailed {
                path: self.config.lock_file(),
                source,
            }
        })?;
        lock.try_lock_exclusive()
            .map_err(|_| OrchestratorError::AlreadyRunning {
                path: self.config.lock_file(),
            })?;

        self.store.update(|doc| {
            doc.orchestrator.status = OrchestratorStatus::Running;
            doc.orchestrator.started_at = Some(Utc::now());
            doc.orchestrator.max_parallel = max_parallel;
            doc.orchestrator.owner_pid = Some(std::process::id());
        })?;
        self.activity.record(&format!(
            "orchestrator started (max_parallel={max_parallel})"
        ))?;
        info!(max_parallel, "orchestrator started");

        let executor = Arc::new(PhaseExecutor::new(
            self.config.clone(),
            self.agent.clone(),
            self.host.clone(),
            self.vcs.clone(),
            self.workspaces.clone(),
        ));
        let watcher = MergeWatcher::new(
            self.vcs.clone(),
            self.workspaces.clone(),
            self.store.clone(),
            self.activity.clone(),
            &self.config.toml.vcs.mainline,
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut active: HashMap<String, JoinHandle<()>> = HashMap::new();
        let finished = loop {
            if *shutdown_rx.borrow() {
                break false;
            }

            active.retain(|_, handle| !handle.is_finished());

            // Resume interrupted features first, then take new ones, both
            // bounded by the concurrency limit.
            let doc = self.store.load()?;
            let resumable: Vec<String> = doc
                .features
                .values()
                .filter(|t| t.status.is_active() && !active.contains_key(&t.id))
                .map(|t| t.id.clone())
                .collect();
            for id in resumable {
                if active.len() >= max_parallel {
                    break;
                }
                self.launch(&id, false, &executor, &mut active)?;
            }

            for id in pending_features(&self.config.features_root()) {
                if active.len() >= max_parallel {
                    break;
                }
                if self.store.load()?.knows(&id) {
                    continue;
                }
                self.launch(&id, true, &executor, &mut active)?;
            }

            watcher.run_pass();

            // Done when nothing is tracked and nothing is eligible.
            let doc = self.store.load()?;
            let backlog: Vec<String> = pending_features(&self.config.features_root())
                .into_iter()
                .filter(|id| !doc.knows(id))
                .collect();
            if active.is_empty() && doc.features.is_empty() && backlog.is_empty() {
                break true;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = shutdown_rx.changed() => {}
            }
        };

        self.finish(finished, active).await?;
        FileExt::unlock(&lock).ok();
        Ok(())
    }

    /// Spawn one feature workflow as an independent task. `fresh` features
    /// get a new record and a started event.
    fn launch(
        &self,
        feature_id: &str,
        fresh: bool,
        executor: &Arc<PhaseExecutor>,
        active: &mut HashMap<String, JoinHandle<()>>,
    ) -> Result<(), OrchestratorError> {
        if fresh {
            self.store.update(|doc| {
                doc.features
                    .entry(feature_id.to_string())
                    .or_insert_with(|| FeatureTask::new(feature_id));
            })?;
            self.activity
                .record(&format!("feature {feature_id} started"))?;
            info!(feature = feature_id, "feature started");
        } else {
            info!(feature = feature_id, "feature resumed");
        }
        self.store.update_feature(feature_id, |task| {
            task.worker_pid = Some(std::process::id());
        })?;

        let mut workflow = FeatureWorkflow::new(
            self.config.clone(),
            executor.clone(),
            self.host.clone(),
            self.vcs.clone(),
            self.workspaces.clone(),
            self.store.clone(),
            self.activity.clone(),
            self.shutdown_tx.subscribe(),
        );
        let id = feature_id.to_string();
        let store = self.store.clone();
        let activity = self.activity.clone();
        let handle = tokio::spawn(async move {
            match workflow.run(&id).await {
                Ok(end) => {
                    if let Err(err) = store.update_feature(&id, |task| {
                        task.worker_pid = None;
                    }) {
                        warn!(feature = %id, "failed to clear worker handle: {err}");
                    }
                    if end == WorkflowEnd::Stopped {
                        info!(feature = %id, "workflow stopped; will resume next run");
                    }
                }
                Err(err) => {
                    // One feature's failure is recorded, never propagated.
                    error!(feature = %id, "workflow failed: {err}");
                    let _ = activity.record(&format!("feature {id} failed: {err}"));
                    let _ = store.update(|doc| {
                        if let Some(task) = doc.features.get_mut(&id) {
                            task.status = TaskStatus::Paused;
                            task.worker_pid = None;
                        }
                        doc.retire_failed(&id);
                    });
                }
            }
        });
        active.insert(feature_id.to_string(), handle);
        Ok(())
    }

    /// Close out the run: give workflows a short grace window, then record
    /// the final status. Interrupted features resume on the next start.
    async fn finish(
        &self,
        all_done: bool,
        active: HashMap<String, JoinHandle<()>>,
    ) -> Result<(), OrchestratorError> {
        if !active.is_empty() {
            let join_all = futures::future::join_all(active.into_values());
            if tokio::time::timeout(SHUTDOWN_GRACE, join_all).await.is_err() {
                warn!("some workflows did not reach a checkpoint before shutdown");
            }
        }

        let status = if all_done {
            OrchestratorStatus::Complete
        } else {
            OrchestratorStatus::Stopped
        };
        self.store.update(|doc| {
            doc.orchestrator.status = status;
            doc.orchestrator.owner_pid = None;
        })?;
        self.activity.record(match status {
            OrchestratorStatus::Complete => "orchestrator complete",
            _ => "orchestrator stopped",
        })?;
        info!(?status, "orchestrator finished");
        Ok(())
    }
}

/// Wire OS signals into the orchestrator's shutdown channel. SIGINT and
/// SIGTERM both request the same graceful stop `--stop` does.
pub fn install_signal_handler(shutdown: watch::Sender<bool>) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut int = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
            }
            let _ = shutdown.send(true);
        });
    }
    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown.send(true);
            }
        });
    }
    Ok(())
}
