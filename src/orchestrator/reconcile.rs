//! The merge watcher: reconciliation of externally integrated features.
//!
//! Integration is an external event: a human can review and merge a
//! branch while its feature is `Paused` or `NeedsInput`, so this pass is
//! decoupled from the phase machine. It runs once per orchestrator poll
//! cycle over every tracked feature, whatever its status.

use crate::activity::ActivityLog;
use crate::state::{StateStore, TaskStatus};
use crate::vcs::{VersionControl, WorkspaceManager};
use std::sync::Arc;
use tracing::warn;

pub struct MergeWatcher {
    vcs: Arc<dyn VersionControl>,
    workspaces: Arc<WorkspaceManager>,
    store: Arc<StateStore>,
    activity: Arc<ActivityLog>,
    targets: Vec<String>,
}

impl MergeWatcher {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        workspaces: Arc<WorkspaceManager>,
        store: Arc<StateStore>,
        activity: Arc<ActivityLog>,
        mainline: &str,
    ) -> Self {
        Self {
            vcs,
            workspaces,
            store,
            activity,
            targets: vec![mainline.to_string()],
        }
    }

    /// One reconciliation pass. Returns the ids retired this pass. A
    /// failure for one feature is logged and never blocks the rest.
    pub fn run_pass(&self) -> Vec<String> {
        let doc = match self.store.load() {
            Ok(doc) => doc,
            Err(err) => {
                warn!("merge watcher could not read state: {err}");
                return Vec::new();
            }
        };

        let mut retired = Vec::new();
        for (id, task) in &doc.features {
            let branch = WorkspaceManager::branch_name(id);
            // A workflow that ran wrap-up to completion is integrated by
            // definition, even when the local clone has not seen the merge.
            let integrated = task.status == TaskStatus::Complete
                || match self.vcs.is_branch_merged(&branch, &self.targets) {
                    Ok(merged) => merged,
                    Err(err) => {
                        warn!(feature = %id, "merge query failed: {err}");
                        continue;
                    }
                };
            if !integrated {
                continue;
            }

            if let Some(path) = &task.workspace_path
                && let Err(err) = self.workspaces.reclaim(path)
            {
                // Retried next pass; the feature stays tracked meanwhile.
                warn!(feature = %id, "workspace reclaim failed: {err}");
                continue;
            }

            let result = self.store.update(|doc| {
                if let Some(task) = doc.features.get_mut(id) {
                    task.workspace_path = None;
                    task.status = TaskStatus::Complete;
                }
                doc.retire_completed(id);
            });
            match result {
                Ok(()) => {
                    if let Err(err) = self
                        .activity
                        .record(&format!("feature {id} merged; workspace reclaimed"))
                    {
                        warn!(feature = %id, "activity log write failed: {err}");
                    }
                    retired.push(id.clone());
                }
                Err(err) => warn!(feature = %id, "reconciliation update failed: {err}"),
            }
        }
        retired
    }
}
