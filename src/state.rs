//! The durable state document and its store.
//!
//! One JSON file holds the orchestrator record, the active feature map, and
//! the completed/failed id lists. Every mutation is a full
//! read-modify-write committed with a temp-file-then-rename, serialized
//! through a mutex; per-feature single-writer discipline is the
//! requirement; global serialization is the simple implementation of it.
//! Readers tolerate an absent file and treat it as fresh state.

use crate::errors::OrchestratorError;
use crate::phase::WorkflowPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorStatus {
    Idle,
    Running,
    Stopped,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    /// Waiting out a cooldown (merge review poll).
    Waiting,
    /// Stopped pending human input; not a failure.
    NeedsInput,
    /// Consecutive-failure threshold reached; human intervention required.
    Paused,
    /// Iteration budget exhausted; scope, not failure.
    MaxIterations,
    Complete,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Waiting => "waiting",
            TaskStatus::NeedsInput => "needs-input",
            TaskStatus::Paused => "paused",
            TaskStatus::MaxIterations => "max-iterations",
            TaskStatus::Complete => "complete",
        }
    }

    /// Whether the workflow loop is still allowed to advance this task.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Waiting)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub status: OrchestratorStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub max_parallel: usize,
    /// Controlling process id, for diagnostics and `--stop` signal delivery.
    pub owner_pid: Option<u32>,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            status: OrchestratorStatus::Idle,
            started_at: None,
            max_parallel: 3,
            owner_pid: None,
        }
    }
}

/// One feature's durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTask {
    pub id: String,
    pub status: TaskStatus,
    pub phase: WorkflowPhase,
    pub iterations: u32,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureTask {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            status: TaskStatus::Running,
            phase: WorkflowPhase::Interview,
            iterations: 0,
            consecutive_failures: 0,
            workspace_path: None,
            worker_pid: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The whole durable document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub orchestrator: OrchestratorState,
    #[serde(default)]
    pub features: BTreeMap<String, FeatureTask>,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
}

impl StateDocument {
    /// Ids this run already knows about, in any list.
    pub fn knows(&self, id: &str) -> bool {
        self.features.contains_key(id)
            || self.completed.iter().any(|c| c == id)
            || self.failed.iter().any(|f| f == id)
    }

    pub fn running_count(&self) -> usize {
        self.features
            .values()
            .filter(|t| t.status.is_active())
            .count()
    }

    /// Retire a feature into the completed list. The record is dropped from
    /// the active map but its id is retained for audit; workspace_path is
    /// cleared by the caller before retiring.
    pub fn retire_completed(&mut self, id: &str) {
        if self.features.remove(id).is_some() && !self.completed.iter().any(|c| c == id) {
            self.completed.push(id.to_string());
        }
    }

    pub fn retire_failed(&mut self, id: &str) {
        if self.features.remove(id).is_some() && !self.failed.iter().any(|f| f == id) {
            self.failed.push(id.to_string());
        }
    }
}

/// Durable store for the state document.
pub struct StateStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current document; an absent file is fresh/empty state.
    pub fn load(&self) -> Result<StateDocument, OrchestratorError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| OrchestratorError::StateCorrupt {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StateDocument::default()),
            Err(source) => Err(OrchestratorError::StateReadFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Read-modify-write the document under the store's write lock,
    /// committing with temp-file-then-rename so readers never observe a
    /// partial write.
    pub fn update<F, R>(&self, mutate: F) -> Result<R, OrchestratorError>
    where
        F: FnOnce(&mut StateDocument) -> R,
    {
        let _guard = self
            .write_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut doc = self.load()?;
        let result = mutate(&mut doc);
        self.commit(&doc)?;
        Ok(result)
    }

    /// Update one feature's record in place. A no-op when the feature is
    /// not in the active map (it may have been reconciled concurrently).
    pub fn update_feature<F>(&self, id: &str, mutate: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce(&mut FeatureTask),
    {
        self.update(|doc| {
            if let Some(task) = doc.features.get_mut(id) {
                mutate(task);
                task.touch();
            }
        })
    }

    fn commit(&self, doc: &StateDocument) -> Result<(), OrchestratorError> {
        let json = serde_json::to_string_pretty(doc).map_err(|source| {
            OrchestratorError::StateCorrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| OrchestratorError::StateWriteFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| OrchestratorError::StateWriteFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (StateStore::new(dir.path().join("state.json")), dir)
    }

    #[test]
    fn test_absent_file_is_fresh_state() {
        let (store, _dir) = make_store();
        let doc = store.load().unwrap();
        assert_eq!(doc.orchestrator.status, OrchestratorStatus::Idle);
        assert!(doc.features.is_empty());
        assert!(doc.completed.is_empty());
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let (store, _dir) = make_store();
        store
            .update(|doc| {
                doc.orchestrator.status = OrchestratorStatus::Running;
                doc.orchestrator.max_parallel = 5;
                doc.features
                    .insert("FEAT-1".into(), FeatureTask::new("FEAT-1"));
            })
            .unwrap();

        let doc = store.load().unwrap();
        assert_eq!(doc.orchestrator.status, OrchestratorStatus::Running);
        assert_eq!(doc.orchestrator.max_parallel, 5);
        assert_eq!(doc.features.len(), 1);
        assert_eq!(doc.features["FEAT-1"].phase, WorkflowPhase::Interview);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (store, dir) = make_store();
        store.update(|_| {}).unwrap();
        assert!(store.path().exists());
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_a_typed_error() {
        let (store, _dir) = make_store();
        fs::write(store.path(), "{ not json").unwrap();
        match store.load() {
            Err(OrchestratorError::StateCorrupt { .. }) => {}
            other => panic!("Expected StateCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_update_feature_touches_timestamp() {
        let (store, _dir) = make_store();
        store
            .update(|doc| {
                doc.features
                    .insert("FEAT-2".into(), FeatureTask::new("FEAT-2"));
            })
            .unwrap();
        let before = store.load().unwrap().features["FEAT-2"].updated_at;

        store
            .update_feature("FEAT-2", |task| {
                task.iterations += 1;
                task.phase = WorkflowPhase::Plan;
            })
            .unwrap();

        let task = store.load().unwrap().features["FEAT-2"].clone();
        assert_eq!(task.iterations, 1);
        assert_eq!(task.phase, WorkflowPhase::Plan);
        assert!(task.updated_at >= before);
    }

    #[test]
    fn test_update_feature_missing_id_is_noop() {
        let (store, _dir) = make_store();
        store
            .update_feature("FEAT-404", |task| task.iterations = 99)
            .unwrap();
        assert!(store.load().unwrap().features.is_empty());
    }

    #[test]
    fn test_retire_completed_moves_id() {
        let mut doc = StateDocument::default();
        doc.features
            .insert("FEAT-3".into(), FeatureTask::new("FEAT-3"));
        doc.retire_completed("FEAT-3");
        assert!(doc.features.is_empty());
        assert_eq!(doc.completed, vec!["FEAT-3"]);
        assert!(doc.knows("FEAT-3"));
    }

    #[test]
    fn test_retire_is_idempotent() {
        let mut doc = StateDocument::default();
        doc.features
            .insert("FEAT-4".into(), FeatureTask::new("FEAT-4"));
        doc.retire_completed("FEAT-4");
        doc.retire_completed("FEAT-4");
        assert_eq!(doc.completed.len(), 1);
    }

    #[test]
    fn test_running_count_ignores_stopped_tasks() {
        let mut doc = StateDocument::default();
        let mut a = FeatureTask::new("A");
        a.status = TaskStatus::Running;
        let mut b = FeatureTask::new("B");
        b.status = TaskStatus::Paused;
        let mut c = FeatureTask::new("C");
        c.status = TaskStatus::Waiting;
        doc.features.insert("A".into(), a);
        doc.features.insert("B".into(), b);
        doc.features.insert("C".into(), c);
        assert_eq!(doc.running_count(), 2);
    }

    #[test]
    fn test_task_status_activity() {
        assert!(TaskStatus::Running.is_active());
        assert!(TaskStatus::Waiting.is_active());
        assert!(!TaskStatus::NeedsInput.is_active());
        assert!(!TaskStatus::Paused.is_active());
        assert!(!TaskStatus::MaxIterations.is_active());
        assert!(!TaskStatus::Complete.is_active());
    }

    #[test]
    fn test_state_document_serde_roundtrip() {
        let mut doc = StateDocument::default();
        doc.orchestrator.status = OrchestratorStatus::Running;
        doc.orchestrator.owner_pid = Some(4242);
        doc.features
            .insert("FEAT-5".into(), FeatureTask::new("FEAT-5"));
        doc.completed.push("FEAT-1".into());

        let json = serde_json::to_string(&doc).unwrap();
        let parsed: StateDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.orchestrator.owner_pid, Some(4242));
        assert_eq!(parsed.completed, vec!["FEAT-1"]);
        assert!(parsed.features.contains_key("FEAT-5"));
    }

    #[test]
    fn test_recovery_after_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let store = StateStore::new(path.clone());
            store
                .update(|doc| {
                    let mut task = FeatureTask::new("FEAT-6");
                    task.phase = WorkflowPhase::Implement;
                    task.iterations = 7;
                    doc.features.insert("FEAT-6".into(), task);
                })
                .unwrap();
        }
        {
            let store = StateStore::new(path);
            let doc = store.load().unwrap();
            assert_eq!(doc.features["FEAT-6"].phase, WorkflowPhase::Implement);
            assert_eq!(doc.features["FEAT-6"].iterations, 7);
        }
    }
}
