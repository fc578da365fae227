//! Typed error hierarchy for the conductor orchestrator.
//!
//! Four top-level enums cover the subsystems:
//! - `OrchestratorError` — scheduler and state-store failures
//! - `WorkflowError` — per-feature control-loop failures
//! - `VcsError` — version-control and workspace failures
//! - `HostError` — code-hosting (pull request) failures

use thiserror::Error;

/// Errors from the top-level scheduler and the durable state store.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Another orchestrator run holds the lock at {path}")]
    AlreadyRunning { path: std::path::PathBuf },

    #[error("Failed to create lock file at {path}: {source}")]
    LockFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read state file at {path}: {source}")]
    StateReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file at {path}: {source}")]
    StateWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file at {path} is not valid JSON: {source}")]
    StateCorrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No running orchestrator recorded in the state file")]
    NotRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from one feature's control loop.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Agent invocation failed for feature {feature}: {message}")]
    AgentFailed { feature: String, message: String },

    #[error(transparent)]
    State(#[from] OrchestratorError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the version-control layer (branches, worktrees).
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Failed to open repository: {0}")]
    OpenFailed(#[source] git2::Error),

    #[error("Branch {branch} not found")]
    BranchNotFound { branch: String },

    #[error("Mainline ref {mainline} not found")]
    MainlineNotFound { mainline: String },

    #[error("Failed to provision workspace for {feature}: {source}")]
    ProvisionFailed {
        feature: String,
        #[source]
        source: git2::Error,
    },

    #[error("Workspace I/O failure at {path}: {source}")]
    WorkspaceIo {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// Errors from the code-hosting review system.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Hosting API request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Hosting API returned {status} for {context}")]
    Status {
        status: u16,
        context: String,
    },

    #[error("No hosting repository configured")]
    NotConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn orchestrator_error_already_running_carries_path() {
        let err = OrchestratorError::AlreadyRunning {
            path: PathBuf::from("/work/.conductor/conductor.lock"),
        };
        assert!(err.to_string().contains("conductor.lock"));
    }

    #[test]
    fn orchestrator_error_state_read_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = OrchestratorError::StateReadFailed {
            path: PathBuf::from("/x/state.json"),
            source: io_err,
        };
        match &err {
            OrchestratorError::StateReadFailed { path, source } => {
                assert_eq!(path, &PathBuf::from("/x/state.json"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected StateReadFailed"),
        }
    }

    #[test]
    fn workflow_error_converts_from_vcs_error() {
        let inner = VcsError::BranchNotFound {
            branch: "feature/x".into(),
        };
        let wf: WorkflowError = inner.into();
        match &wf {
            WorkflowError::Vcs(VcsError::BranchNotFound { branch }) => {
                assert_eq!(branch, "feature/x");
            }
            _ => panic!("Expected WorkflowError::Vcs(BranchNotFound)"),
        }
    }

    #[test]
    fn host_error_status_carries_code() {
        let err = HostError::Status {
            status: 422,
            context: "create pull request".into(),
        };
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("create pull request"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&OrchestratorError::NotRunning);
        assert_std_error(&WorkflowError::AgentFailed {
            feature: "FEAT-1".into(),
            message: "spawn failed".into(),
        });
        assert_std_error(&VcsError::MainlineNotFound {
            mainline: "main".into(),
        });
        assert_std_error(&HostError::NotConfigured);
    }
}
