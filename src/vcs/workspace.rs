//! Workspace provisioning and reclamation.
//!
//! One branch-bound, exclusively-owned working copy per feature. Provision
//! is idempotent so an interrupted run re-provisions harmlessly; reclaim is
//! a no-op for paths that are already gone.

use super::{VersionControl, slugify};
use crate::errors::VcsError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct WorkspaceManager {
    vcs: Arc<dyn VersionControl>,
    mainline: String,
}

impl WorkspaceManager {
    pub fn new(vcs: Arc<dyn VersionControl>, mainline: &str) -> Self {
        Self {
            vcs,
            mainline: mainline.to_string(),
        }
    }

    /// Deterministic branch name for a feature id.
    pub fn branch_name(feature_id: &str) -> String {
        format!("feature/{}", slugify(feature_id))
    }

    /// Ensure the feature's branch and working copy exist; returns the
    /// workspace path, unchanged if it was already provisioned.
    pub fn provision(&self, feature_id: &str) -> Result<PathBuf, VcsError> {
        let branch = Self::branch_name(feature_id);
        if !self.vcs.branch_exists(&branch)? {
            self.vcs.create_branch(&branch, &self.mainline)?;
        }
        self.vcs.create_isolated_workspace(&branch)
    }

    pub fn reclaim(&self, path: &Path) -> Result<(), VcsError> {
        self.vcs.remove_isolated_workspace(path)
    }
}
