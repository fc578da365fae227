//! Version control, consumed through a narrow interface.
//!
//! The orchestrator needs five operations from the VCS: branch existence,
//! branch creation, isolated-workspace add/remove, and a merged-into-
//! mainline query. Everything else git can do is out of scope, and the
//! trait seam lets scenario tests run against an in-memory stub.

mod git;
mod workspace;

pub use git::GitVcs;
pub use workspace::WorkspaceManager;

use crate::errors::VcsError;
use std::path::{Path, PathBuf};

pub trait VersionControl: Send + Sync {
    fn branch_exists(&self, name: &str) -> Result<bool, VcsError>;

    /// Create `name` pointing at the tip of `from_ref`. Fails if the branch
    /// already exists; callers check first.
    fn create_branch(&self, name: &str, from_ref: &str) -> Result<(), VcsError>;

    /// Create an isolated working copy bound to `branch` and return its
    /// path. Idempotent: an existing workspace for the branch is returned
    /// unchanged.
    fn create_isolated_workspace(&self, branch: &str) -> Result<PathBuf, VcsError>;

    /// Remove a working copy. A no-op for a path that does not exist.
    fn remove_isolated_workspace(&self, path: &Path) -> Result<(), VcsError>;

    /// Whether `name`'s tip is reachable from any of `targets`.
    fn is_branch_merged(&self, name: &str, targets: &[String]) -> Result<bool, VcsError>;

    /// Push `name` to the configured remote.
    fn push_branch(&self, name: &str) -> Result<(), VcsError>;
}

/// Deterministic slug for branch and directory names: lowercase, runs of
/// non-alphanumerics collapsed to single dashes.
pub fn slugify(id: &str) -> String {
    let mut slug = String::with_capacity(id.len());
    let mut last_dash = true;
    for ch in id.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    if slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_ticket_key() {
        assert_eq!(slugify("FEAT-123"), "feat-123");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("ACME//billing: exports"), "acme-billing-exports");
    }

    #[test]
    fn test_slugify_trims_edges() {
        assert_eq!(slugify("--FEAT-9--"), "feat-9");
    }

    #[test]
    fn test_slugify_is_deterministic() {
        assert_eq!(slugify("Feat_42"), slugify("feat_42"));
    }
}
