//! git2-backed implementation of the version-control interface.
//!
//! Isolation uses git worktrees: one branch-bound working copy per feature
//! under the conductor workspaces directory. The repository is reopened per
//! call; `git2::Repository` is not `Sync`, and these operations are short.

use super::{VersionControl, slugify};
use crate::errors::VcsError;
use git2::{BranchType, Repository, WorktreeAddOptions, WorktreePruneOptions};
use std::fs;
use std::path::{Path, PathBuf};

pub struct GitVcs {
    repo_path: PathBuf,
    workspaces_dir: PathBuf,
    remote: String,
}

impl GitVcs {
    pub fn new(repo_path: PathBuf, workspaces_dir: PathBuf, remote: &str) -> Self {
        Self {
            repo_path,
            workspaces_dir,
            remote: remote.to_string(),
        }
    }

    fn open(&self) -> Result<Repository, VcsError> {
        Repository::open(&self.repo_path).map_err(VcsError::OpenFailed)
    }

    fn branch_tip(repo: &Repository, name: &str) -> Result<git2::Oid, VcsError> {
        let branch = repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| VcsError::BranchNotFound {
                branch: name.to_string(),
            })?;
        branch
            .get()
            .peel_to_commit()
            .map(|c| c.id())
            .map_err(VcsError::Git)
    }

    /// Drop a stale worktree registration whose directory is gone, so a
    /// fresh add under the same name succeeds.
    fn prune_stale(repo: &Repository, name: &str) -> Result<(), VcsError> {
        if let Ok(worktree) = repo.find_worktree(name)
            && !worktree.path().exists()
        {
            let mut opts = WorktreePruneOptions::new();
            opts.valid(true).working_tree(true);
            worktree.prune(Some(&mut opts))?;
        }
        Ok(())
    }
}

impl VersionControl for GitVcs {
    fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        let repo = self.open()?;
        Ok(repo.find_branch(name, BranchType::Local).is_ok())
    }

    fn create_branch(&self, name: &str, from_ref: &str) -> Result<(), VcsError> {
        let repo = self.open()?;
        let target = repo
            .find_branch(from_ref, BranchType::Local)
            .map_err(|_| VcsError::MainlineNotFound {
                mainline: from_ref.to_string(),
            })?
            .get()
            .peel_to_commit()?;
        repo.branch(name, &target, false)?;
        Ok(())
    }

    fn create_isolated_workspace(&self, branch: &str) -> Result<PathBuf, VcsError> {
        let name = slugify(branch);
        let path = self.workspaces_dir.join(&name);
        if path.exists() {
            return Ok(path);
        }

        let repo = self.open()?;
        Self::prune_stale(&repo, &name)?;
        fs::create_dir_all(&self.workspaces_dir).map_err(|source| VcsError::WorkspaceIo {
            path: self.workspaces_dir.clone(),
            source,
        })?;

        let reference = repo.find_reference(&format!("refs/heads/{}", branch))?;
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        repo.worktree(&name, &path, Some(&opts))
            .map_err(|source| VcsError::ProvisionFailed {
                feature: branch.to_string(),
                source,
            })?;
        Ok(path)
    }

    fn remove_isolated_workspace(&self, path: &Path) -> Result<(), VcsError> {
        if path.exists() {
            fs::remove_dir_all(path).map_err(|source| VcsError::WorkspaceIo {
                path: path.to_path_buf(),
                source,
            })?;
        }
        // Prune the registration whether or not the directory was present.
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let repo = self.open()?;
            Self::prune_stale(&repo, name)?;
        }
        Ok(())
    }

    fn is_branch_merged(&self, name: &str, targets: &[String]) -> Result<bool, VcsError> {
        let repo = self.open()?;
        let branch_oid = match Self::branch_tip(&repo, name) {
            Ok(oid) => oid,
            // A branch that never existed (or was deleted post-merge by the
            // hosting system) cannot be judged here; the PR state covers it.
            Err(VcsError::BranchNotFound { .. }) => return Ok(false),
            Err(err) => return Err(err),
        };
        for target in targets {
            let Ok(target_oid) = Self::branch_tip(&repo, target) else {
                continue;
            };
            if target_oid == branch_oid || repo.graph_descendant_of(target_oid, branch_oid)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn push_branch(&self, name: &str) -> Result<(), VcsError> {
        let repo = self.open()?;
        let mut remote = repo.find_remote(&self.remote)?;
        let config = repo.config()?;

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(move |url, username, _allowed| {
            git2::Cred::credential_helper(&config, url, username)
        });
        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{name}:refs/heads/{name}");
        remote.push(&[refspec.as_str()], Some(&mut opts))?;
        Ok(())
    }
}
