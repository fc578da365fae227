//! Configuration for the conductor orchestrator.
//!
//! Settings are read from an optional `conductor.toml` at the project root;
//! every field has a default so a bare repository works out of the box.
//! The phase-detection thresholds are tuning parameters, so they live here
//! rather than as hard-coded constants.
//!
//! # Configuration File Format
//!
//! ```toml
//! [orchestrator]
//! max_parallel = 3
//! poll_interval_secs = 30
//!
//! [workflow]
//! max_iterations = 30
//! failure_threshold = 3
//! merge_poll_cooldown_secs = 60
//!
//! [detection]
//! pr_ready_ratio = 0.9
//! min_decision_rows = 2
//! implement_batch = 3
//!
//! [agent]
//! command = "claude"
//! args = ["-p"]
//!
//! [hosting]
//! repo = "owner/repo"
//! token_env = "GITHUB_TOKEN"
//!
//! [vcs]
//! mainline = "main"
//! remote = "origin"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "conductor.toml";
/// Directory under the project root holding conductor's own files
/// (state, logs, workspaces). Never part of any feature's artifacts.
pub const CONDUCTOR_DIR: &str = ".conductor";

/// Top-level scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Per-feature control-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_merge_poll_cooldown_secs")]
    pub merge_poll_cooldown_secs: u64,
}

/// Phase-detection heuristics (see the artifact inspector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Checklist completion ratio at which the feature is PR-ready.
    #[serde(default = "default_pr_ready_ratio")]
    pub pr_ready_ratio: f64,
    /// Filled decision rows required for the specification to count as
    /// interview-complete.
    #[serde(default = "default_min_decision_rows")]
    pub min_decision_rows: usize,
    /// Unchecked task items handed to the agent per implement call.
    #[serde(default = "default_implement_batch")]
    pub implement_batch: usize,
}

/// External coding agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_command")]
    pub command: String,
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
}

/// Code-hosting review system (pull requests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    /// `owner/repo` slug. Empty disables real hosting calls.
    #[serde(default)]
    pub repo: String,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

/// Version-control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    #[serde(default = "default_mainline")]
    pub mainline: String,
    #[serde(default = "default_remote")]
    pub remote: String,
}

fn default_max_parallel() -> usize {
    3
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_max_iterations() -> u32 {
    30
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_merge_poll_cooldown_secs() -> u64 {
    60
}
fn default_pr_ready_ratio() -> f64 {
    0.9
}
fn default_min_decision_rows() -> usize {
    2
}
fn default_implement_batch() -> usize {
    3
}
fn default_agent_command() -> String {
    "claude".to_string()
}
fn default_agent_args() -> Vec<String> {
    vec!["-p".to_string()]
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_mainline() -> String {
    "main".to_string()
}
fn default_remote() -> String {
    "origin".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            failure_threshold: default_failure_threshold(),
            merge_poll_cooldown_secs: default_merge_poll_cooldown_secs(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            pr_ready_ratio: default_pr_ready_ratio(),
            min_decision_rows: default_min_decision_rows(),
            implement_batch: default_implement_batch(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
        }
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            token_env: default_token_env(),
        }
    }
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            mainline: default_mainline(),
            remote: default_remote(),
        }
    }
}

/// The parsed `conductor.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub hosting: HostingConfig,
    #[serde(default)]
    pub vcs: VcsConfig,
}

impl ConductorToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Resolved runtime configuration: parsed file plus derived paths.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub toml: ConductorToml,
}

impl Config {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let toml = ConductorToml::load_or_default(&project_dir)?;
        Ok(Self { project_dir, toml })
    }

    pub fn conductor_dir(&self) -> PathBuf {
        self.project_dir.join(CONDUCTOR_DIR)
    }

    pub fn features_root(&self) -> PathBuf {
        self.project_dir.join("features")
    }

    pub fn state_file(&self) -> PathBuf {
        self.conductor_dir().join("state.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.conductor_dir().join("conductor.lock")
    }

    pub fn activity_log(&self) -> PathBuf {
        self.conductor_dir().join("activity.log")
    }

    pub fn agent_log_dir(&self) -> PathBuf {
        self.conductor_dir().join("logs")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.conductor_dir().join("workspaces")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.toml.orchestrator.poll_interval_secs)
    }

    pub fn merge_poll_cooldown(&self) -> Duration {
        Duration::from_secs(self.toml.workflow.merge_poll_cooldown_secs)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.conductor_dir(),
            self.agent_log_dir(),
            self.workspaces_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
