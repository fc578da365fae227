//! The external coding agent.
//!
//! The agent is consumed through the [`CodingAgent`] trait: one
//! synchronous-from-the-workflow's-point-of-view call that takes a
//! natural-language instruction and returns free-form output text. The
//! production implementation spawns the configured CLI per invocation,
//! feeding the instruction over stdin; scenario tests inject stubs.

use crate::config::AgentConfig;
use crate::phase::WorkflowPhase;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Context for one agent invocation.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub feature_id: &'a str,
    pub phase: WorkflowPhase,
    pub iteration: u32,
    pub instruction: &'a str,
    /// Directory the agent runs in: the feature's workspace when one
    /// exists, the project root before that.
    pub working_dir: &'a Path,
}

#[async_trait]
pub trait CodingAgent: Send + Sync {
    /// Invoke the agent and return its raw output text. This is the only
    /// blocking/suspending point in the whole system and may take minutes.
    async fn invoke(&self, request: AgentRequest<'_>) -> Result<String>;
}

/// Subprocess-backed agent. Writes the instruction and captured output to
/// per-invocation files under the log directory so operators can replay
/// any iteration.
pub struct ProcessAgent {
    command: String,
    args: Vec<String>,
    log_dir: PathBuf,
}

impl ProcessAgent {
    pub fn new(config: &AgentConfig, log_dir: PathBuf) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            log_dir,
        }
    }

    fn log_path(&self, request: &AgentRequest<'_>, suffix: &str) -> PathBuf {
        self.log_dir.join(format!(
            "{}-{}-iter-{:03}-{}",
            request.feature_id, request.phase, request.iteration, suffix
        ))
    }
}

#[async_trait]
impl CodingAgent for ProcessAgent {
    async fn invoke(&self, request: AgentRequest<'_>) -> Result<String> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create agent log directory")?;
        let prompt_file = self.log_path(&request, "prompt.md");
        std::fs::write(&prompt_file, request.instruction)
            .with_context(|| format!("Failed to write prompt file: {}", prompt_file.display()))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn agent process: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.instruction.as_bytes())
                .await
                .context("Failed to write instruction to agent stdin")?;
            stdin.shutdown().await.context("Failed to close agent stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for agent process")?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        let output_file = self.log_path(&request, "output.log");
        std::fs::write(&output_file, &stdout)
            .with_context(|| format!("Failed to write output file: {}", output_file.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Agent exited with {} for {} {}: {}",
                output.status,
                request.feature_id,
                request.phase,
                stderr.trim()
            );
        }
        Ok(stdout)
    }
}
