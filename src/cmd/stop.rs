//! Graceful shutdown request, `conductor --stop`.
//!
//! Best effort: delivers SIGTERM to the recorded owner process and returns
//! without waiting. The running orchestrator translates the signal into
//! its internal shutdown channel and marks the state file itself; workers
//! are independently resumable on the next start.

use anyhow::{Context, Result, bail};
use conductor::config::Config;
use conductor::state::{OrchestratorStatus, StateStore};
use std::path::Path;

pub fn signal_stop(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    let store = StateStore::new(config.state_file());
    let doc = store.load()?;

    if doc.orchestrator.status != OrchestratorStatus::Running {
        bail!("No running orchestrator recorded in the state file");
    }
    let Some(pid) = doc.orchestrator.owner_pid else {
        bail!("State file records a running orchestrator but no owner pid");
    };

    let status = std::process::Command::new("kill")
        .arg(pid.to_string())
        .status()
        .context("Failed to deliver termination signal")?;
    if !status.success() {
        bail!("kill exited with {status}; the owner process may already be gone");
    }
    println!("Stop requested; orchestrator pid {pid} will shut down at its next checkpoint.");
    Ok(())
}
