//! Read-only status snapshot, `conductor --status`.
//!
//! Renders the last durably committed state, including paused and
//! needs-input features with their exact phase, so an operator can
//! diagnose without reading logs. No side effects.

use anyhow::Result;
use conductor::config::Config;
use conductor::state::{OrchestratorStatus, StateStore, TaskStatus};
use console::style;
use std::path::Path;

pub fn render(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    let store = StateStore::new(config.state_file());
    let doc = store.load()?;

    let status_label = match doc.orchestrator.status {
        OrchestratorStatus::Idle => style("idle").dim(),
        OrchestratorStatus::Running => style("running").green(),
        OrchestratorStatus::Stopped => style("stopped").yellow(),
        OrchestratorStatus::Complete => style("complete").green(),
    };
    println!("Orchestrator: {status_label}");
    if let Some(started) = doc.orchestrator.started_at {
        println!("  started:      {}", started.to_rfc3339());
    }
    println!("  max parallel: {}", doc.orchestrator.max_parallel);
    if let Some(pid) = doc.orchestrator.owner_pid {
        println!("  owner pid:    {pid}");
    }
    println!();

    if doc.features.is_empty() {
        println!("No active features.");
    } else {
        println!(
            "{:<16} {:<14} {:<11} {:>5} {:>6}  {}",
            "FEATURE", "STATUS", "PHASE", "ITER", "FAILS", "UPDATED"
        );
        for task in doc.features.values() {
            let status = match task.status {
                TaskStatus::Running => style(task.status.as_str()).green(),
                TaskStatus::Waiting => style(task.status.as_str()).cyan(),
                TaskStatus::NeedsInput => style(task.status.as_str()).yellow(),
                TaskStatus::Paused => style(task.status.as_str()).red(),
                TaskStatus::MaxIterations => style(task.status.as_str()).magenta(),
                TaskStatus::Complete => style(task.status.as_str()).green(),
            };
            println!(
                "{:<16} {:<14} {:<11} {:>5} {:>6}  {}",
                task.id,
                status,
                task.phase.as_str(),
                task.iterations,
                task.consecutive_failures,
                task.updated_at.to_rfc3339(),
            );
        }
    }

    if !doc.completed.is_empty() {
        println!("\nCompleted: {}", doc.completed.join(", "));
    }
    if !doc.failed.is_empty() {
        println!("Failed:    {}", doc.failed.join(", "));
    }
    Ok(())
}
