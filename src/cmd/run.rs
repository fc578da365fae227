//! The long-lived orchestrator run, `conductor [MAX_PARALLEL]`.

use anyhow::{Context, Result};
use conductor::agent::ProcessAgent;
use conductor::config::Config;
use conductor::hosting::{DisabledHost, GitHubHost, ReviewHost};
use conductor::orchestrator::{Orchestrator, install_signal_handler};
use conductor::vcs::GitVcs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub async fn run_orchestrator(project_dir: &Path, max_parallel: Option<usize>) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())
        .context("Failed to load conductor configuration")?;
    config.ensure_directories()?;

    let agent = Arc::new(ProcessAgent::new(&config.toml.agent, config.agent_log_dir()));
    let host: Arc<dyn ReviewHost> =
        match GitHubHost::from_config(&config.toml.hosting, &config.toml.vcs.mainline) {
            Some(host) => Arc::new(host),
            None => {
                warn!("no hosting repository configured; pull-request phases will escalate");
                Arc::new(DisabledHost)
            }
        };
    let vcs = Arc::new(GitVcs::new(
        config.project_dir.clone(),
        config.workspaces_dir(),
        &config.toml.vcs.remote,
    ));

    let orchestrator = Orchestrator::new(config, agent, host, vcs);
    install_signal_handler(orchestrator.shutdown_handle())?;
    orchestrator.run(max_parallel).await?;
    Ok(())
}
