use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Autonomous feature workflow orchestrator")]
pub struct Cli {
    #[arg(short, long)]
    pub verbose: bool,

    /// Project root (defaults to the current directory)
    #[arg(long)]
    pub project_dir: Option<PathBuf>,

    /// Maximum features developed concurrently (run mode)
    #[arg(value_name = "MAX_PARALLEL", conflicts_with_all = ["status", "stop"])]
    pub max_parallel: Option<usize>,

    /// Render a read-only snapshot of orchestrator and feature status
    #[arg(long, conflicts_with = "stop")]
    pub status: bool,

    /// Signal the running orchestrator to stop gracefully
    #[arg(long)]
    pub stop: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    // Run mode logs to stderr and to a file under .conductor/; the
    // read-only modes stay on stderr. The guard must outlive the run.
    let run_mode = !cli.status && !cli.stop;
    let _log_guard = init_tracing(cli.verbose, run_mode.then(|| project_dir.clone()))?;

    if cli.status {
        cmd::status::render(&project_dir)
    } else if cli.stop {
        cmd::stop::signal_stop(&project_dir)
    } else {
        cmd::run::run_orchestrator(&project_dir, cli.max_parallel).await
    }
}

fn init_tracing(
    verbose: bool,
    file_log_dir: Option<PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match file_log_dir {
        Some(dir) => {
            let log_dir = dir.join(conductor::config::CONDUCTOR_DIR);
            std::fs::create_dir_all(&log_dir)?;
            let appender = tracing_appender::rolling::never(log_dir, "conductor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}
