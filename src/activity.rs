//! Append-only, human-readable activity log.
//!
//! One timestamped line per significant event. Never rewritten; this is
//! the narrative trail for post-hoc audit, next to (not instead of) the
//! structured state file.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one event line. Creates the file (and parent directory) on
    /// first use.
    pub fn record(&self, event: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let line = format!("{} {}\n", Utc::now().to_rfc3339(), event);
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open activity log")?
            .write_all(line.as_bytes())
            .context("Failed to write activity log entry")?;
        Ok(())
    }
}
