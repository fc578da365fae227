//! The per-feature document set and its structural markers.
//!
//! A feature is a directory of human- and agent-authored markdown documents.
//! The orchestrator treats their prose as opaque; the only things parsed
//! here are checklist checkboxes, decision-table rows, and the wrap-up done
//! marker. Everything is re-read from disk on demand; these documents are
//! the durable record the whole phase machine is derived from.

use crate::signals::FEATURE_COMPLETE;
use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const SPEC_DOC: &str = "spec.md";
pub const DESIGN_DOC: &str = "design.md";
pub const TASKS_DOC: &str = "tasks.md";
pub const STATUS_DOC: &str = "status.md";
pub const WRAPUP_DOC: &str = "wrapup.md";
pub const SESSION_LOG: &str = "session.log";
pub const BACKLOG_INDEX: &str = "backlog.md";

static CHECKLIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s*\[( |x|X)\]\s*(\S.*)$").unwrap());

/// A table separator row like `|---|---|` or `| :-- | --: |`.
static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|[\s:|-]+\|?\s*$").unwrap());

/// Placeholder marking an unfilled decision cell.
const DECISION_PLACEHOLDER: &str = "TBD";

/// Checked/total counts for a task checklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecklistStats {
    pub checked: usize,
    pub total: usize,
}

impl ChecklistStats {
    /// Completion ratio in `[0, 1]`; an empty checklist counts as 0 so
    /// detection stays on the earlier side.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.checked as f64 / self.total as f64
        }
    }

    pub fn unchecked(&self) -> usize {
        self.total - self.checked
    }
}

/// Count checklist items in markdown text.
pub fn checklist_stats(text: &str) -> ChecklistStats {
    let mut stats = ChecklistStats::default();
    for cap in CHECKLIST_ITEM.captures_iter(text) {
        stats.total += 1;
        if !cap[1].trim().is_empty() {
            stats.checked += 1;
        }
    }
    stats
}

/// The unchecked item texts, in document order.
pub fn unchecked_items(text: &str) -> Vec<String> {
    CHECKLIST_ITEM
        .captures_iter(text)
        .filter(|cap| cap[1].trim().is_empty())
        .map(|cap| cap[2].trim().to_string())
        .collect()
}

/// Count filled decision rows in a specification document.
///
/// A decision row is a `|`-delimited table row that is neither the header
/// (the first non-separator row of a table) nor a separator; it is filled
/// when no cell carries the `TBD` placeholder.
pub fn filled_decision_rows(text: &str) -> usize {
    let mut filled = 0;
    let mut rows_in_table = 0;
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('|') {
            rows_in_table = 0;
            continue;
        }
        if TABLE_SEPARATOR.is_match(trimmed) {
            continue;
        }
        rows_in_table += 1;
        if rows_in_table == 1 {
            // First non-separator row of a table is the header.
            continue;
        }
        if !trimmed.contains(DECISION_PLACEHOLDER) {
            filled += 1;
        }
    }
    filled
}

/// Point-in-time view of one feature's documents, as consumed by the
/// artifact inspector. Building it never fails on missing optional files.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSnapshot {
    pub filled_decision_rows: usize,
    pub has_design: bool,
    pub has_tasks: bool,
    pub checklist: ChecklistStats,
    pub wrapup_done: bool,
}

/// Resolves a feature id to its named documents.
#[derive(Debug, Clone)]
pub struct FeatureDocs {
    pub id: String,
    dir: PathBuf,
}

impl FeatureDocs {
    pub fn new(features_root: &Path, id: &str) -> Self {
        Self {
            id: id.to_string(),
            dir: features_root.join(id),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn spec_path(&self) -> PathBuf {
        self.dir.join(SPEC_DOC)
    }

    pub fn design_path(&self) -> PathBuf {
        self.dir.join(DESIGN_DOC)
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_DOC)
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_DOC)
    }

    pub fn wrapup_path(&self) -> PathBuf {
        self.dir.join(WRAPUP_DOC)
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.dir.join(SESSION_LOG)
    }

    fn read_optional(path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    /// Snapshot the structural markers of every document. Absent files are
    /// "condition not met", never an error.
    pub fn snapshot(&self) -> ArtifactSnapshot {
        let spec = Self::read_optional(&self.spec_path());
        let tasks = Self::read_optional(&self.tasks_path());
        let wrapup = Self::read_optional(&self.wrapup_path());
        ArtifactSnapshot {
            filled_decision_rows: spec.as_deref().map(filled_decision_rows).unwrap_or(0),
            has_design: self.design_path().exists(),
            has_tasks: tasks.is_some(),
            checklist: tasks.as_deref().map(checklist_stats).unwrap_or_default(),
            wrapup_done: wrapup
                .map(|text| text.contains(FEATURE_COMPLETE))
                .unwrap_or(false),
        }
    }

    pub fn checklist(&self) -> ChecklistStats {
        Self::read_optional(&self.tasks_path())
            .as_deref()
            .map(checklist_stats)
            .unwrap_or_default()
    }

    pub fn unchecked_tasks(&self) -> Vec<String> {
        Self::read_optional(&self.tasks_path())
            .as_deref()
            .map(unchecked_items)
            .unwrap_or_default()
    }

    /// Append one timestamped line to the feature's session log. Called for
    /// every executor invocation regardless of outcome.
    pub fn append_session_log(&self, phase: &str, outcome: &str, note: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create feature directory: {}", self.dir.display()))?;
        let line = format!("{}|{}|{}|{}\n", Utc::now().to_rfc3339(), phase, outcome, note);
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_log_path())
            .context("Failed to open session log")?
            .write_all(line.as_bytes())
            .context("Failed to write session log entry")?;
        Ok(())
    }
}

/// Pending feature ids from the backlog index, in listing order.
///
/// An unchecked entry (`- [ ] FEAT-1`) is pending; a checked one is
/// archived. A missing index means an empty backlog.
pub fn pending_features(features_root: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(features_root.join(BACKLOG_INDEX)) else {
        return Vec::new();
    };
    unchecked_items(&text)
        .iter()
        .filter_map(|item| item.split_whitespace().next().map(|s| s.to_string()))
        .collect()
}
