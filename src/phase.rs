//! The seven-phase feature lifecycle.
//!
//! Phases are *detected* from durable artifacts on every loop pass, never
//! advanced from an in-memory cursor, so the enum here is a fixed contract
//! rather than loadable configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the feature lifecycle, plus the terminal `Complete` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkflowPhase {
    Interview,
    Plan,
    Branch,
    Implement,
    Pr,
    Merge,
    WrapUp,
    Complete,
}

impl WorkflowPhase {
    /// The seven executable phases in lifecycle order (excludes `Complete`).
    pub fn all() -> [WorkflowPhase; 7] {
        [
            WorkflowPhase::Interview,
            WorkflowPhase::Plan,
            WorkflowPhase::Branch,
            WorkflowPhase::Implement,
            WorkflowPhase::Pr,
            WorkflowPhase::Merge,
            WorkflowPhase::WrapUp,
        ]
    }

    /// Operator-facing name, used in logs and the status render.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Interview => "interview",
            WorkflowPhase::Plan => "plan",
            WorkflowPhase::Branch => "branch",
            WorkflowPhase::Implement => "implement",
            WorkflowPhase::Pr => "pr",
            WorkflowPhase::Merge => "merge",
            WorkflowPhase::WrapUp => "wrap-up",
            WorkflowPhase::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowPhase::Complete)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_lifecycle_order() {
        let phases = WorkflowPhase::all();
        assert_eq!(phases.len(), 7);
        for pair in phases.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
        assert_eq!(phases[0], WorkflowPhase::Interview);
        assert_eq!(phases[6], WorkflowPhase::WrapUp);
    }

    #[test]
    fn test_complete_is_after_every_phase() {
        for phase in WorkflowPhase::all() {
            assert!(phase < WorkflowPhase::Complete);
        }
        assert!(WorkflowPhase::Complete.is_terminal());
        assert!(!WorkflowPhase::Merge.is_terminal());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(WorkflowPhase::WrapUp.to_string(), "wrap-up");
        assert_eq!(WorkflowPhase::Pr.to_string(), "pr");
    }

    #[test]
    fn test_serde_roundtrip() {
        for phase in WorkflowPhase::all() {
            let json = serde_json::to_string(&phase).unwrap();
            let parsed: WorkflowPhase = serde_json::from_str(&json).unwrap();
            assert_eq!(phase, parsed);
        }
    }
}
