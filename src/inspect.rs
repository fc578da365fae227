//! Phase detection from durable evidence.
//!
//! The workflow never trusts its own last-known phase. Each loop pass the
//! caller gathers three snapshots (the feature's documents, whether its
//! branch exists, and its pull-request state) and this module derives the
//! phase to execute next. Pure and total over its inputs: the same
//! snapshots always produce the same phase, and ambiguity resolves toward
//! the earlier phase (re-running an idempotent phase is safe; skipping
//! ahead is not).

use crate::artifacts::ArtifactSnapshot;
use crate::config::DetectionConfig;
use crate::hosting::PrState;
use crate::phase::WorkflowPhase;

/// Derive the phase to execute next, scanning backward from `Complete` for
/// the furthest completion evidence present.
pub fn detect_phase(
    snapshot: &ArtifactSnapshot,
    branch_exists: bool,
    pr_state: PrState,
    detection: &DetectionConfig,
) -> WorkflowPhase {
    if snapshot.wrapup_done {
        return WorkflowPhase::Complete;
    }
    if pr_state == PrState::Merged {
        // Integrated but not yet reconciled into the wrap-up record.
        return WorkflowPhase::WrapUp;
    }
    if pr_state.exists() {
        // Open waits for review; closed-without-merge fails in the merge
        // phase and escalates from there.
        return WorkflowPhase::Merge;
    }
    if branch_exists {
        if snapshot.checklist.ratio() >= detection.pr_ready_ratio {
            return WorkflowPhase::Pr;
        }
        return WorkflowPhase::Implement;
    }
    if snapshot.has_design && snapshot.has_tasks {
        return WorkflowPhase::Branch;
    }
    if snapshot.filled_decision_rows >= detection.min_decision_rows {
        return WorkflowPhase::Plan;
    }
    WorkflowPhase::Interview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ChecklistStats;

    fn empty() -> ArtifactSnapshot {
        ArtifactSnapshot::default()
    }

    fn detection() -> DetectionConfig {
        DetectionConfig::default()
    }

    #[test]
    fn test_empty_artifacts_start_at_interview() {
        let phase = detect_phase(&empty(), false, PrState::None, &detection());
        assert_eq!(phase, WorkflowPhase::Interview);
    }

    #[test]
    fn test_interview_complete_moves_to_plan() {
        let snap = ArtifactSnapshot {
            filled_decision_rows: 2,
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, false, PrState::None, &detection()),
            WorkflowPhase::Plan
        );
    }

    #[test]
    fn test_one_decision_row_is_not_enough() {
        let snap = ArtifactSnapshot {
            filled_decision_rows: 1,
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, false, PrState::None, &detection()),
            WorkflowPhase::Interview
        );
    }

    #[test]
    fn test_design_and_tasks_move_to_branch() {
        let snap = ArtifactSnapshot {
            filled_decision_rows: 3,
            has_design: true,
            has_tasks: true,
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, false, PrState::None, &detection()),
            WorkflowPhase::Branch
        );
    }

    #[test]
    fn test_design_without_tasks_stays_at_plan() {
        // Ambiguity between Plan and Branch resolves to the earlier phase.
        let snap = ArtifactSnapshot {
            filled_decision_rows: 3,
            has_design: true,
            has_tasks: false,
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, false, PrState::None, &detection()),
            WorkflowPhase::Plan
        );
    }

    #[test]
    fn test_branch_exists_moves_to_implement() {
        let snap = ArtifactSnapshot {
            filled_decision_rows: 3,
            has_design: true,
            has_tasks: true,
            checklist: ChecklistStats {
                checked: 1,
                total: 10,
            },
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, true, PrState::None, &detection()),
            WorkflowPhase::Implement
        );
    }

    #[test]
    fn test_checklist_at_ratio_moves_to_pr() {
        let snap = ArtifactSnapshot {
            has_design: true,
            has_tasks: true,
            checklist: ChecklistStats {
                checked: 9,
                total: 10,
            },
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, true, PrState::None, &detection()),
            WorkflowPhase::Pr
        );
    }

    #[test]
    fn test_checklist_below_ratio_stays_at_implement() {
        let snap = ArtifactSnapshot {
            has_design: true,
            has_tasks: true,
            checklist: ChecklistStats {
                checked: 8,
                total: 10,
            },
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, true, PrState::None, &detection()),
            WorkflowPhase::Implement
        );
    }

    #[test]
    fn test_empty_checklist_counts_as_not_ready() {
        let snap = ArtifactSnapshot {
            has_design: true,
            has_tasks: true,
            checklist: ChecklistStats::default(),
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, true, PrState::None, &detection()),
            WorkflowPhase::Implement
        );
    }

    #[test]
    fn test_open_pr_moves_to_merge_wait() {
        let snap = ArtifactSnapshot {
            has_design: true,
            has_tasks: true,
            checklist: ChecklistStats {
                checked: 10,
                total: 10,
            },
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, true, PrState::Open, &detection()),
            WorkflowPhase::Merge
        );
    }

    #[test]
    fn test_closed_pr_still_detects_merge_phase() {
        // The merge executor turns a closed-without-merge PR into a failure;
        // detection itself stays conservative.
        let snap = empty();
        assert_eq!(
            detect_phase(&snap, true, PrState::Closed, &detection()),
            WorkflowPhase::Merge
        );
    }

    #[test]
    fn test_merged_pr_moves_to_wrapup() {
        let snap = empty();
        assert_eq!(
            detect_phase(&snap, true, PrState::Merged, &detection()),
            WorkflowPhase::WrapUp
        );
    }

    #[test]
    fn test_wrapup_done_is_complete() {
        let snap = ArtifactSnapshot {
            wrapup_done: true,
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, true, PrState::Merged, &detection()),
            WorkflowPhase::Complete
        );
    }

    #[test]
    fn test_detection_is_pure() {
        let snap = ArtifactSnapshot {
            filled_decision_rows: 2,
            has_design: true,
            has_tasks: true,
            checklist: ChecklistStats {
                checked: 3,
                total: 10,
            },
            ..empty()
        };
        let first = detect_phase(&snap, true, PrState::None, &detection());
        let second = detect_phase(&snap, true, PrState::None, &detection());
        assert_eq!(first, second);
        assert_eq!(first, WorkflowPhase::Implement);
    }

    #[test]
    fn test_custom_ratio_threshold() {
        let custom = DetectionConfig {
            pr_ready_ratio: 0.5,
            ..DetectionConfig::default()
        };
        let snap = ArtifactSnapshot {
            has_tasks: true,
            checklist: ChecklistStats {
                checked: 5,
                total: 10,
            },
            ..empty()
        };
        assert_eq!(
            detect_phase(&snap, true, PrState::None, &custom),
            WorkflowPhase::Pr
        );
    }

    #[test]
    fn test_happy_path_detection_sequence() {
        // Walk the artifact states a successful feature passes through and
        // confirm each detected phase, in lifecycle order.
        let det = detection();
        let mut snap = empty();
        let mut branch = false;
        let mut pr = PrState::None;

        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::Interview);
        snap.filled_decision_rows = 2;
        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::Plan);
        snap.has_design = true;
        snap.has_tasks = true;
        snap.checklist = ChecklistStats { checked: 0, total: 4 };
        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::Branch);
        branch = true;
        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::Implement);
        snap.checklist = ChecklistStats { checked: 4, total: 4 };
        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::Pr);
        pr = PrState::Open;
        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::Merge);
        pr = PrState::Merged;
        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::WrapUp);
        snap.wrapup_done = true;
        assert_eq!(detect_phase(&snap, branch, pr, &det), WorkflowPhase::Complete);
    }
}
