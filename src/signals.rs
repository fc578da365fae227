//! Completion-token parsing from the external coding agent's output.
//!
//! The agent's contract is purely textual: it emits bracketed tokens inside
//! free-form text. All scanning lives here, behind the typed
//! [`PhaseOutcome`] result, so the token format is the single point of
//! change if the agent's output conventions evolve.

use serde::{Deserialize, Serialize};

/// Token the agent emits when the instructed phase is fully done.
pub const PHASE_COMPLETE: &str = "[PHASE-COMPLETE]";
/// Token the agent emits, in addition to [`PHASE_COMPLETE`], when the whole
/// feature is wrapped up. Only meaningful for the wrap-up phase.
pub const FEATURE_COMPLETE: &str = "[FEATURE-COMPLETE]";
/// Token the agent emits when required decisions are missing and cannot be
/// defaulted.
pub const NEEDS_INPUT: &str = "[NEEDS-INPUT]";
/// Token the agent emits when it is blocked and the phase cannot proceed.
pub const BLOCKED: &str = "[BLOCKED]";

/// Result of one phase execution, as interpreted by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseOutcome {
    /// The phase completed; the next detection pass will move forward.
    Success,
    /// Work happened but the phase is not done; re-run without penalty.
    Progress,
    /// Human input is required; stop without counting a failure.
    NeedsInput,
    /// No usable result; counts toward the consecutive-failure threshold.
    Failed,
}

impl PhaseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseOutcome::Success => "success",
            PhaseOutcome::Progress => "progress",
            PhaseOutcome::NeedsInput => "needs-input",
            PhaseOutcome::Failed => "failed",
        }
    }
}

/// Raw tokens found in one agent invocation's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionSignals {
    pub phase_complete: bool,
    pub feature_complete: bool,
    pub needs_input: bool,
    pub blocked: bool,
}

/// Scan the agent's output text for the agreed completion tokens.
pub fn scan_tokens(text: &str) -> CompletionSignals {
    CompletionSignals {
        phase_complete: text.contains(PHASE_COMPLETE),
        feature_complete: text.contains(FEATURE_COMPLETE),
        needs_input: text.contains(NEEDS_INPUT),
        blocked: text.contains(BLOCKED),
    }
}

/// Classify a completion-gated invocation: needs-input wins over blocked,
/// blocked wins over completion, anything token-free is a failure.
pub fn classify(signals: CompletionSignals) -> PhaseOutcome {
    if signals.needs_input {
        PhaseOutcome::NeedsInput
    } else if signals.blocked {
        PhaseOutcome::Failed
    } else if signals.phase_complete {
        PhaseOutcome::Success
    } else {
        PhaseOutcome::Failed
    }
}

/// Convenience: scan and classify in one call.
pub fn parse_outcome(text: &str) -> PhaseOutcome {
    classify(scan_tokens(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_phase_complete() {
        let signals = scan_tokens("All decisions filled.\n[PHASE-COMPLETE]\n");
        assert!(signals.phase_complete);
        assert!(!signals.feature_complete);
        assert!(!signals.needs_input);
    }

    #[test]
    fn test_scan_finds_both_completion_tokens() {
        let signals = scan_tokens("Wrap-up written. [PHASE-COMPLETE] [FEATURE-COMPLETE]");
        assert!(signals.phase_complete);
        assert!(signals.feature_complete);
    }

    #[test]
    fn test_scan_token_free_text() {
        let signals = scan_tokens("I made some edits but ran out of context.");
        assert_eq!(signals, CompletionSignals::default());
    }

    #[test]
    fn test_scan_tokens_embedded_mid_sentence() {
        let signals = scan_tokens("done ([PHASE-COMPLETE]) as requested");
        assert!(signals.phase_complete);
    }

    #[test]
    fn test_classify_needs_input_wins_over_completion() {
        // An agent that both claims completion and asks for input is asking
        // for input; escalation is the conservative reading.
        let outcome = parse_outcome("[PHASE-COMPLETE] but actually [NEEDS-INPUT]");
        assert_eq!(outcome, PhaseOutcome::NeedsInput);
    }

    #[test]
    fn test_classify_blocked_is_failure() {
        assert_eq!(
            parse_outcome("[BLOCKED] missing credentials for the staging API"),
            PhaseOutcome::Failed
        );
    }

    #[test]
    fn test_classify_no_tokens_is_failure() {
        assert_eq!(parse_outcome("did things, probably"), PhaseOutcome::Failed);
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(parse_outcome("[PHASE-COMPLETE]"), PhaseOutcome::Success);
    }

    #[test]
    fn test_lowercase_tokens_are_not_recognized() {
        assert_eq!(parse_outcome("[phase-complete]"), PhaseOutcome::Failed);
    }

    #[test]
    fn test_outcome_as_str() {
        assert_eq!(PhaseOutcome::NeedsInput.as_str(), "needs-input");
        assert_eq!(PhaseOutcome::Progress.as_str(), "progress");
    }
}
