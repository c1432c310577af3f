//! Status Evaluator — combines the required status contexts for the base
//! branch with a commit's combined status into a single tri-state.

use crate::models::{CheckState, CombinedStatus};

/// Evaluates the combined status of a commit against the set of required
/// contexts.
pub fn evaluate(status: &CombinedStatus, required: &[String]) -> CheckState {
    if required.is_empty() {
        tracing::warn!("base branch has no required status contexts configured");
        return status.overall;
    }

    let kept: Vec<_> = status
        .statuses
        .iter()
        .filter(|s| required.iter().any(|r| r == &s.context))
        .collect();

    if kept.len() < required.len() || kept.iter().any(|s| s.state == CheckState::Pending) {
        return CheckState::Pending;
    }

    if kept.iter().all(|s| s.state == CheckState::Success) {
        CheckState::Success
    } else {
        CheckState::Failure
    }
}
