//! Labeler — idempotent lifecycle label transitions.
//!
//! A table-driven transition: each state removes the labels that must not
//! coexist with it before adding its own, and both directions swallow
//! `already_exists`/`NotFound` at the gateway layer.

use crate::error::GatewayResult;
use crate::gateway::Gateway;
use std::collections::HashSet;

pub const MERGING: &str = "merging";
pub const MERGE_READY: &str = "merge-ready";
pub const MERGE_FAILED_OTHER: &str = "merge-failed-other";
pub const STAGING_CHECKS_FAILED: &str = "staging-checks-failed";
pub const MERGED: &str = "merged";
pub const FAILED_DESCRIPTION: &str = "failed-description";

pub enum Transition {
    Merging,
    Merged,
    MergeFailedOther,
    StagingChecksFailed,
    MergeReady,
}

impl Transition {
    fn removes(&self) -> &'static [&'static str] {
        match self {
            Transition::Merging => &[MERGE_READY, MERGE_FAILED_OTHER, STAGING_CHECKS_FAILED],
            Transition::Merged => &[MERGING, MERGE_READY, MERGE_FAILED_OTHER, STAGING_CHECKS_FAILED],
            Transition::MergeFailedOther => &[MERGING, MERGE_READY],
            Transition::StagingChecksFailed => &[MERGING],
            Transition::MergeReady => &[MERGING, STAGING_CHECKS_FAILED],
        }
    }

    fn adds(&self) -> &'static str {
        match self {
            Transition::Merging => MERGING,
            Transition::Merged => MERGED,
            Transition::MergeFailedOther => MERGE_FAILED_OTHER,
            Transition::StagingChecksFailed => STAGING_CHECKS_FAILED,
            Transition::MergeReady => MERGE_READY,
        }
    }
}

/// Applies a lifecycle transition: removes the labels that must not coexist
/// with the target, then adds the target label. Both directions are
/// idempotent (swallow `already_exists`/`NotFound` at the gateway layer).
pub async fn apply(
    gateway: &dyn Gateway,
    pr_number: u64,
    current_labels: &HashSet<String>,
    transition: Transition,
) -> GatewayResult<()> {
    for label in transition.removes() {
        if current_labels.contains(*label) {
            gateway.remove_label(pr_number, label).await?;
        }
    }

    if !current_labels.contains(transition.adds()) {
        gateway
            .add_labels(pr_number, &[transition.adds().to_string()])
            .await?;
    }

    Ok(())
}

/// Sets or clears the `failed-description` label, independent of the
/// lifecycle transition table above.
pub async fn set_failed_description(
    gateway: &dyn Gateway,
    pr_number: u64,
    current_labels: &HashSet<String>,
    present: bool,
) -> GatewayResult<()> {
    let already_present = current_labels.contains(FAILED_DESCRIPTION);
    if present && !already_present {
        gateway
            .add_labels(pr_number, &[FAILED_DESCRIPTION.to_string()])
            .await?;
    } else if !present && already_present {
        gateway.remove_label(pr_number, FAILED_DESCRIPTION).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeGateway;
    use crate::models::{PrState, PullRequest};
    use chrono::Utc;

    fn pr_with_labels(labels: &[&str]) -> PullRequest {
        PullRequest {
            number: 1,
            head_sha: "abc".into(),
            base_branch: "main".into(),
            author_login: "a".into(),
            mergeable: Some(true),
            state: PrState::Open,
            title: "t".into(),
            body: None,
            created_at: Utc::now(),
            requested_reviewers: Default::default(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn merging_transition_removes_conflicting_labels() {
        let gw = FakeGateway::new().with_pr(pr_with_labels(&[MERGE_READY, STAGING_CHECKS_FAILED]));
        let labels: HashSet<String> = [MERGE_READY, STAGING_CHECKS_FAILED]
            .iter()
            .map(|s| s.to_string())
            .collect();
        apply(&gw, 1, &labels, Transition::Merging).await.unwrap();

        let calls = gw.calls();
        assert!(calls.iter().any(|c| c.contains("remove_label 1 merge-ready")));
        assert!(calls
            .iter()
            .any(|c| c.contains("remove_label 1 staging-checks-failed")));
        assert!(calls.iter().any(|c| c.contains("add_labels 1")));
    }

    #[tokio::test]
    async fn reapplying_same_transition_is_a_noop_on_the_add() {
        let gw = FakeGateway::new().with_pr(pr_with_labels(&[MERGING]));
        let labels: HashSet<String> = [MERGING].iter().map(|s| s.to_string()).collect();
        apply(&gw, 1, &labels, Transition::Merging).await.unwrap();

        let calls = gw.calls();
        assert!(!calls.iter().any(|c| c.contains("add_labels")));
        assert!(!calls.iter().any(|c| c.contains("remove_label")));
    }

    #[tokio::test]
    async fn failed_description_toggles_independently() {
        let gw = FakeGateway::new().with_pr(pr_with_labels(&[]));
        let labels: HashSet<String> = HashSet::new();
        set_failed_description(&gw, 1, &labels, true).await.unwrap();
        assert!(gw.calls().iter().any(|c| c.contains("add_labels 1")));
    }
}
