//! Merge Context — the per-PR state machine that drives a single pull
//! request from precondition check through staging to fast-forward or
//! cleanup.

use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::labeler::{self, Transition};
use crate::models::{CheckState, CompareResult, PullRequest};
use crate::status;
use crate::voting::{self, VotingConfig, VotingOutcome};
use std::time::Duration;

#[derive(Debug, PartialEq)]
pub enum StartOutcome {
    Started,
    Deferred(Duration),
    Rejected,
}

#[derive(Debug, PartialEq)]
pub enum FinishOutcome {
    Done,
    StillWaiting,
}

pub struct MergeContext<'a> {
    gateway: &'a dyn Gateway,
    config: &'a Config,
}

enum Precondition {
    Rejected,
    Deferred(Duration),
    Approved,
}

impl<'a> MergeContext<'a> {
    pub fn new(gateway: &'a dyn Gateway, config: &'a Config) -> Self {
        Self { gateway, config }
    }

    /// Runs the shared precondition check.
    ///
    /// `check_tag` controls whether the tag-freshness sub-state is
    /// evaluated; the resume path in `finish_processing` checks tag status
    /// and staleness through its own compare step instead, so it recurses
    /// here with `check_tag = false` to avoid doing that work twice.
    async fn precondition_check(
        &self,
        pr_number: u64,
        check_tag: bool,
    ) -> GatewayResult<Precondition> {
        let pr = self.gateway.get_pr(pr_number, true).await?;

        if !pr.is_open() {
            return Ok(Precondition::Rejected);
        }

        let message_valid = validate_pr_message(&pr);
        if !self.config.dry_run {
            labeler::set_failed_description(self.gateway, pr_number, &pr.labels, !message_valid)
                .await?;
        }

        if pr.mergeable != Some(true) {
            return Ok(Precondition::Rejected);
        }

        let head_status = self.head_status(&pr).await?;
        if head_status != CheckState::Success {
            return Ok(Precondition::Rejected);
        }

        if pr.labels.contains(labeler::MERGED) {
            return Ok(Precondition::Rejected);
        }

        let reviews = self.gateway.list_reviews(pr_number).await?;
        let collaborators = self.gateway.list_collaborators().await?;
        let voting_config = VotingConfig {
            necessary_approvals: self.config.necessary_approvals,
            sufficient_approvals: self.config.sufficient_approvals,
            voting_delay_min: self.config.voting_delay_min,
            voting_delay_max: self.config.voting_delay_max,
        };
        let delay = match voting::evaluate(
            &pr,
            &collaborators,
            &reviews,
            chrono::Utc::now(),
            &voting_config,
        ) {
            VotingOutcome::NotApproved => return Ok(Precondition::Rejected),
            VotingOutcome::ReadyIn(d) => d,
        };

        if check_tag && self.tag_blocks(&pr).await? {
            return Ok(Precondition::Rejected);
        }

        if delay > Duration::from_secs(0) {
            Ok(Precondition::Deferred(delay))
        } else {
            Ok(Precondition::Approved)
        }
    }

    async fn head_status(&self, pr: &PullRequest) -> GatewayResult<CheckState> {
        let required = self
            .gateway
            .get_required_status_contexts(&pr.base_branch)
            .await?;
        let combined = self.gateway.get_combined_status(&pr.head_sha).await?;
        Ok(status::evaluate(&combined, &required))
    }

    async fn preview_merge_tree(&self, pr_number: u64) -> GatewayResult<String> {
        let preview_ref = format!("pull/{}/merge", pr_number);
        let sha = self.gateway.get_ref(&preview_ref).await?;
        let commit = self.gateway.get_commit(&sha).await?;
        Ok(commit.tree_sha)
    }

    /// Tag-freshness sub-state. Returns `true` when the existing tag blocks
    /// this PR from (re)starting.
    async fn tag_blocks(&self, pr: &PullRequest) -> GatewayResult<bool> {
        let tag_ref = self.config.merge_tag_ref(pr.number);
        let tag_sha = match self.gateway.get_ref(&tag_ref).await {
            Ok(sha) => sha,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };

        let tag_status = self.head_status_for_commit(&pr.base_branch, &tag_sha).await?;
        if tag_status != CheckState::Failure {
            // success or pending: the resume path will handle it.
            return Ok(false);
        }

        let tag_commit = self.gateway.get_commit(&tag_sha).await?;
        let preview_tree = self.preview_merge_tree(pr.number).await?;
        let fresh = tag_commit.tree_sha == preview_tree;

        if fresh {
            if !self.config.dry_run {
                labeler::apply(
                    self.gateway,
                    pr.number,
                    &pr.labels,
                    Transition::StagingChecksFailed,
                )
                .await?;
            }
            Ok(true)
        } else {
            if !self.config.dry_run {
                let _ = self.gateway.delete_ref(&tag_ref).await;
            }
            Ok(false)
        }
    }

    async fn head_status_for_commit(&self, base_branch: &str, sha: &str) -> GatewayResult<CheckState> {
        let required = self.gateway.get_required_status_contexts(base_branch).await?;
        let combined = self.gateway.get_combined_status(sha).await?;
        Ok(status::evaluate(&combined, &required))
    }

    /// Chooses this PR to attempt a merge, or decides it must wait.
    pub async fn start_processing(&self, pr_number: u64) -> GatewayResult<StartOutcome> {
        match self.precondition_check(pr_number, true).await? {
            Precondition::Rejected => Ok(StartOutcome::Rejected),
            Precondition::Deferred(d) => Ok(StartOutcome::Deferred(d)),
            Precondition::Approved => {
                if self.config.dry_run {
                    tracing::info!(pr = pr_number, "dry-run: would start merge");
                    return Ok(StartOutcome::Rejected);
                }
                self.do_start(pr_number).await
            }
        }
    }

    async fn do_start(&self, pr_number: u64) -> GatewayResult<StartOutcome> {
        let pr = self.gateway.get_pr(pr_number, false).await?;
        let base_ref = format!("heads/{}", pr.base_branch);

        let base_head = self.gateway.get_ref(&base_ref).await?;

        let start_rest = async {
            let preview_ref = format!("pull/{}/merge", pr_number);
            let preview_sha = self.gateway.get_ref(&preview_ref).await?;
            let preview_commit = self.gateway.get_commit(&preview_sha).await?;

            let synthetic_sha = self
                .gateway
                .create_commit(&preview_commit.tree_sha, &pr.merge_message(), &[base_head.clone()])
                .await?;

            let tag_ref = self.config.merge_tag_ref(pr_number);
            self.gateway.create_ref(&tag_ref, &synthetic_sha).await?;
            self.gateway
                .update_ref(&self.config.staging_ref(), &synthetic_sha, true)
                .await?;

            labeler::apply(self.gateway, pr_number, &pr.labels, Transition::Merging).await?;

            Ok::<(), GatewayError>(())
        }
        .await;

        match start_rest {
            Ok(()) => Ok(StartOutcome::Started),
            Err(e) => {
                self.abort_merge_cleanup(pr_number).await?;
                Err(e)
            }
        }
    }

    /// Observes the staging commit and either completes the fast-forward or
    /// cleans up.
    pub async fn finish_processing(&self, pr_number: u64, tag_sha: &str) -> GatewayResult<FinishOutcome> {
        let pr = match self.gateway.get_pr(pr_number, false).await {
            Ok(pr) => pr,
            Err(e) if e.is_not_found() => {
                self.abort_merge_cleanup(pr_number).await?;
                return Ok(FinishOutcome::Done);
            }
            Err(e) => return Err(e),
        };

        if !pr.is_open() {
            self.abort_merge_cleanup(pr_number).await?;
            return Ok(FinishOutcome::Done);
        }

        match self.head_status_for_commit(&pr.base_branch, tag_sha).await? {
            CheckState::Pending => return Ok(FinishOutcome::StillWaiting),
            CheckState::Failure => {
                self.abort_merge_cleanup(pr_number).await?;
                return Ok(FinishOutcome::Done);
            }
            CheckState::Success => {}
        }

        let base_ref = format!("heads/{}", pr.base_branch);
        let base_head = self.gateway.get_ref(&base_ref).await?;
        let compare = self.gateway.compare_commits(&base_head, tag_sha).await?;

        let recheck_rejected =
            matches!(self.precondition_check(pr_number, false).await?, Precondition::Rejected);

        let tag_commit = self.gateway.get_commit(tag_sha).await?;
        let preview_tree = self.preview_merge_tree(pr_number).await?;
        let stale = tag_commit.tree_sha != preview_tree;

        if compare == CompareResult::Identical || compare == CompareResult::Behind {
            // The base branch already contains the tag; this is true even
            // after a crash that completed the fast-forward but not the
            // cleanup, so it takes priority over the abort conditions below.
            self.complete_merge_cleanup(pr_number).await
        } else if compare == CompareResult::Diverged || recheck_rejected || stale {
            self.abort_merge_cleanup(pr_number).await?;
            Ok(FinishOutcome::Done)
        } else {
            // Ahead: attempt the fast-forward, unless merged_run asks us to
            // stop short of it.
            if self.config.merged_run {
                if !self.config.dry_run {
                    labeler::apply(self.gateway, pr_number, &pr.labels, Transition::MergeReady)
                        .await?;
                }
                return Ok(FinishOutcome::StillWaiting);
            }

            if self.config.dry_run {
                return Ok(FinishOutcome::StillWaiting);
            }

            match self.gateway.update_ref(&base_ref, tag_sha, false).await {
                Ok(()) => self.complete_merge_cleanup(pr_number).await,
                Err(e) if e.is_unprocessable() => {
                    self.abort_merge_cleanup(pr_number).await?;
                    Ok(FinishOutcome::Done)
                }
                Err(e) => Err(e),
            }
        }
    }

    async fn complete_merge_cleanup(&self, pr_number: u64) -> GatewayResult<FinishOutcome> {
        if self.config.dry_run {
            return Ok(FinishOutcome::StillWaiting);
        }

        let pr = self.gateway.get_pr(pr_number, false).await?;
        labeler::apply(self.gateway, pr_number, &pr.labels, Transition::Merged).await?;
        self.gateway.close_pr(pr_number).await?;
        self.delete_tag_tolerant(pr_number).await;
        Ok(FinishOutcome::Done)
    }

    async fn abort_merge_cleanup(&self, pr_number: u64) -> GatewayResult<()> {
        if self.config.dry_run {
            return Ok(());
        }

        let pr = self.gateway.get_pr(pr_number, false).await?;
        labeler::apply(self.gateway, pr_number, &pr.labels, Transition::MergeFailedOther).await?;
        self.delete_tag_tolerant(pr_number).await;
        Ok(())
    }

    async fn delete_tag_tolerant(&self, pr_number: u64) {
        let tag_ref = self.config.merge_tag_ref(pr_number);
        match self.gateway.delete_ref(&tag_ref).await {
            Ok(()) | Err(GatewayError::NotFound(_)) => {}
            Err(e) => tracing::warn!(pr = pr_number, error = %e, "failed to delete merge tag"),
        }
    }
}

/// Validates that the assembled merge-commit message fits within 72
/// characters per line.
fn validate_pr_message(pr: &PullRequest) -> bool {
    pr.merge_message().split('\n').all(|line| line.chars().count() <= 72)
}
