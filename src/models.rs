//! Plain domain types for pull requests, reviewers, reviews, and statuses.
//!
//! These are independent of `octocrab`'s wire representation; the gateway
//! module is responsible for converting `octocrab::models::*` into them.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrState {
    Open,
    Closed,
}

/// A pull request as understood by the merge bot.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub head_sha: String,
    pub base_branch: String,
    pub author_login: String,
    pub mergeable: Option<bool>,
    pub state: PrState,
    pub title: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub requested_reviewers: HashSet<String>,
    pub labels: HashSet<String>,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state == PrState::Open
    }

    /// The configured merge-commit message: `title\n\nbody\n\n(PR #n)`.
    pub fn merge_message(&self) -> String {
        let body = self.body.as_deref().unwrap_or("");
        if body.is_empty() {
            format!("{} (#{})", self.title, self.number)
        } else {
            format!("{}\n\n{}\n\n(#{})", self.title, body, self.number)
        }
    }
}

/// A repository collaborator; only push-permission holders count as core
/// reviewers.
#[derive(Debug, Clone)]
pub struct Collaborator {
    pub login: String,
    pub can_push: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Other,
}

#[derive(Debug, Clone)]
pub struct Review {
    pub author_login: String,
    pub submitted_at: DateTime<Utc>,
    pub state: ReviewState,
}

/// A derived, per-reviewer vote; at most one per core reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteState {
    Approved,
    ChangesRequested,
}

#[derive(Debug, Clone)]
pub struct Vote {
    pub login: String,
    pub timestamp: DateTime<Utc>,
    pub state: VoteState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Pending,
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct StatusContext {
    pub context: String,
    pub state: CheckState,
}

/// The combined status of a commit: the host's own aggregate plus the
/// per-context breakdown.
#[derive(Debug, Clone)]
pub struct CombinedStatus {
    pub overall: CheckState,
    pub statuses: Vec<StatusContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Identical,
    Ahead,
    Behind,
    Diverged,
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub sha: String,
    pub tree_sha: String,
    pub message: String,
}
