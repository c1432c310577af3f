//! Voting Evaluator — a pure policy over collaborators, reviews, and
//! configuration. No I/O; unit-testable directly.

use crate::models::{Collaborator, PullRequest, Review, ReviewState, Vote, VoteState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingOutcome {
    NotApproved,
    /// Milliseconds until the PR is ready; zero means "ready now".
    ReadyIn(Duration),
}

pub struct VotingConfig {
    pub necessary_approvals: u32,
    pub sufficient_approvals: u32,
    pub voting_delay_min: Duration,
    pub voting_delay_max: Duration,
}

/// Evaluates whether a pull request currently carries enough approving
/// votes from core reviewers.
pub fn evaluate(
    pr: &PullRequest,
    collaborators: &[Collaborator],
    reviews: &[Review],
    now: DateTime<Utc>,
    config: &VotingConfig,
) -> VotingOutcome {
    let core: Vec<&str> = collaborators
        .iter()
        .filter(|c| c.can_push)
        .map(|c| c.login.as_str())
        .collect();

    // Step 2: an outstanding review request to a core reviewer blocks,
    // regardless of quorum already met.
    if pr
        .requested_reviewers
        .iter()
        .any(|r| core.contains(&r.as_str()))
    {
        return VotingOutcome::NotApproved;
    }

    // Step 3: guaranteed quiet window.
    let age = (now - pr.created_at)
        .to_std()
        .unwrap_or(Duration::from_secs(0));
    if age < config.voting_delay_min {
        return VotingOutcome::ReadyIn(config.voting_delay_min - age);
    }

    // Step 4: build the votes, author-seeded, chronologically overwritten.
    let mut votes: HashMap<String, Vote> = HashMap::new();
    if core.contains(&pr.author_login.as_str()) {
        votes.insert(
            pr.author_login.clone(),
            Vote {
                login: pr.author_login.clone(),
                timestamp: pr.created_at,
                state: VoteState::Approved,
            },
        );
    }

    let mut ordered_reviews: Vec<&Review> = reviews.iter().collect();
    ordered_reviews.sort_by_key(|r| r.submitted_at);

    for review in ordered_reviews {
        if !core.contains(&review.author_login.as_str()) {
            continue;
        }
        let state = match review.state {
            ReviewState::Approved => VoteState::Approved,
            ReviewState::ChangesRequested => VoteState::ChangesRequested,
            ReviewState::Other => continue,
        };
        votes.insert(
            review.author_login.clone(),
            Vote {
                login: review.author_login.clone(),
                timestamp: review.submitted_at,
                state,
            },
        );
    }

    // Step 5: any outstanding changes-requested veto blocks, regardless of
    // later approvals from other reviewers.
    if votes
        .values()
        .any(|v| v.state == VoteState::ChangesRequested)
    {
        return VotingOutcome::NotApproved;
    }

    let approved = votes
        .values()
        .filter(|v| v.state == VoteState::Approved)
        .count() as u32;

    if approved < config.necessary_approvals {
        return VotingOutcome::NotApproved;
    }

    if approved >= config.sufficient_approvals || age >= config.voting_delay_max {
        return VotingOutcome::ReadyIn(Duration::from_secs(0));
    }

    VotingOutcome::ReadyIn(config.voting_delay_max - age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;

    fn config() -> VotingConfig {
        VotingConfig {
            necessary_approvals: 2,
            sufficient_approvals: 3,
            voting_delay_min: Duration::from_secs(3600),
            voting_delay_max: Duration::from_secs(24 * 3600),
        }
    }

    fn pr(author: &str, created_at: DateTime<Utc>, requested: &[&str]) -> PullRequest {
        PullRequest {
            number: 7,
            head_sha: "abc".into(),
            base_branch: "main".into(),
            author_login: author.into(),
            mergeable: Some(true),
            state: crate::models::PrState::Open,
            title: "t".into(),
            body: None,
            created_at,
            requested_reviewers: requested.iter().map(|s| s.to_string()).collect(),
            labels: HashSet::new(),
        }
    }

    fn core(logins: &[&str]) -> Vec<Collaborator> {
        logins
            .iter()
            .map(|l| Collaborator {
                login: l.to_string(),
                can_push: true,
            })
            .collect()
    }

    fn review(login: &str, age_minutes: i64, state: ReviewState, now: DateTime<Utc>) -> Review {
        Review {
            author_login: login.to_string(),
            submitted_at: now - ChronoDuration::minutes(age_minutes),
            state,
        }
    }

    #[test]
    fn s1_fresh_pr_defers_until_min_window() {
        let now = Utc::now();
        let created = now - ChronoDuration::minutes(5);
        let pr = pr("alice", created, &[]);
        let outcome = evaluate(&pr, &core(&["alice"]), &[], now, &config());
        match outcome {
            VotingOutcome::ReadyIn(d) => {
                assert!(d.as_secs() > 54 * 60 && d.as_secs() <= 55 * 60);
            }
            other => panic!("expected ReadyIn, got {:?}", other),
        }
    }

    #[test]
    fn s2_insufficient_approvals_rejected() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let pr = pr("dave", created, &[]);
        let reviews = vec![review("alice", 30, ReviewState::Approved, now)];
        let outcome = evaluate(&pr, &core(&["alice", "bob", "carol"]), &reviews, now, &config());
        assert_eq!(outcome, VotingOutcome::NotApproved);
    }

    #[test]
    fn s3_sufficient_approvals_ready_now() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let pr = pr("dave", created, &[]);
        let reviews = vec![
            review("alice", 30, ReviewState::Approved, now),
            review("bob", 20, ReviewState::Approved, now),
            review("carol", 10, ReviewState::Approved, now),
        ];
        let outcome = evaluate(
            &pr,
            &core(&["alice", "bob", "carol"]),
            &reviews,
            now,
            &config(),
        );
        assert_eq!(outcome, VotingOutcome::ReadyIn(Duration::from_secs(0)));
    }

    #[test]
    fn changes_requested_vetoes_even_with_quorum() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let pr = pr("dave", created, &[]);
        let reviews = vec![
            review("alice", 40, ReviewState::Approved, now),
            review("bob", 30, ReviewState::Approved, now),
            review("carol", 20, ReviewState::ChangesRequested, now),
        ];
        let outcome = evaluate(
            &pr,
            &core(&["alice", "bob", "carol"]),
            &reviews,
            now,
            &config(),
        );
        assert_eq!(outcome, VotingOutcome::NotApproved);
    }

    #[test]
    fn later_approval_supersedes_earlier_changes_requested() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let pr = pr("dave", created, &[]);
        let reviews = vec![
            review("alice", 40, ReviewState::ChangesRequested, now),
            review("alice", 10, ReviewState::Approved, now),
            review("bob", 30, ReviewState::Approved, now),
        ];
        let outcome = evaluate(
            &pr,
            &core(&["alice", "bob"]),
            &reviews,
            now,
            &config(),
        );
        assert_eq!(outcome, VotingOutcome::NotApproved, "approved=2 < necessary? no, 2>=2, sufficient=3 not met, defer");
    }

    #[test]
    fn outstanding_review_request_blocks_even_with_quorum() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let pr = pr("dave", created, &["carol"]);
        let reviews = vec![
            review("alice", 40, ReviewState::Approved, now),
            review("bob", 30, ReviewState::Approved, now),
            review("carol", 20, ReviewState::Approved, now),
        ];
        let outcome = evaluate(
            &pr,
            &core(&["alice", "bob", "carol"]),
            &reviews,
            now,
            &config(),
        );
        assert_eq!(outcome, VotingOutcome::NotApproved);
    }

    #[test]
    fn author_as_core_reviewer_seeds_implicit_approval() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let pr = pr("alice", created, &[]);
        let reviews = vec![
            review("bob", 30, ReviewState::Approved, now),
        ];
        let outcome = evaluate(
            &pr,
            &core(&["alice", "bob"]),
            &reviews,
            now,
            &config(),
        );
        // approved = alice (implicit) + bob = 2 >= necessary(2), but < sufficient(3)
        // and age(2h) < max(24h) => deferred until max window
        match outcome {
            VotingOutcome::ReadyIn(d) => assert!(d.as_secs() > 0),
            other => panic!("expected ReadyIn(>0), got {:?}", other),
        }
    }

    #[test]
    fn duplicate_reviews_from_same_reviewer_only_latest_counts() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let pr = pr("dave", created, &[]);
        let reviews = vec![
            review("alice", 50, ReviewState::Approved, now),
            review("alice", 40, ReviewState::ChangesRequested, now),
            review("alice", 30, ReviewState::Approved, now),
            review("bob", 20, ReviewState::Approved, now),
        ];
        let outcome = evaluate(
            &pr,
            &core(&["alice", "bob"]),
            &reviews,
            now,
            &config(),
        );
        // approved = alice + bob = 2 >= necessary(2); sufficient(3) not met -> deferred
        match outcome {
            VotingOutcome::ReadyIn(d) => assert!(d.as_secs() > 0),
            other => panic!("expected ReadyIn(>0), got {:?}", other),
        }
    }

    #[test]
    fn max_window_elapsed_forces_ready_now() {
        let now = Utc::now();
        let created = now - ChronoDuration::hours(25);
        let pr = pr("dave", created, &[]);
        let reviews = vec![review("alice", 100, ReviewState::Approved, now), review("bob", 90, ReviewState::Approved, now)];
        let outcome = evaluate(
            &pr,
            &core(&["alice", "bob"]),
            &reviews,
            now,
            &config(),
        );
        assert_eq!(outcome, VotingOutcome::ReadyIn(Duration::from_secs(0)));
    }
}
