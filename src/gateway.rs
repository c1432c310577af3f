//! Platform Gateway — a typed facade over the host platform API.
//!
//! A thin wrapper around `octocrab::Octocrab` behind an `async_trait`, so
//! the rest of the core can be driven against a `FakeGateway` in tests.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{
    Collaborator, CombinedStatus, Commit, CompareResult, PrState, PullRequest, Review, ReviewState,
};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_open_prs(&self) -> GatewayResult<Vec<PullRequest>>;

    /// Fetches a single PR, retrying while `mergeable` is still being
    /// computed by the host (exponential backoff from 1s, doubling, capped
    /// at ~64s, giving up after ~2 minutes total).
    async fn get_pr(&self, number: u64, refresh_mergeable: bool) -> GatewayResult<PullRequest>;

    async fn list_reviews(&self, number: u64) -> GatewayResult<Vec<Review>>;
    async fn list_collaborators(&self) -> GatewayResult<Vec<Collaborator>>;

    async fn get_combined_status(&self, commit_sha: &str) -> GatewayResult<CombinedStatus>;
    async fn get_required_status_contexts(&self, base_branch: &str) -> GatewayResult<Vec<String>>;

    async fn compare_commits(&self, base: &str, head: &str) -> GatewayResult<CompareResult>;

    async fn get_ref(&self, git_ref: &str) -> GatewayResult<String>;
    async fn create_ref(&self, git_ref: &str, sha: &str) -> GatewayResult<()>;
    async fn update_ref(&self, git_ref: &str, sha: &str, force: bool) -> GatewayResult<()>;
    async fn delete_ref(&self, git_ref: &str) -> GatewayResult<()>;

    async fn get_commit(&self, sha: &str) -> GatewayResult<Commit>;
    async fn create_commit(
        &self,
        tree_sha: &str,
        message: &str,
        parents: &[String],
    ) -> GatewayResult<String>;

    /// Lists tag refs as `(name, target_sha)` pairs.
    async fn list_tags(&self) -> GatewayResult<Vec<(String, String)>>;

    async fn list_labels(&self, number: u64) -> GatewayResult<Vec<String>>;
    async fn add_labels(&self, number: u64, names: &[String]) -> GatewayResult<()>;
    async fn remove_label(&self, number: u64, name: &str) -> GatewayResult<()>;

    async fn close_pr(&self, number: u64) -> GatewayResult<()>;
}

pub struct GithubGateway {
    inner: octocrab::Octocrab,
    owner: String,
    repo: String,
}

impl GithubGateway {
    pub fn new(token: String, owner: String, repo: String) -> anyhow::Result<Self> {
        let inner = octocrab::OctocrabBuilder::new()
            .personal_token(token)
            .build()?;
        Ok(Self { inner, owner, repo })
    }

    fn convert_pr(pr: octocrab::models::pulls::PullRequest) -> PullRequest {
        let labels = pr
            .labels
            .as_ref()
            .map(|ls| ls.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default();
        let requested_reviewers = pr
            .requested_reviewers
            .as_ref()
            .map(|rs| rs.iter().map(|u| u.login.clone()).collect())
            .unwrap_or_default();

        PullRequest {
            number: pr.number,
            head_sha: pr.head.sha.clone(),
            base_branch: pr.base.ref_field.clone(),
            author_login: pr.user.map(|u| u.login).unwrap_or_default(),
            mergeable: pr.mergeable,
            state: match pr.state {
                Some(octocrab::models::IssueState::Closed) => PrState::Closed,
                _ => PrState::Open,
            },
            title: pr.title.unwrap_or_default(),
            body: pr.body,
            created_at: pr.created_at.unwrap_or_else(chrono::Utc::now),
            requested_reviewers,
            labels,
        }
    }

    fn convert_review(review: &octocrab::models::pulls::Review) -> Option<Review> {
        let state = match review.state? {
            octocrab::models::pulls::ReviewState::Approved => ReviewState::Approved,
            octocrab::models::pulls::ReviewState::ChangesRequested => ReviewState::ChangesRequested,
            _ => ReviewState::Other,
        };
        Some(Review {
            author_login: review.user.login.clone(),
            submitted_at: review.submitted_at.unwrap_or_else(chrono::Utc::now),
            state,
        })
    }
}

#[async_trait]
impl Gateway for GithubGateway {
    async fn list_open_prs(&self) -> GatewayResult<Vec<PullRequest>> {
        use octocrab::params::{pulls::Sort, Direction, State};

        let page = self
            .inner
            .pulls(&self.owner, &self.repo)
            .list()
            .state(State::Open)
            .direction(Direction::Ascending)
            .sort(Sort::Created)
            .per_page(100)
            .send()
            .await
            .map_err(|e| GatewayError::from_octocrab("list_open_prs", e))?;

        Ok(page.items.into_iter().map(Self::convert_pr).collect())
    }

    async fn get_pr(&self, number: u64, refresh_mergeable: bool) -> GatewayResult<PullRequest> {
        let mut delay = Duration::from_secs(1);
        let max_delay = Duration::from_secs(64);
        let mut elapsed = Duration::from_secs(0);
        let budget = Duration::from_secs(120);

        loop {
            let pr = self
                .inner
                .pulls(&self.owner, &self.repo)
                .get(number)
                .await
                .map_err(|e| GatewayError::from_octocrab("get_pr", e))?;
            let pr = Self::convert_pr(pr);

            if !refresh_mergeable || pr.mergeable.is_some() || elapsed >= budget {
                return Ok(pr);
            }

            tracing::warn!(pr = number, "mergeable state unknown, retrying");
            tokio::time::sleep(delay).await;
            elapsed += delay;
            delay = (delay * 2).min(max_delay);
        }
    }

    async fn list_reviews(&self, number: u64) -> GatewayResult<Vec<Review>> {
        let reviews = self
            .inner
            .pulls(&self.owner, &self.repo)
            .list_reviews(number)
            .await
            .map_err(|e| GatewayError::from_octocrab("list_reviews", e))?;
        Ok(reviews.iter().filter_map(Self::convert_review).collect())
    }

    async fn list_collaborators(&self) -> GatewayResult<Vec<Collaborator>> {
        let route = format!("/repos/{}/{}/collaborators", self.owner, self.repo);
        let collaborators: Vec<octocrab::models::Author> = self
            .inner
            .get(route, None::<&()>)
            .await
            .map_err(|e| GatewayError::from_octocrab("list_collaborators", e))?;

        // The collaborators endpoint also returns each user's permissions,
        // which octocrab's `Author` model does not expose; re-query per user
        // via the dedicated permission-check endpoint instead of parsing raw
        // JSON by hand.
        let mut out = Vec::with_capacity(collaborators.len());
        for user in collaborators {
            let can_push = self.collaborator_can_push(&user.login).await?;
            out.push(Collaborator {
                login: user.login,
                can_push,
            });
        }
        Ok(out)
    }

    async fn get_combined_status(&self, commit_sha: &str) -> GatewayResult<CombinedStatus> {
        let status = self
            .inner
            .repos(&self.owner, &self.repo)
            .combined_status_for_ref(&octocrab::params::repos::Reference::Commit(
                commit_sha.to_string(),
            ))
            .await
            .map_err(|e| GatewayError::from_octocrab("get_combined_status", e))?;

        Ok(CombinedStatus {
            overall: match status.state {
                octocrab::models::StatusState::Success => crate::models::CheckState::Success,
                octocrab::models::StatusState::Pending => crate::models::CheckState::Pending,
                _ => crate::models::CheckState::Failure,
            },
            statuses: status
                .statuses
                .into_iter()
                .map(|s| crate::models::StatusContext {
                    context: s.context.unwrap_or_default(),
                    state: match s.state {
                        octocrab::models::StatusState::Success => crate::models::CheckState::Success,
                        octocrab::models::StatusState::Pending => crate::models::CheckState::Pending,
                        _ => crate::models::CheckState::Failure,
                    },
                })
                .collect(),
        })
    }

    async fn get_required_status_contexts(&self, base_branch: &str) -> GatewayResult<Vec<String>> {
        let route = format!(
            "/repos/{}/{}/branches/{}/protection/required_status_checks/contexts",
            self.owner, self.repo, base_branch
        );
        match self.inner.get::<Vec<String>, _, ()>(route, None).await {
            Ok(contexts) => Ok(contexts),
            Err(e) => {
                let classified = GatewayError::from_octocrab("get_required_status_contexts", e);
                if classified.is_not_found() {
                    Ok(Vec::new())
                } else {
                    Err(classified)
                }
            }
        }
    }

    async fn compare_commits(&self, base: &str, head: &str) -> GatewayResult<CompareResult> {
        let route = format!(
            "/repos/{}/{}/compare/{}...{}",
            self.owner, self.repo, base, head
        );
        #[derive(serde::Deserialize)]
        struct CompareResponse {
            status: String,
        }
        let response: CompareResponse = self
            .inner
            .get(route, None::<&()>)
            .await
            .map_err(|e| GatewayError::from_octocrab("compare_commits", e))?;

        Ok(match response.status.as_str() {
            "identical" => CompareResult::Identical,
            "ahead" => CompareResult::Ahead,
            "behind" => CompareResult::Behind,
            _ => CompareResult::Diverged,
        })
    }

    async fn get_ref(&self, git_ref: &str) -> GatewayResult<String> {
        let route = format!("/repos/{}/{}/git/ref/{}", self.owner, self.repo, git_ref);
        #[derive(serde::Deserialize)]
        struct RefObject {
            sha: String,
        }
        #[derive(serde::Deserialize)]
        struct RefResponse {
            object: RefObject,
        }
        let response: RefResponse = self
            .inner
            .get(route, None::<&()>)
            .await
            .map_err(|e| GatewayError::from_octocrab("get_ref", e))?;
        Ok(response.object.sha)
    }

    async fn create_ref(&self, git_ref: &str, sha: &str) -> GatewayResult<()> {
        let route = format!("/repos/{}/{}/git/refs", self.owner, self.repo);
        #[derive(serde::Serialize)]
        struct Body<'a> {
            #[serde(rename = "ref")]
            git_ref: String,
            sha: &'a str,
        }
        let body = Body {
            git_ref: format!("refs/{}", git_ref),
            sha,
        };
        self.inner
            .post::<_, serde_json::Value>(route, Some(&body))
            .await
            .map_err(|e| GatewayError::from_octocrab("create_ref", e))?;
        Ok(())
    }

    async fn update_ref(&self, git_ref: &str, sha: &str, force: bool) -> GatewayResult<()> {
        let route = format!("/repos/{}/{}/git/refs/{}", self.owner, self.repo, git_ref);
        #[derive(serde::Serialize)]
        struct Body<'a> {
            sha: &'a str,
            force: bool,
        }
        let body = Body { sha, force };
        self.inner
            .patch::<serde_json::Value, _, _>(route, Some(&body))
            .await
            .map_err(|e| GatewayError::from_octocrab("update_ref", e))?;
        Ok(())
    }

    async fn delete_ref(&self, git_ref: &str) -> GatewayResult<()> {
        let route = format!("/repos/{}/{}/git/refs/{}", self.owner, self.repo, git_ref);
        self.inner
            .delete::<_, (), serde_json::Value>(route, None)
            .await
            .map_err(|e| GatewayError::from_octocrab("delete_ref", e))?;
        Ok(())
    }

    async fn get_commit(&self, sha: &str) -> GatewayResult<Commit> {
        let route = format!("/repos/{}/{}/git/commits/{}", self.owner, self.repo, sha);
        #[derive(serde::Deserialize)]
        struct Tree {
            sha: String,
        }
        #[derive(serde::Deserialize)]
        struct CommitResponse {
            sha: String,
            tree: Tree,
            message: String,
        }
        let response: CommitResponse = self
            .inner
            .get(route, None::<&()>)
            .await
            .map_err(|e| GatewayError::from_octocrab("get_commit", e))?;
        Ok(Commit {
            sha: response.sha,
            tree_sha: response.tree.sha,
            message: response.message,
        })
    }

    async fn create_commit(
        &self,
        tree_sha: &str,
        message: &str,
        parents: &[String],
    ) -> GatewayResult<String> {
        let route = format!("/repos/{}/{}/git/commits", self.owner, self.repo);
        #[derive(serde::Serialize)]
        struct Body<'a> {
            message: &'a str,
            tree: &'a str,
            parents: &'a [String],
        }
        #[derive(serde::Deserialize)]
        struct CommitResponse {
            sha: String,
        }
        let body = Body {
            message,
            tree: tree_sha,
            parents,
        };
        let response: CommitResponse = self
            .inner
            .post(route, Some(&body))
            .await
            .map_err(|e| GatewayError::from_octocrab("create_commit", e))?;
        Ok(response.sha)
    }

    async fn list_tags(&self) -> GatewayResult<Vec<(String, String)>> {
        let route = format!("/repos/{}/{}/git/refs/tags", self.owner, self.repo);
        #[derive(serde::Deserialize)]
        struct RefObject {
            sha: String,
        }
        #[derive(serde::Deserialize)]
        struct RefEntry {
            #[serde(rename = "ref")]
            git_ref: String,
            object: RefObject,
        }
        let entries: Vec<RefEntry> = match self.inner.get(route, None::<&()>).await {
            Ok(entries) => entries,
            Err(e) => {
                let classified = GatewayError::from_octocrab("list_tags", e);
                if classified.is_not_found() {
                    return Ok(Vec::new());
                }
                return Err(classified);
            }
        };
        Ok(entries
            .into_iter()
            .map(|e| (e.git_ref, e.object.sha))
            .collect())
    }

    async fn list_labels(&self, number: u64) -> GatewayResult<Vec<String>> {
        let labels = self
            .inner
            .issues(&self.owner, &self.repo)
            .list_labels_for_issue(number)
            .send()
            .await
            .map_err(|e| GatewayError::from_octocrab("list_labels", e))?;
        Ok(labels.items.into_iter().map(|l| l.name).collect())
    }

    async fn add_labels(&self, number: u64, names: &[String]) -> GatewayResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        match self
            .inner
            .issues(&self.owner, &self.repo)
            .add_labels(number, names)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let classified = GatewayError::from_octocrab("add_labels", e);
                if classified.is_unprocessable() {
                    Ok(())
                } else {
                    Err(classified)
                }
            }
        }
    }

    async fn remove_label(&self, number: u64, name: &str) -> GatewayResult<()> {
        match self
            .inner
            .issues(&self.owner, &self.repo)
            .remove_label(number, name)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let classified = GatewayError::from_octocrab("remove_label", e);
                if classified.is_not_found() {
                    Ok(())
                } else {
                    Err(classified)
                }
            }
        }
    }

    async fn close_pr(&self, number: u64) -> GatewayResult<()> {
        self.inner
            .pulls(&self.owner, &self.repo)
            .update(number)
            .state(octocrab::models::IssueState::Closed)
            .send()
            .await
            .map_err(|e| GatewayError::from_octocrab("close_pr", e))?;
        Ok(())
    }
}

impl GithubGateway {
    async fn collaborator_can_push(&self, login: &str) -> GatewayResult<bool> {
        #[derive(serde::Deserialize)]
        struct Permission {
            permission: String,
        }
        let route = format!(
            "/repos/{}/{}/collaborators/{}/permission",
            self.owner, self.repo, login
        );
        let permission: Permission = self
            .inner
            .get(route, None::<&()>)
            .await
            .map_err(|e| GatewayError::from_octocrab("collaborator_permission", e))?;
        Ok(matches!(permission.permission.as_str(), "admin" | "write"))
    }
}
