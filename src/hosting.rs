//! Code-hosting review system: pull-request creation and state queries.
//!
//! The orchestrator consumes hosting through the narrow [`ReviewHost`]
//! trait so tests can inject a stub. The production implementation talks to
//! the GitHub REST API.

use crate::config::HostingConfig;
use crate::errors::HostError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "conductor-orchestrator";

/// State of a feature branch's pull request on the hosting system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    /// No pull request exists for the branch.
    None,
    Open,
    Merged,
    /// Closed without merging.
    Closed,
}

impl PrState {
    pub fn exists(&self) -> bool {
        !matches!(self, PrState::None)
    }
}

/// Narrow interface to the review system.
#[async_trait]
pub trait ReviewHost: Send + Sync {
    /// Open a pull request for `branch`; returns its external number.
    async fn create_pull_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<u64, HostError>;

    /// Current pull-request state for `branch`.
    async fn pull_request_state(&self, branch: &str) -> Result<PrState, HostError>;
}

/// A pull request (subset of fields we care about).
#[derive(Debug, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: String,
    pub merged_at: Option<String>,
}

/// Map the hosting system's listing for one head branch to a [`PrState`].
///
/// When several PRs exist for the branch (reopened after a close), the most
/// significant state wins: merged > open > closed.
pub fn state_of(prs: &[PullRequest]) -> PrState {
    let mut state = PrState::None;
    for pr in prs {
        if pr.merged_at.is_some() {
            return PrState::Merged;
        }
        if pr.state == "open" {
            state = PrState::Open;
        } else if state == PrState::None {
            state = PrState::Closed;
        }
    }
    state
}

/// Stand-in host used when no hosting repository is configured: every
/// branch reports no pull request, and opening one fails. Features run up
/// to the PR phase and then escalate.
pub struct DisabledHost;

#[async_trait]
impl ReviewHost for DisabledHost {
    async fn create_pull_request(
        &self,
        _branch: &str,
        _title: &str,
        _body: &str,
    ) -> Result<u64, HostError> {
        Err(HostError::NotConfigured)
    }

    async fn pull_request_state(&self, _branch: &str) -> Result<PrState, HostError> {
        Ok(PrState::None)
    }
}

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedPullRequest {
    number: u64,
}

/// GitHub REST implementation of [`ReviewHost`].
pub struct GitHubHost {
    client: reqwest::Client,
    repo: String,
    token: String,
    base: String,
}

impl GitHubHost {
    pub fn new(repo: &str, token: &str, base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            repo: repo.to_string(),
            token: token.to_string(),
            base: base.to_string(),
        }
    }

    /// Build from configuration; `None` when no repository is configured,
    /// which disables real hosting calls.
    pub fn from_config(hosting: &HostingConfig, mainline: &str) -> Option<Self> {
        if hosting.repo.is_empty() {
            return None;
        }
        let token = std::env::var(&hosting.token_env).unwrap_or_default();
        Some(Self::new(&hosting.repo, &token, mainline))
    }

    fn owner(&self) -> &str {
        self.repo.split('/').next().unwrap_or(&self.repo)
    }
}

#[async_trait]
impl ReviewHost for GitHubHost {
    async fn create_pull_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<u64, HostError> {
        let url = format!("{}/repos/{}/pulls", GITHUB_API, self.repo);
        let payload = CreatePullRequest {
            title,
            head: branch,
            base: &self.base,
            body,
        };
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .json(&payload)
            .send()
            .await
            .map_err(HostError::Request)?;

        if !resp.status().is_success() {
            return Err(HostError::Status {
                status: resp.status().as_u16(),
                context: format!("create pull request for {}", branch),
            });
        }
        let created: CreatedPullRequest = resp.json().await.map_err(HostError::Request)?;
        Ok(created.number)
    }

    async fn pull_request_state(&self, branch: &str) -> Result<PrState, HostError> {
        let url = format!("{}/repos/{}/pulls", GITHUB_API, self.repo);
        let head = format!("{}:{}", self.owner(), branch);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .query(&[("head", head.as_str()), ("state", "all")])
            .send()
            .await
            .map_err(HostError::Request)?;

        if !resp.status().is_success() {
            return Err(HostError::Status {
                status: resp.status().as_u16(),
                context: format!("query pull request state for {}", branch),
            });
        }
        let prs: Vec<PullRequest> = resp.json().await.map_err(HostError::Request)?;
        Ok(state_of(&prs))
    }
}
