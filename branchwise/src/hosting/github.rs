//! GitHub and GitHub Enterprise.

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    ApiClient, Connector, HostingError, HostingPlatform, Proposal, ProposalCandidate, RepoLocation,
    filter_proposals,
};
use crate::core::message::split_message;

pub struct GitHubConnector {
    location: RepoLocation,
    api: Option<ApiClient>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    title: String,
    head: PullRequestRef,
    base: PullRequestRef,
    #[serde(default)]
    mergeable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    #[serde(rename = "ref")]
    branch: String,
    #[serde(default)]
    label: Option<String>,
}

impl GitHubConnector {
    pub fn new(location: RepoLocation, token: Option<String>) -> Result<Self, HostingError> {
        let api = match token {
            Some(token) => Some(ApiClient::new(
                HostingPlatform::GitHub,
                api_base_url(&location.host),
                "Authorization",
                format!("Bearer {token}"),
            )?),
            None => None,
        };
        Ok(Self { location, api })
    }

    fn api(&self) -> Result<&ApiClient, HostingError> {
        self.api
            .as_ref()
            .ok_or(HostingError::MissingToken(HostingPlatform::GitHub.name()))
    }

    fn repo_path(&self) -> String {
        format!(
            "/repos/{}/{}",
            self.location.organization, self.location.repository
        )
    }
}

fn api_base_url(host: &str) -> String {
    if host == "github.com" {
        "https://api.github.com".to_string()
    } else {
        format!("https://{host}/api/v3")
    }
}

fn candidate(pull: PullRequest) -> ProposalCandidate {
    // Labels look like `owner:branch`.
    let owner = pull
        .head
        .label
        .as_deref()
        .and_then(|label| label.split_once(':'))
        .map(|(owner, _)| owner.to_string())
        .unwrap_or_default();
    ProposalCandidate {
        number: pull.number,
        title: pull.title,
        head: format!("{owner}/{}", pull.head.branch),
        base: pull.base.branch,
        mergeable: pull.mergeable.unwrap_or(true),
    }
}

impl Connector for GitHubConnector {
    fn platform(&self) -> HostingPlatform {
        HostingPlatform::GitHub
    }

    fn repository_url(&self) -> String {
        self.location.web_url()
    }

    fn new_proposal_url(&self, branch: &str, parent: &str, main: &str) -> String {
        let compare = if parent == main {
            urlencoding::encode(branch).into_owned()
        } else {
            format!(
                "{}...{}",
                urlencoding::encode(parent),
                urlencoding::encode(branch)
            )
        };
        format!("{}/compare/{compare}?expand=1", self.repository_url())
    }

    fn can_make_api_calls(&self) -> bool {
        self.api.is_some()
    }

    fn find_proposal(&self, branch: &str, target: &str) -> Result<Option<Proposal>, HostingError> {
        let path = format!(
            "{}/pulls?state=open&head={}&base={}",
            self.repo_path(),
            urlencoding::encode(&format!("{}:{branch}", self.location.organization)),
            urlencoding::encode(target),
        );
        let pulls: Vec<PullRequest> = self.api()?.get(&path)?;
        let candidates: Vec<ProposalCandidate> = pulls.into_iter().map(candidate).collect();
        filter_proposals(&candidates, &self.location.organization, branch, target)
    }

    fn squash_merge_proposal(&self, number: u64, message: &str) -> Result<(), HostingError> {
        if number == 0 {
            return Err(HostingError::MissingNumber);
        }
        let (title, body) = split_message(message);
        info!(number, "squash merging pull request via GitHub API");
        self.api()?.send_json(
            Method::PUT,
            &format!("{}/pulls/{number}/merge", self.repo_path()),
            &json!({
                "merge_method": "squash",
                "commit_title": title,
                "commit_message": body,
            }),
        )
    }

    fn update_proposal_target(&self, number: u64, target: &str) -> Result<(), HostingError> {
        if number == 0 {
            return Err(HostingError::MissingNumber);
        }
        info!(number, target, "updating pull request base via GitHub API");
        self.api()?.send_json(
            Method::PATCH,
            &format!("{}/pulls/{number}", self.repo_path()),
            &json!({ "base": target }),
        )
    }
}
