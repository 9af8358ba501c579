//! Gitea (gitea.com and self-hosted).

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    ApiClient, Connector, HostingError, HostingPlatform, Proposal, ProposalCandidate, RepoLocation,
    filter_proposals,
};
use crate::core::message::split_message;

/// Gitea lists at most this many pull requests per page.
const PAGE_SIZE: u32 = 50;

pub struct GiteaConnector {
    location: RepoLocation,
    api: Option<ApiClient>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    title: String,
    head: Branch,
    base: Branch,
    #[serde(default)]
    mergeable: bool,
}

#[derive(Debug, Deserialize)]
struct Branch {
    #[serde(rename = "ref")]
    branch: String,
    #[serde(default)]
    repo: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

impl GiteaConnector {
    pub fn new(location: RepoLocation, token: Option<String>) -> Result<Self, HostingError> {
        let api = match token {
            Some(token) => Some(ApiClient::new(
                HostingPlatform::Gitea,
                format!("https://{}/api/v1", location.host),
                "Authorization",
                format!("token {token}"),
            )?),
            None => None,
        };
        Ok(Self { location, api })
    }

    fn api(&self) -> Result<&ApiClient, HostingError> {
        self.api
            .as_ref()
            .ok_or(HostingError::MissingToken(HostingPlatform::Gitea.name()))
    }

    fn repo_path(&self) -> String {
        format!(
            "/repos/{}/{}",
            self.location.organization, self.location.repository
        )
    }

    fn candidate(&self, pull: PullRequest) -> ProposalCandidate {
        let owner = pull
            .head
            .repo
            .map(|repo| repo.owner.login)
            .unwrap_or_else(|| self.location.organization.clone());
        ProposalCandidate {
            number: pull.number,
            title: pull.title,
            head: format!("{owner}/{}", pull.head.branch),
            base: pull.base.branch,
            mergeable: pull.mergeable,
        }
    }
}

impl Connector for GiteaConnector {
    fn platform(&self) -> HostingPlatform {
        HostingPlatform::Gitea
    }

    fn repository_url(&self) -> String {
        self.location.web_url()
    }

    fn new_proposal_url(&self, branch: &str, parent: &str, _main: &str) -> String {
        let compare = format!("{parent}...{branch}");
        format!(
            "{}/compare/{}",
            self.repository_url(),
            urlencoding::encode(&compare)
        )
    }

    fn can_make_api_calls(&self) -> bool {
        self.api.is_some()
    }

    fn find_proposal(&self, branch: &str, target: &str) -> Result<Option<Proposal>, HostingError> {
        let path = format!("{}/pulls?state=open&limit={PAGE_SIZE}", self.repo_path());
        let pulls: Vec<PullRequest> = self.api()?.get(&path)?;
        let candidates: Vec<ProposalCandidate> =
            pulls.into_iter().map(|pull| self.candidate(pull)).collect();
        filter_proposals(&candidates, &self.location.organization, branch, target)
    }

    fn squash_merge_proposal(&self, number: u64, message: &str) -> Result<(), HostingError> {
        if number == 0 {
            return Err(HostingError::MissingNumber);
        }
        let (title, body) = split_message(message);
        info!(number, "squash merging pull request via Gitea API");
        self.api()?.send_json(
            Method::POST,
            &format!("{}/pulls/{number}/merge", self.repo_path()),
            &json!({
                "Do": "squash",
                "MergeTitleField": title,
                "MergeMessageField": body,
            }),
        )
    }

    fn update_proposal_target(&self, _number: u64, _target: &str) -> Result<(), HostingError> {
        Err(HostingError::Unsupported {
            platform: HostingPlatform::Gitea.name(),
            operation: "changing the target branch of pull requests",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> GiteaConnector {
        GiteaConnector::new(
            RepoLocation {
                host: "gitea.com".to_string(),
                organization: "acme".to_string(),
                repository: "widgets".to_string(),
            },
            None,
        )
        .expect("connector")
    }

    #[test]
    fn proposal_url_escapes_compare_range() {
        assert_eq!(
            connector().new_proposal_url("feature", "parent", "main"),
            "https://gitea.com/acme/widgets/compare/parent...feature"
        );
        assert_eq!(
            connector().new_proposal_url("feat/x", "main", "main"),
            "https://gitea.com/acme/widgets/compare/main...feat%2Fx"
        );
    }

    #[test]
    fn retargeting_is_unsupported() {
        let err = connector()
            .update_proposal_target(1, "main")
            .expect_err("unsupported");
        assert_eq!(
            err.to_string(),
            "Gitea does not support changing the target branch of pull requests"
        );
    }

    #[test]
    fn squash_merge_requires_a_number() {
        assert!(matches!(
            connector().squash_merge_proposal(0, "msg"),
            Err(HostingError::MissingNumber)
        ));
    }

    #[test]
    fn heads_fall_back_to_repository_owner() {
        let pull: PullRequest = serde_json::from_value(json!({
            "number": 3,
            "title": "Fix",
            "head": { "ref": "feature-1" },
            "base": { "ref": "main" },
            "mergeable": true,
        }))
        .expect("pull request");
        let candidate = connector().candidate(pull);
        assert_eq!(candidate.head, "acme/feature-1");
    }
}
