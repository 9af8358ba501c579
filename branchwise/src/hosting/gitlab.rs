//! GitLab (gitlab.com and self-hosted).

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    ApiClient, Connector, HostingError, HostingPlatform, Proposal, ProposalCandidate, RepoLocation,
    filter_proposals,
};

pub struct GitLabConnector {
    location: RepoLocation,
    api: Option<ApiClient>,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
    title: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    merge_status: Option<String>,
}

impl GitLabConnector {
    pub fn new(location: RepoLocation, token: Option<String>) -> Result<Self, HostingError> {
        let api = match token {
            Some(token) => Some(ApiClient::new(
                HostingPlatform::GitLab,
                format!("https://{}/api/v4", location.host),
                "PRIVATE-TOKEN",
                token,
            )?),
            None => None,
        };
        Ok(Self { location, api })
    }

    fn api(&self) -> Result<&ApiClient, HostingError> {
        self.api
            .as_ref()
            .ok_or(HostingError::MissingToken(HostingPlatform::GitLab.name()))
    }

    /// `/projects/<url-encoded org/repo>`
    fn project_path(&self) -> String {
        let id = format!(
            "{}/{}",
            self.location.organization, self.location.repository
        );
        format!("/projects/{}", urlencoding::encode(&id))
    }
}

impl Connector for GitLabConnector {
    fn platform(&self) -> HostingPlatform {
        HostingPlatform::GitLab
    }

    fn repository_url(&self) -> String {
        self.location.web_url()
    }

    fn new_proposal_url(&self, branch: &str, parent: &str, _main: &str) -> String {
        format!(
            "{}/-/merge_requests/new?merge_request%5Bsource_branch%5D={}&merge_request%5Btarget_branch%5D={}",
            self.repository_url(),
            urlencoding::encode(branch),
            urlencoding::encode(parent),
        )
    }

    fn can_make_api_calls(&self) -> bool {
        self.api.is_some()
    }

    fn find_proposal(&self, branch: &str, target: &str) -> Result<Option<Proposal>, HostingError> {
        let path = format!(
            "{}/merge_requests?state=opened&source_branch={}&target_branch={}",
            self.project_path(),
            urlencoding::encode(branch),
            urlencoding::encode(target),
        );
        let requests: Vec<MergeRequest> = self.api()?.get(&path)?;
        // The listing is scoped to this project, so every source branch lives
        // in this organization.
        let candidates: Vec<ProposalCandidate> = requests
            .into_iter()
            .map(|request| ProposalCandidate {
                number: request.iid,
                title: request.title,
                head: format!("{}/{}", self.location.organization, request.source_branch),
                base: request.target_branch,
                mergeable: request.merge_status.as_deref() != Some("cannot_be_merged"),
            })
            .collect();
        filter_proposals(&candidates, &self.location.organization, branch, target)
    }

    fn squash_merge_proposal(&self, number: u64, message: &str) -> Result<(), HostingError> {
        if number == 0 {
            return Err(HostingError::MissingNumber);
        }
        info!(number, "squash merging merge request via GitLab API");
        self.api()?.send_json(
            Method::PUT,
            &format!("{}/merge_requests/{number}/merge", self.project_path()),
            &json!({
                "squash": true,
                "squash_commit_message": message,
                "should_remove_source_branch": false,
            }),
        )
    }

    fn update_proposal_target(&self, number: u64, target: &str) -> Result<(), HostingError> {
        if number == 0 {
            return Err(HostingError::MissingNumber);
        }
        info!(number, target, "updating merge request target via GitLab API");
        self.api()?.send_json(
            Method::PUT,
            &format!("{}/merge_requests/{number}", self.project_path()),
            &json!({ "target_branch": target }),
        )
    }
}
