//! Code hosting platforms (proposals a.k.a. pull/merge requests).
//!
//! One [`Connector`] implementation per platform. The platform is chosen once
//! per command by [`select_connector`] from configuration or the `origin` URL.

pub mod bitbucket;
pub mod gitea;
pub mod github;
pub mod gitlab;

use std::fmt;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::remote::RemoteUrl;
use crate::io::config::HostingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostingPlatform {
    GitHub,
    GitLab,
    Gitea,
    Bitbucket,
}

impl HostingPlatform {
    /// Detect the platform from a hostname such as `github.com` or
    /// `gitlab.example.org`.
    pub fn detect(host: &str) -> Option<Self> {
        let host = host.to_ascii_lowercase();
        if host.contains("github") {
            Some(HostingPlatform::GitHub)
        } else if host.contains("gitlab") {
            Some(HostingPlatform::GitLab)
        } else if host.contains("gitea") {
            Some(HostingPlatform::Gitea)
        } else if host.contains("bitbucket") {
            Some(HostingPlatform::Bitbucket)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HostingPlatform::GitHub => "GitHub",
            HostingPlatform::GitLab => "GitLab",
            HostingPlatform::Gitea => "Gitea",
            HostingPlatform::Bitbucket => "Bitbucket",
        }
    }
}

impl fmt::Display for HostingPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum HostingError {
    #[error("{platform} does not support {operation}")]
    Unsupported {
        platform: &'static str,
        operation: &'static str,
    },

    #[error("found {count} proposals for branch '{branch}' into '{target}'")]
    Ambiguous {
        count: usize,
        branch: String,
        target: String,
    },

    #[error("no proposal number given")]
    MissingNumber,

    #[error("no API token configured for {0}")]
    MissingToken(&'static str),

    #[error("{platform} API responded {status}: {message}")]
    Api {
        platform: &'static str,
        status: u16,
        message: String,
    },

    #[error("hosting API request failed")]
    Transport(#[from] reqwest::Error),
}

/// An open pull/merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub number: u64,
    pub title: String,
    pub target: String,
    /// The platform reports the proposal as mergeable through its API.
    pub merge_with_api: bool,
}

/// An open proposal as listed by a platform API, normalized for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalCandidate {
    pub number: u64,
    pub title: String,
    /// `<organization>/<branch>` of the proposed changes.
    pub head: String,
    pub base: String,
    pub mergeable: bool,
}

/// Pick the single open proposal from `organization/branch` into `target`.
pub fn filter_proposals(
    candidates: &[ProposalCandidate],
    organization: &str,
    branch: &str,
    target: &str,
) -> Result<Option<Proposal>, HostingError> {
    let head = format!("{organization}/{branch}");
    let matches: Vec<&ProposalCandidate> = candidates
        .iter()
        .filter(|candidate| candidate.head == head && candidate.base == target)
        .collect();
    match matches.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(Proposal {
            number: only.number,
            title: only.title.clone(),
            target: only.base.clone(),
            merge_with_api: only.mergeable,
        })),
        many => Err(HostingError::Ambiguous {
            count: many.len(),
            branch: branch.to_string(),
            target: target.to_string(),
        }),
    }
}

/// Platform-specific proposal operations.
pub trait Connector {
    fn platform(&self) -> HostingPlatform;

    /// Web URL of the repository.
    fn repository_url(&self) -> String;

    /// Web URL that opens a new proposal for `branch` into `parent`.
    fn new_proposal_url(&self, branch: &str, parent: &str, main: &str) -> String;

    /// True if the connector has credentials to call the platform API.
    fn can_make_api_calls(&self) -> bool;

    fn find_proposal(&self, branch: &str, target: &str) -> Result<Option<Proposal>, HostingError>;

    fn squash_merge_proposal(&self, number: u64, message: &str) -> Result<(), HostingError>;

    fn update_proposal_target(&self, number: u64, target: &str) -> Result<(), HostingError>;

    /// Commit message used when shipping a proposal without an explicit one.
    fn default_proposal_message(&self, proposal: &Proposal) -> String {
        format!("{} (#{})", proposal.title, proposal.number)
    }
}

/// Where a repository lives on its hosting platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub host: String,
    pub organization: String,
    pub repository: String,
}

impl RepoLocation {
    pub fn web_url(&self) -> String {
        format!(
            "https://{}/{}/{}",
            self.host, self.organization, self.repository
        )
    }
}

impl From<RemoteUrl> for RepoLocation {
    fn from(remote: RemoteUrl) -> Self {
        Self {
            host: remote.host,
            organization: remote.organization,
            repository: remote.repository,
        }
    }
}

/// Pick the connector for the repository behind `origin_url`.
///
/// Returns `None` when the remote is missing, unparseable, or hosted on an
/// unknown platform.
pub fn select_connector(
    config: &HostingConfig,
    origin_url: Option<&str>,
    offline: bool,
) -> Result<Option<Box<dyn Connector>>, HostingError> {
    let Some(remote) = origin_url.and_then(RemoteUrl::parse) else {
        debug!("no parseable origin remote, no hosting connector");
        return Ok(None);
    };
    let mut location = RepoLocation::from(remote);
    if let Some(hostname) = &config.origin_hostname {
        location.host = hostname.clone();
    }
    let Some(platform) = config
        .platform
        .or_else(|| HostingPlatform::detect(&location.host))
    else {
        debug!(host = %location.host, "unknown hosting platform");
        return Ok(None);
    };
    let token = if offline {
        None
    } else {
        config.token(platform)
    };
    info!(%platform, host = %location.host, api = token.is_some(), "selected hosting connector");
    let connector: Box<dyn Connector> = match platform {
        HostingPlatform::GitHub => Box::new(github::GitHubConnector::new(location, token)?),
        HostingPlatform::GitLab => Box::new(gitlab::GitLabConnector::new(location, token)?),
        HostingPlatform::Gitea => Box::new(gitea::GiteaConnector::new(location, token)?),
        HostingPlatform::Bitbucket => Box::new(bitbucket::BitbucketConnector::new(location)),
    };
    Ok(Some(connector))
}

/// Authenticated JSON client for one platform API.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    platform: &'static str,
    client: Client,
    base_url: String,
    auth_header: &'static str,
    auth_value: String,
}

impl ApiClient {
    pub(crate) fn new(
        platform: HostingPlatform,
        base_url: String,
        auth_header: &'static str,
        auth_value: String,
    ) -> Result<Self, HostingError> {
        let client = Client::builder()
            .user_agent(concat!("branchwise/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            platform: platform.name(),
            client,
            base_url,
            auth_header,
            auth_value,
        })
    }

    pub(crate) fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HostingError> {
        let request = self.client.get(self.url(path));
        self.send(request)?.json().map_err(HostingError::from)
    }

    /// Send a JSON body and ignore the response body.
    pub(crate) fn send_json<B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<(), HostingError> {
        let request = self.client.request(method, self.url(path)).json(body);
        self.send(request)?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder) -> Result<reqwest::blocking::Response, HostingError> {
        let response = request
            .header(self.auth_header, &self.auth_value)
            .header("Accept", "application/json")
            .send()?;
        let status = response.status();
        debug!(platform = self.platform, status = status.as_u16(), "API response");
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(HostingError::Api {
            platform: self.platform,
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }
}
