//! Bitbucket: browser URLs only, no API integration.

use super::{Connector, HostingError, HostingPlatform, Proposal, RepoLocation};

pub struct BitbucketConnector {
    location: RepoLocation,
}

impl BitbucketConnector {
    pub fn new(location: RepoLocation) -> Self {
        Self { location }
    }

    fn unsupported(operation: &'static str) -> HostingError {
        HostingError::Unsupported {
            platform: HostingPlatform::Bitbucket.name(),
            operation,
        }
    }
}

impl Connector for BitbucketConnector {
    fn platform(&self) -> HostingPlatform {
        HostingPlatform::Bitbucket
    }

    fn repository_url(&self) -> String {
        self.location.web_url()
    }

    fn new_proposal_url(&self, branch: &str, parent: &str, _main: &str) -> String {
        let dest = format!(
            "{}/{}:{parent}",
            self.location.organization, self.location.repository
        );
        format!(
            "{}/pull-requests/new?source={}&dest={}",
            self.repository_url(),
            urlencoding::encode(branch),
            urlencoding::encode(&dest),
        )
    }

    fn can_make_api_calls(&self) -> bool {
        false
    }

    fn find_proposal(&self, _branch: &str, _target: &str) -> Result<Option<Proposal>, HostingError> {
        Err(Self::unsupported("finding pull requests"))
    }

    fn squash_merge_proposal(&self, _number: u64, _message: &str) -> Result<(), HostingError> {
        Err(Self::unsupported("merging pull requests"))
    }

    fn update_proposal_target(&self, _number: u64, _target: &str) -> Result<(), HostingError> {
        Err(Self::unsupported("changing the target branch of pull requests"))
    }
}
