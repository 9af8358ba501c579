//! Point-in-time views of the repository's branches.

use serde::{Deserialize, Serialize};

/// A single commit as listed by `commits_in_branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
}

/// Relationship between a local branch and its tracking branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    UpToDate,
    NotInSync,
    LocalOnly,
    DeletedAtRemote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub local_name: String,
    pub local_sha: String,
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_sha: Option<String>,
}

impl BranchInfo {
    /// True if the branch has a tracking branch that still exists.
    pub fn has_tracking_branch(&self) -> bool {
        self.remote_sha.is_some()
    }
}

/// The active branch plus every local branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchesSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    pub branches: Vec<BranchInfo>,
}

impl BranchesSnapshot {
    pub fn find(&self, branch: &str) -> Option<&BranchInfo> {
        self.branches.iter().find(|info| info.local_name == branch)
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.find(branch).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|info| info.local_name.as_str())
    }
}
