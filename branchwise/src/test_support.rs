//! Test helpers: an in-memory [`Runner`], a recording [`Connector`], and
//! throwaway git repositories.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::core::remote::ORIGIN;
use crate::core::snapshot::{BranchInfo, BranchesSnapshot, Commit, SyncStatus};
use crate::hosting::{Connector, HostingError, HostingPlatform, Proposal};
use crate::io::git::{Git, GitError, GitResult, InProgress, ResetMode, Runner};
use crate::io::init::StatePaths;

/// A mutating call received by [`FakeRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Checkout(String),
    CreateBranch(String, String),
    DeleteLocalBranch(String),
    ResetCurrentBranchTo(String, ResetMode),
    ResetBranchTo(String, String),
    CommitAll(String),
    ConcludeMerge,
    Merge(String),
    AbortMerge,
    SquashMerge(String),
    Rebase(String),
    ContinueRebase,
    AbortRebase,
    RevertCommit(String),
    ContinueRevert,
    AbortRevert,
    Stash,
    PopStash,
    DiscardOpenChanges,
    Fetch,
    PushCurrentBranch,
    ForcePushCurrentBranch,
    CreateTrackingBranch(String),
    DeleteTrackingBranch(String),
    PushShaToRemote(String, String),
}

#[derive(Debug, Clone)]
struct FakeBranch {
    sha: String,
    remote: Option<String>,
    gone: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    current: String,
    previous: Option<String>,
    detached: bool,
    unreadable_head: bool,
    branches: BTreeMap<String, FakeBranch>,
    commits: BTreeMap<String, Vec<Commit>>,
    in_progress: Option<InProgress>,
    conflicted: bool,
    open_changes: bool,
    stash: usize,
    next_sha: usize,
    origin_url: Option<String>,
    calls: Vec<GitCall>,
    conflicts: Vec<GitCall>,
    failures: Vec<GitCall>,
}

impl FakeState {
    fn fresh_sha(&mut self) -> String {
        self.next_sha += 1;
        format!("{:07x}", 0xc0ffee0 + self.next_sha)
    }

    fn resolve(&self, refname: &str) -> String {
        if let Some(branch) = self.branches.get(refname) {
            return branch.sha.clone();
        }
        if let Some(name) = refname.strip_prefix(&format!("{ORIGIN}/"))
            && let Some(remote) = self.branches.get(name).and_then(|b| b.remote.clone())
        {
            return remote;
        }
        refname.to_string()
    }

    fn current_mut(&mut self) -> GitResult<&mut FakeBranch> {
        let current = self.current.clone();
        self.branches
            .get_mut(&current)
            .ok_or_else(|| fake_failure(&format!("current branch {current} is gone")))
    }

    fn advance_current(&mut self) -> GitResult<()> {
        let sha = self.fresh_sha();
        self.current_mut()?.sha = sha;
        Ok(())
    }
}

fn fake_failure(message: &str) -> GitError {
    GitError::Failed {
        command: "fake".to_string(),
        stderr: message.to_string(),
    }
}

/// A repository held in memory.
///
/// Every mutating call is logged as a [`GitCall`]. Calls registered with
/// [`FakeRunner::fail_on`] always fail; calls registered with
/// [`FakeRunner::conflict_on`] stop with a conflict once.
#[derive(Debug)]
pub struct FakeRunner {
    state: RefCell<FakeState>,
}

impl FakeRunner {
    pub fn new(current: &str) -> Self {
        let mut state = FakeState {
            current: current.to_string(),
            ..FakeState::default()
        };
        let sha = state.fresh_sha();
        state.branches.insert(
            current.to_string(),
            FakeBranch {
                sha,
                remote: None,
                gone: false,
            },
        );
        Self {
            state: RefCell::new(state),
        }
    }

    /// Add local branches, each at its own commit.
    pub fn with_branches(self, branches: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for branch in branches {
                if state.branches.contains_key(*branch) {
                    continue;
                }
                let sha = state.fresh_sha();
                state.branches.insert(
                    branch.to_string(),
                    FakeBranch {
                        sha,
                        remote: None,
                        gone: false,
                    },
                );
            }
        }
        self
    }

    /// Give existing branches an up-to-date tracking branch.
    pub fn with_tracking(self, branches: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for branch in branches {
                if let Some(info) = state.branches.get_mut(*branch) {
                    info.remote = Some(info.sha.clone());
                }
            }
        }
        self
    }

    pub fn with_origin_url(self, url: &str) -> Self {
        self.state.borrow_mut().origin_url = Some(url.to_string());
        self
    }

    pub fn conflict_on(&self, call: GitCall) {
        self.state.borrow_mut().conflicts.push(call);
    }

    pub fn fail_on(&self, call: GitCall) {
        self.state.borrow_mut().failures.push(call);
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn sha(&self, branch: &str) -> String {
        self.state
            .borrow()
            .branches
            .get(branch)
            .map(|info| info.sha.clone())
            .unwrap_or_else(|| panic!("no branch {branch}"))
    }

    pub fn remote_sha(&self, branch: &str) -> Option<String> {
        self.state
            .borrow()
            .branches
            .get(branch)
            .and_then(|info| info.remote.clone())
    }

    /// Commits `branch` has on top of its parent, oldest first.
    pub fn set_commits(&self, branch: &str, commits: &[(&str, &str)]) {
        let commits = commits
            .iter()
            .map(|(sha, message)| Commit {
                sha: sha.to_string(),
                message: message.to_string(),
            })
            .collect();
        self.state
            .borrow_mut()
            .commits
            .insert(branch.to_string(), commits);
    }

    pub fn detach_head(&self) {
        self.state.borrow_mut().detached = true;
    }

    /// Every later `current_branch` call fails with a git error.
    pub fn break_head(&self) {
        self.state.borrow_mut().unreadable_head = true;
    }

    pub fn set_open_changes(&self, open: bool) {
        self.state.borrow_mut().open_changes = open;
    }

    /// The tracking branch was deleted at the remote (e.g. after shipping).
    pub fn mark_deleted_at_remote(&self, branch: &str) {
        if let Some(info) = self.state.borrow_mut().branches.get_mut(branch) {
            info.remote = None;
            info.gone = true;
        }
    }

    fn record(&self, call: GitCall) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call.clone());
        if state.failures.contains(&call) {
            return Err(fake_failure(&format!("{call:?} failed")));
        }
        if let Some(index) = state.conflicts.iter().position(|c| *c == call) {
            state.conflicts.remove(index);
            state.conflicted = true;
            state.in_progress = match call {
                GitCall::Merge(_) | GitCall::SquashMerge(_) => Some(InProgress::Merge),
                GitCall::Rebase(_) | GitCall::ContinueRebase => Some(InProgress::Rebase),
                GitCall::RevertCommit(_) | GitCall::ContinueRevert => Some(InProgress::Revert),
                _ => None,
            };
            return Err(GitError::Conflict {
                operation: format!("{call:?}"),
            });
        }
        Ok(())
    }

    fn conclude(&self) -> GitResult<()> {
        let mut state = self.state.borrow_mut();
        state.in_progress = None;
        state.conflicted = false;
        state.advance_current()
    }

    fn cancel(&self) {
        let mut state = self.state.borrow_mut();
        state.in_progress = None;
        state.conflicted = false;
    }
}

impl Runner for FakeRunner {
    fn current_branch(&self) -> GitResult<String> {
        let state = self.state.borrow();
        if state.unreadable_head {
            return Err(fake_failure("cannot read HEAD"));
        }
        if state.detached {
            return Err(GitError::DetachedHead);
        }
        Ok(state.current.clone())
    }

    fn previously_checked_out_branch(&self) -> GitResult<Option<String>> {
        let state = self.state.borrow();
        Ok(state
            .previous
            .clone()
            .filter(|branch| state.branches.contains_key(branch)))
    }

    fn branches_snapshot(&self) -> GitResult<BranchesSnapshot> {
        let state = self.state.borrow();
        let branches = state
            .branches
            .iter()
            .map(|(name, info)| BranchInfo {
                local_name: name.clone(),
                local_sha: info.sha.clone(),
                sync_status: match &info.remote {
                    _ if info.gone => SyncStatus::DeletedAtRemote,
                    None => SyncStatus::LocalOnly,
                    Some(remote) if *remote == info.sha => SyncStatus::UpToDate,
                    Some(_) => SyncStatus::NotInSync,
                },
                remote_name: (info.remote.is_some() || info.gone)
                    .then(|| format!("{ORIGIN}/{name}")),
                remote_sha: info.remote.clone(),
            })
            .collect();
        Ok(BranchesSnapshot {
            active: Some(state.current.clone()),
            branches,
        })
    }

    fn branch_exists(&self, branch: &str) -> GitResult<bool> {
        Ok(self.state.borrow().branches.contains_key(branch))
    }

    fn commits_in_branch(&self, branch: &str, _parent: Option<&str>) -> GitResult<Vec<Commit>> {
        Ok(self
            .state
            .borrow()
            .commits
            .get(branch)
            .cloned()
            .unwrap_or_default())
    }

    fn branch_contains(&self, branch: &str, sha: &str) -> GitResult<bool> {
        let state = self.state.borrow();
        let own = state
            .commits
            .get(branch)
            .is_some_and(|commits| commits.iter().any(|commit| commit.sha == sha));
        Ok(own || state.resolve(branch) == sha)
    }

    fn merge_base(&self, _a: &str, b: &str) -> GitResult<String> {
        Ok(self.state.borrow().resolve(b))
    }

    fn has_open_changes(&self) -> GitResult<bool> {
        Ok(self.state.borrow().open_changes)
    }

    fn has_unresolved_conflicts(&self) -> GitResult<bool> {
        Ok(self.state.borrow().conflicted)
    }

    fn operation_in_progress(&self) -> GitResult<Option<InProgress>> {
        Ok(self.state.borrow().in_progress)
    }

    fn stash_size(&self) -> GitResult<usize> {
        Ok(self.state.borrow().stash)
    }

    fn remotes(&self) -> GitResult<Vec<String>> {
        let state = self.state.borrow();
        Ok(state
            .origin_url
            .as_ref()
            .map(|_| vec![ORIGIN.to_string()])
            .unwrap_or_default())
    }

    fn remote_url(&self, remote: &str) -> GitResult<Option<String>> {
        let state = self.state.borrow();
        Ok(state.origin_url.clone().filter(|_| remote == ORIGIN))
    }

    fn checkout(&self, branch: &str) -> GitResult<()> {
        self.record(GitCall::Checkout(branch.to_string()))?;
        let mut state = self.state.borrow_mut();
        if !state.branches.contains_key(branch) {
            return Err(fake_failure(&format!("pathspec '{branch}' did not match")));
        }
        let previous = std::mem::replace(&mut state.current, branch.to_string());
        state.previous = Some(previous);
        state.detached = false;
        Ok(())
    }

    fn create_branch(&self, branch: &str, start: &str) -> GitResult<()> {
        self.record(GitCall::CreateBranch(branch.to_string(), start.to_string()))?;
        let mut state = self.state.borrow_mut();
        if state.branches.contains_key(branch) {
            return Err(fake_failure(&format!("branch '{branch}' already exists")));
        }
        let sha = state.resolve(start);
        state.branches.insert(
            branch.to_string(),
            FakeBranch {
                sha,
                remote: None,
                gone: false,
            },
        );
        Ok(())
    }

    fn delete_local_branch(&self, branch: &str) -> GitResult<()> {
        self.record(GitCall::DeleteLocalBranch(branch.to_string()))?;
        let mut state = self.state.borrow_mut();
        if state.current == branch {
            return Err(fake_failure(&format!(
                "cannot delete branch '{branch}' checked out"
            )));
        }
        state.branches.remove(branch);
        Ok(())
    }

    fn reset_current_branch_to(&self, target: &str, mode: ResetMode) -> GitResult<()> {
        self.record(GitCall::ResetCurrentBranchTo(target.to_string(), mode))?;
        let mut state = self.state.borrow_mut();
        let sha = state.resolve(target);
        state.current_mut()?.sha = sha;
        state.open_changes = mode == ResetMode::Soft;
        Ok(())
    }

    fn reset_branch_to(&self, branch: &str, sha: &str) -> GitResult<()> {
        self.record(GitCall::ResetBranchTo(branch.to_string(), sha.to_string()))?;
        let mut state = self.state.borrow_mut();
        match state.branches.get_mut(branch) {
            Some(info) => {
                info.sha = sha.to_string();
                Ok(())
            }
            None => Err(fake_failure(&format!("no branch {branch}"))),
        }
    }

    fn commit_all(&self, message: &str) -> GitResult<bool> {
        self.record(GitCall::CommitAll(message.to_string()))?;
        let mut state = self.state.borrow_mut();
        if !state.open_changes {
            return Ok(false);
        }
        state.open_changes = false;
        state.advance_current()?;
        Ok(true)
    }

    fn conclude_merge(&self) -> GitResult<()> {
        self.record(GitCall::ConcludeMerge)?;
        self.conclude()
    }

    fn merge(&self, refname: &str) -> GitResult<()> {
        self.record(GitCall::Merge(refname.to_string()))?;
        let mut state = self.state.borrow_mut();
        let target = state.resolve(refname);
        if state.current_mut()?.sha != target {
            state.advance_current()?;
        }
        Ok(())
    }

    fn abort_merge(&self) -> GitResult<()> {
        self.record(GitCall::AbortMerge)?;
        self.cancel();
        Ok(())
    }

    fn squash_merge(&self, branch: &str) -> GitResult<()> {
        self.record(GitCall::SquashMerge(branch.to_string()))?;
        self.state.borrow_mut().open_changes = true;
        Ok(())
    }

    fn rebase(&self, onto: &str) -> GitResult<()> {
        self.record(GitCall::Rebase(onto.to_string()))?;
        let mut state = self.state.borrow_mut();
        let target = state.resolve(onto);
        if state.current_mut()?.sha != target {
            state.advance_current()?;
        }
        Ok(())
    }

    fn continue_rebase(&self) -> GitResult<()> {
        self.record(GitCall::ContinueRebase)?;
        self.conclude()
    }

    fn abort_rebase(&self) -> GitResult<()> {
        self.record(GitCall::AbortRebase)?;
        self.cancel();
        Ok(())
    }

    fn revert_commit(&self, sha: &str) -> GitResult<()> {
        self.record(GitCall::RevertCommit(sha.to_string()))?;
        self.state.borrow_mut().advance_current()
    }

    fn continue_revert(&self) -> GitResult<()> {
        self.record(GitCall::ContinueRevert)?;
        self.conclude()
    }

    fn abort_revert(&self) -> GitResult<()> {
        self.record(GitCall::AbortRevert)?;
        self.cancel();
        Ok(())
    }

    fn stash(&self) -> GitResult<()> {
        self.record(GitCall::Stash)?;
        let mut state = self.state.borrow_mut();
        if state.open_changes {
            state.stash += 1;
            state.open_changes = false;
        }
        Ok(())
    }

    fn pop_stash(&self) -> GitResult<()> {
        self.record(GitCall::PopStash)?;
        let mut state = self.state.borrow_mut();
        if state.stash == 0 {
            return Err(fake_failure("no stash entries found"));
        }
        state.stash -= 1;
        state.open_changes = true;
        Ok(())
    }

    fn discard_open_changes(&self) -> GitResult<()> {
        self.record(GitCall::DiscardOpenChanges)?;
        let mut state = self.state.borrow_mut();
        state.open_changes = false;
        state.conflicted = false;
        Ok(())
    }

    fn fetch(&self) -> GitResult<()> {
        self.record(GitCall::Fetch)
    }

    fn push_current_branch(&self) -> GitResult<()> {
        self.record(GitCall::PushCurrentBranch)?;
        let mut state = self.state.borrow_mut();
        let branch = state.current_mut()?;
        branch.remote = Some(branch.sha.clone());
        branch.gone = false;
        Ok(())
    }

    fn force_push_current_branch(&self) -> GitResult<()> {
        self.record(GitCall::ForcePushCurrentBranch)?;
        let mut state = self.state.borrow_mut();
        let branch = state.current_mut()?;
        branch.remote = Some(branch.sha.clone());
        Ok(())
    }

    fn create_tracking_branch(&self, branch: &str) -> GitResult<()> {
        self.record(GitCall::CreateTrackingBranch(branch.to_string()))?;
        if let Some(info) = self.state.borrow_mut().branches.get_mut(branch) {
            info.remote = Some(info.sha.clone());
            info.gone = false;
        }
        Ok(())
    }

    fn delete_tracking_branch(&self, branch: &str) -> GitResult<()> {
        self.record(GitCall::DeleteTrackingBranch(branch.to_string()))?;
        if let Some(info) = self.state.borrow_mut().branches.get_mut(branch) {
            info.remote = None;
            info.gone = false;
        }
        Ok(())
    }

    fn push_sha_to_remote(&self, branch: &str, sha: &str) -> GitResult<()> {
        self.record(GitCall::PushShaToRemote(branch.to_string(), sha.to_string()))?;
        if let Some(info) = self.state.borrow_mut().branches.get_mut(branch) {
            info.remote = Some(sha.to_string());
            info.gone = false;
        }
        Ok(())
    }
}

/// A call received by [`FakeConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorCall {
    SquashMerge(u64, String),
    UpdateTarget(u64, String),
}

/// A hosting platform with a fixed set of open proposals, keyed by branch.
#[derive(Debug, Default)]
pub struct FakeConnector {
    proposals: BTreeMap<String, Proposal>,
    calls: RefCell<Vec<ConnectorCall>>,
    offline: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector without API credentials.
    pub fn without_api() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_proposal(mut self, branch: &str, number: u64, target: &str) -> Self {
        self.proposals.insert(
            branch.to_string(),
            Proposal {
                number,
                title: format!("{branch} title"),
                target: target.to_string(),
                merge_with_api: true,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<ConnectorCall> {
        self.calls.borrow().clone()
    }
}

impl Connector for FakeConnector {
    fn platform(&self) -> HostingPlatform {
        HostingPlatform::GitHub
    }

    fn repository_url(&self) -> String {
        "https://github.com/acme/widgets".to_string()
    }

    fn new_proposal_url(&self, branch: &str, parent: &str, _main: &str) -> String {
        format!("{}/compare/{parent}...{branch}", self.repository_url())
    }

    fn can_make_api_calls(&self) -> bool {
        !self.offline
    }

    fn find_proposal(&self, branch: &str, target: &str) -> Result<Option<Proposal>, HostingError> {
        Ok(self
            .proposals
            .get(branch)
            .filter(|proposal| proposal.target == target)
            .cloned())
    }

    fn squash_merge_proposal(&self, number: u64, message: &str) -> Result<(), HostingError> {
        if number == 0 {
            return Err(HostingError::MissingNumber);
        }
        self.calls
            .borrow_mut()
            .push(ConnectorCall::SquashMerge(number, message.to_string()));
        Ok(())
    }

    fn update_proposal_target(&self, number: u64, target: &str) -> Result<(), HostingError> {
        self.calls
            .borrow_mut()
            .push(ConnectorCall::UpdateTarget(number, target.to_string()));
        Ok(())
    }
}

/// A temporary git repository with one commit on `main`, optionally cloned
/// from a bare `origin`.
pub struct TestRepo {
    _dir: TempDir,
    root: PathBuf,
    origin: Option<PathBuf>,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let root = dir.path().join("work");
        fs::create_dir_all(&root).context("create work dir")?;
        let repo = Self {
            _dir: dir,
            root,
            origin: None,
        };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.commit_file("README.md", "hi\n", "initial commit")?;
        Ok(repo)
    }

    /// Like [`TestRepo::new`], with `main` pushed to a bare `origin`.
    pub fn with_origin() -> Result<Self> {
        let mut repo = Self::new()?;
        let origin = repo.root.with_file_name("origin.git");
        let status = Command::new("git")
            .args(["init", "--quiet", "--bare"])
            .arg(&origin)
            .status()
            .context("spawn git init --bare")?;
        if !status.success() {
            bail!("git init --bare failed");
        }
        let origin_str = origin.to_string_lossy().to_string();
        repo.git(&["remote", "add", ORIGIN, &origin_str])?;
        repo.git(&["push", "--quiet", "-u", ORIGIN, "main"])?;
        repo.origin = Some(origin);
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn runner(&self) -> Git {
        Git::new(&self.root)
    }

    pub fn state_paths(&self) -> StatePaths {
        StatePaths::new(self.root.join(".git"))
    }

    /// Run git in the work tree and return its trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        fs::write(self.root.join(name), contents).with_context(|| format!("write {name}"))
    }

    /// Write `name` and commit it; returns the new commit SHA.
    pub fn commit_file(&self, name: &str, contents: &str, message: &str) -> Result<String> {
        self.write_file(name, contents)?;
        self.git(&["add", name])?;
        self.git(&["commit", "--quiet", "-m", message])?;
        self.sha("HEAD")
    }

    /// Create `branch` from `start` and check it out.
    pub fn create_branch(&self, branch: &str, start: &str) -> Result<()> {
        self.git(&["checkout", "--quiet", "-b", branch, start])?;
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", "--quiet", branch])?;
        Ok(())
    }

    pub fn push(&self, branch: &str) -> Result<()> {
        self.git(&["push", "--quiet", "-u", ORIGIN, branch])?;
        Ok(())
    }

    pub fn sha(&self, refname: &str) -> Result<String> {
        self.git(&["rev-parse", refname])
    }

    pub fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.git(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .is_ok()
    }

    /// Commit subjects reachable from `range`, newest first.
    pub fn log_subjects(&self, range: &str) -> Result<Vec<String>> {
        let out = self.git(&["log", "--format=%s", range])?;
        Ok(out.lines().map(str::to_string).collect())
    }
}
