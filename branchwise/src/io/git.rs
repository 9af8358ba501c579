//! Git adapter for branchwise commands.
//!
//! Opcodes talk to the repository through the [`Runner`] trait so the
//! interpreter can be driven by a scripted fake in tests. [`Git`] is the real
//! implementation: a small, explicit wrapper around `git` subprocess calls.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::remote::ORIGIN;
use crate::core::snapshot::{BranchInfo, BranchesSnapshot, Commit, SyncStatus};

#[derive(Debug, Error)]
pub enum GitError {
    /// Git stopped and left conflicts for the user to resolve.
    #[error("{operation} stopped with conflicts")]
    Conflict { operation: String },

    #[error("git {command} failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("spawn git {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected git output: {0}")]
    Parse(String),

    #[error("detached HEAD: check out a branch first")]
    DetachedHead,
}

pub type GitResult<T> = Result<T, GitError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Keep the changes of the dropped commits staged.
    Soft,
    /// Discard them.
    Hard,
}

/// A multi-step git operation waiting for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InProgress {
    Merge,
    Rebase,
    Revert,
}

impl fmt::Display for InProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InProgress::Merge => "merge",
            InProgress::Rebase => "rebase",
            InProgress::Revert => "revert",
        })
    }
}

/// Repository capability used by opcodes and command builders.
pub trait Runner {
    // Queries
    fn current_branch(&self) -> GitResult<String>;
    /// The branch checked out before the current one (`@{-1}`).
    fn previously_checked_out_branch(&self) -> GitResult<Option<String>>;
    fn branches_snapshot(&self) -> GitResult<BranchesSnapshot>;
    fn branch_exists(&self, branch: &str) -> GitResult<bool>;
    /// Commits on `branch` that are not on `parent`, oldest first. Without a
    /// parent, every commit reachable from `branch`.
    fn commits_in_branch(&self, branch: &str, parent: Option<&str>) -> GitResult<Vec<Commit>>;
    /// True if `sha` is reachable from `branch`.
    fn branch_contains(&self, branch: &str, sha: &str) -> GitResult<bool>;
    fn merge_base(&self, a: &str, b: &str) -> GitResult<String>;
    fn has_open_changes(&self) -> GitResult<bool>;
    fn has_unresolved_conflicts(&self) -> GitResult<bool>;
    fn operation_in_progress(&self) -> GitResult<Option<InProgress>>;
    fn stash_size(&self) -> GitResult<usize>;
    fn remotes(&self) -> GitResult<Vec<String>>;
    fn remote_url(&self, remote: &str) -> GitResult<Option<String>>;

    // Local mutations
    fn checkout(&self, branch: &str) -> GitResult<()>;
    fn create_branch(&self, branch: &str, start: &str) -> GitResult<()>;
    fn delete_local_branch(&self, branch: &str) -> GitResult<()>;
    fn reset_current_branch_to(&self, target: &str, mode: ResetMode) -> GitResult<()>;
    /// Move a branch that is not checked out.
    fn reset_branch_to(&self, branch: &str, sha: &str) -> GitResult<()>;
    /// Stage everything and commit. Returns false if there was nothing to commit.
    fn commit_all(&self, message: &str) -> GitResult<bool>;
    fn conclude_merge(&self) -> GitResult<()>;
    fn merge(&self, refname: &str) -> GitResult<()>;
    fn abort_merge(&self) -> GitResult<()>;
    fn squash_merge(&self, branch: &str) -> GitResult<()>;
    fn rebase(&self, onto: &str) -> GitResult<()>;
    fn continue_rebase(&self) -> GitResult<()>;
    fn abort_rebase(&self) -> GitResult<()>;
    fn revert_commit(&self, sha: &str) -> GitResult<()>;
    fn continue_revert(&self) -> GitResult<()>;
    fn abort_revert(&self) -> GitResult<()>;
    fn stash(&self) -> GitResult<()>;
    fn pop_stash(&self) -> GitResult<()>;
    fn discard_open_changes(&self) -> GitResult<()>;

    // Remote mutations
    fn fetch(&self) -> GitResult<()>;
    fn push_current_branch(&self) -> GitResult<()>;
    fn force_push_current_branch(&self) -> GitResult<()>;
    fn create_tracking_branch(&self, branch: &str) -> GitResult<()>;
    fn delete_tracking_branch(&self, branch: &str) -> GitResult<()>;
    fn push_sha_to_remote(&self, branch: &str, sha: &str) -> GitResult<()>;
}

/// Runs `git` in the top-level directory of a repository.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    dry_run: bool,
    echo_commands: bool,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            dry_run: false,
            echo_commands: false,
        }
    }

    /// Open the repository containing `dir`, rooted at its top-level directory.
    #[instrument(skip_all)]
    pub fn open(dir: &Path) -> GitResult<Self> {
        let probe = Git::new(dir);
        let toplevel = probe.run_capture(&["rev-parse", "--show-toplevel"])?;
        let toplevel = toplevel.trim();
        if toplevel.is_empty() {
            return Err(GitError::Parse(format!(
                "{} is not inside a work tree",
                dir.display()
            )));
        }
        debug!(toplevel, "opened repository");
        Ok(Git::new(toplevel))
    }

    /// Skip mutating commands (they are still echoed).
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Print every mutating command to stdout before running it.
    pub fn with_command_echo(mut self, echo: bool) -> Self {
        self.echo_commands = echo;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// The directory shared by all worktrees (`.git` for plain clones).
    pub fn git_common_dir(&self) -> GitResult<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--git-common-dir"])?;
        let dir = PathBuf::from(out.trim());
        Ok(if dir.is_absolute() {
            dir
        } else {
            self.workdir.join(dir)
        })
    }

    fn git_path_exists(&self, name: &str) -> GitResult<bool> {
        let out = self.run_capture(&["rev-parse", "--git-path", name])?;
        let path = PathBuf::from(out.trim());
        let path = if path.is_absolute() {
            path
        } else {
            self.workdir.join(path)
        };
        Ok(path.exists())
    }

    fn has_remote_branch(&self, branch: &str) -> GitResult<bool> {
        self.ref_exists(&format!("refs/remotes/{ORIGIN}/{branch}"))
    }

    fn ref_exists(&self, refname: &str) -> GitResult<bool> {
        let output = self.run(&["show-ref", "--verify", "--quiet", refname])?;
        Ok(output.status.success())
    }

    /// Run a command that changes the repository.
    fn mutate(&self, args: &[&str]) -> GitResult<()> {
        self.echo(args);
        if self.dry_run {
            return Ok(());
        }
        self.run_checked(args)?;
        Ok(())
    }

    /// Run a command that may stop with conflicts.
    fn mutate_or_conflict(&self, operation: &str, args: &[&str]) -> GitResult<()> {
        self.echo(args);
        if self.dry_run {
            return Ok(());
        }
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(());
        }
        if self.has_unresolved_conflicts()? || self.operation_in_progress()?.is_some() {
            warn!(operation, "git stopped with conflicts");
            return Err(GitError::Conflict {
                operation: operation.to_string(),
            });
        }
        Err(failed(args, &output))
    }

    fn echo(&self, args: &[&str]) {
        if self.echo_commands {
            println!("git {}", args.join(" "));
        }
    }

    fn run_capture(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> GitResult<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(failed(args, &output));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> GitResult<Output> {
        debug!(command = %args.join(" "), "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|source| GitError::Spawn {
                command: args.join(" "),
                source,
            })
    }
}

fn failed(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    GitError::Failed {
        command: args.join(" "),
        stderr: detail,
    }
}

impl Runner for Git {
    #[instrument(skip_all)]
    fn current_branch(&self) -> GitResult<String> {
        let output = self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if !output.status.success() {
            warn!("detached HEAD detected");
            return Err(GitError::DetachedHead);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    fn previously_checked_out_branch(&self) -> GitResult<Option<String>> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", "--abbrev-ref", "@{-1}"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() || name == "HEAD" || !self.branch_exists(&name)? {
            return Ok(None);
        }
        Ok(Some(name))
    }

    #[instrument(skip_all)]
    fn branches_snapshot(&self) -> GitResult<BranchesSnapshot> {
        let out = self.run_capture(&[
            "for-each-ref",
            "--format=%(refname)%09%(objectname)%09%(upstream)%09%(upstream:track,nobracket)",
            "refs/heads",
            "refs/remotes",
        ])?;
        let active = match self.current_branch() {
            Ok(branch) => Some(branch),
            Err(GitError::DetachedHead) => None,
            Err(err) => return Err(err),
        };
        let snapshot = parse_snapshot(&out, active)?;
        debug!(branches = snapshot.branches.len(), "captured branches snapshot");
        Ok(snapshot)
    }

    fn branch_exists(&self, branch: &str) -> GitResult<bool> {
        self.ref_exists(&format!("refs/heads/{branch}"))
    }

    fn commits_in_branch(&self, branch: &str, parent: Option<&str>) -> GitResult<Vec<Commit>> {
        let range = match parent {
            Some(parent) => format!("{parent}..{branch}"),
            None => branch.to_string(),
        };
        let out = self.run_capture(&[
            "log",
            "--reverse",
            "--topo-order",
            "--format=%H%x1f%B%x1e",
            &range,
            "--",
        ])?;
        parse_commits(&out)
    }

    fn branch_contains(&self, branch: &str, sha: &str) -> GitResult<bool> {
        let output = self.run(&["merge-base", "--is-ancestor", sha, branch])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(failed(&["merge-base", "--is-ancestor", sha, branch], &output)),
        }
    }

    fn merge_base(&self, a: &str, b: &str) -> GitResult<String> {
        let out = self.run_capture(&["merge-base", a, b])?;
        Ok(out.trim().to_string())
    }

    fn has_open_changes(&self) -> GitResult<bool> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        Ok(out.lines().any(|line| !line.trim().is_empty()))
    }

    fn has_unresolved_conflicts(&self) -> GitResult<bool> {
        let out = self.run_capture(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(!out.trim().is_empty())
    }

    fn operation_in_progress(&self) -> GitResult<Option<InProgress>> {
        if self.git_path_exists("rebase-merge")? || self.git_path_exists("rebase-apply")? {
            return Ok(Some(InProgress::Rebase));
        }
        if self.git_path_exists("MERGE_HEAD")? {
            return Ok(Some(InProgress::Merge));
        }
        if self.git_path_exists("REVERT_HEAD")? {
            return Ok(Some(InProgress::Revert));
        }
        Ok(None)
    }

    fn stash_size(&self) -> GitResult<usize> {
        let out = self.run_capture(&["stash", "list"])?;
        Ok(out.lines().filter(|line| !line.trim().is_empty()).count())
    }

    fn remotes(&self) -> GitResult<Vec<String>> {
        let out = self.run_capture(&["remote"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn remote_url(&self, remote: &str) -> GitResult<Option<String>> {
        let output = self.run(&["remote", "get-url", remote])?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    #[instrument(skip(self))]
    fn checkout(&self, branch: &str) -> GitResult<()> {
        self.mutate(&["checkout", branch])
    }

    fn create_branch(&self, branch: &str, start: &str) -> GitResult<()> {
        self.mutate(&["branch", branch, start])
    }

    fn delete_local_branch(&self, branch: &str) -> GitResult<()> {
        self.mutate(&["branch", "-D", branch])
    }

    #[instrument(skip(self))]
    fn reset_current_branch_to(&self, target: &str, mode: ResetMode) -> GitResult<()> {
        let flag = match mode {
            ResetMode::Soft => "--soft",
            ResetMode::Hard => "--hard",
        };
        self.mutate(&["reset", flag, target])
    }

    fn reset_branch_to(&self, branch: &str, sha: &str) -> GitResult<()> {
        self.mutate(&["branch", "-f", branch, sha])
    }

    #[instrument(skip_all)]
    fn commit_all(&self, message: &str) -> GitResult<bool> {
        self.mutate(&["add", "-A"])?;
        if !self.dry_run {
            let staged = self.run_capture(&["diff", "--cached", "--name-only"])?;
            if staged.trim().is_empty() {
                debug!("no staged changes, skipping commit");
                return Ok(false);
            }
        }
        self.mutate(&["commit", "-m", message])?;
        Ok(true)
    }

    fn conclude_merge(&self) -> GitResult<()> {
        self.mutate(&["commit", "--no-edit"])
    }

    fn merge(&self, refname: &str) -> GitResult<()> {
        self.mutate_or_conflict("merge", &["merge", "--no-edit", refname])
    }

    fn abort_merge(&self) -> GitResult<()> {
        self.mutate(&["merge", "--abort"])
    }

    fn squash_merge(&self, branch: &str) -> GitResult<()> {
        self.mutate_or_conflict("squash merge", &["merge", "--squash", branch])
    }

    fn rebase(&self, onto: &str) -> GitResult<()> {
        self.mutate_or_conflict("rebase", &["rebase", onto])
    }

    fn continue_rebase(&self) -> GitResult<()> {
        self.mutate_or_conflict(
            "rebase",
            &["-c", "core.editor=true", "rebase", "--continue"],
        )
    }

    fn abort_rebase(&self) -> GitResult<()> {
        self.mutate(&["rebase", "--abort"])
    }

    fn revert_commit(&self, sha: &str) -> GitResult<()> {
        self.mutate_or_conflict("revert", &["revert", "--no-edit", sha])
    }

    fn continue_revert(&self) -> GitResult<()> {
        self.mutate_or_conflict(
            "revert",
            &["-c", "core.editor=true", "revert", "--continue"],
        )
    }

    fn abort_revert(&self) -> GitResult<()> {
        self.mutate(&["revert", "--abort"])
    }

    fn stash(&self) -> GitResult<()> {
        self.mutate(&["stash", "push", "--include-untracked"])
    }

    fn pop_stash(&self) -> GitResult<()> {
        self.mutate_or_conflict("stash pop", &["stash", "pop"])
    }

    fn discard_open_changes(&self) -> GitResult<()> {
        self.mutate(&["reset", "--hard"])
    }

    #[instrument(skip_all)]
    fn fetch(&self) -> GitResult<()> {
        self.mutate(&["fetch", "--prune", "--tags"])
    }

    fn push_current_branch(&self) -> GitResult<()> {
        self.mutate(&["push"])
    }

    fn force_push_current_branch(&self) -> GitResult<()> {
        self.mutate(&["push", "--force-with-lease"])
    }

    fn create_tracking_branch(&self, branch: &str) -> GitResult<()> {
        self.mutate(&["push", "-u", ORIGIN, branch])
    }

    fn delete_tracking_branch(&self, branch: &str) -> GitResult<()> {
        if !self.dry_run && !self.has_remote_branch(branch)? {
            debug!(branch, "tracking branch already gone");
            return Ok(());
        }
        self.mutate(&["push", ORIGIN, &format!(":{branch}")])
    }

    fn push_sha_to_remote(&self, branch: &str, sha: &str) -> GitResult<()> {
        self.mutate(&[
            "push",
            "--force-with-lease",
            ORIGIN,
            &format!("{sha}:refs/heads/{branch}"),
        ])
    }
}

/// Parse `for-each-ref` output over `refs/heads` and `refs/remotes`.
///
/// Each line is `refname TAB sha TAB upstream TAB track`. Local branches
/// without a configured upstream still count as tracked when
/// `origin/<branch>` exists.
fn parse_snapshot(output: &str, active: Option<String>) -> GitResult<BranchesSnapshot> {
    struct LocalRef<'a> {
        name: &'a str,
        sha: &'a str,
        upstream: &'a str,
        track: &'a str,
    }

    let mut locals = Vec::new();
    let mut remotes = BTreeMap::new();
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        let mut fields = line.split('\t');
        let (Some(refname), Some(sha)) = (fields.next(), fields.next()) else {
            return Err(GitError::Parse(format!("for-each-ref line: '{line}'")));
        };
        let upstream = fields.next().unwrap_or("");
        let track = fields.next().unwrap_or("");
        if let Some(name) = refname.strip_prefix("refs/heads/") {
            locals.push(LocalRef {
                name,
                sha,
                upstream,
                track,
            });
        } else if let Some(name) = refname.strip_prefix("refs/remotes/") {
            if !name.ends_with("/HEAD") {
                remotes.insert(name, sha);
            }
        }
    }

    let mut branches = Vec::with_capacity(locals.len());
    for local in locals {
        let default_remote = format!("{ORIGIN}/{}", local.name);
        let remote_name = match local.upstream.strip_prefix("refs/remotes/") {
            Some(name) => Some(name.to_string()),
            None if remotes.contains_key(default_remote.as_str()) => Some(default_remote),
            None => None,
        };
        let remote_sha = remote_name
            .as_deref()
            .and_then(|name| remotes.get(name))
            .map(|sha| sha.to_string());
        let sync_status = match (&remote_name, &remote_sha) {
            (None, _) => SyncStatus::LocalOnly,
            (Some(_), None) => SyncStatus::DeletedAtRemote,
            _ if local.track == "gone" => SyncStatus::DeletedAtRemote,
            (Some(_), Some(remote)) if remote == local.sha => SyncStatus::UpToDate,
            (Some(_), Some(_)) => SyncStatus::NotInSync,
        };
        branches.push(BranchInfo {
            local_name: local.name.to_string(),
            local_sha: local.sha.to_string(),
            sync_status,
            remote_name,
            remote_sha,
        });
    }
    branches.sort_by(|a, b| a.local_name.cmp(&b.local_name));
    Ok(BranchesSnapshot { active, branches })
}

/// Parse `log --format=%H%x1f%B%x1e` output.
fn parse_commits(output: &str) -> GitResult<Vec<Commit>> {
    let mut commits = Vec::new();
    for record in output.split('\u{1e}') {
        let record = record.trim_start_matches('\n');
        if record.trim().is_empty() {
            continue;
        }
        let Some((sha, message)) = record.split_once('\u{1f}') else {
            return Err(GitError::Parse(format!("log record: '{record}'")));
        };
        commits.push(Commit {
            sha: sha.trim().to_string(),
            message: message.trim_end().to_string(),
        });
    }
    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snapshot_with_tracking_states() {
        let output = "\
refs/heads/feature\taaa\trefs/remotes/origin/feature\tahead 1
refs/heads/gone\tbbb\trefs/remotes/origin/gone\tgone
refs/heads/local\tccc\t\t
refs/heads/main\tddd\trefs/remotes/origin/main\t
refs/heads/untracked-but-pushed\teee\t\t
refs/remotes/origin/HEAD\tddd\t\t
refs/remotes/origin/feature\t999\t\t
refs/remotes/origin/main\tddd\t\t
refs/remotes/origin/untracked-but-pushed\teee\t\t
";
        let snapshot = parse_snapshot(output, Some("feature".to_string())).expect("parse");
        assert_eq!(snapshot.active.as_deref(), Some("feature"));
        let status = |name: &str| snapshot.find(name).expect(name).sync_status;
        assert_eq!(status("feature"), SyncStatus::NotInSync);
        assert_eq!(status("gone"), SyncStatus::DeletedAtRemote);
        assert_eq!(status("local"), SyncStatus::LocalOnly);
        assert_eq!(status("main"), SyncStatus::UpToDate);
        assert_eq!(status("untracked-but-pushed"), SyncStatus::UpToDate);

        let feature = snapshot.find("feature").expect("feature");
        assert_eq!(feature.remote_name.as_deref(), Some("origin/feature"));
        assert_eq!(feature.remote_sha.as_deref(), Some("999"));
        assert!(snapshot.find("gone").expect("gone").remote_sha.is_none());
    }

    #[test]
    fn parses_multi_line_commit_messages() {
        let output = "aaa\u{1f}first\n\nbody\n\u{1e}\nbbb\u{1f}second\n\u{1e}\n";
        let commits = parse_commits(output).expect("parse");
        assert_eq!(
            commits,
            vec![
                Commit {
                    sha: "aaa".to_string(),
                    message: "first\n\nbody".to_string(),
                },
                Commit {
                    sha: "bbb".to_string(),
                    message: "second".to_string(),
                },
            ]
        );
    }

    #[test]
    fn empty_log_has_no_commits() {
        assert!(parse_commits("").expect("parse").is_empty());
        assert!(parse_commits("\n").expect("parse").is_empty());
    }

    #[test]
    fn rejects_malformed_snapshot_lines() {
        assert!(parse_snapshot("refs/heads/only-a-name", None).is_err());
    }
}
