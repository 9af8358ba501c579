//! The closed set of atomic operations a program is made of.
//!
//! Every opcode knows how to run itself against a [`Runner`] (and optionally a
//! hosting [`Connector`]) and may describe follow-up programs:
//!
//! - `abort_steps`: compensate this step's completed effect when a later step
//!   fails fatally in the same run.
//! - `undo_steps`: reverse this step's effect when the whole run is undone.
//! - `continue_steps`: conclude this step after the user resolved its conflict.
//! - `cancel_steps`: back out of this step after it stopped on a conflict.
//!
//! All four default to empty.

use std::fmt;
use std::path::Path;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::branch_type::BranchType;
use crate::core::remote::ORIGIN;
use crate::error::{StepError, ValidationError};
use crate::hosting::Connector;
use crate::io::config::{Config, ConfigSnapshot, write_config};
use crate::io::git::{GitError, InProgress, ResetMode, Runner};

use super::program::Program;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Opcode {
    Checkout {
        branch: String,
    },
    CreateBranch {
        branch: String,
        start: String,
    },
    DeleteLocalBranch {
        branch: String,
    },
    CreateTrackingBranch {
        branch: String,
    },
    DeleteTrackingBranch {
        branch: String,
    },
    Fetch,
    /// Merge the lineage parent of `branch` into the current branch.
    MergeParent {
        branch: String,
    },
    MergeTrackingBranch {
        branch: String,
    },
    /// Rebase the current branch onto the lineage parent of `branch`.
    RebaseParent {
        branch: String,
    },
    RebaseTrackingBranch {
        branch: String,
    },
    ConcludeMerge,
    AbortMerge,
    ContinueRebase,
    AbortRebase,
    SquashMerge {
        branch: String,
    },
    /// Soft reset onto `parent`, keeping the changes staged.
    ///
    /// `parent_sha` is the parent's tip when the program was built. A branch
    /// that contained it lands on the parent's current tip, which may have
    /// been rewritten earlier in the same run. Otherwise the branch lands on
    /// its fork point with that old tip.
    ResetCurrentBranchToParent {
        parent: String,
        parent_sha: String,
    },
    ResetCurrentBranchToSha {
        sha: String,
    },
    ResetBranchToSha {
        branch: String,
        sha: String,
    },
    CommitSquashedChanges {
        message: String,
    },
    PushCurrentBranch,
    ForcePushCurrentBranch,
    PushShaToRemote {
        branch: String,
        sha: String,
    },
    RevertCommit {
        sha: String,
    },
    ContinueRevert,
    AbortRevert,
    DiscardOpenChanges,
    StashOpenChanges,
    RestoreOpenChanges,
    /// Leave the user on `initial` with `previous` as the `@{-1}` branch.
    RestoreCheckout {
        initial: String,
        previous: Option<String>,
    },
    SetParent {
        branch: String,
        parent: String,
    },
    RemoveFromLineage {
        branch: String,
    },
    SetBranchRole {
        branch: String,
        role: BranchType,
    },
    RestoreConfig {
        snapshot: ConfigSnapshot,
    },
    UpdateProposalTarget {
        number: u64,
        target: String,
        previous: String,
    },
    SquashMergeProposal {
        number: u64,
        message: String,
    },
    /// Closes the block of steps that belong to one branch.
    EndOfBranchProgram,
}

/// Everything an opcode may touch while running.
pub struct RunArgs<'a> {
    pub runner: &'a dyn Runner,
    pub connector: Option<&'a dyn Connector>,
    pub config: &'a mut Config,
    /// Where config changes are persisted; `None` keeps them in memory.
    pub config_path: Option<&'a Path>,
    pub dry_run: bool,
    /// Opcodes to run before the rest of the program.
    pub prepended: Program,
}

impl RunArgs<'_> {
    /// Run these opcodes next, in order.
    pub fn prepend(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.prepended.add_all(opcodes);
    }

    /// Apply `change` to the configuration and persist it (skipped in dry runs).
    pub fn update_config<F>(&mut self, change: F) -> Result<(), StepError>
    where
        F: FnOnce(&mut Config) -> Result<(), StepError>,
    {
        change(self.config)?;
        if !self.dry_run
            && let Some(path) = self.config_path
        {
            write_config(path, self.config)?;
        }
        Ok(())
    }

    fn connector(&self) -> Result<&dyn Connector, StepError> {
        self.connector
            .ok_or_else(|| StepError::Fatal(anyhow!("no hosting connector for this repository")))
    }
}

impl Opcode {
    pub fn run(&self, args: &mut RunArgs<'_>) -> Result<(), StepError> {
        debug!(opcode = %self, "running opcode");
        let runner = args.runner;
        match self {
            Opcode::Checkout { branch } => {
                if checked_out_branch(runner)?.as_deref() != Some(branch.as_str()) {
                    runner.checkout(branch)?;
                }
            }
            Opcode::CreateBranch { branch, start } => runner.create_branch(branch, start)?,
            Opcode::DeleteLocalBranch { branch } => runner.delete_local_branch(branch)?,
            Opcode::CreateTrackingBranch { branch } => runner.create_tracking_branch(branch)?,
            Opcode::DeleteTrackingBranch { branch } => runner.delete_tracking_branch(branch)?,
            Opcode::Fetch => runner.fetch()?,
            Opcode::MergeParent { branch } => {
                if let Some(parent) = existing_parent(args, branch, self)? {
                    runner.merge(&parent)?;
                }
            }
            Opcode::MergeTrackingBranch { branch } => {
                runner.merge(&format!("{ORIGIN}/{branch}"))?;
            }
            Opcode::RebaseParent { branch } => {
                if let Some(parent) = existing_parent(args, branch, self)? {
                    runner.rebase(&parent)?;
                }
            }
            Opcode::RebaseTrackingBranch { branch } => {
                runner.rebase(&format!("{ORIGIN}/{branch}"))?;
            }
            Opcode::ConcludeMerge => {
                if runner.operation_in_progress()? == Some(InProgress::Merge) {
                    runner.conclude_merge()?;
                }
            }
            Opcode::AbortMerge => {
                if runner.operation_in_progress()? == Some(InProgress::Merge) {
                    runner.abort_merge()?;
                }
            }
            Opcode::ContinueRebase => {
                if runner.operation_in_progress()? == Some(InProgress::Rebase) {
                    runner.continue_rebase()?;
                }
            }
            Opcode::AbortRebase => {
                if runner.operation_in_progress()? == Some(InProgress::Rebase) {
                    runner.abort_rebase()?;
                }
            }
            Opcode::SquashMerge { branch } => runner.squash_merge(branch)?,
            Opcode::ResetCurrentBranchToParent { parent, parent_sha } => {
                let current = runner.current_branch()?;
                let target = if runner.branch_contains(&current, parent_sha)? {
                    parent.clone()
                } else {
                    runner.merge_base(&current, parent_sha)?
                };
                runner.reset_current_branch_to(&target, ResetMode::Soft)?;
            }
            Opcode::ResetCurrentBranchToSha { sha } => {
                runner.reset_current_branch_to(sha, ResetMode::Hard)?;
            }
            Opcode::ResetBranchToSha { branch, sha } => runner.reset_branch_to(branch, sha)?,
            Opcode::CommitSquashedChanges { message } => {
                if !runner.commit_all(message)? {
                    info!("nothing to commit after squashing");
                }
            }
            Opcode::PushCurrentBranch => runner.push_current_branch()?,
            Opcode::ForcePushCurrentBranch => runner.force_push_current_branch()?,
            Opcode::PushShaToRemote { branch, sha } => runner.push_sha_to_remote(branch, sha)?,
            Opcode::RevertCommit { sha } => {
                ensure_current_branch_contains(args, sha)?;
                runner.revert_commit(sha)?;
            }
            Opcode::ContinueRevert => {
                if runner.operation_in_progress()? == Some(InProgress::Revert) {
                    runner.continue_revert()?;
                }
            }
            Opcode::AbortRevert => {
                if runner.operation_in_progress()? == Some(InProgress::Revert) {
                    runner.abort_revert()?;
                }
            }
            Opcode::DiscardOpenChanges => runner.discard_open_changes()?,
            Opcode::StashOpenChanges => runner.stash()?,
            Opcode::RestoreOpenChanges => runner.pop_stash()?,
            Opcode::RestoreCheckout { initial, previous } => {
                restore_checkout(runner, initial, previous.as_deref())?;
            }
            Opcode::SetParent { branch, parent } => {
                args.update_config(|config| {
                    config.lineage.set_parent(branch, parent)?;
                    Ok(())
                })?;
            }
            Opcode::RemoveFromLineage { branch } => {
                args.update_config(|config| {
                    config.lineage.remove(branch);
                    Ok(())
                })?;
            }
            Opcode::SetBranchRole { branch, role } => {
                args.update_config(|config| {
                    config.branches.set_role(branch, *role)?;
                    Ok(())
                })?;
            }
            Opcode::RestoreConfig { snapshot } => {
                args.update_config(|config| {
                    config.restore(snapshot);
                    Ok(())
                })?;
            }
            Opcode::UpdateProposalTarget { number, target, .. } => {
                if !args.dry_run {
                    args.connector()?.update_proposal_target(*number, target)?;
                }
            }
            Opcode::SquashMergeProposal { number, message } => {
                if !args.dry_run {
                    args.connector()?.squash_merge_proposal(*number, message)?;
                }
            }
            Opcode::EndOfBranchProgram => {}
        }
        Ok(())
    }

    pub fn abort_steps(&self) -> Vec<Opcode> {
        match self {
            Opcode::UpdateProposalTarget {
                number,
                target,
                previous,
            } => vec![Opcode::UpdateProposalTarget {
                number: *number,
                target: previous.clone(),
                previous: target.clone(),
            }],
            _ => Vec::new(),
        }
    }

    pub fn undo_steps(&self) -> Vec<Opcode> {
        match self {
            Opcode::UpdateProposalTarget { .. } => self.abort_steps(),
            _ => Vec::new(),
        }
    }

    pub fn continue_steps(&self) -> Vec<Opcode> {
        match self {
            Opcode::MergeParent { .. } | Opcode::MergeTrackingBranch { .. } => {
                vec![Opcode::ConcludeMerge]
            }
            Opcode::RebaseParent { .. } | Opcode::RebaseTrackingBranch { .. } => {
                vec![Opcode::ContinueRebase]
            }
            Opcode::RevertCommit { .. } => vec![Opcode::ContinueRevert],
            _ => Vec::new(),
        }
    }

    pub fn cancel_steps(&self) -> Vec<Opcode> {
        match self {
            Opcode::MergeParent { .. } | Opcode::MergeTrackingBranch { .. } => {
                vec![Opcode::AbortMerge]
            }
            Opcode::RebaseParent { .. } | Opcode::RebaseTrackingBranch { .. } => {
                vec![Opcode::AbortRebase]
            }
            Opcode::RevertCommit { .. } => vec![Opcode::AbortRevert],
            Opcode::SquashMerge { .. } | Opcode::RestoreOpenChanges => {
                vec![Opcode::DiscardOpenChanges]
            }
            _ => Vec::new(),
        }
    }

    /// Talks to the hosting platform rather than git.
    pub fn needs_connector(&self) -> bool {
        matches!(
            self,
            Opcode::UpdateProposalTarget { .. } | Opcode::SquashMergeProposal { .. }
        )
    }

    /// The branch this opcode is about, if any.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Opcode::Checkout { branch }
            | Opcode::CreateBranch { branch, .. }
            | Opcode::DeleteLocalBranch { branch }
            | Opcode::CreateTrackingBranch { branch }
            | Opcode::DeleteTrackingBranch { branch }
            | Opcode::MergeParent { branch }
            | Opcode::MergeTrackingBranch { branch }
            | Opcode::RebaseParent { branch }
            | Opcode::RebaseTrackingBranch { branch }
            | Opcode::SquashMerge { branch }
            | Opcode::ResetBranchToSha { branch, .. }
            | Opcode::PushShaToRemote { branch, .. }
            | Opcode::SetParent { branch, .. }
            | Opcode::RemoveFromLineage { branch }
            | Opcode::SetBranchRole { branch, .. } => Some(branch),
            Opcode::RestoreCheckout { initial, .. } => Some(initial),
            _ => None,
        }
    }
}

/// Parent of `branch` to merge or rebase onto. When the parent branch no
/// longer exists, re-parent to the nearest existing ancestor (or main) and
/// run `opcode` again after that.
fn existing_parent(
    args: &mut RunArgs<'_>,
    branch: &str,
    opcode: &Opcode,
) -> Result<Option<String>, StepError> {
    let Some(parent) = args.config.lineage.parent(branch).map(str::to_string) else {
        return Err(ValidationError::NoParent(branch.to_string()).into());
    };
    if args.runner.branch_exists(&parent)? {
        return Ok(Some(parent));
    }
    let mut replacement = None;
    for ancestor in args.config.lineage.ancestors(&parent).into_iter().rev() {
        if args.runner.branch_exists(&ancestor)? {
            replacement = Some(ancestor);
            break;
        }
    }
    let replacement = replacement.unwrap_or_else(|| args.config.branches.main.clone());
    info!(branch, missing = %parent, new_parent = %replacement, "parent branch is gone, re-parenting");
    args.prepend([
        Opcode::SetParent {
            branch: branch.to_string(),
            parent: replacement,
        },
        opcode.clone(),
    ]);
    Ok(None)
}

fn ensure_current_branch_contains(args: &RunArgs<'_>, sha: &str) -> Result<(), StepError> {
    let runner = args.runner;
    let current = runner.current_branch()?;
    let contained = match args.config.lineage.parent(&current) {
        Some(parent) if runner.branch_exists(parent)? => {
            let commits = runner.commits_in_branch(&current, Some(parent))?;
            if commits.iter().any(|commit| commit.sha == sha) {
                true
            } else {
                let shas: Vec<&str> = commits.iter().map(|commit| commit.sha.as_str()).collect();
                return Err(StepError::Fatal(anyhow!(
                    "branch '{current}' doesn't contain commit {sha}; its own commits are: {}",
                    if shas.is_empty() {
                        "(none)".to_string()
                    } else {
                        shas.join(", ")
                    }
                )));
            }
        }
        _ => runner.branch_contains(&current, sha)?,
    };
    if !contained {
        return Err(StepError::Fatal(anyhow!(
            "branch '{current}' doesn't contain commit {sha}"
        )));
    }
    Ok(())
}

/// The checked-out branch, `None` on a detached HEAD.
fn checked_out_branch(runner: &dyn Runner) -> Result<Option<String>, StepError> {
    match runner.current_branch() {
        Ok(branch) => Ok(Some(branch)),
        Err(GitError::DetachedHead) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn restore_checkout(
    runner: &dyn Runner,
    initial: &str,
    previous: Option<&str>,
) -> Result<(), StepError> {
    if !runner.branch_exists(initial)? {
        debug!(initial, "initial branch is gone, leaving checkout as is");
        return Ok(());
    }
    let current = checked_out_branch(runner)?;
    if let Some(previous) = previous
        && previous != initial
        && runner.branch_exists(previous)?
    {
        if current.as_deref() != Some(previous) {
            runner.checkout(previous)?;
        }
        runner.checkout(initial)?;
        return Ok(());
    }
    if current.as_deref() != Some(initial) {
        runner.checkout(initial)?;
    }
    Ok(())
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Checkout { branch } => write!(f, "checkout {branch}"),
            Opcode::CreateBranch { branch, start } => write!(f, "create branch {branch} at {start}"),
            Opcode::DeleteLocalBranch { branch } => write!(f, "delete local branch {branch}"),
            Opcode::CreateTrackingBranch { branch } => write!(f, "push new branch {branch}"),
            Opcode::DeleteTrackingBranch { branch } => write!(f, "delete {ORIGIN}/{branch}"),
            Opcode::Fetch => f.write_str("fetch"),
            Opcode::MergeParent { branch } => write!(f, "merge parent of {branch}"),
            Opcode::MergeTrackingBranch { branch } => write!(f, "merge {ORIGIN}/{branch}"),
            Opcode::RebaseParent { branch } => write!(f, "rebase {branch} onto its parent"),
            Opcode::RebaseTrackingBranch { branch } => write!(f, "rebase onto {ORIGIN}/{branch}"),
            Opcode::ConcludeMerge => f.write_str("conclude merge"),
            Opcode::AbortMerge => f.write_str("abort merge"),
            Opcode::ContinueRebase => f.write_str("continue rebase"),
            Opcode::AbortRebase => f.write_str("abort rebase"),
            Opcode::SquashMerge { branch } => write!(f, "squash merge {branch}"),
            Opcode::ResetCurrentBranchToParent { parent, .. } => {
                write!(f, "reset current branch onto {parent}")
            }
            Opcode::ResetCurrentBranchToSha { sha } => write!(f, "reset current branch to {sha}"),
            Opcode::ResetBranchToSha { branch, sha } => write!(f, "reset {branch} to {sha}"),
            Opcode::CommitSquashedChanges { message } => {
                let subject = message.lines().next().unwrap_or_default();
                write!(f, "commit squashed changes \"{subject}\"")
            }
            Opcode::PushCurrentBranch => f.write_str("push current branch"),
            Opcode::ForcePushCurrentBranch => f.write_str("force-push current branch"),
            Opcode::PushShaToRemote { branch, sha } => write!(f, "push {sha} to {ORIGIN}/{branch}"),
            Opcode::RevertCommit { sha } => write!(f, "revert {sha}"),
            Opcode::ContinueRevert => f.write_str("continue revert"),
            Opcode::AbortRevert => f.write_str("abort revert"),
            Opcode::DiscardOpenChanges => f.write_str("discard open changes"),
            Opcode::StashOpenChanges => f.write_str("stash open changes"),
            Opcode::RestoreOpenChanges => f.write_str("restore open changes"),
            Opcode::RestoreCheckout { initial, .. } => write!(f, "return to {initial}"),
            Opcode::SetParent { branch, parent } => write!(f, "set parent of {branch} to {parent}"),
            Opcode::RemoveFromLineage { branch } => write!(f, "remove {branch} from lineage"),
            Opcode::SetBranchRole { branch, role } => write!(f, "mark {branch} as {role}"),
            Opcode::RestoreConfig { .. } => f.write_str("restore branch configuration"),
            Opcode::UpdateProposalTarget { number, target, .. } => {
                write!(f, "retarget proposal #{number} to {target}")
            }
            Opcode::SquashMergeProposal { number, .. } => {
                write!(f, "squash merge proposal #{number}")
            }
            Opcode::EndOfBranchProgram => f.write_str("end of branch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRunner, GitCall};

    fn run(opcode: &Opcode, runner: &FakeRunner, config: &mut Config) -> Program {
        let mut args = RunArgs {
            runner,
            connector: None,
            config,
            config_path: None,
            dry_run: false,
            prepended: Program::new(),
        };
        opcode.run(&mut args).expect("run");
        args.prepended
    }

    #[test]
    fn serializes_with_snake_case_tags() {
        let opcode = Opcode::ResetCurrentBranchToParent {
            parent: "main".to_string(),
            parent_sha: "m1".to_string(),
        };
        let json = serde_json::to_string(&opcode).expect("serialize");
        assert_eq!(
            json,
            r#"{"type":"reset_current_branch_to_parent","parent":"main","parent_sha":"m1"}"#
        );
    }

    #[test]
    fn reset_to_parent_lands_on_the_rewritten_parent_tip() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main", "team"]);
        runner.set_commits("feature-x", &[("t2", "team 2"), ("x1", "x 1")]);
        let mut config = Config::default();
        let opcode = Opcode::ResetCurrentBranchToParent {
            parent: "team".to_string(),
            parent_sha: "t2".to_string(),
        };
        run(&opcode, &runner, &mut config);
        assert_eq!(
            runner.calls(),
            vec![GitCall::ResetCurrentBranchTo(
                "team".to_string(),
                ResetMode::Soft
            )]
        );
    }

    #[test]
    fn reset_to_parent_falls_back_to_the_fork_point_when_out_of_sync() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main", "team"]);
        runner.set_commits("feature-x", &[("x1", "x 1")]);
        let mut config = Config::default();
        let opcode = Opcode::ResetCurrentBranchToParent {
            parent: "team".to_string(),
            parent_sha: "t2".to_string(),
        };
        run(&opcode, &runner, &mut config);
        assert_eq!(
            runner.calls(),
            vec![GitCall::ResetCurrentBranchTo(
                "t2".to_string(),
                ResetMode::Soft
            )]
        );
    }

    #[test]
    fn checkout_on_a_detached_head_switches_branches() {
        let runner = FakeRunner::new("feature").with_branches(&["main"]);
        runner.detach_head();
        let mut config = Config::default();
        run(
            &Opcode::Checkout {
                branch: "feature".to_string(),
            },
            &runner,
            &mut config,
        );
        assert_eq!(runner.calls(), vec![GitCall::Checkout("feature".to_string())]);
    }

    #[test]
    fn checkout_surfaces_head_read_failures() {
        let runner = FakeRunner::new("feature").with_branches(&["main"]);
        runner.break_head();
        let mut config = Config::default();
        let mut args = RunArgs {
            runner: &runner,
            connector: None,
            config: &mut config,
            config_path: None,
            dry_run: false,
            prepended: Program::new(),
        };
        let err = Opcode::Checkout {
            branch: "main".to_string(),
        }
        .run(&mut args)
        .expect_err("unreadable HEAD");
        assert!(matches!(err, StepError::Fatal(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn merge_parent_reparents_when_parent_is_gone() {
        let runner = FakeRunner::new("feature-y").with_branches(&["main", "team", "feature-y"]);
        let mut config = Config::default();
        config.lineage.set_parent("team", "main").expect("edge");
        config.lineage.set_parent("feature-x", "team").expect("edge");
        config.lineage.set_parent("feature-y", "feature-x").expect("edge");

        let opcode = Opcode::MergeParent {
            branch: "feature-y".to_string(),
        };
        let prepended = run(&opcode, &runner, &mut config);
        assert_eq!(
            prepended.into_iter().collect::<Vec<_>>(),
            vec![
                Opcode::SetParent {
                    branch: "feature-y".to_string(),
                    parent: "team".to_string(),
                },
                opcode,
            ]
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn merge_parent_merges_existing_parent() {
        let runner = FakeRunner::new("feature").with_branches(&["main", "feature"]);
        let mut config = Config::default();
        config.lineage.set_parent("feature", "main").expect("edge");
        let prepended = run(
            &Opcode::MergeParent {
                branch: "feature".to_string(),
            },
            &runner,
            &mut config,
        );
        assert!(prepended.is_empty());
        assert_eq!(runner.calls(), vec![GitCall::Merge("main".to_string())]);
    }

    #[test]
    fn revert_refuses_commits_outside_the_branch() {
        let runner = FakeRunner::new("feature").with_branches(&["main", "feature"]);
        runner.set_commits("feature", &[("aaa", "one"), ("bbb", "two")]);
        let mut config = Config::default();
        config.lineage.set_parent("feature", "main").expect("edge");
        let mut args = RunArgs {
            runner: &runner,
            connector: None,
            config: &mut config,
            config_path: None,
            dry_run: false,
            prepended: Program::new(),
        };
        let err = Opcode::RevertCommit {
            sha: "zzz".to_string(),
        }
        .run(&mut args)
        .expect_err("not contained");
        let message = err.to_string();
        assert!(message.contains("doesn't contain commit zzz"));
        assert!(message.contains("aaa, bbb"));
    }

    #[test]
    fn set_parent_rejects_cycles() {
        let runner = FakeRunner::new("a");
        let mut config = Config::default();
        config.lineage.set_parent("b", "a").expect("edge");
        let mut args = RunArgs {
            runner: &runner,
            connector: None,
            config: &mut config,
            config_path: None,
            dry_run: false,
            prepended: Program::new(),
        };
        let err = Opcode::SetParent {
            branch: "a".to_string(),
            parent: "b".to_string(),
        }
        .run(&mut args)
        .expect_err("cycle");
        assert!(matches!(err, StepError::Fatal(_)));
    }

    #[test]
    fn hooks_describe_follow_up_programs() {
        let merge = Opcode::MergeTrackingBranch {
            branch: "main".to_string(),
        };
        assert_eq!(merge.continue_steps(), vec![Opcode::ConcludeMerge]);
        assert_eq!(merge.cancel_steps(), vec![Opcode::AbortMerge]);
        assert!(merge.abort_steps().is_empty());
        assert!(merge.undo_steps().is_empty());

        let retarget = Opcode::UpdateProposalTarget {
            number: 4,
            target: "main".to_string(),
            previous: "feature".to_string(),
        };
        assert_eq!(
            retarget.undo_steps(),
            vec![Opcode::UpdateProposalTarget {
                number: 4,
                target: "feature".to_string(),
                previous: "main".to_string(),
            }]
        );
        assert_eq!(retarget.abort_steps(), retarget.undo_steps());
        assert!(Opcode::Fetch.continue_steps().is_empty());
    }
}
