//! `branchwise compress`: squash the commits of a branch, or of every branch
//! in its stack, into a single commit.

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::core::branch_type::BranchType;
use crate::core::message::first_non_empty;
use crate::core::snapshot::BranchesSnapshot;
use crate::error::ValidationError;
use crate::io::config::Config;
use crate::io::git::Runner;
use crate::session::Session;
use crate::vm::{Opcode, Outcome, Program};

#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    /// Compress every branch in the current branch's stack.
    pub stack: bool,
    /// Message for the new commit instead of the first existing one.
    pub message: Option<String>,
}

pub fn compress(session: &mut Session, options: &CompressOptions) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    let online = session.is_online()?;
    let program = compress_program(session.runner(), session.config(), options, online)?;
    session.execute("compress", program, None)
}

/// Build the compress program. Every check runs before anything is mutated.
pub fn compress_program(
    runner: &dyn Runner,
    config: &Config,
    options: &CompressOptions,
    online: bool,
) -> Result<Program> {
    let current = runner.current_branch()?;
    let builder = BlockBuilder {
        runner,
        snapshot: runner.branches_snapshot()?,
        options,
        online,
    };
    let mut program = Program::new();

    if !options.stack {
        config.branches.ensure_owned(&current, "compress")?;
        let parent = parent_of(config, &current)?;
        let messages = commit_messages(runner, &current, parent)?;
        match messages.len() {
            0 => return Err(ValidationError::NoCommits { branch: current }.into()),
            1 => return Err(ValidationError::AlreadyOneCommit { branch: current }.into()),
            _ => {}
        }
        builder.add_branch(&mut program, &current, parent, &messages)?;
        return Ok(program);
    }

    for branch in config.lineage.stack(&current) {
        let branch_type = config.branches.branch_type(&branch);
        match branch_type {
            BranchType::Main | BranchType::Perennial => continue,
            BranchType::Observed | BranchType::Contribution => {
                return Err(ValidationError::RoleNotAllowed {
                    branch,
                    role: branch_type,
                    operation: "compress".to_string(),
                }
                .into());
            }
            BranchType::Feature | BranchType::Parked => {}
        }
        if !builder.snapshot.contains(&branch) {
            debug!(%branch, "not a local branch, skipping");
            continue;
        }
        let parent = parent_of(config, &branch)?;
        let messages = commit_messages(runner, &branch, parent)?;
        if messages.is_empty() {
            debug!(%branch, "no commits, skipping");
            continue;
        }
        builder.add_branch(&mut program, &branch, parent, &messages)?;
    }
    Ok(program)
}

fn parent_of<'a>(config: &'a Config, branch: &str) -> Result<&'a str, ValidationError> {
    config
        .lineage
        .parent(branch)
        .ok_or_else(|| ValidationError::NoParent(branch.to_string()))
}

fn commit_messages(runner: &dyn Runner, branch: &str, parent: &str) -> Result<Vec<String>> {
    Ok(runner
        .commits_in_branch(branch, Some(parent))?
        .into_iter()
        .map(|commit| commit.message)
        .collect())
}

/// Emits the per-branch block of steps.
struct BlockBuilder<'a> {
    runner: &'a dyn Runner,
    snapshot: BranchesSnapshot,
    options: &'a CompressOptions,
    online: bool,
}

impl BlockBuilder<'_> {
    fn add_branch(
        &self,
        program: &mut Program,
        branch: &str,
        parent: &str,
        messages: &[String],
    ) -> Result<()> {
        let message = first_non_empty(
            self.options.message.as_deref(),
            messages.iter().map(String::as_str),
        )
        .ok_or_else(|| anyhow!("no commit message for '{branch}': pass one with --message"))?;
        // Recorded now: an earlier block of a stack run may rewrite the parent.
        let parent_sha = match self.snapshot.find(parent) {
            Some(info) => info.local_sha.clone(),
            None => self.runner.merge_base(branch, parent)?,
        };
        program.add(Opcode::Checkout {
            branch: branch.to_string(),
        });
        program.add(Opcode::ResetCurrentBranchToParent {
            parent: parent.to_string(),
            parent_sha,
        });
        program.add(Opcode::CommitSquashedChanges { message });
        let tracked = self
            .snapshot
            .find(branch)
            .is_some_and(|info| info.has_tracking_branch());
        if tracked && self.online {
            program.add(Opcode::ForcePushCurrentBranch);
        }
        program.add(Opcode::EndOfBranchProgram);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRunner;

    fn feature_config() -> Config {
        let mut config = Config::default();
        config.lineage.set_parent("feature-x", "main").expect("edge");
        config
    }

    fn steps(program: Program) -> Vec<Opcode> {
        program.into_iter().collect()
    }

    fn block(
        runner: &FakeRunner,
        branch: &str,
        parent: &str,
        message: &str,
        push: bool,
    ) -> Vec<Opcode> {
        let mut block = vec![
            Opcode::Checkout {
                branch: branch.to_string(),
            },
            Opcode::ResetCurrentBranchToParent {
                parent: parent.to_string(),
                parent_sha: runner.sha(parent),
            },
            Opcode::CommitSquashedChanges {
                message: message.to_string(),
            },
        ];
        if push {
            block.push(Opcode::ForcePushCurrentBranch);
        }
        block.push(Opcode::EndOfBranchProgram);
        block
    }

    #[test]
    fn tracked_branch_is_squashed_with_its_first_message_and_pushed() {
        let runner = FakeRunner::new("feature-x")
            .with_branches(&["main"])
            .with_tracking(&["feature-x"]);
        runner.set_commits("feature-x", &[("a1", "first"), ("a2", "second"), ("a3", "third")]);
        let program = compress_program(
            &runner,
            &feature_config(),
            &CompressOptions::default(),
            true,
        )
        .expect("program");
        assert_eq!(steps(program), block(&runner, "feature-x", "main", "first", true));
    }

    #[test]
    fn offline_compress_does_not_push() {
        let runner = FakeRunner::new("feature-x")
            .with_branches(&["main"])
            .with_tracking(&["feature-x"]);
        runner.set_commits("feature-x", &[("a1", "first"), ("a2", "second")]);
        let program = compress_program(
            &runner,
            &feature_config(),
            &CompressOptions::default(),
            false,
        )
        .expect("program");
        assert!(!program.iter().any(|step| *step == Opcode::ForcePushCurrentBranch));
    }

    #[test]
    fn explicit_message_is_used_verbatim() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main"]);
        runner.set_commits("feature-x", &[("a1", "first"), ("a2", "second")]);
        let options = CompressOptions {
            stack: false,
            message: Some("Add the widget\n\nLong body".to_string()),
        };
        let program =
            compress_program(&runner, &feature_config(), &options, true).expect("program");
        assert!(program.iter().any(|step| *step
            == Opcode::CommitSquashedChanges {
                message: "Add the widget\n\nLong body".to_string()
            }));
    }

    #[test]
    fn empty_leading_messages_are_skipped() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main"]);
        runner.set_commits("feature-x", &[("a1", "  "), ("a2", "second")]);
        let program = compress_program(
            &runner,
            &feature_config(),
            &CompressOptions::default(),
            true,
        )
        .expect("program");
        assert!(program.iter().any(|step| *step
            == Opcode::CommitSquashedChanges {
                message: "second".to_string()
            }));
    }

    #[test]
    fn branch_without_commits_is_rejected() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main"]);
        let err = compress_program(
            &runner,
            &feature_config(),
            &CompressOptions::default(),
            true,
        )
        .expect_err("no commits");
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::NoCommits { .. })
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn branch_with_one_commit_is_rejected() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main"]);
        runner.set_commits("feature-x", &[("a1", "only")]);
        let err = compress_program(
            &runner,
            &feature_config(),
            &CompressOptions::default(),
            true,
        )
        .expect_err("one commit");
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::AlreadyOneCommit { .. })
        ));
    }

    #[test]
    fn perennial_branches_cannot_be_compressed() {
        let runner = FakeRunner::new("main");
        runner.set_commits("main", &[("a1", "one"), ("a2", "two")]);
        let err = compress_program(
            &runner,
            &Config::default(),
            &CompressOptions::default(),
            true,
        )
        .expect_err("perennial");
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::Perennial { .. })
        ));
    }

    #[test]
    fn parked_branches_can_be_compressed() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main"]);
        runner.set_commits("feature-x", &[("a1", "one"), ("a2", "two")]);
        let mut config = feature_config();
        config
            .branches
            .set_role("feature-x", BranchType::Parked)
            .expect("role");
        compress_program(&runner, &config, &CompressOptions::default(), true).expect("program");
    }

    #[test]
    fn observed_branches_are_rejected_by_name_and_role() {
        let runner = FakeRunner::new("feature-x").with_branches(&["main"]);
        runner.set_commits("feature-x", &[("a1", "one"), ("a2", "two")]);
        let mut config = feature_config();
        config
            .branches
            .set_role("feature-x", BranchType::Observed)
            .expect("role");
        let err = compress_program(&runner, &config, &CompressOptions::default(), true)
            .expect_err("observed");
        assert_eq!(err.to_string(), "cannot compress observed branch 'feature-x'");
    }

    #[test]
    fn stack_compresses_every_feature_branch_root_to_leaf() {
        let runner = FakeRunner::new("feature-y")
            .with_branches(&["main", "team", "feature-x"])
            .with_tracking(&["main", "team", "feature-x", "feature-y"]);
        runner.set_commits("team", &[("t1", "team 1"), ("t2", "team 2")]);
        runner.set_commits("feature-x", &[("x1", "x 1"), ("x2", "x 2")]);
        runner.set_commits("feature-y", &[("y1", "y 1"), ("y2", "y 2")]);
        let mut config = Config::default();
        config.lineage.set_parent("team", "main").expect("edge");
        config.lineage.set_parent("feature-x", "team").expect("edge");
        config.lineage.set_parent("feature-y", "feature-x").expect("edge");

        let options = CompressOptions {
            stack: true,
            message: None,
        };
        let program = compress_program(&runner, &config, &options, true).expect("program");
        let expected: Vec<Opcode> = [
            block(&runner, "team", "main", "team 1", true),
            block(&runner, "feature-x", "team", "x 1", true),
            block(&runner, "feature-y", "feature-x", "y 1", true),
        ]
        .concat();
        assert_eq!(steps(program), expected);
    }

    #[test]
    fn stack_skips_branches_without_commits() {
        let runner = FakeRunner::new("feature-y").with_branches(&["main", "feature-x"]);
        runner.set_commits("feature-y", &[("y1", "y 1"), ("y2", "y 2")]);
        let mut config = Config::default();
        config.lineage.set_parent("feature-x", "main").expect("edge");
        config.lineage.set_parent("feature-y", "feature-x").expect("edge");
        let options = CompressOptions {
            stack: true,
            message: None,
        };
        let program = compress_program(&runner, &config, &options, true).expect("program");
        assert_eq!(steps(program), block(&runner, "feature-y", "feature-x", "y 1", false));
    }
}
