//! `branchwise sync`: bring branches up to date with their tracking branch
//! and their lineage parent.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::branch_type::BranchType;
use crate::core::snapshot::{BranchInfo, SyncStatus};
use crate::io::config::{Config, SyncStrategy};
use crate::io::git::Runner;
use crate::session::Session;
use crate::vm::{Opcode, Outcome, Program};

/// Which branches a sync covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncScope {
    /// The current branch and its ancestors.
    #[default]
    Current,
    /// Every branch in the current branch's stack.
    Stack,
    /// Every local branch known to the lineage, plus main and perennials.
    All,
}

pub fn sync(session: &mut Session, scope: SyncScope) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    session.fetch()?;
    let online = session.is_online()?;
    let program = sync_program(session.runner(), session.config(), scope, online)?;
    session.execute("sync", program, None)
}

pub fn sync_program(
    runner: &dyn Runner,
    config: &Config,
    scope: SyncScope,
    online: bool,
) -> Result<Program> {
    let current = runner.current_branch()?;
    let snapshot = runner.branches_snapshot()?;
    let lineage = &config.lineage;
    let mut branches: Vec<String> = match scope {
        SyncScope::Current => {
            let mut chain = lineage.ancestors(&current);
            chain.push(current.clone());
            chain
        }
        SyncScope::Stack => lineage.stack(&current),
        SyncScope::All => {
            let mut all = vec![config.branches.main.clone()];
            all.extend(
                snapshot
                    .names()
                    .filter(|name| config.branches.branch_type(name) == BranchType::Perennial)
                    .map(str::to_string),
            );
            all.extend(lineage.ordered_branches());
            all
        }
    };
    dedup_keep_first(&mut branches);

    let mut program = Program::new();
    for branch in &branches {
        let Some(info) = snapshot.find(branch) else {
            debug!(%branch, "not a local branch, skipping");
            continue;
        };
        add_branch(&mut program, runner, config, info, online)?;
    }
    Ok(program)
}

fn dedup_keep_first(branches: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    branches.retain(|branch| seen.insert(branch.clone()));
}

fn add_branch(
    program: &mut Program,
    runner: &dyn Runner,
    config: &Config,
    info: &BranchInfo,
    online: bool,
) -> Result<()> {
    let branch = info.local_name.as_str();
    let tracked = online && info.has_tracking_branch();
    let branch_type = config.branches.branch_type(branch);

    if branch_type.is_owned() && info.sync_status == SyncStatus::DeletedAtRemote {
        return add_shipped_branch(program, runner, config, branch);
    }

    program.add(Opcode::Checkout {
        branch: branch.to_string(),
    });
    match branch_type {
        BranchType::Main | BranchType::Perennial | BranchType::Observed => {
            if tracked {
                program.add(Opcode::RebaseTrackingBranch {
                    branch: branch.to_string(),
                });
            }
        }
        BranchType::Contribution => {
            if tracked {
                program.add(Opcode::RebaseTrackingBranch {
                    branch: branch.to_string(),
                });
                program.add(Opcode::PushCurrentBranch);
            }
        }
        BranchType::Feature | BranchType::Parked => {
            if tracked {
                program.add(Opcode::MergeTrackingBranch {
                    branch: branch.to_string(),
                });
            }
            let has_parent = config.lineage.has_parent(branch);
            let strategy = config.sync_feature_strategy;
            if has_parent {
                program.add(match strategy {
                    SyncStrategy::Merge => Opcode::MergeParent {
                        branch: branch.to_string(),
                    },
                    SyncStrategy::Rebase => Opcode::RebaseParent {
                        branch: branch.to_string(),
                    },
                });
            }
            if tracked {
                program.add(match strategy {
                    SyncStrategy::Rebase if has_parent => Opcode::ForcePushCurrentBranch,
                    _ => Opcode::PushCurrentBranch,
                });
            } else if online && config.push_new_branches && info.remote_name.is_none() {
                program.add(Opcode::CreateTrackingBranch {
                    branch: branch.to_string(),
                });
            }
        }
    }
    program.add(Opcode::EndOfBranchProgram);
    Ok(())
}

/// A feature branch whose tracking branch was deleted, typically because it
/// was shipped through the hosting platform. If it has nothing left on top of
/// its parent it is removed; otherwise it is only synced with its parent.
fn add_shipped_branch(
    program: &mut Program,
    runner: &dyn Runner,
    config: &Config,
    branch: &str,
) -> Result<()> {
    let parent = config
        .lineage
        .parent(branch)
        .unwrap_or(config.branches.main.as_str());
    let unshipped = runner.commits_in_branch(branch, Some(parent))?;
    if !unshipped.is_empty() {
        info!(
            branch,
            commits = unshipped.len(),
            "tracking branch is gone but local commits remain"
        );
        program.add(Opcode::Checkout {
            branch: branch.to_string(),
        });
        if config.lineage.has_parent(branch) {
            program.add(Opcode::MergeParent {
                branch: branch.to_string(),
            });
        }
        program.add(Opcode::EndOfBranchProgram);
        return Ok(());
    }
    info!(branch, "branch was shipped, removing it");
    program.add(Opcode::Checkout {
        branch: parent.to_string(),
    });
    program.add(Opcode::DeleteLocalBranch {
        branch: branch.to_string(),
    });
    for child in config.lineage.children(branch) {
        program.add(Opcode::SetParent {
            branch: child,
            parent: parent.to_string(),
        });
    }
    program.add(Opcode::RemoveFromLineage {
        branch: branch.to_string(),
    });
    program.add(Opcode::EndOfBranchProgram);
    Ok(())
}
