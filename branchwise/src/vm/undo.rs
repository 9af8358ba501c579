//! Reversal programs computed from begin/end snapshots.

use tracing::debug;

use crate::core::snapshot::{BranchInfo, BranchesSnapshot};
use crate::io::run_state::RunState;

use super::opcode::Opcode;
use super::program::Program;

/// Program that moves the repository from the run's end state back to its
/// begin state.
///
/// Order: recreate deleted branches, check out the begin branch, reset moved
/// branches, delete created branches, restore remote refs of non-perennial
/// branches, revert commits that were pushed to perennial branches, restore
/// the configuration, pop stash entries the run left behind.
///
/// Returns an empty program when the run has no end snapshot.
pub fn reversal_program(state: &RunState) -> Program {
    let mut program = Program::new();
    let Some(end) = &state.end_branches else {
        return program;
    };
    let begin = &state.begin_branches;
    let roles = &state.begin_config.branches;
    let is_perennial = |branch: &str| roles.branch_type(branch).is_perennial();

    for info in begin.branches.iter().filter(|info| !end.contains(&info.local_name)) {
        program.add(Opcode::CreateBranch {
            branch: info.local_name.clone(),
            start: info.local_sha.clone(),
        });
    }

    if let Some(active) = &begin.active {
        program.add(Opcode::Checkout {
            branch: active.clone(),
        });
    }

    let mut perennial_reverts = Vec::new();
    for before in &begin.branches {
        let Some(after) = end.find(&before.local_name) else {
            continue;
        };
        if before.local_sha == after.local_sha {
            continue;
        }
        if is_perennial(&before.local_name) && advanced_with_remote(before, after) {
            perennial_reverts.push(after);
            continue;
        }
        if begin.active.as_deref() == Some(before.local_name.as_str()) {
            program.add(Opcode::ResetCurrentBranchToSha {
                sha: before.local_sha.clone(),
            });
        } else {
            program.add(Opcode::ResetBranchToSha {
                branch: before.local_name.clone(),
                sha: before.local_sha.clone(),
            });
        }
    }

    for created in end.branches.iter().filter(|info| !begin.contains(&info.local_name)) {
        program.add(Opcode::DeleteLocalBranch {
            branch: created.local_name.clone(),
        });
    }

    add_remote_restores(&mut program, begin, end, &is_perennial);

    for after in &perennial_reverts {
        program.add(Opcode::Checkout {
            branch: after.local_name.clone(),
        });
        program.add(Opcode::RevertCommit {
            sha: after.local_sha.clone(),
        });
        program.add(Opcode::PushCurrentBranch);
    }
    if !perennial_reverts.is_empty()
        && let Some(active) = &begin.active
    {
        program.add(Opcode::Checkout {
            branch: active.clone(),
        });
    }

    if let Some(end_config) = &state.end_config
        && *end_config != state.begin_config
    {
        program.add(Opcode::RestoreConfig {
            snapshot: state.begin_config.clone(),
        });
    }

    let end_stash = state.end_stash_size.unwrap_or(state.begin_stash_size);
    for _ in state.begin_stash_size..end_stash {
        program.add(Opcode::RestoreOpenChanges);
    }

    debug!(steps = program.len(), "computed reversal program");
    program
}

/// Local and tracking branch moved together to a new commit (e.g. a pushed
/// squash merge).
fn advanced_with_remote(before: &BranchInfo, after: &BranchInfo) -> bool {
    after.remote_sha.as_deref() == Some(after.local_sha.as_str())
        && before.remote_sha != after.remote_sha
}

fn add_remote_restores(
    program: &mut Program,
    begin: &BranchesSnapshot,
    end: &BranchesSnapshot,
    is_perennial: &dyn Fn(&str) -> bool,
) {
    for before in &begin.branches {
        if is_perennial(&before.local_name) {
            continue;
        }
        let after_remote = end
            .find(&before.local_name)
            .and_then(|after| after.remote_sha.as_deref());
        let deleted_locally = !end.contains(&before.local_name);
        match (&before.remote_sha, after_remote) {
            (Some(begin_sha), Some(end_sha)) if begin_sha != end_sha => {
                program.add(Opcode::PushShaToRemote {
                    branch: before.local_name.clone(),
                    sha: begin_sha.clone(),
                });
            }
            (Some(begin_sha), None) => {
                // Deleted at the remote, or the local branch is gone and its
                // remote state is unknown: push the begin state back.
                program.add(Opcode::PushShaToRemote {
                    branch: before.local_name.clone(),
                    sha: begin_sha.clone(),
                });
            }
            (None, Some(_)) if !deleted_locally => {
                program.add(Opcode::DeleteTrackingBranch {
                    branch: before.local_name.clone(),
                });
            }
            _ => {}
        }
    }
    for created in end.branches.iter().filter(|info| !begin.contains(&info.local_name)) {
        if created.remote_sha.is_some() && !is_perennial(&created.local_name) {
            program.add(Opcode::DeleteTrackingBranch {
                branch: created.local_name.clone(),
            });
        }
    }
}
