//! `branchwise hack`, `append` and `set-parent`: create branches and edit the
//! lineage.

use anyhow::{Result, bail};

use crate::error::ValidationError;
use crate::io::config::Config;
use crate::io::git::Runner;
use crate::session::Session;
use crate::vm::{Opcode, Outcome, Program};

/// Create `branch` as a child of main and switch to it.
pub fn hack(session: &mut Session, branch: &str) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    let online = session.is_online()?;
    let main = session.config().branches.main.clone();
    let program = new_branch_program(session.runner(), session.config(), branch, &main, online)?;
    session.execute("hack", program, Some(branch.to_string()))
}

/// Create `branch` as a child of the current branch and switch to it.
pub fn append(session: &mut Session, branch: &str) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    let online = session.is_online()?;
    let parent = session.runner().current_branch()?;
    let program =
        new_branch_program(session.runner(), session.config(), branch, &parent, online)?;
    session.execute("append", program, Some(branch.to_string()))
}

/// Make `parent` the parent of the current branch.
pub fn set_parent(session: &mut Session, parent: &str) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    let program = set_parent_program(session.runner(), session.config(), parent)?;
    session.execute("set-parent", program, None)
}

pub fn new_branch_program(
    runner: &dyn Runner,
    config: &Config,
    branch: &str,
    parent: &str,
    online: bool,
) -> Result<Program> {
    if branch.trim().is_empty() {
        bail!("branch name must not be empty");
    }
    if runner.branch_exists(branch)? {
        return Err(ValidationError::BranchExists(branch.to_string()).into());
    }
    if !runner.branch_exists(parent)? {
        return Err(ValidationError::UnknownBranch(parent.to_string()).into());
    }
    let mut program = Program::from(vec![
        Opcode::CreateBranch {
            branch: branch.to_string(),
            start: parent.to_string(),
        },
        Opcode::SetParent {
            branch: branch.to_string(),
            parent: parent.to_string(),
        },
        Opcode::Checkout {
            branch: branch.to_string(),
        },
    ]);
    if online && config.push_new_branches {
        program.add(Opcode::CreateTrackingBranch {
            branch: branch.to_string(),
        });
    }
    Ok(program)
}

pub fn set_parent_program(runner: &dyn Runner, config: &Config, parent: &str) -> Result<Program> {
    let current = runner.current_branch()?;
    if config.branches.branch_type(&current).is_perennial() {
        return Err(ValidationError::Perennial {
            branch: current,
            operation: "set the parent of".to_string(),
        }
        .into());
    }
    if !runner.branch_exists(parent)? {
        return Err(ValidationError::UnknownBranch(parent.to_string()).into());
    }
    let mut lineage = config.lineage.clone();
    lineage
        .set_parent(&current, parent)
        .map_err(ValidationError::from)?;
    Ok(Program::from(vec![Opcode::SetParent {
        branch: current,
        parent: parent.to_string(),
    }]))
}
