//! `branchwise park`, `observe` and `contribute`: change how sync and the
//! history-rewriting commands treat a branch.

use anyhow::Result;

use crate::core::branch_type::BranchType;
use crate::error::ValidationError;
use crate::io::config::Config;
use crate::io::git::Runner;
use crate::session::Session;
use crate::vm::{Opcode, Outcome, Program};

pub fn set_role(session: &mut Session, branch: Option<&str>, role: BranchType) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    let program = role_program(session.runner(), session.config(), branch, role)?;
    session.execute(role.as_str(), program, None)
}

/// Observed and contribution branches belong to someone else, so they leave
/// the lineage. Parked branches keep their parent.
pub fn role_program(
    runner: &dyn Runner,
    config: &Config,
    branch: Option<&str>,
    role: BranchType,
) -> Result<Program> {
    let branch = match branch {
        Some(branch) => branch.to_string(),
        None => runner.current_branch()?,
    };
    if !runner.branch_exists(&branch)? {
        return Err(ValidationError::UnknownBranch(branch).into());
    }
    if config.branches.branch_type(&branch).is_perennial() {
        return Err(ValidationError::Perennial {
            branch,
            operation: format!("mark as {role}"),
        }
        .into());
    }
    let mut program = Program::from(vec![Opcode::SetBranchRole {
        branch: branch.clone(),
        role,
    }]);
    if matches!(role, BranchType::Observed | BranchType::Contribution)
        && config.lineage.has_parent(&branch)
    {
        program.add(Opcode::RemoveFromLineage { branch });
    }
    Ok(program)
}
