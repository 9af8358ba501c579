//! `branchwise continue`, `skip` and `abort`: finish or roll back a run that
//! paused on a conflict.

use anyhow::{Context, Result};
use tracing::info;

use crate::error::ValidationError;
use crate::io::run_state::RunState;
use crate::session::Session;
use crate::vm::{Opcode, Outcome};

/// Resume the paused run after the user resolved the conflicts.
pub fn resume(session: &mut Session) -> Result<Outcome> {
    let state = pending_run(session, ValidationError::NothingToContinue)?;
    if session
        .runner()
        .has_unresolved_conflicts()
        .context("check for unresolved conflicts")?
    {
        return Err(ValidationError::UnresolvedConflicts.into());
    }
    connect_if_needed(session, &state)?;
    info!(command = %state.command, "continuing");
    session.interpreter().resume(state)
}

/// Give up on the current branch and continue with the next one.
pub fn skip(session: &mut Session) -> Result<Outcome> {
    let state = pending_run(session, ValidationError::NothingToContinue)?;
    if !state.run_program.has_branch_boundary() {
        return Err(ValidationError::NothingToSkip.into());
    }
    connect_if_needed(session, &state)?;
    info!(command = %state.command, "skipping the current branch");
    session.interpreter().skip(state)
}

/// Roll the paused run back to where it started.
pub fn abort(session: &mut Session) -> Result<Outcome> {
    let state = pending_run(session, ValidationError::NothingToAbort)?;
    connect_if_needed(session, &state)?;
    info!(command = %state.command, "aborting");
    session.interpreter().abort(state)
}

fn pending_run(session: &Session, missing: ValidationError) -> Result<RunState> {
    match session.load_run_state()? {
        Some(state) if state.is_unfinished() => Ok(state),
        _ => Err(missing.into()),
    }
}

/// Hosting opcodes, pending or compensating, need the connector.
fn connect_if_needed(session: &mut Session, state: &RunState) -> Result<()> {
    let needs_connector = state
        .run_program
        .iter()
        .chain(state.abort_program.iter())
        .any(Opcode::needs_connector);
    if needs_connector {
        session.connect()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn needs(opcode: &Opcode) -> bool {
        opcode.needs_connector()
    }

    #[test]
    fn only_proposal_opcodes_need_a_connector() {
        assert!(needs(&Opcode::SquashMergeProposal {
            number: 3,
            message: "Ship".to_string(),
        }));
        assert!(needs(&Opcode::UpdateProposalTarget {
            number: 4,
            target: "main".to_string(),
            previous: "feature".to_string(),
        }));
        assert!(!needs(&Opcode::PushCurrentBranch));
    }
}
