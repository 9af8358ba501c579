//! `branchwise ship`: land a feature branch on its perennial parent as one
//! squashed commit, then delete it.
//!
//! When the hosting platform has an open proposal for the branch and API
//! credentials are available, the proposal is squash-merged through the API
//! and the parent is updated from its tracking branch. Otherwise the squash
//! merge happens locally and the parent is pushed.

use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::core::message::first_non_empty;
use crate::error::ValidationError;
use crate::hosting::Connector;
use crate::io::config::Config;
use crate::io::git::Runner;
use crate::kill::add_lineage_cleanup;
use crate::session::Session;
use crate::vm::{Opcode, Outcome, Program};

#[derive(Debug, Clone, Default)]
pub struct ShipOptions {
    /// Branch to ship instead of the current one.
    pub branch: Option<String>,
    /// Message for the squashed commit.
    pub message: Option<String>,
}

pub fn ship(session: &mut Session, options: &ShipOptions) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    session.fetch()?;
    let online = session.is_online()?;
    if online {
        session.connect()?;
    }
    let plan = ship_program(
        session.runner(),
        session.config(),
        session.connector(),
        options,
        online,
    )?;
    session.execute("ship", plan.program, plan.end_on)
}

#[derive(Debug)]
pub struct ShipPlan {
    pub program: Program,
    pub end_on: Option<String>,
}

pub fn ship_program(
    runner: &dyn Runner,
    config: &Config,
    connector: Option<&dyn Connector>,
    options: &ShipOptions,
    online: bool,
) -> Result<ShipPlan> {
    let current = runner.current_branch()?;
    let target = options.branch.clone().unwrap_or_else(|| current.clone());
    let snapshot = runner.branches_snapshot()?;
    let Some(info) = snapshot.find(&target) else {
        return Err(ValidationError::UnknownBranch(target).into());
    };
    let branch_type = config.branches.ensure_owned(&target, "ship")?;
    let parent = config
        .lineage
        .parent(&target)
        .ok_or_else(|| ValidationError::NoParent(target.clone()))?
        .to_string();
    if !config.branches.branch_type(&parent).is_perennial() {
        return Err(ValidationError::ShipParentNotPerennial {
            branch: target,
            parent,
        }
        .into());
    }
    let commits = runner.commits_in_branch(&target, Some(&parent))?;
    if commits.is_empty() {
        return Err(ValidationError::NoCommits { branch: target }.into());
    }
    let target_tracked = online && info.has_tracking_branch();
    let parent_tracked = online
        && snapshot
            .find(&parent)
            .is_some_and(|parent| parent.has_tracking_branch());

    let api = match connector {
        Some(connector) if online && connector.can_make_api_calls() => connector
            .find_proposal(&target, &parent)?
            .filter(|proposal| proposal.merge_with_api)
            .map(|proposal| (connector, proposal)),
        _ => None,
    };

    let mut program = Program::new();
    if let Some((connector, proposal)) = api {
        info!(branch = %target, number = proposal.number, "shipping through the hosting API");
        for child in config.lineage.children(&target) {
            if let Some(child_proposal) = connector.find_proposal(&child, &target)? {
                program.add(Opcode::UpdateProposalTarget {
                    number: child_proposal.number,
                    target: parent.clone(),
                    previous: target.clone(),
                });
            }
        }
        let message = options
            .message
            .clone()
            .unwrap_or_else(|| connector.default_proposal_message(&proposal));
        program.add(Opcode::SquashMergeProposal {
            number: proposal.number,
            message,
        });
        program.add(Opcode::Fetch);
        program.add(Opcode::Checkout {
            branch: parent.clone(),
        });
        if parent_tracked {
            program.add(Opcode::RebaseTrackingBranch {
                branch: parent.clone(),
            });
        }
    } else {
        debug!(branch = %target, "shipping with a local squash merge");
        let message = first_non_empty(
            options.message.as_deref(),
            commits.iter().map(|commit| commit.message.as_str()),
        )
        .ok_or_else(|| anyhow!("no commit message for '{target}': pass one with --message"))?;
        program.add(Opcode::Checkout {
            branch: parent.clone(),
        });
        program.add(Opcode::SquashMerge {
            branch: target.clone(),
        });
        program.add(Opcode::CommitSquashedChanges { message });
        if parent_tracked {
            program.add(Opcode::PushCurrentBranch);
        }
    }
    if target_tracked {
        program.add(Opcode::DeleteTrackingBranch {
            branch: target.clone(),
        });
    }
    program.add(Opcode::DeleteLocalBranch {
        branch: target.clone(),
    });
    add_lineage_cleanup(&mut program, config, &target, &parent, branch_type);

    // Leave the user where they were unless the shipped branch is gone.
    let end_on = (target == current).then_some(parent);
    Ok(ShipPlan { program, end_on })
}
