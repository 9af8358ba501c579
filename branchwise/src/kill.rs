//! `branchwise kill`: delete a branch locally and remotely and splice it out
//! of the lineage.

use anyhow::Result;

use crate::core::branch_type::BranchType;
use crate::error::ValidationError;
use crate::io::config::Config;
use crate::io::git::Runner;
use crate::session::Session;
use crate::vm::{Opcode, Outcome, Program};

/// Delete `branch` (default: the current branch).
pub fn kill(session: &mut Session, branch: Option<&str>) -> Result<Outcome> {
    session.ensure_no_pending_run()?;
    let online = session.is_online()?;
    let plan = kill_program(session.runner(), session.config(), branch, online)?;
    session.execute("kill", plan.program, plan.end_on)
}

/// A program plus the branch the user should end up on.
#[derive(Debug)]
pub struct KillPlan {
    pub program: Program,
    pub end_on: Option<String>,
}

pub fn kill_program(
    runner: &dyn Runner,
    config: &Config,
    branch: Option<&str>,
    online: bool,
) -> Result<KillPlan> {
    let current = runner.current_branch()?;
    let target = branch.map_or_else(|| current.clone(), str::to_string);
    let snapshot = runner.branches_snapshot()?;
    let Some(info) = snapshot.find(&target) else {
        return Err(ValidationError::UnknownBranch(target).into());
    };
    let branch_type = config.branches.branch_type(&target);
    if branch_type.is_perennial() {
        return Err(ValidationError::Perennial {
            branch: target,
            operation: "kill".to_string(),
        }
        .into());
    }
    let parent = config
        .lineage
        .parent(&target)
        .unwrap_or(config.branches.main.as_str())
        .to_string();

    let mut program = Program::new();
    let killing_current = target == current;
    if killing_current {
        program.add(Opcode::Checkout {
            branch: parent.clone(),
        });
    }
    if online && info.has_tracking_branch() {
        program.add(Opcode::DeleteTrackingBranch {
            branch: target.clone(),
        });
    }
    program.add(Opcode::DeleteLocalBranch {
        branch: target.clone(),
    });
    add_lineage_cleanup(&mut program, config, &target, &parent, branch_type);
    Ok(KillPlan {
        program,
        end_on: killing_current.then_some(parent),
    })
}

/// Re-parent the children of a removed branch to its parent and forget the
/// branch's own lineage edge and role.
pub(crate) fn add_lineage_cleanup(
    program: &mut Program,
    config: &Config,
    branch: &str,
    parent: &str,
    branch_type: BranchType,
) {
    for child in config.lineage.children(branch) {
        program.add(Opcode::SetParent {
            branch: child,
            parent: parent.to_string(),
        });
    }
    if config.lineage.has_parent(branch) {
        program.add(Opcode::RemoveFromLineage {
            branch: branch.to_string(),
        });
    }
    if branch_type != BranchType::Feature {
        program.add(Opcode::SetBranchRole {
            branch: branch.to_string(),
            role: BranchType::Feature,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRunner;

    fn config() -> Config {
        let mut config = Config::default();
        config.lineage.set_parent("feature-a", "main").expect("edge");
        config.lineage.set_parent("feature-b", "feature-a").expect("edge");
        config
    }

    #[test]
    fn killing_the_current_branch_moves_to_its_parent() {
        let runner = FakeRunner::new("feature-a")
            .with_branches(&["main", "feature-b"])
            .with_tracking(&["feature-a"]);
        let plan = kill_program(&runner, &config(), None, true).expect("plan");
        assert_eq!(plan.end_on.as_deref(), Some("main"));
        assert_eq!(
            plan.program.into_iter().collect::<Vec<_>>(),
            vec![
                Opcode::Checkout {
                    branch: "main".to_string()
                },
                Opcode::DeleteTrackingBranch {
                    branch: "feature-a".to_string()
                },
                Opcode::DeleteLocalBranch {
                    branch: "feature-a".to_string()
                },
                Opcode::SetParent {
                    branch: "feature-b".to_string(),
                    parent: "main".to_string()
                },
                Opcode::RemoveFromLineage {
                    branch: "feature-a".to_string()
                },
            ]
        );
    }

    #[test]
    fn killing_another_branch_stays_put() {
        let runner = FakeRunner::new("main").with_branches(&["feature-a", "feature-b"]);
        let plan = kill_program(&runner, &config(), Some("feature-b"), true).expect("plan");
        assert_eq!(plan.end_on, None);
        assert_eq!(
            plan.program.into_iter().collect::<Vec<_>>(),
            vec![
                Opcode::DeleteLocalBranch {
                    branch: "feature-b".to_string()
                },
                Opcode::RemoveFromLineage {
                    branch: "feature-b".to_string()
                },
            ]
        );
    }

    #[test]
    fn parked_branches_lose_their_role() {
        let runner = FakeRunner::new("main").with_branches(&["feature-b"]);
        let mut config = config();
        config
            .branches
            .set_role("feature-b", BranchType::Parked)
            .expect("role");
        let plan = kill_program(&runner, &config, Some("feature-b"), true).expect("plan");
        assert!(plan.program.iter().any(|step| *step
            == Opcode::SetBranchRole {
                branch: "feature-b".to_string(),
                role: BranchType::Feature,
            }));
    }

    #[test]
    fn perennial_branches_cannot_be_killed() {
        let runner = FakeRunner::new("main");
        let err = kill_program(&runner, &config(), None, true).expect_err("main");
        assert_eq!(
            err.to_string(),
            "cannot kill 'main': it is a perennial branch"
        );
    }

    #[test]
    fn unknown_branches_are_rejected() {
        let runner = FakeRunner::new("main");
        let err = kill_program(&runner, &config(), Some("nope"), true).expect_err("unknown");
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::UnknownBranch(_))
        ));
    }
}
