//! `branchwise propose` and `branchwise repo`: links into the hosting
//! platform's web UI.

use anyhow::{Result, bail};

use crate::error::ValidationError;
use crate::hosting::Connector;
use crate::io::config::Config;
use crate::io::git::Runner;
use crate::session::{Session, report};
use crate::vm::{Opcode, Program};

/// What `propose` pushes before printing the link.
#[derive(Debug)]
pub struct ProposePlan {
    pub program: Program,
    pub url: String,
}

/// Push the current branch if needed and print the URL that opens a new
/// proposal for it.
pub fn propose(session: &mut Session) -> Result<()> {
    session.ensure_no_pending_run()?;
    let online = session.is_online()?;
    session.connect()?;
    let Some(connector) = session.connector() else {
        bail!("no hosting platform detected for this repository's origin");
    };
    let plan = propose_program(session.runner(), session.config(), connector, online)?;
    let outcome = session.execute("propose", plan.program, None)?;
    report(outcome)?;
    println!("{}", plan.url);
    Ok(())
}

pub fn propose_program(
    runner: &dyn Runner,
    config: &Config,
    connector: &dyn Connector,
    online: bool,
) -> Result<ProposePlan> {
    let branch = runner.current_branch()?;
    if config.branches.branch_type(&branch).is_perennial() {
        return Err(ValidationError::Perennial {
            branch,
            operation: "propose".to_string(),
        }
        .into());
    }
    let main = config.branches.main.as_str();
    let parent = config.lineage.parent(&branch).unwrap_or(main);
    let mut program = Program::new();
    let tracked = runner
        .branches_snapshot()?
        .find(&branch)
        .is_some_and(|info| info.has_tracking_branch());
    if online && !tracked {
        program.add(Opcode::CreateTrackingBranch {
            branch: branch.clone(),
        });
    }
    let url = connector.new_proposal_url(&branch, parent, main);
    Ok(ProposePlan { program, url })
}

/// Print the repository's web URL.
pub fn repo(session: &mut Session) -> Result<()> {
    match session.connect()? {
        Some(connector) => {
            println!("{}", connector.repository_url());
            Ok(())
        }
        None => bail!("no hosting platform detected for this repository's origin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeConnector, FakeRunner};

    #[test]
    fn untracked_branches_are_pushed_first() {
        let runner = FakeRunner::new("feature").with_branches(&["main", "team"]);
        let mut config = Config::default();
        config.lineage.set_parent("feature", "team").expect("edge");
        let plan = propose_program(&runner, &config, &FakeConnector::new(), true).expect("plan");
        assert_eq!(
            plan.program.into_iter().collect::<Vec<_>>(),
            vec![Opcode::CreateTrackingBranch {
                branch: "feature".to_string()
            }]
        );
        assert_eq!(
            plan.url,
            "https://github.com/acme/widgets/compare/team...feature"
        );
    }

    #[test]
    fn tracked_branches_only_print_the_link() {
        let runner = FakeRunner::new("feature")
            .with_branches(&["main"])
            .with_tracking(&["feature"]);
        let plan = propose_program(&runner, &Config::default(), &FakeConnector::new(), true)
            .expect("plan");
        assert!(plan.program.is_empty());
        assert!(plan.url.ends_with("compare/main...feature"));
    }

    #[test]
    fn perennial_branches_cannot_be_proposed() {
        let runner = FakeRunner::new("main");
        let err = propose_program(&runner, &Config::default(), &FakeConnector::new(), true)
            .expect_err("main");
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::Perennial { .. })
        ));
    }
}
