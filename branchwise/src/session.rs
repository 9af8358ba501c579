//! Shared orchestration for branchwise commands.
//!
//! A [`Session`] is opened once per process: it roots the git runner at the
//! repository's top-level directory, loads the configuration, and runs the
//! program a command built through the [`Interpreter`].

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::remote::ORIGIN;
use crate::error::{RunStopped, StepError, ValidationError};
use crate::hosting::{Connector, select_connector};
use crate::io::config::{Config, load_config};
use crate::io::git::{Git, Runner};
use crate::io::init::StatePaths;
use crate::io::run_state::{RunState, load_existing_run_state};
use crate::vm::wrap::{WrapOptions, wrap};
use crate::vm::{Interpreter, Outcome, Program};

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Print git commands without running the mutating ones.
    pub dry_run: bool,
    /// Print every mutating git command before running it.
    pub echo_commands: bool,
}

pub struct Session {
    git: Git,
    paths: StatePaths,
    config: Config,
    dry_run: bool,
    connector: Option<Box<dyn Connector>>,
}

impl Session {
    /// Open the repository containing `dir`.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn open(dir: &Path, options: &SessionOptions) -> Result<Self> {
        let git = Git::open(dir)
            .context("open git repository")?
            .with_dry_run(options.dry_run)
            .with_command_echo(options.echo_commands || options.dry_run);
        let paths = StatePaths::new(git.git_common_dir().context("locate git directory")?);
        let config = load_config(&paths.config_path)?;
        debug!(
            root = %git.workdir().display(),
            edges = config.lineage.len(),
            "session opened"
        );
        Ok(Self {
            git,
            paths,
            config,
            dry_run: options.dry_run,
            connector: None,
        })
    }

    pub fn runner(&self) -> &dyn Runner {
        &self.git
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// True if the repository has an `origin` and network use is allowed.
    pub fn is_online(&self) -> Result<bool> {
        if self.config.offline {
            return Ok(false);
        }
        let remotes = self.git.remotes().context("list remotes")?;
        Ok(remotes.iter().any(|remote| remote == ORIGIN))
    }

    /// Select the hosting connector for `origin`, once.
    pub fn connect(&mut self) -> Result<Option<&dyn Connector>> {
        if self.connector.is_none() {
            let url = self.git.remote_url(ORIGIN).context("read origin url")?;
            self.connector =
                select_connector(&self.config.hosting, url.as_deref(), self.config.offline)
                    .context("set up hosting connector")?;
        }
        Ok(self.connector.as_deref())
    }

    /// The connector selected by [`Session::connect`], if any.
    pub fn connector(&self) -> Option<&dyn Connector> {
        self.connector.as_deref()
    }

    /// Refuse to start while another run is paused.
    pub fn ensure_no_pending_run(&self) -> Result<()> {
        if let Some(state) = self.load_run_state()?
            && state.is_unfinished()
        {
            return Err(ValidationError::PendingRun {
                command: state.command,
            }
            .into());
        }
        Ok(())
    }

    pub fn load_run_state(&self) -> Result<Option<RunState>> {
        load_existing_run_state(&self.paths.run_state_path)
    }

    /// Fetch from `origin` when online. Runs before the begin snapshot so
    /// that undo never rewinds fetched remote changes.
    pub fn fetch(&self) -> Result<()> {
        if self.is_online()? {
            self.git.fetch().context("fetch from origin")?;
        }
        Ok(())
    }

    /// Wrap `program`, record the begin state, and run it.
    ///
    /// The user ends up on `end_on` (default: the branch they started on).
    #[instrument(skip_all, fields(command = %command))]
    pub fn execute(
        &mut self,
        command: &str,
        program: Program,
        end_on: Option<String>,
    ) -> Result<Outcome> {
        if program.is_empty() {
            info!("nothing to do");
            return Ok(Outcome::Completed);
        }
        let initial = self.git.current_branch().context("determine current branch")?;
        let previous = self
            .git
            .previously_checked_out_branch()
            .context("determine previous branch")?;
        let return_to = match end_on {
            Some(branch) => (branch, Some(initial)),
            None => (initial, previous),
        };
        let options = WrapOptions {
            stash_open_changes: self.git.has_open_changes().context("check open changes")?,
            return_to: (!self.dry_run).then_some(return_to),
        };
        let program = wrap(program, &options);
        debug!(%program, "built program");

        let state = RunState::new(
            command,
            self.dry_run,
            self.git.branches_snapshot().context("capture begin snapshot")?,
            self.config.snapshot(),
            self.git.stash_size().context("count stash entries")?,
            program,
        );
        self.interpreter().execute(state)
    }

    pub fn interpreter(&mut self) -> Interpreter<'_> {
        Interpreter::new(
            &self.git,
            self.connector.as_deref(),
            &mut self.config,
            &self.paths,
        )
    }
}

/// Turn a run outcome into the command result: paused and rolled-back runs
/// become [`RunStopped`] errors.
pub fn report(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Paused { opcode, error } => Err(RunStopped::Paused {
            step: opcode.to_string(),
            reason: describe(&error),
        }
        .into()),
        Outcome::Failed { error, warnings } => Err(RunStopped::RolledBack {
            error: describe(&error),
            warnings,
        }
        .into()),
        Outcome::RolledBack { warnings } => {
            println!("aborted: the repository is back where the run started");
            for warning in &warnings {
                println!("warning: {warning}");
            }
            Ok(())
        }
    }
}

fn describe(error: &StepError) -> String {
    match error {
        StepError::Transport(err) | StepError::Fatal(err) => format!("{err:#}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Opcode;

    #[test]
    fn paused_runs_tell_the_user_how_to_continue() {
        let err = report(Outcome::Paused {
            opcode: Opcode::MergeTrackingBranch {
                branch: "feature".to_string(),
            },
            error: StepError::Conflict {
                operation: "merge".to_string(),
            },
        })
        .expect_err("paused");
        let stopped = err.downcast_ref::<RunStopped>().expect("run stopped");
        assert!(matches!(stopped, RunStopped::Paused { .. }));
        assert!(err.to_string().contains("branchwise continue"));
    }

    #[test]
    fn fatal_failures_report_the_full_cause() {
        let cause = anyhow::anyhow!("rejected").context("git push failed");
        let err = report(Outcome::Failed {
            error: StepError::Fatal(cause),
            warnings: Vec::new(),
        })
        .expect_err("failed");
        assert!(err.to_string().starts_with("git push failed: rejected"));
        assert!(matches!(
            err.downcast_ref::<RunStopped>(),
            Some(RunStopped::RolledBack { .. })
        ));
    }

    #[test]
    fn completed_and_aborted_runs_succeed() {
        report(Outcome::Completed).expect("completed");
        report(Outcome::RolledBack {
            warnings: Vec::new(),
        })
        .expect("aborted");
    }
}
