//! Executes programs and decides between completing, pausing and rolling back.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::error::StepError;
use crate::hosting::Connector;
use crate::io::config::Config;
use crate::io::git::Runner;
use crate::io::init::StatePaths;
use crate::io::run_state::{RunState, write_run_state};

use super::opcode::{Opcode, RunArgs};
use super::program::Program;
use super::undo::reversal_program;

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every opcode ran.
    Completed,
    /// An opcode stopped on a conflict; the run state holds the rest.
    Paused { opcode: Opcode, error: StepError },
    /// An opcode failed fatally and the run was rolled back.
    Failed {
        error: StepError,
        warnings: Vec<String>,
    },
    /// The user aborted a paused run and it was rolled back.
    RolledBack { warnings: Vec<String> },
}

/// Runs programs against a repository and persists the run state.
pub struct Interpreter<'a> {
    runner: &'a dyn Runner,
    connector: Option<&'a dyn Connector>,
    config: &'a mut Config,
    paths: &'a StatePaths,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        connector: Option<&'a dyn Connector>,
        config: &'a mut Config,
        paths: &'a StatePaths,
    ) -> Self {
        Self {
            runner,
            connector,
            config,
            paths,
        }
    }

    /// Run the remaining program of `state` to completion, a conflict, or a
    /// fatal failure.
    #[instrument(skip_all, fields(command = %state.command))]
    pub fn execute(&mut self, mut state: RunState) -> Result<Outcome> {
        info!(steps = state.run_program.len(), "executing program");
        while let Some(opcode) = state.run_program.pop_front() {
            let mut args = self.args(state.dry_run);
            match opcode.run(&mut args) {
                Ok(()) => {
                    let prepended = args.prepended;
                    state.run_program.prepend_all(prepended);
                    state.abort_program.prepend_all(opcode.abort_steps());
                    state.undo_program.prepend_all(opcode.undo_steps());
                }
                Err(error) if error.is_conflict() => {
                    warn!(%opcode, %error, "paused on conflict");
                    state.failed_opcode = Some(opcode.clone());
                    self.persist(&state)?;
                    return Ok(Outcome::Paused { opcode, error });
                }
                Err(error) => {
                    warn!(%opcode, %error, "fatal failure, rolling back");
                    let warnings = self.roll_back(&mut state, Some(&opcode));
                    return Ok(Outcome::Failed { error, warnings });
                }
            }
        }
        self.finish(state)?;
        Ok(Outcome::Completed)
    }

    /// Resume a paused run after the user resolved the conflict.
    pub fn resume(&mut self, mut state: RunState) -> Result<Outcome> {
        if let Some(failed) = state.failed_opcode.take() {
            state.run_program.prepend_all(failed.continue_steps());
        }
        self.execute(state)
    }

    /// Back out of the failed opcode, drop the rest of its branch's steps,
    /// and continue with the next branch.
    pub fn skip(&mut self, mut state: RunState) -> Result<Outcome> {
        let mut preamble = Program::new();
        if let Some(failed) = state.failed_opcode.take() {
            preamble.add_all(failed.cancel_steps());
        }
        let current = self.runner.current_branch()?;
        if let Some(info) = state.begin_branches.find(&current) {
            preamble.add(Opcode::ResetCurrentBranchToSha {
                sha: info.local_sha.clone(),
            });
        }
        let dropped = state.run_program.drop_current_branch();
        debug!(branch = %current, dropped, "skipping branch");
        state.run_program.prepend_all(preamble);
        self.execute(state)
    }

    /// Roll a paused run back to its begin state.
    pub fn abort(&mut self, mut state: RunState) -> Result<Outcome> {
        let failed = state.failed_opcode.take();
        let warnings = self.roll_back(&mut state, failed.as_ref());
        Ok(Outcome::RolledBack { warnings })
    }

    fn args(&mut self, dry_run: bool) -> RunArgs<'_> {
        RunArgs {
            runner: self.runner,
            connector: self.connector,
            config: &mut *self.config,
            config_path: Some(self.paths.config_path.as_path()),
            dry_run,
            prepended: Program::new(),
        }
    }

    fn finish(&mut self, mut state: RunState) -> Result<()> {
        self.capture_end(&mut state)?;
        let mut undo = std::mem::take(&mut state.undo_program);
        undo.add_all(reversal_program(&state));
        state.undo_program = undo;
        state.abort_program = Program::new();
        state.failed_opcode = None;
        state.undoable = !state.dry_run;
        info!(undo_steps = state.undo_program.len(), "run completed");
        self.persist(&state)
    }

    fn capture_end(&mut self, state: &mut RunState) -> Result<()> {
        state.end_branches = Some(
            self.runner
                .branches_snapshot()
                .context("capture end snapshot")?,
        );
        state.end_config = Some(self.config.snapshot());
        state.end_stash_size = Some(self.runner.stash_size().context("count stash entries")?);
        Ok(())
    }

    /// Best-effort rollback: cancel the failed opcode, run the abort program,
    /// then reverse everything the run changed. Failures are collected, never
    /// compensated.
    fn roll_back(&mut self, state: &mut RunState, failed: Option<&Opcode>) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut program = Program::new();
        if let Some(failed) = failed {
            program.add_all(failed.cancel_steps());
        }
        program.add_all(std::mem::take(&mut state.abort_program));
        warnings.extend(self.run_best_effort(program, state.dry_run));

        // Snapshot after cancelling so in-progress merges don't count as changes.
        match self.capture_end(state) {
            Ok(()) => {
                let reversal = reversal_program(state);
                warnings.extend(self.run_best_effort(reversal, state.dry_run));
            }
            Err(err) => warnings.push(format!("could not compute rollback: {err:#}")),
        }

        state.run_program = Program::new();
        state.failed_opcode = None;
        state.undo_program = Program::new();
        state.undoable = false;
        state.aborted = true;
        if let Err(err) = self.persist(state) {
            warnings.push(format!("{err:#}"));
        }
        warnings
    }

    fn run_best_effort(&mut self, mut program: Program, dry_run: bool) -> Vec<String> {
        let mut warnings = Vec::new();
        while let Some(opcode) = program.pop_front() {
            let mut args = self.args(dry_run);
            match opcode.run(&mut args) {
                Ok(()) => {
                    let prepended = args.prepended;
                    program.prepend_all(prepended);
                }
                Err(err) => {
                    warn!(%opcode, error = %err, "compensating step failed");
                    warnings.push(format!("{opcode}: {err:#}"));
                }
            }
        }
        warnings
    }

    fn persist(&self, state: &RunState) -> Result<()> {
        write_run_state(&self.paths.run_state_path, state)
    }
}
