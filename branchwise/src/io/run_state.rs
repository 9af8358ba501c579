//! Persisted record of the most recent command (`runstate.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::snapshot::BranchesSnapshot;
use crate::io::config::ConfigSnapshot;
use crate::vm::opcode::Opcode;
use crate::vm::program::Program;

/// Current on-disk format version.
pub const RUN_STATE_VERSION: u32 = 1;

/// Everything needed to continue, skip, abort or undo one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    pub version: u32,
    pub command: String,
    pub dry_run: bool,
    pub begin_branches: BranchesSnapshot,
    pub end_branches: Option<BranchesSnapshot>,
    pub begin_config: ConfigSnapshot,
    pub end_config: Option<ConfigSnapshot>,
    pub begin_stash_size: usize,
    pub end_stash_size: Option<usize>,
    /// Opcodes that have not run yet.
    pub run_program: Program,
    /// The opcode that stopped on a conflict, if the run is paused.
    pub failed_opcode: Option<Opcode>,
    /// Compensation for the opcodes executed so far, most recent first.
    pub abort_program: Program,
    /// Opcode-specific undo steps accumulated so far, most recent first.
    pub undo_program: Program,
    pub undoable: bool,
    /// The run ended by rolling back (fatal error or user abort).
    pub aborted: bool,
}

impl RunState {
    pub fn new(
        command: impl Into<String>,
        dry_run: bool,
        begin_branches: BranchesSnapshot,
        begin_config: ConfigSnapshot,
        begin_stash_size: usize,
        run_program: Program,
    ) -> Self {
        Self {
            version: RUN_STATE_VERSION,
            command: command.into(),
            dry_run,
            begin_branches,
            end_branches: None,
            begin_config,
            end_config: None,
            begin_stash_size,
            end_stash_size: None,
            run_program,
            failed_opcode: None,
            abort_program: Program::new(),
            undo_program: Program::new(),
            undoable: false,
            aborted: false,
        }
    }

    /// True while the run is paused and can be continued, skipped or aborted.
    pub fn is_unfinished(&self) -> bool {
        self.failed_opcode.is_some() || !self.run_program.is_empty()
    }
}

/// Load run state from disk.
pub fn load_run_state(path: &Path) -> Result<RunState> {
    debug!(path = %path.display(), "loading run state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run state {}", path.display()))?;
    let state: RunState = serde_json::from_str(&contents)
        .with_context(|| format!("parse run state {}", path.display()))?;
    if state.version != RUN_STATE_VERSION {
        bail!(
            "unsupported run state version {} in {} (expected {})",
            state.version,
            path.display(),
            RUN_STATE_VERSION
        );
    }
    debug!(
        command = %state.command,
        remaining = state.run_program.len(),
        unfinished = state.is_unfinished(),
        "run state loaded"
    );
    Ok(state)
}

/// Load run state if the file exists.
pub fn load_existing_run_state(path: &Path) -> Result<Option<RunState>> {
    if !path.exists() {
        return Ok(None);
    }
    load_run_state(path).map(Some)
}

/// Atomically write run state to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(
        path = %path.display(),
        command = %state.command,
        remaining = state.run_program.len(),
        "writing run state"
    );
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run state {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::{BranchInfo, SyncStatus};

    fn paused_state() -> RunState {
        let begin = BranchesSnapshot {
            active: Some("feature".to_string()),
            branches: vec![BranchInfo {
                local_name: "feature".to_string(),
                local_sha: "1111111".to_string(),
                sync_status: SyncStatus::UpToDate,
                remote_name: Some("origin/feature".to_string()),
                remote_sha: Some("1111111".to_string()),
            }],
        };
        let mut state = RunState::new(
            "sync",
            false,
            begin,
            ConfigSnapshot::default(),
            0,
            Program::from(vec![
                Opcode::PushCurrentBranch,
                Opcode::EndOfBranchProgram,
            ]),
        );
        state.failed_opcode = Some(Opcode::MergeParent {
            branch: "feature".to_string(),
        });
        state.abort_program.add(Opcode::AbortMerge);
        state
    }

    /// Verifies write → read preserves every field, including opcodes.
    #[test]
    fn run_state_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runstate.json");

        let state = paused_state();
        write_run_state(&path, &state).expect("write");
        let loaded = load_run_state(&path).expect("load");
        assert_eq!(loaded, state);
        assert!(loaded.is_unfinished());
    }

    #[test]
    fn opcodes_serialize_with_type_tags() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runstate.json");
        write_run_state(&path, &paused_state()).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("\"version\": 1"));
        assert!(contents.contains("\"type\": \"merge_parent\""));
        assert!(contents.contains("\"type\": \"push_current_branch\""));
        assert!(contents.ends_with("}\n"));
    }

    #[test]
    fn rejects_unknown_versions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runstate.json");
        let mut state = paused_state();
        state.version = 7;
        write_run_state(&path, &state).expect("write");
        let err = load_run_state(&path).expect_err("version");
        assert!(err.to_string().contains("unsupported run state version 7"));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let loaded = load_existing_run_state(&temp.path().join("runstate.json")).expect("load");
        assert!(loaded.is_none());
    }
}
