//! `branchwise status`: describe the last run.

use anyhow::Result;

use crate::io::run_state::RunState;
use crate::session::Session;

pub fn status(session: &Session) -> Result<()> {
    let state = session.load_run_state()?;
    print!("{}", describe(state.as_ref()));
    Ok(())
}

pub fn describe(state: Option<&RunState>) -> String {
    let Some(state) = state else {
        return "no run recorded\n".to_string();
    };
    let mut out = String::new();
    if state.is_unfinished() {
        out.push_str(&format!("`{}` is paused", state.command));
        if let Some(failed) = &state.failed_opcode {
            out.push_str(&format!(" at: {failed}"));
        }
        out.push('\n');
        out.push_str(&format!("{} steps remaining\n", state.run_program.len()));
        out.push_str("run `branchwise continue`, `branchwise skip` or `branchwise abort`\n");
        return out;
    }
    let how = if state.aborted {
        "was aborted"
    } else if state.dry_run {
        "completed as a dry run"
    } else {
        "completed"
    };
    out.push_str(&format!("`{}` {how}\n", state.command));
    if state.undoable {
        out.push_str("run `branchwise undo` to revert it\n");
    }
    out
}
