//! Steps every command program is wrapped in.

use super::opcode::Opcode;
use super::program::Program;

#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    /// The worktree has uncommitted changes that must survive the run.
    pub stash_open_changes: bool,
    /// Branch to end up on, and the branch to leave as `@{-1}`.
    pub return_to: Option<(String, Option<String>)>,
}

/// Bracket `program` with stash/restore steps and a final checkout.
///
/// The stash is pushed before anything else and popped after everything else,
/// so the final checkout runs on a clean worktree. Empty programs stay empty.
pub fn wrap(program: Program, options: &WrapOptions) -> Program {
    if program.is_empty() {
        return program;
    }
    let mut wrapped = Program::new();
    if options.stash_open_changes {
        wrapped.add(Opcode::StashOpenChanges);
    }
    wrapped.add_all(program);
    if let Some((initial, previous)) = &options.return_to {
        wrapped.add(Opcode::RestoreCheckout {
            initial: initial.clone(),
            previous: previous.clone(),
        });
    }
    if options.stash_open_changes {
        wrapped.add(Opcode::RestoreOpenChanges);
    }
    wrapped
}
