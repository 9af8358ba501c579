//! Ordered opcode sequences.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::opcode::Opcode;

/// A list of opcodes executed front to back.
///
/// Builders append; the interpreter pops from the front and may insert
/// opcodes ahead of the remaining ones. Nothing reorders steps implicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    steps: VecDeque<Opcode>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, opcode: Opcode) {
        self.steps.push_back(opcode);
    }

    pub fn add_all(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.steps.extend(opcodes);
    }

    /// Insert `opcode` ahead of everything else.
    pub fn prepend(&mut self, opcode: Opcode) {
        self.steps.push_front(opcode);
    }

    /// Insert `opcodes` ahead of everything else, keeping their order.
    pub fn prepend_all(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        let opcodes: Vec<Opcode> = opcodes.into_iter().collect();
        for opcode in opcodes.into_iter().rev() {
            self.steps.push_front(opcode);
        }
    }

    pub fn pop_front(&mut self) -> Option<Opcode> {
        self.steps.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Opcode> {
        self.steps.iter()
    }

    /// True if another branch's block follows the current one.
    pub fn has_branch_boundary(&self) -> bool {
        self.steps
            .iter()
            .any(|opcode| matches!(opcode, Opcode::EndOfBranchProgram))
    }

    /// Drop the remaining steps of the current branch, up to and including
    /// the next `EndOfBranchProgram`. Returns the number of dropped steps.
    pub fn drop_current_branch(&mut self) -> usize {
        let mut dropped = 0;
        while let Some(opcode) = self.steps.pop_front() {
            dropped += 1;
            if matches!(opcode, Opcode::EndOfBranchProgram) {
                break;
            }
        }
        dropped
    }
}

impl From<Vec<Opcode>> for Program {
    fn from(opcodes: Vec<Opcode>) -> Self {
        Self {
            steps: opcodes.into(),
        }
    }
}

impl FromIterator<Opcode> for Program {
    fn from_iter<I: IntoIterator<Item = Opcode>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Program {
    type Item = Opcode;
    type IntoIter = std::collections::vec_deque::IntoIter<Opcode>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, opcode) in self.steps.iter().enumerate() {
            writeln!(f, "{:>3}. {opcode}", index + 1)?;
        }
        Ok(())
    }
}
