//! The execution engine: opcodes, programs, and the interpreter that runs them.

pub mod interpreter;
pub mod opcode;
pub mod program;
pub mod undo;
pub mod wrap;

pub use interpreter::{Interpreter, Outcome};
pub use opcode::{Opcode, RunArgs};
pub use program::Program;
