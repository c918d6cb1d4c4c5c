//! RMMIX instruction set.
//!
//! - [`Opcode`] - the twenty operation codes and their operand counts
//! - [`TrapCode`] - software and hardware interrupt numbers
//! - [`Instruction`] - an opcode with its operands

mod opcode;
mod instruction;

pub use opcode::{Opcode, TrapCode};
pub use instruction::{Instruction, InstructionError};
