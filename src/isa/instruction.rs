//! The RMMIX instruction value.

use crate::isa::{Opcode, TrapCode};
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// A decoded instruction: an opcode plus up to three integer operands.
///
/// Unused operand slots are always zero, so two instructions with the same
/// opcode and operands compare equal regardless of how they were built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    opcode: Opcode,
    operands: [i32; 3],
}

impl Instruction {
    /// Maximum number of fields (opcode + operands).
    pub const MAX_FIELDS: usize = 4;

    /// Build an instruction, checking the operand count against the opcode.
    pub fn new(opcode: Opcode, operands: &[i32]) -> Result<Self, InstructionError> {
        let expected = opcode.operand_count();
        if operands.len() != expected {
            return Err(InstructionError::OperandCount {
                opcode,
                expected,
                found: operands.len(),
            });
        }
        let mut slots = [0; 3];
        slots[..expected].copy_from_slice(operands);
        Ok(Self { opcode, operands: slots })
    }

    /// Build an instruction from raw fields (`fields[0]` is the opcode).
    pub fn from_fields(fields: &[i32]) -> Result<Self, InstructionError> {
        let (&raw, operands) = fields.split_first().ok_or(InstructionError::Empty)?;
        let opcode = Opcode::from_i32(raw).ok_or(InstructionError::InvalidOpcode(raw))?;
        Self::new(opcode, operands)
    }

    pub const fn nop() -> Self {
        Self { opcode: Opcode::Nop, operands: [0; 3] }
    }

    #[inline]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The operands actually used by this opcode.
    #[inline]
    pub fn operands(&self) -> &[i32] {
        &self.operands[..self.opcode.operand_count()]
    }

    /// Operand `n` (1-based, like the register-transfer notation).
    #[inline]
    pub const fn operand(&self, n: usize) -> i32 {
        self.operands[n - 1]
    }

    /// Number of fields including the opcode, in 1..=4.
    #[inline]
    pub const fn field_count(&self) -> usize {
        self.opcode.operand_count() + 1
    }

    /// Raw fields as written in object code.
    pub fn fields(&self) -> Vec<i32> {
        std::iter::once(self.opcode.to_i32())
            .chain(self.operands().iter().copied())
            .collect()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, operand) in self.operands().iter().enumerate() {
            // The trap number reads better by name.
            let trap = (self.opcode == Opcode::Trap && i == 0)
                .then(|| TrapCode::from_i32(*operand))
                .flatten();
            match trap {
                Some(code) => write!(f, " {}", code)?,
                None => write!(f, " {}", operand)?,
            }
        }
        Ok(())
    }
}

/// Errors building an instruction from raw parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("empty instruction")]
    Empty,

    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(i32),

    #[error("{opcode} takes {expected} operand(s), found {found}")]
    OperandCount { opcode: Opcode, expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_count() {
        let nop = Instruction::new(Opcode::Nop, &[]).unwrap();
        assert_eq!(nop.field_count(), 1);
        let jmp = Instruction::new(Opcode::Jmpi, &[-2]).unwrap();
        assert_eq!(jmp.field_count(), 2);
        let add = Instruction::new(Opcode::Add, &[1, 2, 3]).unwrap();
        assert_eq!(add.field_count(), 4);
        assert_eq!(add.operands(), &[1, 2, 3]);
        assert_eq!(add.operand(3), 3);
    }

    #[test]
    fn test_wrong_operand_count_rejected() {
        let err = Instruction::new(Opcode::Addi, &[1, 2]).unwrap_err();
        assert_eq!(
            err,
            InstructionError::OperandCount { opcode: Opcode::Addi, expected: 3, found: 2 }
        );
        assert!(Instruction::new(Opcode::Nop, &[0]).is_err());
    }

    #[test]
    fn test_from_fields() {
        let instr = Instruction::from_fields(&[0x4, 1, 0, 7]).unwrap();
        assert_eq!(instr.opcode(), Opcode::Addi);
        assert_eq!(instr.fields(), vec![0x4, 1, 0, 7]);
        assert_eq!(Instruction::from_fields(&[0x20]), Err(InstructionError::InvalidOpcode(0x20)));
        assert_eq!(Instruction::from_fields(&[]), Err(InstructionError::Empty));
    }

    #[test]
    fn test_display() {
        let trap = Instruction::new(Opcode::Trap, &[1, 4]).unwrap();
        assert_eq!(trap.to_string(), "TRAP halt 4");
        let odd = Instruction::new(Opcode::Trap, &[9, 0]).unwrap();
        assert_eq!(odd.to_string(), "TRAP 9 0");
        let movi = Instruction::new(Opcode::Movi, &[3, -12]).unwrap();
        assert_eq!(movi.to_string(), "MOVI 3 -12");
        assert_eq!(Instruction::nop().to_string(), "NOP");
    }
}
