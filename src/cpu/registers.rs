//! RMMIX register file.
//!
//! Each job sees 32 general purpose 32-bit registers. Register 0 doubles as
//! the program counter; a negative PC means the CPU has nothing to run.

use serde::{Serialize, Deserialize};

/// Number of registers per job.
pub const NUM_REGISTERS: usize = 32;

/// Index of the program counter.
pub const PC: usize = 0;

/// PC value meaning "CPU idle, no runnable instruction".
pub const IDLE_PC: i32 = -1;

/// The register file of one job.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    regs: [i32; NUM_REGISTERS],
}

impl RegisterFile {
    /// Create a register file with every register zeroed.
    pub const fn new() -> Self {
        Self { regs: [0; NUM_REGISTERS] }
    }

    /// Read a register by (possibly invalid) operand value.
    #[inline]
    pub fn get(&self, index: i32) -> Option<i32> {
        usize::try_from(index).ok().and_then(|i| self.regs.get(i).copied())
    }

    /// Write a register by operand value. Returns `None` if it does not exist.
    #[inline]
    pub fn set(&mut self, index: i32, value: i32) -> Option<()> {
        let slot = usize::try_from(index).ok().and_then(|i| self.regs.get_mut(i))?;
        *slot = value;
        Some(())
    }

    #[inline]
    pub const fn pc(&self) -> i32 {
        self.regs[PC]
    }

    #[inline]
    pub fn set_pc(&mut self, pc: i32) {
        self.regs[PC] = pc;
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> i32 {
        let old = self.regs[PC];
        self.regs[PC] = old.wrapping_add(1);
        old
    }

    /// Add a branch offset to the program counter.
    pub fn branch(&mut self, offset: i32) {
        self.regs[PC] = self.regs[PC].wrapping_add(offset);
    }

    /// True when the PC holds the idle sentinel (any negative value).
    #[inline]
    pub const fn is_idle(&self) -> bool {
        self.regs[PC] < 0
    }

    pub const fn as_array(&self) -> &[i32; NUM_REGISTERS] {
        &self.regs
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show the PC and non-zero registers
        let mut dbg = f.debug_struct("RegisterFile");
        dbg.field("pc", &self.pc());
        for (i, value) in self.regs.iter().enumerate().skip(1) {
            if *value != 0 {
                dbg.field(&format!("r{}", i), value);
            }
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_bounds() {
        let mut regs = RegisterFile::new();
        assert_eq!(regs.set(31, 7), Some(()));
        assert_eq!(regs.get(31), Some(7));
        assert_eq!(regs.set(32, 1), None);
        assert_eq!(regs.get(-1), None);
        assert_eq!(regs.get(32), None);
    }

    #[test]
    fn test_advance_pc() {
        let mut regs = RegisterFile::new();
        regs.set_pc(10);

        let old = regs.advance_pc();
        assert_eq!(old, 10);
        assert_eq!(regs.pc(), 11);
    }

    #[test]
    fn test_idle_sentinel() {
        let mut regs = RegisterFile::new();
        assert!(!regs.is_idle());
        regs.set_pc(IDLE_PC);
        assert!(regs.is_idle());
    }

    #[test]
    fn test_register_zero_is_pc() {
        let mut regs = RegisterFile::new();
        regs.set(0, 5).unwrap();
        assert_eq!(regs.pc(), 5);
        regs.branch(-3);
        assert_eq!(regs.get(0), Some(2));
    }
}
