//! CPU execution engine for the RMMIX machine.
//!
//! Implements the fetch-execute step and all instruction behaviors.
//! Interrupt dispatch is not done here: the simulator looks at the trap
//! line before asking the CPU to step.

use crate::cpu::{DataMemory, RegisterFile, TrapLine};
use crate::cpu::memory::{MemoryError, INSTRUCTION_MEMORY_SIZE};
use crate::isa::{Instruction, Opcode, TrapCode};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Device number of the CPU.
pub const CPU_DEVICE: usize = 0;

/// The RMMIX CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// Live register file (belongs to the current job).
    pub regs: RegisterFile,
    /// Data memory, shared by every job.
    pub mem: DataMemory,
    /// The CPU's trap line.
    pub trap: TrapLine,
    /// Instruction memory (image of the current job).
    program: Vec<Instruction>,
    /// Instructions executed (for profiling).
    pub cycles: u64,
    /// Ticks spent idling.
    pub idle_ticks: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU with zeroed state and an empty instruction memory.
    pub fn new() -> Self {
        Self {
            regs: RegisterFile::new(),
            mem: DataMemory::new(),
            trap: TrapLine::idle(),
            program: Vec::new(),
            cycles: 0,
            idle_ticks: 0,
            last_instr: None,
        }
    }

    /// Replace the instruction memory with a job image.
    pub fn load_image(&mut self, image: &[Instruction]) -> Result<(), CpuFault> {
        if image.len() > INSTRUCTION_MEMORY_SIZE {
            return Err(CpuFault::ImageTooLarge(image.len()));
        }
        self.program.clear();
        self.program.extend_from_slice(image);
        Ok(())
    }

    /// The loaded instruction memory.
    pub fn program(&self) -> &[Instruction] {
        &self.program
    }

    /// True if the PC sits exactly one past the last loaded instruction.
    pub fn at_end_of_image(&self) -> bool {
        usize::try_from(self.regs.pc()).map_or(false, |pc| pc == self.program.len())
    }

    /// Count one idle tick.
    pub fn idle(&mut self) {
        self.idle_ticks += 1;
        tracing::debug!(dev = CPU_DEVICE, "CPU idle");
    }

    /// Execute the instruction at the PC.
    ///
    /// On a fault nothing is assigned, the trap line is set to FATAL with
    /// data 0 and the fault is returned for diagnostics.
    pub fn step(&mut self) -> Result<Instruction, CpuFault> {
        let pc = self.regs.pc();
        let instr = match usize::try_from(pc).ok().and_then(|i| self.program.get(i)) {
            Some(instr) => *instr,
            None => {
                let fault = CpuFault::IllegalFetch { pc, len: self.program.len() };
                self.raise_fatal(&fault);
                return Err(fault);
            }
        };

        tracing::debug!(dev = CPU_DEVICE, "CPU execute @ addr {}: {}", pc, instr);
        let result = self.execute(instr);
        if let Err(fault) = &result {
            self.raise_fatal(fault);
        }

        // Every instruction ends by incrementing the PC, TRAP included.
        self.regs.advance_pc();
        self.cycles += 1;
        self.last_instr = Some(instr);

        result.map(|()| instr)
    }

    fn raise_fatal(&mut self, fault: &CpuFault) {
        tracing::warn!(dev = CPU_DEVICE, "CPU fault at pc {}: {}", self.regs.pc(), fault);
        self.trap.raise(TrapCode::Fatal, 0);
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<(), CpuFault> {
        let a = |n| instr.operand(n);

        match instr.opcode() {
            Opcode::Nop => {}

            // ==================== Arithmetic ====================

            Opcode::Mov => {
                let value = self.reg(a(2))?;
                self.set_reg(a(1), value)?;
            }
            Opcode::Movi => self.set_reg(a(1), a(2))?,
            Opcode::Add => {
                let value = self.reg(a(2))?.wrapping_add(self.reg(a(3))?);
                self.set_reg(a(1), value)?;
            }
            Opcode::Addi => {
                let value = self.reg(a(2))?.wrapping_add(a(3));
                self.set_reg(a(1), value)?;
            }
            Opcode::Sub => {
                let value = self.reg(a(2))?.wrapping_sub(self.reg(a(3))?);
                self.set_reg(a(1), value)?;
            }
            Opcode::Subi => {
                let value = self.reg(a(2))?.wrapping_sub(a(3));
                self.set_reg(a(1), value)?;
            }
            Opcode::Mul => {
                let value = self.reg(a(2))?.wrapping_mul(self.reg(a(3))?);
                self.set_reg(a(1), value)?;
            }
            Opcode::Muli => {
                let value = self.reg(a(2))?.wrapping_mul(a(3));
                self.set_reg(a(1), value)?;
            }
            Opcode::Div => {
                let divisor = self.reg(a(3))?;
                self.divide(a(1), a(2), divisor)?;
            }
            Opcode::Divi => self.divide(a(1), a(2), a(3))?,

            // ==================== Control Flow ====================

            Opcode::Jmpi => self.regs.branch(a(1)),
            Opcode::Beqzi => {
                if self.reg(a(1))? == 0 {
                    self.regs.branch(a(2));
                }
            }
            Opcode::Bnezi => {
                if self.reg(a(1))? != 0 {
                    self.regs.branch(a(2));
                }
            }
            Opcode::Bnegi => {
                if self.reg(a(1))? < 0 {
                    self.regs.branch(a(2));
                }
            }
            Opcode::Trap => {
                debug_assert!(self.trap.is_idle());
                self.trap = TrapLine { number: a(1), data: a(2), status: 0 };
            }

            // ==================== Data Memory ====================

            Opcode::Ldwi => {
                let value = self.mem.read(a(2))?;
                self.set_reg(a(1), value)?;
            }
            Opcode::Ldw => {
                let addr = self.reg(a(2))?;
                let value = self.mem.read(addr)?;
                self.set_reg(a(1), value)?;
            }
            Opcode::Stwi => {
                let value = self.reg(a(1))?;
                self.mem.write(a(2), value)?;
            }
            Opcode::Stw => {
                let value = self.reg(a(1))?;
                let addr = self.reg(a(2))?;
                self.mem.write(addr, value)?;
            }
        }

        Ok(())
    }

    fn divide(&mut self, dest: i32, src: i32, divisor: i32) -> Result<(), CpuFault> {
        if divisor == 0 {
            return Err(CpuFault::DivisionByZero);
        }
        let value = self.reg(src)?.wrapping_div(divisor);
        self.set_reg(dest, value)
    }

    fn reg(&self, index: i32) -> Result<i32, CpuFault> {
        self.regs.get(index).ok_or(CpuFault::BadRegister(index))
    }

    fn set_reg(&mut self, index: i32, value: i32) -> Result<(), CpuFault> {
        self.regs.set(index, value).ok_or(CpuFault::BadRegister(index))
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("regs", &self.regs)
            .field("trap", &self.trap)
            .field("program_len", &self.program.len())
            .field("cycles", &self.cycles)
            .field("idle_ticks", &self.idle_ticks)
            .finish()
    }
}

/// Conditions that turn an instruction into a FATAL trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuFault {
    #[error("division by zero")]
    DivisionByZero,

    #[error("register r{0} does not exist")]
    BadRegister(i32),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("illegal instruction fetch at {pc} (image holds {len})")]
    IllegalFetch { pc: i32, len: usize },

    #[error("image of {0} instructions exceeds instruction memory")]
    ImageTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ins(op: Opcode, operands: &[i32]) -> Instruction {
        Instruction::new(op, operands).unwrap()
    }

    fn cpu_with(program: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_image(program).unwrap();
        cpu
    }

    fn run_all(cpu: &mut Cpu) {
        while !cpu.at_end_of_image() && cpu.trap.is_idle() {
            cpu.step().unwrap();
        }
    }

    #[test]
    fn test_cpu_arithmetic() {
        let mut cpu = cpu_with(&[
            ins(Opcode::Movi, &[1, 10]),
            ins(Opcode::Movi, &[2, 5]),
            ins(Opcode::Add, &[3, 1, 2]),
            ins(Opcode::Subi, &[4, 3, 20]),
            ins(Opcode::Mul, &[5, 4, 2]),
            ins(Opcode::Divi, &[6, 5, 4]),
            ins(Opcode::Mov, &[7, 6]),
        ]);
        run_all(&mut cpu);

        assert_eq!(cpu.regs.get(3), Some(15));
        assert_eq!(cpu.regs.get(4), Some(-5));
        assert_eq!(cpu.regs.get(5), Some(-25));
        assert_eq!(cpu.regs.get(6), Some(-6)); // truncates toward zero
        assert_eq!(cpu.regs.get(7), Some(-6));
        assert_eq!(cpu.cycles, 7);
    }

    #[test]
    fn test_division_by_zero_raises_fatal() {
        let mut cpu = cpu_with(&[
            ins(Opcode::Movi, &[1, 99]),
            ins(Opcode::Divi, &[1, 1, 0]),
        ]);
        cpu.step().unwrap();
        assert_eq!(cpu.step(), Err(CpuFault::DivisionByZero));

        assert_eq!(cpu.regs.get(1), Some(99));
        assert_eq!(cpu.trap, TrapLine::new(TrapCode::Fatal, 0, 0));
        assert_eq!(cpu.regs.pc(), 2);
    }

    #[test]
    fn test_branches() {
        // r1 counts down from 3, r2 accumulates
        let mut cpu = cpu_with(&[
            ins(Opcode::Movi, &[1, 3]),
            ins(Opcode::Addi, &[2, 2, 10]),
            ins(Opcode::Subi, &[1, 1, 1]),
            ins(Opcode::Bnezi, &[1, -3]),
            ins(Opcode::Nop, &[]),
        ]);
        run_all(&mut cpu);
        assert_eq!(cpu.regs.get(2), Some(30));

        let mut cpu = cpu_with(&[
            ins(Opcode::Movi, &[1, -1]),
            ins(Opcode::Bnegi, &[1, 1]),
            ins(Opcode::Movi, &[2, 1]), // skipped
            ins(Opcode::Beqzi, &[2, 1]),
            ins(Opcode::Movi, &[3, 1]), // skipped
            ins(Opcode::Jmpi, &[0]),
        ]);
        run_all(&mut cpu);
        assert_eq!(cpu.regs.get(2), Some(0));
        assert_eq!(cpu.regs.get(3), Some(0));
    }

    #[test]
    fn test_trap_sets_line_and_advances_pc() {
        let trap = ins(Opcode::Trap, &[TrapCode::Getw.to_i32(), 4]);
        let mut cpu = cpu_with(&[trap]);
        assert_eq!(cpu.last_instruction(), None);
        cpu.step().unwrap();
        assert_eq!(cpu.trap, TrapLine::new(TrapCode::Getw, 4, 0));
        assert_eq!(cpu.regs.pc(), 1);
        assert_eq!(cpu.last_instruction(), Some(trap));
    }

    #[test]
    fn test_data_memory_transfers() {
        let mut cpu = cpu_with(&[
            ins(Opcode::Movi, &[1, 77]),
            ins(Opcode::Stwi, &[1, 100]),
            ins(Opcode::Ldwi, &[2, 100]),
            ins(Opcode::Movi, &[3, 200]),
            ins(Opcode::Stw, &[2, 3]),
            ins(Opcode::Ldw, &[4, 3]),
        ]);
        run_all(&mut cpu);
        assert_eq!(cpu.mem.read(100), Ok(77));
        assert_eq!(cpu.mem.read(200), Ok(77));
        assert_eq!(cpu.regs.get(4), Some(77));
    }

    #[test]
    fn test_bad_register_and_address_fault() {
        let mut cpu = cpu_with(&[ins(Opcode::Movi, &[40, 1])]);
        assert_eq!(cpu.step(), Err(CpuFault::BadRegister(40)));
        assert_eq!(cpu.trap.code(), Some(TrapCode::Fatal));

        let mut cpu = cpu_with(&[ins(Opcode::Ldwi, &[1, 5000])]);
        assert_eq!(
            cpu.step(),
            Err(CpuFault::Memory(MemoryError::AddressOutOfRange(5000)))
        );
        assert_eq!(cpu.trap.data, 0);
    }

    #[test]
    fn test_illegal_fetch_past_image() {
        let mut cpu = cpu_with(&[ins(Opcode::Jmpi, &[5])]);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc(), 6);
        assert!(!cpu.at_end_of_image());
        assert_eq!(cpu.step(), Err(CpuFault::IllegalFetch { pc: 6, len: 1 }));
        assert_eq!(cpu.trap.code(), Some(TrapCode::Fatal));
    }

    #[test]
    fn test_end_of_image() {
        let mut cpu = cpu_with(&[Instruction::nop(), Instruction::nop()]);
        run_all(&mut cpu);
        assert!(cpu.at_end_of_image());
        assert_eq!(cpu.regs.pc(), 2);
    }

    proptest! {
        #[test]
        fn divide_by_zero_never_assigns(dest in 1i32..32, start in any::<i32>()) {
            let mut cpu = cpu_with(&[ins(Opcode::Div, &[dest, 0, 31])]);
            cpu.regs.set(dest, start).unwrap();
            cpu.regs.set(31, 0).unwrap();
            prop_assert!(cpu.step().is_err());
            prop_assert_eq!(cpu.regs.get(dest), Some(if dest == 31 { 0 } else { start }));
            prop_assert_eq!(cpu.trap, TrapLine::new(TrapCode::Fatal, 0, 0));
        }
    }
}
