//! CPU emulation for the RMMIX machine.
//!
//! - 32 general purpose registers, register 0 is the PC
//! - 1024 words of data memory shared by all jobs
//! - instruction memory holding the image of the running job
//! - a three-field trap line for interrupts

pub mod memory;
pub mod registers;
pub mod trap;
pub mod execute;

pub use memory::{DataMemory, MemoryError, DATA_MEMORY_SIZE, INSTRUCTION_MEMORY_SIZE};
pub use registers::{RegisterFile, IDLE_PC, NUM_REGISTERS};
pub use trap::TrapLine;
pub use execute::{Cpu, CpuFault, CPU_DEVICE};
