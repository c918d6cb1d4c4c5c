//! # RMMIX Simulator
//!
//! A cycle-stepped emulator of the RMMIX register machine, its
//! word-at-a-time I/O devices, and a small multiprogramming operating
//! system that shares one CPU between several jobs.
//!
//! Programs are written in the job description language (see [`jdl`]):
//! assembled to object text, then loaded by the OS one `$JOB` segment at a
//! time. The [`Simulator`] advances every component on a global clock.

pub mod isa;
pub mod cpu;
pub mod hw;
pub mod jdl;
pub mod os;
pub mod config;
pub mod sim;

// Re-export commonly used types
pub use isa::{Instruction, InstructionError, Opcode, TrapCode};
pub use cpu::{Cpu, CpuFault, DataMemory, RegisterFile, TrapLine};
pub use hw::{Component, Hardware, HardwareError, TickEvent};
pub use jdl::{assemble, disassemble, AssemblerError, ObjectReader, ProgramSource, SourceError};
pub use os::{BootError, Flow, Job, JobOutcome, JobSummary, Os, OsError};
pub use config::{ConfigError, SimConfig};
pub use sim::{RunReport, Simulator};
