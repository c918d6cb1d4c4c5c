//! Operation and trap codes for the RMMIX machine.
//!
//! Both tables are closed: the numeric value of every member is the value
//! stored in object files, and anything outside the tables is rejected at
//! decode time.

use serde::{Serialize, Deserialize};
use std::fmt;

/// RMMIX operation codes.
///
/// Suffix `I` marks the immediate form: the last operand is a literal
/// rather than a register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Misc ====================

    /// Do nothing.
    Nop = 0x0,

    // ==================== Arithmetic ====================

    /// r1 := r2
    Mov = 0x1,
    /// r1 := k
    Movi = 0x2,
    /// r1 := r2 + r3
    Add = 0x3,
    /// r1 := r2 + k
    Addi = 0x4,
    /// r1 := r2 - r3
    Sub = 0x5,
    /// r1 := r2 - k
    Subi = 0x6,
    /// r1 := r2 * r3
    Mul = 0x7,
    /// r1 := r2 * k
    Muli = 0x8,
    /// r1 := r2 / r3, FATAL on a zero divisor
    Div = 0x9,
    /// r1 := r2 / k, FATAL on a zero divisor
    Divi = 0xa,

    // ==================== Control Flow ====================

    /// PC += k
    Jmpi = 0xb,
    /// if r == 0 then PC += k
    Beqzi = 0xc,
    /// if r != 0 then PC += k
    Bnezi = 0xd,
    /// if r < 0 then PC += k
    Bnegi = 0xe,
    /// Raise trap n with data d.
    Trap = 0xf,

    // ==================== Data Memory ====================

    /// r := mem[a]
    Ldwi = 0x10,
    /// r1 := mem[r2]
    Ldw = 0x11,
    /// mem[a] := r
    Stwi = 0x12,
    /// mem[r2] := r1
    Stw = 0x13,
}

impl Opcode {
    /// Every opcode, in numeric order.
    pub const ALL: [Opcode; 20] = [
        Opcode::Nop, Opcode::Mov, Opcode::Movi, Opcode::Add, Opcode::Addi,
        Opcode::Sub, Opcode::Subi, Opcode::Mul, Opcode::Muli, Opcode::Div,
        Opcode::Divi, Opcode::Jmpi, Opcode::Beqzi, Opcode::Bnezi, Opcode::Bnegi,
        Opcode::Trap, Opcode::Ldwi, Opcode::Ldw, Opcode::Stwi, Opcode::Stw,
    ];

    /// Decode a raw opcode value.
    pub fn from_i32(value: i32) -> Option<Self> {
        usize::try_from(value).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// The raw value used in object code.
    #[inline]
    pub const fn to_i32(self) -> i32 {
        self as i32
    }

    /// Number of operands this opcode takes (0 to 3).
    pub const fn operand_count(self) -> usize {
        match self {
            Opcode::Nop => 0,
            Opcode::Jmpi => 1,
            Opcode::Mov | Opcode::Movi
            | Opcode::Beqzi | Opcode::Bnezi | Opcode::Bnegi
            | Opcode::Trap
            | Opcode::Ldwi | Opcode::Ldw | Opcode::Stwi | Opcode::Stw => 2,
            Opcode::Add | Opcode::Addi | Opcode::Sub | Opcode::Subi
            | Opcode::Mul | Opcode::Muli | Opcode::Div | Opcode::Divi => 3,
        }
    }

    /// Assembly mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Mov => "MOV",
            Opcode::Movi => "MOVI",
            Opcode::Add => "ADD",
            Opcode::Addi => "ADDI",
            Opcode::Sub => "SUB",
            Opcode::Subi => "SUBI",
            Opcode::Mul => "MUL",
            Opcode::Muli => "MULI",
            Opcode::Div => "DIV",
            Opcode::Divi => "DIVI",
            Opcode::Jmpi => "JMPI",
            Opcode::Beqzi => "BEQZI",
            Opcode::Bnezi => "BNEZI",
            Opcode::Bnegi => "BNEGI",
            Opcode::Trap => "TRAP",
            Opcode::Ldwi => "LDWI",
            Opcode::Ldw => "LDW",
            Opcode::Stwi => "STWI",
            Opcode::Stw => "STW",
        }
    }

    /// Look up a mnemonic, including the branch pseudo-ops
    /// `JMP`, `BEQZ`, `BNEZ` and `BNEG`.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        match name {
            "JMP" => Some(Opcode::Jmpi),
            "BEQZ" => Some(Opcode::Beqzi),
            "BNEZ" => Some(Opcode::Bnezi),
            "BNEG" => Some(Opcode::Bnegi),
            _ => Self::ALL.iter().copied().find(|op| op.mnemonic() == name),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Trap (interrupt) numbers.
///
/// The first three are raised by programs through `TRAP`; the rest are
/// raised by the hardware itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum TrapCode {
    /// Job ends voluntarily; data names the register holding the status.
    Halt = 1,
    /// Request one input word into the register named by data.
    Getw = 2,
    /// Request output of the register named by data.
    Putw = 3,
    /// Unrecoverable job-local error.
    Fatal = 65,
    /// Input device finished; data is the device number.
    GetwReady = 66,
    /// Output device finished; data is the device number.
    PutwReady = 67,
}

impl TrapCode {
    /// Decode a trap number. Zero (no trap) and unknown values give `None`.
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(TrapCode::Halt),
            2 => Some(TrapCode::Getw),
            3 => Some(TrapCode::Putw),
            65 => Some(TrapCode::Fatal),
            66 => Some(TrapCode::GetwReady),
            67 => Some(TrapCode::PutwReady),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_i32(self) -> i32 {
        self as i32
    }

    /// Symbolic name accepted by the assembler.
    pub const fn name(self) -> &'static str {
        match self {
            TrapCode::Halt => "halt",
            TrapCode::Getw => "getw",
            TrapCode::Putw => "putw",
            TrapCode::Fatal => "FATAL",
            TrapCode::GetwReady => "GETW_READY",
            TrapCode::PutwReady => "PUTW_READY",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            TrapCode::Halt, TrapCode::Getw, TrapCode::Putw,
            TrapCode::Fatal, TrapCode::GetwReady, TrapCode::PutwReady,
        ]
        .into_iter()
        .find(|code| code.name() == name)
    }
}

impl fmt::Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
