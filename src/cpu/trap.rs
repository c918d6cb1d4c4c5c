//! Trap lines.
//!
//! Every hardware component owns one trap line: three words used to signal
//! an interrupt (`number`), pass a payload (`data`) and report a failed
//! operation (`status`).

use crate::isa::TrapCode;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapLine {
    /// What happened. Zero means nothing is pending.
    pub number: i32,
    /// Payload, meaning depends on `number`.
    pub data: i32,
    /// Zero if OK, non-zero if the signalled operation failed.
    pub status: i32,
}

impl TrapLine {
    pub const fn idle() -> Self {
        Self { number: 0, data: 0, status: 0 }
    }

    pub const fn new(code: TrapCode, data: i32, status: i32) -> Self {
        Self { number: code.to_i32(), data, status }
    }

    /// Set the line to `code` with the given data and an OK status.
    pub fn raise(&mut self, code: TrapCode, data: i32) {
        *self = Self::new(code, data, 0);
    }

    pub fn clear(&mut self) {
        *self = Self::idle();
    }

    #[inline]
    pub const fn is_idle(&self) -> bool {
        self.number == 0
    }

    /// The pending trap, if the number is a known code.
    pub const fn code(&self) -> Option<TrapCode> {
        TrapCode::from_i32(self.number)
    }
}
