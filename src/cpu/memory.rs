//! RMMIX data memory.
//!
//! A single array of 1024 words. It belongs to the CPU, not to a job, so
//! every job reads and writes the same cells.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The number of data memory words.
pub const DATA_MEMORY_SIZE: usize = 1024;

/// The maximum number of instructions in one job image.
pub const INSTRUCTION_MEMORY_SIZE: usize = 1024;

/// RMMIX data memory: 1024 signed words.
#[derive(Clone, Serialize, Deserialize)]
pub struct DataMemory {
    cells: Vec<i32>,
}

impl DataMemory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; DATA_MEMORY_SIZE],
        }
    }

    /// Read a word by address.
    pub fn read(&self, addr: i32) -> Result<i32, MemoryError> {
        let index = Self::index(addr)?;
        Ok(self.cells[index])
    }

    /// Write a word by address.
    pub fn write(&mut self, addr: i32, value: i32) -> Result<(), MemoryError> {
        let index = Self::index(addr)?;
        self.cells[index] = value;
        Ok(())
    }

    fn index(addr: i32) -> Result<usize, MemoryError> {
        usize::try_from(addr)
            .ok()
            .filter(|&i| i < DATA_MEMORY_SIZE)
            .ok_or(MemoryError::AddressOutOfRange(addr))
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, i32)> {
        let end = start.saturating_add(count).min(DATA_MEMORY_SIZE);
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }
}

impl Default for DataMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|cell| **cell != 0).count();

        f.debug_struct("DataMemory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &DATA_MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address is outside valid memory range.
    #[error("data address {0} out of range (0 to 1023)")]
    AddressOutOfRange(i32),
}
