//! Disassembler for RMMIX object code.
//!
//! The listing is itself valid assembly: feeding it back to the assembler
//! gives the same object code.

use crate::isa::Instruction;
use crate::jdl::text::{self, END, JOB, RUN};
use crate::jdl::{read_segments, ProgramSource, SourceError};

/// Disassemble a single instruction to text, with its raw fields.
pub fn disassemble_instruction(addr: usize, instr: &Instruction) -> String {
    let raw: Vec<String> = instr.fields().into_iter().map(text::format_hex).collect();
    format!("    {:<20} % {:03}: {}", instr.to_string(), addr, raw.join(" "))
}

/// Disassemble every segment of a source.
pub fn disassemble(source: &mut dyn ProgramSource) -> Result<String, SourceError> {
    let mut output = String::new();
    output.push_str("% RMMIX Disassembly\n");
    output.push_str("% -----------------\n");

    for segment in read_segments(source)? {
        output.push_str(&format!("{} {}\n", JOB, segment.name));
        for (addr, instr) in segment.code.iter().enumerate() {
            output.push_str(&disassemble_instruction(addr, instr));
            output.push('\n');
        }
        if let Some(input) = segment.input {
            output.push_str(RUN);
            output.push('\n');
            for value in input {
                output.push_str(&format!("{}\n", value));
            }
            output.push_str(END);
            output.push('\n');
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Opcode;
    use crate::jdl::{assemble, ObjectReader};

    #[test]
    fn test_disassemble_instruction() {
        let trap = Instruction::new(Opcode::Trap, &[1, 4]).unwrap();
        let line = disassemble_instruction(7, &trap);
        assert!(line.contains("TRAP halt 4"));
        assert!(line.contains("% 007: f 1 4"));
    }

    #[test]
    fn test_listing_reassembles() {
        let object = "$JOB echo\nf 2 1\nf 3 1\nd 1 -3\nf 1 0\n$RUN\n2a\n-1\n$END\n";
        let mut reader = ObjectReader::from_text("mem", object);
        let listing = disassemble(&mut reader).unwrap();

        assert!(listing.contains("BNEZI 1 -3"));
        assert!(listing.contains("\n42\n-1\n"));
        assert_eq!(assemble(&listing).unwrap(), object);
    }
}
