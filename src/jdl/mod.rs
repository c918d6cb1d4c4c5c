//! Job description language (JDL).
//!
//! Programs reach the machine as JDL text: job control lines (`$JOB`,
//! `$RUN`, `$END`) split a file into code and input sections. Two dialects
//! exist: assembly (mnemonics, labels, decimal numbers) and object code
//! (numeric fields in hex). The simulator only reads object code, through
//! the [`ProgramSource`] trait.

mod text;
mod reader;
mod assembler;
mod disasm;

pub use reader::ObjectReader;
pub use assembler::{assemble, assemble_segments, AssemblerError};
pub use disasm::{disassemble, disassemble_instruction};

use crate::isa::Instruction;
use std::path::PathBuf;
use thiserror::Error;

/// A stream of decoded instructions and input words, split into job
/// segments.
pub trait ProgramSource {
    /// Move past the next `$JOB` line. `Ok(false)` if there is none.
    fn advance_to_code_section(&mut self) -> Result<bool, SourceError>;

    /// Move past the next `$RUN` line. `Ok(false)` if there is none.
    fn advance_to_input_section(&mut self) -> Result<bool, SourceError>;

    /// The next instruction, `Ok(None)` once the code section ends.
    fn next_instruction(&mut self) -> Result<Option<Instruction>, SourceError>;

    /// The next input word, `Ok(None)` once the input section ends.
    fn next_input_value(&mut self) -> Result<Option<i32>, SourceError>;

    /// Name from the most recent `$JOB` line.
    fn job_name(&self) -> &str;

    fn is_at_end(&self) -> bool;

    /// False once a read has failed.
    fn is_healthy(&self) -> bool;
}

/// Errors reading JDL text.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("ambiguous label {label}: can mean instruction {first} or {second}")]
    AmbiguousLabel { label: String, first: usize, second: usize },

    #[error("line {line}: undefined label {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("line {line}: could not find job name")]
    MissingJobName { line: usize },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One job segment: code plus its input words.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub name: String,
    pub code: Vec<Instruction>,
    /// `None` when the segment has no `$RUN` section.
    pub input: Option<Vec<i32>>,
}

/// Drain every segment from a source.
pub fn read_segments(source: &mut dyn ProgramSource) -> Result<Vec<Segment>, SourceError> {
    let mut segments = Vec::new();
    while source.advance_to_code_section()? {
        let mut segment = Segment {
            name: source.job_name().to_owned(),
            ..Segment::default()
        };
        while let Some(instr) = source.next_instruction()? {
            segment.code.push(instr);
        }
        if source.advance_to_input_section()? {
            let mut input = Vec::new();
            while let Some(value) = source.next_input_value()? {
                input.push(value);
            }
            segment.input = Some(input);
        }
        segments.push(segment);
    }
    Ok(segments)
}

/// Render segments as object code text.
pub fn write_object(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push_str(text::JOB);
        out.push(' ');
        out.push_str(&segment.name);
        out.push('\n');
        for instr in &segment.code {
            let fields: Vec<String> = instr.fields().into_iter().map(text::format_hex).collect();
            out.push_str(&fields.join(" "));
            out.push('\n');
        }
        if let Some(input) = &segment.input {
            out.push_str(text::RUN);
            out.push('\n');
            for value in input {
                out.push_str(&text::format_hex(*value));
                out.push('\n');
            }
            out.push_str(text::END);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Opcode;

    #[test]
    fn test_object_text_reads_back() {
        let segments = vec![
            Segment {
                name: "one".into(),
                code: vec![
                    Instruction::new(Opcode::Movi, &[1, -300]).unwrap(),
                    Instruction::new(Opcode::Trap, &[1, 1]).unwrap(),
                ],
                input: Some(vec![7, -8]),
            },
            Segment {
                name: "two".into(),
                code: vec![Instruction::nop()],
                input: None,
            },
        ];
        let text = write_object(&segments);
        assert!(text.starts_with("$JOB one\n2 1 -12c\nf 1 1\n$RUN\n7\n-8\n$END\n"));

        let mut reader = ObjectReader::from_text("mem", &text);
        assert_eq!(read_segments(&mut reader).unwrap(), segments);
    }
}
