//! Assembler for RMMIX job files.
//!
//! Syntax:
//! ```text
//! % Comment
//! $JOB countdown
//!         MOVI 1, 3
//! loop    TRAP putw, 1        % a leading non-mnemonic is a label
//!         SUBI 1, 1, 1
//!         BNEZ 1, loop        % label operands become relative offsets
//!         TRAP halt, 0
//! $RUN
//! 42                          % input words, decimal
//! $END
//! ```
//!
//! A label may also stand alone on a line; it then names the next
//! instruction. Operands are trap names, decimal numbers or labels.

use crate::isa::{Instruction, InstructionError, Opcode, TrapCode};
use crate::jdl::text::{self, Line, JOB, RUN};
use crate::jdl::{Segment, SourceError};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble a job file to object code text.
pub fn assemble(source: &str) -> Result<String, AssemblerError> {
    let segments = assemble_segments(source)?;
    Ok(super::write_object(&segments))
}

/// Assemble a job file to decoded segments.
pub fn assemble_segments(source: &str) -> Result<Vec<Segment>, AssemblerError> {
    let lines = text::clean_lines(source);
    let mut segments = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !lines[i].is_keyword(JOB) {
            i += 1;
            continue;
        }
        let name = lines[i].job_name()?;

        let code_end = text::next_control(&lines, i + 1);
        let code = Assembler::new(&lines[i + 1..code_end]).assemble()?;
        i = code_end;

        let mut input = None;
        if lines.get(i).is_some_and(|l| l.is_keyword(RUN)) {
            let input_end = text::next_control(&lines, i + 1);
            input = Some(
                lines[i + 1..input_end]
                    .iter()
                    .map(parse_input)
                    .collect::<Result<Vec<_>, _>>()?,
            );
            i = input_end;
        }

        segments.push(Segment { name, code, input });
    }

    Ok(segments)
}

fn parse_input(line: &Line) -> Result<i32, AssemblerError> {
    let mut tokens = line.tokens();
    match (tokens.next().map(str::parse::<i32>), tokens.next()) {
        (Some(Ok(value)), None) => Ok(value),
        _ => Err(line.malformed("expected one decimal word").into()),
    }
}

/// One instruction with its labels stripped.
struct Statement<'a> {
    line: usize,
    opcode: Opcode,
    operands: Vec<&'a str>,
}

/// The assembler state for one code section.
struct Assembler<'a> {
    lines: &'a [Line],
    /// Label -> instruction number.
    labels: HashMap<&'a str, usize>,
}

impl<'a> Assembler<'a> {
    fn new(lines: &'a [Line]) -> Self {
        Self {
            lines,
            labels: HashMap::new(),
        }
    }

    fn assemble(mut self) -> Result<Vec<Instruction>, AssemblerError> {
        // Pass 1: collect labels
        let statements = self.collect()?;

        // Pass 2: resolve operands
        statements
            .iter()
            .enumerate()
            .map(|(index, statement)| self.encode(index, statement))
            .collect()
    }

    fn collect(&mut self) -> Result<Vec<Statement<'a>>, AssemblerError> {
        let mut statements = Vec::new();
        let lines = self.lines;

        for line in lines {
            let mut tokens: Vec<&'a str> = line.tokens().collect();
            let first = tokens[0];

            if Opcode::from_mnemonic(first).is_none() {
                self.define(first, statements.len())?;
                tokens.remove(0);
                match tokens.first() {
                    None => continue,
                    Some(op) if Opcode::from_mnemonic(op).is_none() => {
                        return Err(AssemblerError::UnknownMnemonic {
                            line: line.number,
                            mnemonic: first.to_owned(),
                        });
                    }
                    Some(_) => {}
                }
            }

            let Some(opcode) = Opcode::from_mnemonic(tokens[0]) else {
                return Err(AssemblerError::UnknownMnemonic {
                    line: line.number,
                    mnemonic: tokens[0].to_owned(),
                });
            };
            statements.push(Statement {
                line: line.number,
                opcode,
                operands: tokens[1..].to_vec(),
            });
        }

        Ok(statements)
    }

    fn define(&mut self, label: &'a str, index: usize) -> Result<(), AssemblerError> {
        match self.labels.get(label) {
            Some(&first) if first != index => Err(SourceError::AmbiguousLabel {
                label: label.to_owned(),
                first,
                second: index,
            }
            .into()),
            Some(_) => Ok(()),
            None => {
                self.labels.insert(label, index);
                Ok(())
            }
        }
    }

    fn encode(&self, index: usize, statement: &Statement<'_>) -> Result<Instruction, AssemblerError> {
        let operands = statement
            .operands
            .iter()
            .map(|token| self.operand(token, index, statement.line))
            .collect::<Result<Vec<_>, _>>()?;

        Instruction::new(statement.opcode, &operands).map_err(|source| AssemblerError::Operands {
            line: statement.line,
            source,
        })
    }

    fn operand(&self, token: &str, index: usize, line: usize) -> Result<i32, AssemblerError> {
        if let Some(code) = TrapCode::from_name(token) {
            return Ok(code.to_i32());
        }
        if let Ok(value) = token.parse::<i32>() {
            return Ok(value);
        }
        match self.labels.get(token) {
            // Branches are relative to the instruction after this one.
            Some(&target) => Ok(target as i32 - (index as i32 + 1)),
            None => Err(SourceError::UndefinedLabel {
                line,
                label: token.to_owned(),
            }
            .into()),
        }
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {source}")]
    Operands {
        line: usize,
        #[source]
        source: InstructionError,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}
