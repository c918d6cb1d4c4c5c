//! Object code reader.
//!
//! Object files hold one or more job segments:
//!
//! ```text
//! $JOB adder      % code section, one instruction per line, hex fields
//! f 2 1
//! 3 3 1 2
//! $RUN            % input section, one hex word per line
//! 2a
//! $END
//! ```

use crate::isa::Instruction;
use crate::jdl::text::{self, Line, JOB, RUN};
use crate::jdl::{ProgramSource, SourceError};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Start,
    Code,
    CodeDone,
    Input,
    InputDone,
}

/// A [`ProgramSource`] over object code text.
#[derive(Debug, Clone)]
pub struct ObjectReader {
    origin: String,
    lines: Vec<Line>,
    pos: usize,
    section: Section,
    job_name: String,
    healthy: bool,
}

impl ObjectReader {
    /// Read an object file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_text(path.display().to_string(), &text))
    }

    /// Read object code held in memory. `origin` names it in messages.
    pub fn from_text(origin: impl Into<String>, text: &str) -> Self {
        Self {
            origin: origin.into(),
            lines: text::clean_lines(text),
            pos: 0,
            section: Section::Start,
            job_name: String::new(),
            healthy: true,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn fail(&mut self, err: SourceError) -> SourceError {
        self.healthy = false;
        err
    }

    /// The current line of an open section, or `None` when the section ends.
    /// A control line ends the section and is left for the next advance.
    fn section_line(&mut self, done: Section) -> Option<Line> {
        match self.lines.get(self.pos) {
            Some(line) if !line.is_control() => {
                self.pos += 1;
                Some(line.clone())
            }
            _ => {
                self.section = done;
                None
            }
        }
    }
}

impl ProgramSource for ObjectReader {
    fn advance_to_code_section(&mut self) -> Result<bool, SourceError> {
        if self.section == Section::Code {
            return Ok(true);
        }
        let found = self.lines[self.pos..].iter().position(|l| l.is_keyword(JOB));
        let Some(offset) = found else {
            self.pos = self.lines.len();
            return Ok(false);
        };

        let index = self.pos + offset;
        self.pos = index + 1;
        match self.lines[index].job_name() {
            Ok(name) => {
                self.job_name = name;
                self.section = Section::Code;
                Ok(true)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stops without consuming anything if another job begins first.
    fn advance_to_input_section(&mut self) -> Result<bool, SourceError> {
        if self.section == Section::Input {
            return Ok(true);
        }
        while let Some(line) = self.lines.get(self.pos) {
            if line.is_keyword(RUN) {
                self.pos += 1;
                self.section = Section::Input;
                return Ok(true);
            }
            if line.is_keyword(JOB) {
                return Ok(false);
            }
            self.pos += 1;
        }
        Ok(false)
    }

    fn next_instruction(&mut self) -> Result<Option<Instruction>, SourceError> {
        match self.section {
            Section::Code => {}
            Section::Start => {
                if !self.advance_to_code_section()? {
                    return Ok(None);
                }
            }
            _ => return Ok(None),
        }
        let Some(line) = self.section_line(Section::CodeDone) else {
            return Ok(None);
        };

        let mut fields = Vec::with_capacity(Instruction::MAX_FIELDS);
        for token in line.tokens() {
            match text::parse_hex(token) {
                Some(field) => fields.push(field),
                None => return Err(self.fail(line.malformed(format!("bad number {:?}", token)))),
            }
        }
        match Instruction::from_fields(&fields) {
            Ok(instr) => Ok(Some(instr)),
            Err(e) => Err(self.fail(line.malformed(e.to_string()))),
        }
    }

    fn next_input_value(&mut self) -> Result<Option<i32>, SourceError> {
        match self.section {
            Section::Input => {}
            Section::InputDone => return Ok(None),
            _ => {
                if !self.advance_to_input_section()? {
                    return Ok(None);
                }
            }
        }
        let Some(line) = self.section_line(Section::InputDone) else {
            return Ok(None);
        };

        let mut tokens = line.tokens();
        match (tokens.next().and_then(text::parse_hex), tokens.next()) {
            (Some(value), None) => Ok(Some(value)),
            _ => Err(self.fail(line.malformed("expected one hex word"))),
        }
    }

    fn job_name(&self) -> &str {
        &self.job_name
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.lines.len()
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }
}
