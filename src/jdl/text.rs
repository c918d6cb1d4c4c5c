//! Line-level lexing shared by the object reader and the assembler.

use crate::jdl::SourceError;

pub const JOB: &str = "$JOB";
pub const RUN: &str = "$RUN";
pub const END: &str = "$END";

const COMMENT: char = '%';

/// A cleaned, non-blank source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number in the source text.
    pub number: usize,
    pub text: String,
}

impl Line {
    pub fn tokens(&self) -> std::str::SplitWhitespace<'_> {
        self.text.split_whitespace()
    }

    /// Any job control line (`$` in the first column).
    pub fn is_control(&self) -> bool {
        self.text.starts_with('$')
    }

    /// A job control line whose keyword is `keyword`.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.is_control() && self.tokens().next() == Some(keyword)
    }

    /// The job name of a `$JOB` line.
    pub fn job_name(&self) -> Result<String, SourceError> {
        self.tokens()
            .nth(1)
            .map(str::to_owned)
            .ok_or(SourceError::MissingJobName { line: self.number })
    }

    pub fn malformed(&self, message: impl Into<String>) -> SourceError {
        SourceError::Malformed {
            line: self.number,
            message: message.into(),
        }
    }
}

/// Strip comments, turn commas into spaces, trim, and drop blank lines.
pub fn clean_lines(text: &str) -> Vec<Line> {
    text.lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let code = raw.split(COMMENT).next().unwrap_or("");
            let cleaned = code.replace(',', " ");
            let cleaned = cleaned.trim();
            (!cleaned.is_empty()).then(|| Line {
                number: i + 1,
                text: cleaned.to_owned(),
            })
        })
        .collect()
}

/// Index of the first control line at or after `from`, or `lines.len()`.
pub fn next_control(lines: &[Line], from: usize) -> usize {
    lines[from.min(lines.len())..]
        .iter()
        .position(Line::is_control)
        .map_or(lines.len(), |offset| from + offset)
}

/// Parse a number in object code notation: hexadecimal, optional `-`.
pub fn parse_hex(token: &str) -> Option<i32> {
    i32::from_str_radix(token, 16).ok()
}

/// Format a number in object code notation.
pub fn format_hex(value: i32) -> String {
    if value < 0 {
        format!("-{:x}", value.unsigned_abs())
    } else {
        format!("{:x}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_lines() {
        let lines = clean_lines("  % header\n\n  ADDI 1,2,3  % add\n$JOB  demo \n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], Line { number: 3, text: "ADDI 1 2 3".into() });
        assert!(lines[1].is_keyword(JOB));
        assert_eq!(lines[1].job_name().unwrap(), "demo");
    }

    #[test]
    fn test_control_keywords() {
        let lines = clean_lines("$RUN\n$RUNNER\n1\n$JOB\n");
        assert!(lines[0].is_keyword(RUN));
        assert!(!lines[1].is_keyword(RUN));
        assert!(lines[1].is_control());
        assert_eq!(next_control(&lines, 2), 3);
        assert_eq!(next_control(&lines, 4), 4);
        assert!(matches!(
            lines[3].job_name(),
            Err(SourceError::MissingJobName { line: 4 })
        ));
    }

    #[test]
    fn test_hex_notation() {
        assert_eq!(parse_hex("2a"), Some(42));
        assert_eq!(parse_hex("-2a"), Some(-42));
        assert_eq!(parse_hex("-80000000"), Some(i32::MIN));
        assert_eq!(parse_hex("zz"), None);
        assert_eq!(format_hex(-42), "-2a");
        assert_eq!(format_hex(i32::MIN), "-80000000");
        assert_eq!(format_hex(15), "f");
    }
}
