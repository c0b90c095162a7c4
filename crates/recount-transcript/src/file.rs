use std::io::{BufRead, BufReader, Read};

use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::Result;
use crate::groups::{AssistantMessageGroup, build_groups};
use crate::schema::TranscriptLine;
use crate::validate::{LineValidationError, validate_line};

/// Hard per-line cap. Lines beyond this are recorded as validation errors and
/// skipped rather than buffered.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Initial scanner buffer; grows on demand up to [`MAX_LINE_BYTES`].
pub const INITIAL_BUFFER_BYTES: usize = 64 * 1024;

/// One schema-valid transcript line, with its raw parsed JSON retained for
/// analyzers that need to scan every string value (redaction markers).
#[derive(Debug, Clone)]
pub struct ParsedLine {
    /// 1-indexed position within the file, counting blank and invalid lines.
    pub number: usize,
    pub raw: Value,
    pub line: TranscriptLine,
}

/// A single append-only transcript: the main session log or one agent
/// sidechain log. Line order is preserved; invalid lines are collected as
/// errors and excluded from the typed list.
#[derive(Debug)]
pub struct TranscriptFile {
    /// Agent id for sidechain files, None for the main transcript.
    pub agent_id: Option<String>,
    pub lines: Vec<ParsedLine>,
    pub errors: Vec<LineValidationError>,
    groups: OnceCell<Vec<AssistantMessageGroup>>,
}

impl TranscriptFile {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    pub fn agent_from_bytes(agent_id: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let mut file = Self::from_bytes(bytes)?;
        file.agent_id = Some(agent_id.into());
        Ok(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = BufReader::with_capacity(INITIAL_BUFFER_BYTES, reader);
        let mut lines = Vec::new();
        let mut errors = Vec::new();
        let mut buf: Vec<u8> = Vec::with_capacity(INITIAL_BUFFER_BYTES);
        let mut number = 0usize;

        loop {
            buf.clear();
            number += 1;
            match read_capped_line(&mut reader, &mut buf)? {
                Scan::Eof => break,
                Scan::Oversized => {
                    errors.push(LineValidationError::new(
                        number,
                        "",
                        vec![crate::validate::FieldError {
                            path: String::new(),
                            expected: format!("line under {} bytes", MAX_LINE_BYTES),
                            received: "oversized line".to_string(),
                        }],
                    ));
                    continue;
                }
                Scan::Line => {}
            }

            let text = String::from_utf8_lossy(&buf);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(err) => {
                    errors.push(LineValidationError::invalid_json(number, trimmed, &err));
                    continue;
                }
            };

            let field_errors = validate_line(&value);
            if !field_errors.is_empty() {
                errors.push(LineValidationError::new(number, trimmed, field_errors));
                continue;
            }

            match serde_json::from_value::<TranscriptLine>(value.clone()) {
                Ok(line) => lines.push(ParsedLine {
                    number,
                    raw: value,
                    line,
                }),
                Err(err) => {
                    errors.push(LineValidationError::invalid_json(number, trimmed, &err));
                }
            }
        }

        Ok(Self {
            agent_id: None,
            lines,
            errors,
            groups: OnceCell::new(),
        })
    }

    /// Number of schema-valid lines in this file.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn typed_lines(&self) -> impl Iterator<Item = &TranscriptLine> {
        self.lines.iter().map(|p| &p.line)
    }

    /// Assistant lines deduplicated by `message.id`, in first-occurrence
    /// order. Computed on first call and cached; stable across reads.
    pub fn assistant_message_groups(&self) -> &[AssistantMessageGroup] {
        self.groups.get_or_init(|| build_groups(&self.lines))
    }
}

enum Scan {
    /// One line read into the buffer (possibly blank).
    Line,
    /// The line exceeded the cap; it was drained, the buffer is partial.
    Oversized,
    /// No further input.
    Eof,
}

/// Read one newline-terminated line into `buf`, enforcing the byte cap. An
/// oversized line is drained through its newline so the scanner stays
/// aligned on line boundaries.
fn read_capped_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Scan> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(if buf.is_empty() { Scan::Eof } else { Scan::Line });
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if buf.len() + pos <= MAX_LINE_BYTES {
                    buf.extend_from_slice(&available[..pos]);
                    reader.consume(pos + 1);
                    return Ok(Scan::Line);
                }
                reader.consume(pos + 1);
                return Ok(Scan::Oversized);
            }
            None => {
                let len = available.len();
                if buf.len() + len > MAX_LINE_BYTES {
                    reader.consume(len);
                    drain_to_newline(reader)?;
                    return Ok(Scan::Oversized);
                }
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

fn drain_to_newline<R: BufRead>(reader: &mut R) -> Result<()> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_and_skips_blanks() {
        let input = concat!(
            r#"{"type":"user","uuid":"u1","sessionId":"s1","message":{"content":"hi"}}"#,
            "\n\n",
            r#"{"type":"assistant","uuid":"a1","sessionId":"s1","message":{"id":"m1","model":"x","content":[],"usage":{"input_tokens":1,"output_tokens":1}}}"#,
            "\n",
        );
        let file = TranscriptFile::from_bytes(input.as_bytes()).unwrap();
        assert_eq!(file.line_count(), 2);
        assert!(file.errors.is_empty());
        assert_eq!(file.lines[0].number, 1);
        assert_eq!(file.lines[1].number, 3);
    }

    #[test]
    fn invalid_json_is_collected_not_fatal() {
        let input = concat!(
            "{not json}\n",
            r#"{"type":"user","uuid":"u1","sessionId":"s1","message":{"content":"hi"}}"#,
            "\n",
        );
        let file = TranscriptFile::from_bytes(input.as_bytes()).unwrap();
        assert_eq!(file.line_count(), 1);
        assert_eq!(file.errors.len(), 1);
        assert_eq!(file.errors[0].line, 1);
    }

    #[test]
    fn schema_violation_excludes_line() {
        let input = concat!(
            r#"{"type":"user","sessionId":"s1","message":{"content":"no uuid"}}"#,
            "\n",
            r#"{"type":"user","uuid":"u2","sessionId":"s1","message":{"content":"ok"}}"#,
            "\n",
        );
        let file = TranscriptFile::from_bytes(input.as_bytes()).unwrap();
        assert_eq!(file.line_count(), 1);
        assert_eq!(file.errors.len(), 1);
        assert_eq!(file.errors[0].errors[0].path, "uuid");
    }

    #[test]
    fn empty_input_yields_empty_file() {
        let file = TranscriptFile::from_bytes(b"").unwrap();
        assert_eq!(file.line_count(), 0);
        assert!(file.errors.is_empty());
        assert!(file.assistant_message_groups().is_empty());
    }

    #[test]
    fn final_line_without_newline_is_parsed() {
        let input = r#"{"type":"user","uuid":"u1","sessionId":"s1","message":{"content":"hi"}}"#;
        let file = TranscriptFile::from_bytes(input.as_bytes()).unwrap();
        assert_eq!(file.line_count(), 1);
    }

    #[test]
    fn oversized_line_is_skipped_with_error() {
        let big = format!(
            "{{\"type\":\"user\",\"uuid\":\"u1\",\"pad\":\"{}\"}}",
            "x".repeat(MAX_LINE_BYTES + 16)
        );
        let input = format!(
            "{}\n{}\n",
            big,
            r#"{"type":"user","uuid":"u2","sessionId":"s1","message":{"content":"after"}}"#
        );
        let file = TranscriptFile::from_bytes(input.as_bytes()).unwrap();
        assert_eq!(file.line_count(), 1);
        assert_eq!(file.errors.len(), 1);
        assert_eq!(file.errors[0].line, 1);
        assert_eq!(file.lines[0].number, 2);
    }

    #[test]
    fn groups_cache_is_stable() {
        let input = concat!(
            r#"{"type":"assistant","uuid":"a1","sessionId":"s1","message":{"id":"m1","model":"x","content":[{"type":"text","text":"t"}],"usage":{"input_tokens":1,"output_tokens":1}}}"#,
            "\n",
        );
        let file = TranscriptFile::from_bytes(input.as_bytes()).unwrap();
        let first = file.assistant_message_groups().as_ptr();
        let second = file.assistant_message_groups().as_ptr();
        assert_eq!(first, second);
    }
}
