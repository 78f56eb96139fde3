//! Incremental record extraction from streaming response bodies
//!
//! Splits a live byte stream into complete JSON records without waiting for
//! the body to end. Chunks may arrive at arbitrary boundaries, including
//! mid-record. Two framings are supported, chosen once per session from the
//! response content type:
//! - NDJSON: one JSON object per newline-terminated line
//! - JSON values: successive top-level objects without explicit separators,
//!   found by a string-aware bracket-matching single pass

use crate::errors::{OllamaError, Result};

/// Maximum bytes buffered while waiting for a record boundary (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// One decoded record boundary from a response body
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Raw bytes of the record, exactly as received
    pub payload: Vec<u8>,
    /// Zero-based position of the record in the stream
    pub index: usize,
}

/// Wire framing of a streaming response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFraming {
    /// One JSON object per newline-terminated line (`application/x-ndjson`)
    NdJson,
    /// Successive top-level JSON values (`application/json`)
    JsonValues,
}

impl RecordFraming {
    /// Select the framing for a response content type, if supported.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if content_type.contains("application/x-ndjson") {
            Some(Self::NdJson)
        } else if content_type.contains("application/json") {
            Some(Self::JsonValues)
        } else {
            None
        }
    }
}

/// Incremental decoder turning byte chunks into [`RawRecord`]s
///
/// Single pass over a live body: records are drained as soon as their
/// closing boundary arrives, and the decoder is not restartable.
#[derive(Debug)]
pub struct RecordDecoder {
    framing: RecordFraming,
    buffer: Vec<u8>,
    emitted: usize,
}

impl RecordDecoder {
    pub fn new(framing: RecordFraming) -> Self {
        Self {
            framing,
            buffer: Vec::with_capacity(4096),
            emitted: 0,
        }
    }

    /// Append a chunk and drain every record it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<RawRecord>> {
        if self.buffer.len() + chunk.len() > MAX_BUFFER_SIZE {
            return Err(OllamaError::Decode {
                index: self.emitted,
                message: format!(
                    "record exceeds {} byte buffer without a boundary",
                    MAX_BUFFER_SIZE
                ),
                record: String::new(),
            });
        }
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        loop {
            let next = match self.framing {
                RecordFraming::NdJson => self.next_line(),
                RecordFraming::JsonValues => self.next_value()?,
            };
            match next {
                Some(record) => records.push(record),
                None => break,
            }
        }
        Ok(records)
    }

    /// Flush whatever remains once the body has ended.
    ///
    /// A non-blank tail becomes one final record: a last NDJSON line may
    /// legally arrive without its newline, and a truncated JSON value must
    /// surface as a decode failure in the typed parse rather than vanish.
    pub fn finish(&mut self) -> Option<RawRecord> {
        if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
            self.buffer.clear();
            return None;
        }
        let payload = std::mem::take(&mut self.buffer);
        Some(self.record(payload))
    }

    /// Bytes currently buffered awaiting a boundary
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next newline-terminated line, skipping blank lines.
    fn next_line(&mut self) -> Option<RawRecord> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            return Some(self.record(line));
        }
        None
    }

    /// Next complete top-level JSON object, located by bracket matching.
    ///
    /// Braces inside strings and escaped quotes are ignored; a closing brace
    /// with no open object is a decode error.
    fn next_value(&mut self) -> Result<Option<RawRecord>> {
        let mut depth: u32 = 0;
        let mut start: Option<usize> = None;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, &byte) in self.buffer.iter().enumerate() {
            if escape_next {
                escape_next = false;
                continue;
            }
            if in_string {
                match byte {
                    b'\\' => escape_next = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                b'}' => {
                    if depth == 0 {
                        return Err(OllamaError::Decode {
                            index: self.emitted,
                            message: "unbalanced closing brace".to_string(),
                            record: String::from_utf8_lossy(&self.buffer).into_owned(),
                        });
                    }
                    depth -= 1;
                    if depth == 0 {
                        let first = start.unwrap_or(0);
                        let value: Vec<u8> = self.buffer.drain(..=i).skip(first).collect();
                        return Ok(Some(self.record(value)));
                    }
                }
                _ => {}
            }
        }

        Ok(None)
    }

    fn record(&mut self, payload: Vec<u8>) -> RawRecord {
        let index = self.emitted;
        self.emitted += 1;
        RawRecord { payload, index }
    }
}
