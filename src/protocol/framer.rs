//! # Heuristic JSON framing over a child's stdout.
//!
//! Children write three kinds of output to stdout without any length prefix or
//! delimiter: human-readable log text, single-line commands, and JSON objects
//! that may arrive split across several reads. [`Framer`] tells them apart:
//!
//! ```text
//! chunk starts with '{'   → discard partial buffer, start a new message
//! reading                 → append chunk
//! chunk ends with '}'     → (and braces balance) decode buffer → Frame::Message
//!   (trailing CR/LF ignored)                                  or Frame::Malformed
//! otherwise, not reading  → Frame::Text (command or passthrough)
//! ```
//!
//! On top of the first/last character heuristic the framer tracks brace depth
//! outside string literals, so an inner chunk such as `{"a":{"b":1}` does not
//! close the message early.
//!
//! ## Limitations
//! - A chunk that mixes log text and JSON (`"log line\n{...}"`) is text.
//! - The closing check ignores trailing `\r`/`\n`, so `{...}\n` closes a
//!   message even though its last character is not `}`.
//! - A JSON object whose final chunk does not end in `}` stays pending until
//!   the next chunk starting with `{` discards it.
//!
//! One framer exists per role, so interleaved output from the two children
//! never shares a buffer.

use serde_json::Value;

/// Result of feeding one chunk to the [`Framer`].
#[derive(Debug, PartialEq)]
pub enum Frame {
    /// The chunk is not part of a framed message.
    Text(String),
    /// The chunk was buffered; the message is not complete yet.
    Pending,
    /// A complete message was decoded.
    Message(Value),
    /// A complete message failed to decode and was discarded.
    Malformed(String),
}

/// Incremental brace scanner, aware of JSON string literals.
#[derive(Debug, Default, Clone, Copy)]
struct BraceScan {
    depth: i64,
    in_string: bool,
    escaped: bool,
}

impl BraceScan {
    fn feed(&mut self, chunk: &str) {
        for c in chunk.chars() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match c {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
        }
    }

    fn closed(&self) -> bool {
        !self.in_string && self.depth <= 0
    }
}

/// Per-role assembly buffer.
#[derive(Debug, Default)]
pub struct Framer {
    contents: String,
    reading: bool,
    scan: BraceScan,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a message is being assembled.
    #[cfg(test)]
    fn is_reading(&self) -> bool {
        self.reading
    }

    /// Bytes currently buffered.
    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.contents.len()
    }

    /// Classifies one chunk of child output.
    pub fn push(&mut self, chunk: &str) -> Frame {
        if chunk.starts_with('{') {
            if self.reading {
                tracing::debug!(
                    discarded = self.contents.len(),
                    "new message started; discarding partial frame"
                );
            }
            self.contents.clear();
            self.scan = BraceScan::default();
            self.reading = true;
        } else if !self.reading {
            return Frame::Text(chunk.to_owned());
        }

        self.contents.push_str(chunk);
        self.scan.feed(chunk);

        let ends_with_close = chunk.trim_end_matches(['\r', '\n']).ends_with('}');
        if !(ends_with_close && self.scan.closed()) {
            return Frame::Pending;
        }

        self.reading = false;
        self.scan = BraceScan::default();
        let text = std::mem::take(&mut self.contents);
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Frame::Message(value),
            Err(e) => Frame::Malformed(e.to_string()),
        }
    }
}
