//! Event stream frame parser
//!
//! Splits the raw byte stream into lines and groups `event:` / `data:` lines
//! into records terminated by a blank line.

use bytes::BytesMut;
use tracing::{trace, warn};

/// Label of the line that names the current record
pub const EVENT_NAME_LABEL: &[u8] = b"event:";
/// Label of a line carrying a payload fragment
pub const EVENT_DATA_LABEL: &[u8] = b"data:";

/// Longest unterminated line kept in memory; longer lines are dropped
/// together with the record they belong to
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// A completed record, before JSON decoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Value of the last `event:` line (trimmed), empty if none was seen
    pub name: String,
    /// All `data:` fragments joined in arrival order
    pub data: String,
}

/// Incremental parser state
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Bytes of a line whose terminator has not arrived yet
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for a terminator
    scanned: usize,
    /// Discarding the rest of an oversized line
    skipping: bool,
    /// Current record lost a line and will not be dispatched
    truncated: bool,
    /// Name of the record being accumulated
    name: String,
    /// Partial record buffer for `data:` fragments
    data: Vec<u8>,
}

impl FrameParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and collect every record it completes
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Record> {
        let mut records = Vec::new();

        self.buffer.extend_from_slice(bytes);

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            if std::mem::take(&mut self.skipping) {
                continue;
            }

            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if let Some(record) = self.process_line(line) {
                records.push(record);
            }
        }

        if self.skipping {
            self.buffer.clear();
        } else if self.buffer.len() > MAX_LINE_LENGTH {
            warn!(len = self.buffer.len(), "Dropping oversized stream line");
            self.buffer.clear();
            self.skipping = true;
            self.truncated = true;
        }
        self.scanned = self.buffer.len();

        records
    }

    /// Whether a record (or a line of one) is partially buffered
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || self.skipping || !self.data.is_empty() || !self.name.is_empty()
    }

    fn process_line(&mut self, line: &[u8]) -> Option<Record> {
        if line.is_empty() {
            return self.finish_record();
        }

        if let Some(value) = line.strip_prefix(EVENT_NAME_LABEL) {
            self.name = String::from_utf8_lossy(value).trim().to_string();
        } else if let Some(value) = line.strip_prefix(EVENT_DATA_LABEL) {
            let value = value.strip_prefix(b" ").unwrap_or(value);
            self.data.extend_from_slice(value);
        } else {
            // `:ok` greeting, comments and fields we don't use
            trace!(line = %String::from_utf8_lossy(line), "Ignoring stream line");
        }

        None
    }

    /// Close the current record; a blank line with no data is a keep-alive
    fn finish_record(&mut self) -> Option<Record> {
        let name = std::mem::take(&mut self.name);
        let data = std::mem::take(&mut self.data);

        if std::mem::take(&mut self.truncated) {
            warn!(event = %name, "Dropping record with an oversized line");
            return None;
        }

        if data.is_empty() {
            trace!("Keep-alive");
            return None;
        }

        let data = match String::from_utf8(data) {
            Ok(data) => data,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        Some(Record { name, data })
    }
}
