//! Line parser for streamed changes feeds.
//!
//! A continuous `_changes` (or `_db_updates`) response is a sequence of JSON
//! objects, one per line. While nothing happens the server keeps the
//! connection alive by sending bare newlines ("heartbeats").
//!
//! Network chunks do not respect line boundaries, so the parser buffers bytes
//! until a `\n` arrives and yields one [`FeedLine`] per complete line:
//!
//! ```text
//! chunk 1: {"seq":1,"id":"a","changes":[...]}\n{"seq":2,"id
//! chunk 2: ":"b","changes":[...]}\n\n
//!          └── Message(seq 1) ── Message(seq 2) ── Heartbeat
//! ```
//!
//! # Examples
//!
//! ```
//! use couchdb_http::client::{FeedLine, LineParser};
//!
//! let mut parser = LineParser::new();
//! assert!(parser.feed(b"{\"seq\":1,\"id").unwrap().is_empty());
//!
//! let lines = parser.feed(b"\":\"a\"}\n\n").unwrap();
//! assert_eq!(lines.len(), 2);
//! assert!(matches!(lines[0], FeedLine::Message(_)));
//! assert_eq!(lines[1], FeedLine::Heartbeat);
//! ```

use crate::error::{CouchError, Result};
use bytes::BytesMut;
use serde_json::Value;

/// One complete line of a feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedLine {
    /// Empty keep-alive line
    Heartbeat,
    /// A JSON event
    Message(Value),
}

/// Incremental newline-delimited JSON parser.
#[derive(Debug)]
pub struct LineParser {
    /// Bytes received but not yet terminated by a newline
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no newline
    scanned: usize,
}

impl LineParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        LineParser {
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
        }
    }

    /// Feed a chunk and return every line it completes.
    ///
    /// A line that is not valid JSON fails the whole chunk; the parser state
    /// after an error is unspecified.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<FeedLine>> {
        self.buffer.extend_from_slice(data);
        let mut lines = Vec::new();

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = self.buffer.split_to(end + 1);
            self.scanned = 0;
            lines.push(parse_line(&line[..end])?);
        }
        self.scanned = self.buffer.len();

        Ok(lines)
    }

    /// Flush a final line the server did not terminate.
    ///
    /// Whitespace-only leftovers are dropped rather than reported as a heartbeat.
    pub fn finish(&mut self) -> Result<Option<FeedLine>> {
        let rest = self.buffer.split();
        self.scanned = 0;
        if rest.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        parse_line(&rest).map(Some)
    }

    /// Number of buffered bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(line: &[u8]) -> Result<FeedLine> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(FeedLine::Heartbeat);
    }
    serde_json::from_slice(line)
        .map(FeedLine::Message)
        .map_err(|e| CouchError::Unexpected(format!("invalid feed line: {}", e)))
}
