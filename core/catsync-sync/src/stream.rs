//! Incremental parsing of newline-delimited JSON response bodies.

use crate::error::{SyncError, SyncResult};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

/// A lazy, finite sequence of records read from an NDJSON body.
///
/// Only the bytes of the line being assembled are buffered. Blank lines are
/// skipped; a trailing line without a newline is still parsed. After a
/// transport error the stream yields that error once and then ends.
pub struct RecordStream {
    resource: String,
    body: BoxStream<'static, SyncResult<Bytes>>,
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    line: usize,
    exhausted: bool,
}

impl RecordStream {
    /// Wraps a stream of body chunks.
    pub fn new(
        resource: impl Into<String>,
        body: impl Stream<Item = SyncResult<Bytes>> + Send + 'static,
    ) -> Self {
        Self {
            resource: resource.into(),
            body: body.boxed(),
            buffer: BytesMut::new(),
            scanned: 0,
            line: 0,
            exhausted: false,
        }
    }

    /// Builds a stream over in-memory chunks.
    pub fn from_chunks<I, C>(resource: impl Into<String>, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        let chunks: Vec<SyncResult<Bytes>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::new(resource, stream::iter(chunks))
    }

    pub(crate) fn from_response(
        resource: &str,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Self {
        let (res, ep) = (resource.to_string(), endpoint.to_string());
        let body = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| SyncError::Fetch {
                resource: res.clone(),
                endpoint: ep.clone(),
                status: None,
                message: format!("stream interrupted: {e}"),
            })
        });
        Self::new(resource, body)
    }

    /// Number of lines consumed so far, blank ones included.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Next record, or `None` at the end of the body.
    pub async fn next_record(&mut self) -> Option<SyncResult<Value>> {
        loop {
            let newline = self.buffer[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.scanned + offset);
            if let Some(pos) = newline {
                let line = self.buffer.split_to(pos + 1);
                self.scanned = 0;
                self.line += 1;
                if let Some(record) = self.parse_line(&line[..pos]) {
                    return Some(record);
                }
                continue;
            }

            if self.exhausted {
                if self.buffer.is_empty() {
                    return None;
                }
                let rest = self.buffer.split();
                self.scanned = 0;
                self.line += 1;
                return self.parse_line(&rest);
            }

            self.scanned = self.buffer.len();
            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.exhausted = true;
                    self.buffer.clear();
                    self.scanned = 0;
                    return Some(Err(e));
                }
                None => self.exhausted = true,
            }
        }
    }

    /// `None` for blank lines.
    fn parse_line(&self, line: &[u8]) -> Option<SyncResult<Value>> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(
            serde_json::from_slice(line).map_err(|e| SyncError::Parse {
                resource: self.resource.clone(),
                line: self.line,
                message: e.to_string(),
            }),
        )
    }
}
