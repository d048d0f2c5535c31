//! Consumer for the line-framed query stream.
//!
//! The backend answers a query with a body of `data: <payload>` lines and
//! terminates it with `data: [DONE]`. [`FrameDecoder`] turns raw body bytes
//! into [`Frame`]s without doing any I/O, and [`QueryStream`] drives it from
//! an HTTP body as a `futures::Stream` of text segments.

use super::ApiError;
use bytes::Bytes;
use futures::stream::{BoxStream, FusedStream};
use futures::{Stream, StreamExt};
use reqwest::Response;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Chunk(String),
    Done,
}

/// Incremental bytes -> frames decoder.
///
/// UTF-8 sequences split across reads are held back until complete, and a
/// line is only interpreted once its terminating `\n` arrives (or the body
/// ends, see [`FrameDecoder::finish`]).
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8_tail: Vec<u8>,
    line_buf: String,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the sentinel has been decoded. Further input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        self.decode(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            if self.accept_line(&line, &mut frames) {
                break;
            }
        }
        frames
    }

    /// Flushes whatever is buffered when the body ends without a trailing
    /// newline. An incomplete UTF-8 tail becomes U+FFFD.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }
        if !self.utf8_tail.is_empty() {
            self.utf8_tail.clear();
            self.line_buf.push(char::REPLACEMENT_CHARACTER);
        }
        let rest = std::mem::take(&mut self.line_buf);
        if !rest.is_empty() {
            debug!(len = rest.len(), "flushing unterminated final line");
            self.accept_line(&rest, &mut frames);
        }
        frames
    }

    fn decode(&mut self, bytes: &[u8]) {
        self.utf8_tail.extend_from_slice(bytes);
        let input = std::mem::take(&mut self.utf8_tail);
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.line_buf.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    self.line_buf.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            self.line_buf.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[bad..];
                        }
                        None => {
                            // incomplete sequence, wait for the next read
                            self.utf8_tail = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Returns true when the sentinel was hit.
    fn accept_line(&mut self, line: &str, frames: &mut Vec<Frame>) -> bool {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        match parse_line(line) {
            Some(Frame::Done) => {
                self.done = true;
                self.line_buf.clear();
                self.utf8_tail.clear();
                frames.push(Frame::Done);
                true
            }
            Some(frame) => {
                frames.push(frame);
                false
            }
            None => false,
        }
    }
}

/// Interprets one line of the stream.
pub fn parse_line(line: &str) -> Option<Frame> {
    match line.strip_prefix(DATA_PREFIX) {
        Some(DONE_SENTINEL) => Some(Frame::Done),
        Some(payload) => extract_payload(payload).map(Frame::Chunk),
        // non-conforming framing, pass the text through
        None if !line.trim().is_empty() => Some(Frame::Chunk(line.to_string())),
        None => None,
    }
}

fn extract_payload(payload: &str) -> Option<String> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => ["content", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(truthy_text)),
        Ok(Value::String(text)) if !text.is_empty() => Some(text),
        Ok(_) => None,
        Err(_) if !payload.trim().is_empty() => Some(payload.to_string()),
        Err(_) => None,
    }
}

/// Non-empty strings, non-zero numbers and `true` count as text.
fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Ordered stream of text segments for one query.
///
/// Ends with `None` after the sentinel or after the body ends. A transport
/// failure yields one `Err` and then ends. Dropping the stream closes the
/// underlying body.
pub struct QueryStream {
    body: BoxStream<'static, Result<Bytes, ApiError>>,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    body_done: bool,
    finished: bool,
}

impl QueryStream {
    pub fn from_response(resp: Response) -> Self {
        Self::from_byte_stream(resp.bytes_stream().map(|r| r.map_err(ApiError::from)))
    }

    pub fn from_byte_stream<S>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ApiError>> + Send + 'static,
    {
        Self {
            body: body.boxed(),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            body_done: false,
            finished: false,
        }
    }

    /// Whether the stream was closed by the sentinel rather than by the
    /// body ending.
    pub fn saw_sentinel(&self) -> bool {
        self.decoder.is_done()
    }

    /// Drains the stream, handing each segment to `on_chunk`, and returns
    /// the accumulated text.
    pub async fn collect_with(mut self, mut on_chunk: impl FnMut(&str) + Send) -> Result<String, ApiError> {
        let mut full_content = String::new();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            on_chunk(&chunk);
            full_content.push_str(&chunk);
        }
        Ok(full_content)
    }

    fn absorb(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            match frame {
                Frame::Chunk(text) => self.pending.push_back(text),
                Frame::Done => {
                    // stop reading, release the connection
                    self.body_done = true;
                    self.body = futures::stream::empty().boxed();
                }
            }
        }
    }
}

impl Stream for QueryStream {
    type Item = Result<String, ApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(chunk) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            if this.body_done {
                this.finished = true;
                debug!(sentinel = this.decoder.is_done(), "query stream complete");
                return Poll::Ready(None);
            }
            match this.body.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(bytes))) => {
                    let frames = this.decoder.push(&bytes);
                    this.absorb(frames);
                }
                Poll::Ready(Some(Err(err))) => {
                    warn!("query stream failed: {}", err);
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    let frames = this.decoder.finish();
                    this.absorb(frames);
                    this.body_done = true;
                }
            }
        }
    }
}

impl FusedStream for QueryStream {
    fn is_terminated(&self) -> bool {
        self.finished && self.pending.is_empty()
    }
}
