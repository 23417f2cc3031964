//! Server-sent event framing
//!
//! Splits a `text/event-stream` body into frames. Comment lines (the server's
//! `: ping` keep-alives) are swallowed here and never reach the decoder.

use crate::error::{ClientError, ClientResult};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;

/// One dispatched event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, `None` for the default `message` type
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Last seen `id:` field
    pub id: Option<String>,
}

/// Stream of frames from one open connection
pub type FrameStream = BoxStream<'static, ClientResult<SseFrame>>;

/// Longest line held back while waiting for its terminator
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental `text/event-stream` parser
///
/// Bytes may be fed in arbitrary chunks; a line split across chunks (including
/// a multi-byte character) is held back until its terminator arrives.
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    max_line: usize,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            event: None,
            data: Vec::new(),
            id: None,
            max_line: MAX_LINE_BYTES,
        }
    }

    /// Feed a chunk, returning every frame it completes.
    ///
    /// Fails once an unterminated line grows past [`MAX_LINE_BYTES`]; the
    /// parser is unusable after that and the connection should be dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> ClientResult<Vec<SseFrame>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        if self.buffer.len() > self.max_line {
            let held = self.buffer.len();
            self.buffer.clear();
            return Err(ClientError::Stream(format!(
                "event stream line exceeds {} bytes ({held} without terminator)",
                self.max_line
            )));
        }
        Ok(frames)
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self
            .buffer
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')?;

        let mut end = pos + 1;
        if self.buffer[pos] == b'\r' {
            // Need the next byte to tell `\r` from `\r\n`
            if end == self.buffer.len() {
                return None;
            }
            if self.buffer[end] == b'\n' {
                end += 1;
            }
        }

        let line: Vec<u8> = self.buffer.drain(..end).take(pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // `retry:` is ignored; reconnect timing is ours
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let frame = SseFrame {
            event: self.event.take().filter(|e| !e.is_empty()),
            data: self.data.join("\n"),
            id: self.id.clone(),
        };
        self.data.clear();
        Some(frame)
    }
}

struct FrameState<S> {
    body: S,
    parser: SseParser,
    pending: VecDeque<SseFrame>,
    done: bool,
}

/// Turn a raw byte stream into a frame stream.
///
/// A body error or an oversized line is yielded once and ends the stream; a
/// clean end of body ends it after any complete frames are drained.
pub fn frames<S, B, E>(body: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = FrameState {
        body: Box::pin(body),
        parser: SseParser::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => match state.parser.feed(chunk.as_ref()) {
                    Ok(parsed) => state.pending.extend(parsed),
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}
