//! Server-sent event decoding.
//!
//! Three layers, each usable on its own:
//! - [`LineBuffer`] turns raw body chunks into text lines (LF, CRLF or CR),
//!   holding partial lines and partial UTF-8 sequences across chunk edges.
//! - [`SseFramer`] groups lines into blocks separated by blank lines.
//! - [`normalize_block`] turns one block into a [`NormalizedEvent`].
//!
//! [`decode_events`] wires the three together over an HTTP byte stream.

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::event::NormalizedEvent;

/// Splits a byte stream into lines. Line terminators are not included.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    // last byte seen was '\r'; a following '\n' belongs to the same terminator
    after_cr: bool,
}

impl LineBuffer {
    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => lines.push(self.take_line()),
                b'\r' => {
                    lines.push(self.take_line());
                    self.after_cr = true;
                }
                _ => self.buf.push(byte),
            }
        }
        lines
    }

    /// Flush an unterminated last line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

/// Accumulates lines and releases a block on every blank line.
#[derive(Debug, Default)]
pub struct SseFramer {
    pending: Vec<String>,
}

impl SseFramer {
    /// Feed one line. Returns a block when `line` is blank and lines are pending.
    pub fn push_line(&mut self, line: &str) -> Option<Vec<String>> {
        if line.is_empty() {
            return self.flush();
        }
        self.pending.push(line.to_string());
        None
    }

    /// End of stream: release whatever is still buffered.
    pub fn finish(&mut self) -> Option<Vec<String>> {
        self.flush()
    }

    fn flush(&mut self) -> Option<Vec<String>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Lazily regroup a line iterator into SSE blocks.
pub fn split_blocks<I>(lines: I) -> Blocks<I::IntoIter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Blocks {
        lines: lines.into_iter(),
        framer: SseFramer::default(),
        done: false,
    }
}

/// Iterator returned by [`split_blocks`].
pub struct Blocks<I> {
    lines: I,
    framer: SseFramer,
    done: bool,
}

impl<I> Iterator for Blocks<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for line in self.lines.by_ref() {
            if let Some(block) = self.framer.push_line(line.as_ref()) {
                return Some(block);
            }
        }
        self.done = true;
        self.framer.finish()
    }
}

/// Decode one block. Returns `None` when the block carries no data.
///
/// `event:` sets the name (last one wins); `data:` lines are joined with
/// newlines. Object payloads get the frame name injected under `event` unless
/// they already carry one. Anything else is wrapped as `{data, event}`, and
/// payloads that are not JSON at all are wrapped as raw strings.
pub fn normalize_block<S: AsRef<str>>(lines: &[S]) -> Option<NormalizedEvent> {
    let mut name: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in lines {
        let line = line.as_ref();
        if let Some(rest) = line.strip_prefix("event:") {
            let rest = rest.trim();
            name = (!rest.is_empty()).then(|| rest.to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
        // id:, retry: and ':' comments are ignored
    }

    let data = data_lines.join("\n");
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(mut map)) => {
            if let Some(name) = name {
                map.entry("event").or_insert(Value::String(name));
            }
            Some(NormalizedEvent::from_map(map))
        }
        Ok(other) => Some(NormalizedEvent::wrap(other, name.as_deref())),
        Err(_) => {
            let preview: String = data.chars().take(200).collect();
            debug!(data = %preview, "non-JSON SSE data");
            Some(NormalizedEvent::wrap(
                Value::String(data.to_string()),
                name.as_deref(),
            ))
        }
    }
}

/// Decode a body byte stream into normalized events.
///
/// Pull-driven: the body is read only as the returned stream is polled.
/// A body error is yielded once and ends the stream.
pub fn decode_events<S, B, E>(body: S) -> impl Stream<Item = Result<NormalizedEvent, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        futures_util::pin_mut!(body);
        let mut lines = LineBuffer::default();
        let mut framer = SseFramer::default();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for line in lines.push(chunk.as_ref()) {
                if let Some(event) = framer.push_line(&line).as_deref().and_then(normalize_block) {
                    yield Ok(event);
                }
            }
        }

        // truncated stream: surface the partial block instead of dropping it
        if let Some(line) = lines.finish() {
            if let Some(event) = framer.push_line(&line).as_deref().and_then(normalize_block) {
                yield Ok(event);
            }
        }
        if let Some(event) = framer.finish().as_deref().and_then(normalize_block) {
            yield Ok(event);
        }
    }
}
