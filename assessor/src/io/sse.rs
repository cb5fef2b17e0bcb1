//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only events dispatched with the default `message` type are surfaced, the
//! same frames a browser `EventSource` hands to `onmessage`. Comment lines
//! (keep-alive pings) and named events are consumed silently.
//!
//! Lines end with CRLF, LF or a lone CR. A UTF-8 byte order mark at the very
//! start of the body is skipped.

use futures::stream::{Stream, StreamExt};

use crate::error::TransportError;

/// Longest line buffered while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1 << 20;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Line-oriented event-stream parser fed with arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    /// The last line ended on CR; an LF right after it belongs to that line end.
    after_cr: bool,
    started: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame completed by it.
    ///
    /// Fails once a single line grows past [`MAX_LINE_BYTES`]; the decoder
    /// should not be fed again after that.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, TransportError> {
        let mut frames = Vec::new();
        let mut start = 0;
        for (i, &byte) in chunk.iter().enumerate() {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                start = i + 1;
                continue;
            }
            if byte == b'\n' || byte == b'\r' {
                self.line.extend_from_slice(&chunk[start..i]);
                self.check_line_len()?;
                self.after_cr = byte == b'\r';
                start = i + 1;
                if let Some(frame) = self.end_line() {
                    frames.push(frame);
                }
            }
        }
        self.line.extend_from_slice(&chunk[start..]);
        self.check_line_len()?;
        Ok(frames)
    }

    /// Dispatch whatever is buffered when the body ends without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.after_cr = false;
        if !self.line.is_empty() {
            if let Some(frame) = self.end_line() {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn check_line_len(&mut self) -> Result<(), TransportError> {
        if self.line.len() > MAX_LINE_BYTES {
            self.line.clear();
            return Err(TransportError::Body(format!(
                "event-stream line exceeds {} bytes",
                MAX_LINE_BYTES
            )));
        }
        Ok(())
    }

    fn end_line(&mut self) -> Option<SseFrame> {
        let skip = if !self.started && self.line.starts_with(BOM) {
            BOM.len()
        } else {
            0
        };
        self.started = true;
        let line = String::from_utf8_lossy(&self.line[skip..]).into_owned();
        self.line.clear();
        self.process_line(&line)
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
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            // `id` and `retry` only matter for reconnection, which channels never do.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

/// Turn a stream of body chunks into a stream of `message` payloads.
///
/// A chunk error or an overlong line ends the stream after yielding it once.
pub fn message_stream<S, B, E>(body: S) -> impl Stream<Item = Result<String, TransportError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<TransportError> + Send,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut body = Box::pin(body);
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => match decoder.push(bytes.as_ref()) {
                    Ok(frames) => {
                        for frame in frames {
                            if frame.is_message() {
                                yield Ok(frame.data);
                            }
                        }
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                },
                Err(err) => {
                    yield Err(err.into());
                    return;
                }
            }
        }
        if let Some(frame) = decoder.finish() {
            if frame.is_message() {
                yield Ok(frame.data);
            }
        }
    }
}
