//! Incremental line framing for chat response bodies.
//!
//! Handles both SSE (`data:`-prefixed records separated by blank lines) and
//! newline-delimited JSON, buffering a partial trailing line across network
//! reads. Lines are split on raw bytes before UTF-8 decoding, so a multi-byte
//! character cut by a chunk boundary is never mangled.
use std::collections::VecDeque;

use bytes::BytesMut;
use futures_util::Stream;
use memchr::memchr;

/// Event-stream field prefix whose value is the frame payload.
const DATA_FIELD: &str = "data:";
/// Event-stream control fields that never carry payload text. These are
/// dropped in every body, so a plain-text line starting with one is lost.
const CONTROL_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Accumulates raw body bytes and yields complete logical frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: BytesMut,
    scan_from: usize,
}

impl FrameBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: BytesMut::with_capacity(4096),
            scan_from: 0,
        }
    }

    /// Feed a chunk and return the frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.push_into(chunk, &mut out);
        out
    }

    /// Feed a chunk and append the frames it completed into `out`.
    ///
    /// Every complete line becomes a candidate frame; the trailing fragment
    /// stays buffered until a later chunk (or [`FrameBuffer::finish`]).
    pub fn push_into<X: Extend<String>>(&mut self, chunk: &[u8], out: &mut X) {
        self.pending.extend_from_slice(chunk);
        loop {
            let Some(rel_pos) = memchr(b'\n', &self.pending[self.scan_from..]) else {
                self.scan_from = self.pending.len();
                return;
            };
            let line_end = self.scan_from + rel_pos;
            let line = self.pending.split_to(line_end + 1);
            self.scan_from = 0;
            if let Some(frame) = logical_frame(&line[..line_end]) {
                out.extend(std::iter::once(frame));
            }
        }
    }

    /// Flush the residual fragment at end of stream.
    ///
    /// Upstreams that omit the final newline still get their last frame
    /// decoded.
    pub fn finish(&mut self) -> Option<String> {
        self.scan_from = 0;
        if self.pending.is_empty() {
            return None;
        }
        let residual = self.pending.split();
        logical_frame(&residual)
    }

    /// Whether an incomplete line is currently buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Turn one raw line into a frame, or `None` for blank lines and SSE
/// control lines.
fn logical_frame(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    if text.trim().is_empty() {
        return None;
    }

    // Only the marker is removed; a leading space can belong to the token.
    if let Some(value) = text.strip_prefix(DATA_FIELD) {
        if value.trim().is_empty() {
            return None;
        }
        return Some(value.to_owned());
    }

    // Comment line, e.g. keep-alive pings.
    if text.starts_with(':') {
        return None;
    }
    if CONTROL_FIELDS.iter().any(|field| text.starts_with(field)) {
        return None;
    }

    Some(text.into_owned())
}

/// Split a byte stream into logical frames using [`FrameBuffer`].
///
/// Transport errors are yielded once and end the stream. When the byte
/// stream ends, any buffered residual is flushed as a final frame.
pub fn frame_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            FrameBuffer::new(),
            VecDeque::<String>::with_capacity(8),
            false,
        ),
        |(mut stream, mut buffer, mut pending, mut finished)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (stream, buffer, pending, finished)));
                }
                if finished {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => buffer.push_into(&bytes, &mut pending),
                    Some(Err(err)) => {
                        finished = true;
                        return Some((Err(err), (stream, buffer, pending, finished)));
                    }
                    None => {
                        finished = true;
                        if let Some(frame) = buffer.finish() {
                            return Some((Ok(frame), (stream, buffer, pending, finished)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}
