//! SSE wire helpers used when the relay has to build an event stream itself.
use bytes::Bytes;

/// Literal end-of-stream marker used by OpenAI-style streams.
pub const DONE_SENTINEL: &str = "[DONE]";

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Media type the relay answers chat requests with.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Wrap a payload into one `data:` frame.
#[must_use]
pub fn data_frame(payload: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\n\n");
    Bytes::from(out)
}

/// The `[DONE]` sentinel frame.
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME)
}

/// Check whether a decoded frame is the `[DONE]` sentinel.
///
/// The match is case-sensitive and covers the whole frame; surrounding
/// whitespace is tolerated.
#[must_use]
pub fn is_done_sentinel(frame: &str) -> bool {
    frame.trim() == DONE_SENTINEL
}

/// Whether an upstream `Content-Type` means the body is already a live stream.
///
/// Event streams are the primary case; newline-delimited JSON streams are
/// piped the same way so their lines reach the client as they arrive.
#[must_use]
pub fn is_streaming_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/event-stream") || content_type.contains("application/x-ndjson")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_frame() {
        assert_eq!(
            data_frame(br#"{"id":"chatcmpl-1"}"#),
            Bytes::from_static(b"data: {\"id\":\"chatcmpl-1\"}\n\n")
        );
    }

    #[test]
    fn test_done_frame_bytes() {
        assert_eq!(done_frame(), Bytes::from_static(b"data: [DONE]\n\n"));
    }

    #[test]
    fn test_is_done_sentinel() {
        assert!(is_done_sentinel("[DONE]"));
        assert!(is_done_sentinel(" [DONE] "));
        assert!(!is_done_sentinel("[done]"));
        assert!(!is_done_sentinel("[DONE] extra"));
    }

    #[test]
    fn test_streaming_content_types() {
        assert!(is_streaming_content_type("text/event-stream"));
        assert!(is_streaming_content_type("text/event-stream;charset=UTF-8"));
        assert!(is_streaming_content_type("application/x-ndjson"));
        assert!(!is_streaming_content_type("application/json"));
        assert!(!is_streaming_content_type(""));
    }
}
