//! Decoding of individual stream frames into text deltas.
//!
//! A frame is parsed once into a generic JSON value and classified into a
//! [`WireFrame`]. Decoding never fails: text that is not JSON is kept as a
//! raw-text delta, and JSON of an unknown shape decodes to an empty,
//! non-terminal delta.

use serde_json::Value;

use crate::stream::sse::is_done_sentinel;

/// Result of decoding one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Text to append to the in-flight answer; may be empty.
    pub delta: String,
    /// No further deltas should be consumed after this frame.
    pub terminal: bool,
}

/// The wire shape a frame was recognised as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// The literal `[DONE]` end-of-stream marker.
    Sentinel,
    /// `{"choices":[{"message":{"content":..},"finish_reason":..}]}`.
    OpenAiDelta {
        content: Option<String>,
        finish_reason: Option<String>,
    },
    /// `{"message":{"content":..},"done":bool}`, one JSON object per line.
    NdjsonDelta { content: Option<String>, done: bool },
    /// Valid JSON that matches neither known shape, e.g. a metadata frame.
    Unrecognized,
    /// Not JSON at all; the text itself is the delta.
    RawText(String),
}

impl WireFrame {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            WireFrame::Sentinel => "sentinel",
            WireFrame::OpenAiDelta { .. } => "openai_delta",
            WireFrame::NdjsonDelta { .. } => "ndjson_delta",
            WireFrame::Unrecognized => "unrecognized",
            WireFrame::RawText(_) => "raw_text",
        }
    }

    #[must_use]
    pub fn into_decoded(self) -> DecodedFrame {
        match self {
            WireFrame::Sentinel => DecodedFrame {
                delta: String::new(),
                terminal: true,
            },
            WireFrame::OpenAiDelta {
                content,
                finish_reason,
            } => DecodedFrame {
                delta: content.unwrap_or_default(),
                terminal: finish_reason.as_deref() == Some("stop"),
            },
            WireFrame::NdjsonDelta { content, done } => DecodedFrame {
                delta: content.unwrap_or_default(),
                terminal: done,
            },
            WireFrame::Unrecognized => DecodedFrame::default(),
            WireFrame::RawText(text) => DecodedFrame {
                delta: text,
                terminal: false,
            },
        }
    }
}

/// Classify one frame's text.
#[must_use]
pub fn classify_frame(frame: &str) -> WireFrame {
    // Checked first: the sentinel is not valid JSON.
    if is_done_sentinel(frame) {
        return WireFrame::Sentinel;
    }

    match serde_json::from_str::<Value>(frame) {
        Ok(value) => classify_value(&value),
        Err(err) => {
            tracing::debug!(error = %err, len = frame.len(), "frame is not JSON, keeping raw text");
            WireFrame::RawText(frame.to_owned())
        }
    }
}

/// Classify an already-parsed JSON frame.
#[must_use]
pub fn classify_value(value: &Value) -> WireFrame {
    if let Some(choice) = value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .filter(|choice| choice.is_object())
    {
        // Streaming chunks from OpenAI-compatible servers carry `delta`
        // instead of `message`.
        let content = choice
            .get("message")
            .and_then(|message| message.get("content"))
            .or_else(|| choice.get("delta").and_then(|delta| delta.get("content")))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_owned);
        return WireFrame::OpenAiDelta {
            content,
            finish_reason,
        };
    }

    let message = value.get("message").filter(|message| message.is_object());
    let done = value.get("done").and_then(Value::as_bool);
    if message.is_some() || done.is_some() {
        let content = message
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        return WireFrame::NdjsonDelta {
            content,
            done: done.unwrap_or(false),
        };
    }

    WireFrame::Unrecognized
}

/// Decode one frame into its delta and terminal flag.
#[must_use]
pub fn decode_frame(frame: &str) -> DecodedFrame {
    let wire = classify_frame(frame);
    if matches!(wire, WireFrame::Unrecognized) {
        tracing::debug!(len = frame.len(), "ignoring frame with unrecognized shape");
    }
    wire.into_decoded()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decoded(delta: &str, terminal: bool) -> DecodedFrame {
        DecodedFrame {
            delta: delta.to_string(),
            terminal,
        }
    }

    #[test]
    fn test_sentinel_is_terminal_and_empty() {
        assert_eq!(decode_frame("[DONE]"), decoded("", true));
        // Same answer no matter what was decoded before.
        let _ = decode_frame(r#"{"choices":[{"message":{"content":"x"}}]}"#);
        assert_eq!(decode_frame("[DONE]"), decoded("", true));
        assert_eq!(classify_frame("[DONE]"), WireFrame::Sentinel);
    }

    #[test]
    fn test_sentinel_is_case_sensitive() {
        assert_eq!(decode_frame("[done]"), decoded("[done]", false));
    }

    #[test]
    fn test_openai_frames_accumulate_and_stop() {
        let frames = [
            r#"{"choices":[{"message":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"message":{"content":"lo"}}]}"#,
            r#"{"choices":[{"finish_reason":"stop"}]}"#,
        ];
        let mut content = String::new();
        let mut consumed = 0;
        for frame in frames {
            consumed += 1;
            let out = decode_frame(frame);
            content.push_str(&out.delta);
            if out.terminal {
                break;
            }
        }
        assert_eq!(content, "Hello");
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_openai_finish_reason_other_than_stop_is_not_terminal() {
        let out = decode_frame(r#"{"choices":[{"message":{"content":"a"},"finish_reason":"length"}]}"#);
        assert_eq!(out, decoded("a", false));
        let out = decode_frame(r#"{"choices":[{"message":{"content":"b"},"finish_reason":""}]}"#);
        assert_eq!(out, decoded("b", false));
    }

    #[test]
    fn test_openai_message_with_null_content() {
        let out = decode_frame(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#);
        assert_eq!(out, decoded("", false));
    }

    #[test]
    fn test_openai_delta_chunk() {
        let out = decode_frame(
            r#"{"choices":[{"index":0,"delta":{"content":"ok"},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(out, decoded("ok", true));
    }

    #[test]
    fn test_ndjson_frames() {
        assert_eq!(decode_frame(r#"{"message":{"content":"Hi"}}"#), decoded("Hi", false));
        assert_eq!(decode_frame(r#"{"done":true}"#), decoded("", true));
        assert_eq!(
            decode_frame(r#"{"model":"llama3.2:3b","message":{"role":"assistant","content":"!"},"done":true}"#),
            decoded("!", true)
        );
    }

    #[test]
    fn test_ndjson_done_must_be_boolean() {
        assert_eq!(
            classify_frame(r#"{"message":{"content":"x"},"done":"true"}"#),
            WireFrame::NdjsonDelta {
                content: Some("x".to_string()),
                done: false
            }
        );
    }

    #[test]
    fn test_raw_text_fallback_is_verbatim() {
        assert_eq!(decode_frame("token"), decoded("token", false));
        assert_eq!(decode_frame(" spaced out "), decoded(" spaced out ", false));
        assert_eq!(decode_frame("{\"broken\":"), decoded("{\"broken\":", false));
    }

    #[test]
    fn test_unrecognized_json_is_a_no_op() {
        assert_eq!(decode_frame(r#"{"usage":{"total_tokens":7}}"#), decoded("", false));
        assert_eq!(decode_frame(r#"{"text":"alt field"}"#), decoded("", false));
        assert_eq!(decode_frame("[1,2,3]"), decoded("", false));
        assert_eq!(decode_frame("42"), decoded("", false));
        assert_eq!(classify_frame(r#"{"choices":[]}"#), WireFrame::Unrecognized);
    }

    #[test]
    fn test_openai_shape_wins_over_ndjson_shape() {
        let value = json!({
            "choices": [{"message": {"content": "a"}}],
            "message": {"content": "b"},
            "done": true
        });
        assert_eq!(classify_value(&value).into_decoded(), decoded("a", false));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(classify_frame("[DONE]").kind(), "sentinel");
        assert_eq!(classify_frame("hello").kind(), "raw_text");
        assert_eq!(classify_frame("{}").kind(), "unrecognized");
    }
}
