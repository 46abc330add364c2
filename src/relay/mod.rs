//! The relay boundary: forward a chat request upstream and answer with a
//! uniform event stream, whatever shape the upstream replied in.

pub mod health;

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::error::RelayError;
use crate::observability::{log_relay_started, RelayMode};
use crate::state::AppState;
use crate::stream::sse::{
    data_frame, done_frame, is_streaming_content_type, EVENT_STREAM_CONTENT_TYPE,
};

pub const CHAT_ROUTE: &str = "/api/ai/chat";
pub const RAG_CHAT_ROUTE: &str = "/api/rag/chat";

/// Which chat endpoint a request came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoute {
    Chat,
    RagChat,
}

impl ChatRoute {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            ChatRoute::Chat => CHAT_ROUTE,
            ChatRoute::RagChat => RAG_CHAT_ROUTE,
        }
    }
}

/// Relay one chat request. Never fails: errors become JSON error responses.
pub async fn handler(state: Arc<AppState>, route: ChatRoute, body: Bytes) -> Response {
    let request_id = state.next_request_id();
    let start = Instant::now();
    match relay(&state, route, body, request_id, start).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                route = route.path(),
                error = %err,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "relay failed"
            );
            err.into_response()
        }
    }
}

async fn relay(
    state: &AppState,
    route: ChatRoute,
    body: Bytes,
    request_id: uuid::Uuid,
    start: Instant,
) -> Result<Response, RelayError> {
    serde_json::from_slice::<serde::de::IgnoredAny>(&body).map_err(|err| {
        RelayError::InvalidRequest(format!("Request body is not valid JSON: {err}"))
    })?;

    let url = state.upstream_url(route);
    tracing::debug!(request_id = %request_id, url, bytes = body.len(), "forwarding chat request");
    let upstream = state.transport.post_json(url, body).await?;

    let status = upstream.status();
    if !status.is_success() {
        // Best effort: a failed body read still reports the status.
        let body = upstream.text().await.unwrap_or_default();
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let streaming = upstream
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(is_streaming_content_type);

    if streaming {
        log_relay_started(
            request_id,
            route.path(),
            status.as_u16(),
            RelayMode::Passthrough,
            start,
        );
        // Dropping the body (client gone) drops the upstream byte stream,
        // which aborts the upstream read.
        let body = Body::from_stream(upstream.bytes_stream());
        return Ok(event_stream_response(body));
    }

    let document = upstream
        .bytes()
        .await
        .map_err(|err| RelayError::Transport(format!("Failed to read upstream body: {err}")))?;
    log_relay_started(
        request_id,
        route.path(),
        status.as_u16(),
        RelayMode::Synthesized,
        start,
    );
    let frames = synthesize_frames(&document);
    let body = Body::from_stream(futures_util::stream::iter(
        frames.into_iter().map(Ok::<Bytes, std::convert::Infallible>),
    ));
    Ok(event_stream_response(body))
}

/// Adapt one complete upstream document into stream frames: the document as
/// a single `data:` frame, then the `[DONE]` sentinel.
///
/// An empty document yields only the sentinel. A pretty-printed JSON
/// document is compacted onto one line so the client's line framing keeps
/// it as one frame.
#[must_use]
pub fn synthesize_frames(document: &[u8]) -> Vec<Bytes> {
    let trimmed = document.trim_ascii();
    if trimmed.is_empty() {
        return vec![done_frame()];
    }

    let payload = if memchr::memchr(b'\n', trimmed).is_some() {
        match serde_json::from_slice::<serde_json::Value>(trimmed) {
            Ok(value) => serde_json::to_vec(&value).map_or_else(|_| trimmed.to_vec(), |v| v),
            Err(_) => trimmed.to_vec(),
        }
    } else {
        trimmed.to_vec()
    };

    vec![data_frame(&payload), done_frame()]
}

fn event_stream_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache, no-transform"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_single_document() {
        let frames = synthesize_frames(br#"{"choices":[{"message":{"content":"pong"}}]}"#);
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"data: {\"choices\":[{\"message\":{\"content\":\"pong\"}}]}\n\n"),
                Bytes::from_static(b"data: [DONE]\n\n"),
            ]
        );
    }

    #[test]
    fn test_synthesize_empty_document() {
        assert_eq!(
            synthesize_frames(b"  \n"),
            vec![Bytes::from_static(b"data: [DONE]\n\n")]
        );
    }

    #[test]
    fn test_synthesize_compacts_multiline_json() {
        let frames = synthesize_frames(b"{\n  \"message\": {\"content\": \"hi\"},\n  \"done\": true\n}\n");
        assert_eq!(frames.len(), 2);
        let first = std::str::from_utf8(&frames[0]).unwrap();
        assert!(first.starts_with("data: {"));
        assert_eq!(first.matches('\n').count(), 2);
        assert!(first.contains("\"content\":\"hi\""));
    }

    #[test]
    fn test_synthesize_keeps_multiline_text_verbatim() {
        let frames = synthesize_frames(b"line one\nline two");
        assert_eq!(frames[0], Bytes::from_static(b"data: line one\nline two\n\n"));
    }

    #[test]
    fn test_route_paths() {
        assert_eq!(ChatRoute::Chat.path(), "/api/ai/chat");
        assert_eq!(ChatRoute::RagChat.path(), "/api/rag/chat");
    }
}
