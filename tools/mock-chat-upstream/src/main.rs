use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 8080;

#[derive(Copy, Clone)]
enum MockMode {
    /// OpenAI-style `data:` frames ending in `[DONE]`.
    Sse,
    /// One JSON object per line, `done: true` last.
    Ndjson,
    /// A single non-streaming JSON document.
    Json,
    /// Every chat request fails with 503.
    Error,
}

struct StoredDocument {
    id: i64,
    file_name: String,
    file_size: usize,
}

struct MockState {
    mode: MockMode,
    documents: Mutex<Vec<StoredDocument>>,
    next_id: AtomicI64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        mode: parse_mode(),
        documents: Mutex::new(Vec::new()),
        next_id: AtomicI64::new(1),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_mode() -> MockMode {
    match env::var("MOCK_MODE").as_deref() {
        Ok("ndjson") => MockMode::Ndjson,
        Ok("json") => MockMode::Json,
        Ok("error") => MockMode::Error,
        Ok("sse") | Err(_) => MockMode::Sse,
        Ok(other) => {
            eprintln!("unknown MOCK_MODE '{other}', fallback to sse");
            MockMode::Sse
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &MockState) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let method = parts.method;
    let path = parts.uri.path();

    match (&method, path) {
        (&Method::POST, "/api/ai/chat" | "/api/rag/chat") => chat_response(state.mode),
        (&Method::GET, "/api/rag/documents") => documents_response(state),
        (&Method::POST, "/api/rag/upload") => {
            let id = state.next_id.fetch_add(1, Ordering::Relaxed);
            let file_name = multipart_file_name(&body).unwrap_or_else(|| format!("upload-{id}.txt"));
            if let Ok(mut documents) = state.documents.lock() {
                documents.push(StoredDocument {
                    id,
                    file_name,
                    file_size: body.len(),
                });
            }
            simple_response(StatusCode::OK, "application/json", Bytes::from(format!("{{\"id\":{id}}}")))
        }
        (&Method::DELETE, _) if path.starts_with("/api/rag/documents/") => {
            let id = path
                .trim_start_matches("/api/rag/documents/")
                .parse::<i64>()
                .unwrap_or_default();
            if let Ok(mut documents) = state.documents.lock() {
                documents.retain(|doc| doc.id != id);
            }
            simple_response(StatusCode::OK, "application/json", Bytes::new())
        }
        (_, "/api/ai/chat" | "/api/rag/chat" | "/api/rag/documents" | "/api/rag/upload") => {
            simple_response_static(
                StatusCode::METHOD_NOT_ALLOWED,
                "application/json",
                br#"{"error":"method_not_allowed"}"#,
            )
        }
        _ => simple_response_static(
            StatusCode::NOT_FOUND,
            "application/json",
            br#"{"error":"not_found"}"#,
        ),
    }
}

fn chat_response(mode: MockMode) -> Response<Full<Bytes>> {
    let (content_type, body): (&'static str, &'static [u8]) = match mode {
        MockMode::Sse => ("text/event-stream", OPENAI_SSE_BODY),
        MockMode::Ndjson => ("application/x-ndjson", NDJSON_BODY),
        MockMode::Json => ("application/json", SINGLE_JSON_BODY),
        MockMode::Error => {
            return simple_response_static(
                StatusCode::SERVICE_UNAVAILABLE,
                "application/json",
                br#"{"error":"mock_injected_error"}"#,
            );
        }
    };
    let mut response = simple_response_static(StatusCode::OK, content_type, body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn documents_response(state: &MockState) -> Response<Full<Bytes>> {
    let entries = state
        .documents
        .lock()
        .map(|documents| {
            documents
                .iter()
                .map(|doc| {
                    format!(
                        "{{\"id\":{},\"fileName\":\"{}\",\"fileType\":\"application/octet-stream\",\"fileSize\":{},\"uploadedAt\":\"1970-01-01T00:00:00\"}}",
                        doc.id,
                        doc.file_name.replace('"', ""),
                        doc.file_size
                    )
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    simple_response(StatusCode::OK, "application/json", Bytes::from(format!("[{entries}]")))
}

fn multipart_file_name(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let start = text.find("filename=\"")? + "filename=\"".len();
    let end = text[start..].find('"')? + start;
    Some(text[start..end].to_string())
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    simple_response(status, content_type, Bytes::from_static(body))
}

const OPENAI_SSE_BODY: &[u8] = b"data: {\"choices\":[{\"index\":0,\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"index\":0,\"message\":{\"content\":\"lo\"}}]}\n\ndata: {\"choices\":[{\"index\":0,\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";
const NDJSON_BODY: &[u8] = b"{\"model\":\"llama3.2:3b\",\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n{\"model\":\"llama3.2:3b\",\"message\":{\"role\":\"assistant\",\"content\":\" there\"},\"done\":false}\n{\"model\":\"llama3.2:3b\",\"done\":true}\n";
const SINGLE_JSON_BODY: &[u8] = br#"{"id":"chatcmpl-mock","model":"llama3.2:3b","choices":[{"index":0,"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#;
