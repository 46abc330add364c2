use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::relay::{self, health, ChatRoute};
use crate::state::AppState;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch {
    Health,
    ChatRelay(ChatRoute),
    Preflight,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// Every response, errors included, carries the CORS headers.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());
    let cors_origin = state.config.server.cors_allow_origin.clone();

    let mut response = match route {
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::ChatRelay(chat_route) => {
            let limit = state.config.server.request_body_limit_bytes;
            match read_request_body(body, limit).await {
                Ok(body_bytes) => relay::handler(state, chat_route, body_bytes).await,
                Err(response) => response,
            }
        }
        RouteMatch::Preflight => StatusCode::NO_CONTENT.into_response(),
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    apply_cors(response.headers_mut(), &cors_origin);
    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, limit).await.map_err(|_| {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            axum::Json(serde_json::json!({
                "error": format!("Request body too large (max {limit} bytes)")
            })),
        )
            .into_response()
    })
}

fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    let chat_route = match path {
        "/" | "/health" => {
            return if method == Method::GET {
                RouteMatch::Health
            } else if method == Method::OPTIONS {
                RouteMatch::Preflight
            } else {
                RouteMatch::MethodNotAllowed
            };
        }
        relay::CHAT_ROUTE => ChatRoute::Chat,
        relay::RAG_CHAT_ROUTE => ChatRoute::RagChat,
        _ => return RouteMatch::NotFound,
    };

    if method == Method::POST {
        RouteMatch::ChatRelay(chat_route)
    } else if method == Method::OPTIONS {
        RouteMatch::Preflight
    } else {
        RouteMatch::MethodNotAllowed
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transport::HttpTransport;

    fn test_state(config: AppConfig) -> Arc<AppState> {
        let transport = HttpTransport::new(&config.server);
        Arc::new(AppState::new(config, transport))
    }

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("relay/"), "/relay");
        assert_eq!(normalize_base_path(" /relay// "), "/relay");
    }

    #[test]
    fn test_match_route_table() {
        assert_eq!(match_route(&Method::GET, "/", ""), RouteMatch::Health);
        assert_eq!(match_route(&Method::GET, "/health", ""), RouteMatch::Health);
        assert_eq!(
            match_route(&Method::POST, "/api/ai/chat", ""),
            RouteMatch::ChatRelay(ChatRoute::Chat)
        );
        assert_eq!(
            match_route(&Method::POST, "/api/rag/chat", ""),
            RouteMatch::ChatRelay(ChatRoute::RagChat)
        );
        assert_eq!(
            match_route(&Method::GET, "/api/ai/chat", ""),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(
            match_route(&Method::OPTIONS, "/api/rag/chat", ""),
            RouteMatch::Preflight
        );
        assert_eq!(match_route(&Method::POST, "/v1/chat", ""), RouteMatch::NotFound);
    }

    #[test]
    fn test_match_route_with_base_path() {
        assert_eq!(match_route(&Method::GET, "/relay", "/relay"), RouteMatch::Health);
        assert_eq!(
            match_route(&Method::POST, "/relay/api/ai/chat", "/relay"),
            RouteMatch::ChatRelay(ChatRoute::Chat)
        );
        assert_eq!(
            match_route(&Method::POST, "/relayed/api/ai/chat", "/relay"),
            RouteMatch::NotFound
        );
        assert_eq!(
            match_route(&Method::POST, "/api/ai/chat", "/relay"),
            RouteMatch::NotFound
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_before_relay() {
        let mut config = AppConfig::default();
        config.server.request_body_limit_bytes = 16;
        let state = test_state(config);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/ai/chat")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let response = dispatch_request(state, Arc::from(""), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            response.headers()[http::header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_preflight_has_cors_headers() {
        let state = test_state(AppConfig::default());
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/ai/chat")
            .body(Body::empty())
            .unwrap();
        let response = dispatch_request(state, Arc::from(""), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[http::header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
    }
}
