use std::sync::Arc;

use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a summary of where chats are relayed to.
pub fn health_handler(state: &Arc<AppState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "chat-relay is running",
        "config": {
            "upstream_base_url": config.upstream.trimmed_base_url(),
            "routes": [super::CHAT_ROUTE, super::RAG_CHAT_ROUTE],
            "default_model": config.session.model,
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transport::HttpTransport;

    #[test]
    fn test_health_reports_upstream() {
        let state = Arc::new(AppState::new(
            AppConfig::default(),
            HttpTransport::new(&Default::default()),
        ));
        let Json(body) = health_handler(&state);
        assert_eq!(body["status"], "chat-relay is running");
        assert_eq!(body["config"]["upstream_base_url"], "http://localhost:8080");
        assert_eq!(body["config"]["routes"][1], "/api/rag/chat");
    }
}
