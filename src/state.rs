use crate::config::AppConfig;
use crate::relay::ChatRoute;
use crate::transport::HttpTransport;
use crate::util::IdGenerator;

/// Shared relay state accessible to all handlers.
///
/// Nothing in here is mutated per request apart from the id counter, so
/// concurrent relays never contend on it.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    chat_url: String,
    rag_chat_url: String,
    request_ids: IdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let chat_url = config.upstream.chat_url();
        let rag_chat_url = config.upstream.rag_chat_url();
        Self {
            config,
            transport,
            chat_url,
            rag_chat_url,
            request_ids: IdGenerator::new(),
        }
    }

    /// Upstream URL a chat route forwards to.
    #[must_use]
    pub fn upstream_url(&self, route: ChatRoute) -> &str {
        match route {
            ChatRoute::Chat => &self.chat_url,
            ChatRoute::RagChat => &self.rag_chat_url,
        }
    }

    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next_uuid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_urls_are_precomputed() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "http://backend:9000/".to_string();
        let state = AppState::new(config, HttpTransport::new(&Default::default()));
        assert_eq!(
            state.upstream_url(ChatRoute::Chat),
            "http://backend:9000/api/ai/chat"
        );
        assert_eq!(
            state.upstream_url(ChatRoute::RagChat),
            "http://backend:9000/api/rag/chat"
        );
    }

    #[test]
    fn test_request_ids_are_distinct() {
        let state = AppState::new(
            AppConfig::default(),
            HttpTransport::new(&Default::default()),
        );
        assert_ne!(state.next_request_id(), state.next_request_id());
    }
}
