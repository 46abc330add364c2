use std::future::Future;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;

use crate::error::ChatError;
use crate::relay::{CHAT_ROUTE, RAG_CHAT_ROUTE};

/// Response body of an opened chat stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, ChatError>>;

/// Body of a plain chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    pub message: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Body of a document-augmented chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRequestBody {
    pub question: String,
    pub model: String,
    pub max_results: u32,
}

/// One chat request as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatRequest {
    Chat(ChatRequestBody),
    Rag(RagRequestBody),
}

impl ChatRequest {
    #[must_use]
    pub fn route(&self) -> &'static str {
        match self {
            ChatRequest::Chat(_) => CHAT_ROUTE,
            ChatRequest::Rag(_) => RAG_CHAT_ROUTE,
        }
    }
}

/// Where a chat session gets its response bytes from.
pub trait ChatBackend: Send + Sync {
    /// Send `request` and return the response body as a byte stream.
    ///
    /// A non-success status or a missing body is an error, reported before
    /// any bytes are handed back.
    fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ByteStream, ChatError>> + Send;
}

/// `ChatBackend` that posts to a relay (or directly to the chat service)
/// over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatBackend {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn url_for(&self, request: &ChatRequest) -> String {
        format!("{}{}", self.base_url, request.route())
    }
}

impl ChatBackend for HttpChatBackend {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        let response = self
            .client
            .post(self.url_for(request))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::UpstreamStatus {
                status: status.as_u16(),
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(ChatError::MissingBody);
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChatError::from))
            .boxed())
    }
}
