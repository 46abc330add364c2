//! One conversation: the ordered message list, its config, and the send
//! operation that streams an assistant reply into it.

pub mod backend;
pub mod documents;

use std::time::SystemTime;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::validation::{check_max_results, check_similarity_threshold, check_temperature};
use crate::config::SessionDefaults;
use crate::error::ChatError;
use crate::protocol::decode_frame;
use crate::stream::frame_stream;
use crate::util::IdGenerator;

use self::backend::{ChatBackend, ChatRequest, ChatRequestBody, RagRequestBody};
use self::documents::{Document, DocumentClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation.
///
/// `id` never changes. A user message's `content` is fixed at creation; an
/// assistant message's `content` only ever grows while its reply streams.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: SystemTime,
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RagConfig {
    pub chat: ChatConfig,
    pub max_results: u32,
    pub similarity_threshold: f32,
}

/// Which flavour of conversation a session runs, with its settings.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionConfig {
    Chat(ChatConfig),
    Rag(RagConfig),
}

impl SessionConfig {
    #[must_use]
    pub fn chat(defaults: &SessionDefaults) -> Self {
        SessionConfig::Chat(chat_config(defaults))
    }

    #[must_use]
    pub fn rag(defaults: &SessionDefaults) -> Self {
        SessionConfig::Rag(RagConfig {
            chat: chat_config(defaults),
            max_results: defaults.max_results,
            similarity_threshold: defaults.similarity_threshold,
        })
    }

    #[must_use]
    pub fn is_rag(&self) -> bool {
        matches!(self, SessionConfig::Rag(_))
    }

    fn validate(&self, max_results_cap: u32) -> Result<(), ChatError> {
        let chat = match self {
            SessionConfig::Chat(chat) => chat,
            SessionConfig::Rag(rag) => {
                check_max_results(rag.max_results, max_results_cap)
                    .and_then(|()| check_similarity_threshold(rag.similarity_threshold))
                    .map_err(ChatError::Validation)?;
                &rag.chat
            }
        };
        if chat.model.trim().is_empty() {
            return Err(ChatError::Validation("model must not be empty".to_string()));
        }
        check_temperature(chat.temperature).map_err(ChatError::Validation)
    }

    fn request_for(&self, text: &str) -> ChatRequest {
        match self {
            SessionConfig::Chat(chat) => ChatRequest::Chat(ChatRequestBody {
                message: text.to_string(),
                model: chat.model.clone(),
                temperature: chat.temperature,
                max_tokens: chat.max_tokens,
            }),
            SessionConfig::Rag(rag) => ChatRequest::Rag(RagRequestBody {
                question: text.to_string(),
                model: rag.chat.model.clone(),
                max_results: rag.max_results,
            }),
        }
    }
}

fn chat_config(defaults: &SessionDefaults) -> ChatConfig {
    ChatConfig {
        model: defaults.model.clone(),
        temperature: defaults.temperature,
        max_tokens: defaults.max_tokens,
    }
}

/// Why a send was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyText,
    Busy,
    NoDocuments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Ignored(IgnoreReason),
    /// A terminal frame arrived or the stream ended.
    Completed,
    /// `cancel()` stopped the read; partial content was kept.
    Cancelled,
}

/// What a renderer sees. Published after every mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub busy: bool,
    pub error: Option<String>,
}

/// Drives chat sends against a [`ChatBackend`].
///
/// At most one send is in flight; a second `send_message` while busy is
/// rejected, not queued.
pub struct ChatSession<B> {
    backend: B,
    view: watch::Sender<SessionSnapshot>,
    config: Mutex<SessionConfig>,
    max_results_cap: u32,
    documents: Mutex<Vec<Document>>,
    cancel: Mutex<CancellationToken>,
    ids: IdGenerator,
}

struct BusyGuard<'a> {
    view: &'a watch::Sender<SessionSnapshot>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.view.send_modify(|view| view.busy = false);
    }
}

impl<B: ChatBackend> ChatSession<B> {
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] when `config` is out of range.
    pub fn new(backend: B, config: SessionConfig, max_results_cap: u32) -> Result<Self, ChatError> {
        config.validate(max_results_cap)?;
        let (view, _) = watch::channel(SessionSnapshot::default());
        Ok(Self {
            backend,
            view,
            config: Mutex::new(config),
            max_results_cap,
            documents: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            ids: IdGenerator::new(),
        })
    }

    /// Send `text` and stream the reply into a new assistant message.
    ///
    /// # Errors
    ///
    /// Returns the [`ChatError`] that ended the send. By then the assistant
    /// placeholder has been removed and the error is exposed via
    /// [`ChatSession::error`]; the user message stays.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ChatError> {
        if text.trim().is_empty() {
            return Ok(SendOutcome::Ignored(IgnoreReason::EmptyText));
        }
        let request = {
            let config = self.config.lock();
            if config.is_rag() && self.documents.lock().is_empty() {
                return Ok(SendOutcome::Ignored(IgnoreReason::NoDocuments));
            }
            config.request_for(text)
        };

        let mut acquired = false;
        self.view.send_if_modified(|view| {
            if view.busy {
                return false;
            }
            view.busy = true;
            acquired = true;
            true
        });
        if !acquired {
            return Ok(SendOutcome::Ignored(IgnoreReason::Busy));
        }
        let _busy = BusyGuard { view: &self.view };

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();

        let user = self.new_message(Role::User, text.to_string(), None);
        let sources = matches!(request, ChatRequest::Rag(_)).then(Vec::new);
        let placeholder = self.new_message(Role::Assistant, String::new(), sources);
        let placeholder_id = placeholder.id.clone();
        self.view.send_modify(|view| {
            view.error = None;
            view.messages.push(user);
            view.messages.push(placeholder);
        });
        tracing::debug!(message_id = %placeholder_id, route = request.route(), "chat send started");

        match self.stream_reply(&placeholder_id, &request, &token).await {
            Ok(SendOutcome::Cancelled) => {
                self.drop_if_empty(&placeholder_id);
                tracing::debug!(message_id = %placeholder_id, "chat send cancelled");
                Ok(SendOutcome::Cancelled)
            }
            Ok(outcome) => {
                tracing::debug!(message_id = %placeholder_id, "chat send completed");
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(message_id = %placeholder_id, error = %err, "chat send failed, rolling back");
                let description = err.to_string();
                self.view.send_modify(|view| {
                    view.messages.retain(|message| message.id != placeholder_id);
                    view.error = Some(description);
                });
                Err(err)
            }
        }
    }

    async fn stream_reply(
        &self,
        placeholder_id: &str,
        request: &ChatRequest,
        token: &CancellationToken,
    ) -> Result<SendOutcome, ChatError> {
        let body = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(SendOutcome::Cancelled),
            opened = self.backend.open_stream(request) => opened?,
        };

        let mut frames = std::pin::pin!(frame_stream(body));
        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return Ok(SendOutcome::Cancelled),
                next = frames.next() => next,
            };
            let Some(frame) = next else {
                return Ok(SendOutcome::Completed);
            };
            let decoded = decode_frame(&frame?);
            if !decoded.delta.is_empty() {
                self.append_delta(placeholder_id, &decoded.delta);
            }
            if decoded.terminal {
                return Ok(SendOutcome::Completed);
            }
        }
    }

    fn append_delta(&self, message_id: &str, delta: &str) {
        self.view.send_if_modified(|view| {
            match view.messages.iter_mut().rev().find(|m| m.id == message_id) {
                Some(message) => {
                    message.content.push_str(delta);
                    true
                }
                // Cleared mid-stream.
                None => false,
            }
        });
    }

    fn drop_if_empty(&self, message_id: &str) {
        self.view.send_if_modified(|view| {
            let before = view.messages.len();
            view.messages
                .retain(|m| m.id != message_id || !m.content.is_empty());
            view.messages.len() != before
        });
    }

    fn new_message(&self, role: Role, content: String, sources: Option<Vec<String>>) -> Message {
        Message {
            id: self.ids.next_uuid().to_string(),
            role,
            content,
            timestamp: SystemTime::now(),
            sources,
        }
    }

    /// Stop the in-flight send, if any. The partial reply is kept.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Empty the message list and the exposed error. Config and documents
    /// are untouched.
    pub fn clear_all(&self) {
        self.view.send_modify(|view| {
            view.messages.clear();
            view.error = None;
        });
    }

    /// Replace the config wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] and keeps the previous config when
    /// `config` is out of range.
    pub fn set_config(&self, config: SessionConfig) -> Result<(), ChatError> {
        config.validate(self.max_results_cap)?;
        *self.config.lock() = config;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config.lock().clone()
    }

    pub fn set_documents(&self, documents: Vec<Document>) {
        *self.documents.lock() = documents;
    }

    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().clone()
    }

    /// Re-fetch the registered documents and store them.
    ///
    /// # Errors
    ///
    /// Propagates the client's error; the stored list is left as it was.
    pub async fn refresh_documents(&self, client: &DocumentClient) -> Result<Vec<Document>, ChatError> {
        let documents = client.list().await?;
        self.set_documents(documents.clone());
        Ok(documents)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.view.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.view.borrow().messages.clone()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.view.borrow().error.clone()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.view.borrow().busy
    }
}
