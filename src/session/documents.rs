//! The document store behind the retrieval-augmented chat.
//!
//! Documents are owned by the chat service; this client only lists,
//! uploads and deletes them, and always hands back the refreshed list.

use serde::{Deserialize, Serialize};

use crate::config::DocumentsConfig;
use crate::error::ChatError;

pub const DOCUMENTS_ROUTE: &str = "/api/rag/documents";
pub const UPLOAD_ROUTE: &str = "/api/rag/upload";

/// A document registered with the retrieval backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub uploaded_at: String,
}

/// Check a file against the upload rules before anything is sent.
///
/// # Errors
///
/// Returns [`ChatError::Validation`] for a disallowed extension (compared
/// case-insensitively) or a file above the size ceiling.
pub fn validate_upload(
    file_name: &str,
    size: u64,
    config: &DocumentsConfig,
) -> Result<(), ChatError> {
    let lower = file_name.to_ascii_lowercase();
    let allowed = config
        .allowed_extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()));
    if !allowed {
        return Err(ChatError::Validation(format!(
            "Unsupported file type: {file_name} (allowed: {})",
            config.allowed_extensions.join(", ")
        )));
    }
    if size > config.max_file_size_bytes {
        return Err(ChatError::Validation(format!(
            "File too large: {size} bytes (max {} bytes)",
            config.max_file_size_bytes
        )));
    }
    Ok(())
}

/// HTTP client for the document endpoints.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    client: reqwest::Client,
    base_url: String,
    rules: DocumentsConfig,
}

impl DocumentClient {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, rules: DocumentsConfig) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rules,
        }
    }

    /// Fetch every registered document.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UpstreamStatus`] on a non-success status and
    /// [`ChatError::Transport`] when the request or JSON decoding fails.
    pub async fn list(&self) -> Result<Vec<Document>, ChatError> {
        let response = self
            .client
            .get(format!("{}{DOCUMENTS_ROUTE}", self.base_url))
            .send()
            .await?;
        let response = check_status(response)?;
        Ok(response.json::<Vec<Document>>().await?)
    }

    /// Upload one file as the multipart `file` field, then re-fetch the list.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] without touching the network when
    /// the file breaks the upload rules; otherwise as [`DocumentClient::list`].
    pub async fn upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Vec<Document>, ChatError> {
        validate_upload(file_name, contents.len() as u64, &self.rules)?;

        let part = reqwest::multipart::Part::bytes(contents).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(format!("{}{UPLOAD_ROUTE}", self.base_url))
            .multipart(form)
            .send()
            .await?;
        check_status(response)?;
        tracing::debug!(file_name, "document uploaded");
        self.list().await
    }

    /// Delete a document by id, then re-fetch the list.
    ///
    /// # Errors
    ///
    /// As [`DocumentClient::list`].
    pub async fn delete(&self, id: i64) -> Result<Vec<Document>, ChatError> {
        let response = self
            .client
            .delete(format!("{}{DOCUMENTS_ROUTE}/{id}", self.base_url))
            .send()
            .await?;
        check_status(response)?;
        tracing::debug!(id, "document deleted");
        self.list().await
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ChatError::UpstreamStatus {
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_json_is_camel_case() {
        let doc: Document = serde_json::from_str(
            r#"{"id":3,"fileName":"notes.txt","fileType":"text/plain","fileSize":12,"uploadedAt":"2024-05-01T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(doc.id, 3);
        assert_eq!(doc.file_name, "notes.txt");
        assert_eq!(doc.file_size, 12);
    }

    #[test]
    fn test_validate_upload_extensions() {
        let rules = DocumentsConfig::default();
        assert!(validate_upload("report.PDF", 10, &rules).is_ok());
        assert!(validate_upload("notes.txt", 10, &rules).is_ok());
        let err = validate_upload("image.png", 10, &rules).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(!err.is_upstream_unavailable());
    }

    #[test]
    fn test_validate_upload_size_ceiling() {
        let rules = DocumentsConfig::default();
        assert!(validate_upload("a.docx", 10 * 1024 * 1024, &rules).is_ok());
        assert!(validate_upload("a.docx", 10 * 1024 * 1024 + 1, &rules).is_err());
    }

    #[tokio::test]
    async fn test_invalid_upload_never_hits_network() {
        // Port 9 on an unroutable host: any request would fail as Transport.
        let client = DocumentClient::new(
            reqwest::Client::new(),
            "http://192.0.2.1:9",
            DocumentsConfig::default(),
        );
        let err = client.upload("virus.exe", vec![0; 4]).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }
}
