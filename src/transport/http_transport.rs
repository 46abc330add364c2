use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::RelayError;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client shared by every relayed request and by the chat clients.
///
/// Requests are attempted exactly once; there is no retry layer.
pub struct HttpTransport {
    client: OnceLock<Arc<reqwest::Client>>,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with pooling and timeouts from the given server config.
    ///
    /// The underlying client is built lazily on first use.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        Self {
            client: OnceLock::new(),
            pool_max_idle_per_host: config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout: Duration::from_secs(config.timeout),
        }
    }

    fn build_client(&self) -> Arc<reqwest::Client> {
        match build_reqwest_client(
            self.pool_max_idle_per_host,
            self.pool_idle_timeout,
            self.timeout,
        ) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                Arc::new(reqwest::Client::new())
            }
        }
    }

    /// The shared client. Cloning a `reqwest::Client` shares its pool.
    #[must_use]
    pub fn client(&self) -> reqwest::Client {
        self.client.get_or_init(|| self.build_client()).as_ref().clone()
    }

    /// Forward a JSON body to `url` with a single attempt.
    ///
    /// The returned response is not status-checked; its body may still be
    /// streaming.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the connection or request fails.
    pub async fn post_json(
        &self,
        url: &str,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        self.client()
            .post(url)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| RelayError::Transport(format!("Failed to reach upstream: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_lazy() {
        let transport = HttpTransport::new(&ServerConfig::default());
        assert!(transport.client.get().is_none());
        let _ = transport.client();
        assert!(transport.client.get().is_some());
    }

    #[test]
    fn test_zero_idle_timeout_disables_idle_expiry() {
        let transport = HttpTransport::new(&ServerConfig {
            http_pool_idle_timeout_secs: 0,
            http_pool_max_idle_per_host: 0,
            ..ServerConfig::default()
        });
        assert!(transport.pool_idle_timeout.is_none());
        assert_eq!(transport.pool_max_idle_per_host, 1);
    }

    #[tokio::test]
    async fn test_post_json_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(&ServerConfig::default());
        let err = transport
            .post_json(&format!("http://{addr}/api/ai/chat"), bytes::Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
