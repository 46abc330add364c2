use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(filter) = env_filter_for(log_level) else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

fn env_filter_for(log_level: &str) -> Option<EnvFilter> {
    let level = log_level.to_uppercase();
    if level == "DISABLED" {
        return None;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    Some(EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO")))
}

/// How the relay answered a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Upstream was already streaming; bytes were piped through.
    Passthrough,
    /// Upstream returned one document; the relay wrapped it as a stream.
    Synthesized,
}

impl RelayMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelayMode::Passthrough => "passthrough",
            RelayMode::Synthesized => "synthesized",
        }
    }
}

/// Log the moment a relay response starts flowing back to the client.
pub fn log_relay_started(
    request_id: uuid::Uuid,
    route: &str,
    upstream_status: u16,
    mode: RelayMode,
    start: Instant,
) {
    tracing::info!(
        request_id = %request_id,
        route,
        upstream_status,
        mode = mode.as_str(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "relay response started"
    );
}
