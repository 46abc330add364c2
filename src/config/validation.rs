use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_session_defaults(config)?;
    validate_documents(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

/// Check a retrieval result count against its cap.
///
/// # Errors
///
/// Returns a description when `value` is zero or above `cap`.
pub fn check_max_results(value: u32, cap: u32) -> Result<(), String> {
    if value == 0 {
        return Err("max_results must be greater than 0".to_string());
    }
    if value > cap {
        return Err(format!("max_results must be at most {cap}, got {value}"));
    }
    Ok(())
}

/// # Errors
///
/// Returns a description when `value` is not a finite number in `[0, 1]`.
pub fn check_similarity_threshold(value: f32) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "similarity_threshold must be within [0, 1], got {value}"
        ));
    }
    Ok(())
}

/// # Errors
///
/// Returns a description when `value` is set and not within `[0, 2]`.
pub fn check_temperature(value: Option<f32>) -> Result<(), String> {
    match value {
        Some(t) if !(0.0..=2.0).contains(&t) => {
            Err(format!("temperature must be within [0, 2], got {t}"))
        }
        _ => Ok(()),
    }
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.request_body_limit_bytes == 0 {
        return Err(validation_err(
            "server.request_body_limit_bytes must be greater than 0",
        ));
    }
    if http::HeaderValue::from_str(&server.cors_allow_origin).is_err() {
        return Err(validation_err(
            "server.cors_allow_origin is not a valid header value",
        ));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let base_url = upstream.base_url.trim();
    if base_url.is_empty() {
        return Err(validation_err("upstream.base_url cannot be empty"));
    }
    let parsed = url::Url::parse(base_url).map_err(|err| {
        validation_err(format!("upstream.base_url is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    for (field, path) in [
        ("chat_path", &upstream.chat_path),
        ("rag_chat_path", &upstream.rag_chat_path),
    ] {
        if !path.starts_with('/') {
            return Err(validation_err(format!(
                "upstream.{field} must start with '/'"
            )));
        }
    }
    Ok(())
}

fn validate_session_defaults(config: &AppConfig) -> Result<(), ConfigError> {
    let session = &config.session;
    if session.model.trim().is_empty() {
        return Err(validation_err("session.model cannot be empty"));
    }
    check_max_results(session.max_results, session.max_results_cap)
        .map_err(|msg| validation_err(format!("session.{msg}")))?;
    check_similarity_threshold(session.similarity_threshold)
        .map_err(|msg| validation_err(format!("session.{msg}")))?;
    check_temperature(session.temperature)
        .map_err(|msg| validation_err(format!("session.{msg}")))?;
    Ok(())
}

fn validate_documents(config: &AppConfig) -> Result<(), ConfigError> {
    let documents = &config.documents;
    if documents.max_file_size_bytes == 0 {
        return Err(validation_err(
            "documents.max_file_size_bytes must be greater than 0",
        ));
    }
    if documents.allowed_extensions.is_empty() {
        return Err(validation_err(
            "documents.allowed_extensions cannot be empty",
        ));
    }
    if let Some(bad) = documents
        .allowed_extensions
        .iter()
        .find(|ext| !ext.starts_with('.') || ext.len() < 2)
    {
        return Err(validation_err(format!(
            "documents.allowed_extensions entry '{bad}' must look like '.ext'"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn test_valid_config() {
        let config = make_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = make_valid_config();
        config.upstream.base_url = "ftp://backend".to_string();
        assert!(validate_config(&config).is_err());

        config.upstream.base_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_path_must_be_absolute() {
        let mut config = make_valid_config();
        config.upstream.chat_path = "api/ai/chat".to_string();
        let msg = validate_config(&config).unwrap_err().to_string();
        assert!(msg.contains("chat_path"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = make_valid_config();
        config.features.log_level = "VERBOSE".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = make_valid_config();
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_pool_max_idle_per_host() {
        let mut config = make_valid_config();
        config.server.http_pool_max_idle_per_host = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = make_valid_config();
        config.server.timeout = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_max_results_bounds() {
        let mut config = make_valid_config();
        config.session.max_results = 0;
        assert!(validate_config(&config).is_err());

        config.session.max_results = config.session.max_results_cap + 1;
        assert!(validate_config(&config).is_err());

        config.session.max_results = config.session.max_results_cap;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_similarity_threshold_bounds() {
        let mut config = make_valid_config();
        config.session.similarity_threshold = 1.5;
        assert!(validate_config(&config).is_err());

        config.session.similarity_threshold = f32::NAN;
        assert!(validate_config(&config).is_err());

        config.session.similarity_threshold = 0.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_temperature_bounds() {
        assert!(check_temperature(None).is_ok());
        assert!(check_temperature(Some(0.7)).is_ok());
        assert!(check_temperature(Some(-0.1)).is_err());
        assert!(check_temperature(Some(2.5)).is_err());
    }

    #[test]
    fn test_document_extensions() {
        let mut config = make_valid_config();
        config.documents.allowed_extensions = vec![];
        assert!(validate_config(&config).is_err());

        config.documents.allowed_extensions = vec!["pdf".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_cors_origin() {
        let mut config = make_valid_config();
        config.server.cors_allow_origin = "bad\norigin".to_string();
        assert!(validate_config(&config).is_err());
    }
}
