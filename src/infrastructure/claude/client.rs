use reqwest::{header, Client as ReqwestClient, Response};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::errors::ClaudeApiError;
use super::retry::RetryPolicy;
use super::types::{MessageRequest, MessageResponse};
use crate::domain::models::{OracleConfig, RetryConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the Claude HTTP client
#[derive(Debug, Clone)]
pub struct ClaudeClientConfig {
    /// Anthropic API key
    pub api_key: String,
    /// Base URL for the Claude API
    pub base_url: String,
    /// Maximum retry attempts
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClaudeClientConfig {
    pub fn from_config(api_key: String, oracle: &OracleConfig, retry: &RetryConfig) -> Self {
        Self {
            api_key,
            base_url: oracle.base_url.trim_end_matches('/').to_string(),
            max_retries: retry.max_retries,
            initial_backoff_ms: retry.initial_backoff_ms,
            max_backoff_ms: retry.max_backoff_ms,
            timeout_secs: oracle.timeout_secs,
        }
    }
}

/// HTTP client for the Anthropic Messages API
///
/// - Connection pooling and reuse
/// - Exponential backoff retry on transient errors
/// - Structured error classification
pub struct ClaudeClient {
    http_client: ReqwestClient,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl ClaudeClient {
    pub fn new(config: ClaudeClientConfig) -> Result<Self, ClaudeApiError> {
        info!(
            base_url = %config.base_url,
            timeout_secs = config.timeout_secs,
            max_retries = config.max_retries,
            "Initializing Claude API client"
        );

        let mut api_key = header::HeaderValue::from_str(&config.api_key)
            .map_err(|e| ClaudeApiError::InvalidRequest(format!("Invalid API key: {e}")))?;
        api_key.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert("x-api-key", api_key);
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http_client = ReqwestClient::builder()
            .pool_max_idle_per_host(2)
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_nodelay(true)
            .default_headers(headers)
            .build()
            .map_err(ClaudeApiError::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: config.base_url,
            retry_policy: RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
        })
    }

    /// Send a message and wait for the complete response
    #[instrument(skip(self, request), fields(model = %request.model, max_tokens = request.max_tokens))]
    pub async fn send_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ClaudeApiError> {
        let result = self
            .retry_policy
            .execute(|| self.execute_message_request(request))
            .await;

        if let Ok(response) = &result {
            info!(
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Message request succeeded"
            );
        }

        result
    }

    async fn execute_message_request(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ClaudeApiError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(%url, "POST");

        let response = self.http_client.post(&url).json(request).send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response(response: Response) -> Result<MessageResponse, ClaudeApiError> {
        let status = response.status();
        debug!(%status, "Response status");

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            warn!(%status, body = %body, "API error");
            return Err(ClaudeApiError::from_status(status, body));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> ClaudeClientConfig {
        ClaudeClientConfig {
            api_key: "test-api-key".to_string(),
            base_url: base_url.to_string(),
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_config_from_settings_trims_slash() {
        let oracle = OracleConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        let config = ClaudeClientConfig::from_config("k".to_string(), &oracle, &RetryConfig::default());
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_secs, 300);
    }

    #[test]
    fn test_invalid_api_key_header_rejected() {
        let mut bad = config("http://localhost");
        bad.api_key = "line\nbreak".to_string();
        assert!(matches!(
            ClaudeClient::new(bad),
            Err(ClaudeApiError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_send_message_sets_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-api-key")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(200)
            .with_body(
                r#"{"id":"msg_1","type":"message","role":"assistant","model":"m",
                   "content":[{"type":"text","text":"hi"}],"stop_reason":"end_turn",
                   "usage":{"input_tokens":3,"output_tokens":1}}"#,
            )
            .create_async()
            .await;

        let client = ClaudeClient::new(config(&server.url())).unwrap();
        let response = client
            .send_message(&MessageRequest::simple_message("m", "hello", 16))
            .await
            .unwrap();

        assert_eq!(response.text(), "hi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let client = ClaudeClient::new(config(&server.url())).unwrap();
        let result = client
            .send_message(&MessageRequest::simple_message("m", "hello", 16))
            .await;

        assert!(matches!(result, Err(ClaudeApiError::ServerError(_, _))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = ClaudeClient::new(config(&server.url())).unwrap();
        let result = client
            .send_message(&MessageRequest::simple_message("m", "hello", 16))
            .await;

        assert!(matches!(result, Err(ClaudeApiError::InvalidApiKey)));
        mock.assert_async().await;
    }
}
