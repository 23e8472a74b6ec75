// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI chat-completions API.
//!
//! Provides [`OpenAiClient`] which handles authentication, the per-request
//! timeout, and bounded retry of transient failures.

use std::time::Duration;

use dmpilot_config::model::OpenAiConfig;
use dmpilot_core::DmpilotError;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, ChatCompletionRequest, ChatCompletionResponse};

/// Exponential backoff with additive jitter, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial: Duration::from_millis(config.backoff_initial_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Delay before retry number `retry` (1-based), given a jitter sample in
    /// `[0, jitter]`.
    pub fn delay(&self, retry: u32, jitter_sample: Duration) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        let base = self.initial.saturating_mul(factor);
        base.saturating_add(jitter_sample).min(self.max)
    }

    fn sample_jitter(&self) -> Duration {
        let cap = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if cap == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }
}

/// Outcome of a single attempt that did not produce a response.
enum AttemptError {
    /// Timeout, connection failure, or provider rate limit.
    Transient(DmpilotError),
    /// Anything else: auth failures, malformed requests, bad bodies.
    Fatal(DmpilotError),
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(api_key: &str, config: &OpenAiConfig) -> Result<Self, DmpilotError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                DmpilotError::Config(format!("invalid API key header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| DmpilotError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Sends a completion request, retrying transient failures.
    ///
    /// Non-transient failures return immediately. After the last attempt the
    /// most recent transient error is returned.
    pub async fn create_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, DmpilotError> {
        let mut attempt = 1;
        loop {
            match self.attempt(request).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) if attempt >= self.retry.max_attempts => {
                    warn!(attempts = attempt, error = %e, "completion retries exhausted");
                    return Err(e);
                }
                Err(AttemptError::Transient(e)) => {
                    let delay = self.retry.delay(attempt, self.retry.sample_jitter());
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient completion error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AttemptError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        debug!(status = %status, "completion response received");

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| self.classify_transport(e))?;
            return serde_json::from_str(&body).map_err(|e| {
                AttemptError::Fatal(DmpilotError::Provider {
                    message: format!("failed to parse API response: {e}"),
                    source: Some(Box::new(e)),
                })
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => format!(
                "OpenAI API error ({}): {}",
                api_err.error.type_.as_deref().unwrap_or("unknown"),
                api_err.error.message
            ),
            Err(_) => format!("API returned {status}: {body}"),
        };
        let error = DmpilotError::Provider {
            message,
            source: None,
        };

        if is_transient_status(status) {
            Err(AttemptError::Transient(error))
        } else {
            Err(AttemptError::Fatal(error))
        }
    }

    fn classify_transport(&self, e: reqwest::Error) -> AttemptError {
        if e.is_timeout() {
            AttemptError::Transient(DmpilotError::Timeout {
                duration: self.timeout,
            })
        } else if e.is_connect() {
            AttemptError::Transient(DmpilotError::Provider {
                message: format!("connection failed: {e}"),
                source: Some(Box::new(e)),
            })
        } else {
            AttemptError::Fatal(DmpilotError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })
        }
    }
}

/// Only provider rate limiting is retried at the HTTP status level.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            jitter: Duration::ZERO,
        }
    }

    fn test_client(base_url: &str, max_attempts: u32) -> OpenAiClient {
        OpenAiClient::new("sk-test", &OpenAiConfig::default())
            .unwrap()
            .with_base_url(base_url.to_string())
            .with_retry(fast_retry(max_attempts))
    }

    fn test_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-5-nano".into(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: "hey".into(),
            }],
            temperature: None,
            max_tokens: None,
            max_completion_tokens: Some(3000),
        }
    }

    fn success_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-5-nano",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132}
        })
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            jitter: Duration::from_secs(2),
        };
        assert_eq!(policy.delay(1, Duration::ZERO), Duration::from_secs(1));
        assert_eq!(policy.delay(2, Duration::ZERO), Duration::from_secs(2));
        assert_eq!(
            policy.delay(2, Duration::from_millis(1500)),
            Duration::from_millis(3500)
        );
        assert_eq!(policy.delay(6, Duration::ZERO), Duration::from_secs(10));
    }

    #[test]
    fn jitter_sample_stays_in_range() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            jitter: Duration::from_millis(2000),
        };
        for _ in 0..100 {
            assert!(policy.sample_jitter() <= Duration::from_millis(2000));
        }
    }

    #[tokio::test]
    async fn completion_success_sends_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"max_completion_tokens": 3000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("hi!")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        let resp = client.create_completion(&test_request()).await.unwrap();
        assert_eq!(
            resp.choices[0].message.as_ref().unwrap().content.as_deref(),
            Some("hi!")
        );
        assert_eq!(resp.usage.unwrap().prompt_tokens, 120);
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit reached", "type": "requests"}
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("after retry")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        let resp = client.create_completion(&test_request()).await.unwrap();
        assert_eq!(resp.id, "chatcmpl-1");
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit reached", "type": "requests"}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        let err = client.create_completion(&test_request()).await.unwrap_err();
        assert!(err.to_string().contains("Rate limit reached"), "got: {err}");
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        let err = client.create_completion(&test_request()).await.unwrap_err();
        assert!(err.to_string().contains("invalid_request_error"), "got: {err}");
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        assert!(client.create_completion(&test_request()).await.is_err());
    }

    #[tokio::test]
    async fn timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(success_body("slow"))
                    .set_delay(Duration::from_secs(3)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let config = OpenAiConfig {
            timeout_secs: 1,
            ..OpenAiConfig::default()
        };
        let client = OpenAiClient::new("sk-test", &config)
            .unwrap()
            .with_base_url(server.uri())
            .with_retry(fast_retry(2));
        let err = client.create_completion(&test_request()).await.unwrap_err();
        assert!(matches!(err, DmpilotError::Timeout { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn malformed_success_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        let err = client.create_completion(&test_request()).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse"), "got: {err}");
    }
}
