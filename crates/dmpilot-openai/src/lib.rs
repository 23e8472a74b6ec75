// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI chat-completions provider adapter for dmpilot.
//!
//! This crate implements [`ProviderAdapter`] on top of [`OpenAiClient`],
//! which owns authentication, timeouts, and bounded retry.

pub mod client;
pub mod types;

use async_trait::async_trait;
use dmpilot_config::model::OpenAiConfig;
use dmpilot_core::traits::{PluginAdapter, ProviderAdapter};
use dmpilot_core::types::{
    AdapterType, ChatMessage, CompletionRequest, CompletionResponse, HealthStatus, TokenUsage,
};
use dmpilot_core::DmpilotError;
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ApiMessage, ChatCompletionRequest, ChatCompletionResponse};

/// OpenAI provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config -> `OPENAI_API_KEY` env var -> error.
pub struct OpenAiProvider {
    client: OpenAiClient,
    default_model: String,
    default_temperature: f32,
    default_max_output_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Result<Self, DmpilotError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(&api_key, config)?;

        info!(
            model = config.model,
            max_attempts = client.retry_policy().max_attempts,
            "OpenAI provider initialized"
        );

        Ok(Self {
            client,
            default_model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_output_tokens: config.max_output_tokens,
        })
    }

    #[cfg(test)]
    fn with_client(client: OpenAiClient, config: &OpenAiConfig) -> Self {
        Self {
            client,
            default_model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_output_tokens: config.max_output_tokens,
        }
    }

    fn to_api_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };
        let params = ModelParams::for_model(&model);
        let max_tokens = request
            .max_output_tokens
            .unwrap_or(self.default_max_output_tokens);

        ChatCompletionRequest {
            messages: request.messages.iter().map(to_api_message).collect(),
            temperature: params
                .supports_temperature
                .then(|| request.temperature.unwrap_or(self.default_temperature)),
            max_tokens: (!params.uses_max_completion_tokens).then_some(max_tokens),
            max_completion_tokens: params.uses_max_completion_tokens.then_some(max_tokens),
            model,
        }
    }
}

/// Which optional parameters a model family accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModelParams {
    supports_temperature: bool,
    uses_max_completion_tokens: bool,
}

impl ModelParams {
    fn for_model(model: &str) -> Self {
        // Reasoning models reject `temperature` and the legacy `max_tokens`.
        let o_series = model
            .strip_prefix('o')
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()));
        let reasoning = model.starts_with("gpt-5") || o_series;
        Self {
            supports_temperature: !reasoning,
            uses_max_completion_tokens: reasoning,
        }
    }
}

fn to_api_message(message: &ChatMessage) -> ApiMessage {
    ApiMessage {
        role: message.role.to_string(),
        content: message.content.clone(),
    }
}

fn to_completion_response(response: ChatCompletionResponse) -> CompletionResponse {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content);

    CompletionResponse {
        content,
        model: response.model,
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
        // No live probe: it would spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DmpilotError> {
        debug!("OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, DmpilotError> {
        let api_request = self.to_api_request(&request);
        let response = self.client.create_completion(&api_request).await?;
        debug!(
            model = response.model,
            choices = response.choices.len(),
            "completion received"
        );
        Ok(to_completion_response(response))
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, DmpilotError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            DmpilotError::Config(
                "OpenAI API key not found. Set openai.api_key in config or OPENAI_API_KEY environment variable.".into(),
            )
        })
}
