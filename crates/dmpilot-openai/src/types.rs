// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI chat-completions wire types.

use serde::{Deserialize, Serialize};

/// A single message in the request's `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

/// Request body for `POST /chat/completions`.
///
/// Exactly one of `max_tokens` / `max_completion_tokens` is set, depending
/// on which parameter the model accepts.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Error envelope returned on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_unset_token_params() {
        let req = ChatCompletionRequest {
            model: "gpt-5-nano".into(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            temperature: None,
            max_tokens: None,
            max_completion_tokens: Some(3000),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_completion_tokens"], 3000);
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn response_tolerates_missing_content() {
        let body = r#"{"id":"c1","model":"gpt-5-nano","choices":[{"message":{"role":"assistant","content":null},"finish_reason":"length"}]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(resp.choices[0].message.as_ref().unwrap().content.is_none());
        assert!(resp.usage.is_none());
    }

    #[test]
    fn error_envelope_parses() {
        let body = r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let err: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(err.error.code.as_deref(), Some("invalid_api_key"));
    }
}
