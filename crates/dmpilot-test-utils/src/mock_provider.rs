// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock AI provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with scripted results,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use tokio::sync::Mutex;

use dmpilot_core::traits::{PluginAdapter, ProviderAdapter};
use dmpilot_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, TokenUsage,
};
use dmpilot_core::DmpilotError;

/// One scripted provider result.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// The call fails as if retries were exhausted.
    Fail,
}

/// A mock provider that returns scripted results.
///
/// Results are popped from a FIFO queue. When the queue is empty, the
/// default result is returned (a fixed text unless changed).
pub struct MockProvider {
    script: Mutex<VecDeque<MockReply>>,
    default: Mutex<MockReply>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(MockReply::Text("mock reply".to_string())),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        let mut provider = Self::new();
        provider.script.get_mut().extend(replies);
        provider
    }

    /// Every call fails until the default is changed again.
    pub fn failing() -> Self {
        let mut provider = Self::new();
        *provider.default.get_mut() = MockReply::Fail;
        provider
    }

    pub async fn push(&self, reply: MockReply) {
        self.script.lock().await.push_back(reply);
    }

    /// Result returned once the script runs out.
    pub async fn set_default(&self, reply: MockReply) {
        *self.default.lock().await = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_reply(&self) -> MockReply {
        let scripted = self.script.lock().await.pop_front();
        match scripted {
            Some(reply) => reply,
            None => self.default.lock().await.clone(),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DmpilotError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, DmpilotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model.clone();
        self.requests.lock().await.push(request);

        match self.next_reply().await {
            MockReply::Text(text) => Ok(CompletionResponse {
                content: Some(text),
                model,
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 20,
                }),
            }),
            MockReply::Fail => Err(DmpilotError::Provider {
                message: "mock provider failure".to_string(),
                source: None,
            }),
        }
    }
}
