// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for AI chat completion services.

use async_trait::async_trait;

use crate::error::DmpilotError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Adapter for chat completion providers.
///
/// Implementations own their transport retry policy; a returned error is
/// terminal for the request.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, DmpilotError>;
}
