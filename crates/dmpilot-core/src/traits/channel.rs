// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for the messaging platform's outbound API.

use async_trait::async_trait;

use crate::error::DmpilotError;
use crate::traits::adapter::PluginAdapter;
use crate::types::TenantConnection;

/// Outbound side of a messaging platform.
///
/// Inbound traffic arrives through the webhook gateway, so channel adapters
/// only send replies and look up sender profiles.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Sends `text` to `recipient_id` using the connection's credential and page.
    ///
    /// Any non-success response is an error. Callers must not retry: a failed
    /// send cannot be told apart from a lost acknowledgment.
    async fn send_text(
        &self,
        connection: &TenantConnection,
        recipient_id: &str,
        text: &str,
    ) -> Result<(), DmpilotError>;

    /// Resolves a sender's platform username, lowercased.
    ///
    /// `Ok(None)` means the platform returned no username.
    async fn fetch_username(
        &self,
        connection: &TenantConnection,
        sender_id: &str,
    ) -> Result<Option<String>, DmpilotError>;
}
