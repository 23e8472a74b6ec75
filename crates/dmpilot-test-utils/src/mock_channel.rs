// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging channel: captures sends and answers username lookups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use tokio::sync::Mutex;

use dmpilot_core::traits::{ChannelAdapter, PluginAdapter};
use dmpilot_core::types::{AdapterType, HealthStatus, TenantConnection};
use dmpilot_core::DmpilotError;

/// One captured outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub page_id: String,
    pub recipient_id: String,
    pub text: String,
}

#[derive(Default)]
pub struct MockChannel {
    sent: Mutex<Vec<SentMessage>>,
    usernames: Mutex<HashMap<String, String>>,
    fail_sends: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Username returned for `sender_id` lookups.
    pub async fn set_username(&self, sender_id: &str, username: &str) {
        self.usernames
            .lock()
            .await
            .insert(sender_id.to_string(), username.to_lowercase());
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DmpilotError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn send_text(
        &self,
        connection: &TenantConnection,
        recipient_id: &str,
        text: &str,
    ) -> Result<(), DmpilotError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(DmpilotError::Channel {
                message: "mock send rejected".to_string(),
                source: None,
            });
        }
        self.sent.lock().await.push(SentMessage {
            page_id: connection.platform_page_id.clone(),
            recipient_id: recipient_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn fetch_username(
        &self,
        _connection: &TenantConnection,
        sender_id: &str,
    ) -> Result<Option<String>, DmpilotError> {
        Ok(self.usernames.lock().await.get(sender_id).cloned())
    }
}
