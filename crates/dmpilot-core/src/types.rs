// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the webhook gateway, the pipeline, and the adapters.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Storage,
    Observability,
}

// --- Inbound ---

/// One platform message notification, as normalized from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub page_id: String,
    pub text: String,
    /// Platform timestamp in milliseconds; 0 when the platform omitted it.
    pub timestamp: i64,
    /// Platform message id (`mid`). `None` disables deduplication for the event.
    pub message_id: Option<String>,
}

/// All events from one sender within one webhook delivery.
///
/// Events are kept sorted ascending by timestamp, so the last event carries
/// the routing fields for the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderBatch {
    pub sender_id: String,
    events: Vec<InboundEvent>,
}

impl SenderBatch {
    /// Builds a batch, sorting the events by timestamp.
    ///
    /// The sort is stable: events sharing a timestamp keep delivery order.
    pub fn new(sender_id: impl Into<String>, mut events: Vec<InboundEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self {
            sender_id: sender_id.into(),
            events,
        }
    }

    /// Events in processing order (oldest first).
    pub fn events(&self) -> &[InboundEvent] {
        &self.events
    }

    /// The latest event, which determines `recipient_id` and `page_id`.
    pub fn routing_event(&self) -> Option<&InboundEvent> {
        self.events.last()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Keeps only the events for which `keep` returns true, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&InboundEvent) -> bool) {
        self.events.retain(keep);
    }
}

// --- Tenancy ---

/// A tenant's link to one platform business account.
///
/// `connection_id` and `owner_user_id` are both `None` for the legacy
/// default account configured outside the connections table.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantConnection {
    pub connection_id: Option<i64>,
    pub owner_user_id: Option<i64>,
    pub platform_user_id: String,
    pub platform_page_id: String,
    pub send_credential: String,
    pub active: bool,
}

impl TenantConnection {
    /// The legacy default account used when no connection row matches.
    pub fn legacy(platform_user_id: &str, send_credential: &str) -> Self {
        Self {
            connection_id: None,
            owner_user_id: None,
            platform_user_id: platform_user_id.to_string(),
            platform_page_id: platform_user_id.to_string(),
            send_credential: send_credential.to_string(),
            active: true,
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.connection_id.is_none()
    }

    /// Key used for per-tenant rate limiting and logging.
    pub fn tenant_key(&self) -> String {
        match self.owner_user_id {
            Some(id) => id.to_string(),
            None => "legacy".to_string(),
        }
    }
}

impl std::fmt::Debug for TenantConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnection")
            .field("connection_id", &self.connection_id)
            .field("owner_user_id", &self.owner_user_id)
            .field("platform_user_id", &self.platform_user_id)
            .field("platform_page_id", &self.platform_page_id)
            .field("send_credential", &"[redacted]")
            .field("active", &self.active)
            .finish()
    }
}

// --- Quota ---

/// Reply quota counters from the owner's account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub user_id: i64,
    pub monthly_used: i64,
    pub monthly_limit: i64,
    pub purchased_total: i64,
    pub purchased_used: i64,
    pub paused: bool,
    /// Timestamp of the last monthly rollover, if any.
    pub last_reset: Option<String>,
    pub email: Option<String>,
}

impl QuotaState {
    /// Replies the tenant may still dispatch.
    pub fn remaining(&self) -> i64 {
        ((self.monthly_limit + self.purchased_total) - (self.monthly_used + self.purchased_used))
            .max(0)
    }
}

/// Monthly allotments applied on rollover, by plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanAllotments {
    pub starter_monthly: i64,
    pub standard_monthly: i64,
}

/// Which quota bucket absorbed a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QuotaBucket {
    Monthly,
    Purchased,
}

/// Outcome of a successful quota increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyCountUpdate {
    pub bucket: QuotaBucket,
    pub remaining: i64,
    /// Set when this increment crossed a warning threshold not yet notified.
    pub warning: Option<QuotaWarning>,
}

/// A low-quota warning due for the tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaWarning {
    pub user_id: i64,
    pub email: Option<String>,
    pub remaining: i64,
    pub threshold: i64,
}

// --- Conversation ---

/// Role of a chat message sent to the AI provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A persisted conversation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub sender_platform_id: String,
    pub connection_id: Option<i64>,
    pub inbound_text: Option<String>,
    pub outbound_text: Option<String>,
    pub created_at: String,
    pub dispatched: bool,
}

/// A batch the worker could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source: String,
    pub payload_json: String,
    pub reason: String,
    pub retries: u32,
}

// --- Provider ---

/// A chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A chat completion response.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// First choice's message content; `None` when the provider returned none.
    pub content: Option<String>,
    pub model: String,
    pub usage: Option<TokenUsage>,
}
