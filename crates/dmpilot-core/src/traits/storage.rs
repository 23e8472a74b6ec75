// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the relational store.
//!
//! The storage backend is chosen once at startup; the pipeline only ever
//! talks to it through this trait. Every counter mutation behind these
//! methods must be a single conditional statement so that multiple
//! replicas can share one store.

use async_trait::async_trait;

use crate::error::DmpilotError;
use crate::persona::PersonaSettings;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChatMessage, DeadLetter, PlanAllotments, QuotaState, ReplyCountUpdate, StoredMessage,
    TenantConnection,
};

#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Opens the backend and applies pending migrations.
    async fn initialize(&self) -> Result<(), DmpilotError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), DmpilotError>;

    // --- Idempotency ---

    /// Atomically records a platform message id. True iff this call recorded it first.
    async fn claim_message_id(&self, message_id: &str) -> Result<bool, DmpilotError>;

    /// Atomically records a billing-provider event id. True iff this call recorded it first.
    async fn claim_billing_event(&self, event_id: &str) -> Result<bool, DmpilotError>;

    // --- Tenant resolution (active connections only) ---

    async fn connection_by_platform_user_id(
        &self,
        platform_user_id: &str,
    ) -> Result<Option<TenantConnection>, DmpilotError>;

    async fn connection_by_page_id(
        &self,
        page_id: &str,
    ) -> Result<Option<TenantConnection>, DmpilotError>;

    async fn connection_by_id(
        &self,
        connection_id: i64,
    ) -> Result<Option<TenantConnection>, DmpilotError>;

    // --- Quota ---

    /// Reads the owner's quota, applying a due monthly rollover first.
    async fn quota_state(
        &self,
        user_id: i64,
        allotments: &PlanAllotments,
    ) -> Result<Option<QuotaState>, DmpilotError>;

    /// Consumes one reply from the monthly allotment, else from purchased replies.
    ///
    /// Returns `None` when neither bucket has capacity.
    async fn increment_reply_count(
        &self,
        user_id: i64,
        warning_threshold: i64,
    ) -> Result<Option<ReplyCountUpdate>, DmpilotError>;

    // --- Conversation ---

    async fn save_inbound(
        &self,
        sender_id: &str,
        text: &str,
        connection_id: Option<i64>,
    ) -> Result<i64, DmpilotError>;

    async fn save_outbound(
        &self,
        sender_id: &str,
        text: &str,
        connection_id: Option<i64>,
        dispatched: bool,
    ) -> Result<i64, DmpilotError>;

    /// Flips an outbound row to dispatched. False if it already was.
    async fn mark_dispatched(&self, message_id: i64) -> Result<bool, DmpilotError>;

    async fn message(&self, message_id: i64) -> Result<Option<StoredMessage>, DmpilotError>;

    /// Last `limit` rows for the sender within one connection scope, oldest first.
    async fn history(
        &self,
        sender_id: &str,
        limit: usize,
        connection_id: Option<i64>,
    ) -> Result<Vec<ChatMessage>, DmpilotError>;

    // --- Tenant settings ---

    async fn persona_settings(
        &self,
        connection_id: i64,
    ) -> Result<Option<PersonaSettings>, DmpilotError>;

    async fn record_sender(
        &self,
        connection_id: i64,
        sender_id: &str,
        username: &str,
    ) -> Result<(), DmpilotError>;

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<(), DmpilotError>;
}
