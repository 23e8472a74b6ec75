// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage wrapper that counts every call before delegating.
//!
//! Lets tests assert that a path performs no store work at all, or exactly
//! how many times one operation ran.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use dmpilot_core::persona::PersonaSettings;
use dmpilot_core::types::{
    AdapterType, ChatMessage, DeadLetter, HealthStatus, PlanAllotments, QuotaState,
    ReplyCountUpdate, StoredMessage, TenantConnection,
};
use dmpilot_core::{DmpilotError, PluginAdapter, StorageAdapter};

pub struct CountingStorage<S> {
    inner: Arc<S>,
    calls: DashMap<&'static str, usize>,
}

impl<S: StorageAdapter> CountingStorage<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            calls: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Calls to one operation, by method name.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.get(operation).map_or(0, |count| *count)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    pub fn reset(&self) {
        self.calls.clear();
    }

    fn tick(&self, operation: &'static str) {
        *self.calls.entry(operation).or_default() += 1;
    }
}

#[async_trait]
impl<S: StorageAdapter> PluginAdapter for CountingStorage<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), DmpilotError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl<S: StorageAdapter> StorageAdapter for CountingStorage<S> {
    async fn initialize(&self) -> Result<(), DmpilotError> {
        self.tick("initialize");
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), DmpilotError> {
        self.tick("close");
        self.inner.close().await
    }

    async fn claim_message_id(&self, message_id: &str) -> Result<bool, DmpilotError> {
        self.tick("claim_message_id");
        self.inner.claim_message_id(message_id).await
    }

    async fn claim_billing_event(&self, event_id: &str) -> Result<bool, DmpilotError> {
        self.tick("claim_billing_event");
        self.inner.claim_billing_event(event_id).await
    }

    async fn connection_by_platform_user_id(
        &self,
        platform_user_id: &str,
    ) -> Result<Option<TenantConnection>, DmpilotError> {
        self.tick("connection_by_platform_user_id");
        self.inner.connection_by_platform_user_id(platform_user_id).await
    }

    async fn connection_by_page_id(
        &self,
        page_id: &str,
    ) -> Result<Option<TenantConnection>, DmpilotError> {
        self.tick("connection_by_page_id");
        self.inner.connection_by_page_id(page_id).await
    }

    async fn connection_by_id(
        &self,
        connection_id: i64,
    ) -> Result<Option<TenantConnection>, DmpilotError> {
        self.tick("connection_by_id");
        self.inner.connection_by_id(connection_id).await
    }

    async fn quota_state(
        &self,
        user_id: i64,
        allotments: &PlanAllotments,
    ) -> Result<Option<QuotaState>, DmpilotError> {
        self.tick("quota_state");
        self.inner.quota_state(user_id, allotments).await
    }

    async fn increment_reply_count(
        &self,
        user_id: i64,
        warning_threshold: i64,
    ) -> Result<Option<ReplyCountUpdate>, DmpilotError> {
        self.tick("increment_reply_count");
        self.inner
            .increment_reply_count(user_id, warning_threshold)
            .await
    }

    async fn save_inbound(
        &self,
        sender_id: &str,
        text: &str,
        connection_id: Option<i64>,
    ) -> Result<i64, DmpilotError> {
        self.tick("save_inbound");
        self.inner.save_inbound(sender_id, text, connection_id).await
    }

    async fn save_outbound(
        &self,
        sender_id: &str,
        text: &str,
        connection_id: Option<i64>,
        dispatched: bool,
    ) -> Result<i64, DmpilotError> {
        self.tick("save_outbound");
        self.inner
            .save_outbound(sender_id, text, connection_id, dispatched)
            .await
    }

    async fn mark_dispatched(&self, message_id: i64) -> Result<bool, DmpilotError> {
        self.tick("mark_dispatched");
        self.inner.mark_dispatched(message_id).await
    }

    async fn message(&self, message_id: i64) -> Result<Option<StoredMessage>, DmpilotError> {
        self.tick("message");
        self.inner.message(message_id).await
    }

    async fn history(
        &self,
        sender_id: &str,
        limit: usize,
        connection_id: Option<i64>,
    ) -> Result<Vec<ChatMessage>, DmpilotError> {
        self.tick("history");
        self.inner.history(sender_id, limit, connection_id).await
    }

    async fn persona_settings(
        &self,
        connection_id: i64,
    ) -> Result<Option<PersonaSettings>, DmpilotError> {
        self.tick("persona_settings");
        self.inner.persona_settings(connection_id).await
    }

    async fn record_sender(
        &self,
        connection_id: i64,
        sender_id: &str,
        username: &str,
    ) -> Result<(), DmpilotError> {
        self.tick("record_sender");
        self.inner
            .record_sender(connection_id, sender_id, username)
            .await
    }

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<(), DmpilotError> {
        self.tick("record_dead_letter");
        self.inner.record_dead_letter(letter).await
    }
}
