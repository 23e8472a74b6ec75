// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator-triggered delivery of replies withheld in manual review mode.

use std::sync::Arc;

use dmpilot_config::DmpilotConfig;
use dmpilot_core::{ChannelAdapter, DmpilotError, QuotaNotifier, StorageAdapter};
use tracing::info;

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::processor::LegacyAccount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualSendOutcome {
    NotFound,
    /// The row is inbound, or its reply was already sent.
    NotPending,
    /// The row's connection is gone, inactive, or has no token.
    Unroutable,
    SendFailed,
    Sent,
    AlreadyDispatched,
}

pub struct ManualSender {
    storage: Arc<dyn StorageAdapter>,
    dispatcher: Arc<Dispatcher>,
    legacy: Option<LegacyAccount>,
}

impl ManualSender {
    pub(crate) fn new(
        storage: Arc<dyn StorageAdapter>,
        dispatcher: Arc<Dispatcher>,
        legacy: Option<LegacyAccount>,
    ) -> Self {
        Self {
            storage,
            dispatcher,
            legacy,
        }
    }

    /// A sender with its own dispatcher, for operator tooling that runs
    /// without the AI provider.
    pub fn standalone(
        config: &DmpilotConfig,
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        notifier: Arc<dyn QuotaNotifier>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            channel,
            storage.clone(),
            notifier,
            config.plans.warning_threshold,
        ));
        Self::new(storage, dispatcher, LegacyAccount::from_config(&config.instagram))
    }

    /// Send a stored, undispatched reply now.
    pub async fn send_now(&self, message_id: i64) -> Result<ManualSendOutcome, DmpilotError> {
        let Some(message) = self.storage.message(message_id).await? else {
            return Ok(ManualSendOutcome::NotFound);
        };
        let Some(text) = message.outbound_text.filter(|_| !message.dispatched) else {
            return Ok(ManualSendOutcome::NotPending);
        };

        let connection = match message.connection_id {
            Some(connection_id) => self.storage.connection_by_id(connection_id).await?,
            None => self.legacy.as_ref().map(LegacyAccount::connection),
        };
        let Some(connection) = connection.filter(|c| c.active && !c.send_credential.is_empty())
        else {
            info!(message_id, connection_id = ?message.connection_id, "manual send unroutable");
            return Ok(ManualSendOutcome::Unroutable);
        };

        let outcome = self
            .dispatcher
            .dispatch(&connection, &message.sender_platform_id, &text, message_id)
            .await?;
        Ok(match outcome {
            DispatchOutcome::Sent => ManualSendOutcome::Sent,
            DispatchOutcome::AlreadyDispatched => ManualSendOutcome::AlreadyDispatched,
            DispatchOutcome::SendFailed => ManualSendOutcome::SendFailed,
        })
    }
}
