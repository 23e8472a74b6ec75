// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery of a stored reply and the bookkeeping that follows it.

use std::sync::Arc;

use dmpilot_core::types::TenantConnection;
use dmpilot_core::{ChannelAdapter, DmpilotError, QuotaNotifier, StorageAdapter};
use tracing::{info, warn};

use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// The send went out but another path had already marked the row.
    AlreadyDispatched,
    SendFailed,
}

/// Sends a persisted reply, marks it dispatched, and consumes quota.
///
/// Quota is only consumed by the caller whose conditional mark succeeds,
/// so a reply is counted at most once however many paths send it.
pub struct Dispatcher {
    channel: Arc<dyn ChannelAdapter>,
    storage: Arc<dyn StorageAdapter>,
    notifier: Arc<dyn QuotaNotifier>,
    warning_threshold: i64,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn ChannelAdapter>,
        storage: Arc<dyn StorageAdapter>,
        notifier: Arc<dyn QuotaNotifier>,
        warning_threshold: i64,
    ) -> Self {
        Self {
            channel,
            storage,
            notifier,
            warning_threshold,
        }
    }

    pub async fn dispatch(
        &self,
        connection: &TenantConnection,
        recipient_id: &str,
        text: &str,
        message_id: i64,
    ) -> Result<DispatchOutcome, DmpilotError> {
        if let Err(e) = self.channel.send_text(connection, recipient_id, text).await {
            warn!(
                message_id,
                recipient_id,
                connection_id = ?connection.connection_id,
                error = %e,
                "reply send failed, left pending"
            );
            metrics::send_failure();
            return Ok(DispatchOutcome::SendFailed);
        }

        if !self.storage.mark_dispatched(message_id).await? {
            warn!(message_id, "reply was already marked dispatched");
            return Ok(DispatchOutcome::AlreadyDispatched);
        }
        metrics::reply_dispatched();

        if let Some(user_id) = connection.owner_user_id {
            match self
                .storage
                .increment_reply_count(user_id, self.warning_threshold)
                .await?
            {
                Some(update) => {
                    if let Some(warning) = update.warning
                        && let Err(e) = self.notifier.quota_warning(&warning).await
                    {
                        warn!(user_id, error = %e, "quota warning notification failed");
                    }
                }
                None => warn!(user_id, message_id, "reply sent with no quota left to consume"),
            }
        }

        info!(message_id, recipient_id, "reply dispatched");
        Ok(DispatchOutcome::Sent)
    }
}
