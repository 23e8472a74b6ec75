// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dmpilot send` command: deliver a reply withheld by manual review.

use std::sync::Arc;

use dmpilot_config::DmpilotConfig;
use dmpilot_core::{DmpilotError, LogNotifier, StorageAdapter};
use dmpilot_instagram::GraphChannel;
use dmpilot_pipeline::{ManualSendOutcome, ManualSender};
use dmpilot_storage::SqliteStorage;

pub async fn run_send(
    config: DmpilotConfig,
    message_id: i64,
) -> Result<ManualSendOutcome, DmpilotError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    let channel = Arc::new(GraphChannel::new(&config.instagram)?);

    let sender = ManualSender::standalone(&config, storage.clone(), channel, Arc::new(LogNotifier));
    let outcome = sender.send_now(message_id).await;

    storage.close().await?;
    outcome
}

pub fn succeeded(outcome: ManualSendOutcome) -> bool {
    matches!(
        outcome,
        ManualSendOutcome::Sent | ManualSendOutcome::AlreadyDispatched
    )
}

pub fn describe(message_id: i64, outcome: ManualSendOutcome) -> String {
    match outcome {
        ManualSendOutcome::Sent => format!("message {message_id}: sent"),
        ManualSendOutcome::AlreadyDispatched => {
            format!("message {message_id}: sent, but another sender had already marked it")
        }
        ManualSendOutcome::NotFound => format!("message {message_id}: no such message"),
        ManualSendOutcome::NotPending => {
            format!("message {message_id}: not a pending reply (inbound, or already sent)")
        }
        ManualSendOutcome::Unroutable => {
            format!("message {message_id}: its connection is missing, inactive, or has no token")
        }
        ManualSendOutcome::SendFailed => {
            format!("message {message_id}: the platform rejected the send; it is still pending")
        }
    }
}
