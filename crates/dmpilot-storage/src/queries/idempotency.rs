// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-writer-wins claims on upstream event identifiers.
//!
//! A claim is a single `INSERT OR IGNORE`; the affected row count tells
//! the caller whether it won. There is no read-then-write window.

use dmpilot_core::DmpilotError;
use rusqlite::params;
use tracing::warn;

use crate::database::Database;

/// One claim table per upstream event-id namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ClaimNamespace {
    /// Platform message ids from the messaging webhook.
    PlatformMessage,
    /// Event ids from the billing provider's webhook.
    BillingEvent,
}

impl ClaimNamespace {
    fn insert_sql(self) -> &'static str {
        match self {
            Self::PlatformMessage => {
                "INSERT OR IGNORE INTO processed_message_ids (message_id) VALUES (?1)"
            }
            Self::BillingEvent => {
                "INSERT OR IGNORE INTO billing_webhook_events (event_id) VALUES (?1)"
            }
        }
    }

    fn create_sql(self) -> &'static str {
        match self {
            Self::PlatformMessage => {
                "CREATE TABLE IF NOT EXISTS processed_message_ids (
                    message_id TEXT PRIMARY KEY NOT NULL,
                    processed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );"
            }
            Self::BillingEvent => {
                "CREATE TABLE IF NOT EXISTS billing_webhook_events (
                    event_id TEXT PRIMARY KEY NOT NULL,
                    processed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );"
            }
        }
    }
}

/// Record `id` in `namespace`. Returns true iff this call inserted it.
///
/// If the insert fails (for example because the table was dropped), the
/// table is recreated and the claim retried once. A second failure propagates.
pub async fn claim(
    db: &Database,
    namespace: ClaimNamespace,
    id: &str,
) -> Result<bool, DmpilotError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            match conn.execute(namespace.insert_sql(), params![id]) {
                Ok(rows) => Ok(rows > 0),
                Err(e) => {
                    warn!(%namespace, error = %e, "claim failed, recreating claim table");
                    conn.execute_batch(namespace.create_sql())?;
                    let rows = conn.execute(namespace.insert_sql(), params![id])?;
                    Ok(rows > 0)
                }
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}
