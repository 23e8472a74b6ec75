// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory of senders seen per connection, keyed by platform id.

use dmpilot_core::DmpilotError;
use rusqlite::params;

use crate::database::Database;
use crate::queries::now_timestamp;

/// Upsert the sender's latest username and last-seen time.
pub async fn record_sender(
    db: &Database,
    connection_id: i64,
    sender_id: &str,
    username: &str,
) -> Result<(), DmpilotError> {
    let sender_id = sender_id.to_string();
    let username = username.to_string();
    let seen_at = now_timestamp();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_senders (connection_id, sender_id, username, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(connection_id, sender_id)
                 DO UPDATE SET username = excluded.username, last_seen_at = excluded.last_seen_at",
                params![connection_id, sender_id, username, seen_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
