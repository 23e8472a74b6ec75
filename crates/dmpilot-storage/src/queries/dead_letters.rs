// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capture of batches the worker pool could not process.

use dmpilot_core::types::DeadLetter;
use dmpilot_core::DmpilotError;
use rusqlite::params;

use crate::database::Database;

pub async fn insert_dead_letter(db: &Database, letter: &DeadLetter) -> Result<(), DmpilotError> {
    let letter = letter.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO webhook_dead_letters (source, payload_json, reason, retries)
                 VALUES (?1, ?2, ?3, ?4)",
                params![letter.source, letter.payload_json, letter.reason, letter.retries],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Number of captured dead letters.
pub async fn count(db: &Database) -> Result<i64, DmpilotError> {
    db.connection()
        .call(|conn| {
            let n = conn.query_row("SELECT COUNT(*) FROM webhook_dead_letters", [], |row| {
                row.get(0)
            })?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
