// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-connection persona settings.

use dmpilot_core::persona::PersonaSettings;
use dmpilot_core::DmpilotError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

/// Load and validate the persona settings for a connection.
///
/// The stored JSON is parsed into the typed struct here, at the storage
/// boundary. A connection without a settings row yields `None`.
pub async fn persona_settings(
    db: &Database,
    connection_id: i64,
) -> Result<Option<PersonaSettings>, DmpilotError> {
    let raw: Option<String> = db
        .connection()
        .call(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT settings_json FROM client_settings WHERE connection_id = ?1",
                    params![connection_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    raw.as_deref().map(PersonaSettings::from_json).transpose()
}
