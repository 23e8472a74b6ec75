// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant connection lookups. Only active connections are ever returned.

use dmpilot_core::types::TenantConnection;
use dmpilot_core::DmpilotError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

const SELECT_COLUMNS: &str = "SELECT id, user_id, instagram_user_id, instagram_page_id, \
                              page_access_token, is_active FROM instagram_connections";

fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<TenantConnection> {
    Ok(TenantConnection {
        connection_id: Some(row.get(0)?),
        owner_user_id: row.get(1)?,
        platform_user_id: row.get(2)?,
        platform_page_id: row.get(3)?,
        send_credential: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
    })
}

async fn find_one(
    db: &Database,
    filter: &'static str,
    value: rusqlite::types::Value,
) -> Result<Option<TenantConnection>, DmpilotError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE {filter} AND is_active = 1 ORDER BY id LIMIT 1");
            let found = conn
                .query_row(&sql, params![value], row_to_connection)
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Resolve by the platform account id that deliveries name as recipient.
pub async fn by_platform_user_id(
    db: &Database,
    platform_user_id: &str,
) -> Result<Option<TenantConnection>, DmpilotError> {
    find_one(
        db,
        "instagram_user_id = ?1",
        rusqlite::types::Value::Text(platform_user_id.to_string()),
    )
    .await
}

/// Resolve by the page id carried on the delivery entry.
pub async fn by_page_id(
    db: &Database,
    page_id: &str,
) -> Result<Option<TenantConnection>, DmpilotError> {
    find_one(
        db,
        "instagram_page_id = ?1",
        rusqlite::types::Value::Text(page_id.to_string()),
    )
    .await
}

pub async fn by_id(
    db: &Database,
    connection_id: i64,
) -> Result<Option<TenantConnection>, DmpilotError> {
    find_one(db, "id = ?1", rusqlite::types::Value::Integer(connection_id)).await
}
