// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation log: append-only inbound/outbound rows plus the dispatch flag.

use dmpilot_core::types::{ChatMessage, StoredMessage};
use dmpilot_core::DmpilotError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

/// Append an inbound message row. Returns the new row id.
pub async fn insert_inbound(
    db: &Database,
    sender_id: &str,
    text: &str,
    connection_id: Option<i64>,
) -> Result<i64, DmpilotError> {
    let sender_id = sender_id.to_string();
    let text = text.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (sender_platform_id, connection_id, inbound_text)
                 VALUES (?1, ?2, ?3)",
                params![sender_id, connection_id, text],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Append a generated reply. `dispatched` is false until a send is confirmed.
pub async fn insert_outbound(
    db: &Database,
    sender_id: &str,
    text: &str,
    connection_id: Option<i64>,
    dispatched: bool,
) -> Result<i64, DmpilotError> {
    let sender_id = sender_id.to_string();
    let text = text.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (sender_platform_id, connection_id, outbound_text, dispatched)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sender_id, connection_id, text, dispatched as i64],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flip a pending outbound row to dispatched. False if nothing changed.
pub async fn mark_dispatched(db: &Database, message_id: i64) -> Result<bool, DmpilotError> {
    db.connection()
        .call(move |conn| {
            let rows = conn.execute(
                "UPDATE messages SET dispatched = 1
                 WHERE id = ?1 AND dispatched = 0 AND outbound_text IS NOT NULL",
                params![message_id],
            )?;
            Ok(rows > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_message(
    db: &Database,
    message_id: i64,
) -> Result<Option<StoredMessage>, DmpilotError> {
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    "SELECT id, sender_platform_id, connection_id, inbound_text, outbound_text,
                            created_at, dispatched
                     FROM messages WHERE id = ?1",
                    params![message_id],
                    |row| {
                        Ok(StoredMessage {
                            id: row.get(0)?,
                            sender_platform_id: row.get(1)?,
                            connection_id: row.get(2)?,
                            inbound_text: row.get(3)?,
                            outbound_text: row.get(4)?,
                            created_at: row.get(5)?,
                            dispatched: row.get::<_, i64>(6)? != 0,
                        })
                    },
                )
                .optional()?;
            Ok(found)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The last `limit` rows for `sender_id`, oldest first, as chat turns.
///
/// Scoped to exactly one connection: `connection_id = None` reads only the
/// legacy rows whose column is NULL. Replies that never reached the sender
/// (pending review or failed sends) are left out.
pub async fn history(
    db: &Database,
    sender_id: &str,
    limit: usize,
    connection_id: Option<i64>,
) -> Result<Vec<ChatMessage>, DmpilotError> {
    let sender_id = sender_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT inbound_text, outbound_text FROM (
                     SELECT id, inbound_text, outbound_text FROM messages
                     WHERE sender_platform_id = ?1
                       AND connection_id IS ?2
                       AND (outbound_text IS NULL OR dispatched = 1)
                     ORDER BY id DESC LIMIT ?3
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![sender_id, connection_id, limit], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
            })?;

            let mut turns = Vec::new();
            for row in rows {
                match row? {
                    (Some(inbound), _) => turns.push(ChatMessage::user(inbound)),
                    (None, Some(outbound)) => turns.push(ChatMessage::assistant(outbound)),
                    (None, None) => {}
                }
            }
            Ok(turns)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmpilot_core::types::ChatRole;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("messages.db")).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn history_is_chronological_and_bounded() {
        let (_dir, db) = test_db().await;
        for i in 0..6 {
            insert_inbound(&db, "s1", &format!("in {i}"), Some(1)).await.unwrap();
            insert_outbound(&db, "s1", &format!("out {i}"), Some(1), true).await.unwrap();
        }

        let turns = history(&db, "s1", 4, Some(1)).await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0], ChatMessage::user("in 4"));
        assert_eq!(turns[1], ChatMessage::assistant("out 4"));
        assert_eq!(turns[3].content, "out 5");
    }

    #[tokio::test]
    async fn history_never_crosses_connection_scope() {
        let (_dir, db) = test_db().await;
        insert_inbound(&db, "shared", "tenant one", Some(1)).await.unwrap();
        insert_inbound(&db, "shared", "tenant two", Some(2)).await.unwrap();
        insert_inbound(&db, "shared", "legacy", None).await.unwrap();

        let one = history(&db, "shared", 10, Some(1)).await.unwrap();
        assert_eq!(one, vec![ChatMessage::user("tenant one")]);

        let legacy = history(&db, "shared", 10, None).await.unwrap();
        assert_eq!(legacy, vec![ChatMessage::user("legacy")]);
    }

    #[tokio::test]
    async fn undispatched_replies_stay_out_of_history() {
        let (_dir, db) = test_db().await;
        insert_inbound(&db, "s1", "hello", Some(1)).await.unwrap();
        let pending = insert_outbound(&db, "s1", "draft", Some(1), false).await.unwrap();

        let turns = history(&db, "s1", 10, Some(1)).await.unwrap();
        assert!(turns.iter().all(|t| t.role == ChatRole::User));

        assert!(mark_dispatched(&db, pending).await.unwrap());
        let turns = history(&db, "s1", 10, Some(1)).await.unwrap();
        assert_eq!(turns.last(), Some(&ChatMessage::assistant("draft")));
    }

    #[tokio::test]
    async fn mark_dispatched_flips_once() {
        let (_dir, db) = test_db().await;
        let inbound = insert_inbound(&db, "s1", "hi", None).await.unwrap();
        let outbound = insert_outbound(&db, "s1", "yo", None, false).await.unwrap();

        assert!(!mark_dispatched(&db, inbound).await.unwrap(), "inbound rows are never dispatched");
        assert!(mark_dispatched(&db, outbound).await.unwrap());
        assert!(!mark_dispatched(&db, outbound).await.unwrap());

        let row = get_message(&db, outbound).await.unwrap().unwrap();
        assert!(row.dispatched);
        assert_eq!(row.outbound_text.as_deref(), Some("yo"));
        assert!(row.connection_id.is_none());
    }
}
