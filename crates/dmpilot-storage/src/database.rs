// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use dmpilot_core::DmpilotError;
use tracing::{debug, info};

use crate::migrations;

/// Convert a tokio-rusqlite error into `DmpilotError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> DmpilotError {
    DmpilotError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the SQLite database.
///
/// Cloning is cheap: every clone shares the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DmpilotError> {
        Self::open_with(path, true).await
    }

    /// Like [`Database::open`], with WAL mode optional.
    pub async fn open_with(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, DmpilotError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(DmpilotError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| DmpilotError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<Result<(), DmpilotError>, rusqlite::Error> {
            Ok(migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        info!(path = %path.display(), wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared connection handle. Query modules go through `call()`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), DmpilotError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}
