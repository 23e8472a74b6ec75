// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use dmpilot_config::model::StorageConfig;
use dmpilot_core::persona::PersonaSettings;
use dmpilot_core::types::{
    ChatMessage, DeadLetter, PlanAllotments, QuotaState, ReplyCountUpdate, StoredMessage,
    TenantConnection,
};
use dmpilot_core::{AdapterType, DmpilotError, HealthStatus, PluginAdapter, StorageAdapter};

use crate::database::Database;
use crate::queries;
use crate::queries::idempotency::ClaimNamespace;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// The underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, DmpilotError> {
        self.db.get().ok_or_else(|| DmpilotError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DmpilotError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), DmpilotError> {
        let path = self.config.database_path.clone();
        let wal_mode = self.config.wal_mode;
        self.db
            .get_or_try_init(|| Database::open_with(path, wal_mode))
            .await?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), DmpilotError> {
        self.database()?.checkpoint().await
    }

    async fn claim_message_id(&self, message_id: &str) -> Result<bool, DmpilotError> {
        queries::idempotency::claim(self.database()?, ClaimNamespace::PlatformMessage, message_id)
            .await
    }

    async fn claim_billing_event(&self, event_id: &str) -> Result<bool, DmpilotError> {
        queries::idempotency::claim(self.database()?, ClaimNamespace::BillingEvent, event_id).await
    }

    async fn connection_by_platform_user_id(
        &self,
        platform_user_id: &str,
    ) -> Result<Option<TenantConnection>, DmpilotError> {
        queries::connections::by_platform_user_id(self.database()?, platform_user_id).await
    }

    async fn connection_by_page_id(
        &self,
        page_id: &str,
    ) -> Result<Option<TenantConnection>, DmpilotError> {
        queries::connections::by_page_id(self.database()?, page_id).await
    }

    async fn connection_by_id(
        &self,
        connection_id: i64,
    ) -> Result<Option<TenantConnection>, DmpilotError> {
        queries::connections::by_id(self.database()?, connection_id).await
    }

    async fn quota_state(
        &self,
        user_id: i64,
        allotments: &PlanAllotments,
    ) -> Result<Option<QuotaState>, DmpilotError> {
        queries::quota::quota_state(self.database()?, user_id, *allotments, chrono::Utc::now())
            .await
    }

    async fn increment_reply_count(
        &self,
        user_id: i64,
        warning_threshold: i64,
    ) -> Result<Option<ReplyCountUpdate>, DmpilotError> {
        queries::quota::increment_reply_count(
            self.database()?,
            user_id,
            warning_threshold,
            chrono::Utc::now(),
        )
        .await
    }

    async fn save_inbound(
        &self,
        sender_id: &str,
        text: &str,
        connection_id: Option<i64>,
    ) -> Result<i64, DmpilotError> {
        queries::messages::insert_inbound(self.database()?, sender_id, text, connection_id).await
    }

    async fn save_outbound(
        &self,
        sender_id: &str,
        text: &str,
        connection_id: Option<i64>,
        dispatched: bool,
    ) -> Result<i64, DmpilotError> {
        queries::messages::insert_outbound(
            self.database()?,
            sender_id,
            text,
            connection_id,
            dispatched,
        )
        .await
    }

    async fn mark_dispatched(&self, message_id: i64) -> Result<bool, DmpilotError> {
        queries::messages::mark_dispatched(self.database()?, message_id).await
    }

    async fn message(&self, message_id: i64) -> Result<Option<StoredMessage>, DmpilotError> {
        queries::messages::get_message(self.database()?, message_id).await
    }

    async fn history(
        &self,
        sender_id: &str,
        limit: usize,
        connection_id: Option<i64>,
    ) -> Result<Vec<ChatMessage>, DmpilotError> {
        queries::messages::history(self.database()?, sender_id, limit, connection_id).await
    }

    async fn persona_settings(
        &self,
        connection_id: i64,
    ) -> Result<Option<PersonaSettings>, DmpilotError> {
        queries::settings::persona_settings(self.database()?, connection_id).await
    }

    async fn record_sender(
        &self,
        connection_id: i64,
        sender_id: &str,
        username: &str,
    ) -> Result<(), DmpilotError> {
        queries::senders::record_sender(self.database()?, connection_id, sender_id, username).await
    }

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<(), DmpilotError> {
        queries::dead_letters::insert_dead_letter(self.database()?, letter).await
    }
}
