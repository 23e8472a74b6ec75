// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end test harness.
//!
//! `TestHarness` wires the webhook router, the batch processor, and a temp
//! SQLite database together with mock provider and channel adapters.
//! Deliveries go through the real router; queued batches are processed
//! only when the test calls [`TestHarness::drain`], which keeps every test
//! deterministic.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;

use dmpilot_config::DmpilotConfig;
use dmpilot_core::types::TenantConnection;
use dmpilot_core::{DmpilotError, LogNotifier, ManualClock, SenderBatch, StorageAdapter};
use dmpilot_cost::BudgetLedger;
use dmpilot_gateway::{router, GatewayState, HealthState, WebhookSecrets};
use dmpilot_instagram::{sign, SIGNATURE_HEADER};
use dmpilot_pipeline::{BatchOutcome, BatchProcessor, ManualSender, PipelineDeps, WorkQueue};
use dmpilot_resilience::MemoryCounterStore;
use dmpilot_storage::{Database, SqliteStorage};

use crate::counting_storage::CountingStorage;
use crate::mock_channel::MockChannel;
use crate::mock_provider::MockProvider;

pub const APP_SECRET: &str = "e2e-app-secret";
pub const VERIFY_TOKEN: &str = "e2e-verify";

/// Start of the harness clock: 2023-11-14T22:13:20Z.
const CLOCK_START_MILLIS: u64 = 1_700_000_000_000;

/// Builder for constructing a [`TestHarness`].
pub struct TestHarnessBuilder {
    config: DmpilotConfig,
    provider: Option<MockProvider>,
}

impl TestHarnessBuilder {
    /// Store replies without sending them.
    pub fn manual_review(mut self, enabled: bool) -> Self {
        self.config.pipeline.manual_review = enabled;
        self
    }

    pub fn with_budget(mut self, daily_usd: f64) -> Self {
        self.config.cost.daily_budget_usd = daily_usd;
        self
    }

    /// Configure the legacy default account.
    pub fn with_legacy_account(mut self, platform_user_id: &str, access_token: &str) -> Self {
        self.config.instagram.fallback_user_id = Some(platform_user_id.to_string());
        self.config.instagram.access_token = Some(access_token.to_string());
        self
    }

    pub fn with_provider(mut self, provider: MockProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Arbitrary config changes, applied before the harness is wired.
    pub fn configure(mut self, apply: impl FnOnce(&mut DmpilotConfig)) -> Self {
        apply(&mut self.config);
        self
    }

    pub async fn build(self) -> Result<TestHarness, DmpilotError> {
        let temp_dir = tempfile::tempdir().map_err(|e| DmpilotError::Internal(e.to_string()))?;
        let db_path = temp_dir.path().join("e2e.db");

        let mut config = self.config;
        config.storage.database_path = db_path.to_string_lossy().into_owned();

        let db = Database::open(&db_path).await?;
        let ledger = BudgetLedger::new(db.connection().clone());
        let sqlite = Arc::new(SqliteStorage::from_database(config.storage.clone(), db));
        let storage = Arc::new(CountingStorage::new(sqlite));

        let provider = Arc::new(self.provider.unwrap_or_default());
        let channel = Arc::new(MockChannel::new());
        let clock = Arc::new(ManualClock::new(CLOCK_START_MILLIS));

        let deps = PipelineDeps {
            storage: storage.clone(),
            provider: provider.clone(),
            channel: channel.clone(),
            notifier: Arc::new(LogNotifier),
            counters: Arc::new(MemoryCounterStore::new()),
            clock: clock.clone(),
            budget: ledger,
        };
        let processor = Arc::new(BatchProcessor::new(&config, deps));

        let (queue, rx) = WorkQueue::bounded(config.pipeline.queue_capacity);
        let state = GatewayState {
            secrets: Arc::new(WebhookSecrets::from_config(&config.instagram)),
            queue,
            storage: storage.clone(),
            health: HealthState::new(None),
        };

        Ok(TestHarness {
            storage,
            provider,
            channel,
            clock,
            config,
            processor,
            router: router(state),
            rx: Mutex::new(rx),
            next_tenant: AtomicI64::new(0),
            _temp_dir: temp_dir,
        })
    }
}

/// Quota shape of a seeded tenant.
#[derive(Debug, Clone, Copy)]
pub struct TenantSeed {
    pub used: i64,
    pub limit: i64,
    pub purchased: i64,
    pub paused: bool,
}

impl Default for TenantSeed {
    fn default() -> Self {
        Self {
            used: 0,
            limit: 150,
            purchased: 0,
            paused: false,
        }
    }
}

/// Gateway, pipeline, and a temp database wired together.
pub struct TestHarness {
    pub storage: Arc<CountingStorage<SqliteStorage>>,
    pub provider: Arc<MockProvider>,
    pub channel: Arc<MockChannel>,
    pub clock: Arc<ManualClock>,
    pub config: DmpilotConfig,
    processor: Arc<BatchProcessor>,
    router: Router,
    rx: Mutex<mpsc::Receiver<SenderBatch>>,
    next_tenant: AtomicI64,
    /// Kept alive so the database file outlives the harness.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// A builder with signing and verification secrets already set.
    pub fn builder() -> TestHarnessBuilder {
        let mut config = DmpilotConfig::default();
        config.instagram.app_secret = Some(APP_SECRET.to_string());
        config.instagram.verify_token = Some(VERIFY_TOKEN.to_string());
        TestHarnessBuilder {
            config,
            provider: None,
        }
    }

    pub fn manual_sender(&self) -> ManualSender {
        self.processor.manual_sender()
    }

    /// Seed an owner and one active connection. The n-th tenant gets
    /// user and connection id n, account `biz-n`, and page `page-n`.
    pub async fn seed_tenant(&self, seed: TenantSeed) -> Result<TenantConnection, DmpilotError> {
        let n = self.next_tenant.fetch_add(1, Ordering::SeqCst) + 1;
        self.execute(&format!(
            "INSERT INTO users (id, email, replies_sent_monthly, replies_limit_monthly,
                                replies_purchased, bot_paused)
             VALUES ({n}, 'owner{n}@example.com', {used}, {limit}, {purchased}, {paused});
             INSERT INTO instagram_connections
                 (id, user_id, instagram_user_id, instagram_page_id, page_access_token)
             VALUES ({n}, {n}, 'biz-{n}', 'page-{n}', 'token-{n}');",
            used = seed.used,
            limit = seed.limit,
            purchased = seed.purchased,
            paused = i64::from(seed.paused),
        ))
        .await?;
        self.storage
            .inner()
            .connection_by_id(n)
            .await?
            .ok_or_else(|| DmpilotError::Internal(format!("seeded connection {n} not found")))
    }

    /// Sign `body` with the app secret and POST it to `/webhook`.
    pub async fn deliver(&self, body: &serde_json::Value) -> Result<StatusCode, DmpilotError> {
        let bytes = serde_json::to_vec(body).map_err(|e| DmpilotError::Internal(e.to_string()))?;
        let signature = sign(&bytes, APP_SECRET);
        let (status, _) = self.post_webhook(bytes, Some(&signature)).await?;
        Ok(status)
    }

    /// POST raw bytes to `/webhook` with an optional signature header.
    pub async fn post_webhook(
        &self,
        body: Vec<u8>,
        signature: Option<&str>,
    ) -> Result<(StatusCode, String), DmpilotError> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let request = request
            .body(Body::from(body))
            .map_err(|e| DmpilotError::Internal(e.to_string()))?;
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, String), DmpilotError> {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .map_err(|e| DmpilotError::Internal(e.to_string()))?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, String), DmpilotError> {
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| DmpilotError::Internal(e.to_string()))?;
        Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Process every queued batch, in queue order.
    pub async fn drain(&self) -> Result<Vec<BatchOutcome>, DmpilotError> {
        let mut rx = self.rx.lock().await;
        let mut outcomes = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            outcomes.push(self.processor.process(batch).await?);
        }
        Ok(outcomes)
    }

    pub async fn execute(&self, sql: &str) -> Result<(), DmpilotError> {
        let sql = sql.to_string();
        self.database()?
            .connection()
            .call(move |conn| conn.execute_batch(&sql))
            .await
            .map_err(dmpilot_storage::database::map_tr_err)
    }

    /// First column of the first row as an integer.
    pub async fn query_i64(&self, sql: &str) -> Result<i64, DmpilotError> {
        let sql = sql.to_string();
        self.database()?
            .connection()
            .call(move |conn| conn.query_row(&sql, [], |row| row.get::<_, i64>(0)))
            .await
            .map_err(dmpilot_storage::database::map_tr_err)
    }

    /// First column of every row as text, in row order.
    pub async fn query_strings(&self, sql: &str) -> Result<Vec<String>, DmpilotError> {
        let sql = sql.to_string();
        self.database()?
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(dmpilot_storage::database::map_tr_err)
    }

    /// Monthly replies consumed by an owner.
    pub async fn replies_used(&self, user_id: i64) -> Result<i64, DmpilotError> {
        self.query_i64(&format!(
            "SELECT replies_sent_monthly FROM users WHERE id = {user_id}"
        ))
        .await
    }

    fn database(&self) -> Result<&Database, DmpilotError> {
        self.storage.inner().database()
    }
}

/// One inbound text event as the platform sends it.
pub fn text_event(
    sender_id: &str,
    recipient_id: &str,
    mid: &str,
    text: &str,
    timestamp: i64,
) -> serde_json::Value {
    serde_json::json!({
        "sender": { "id": sender_id },
        "recipient": { "id": recipient_id },
        "timestamp": timestamp,
        "message": { "mid": mid, "text": text },
    })
}

/// A delivery with a single entry for `page_id` carrying `events`.
pub fn delivery_json(page_id: &str, events: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "object": "instagram",
        "entry": [{ "id": page_id, "time": 1, "messaging": events }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_with_defaults() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert!(!harness.config.pipeline.manual_review);
        assert_eq!(harness.storage.total_calls(), 0);
        assert!(harness.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seeded_tenants_get_sequential_ids() {
        let harness = TestHarness::builder().build().await.unwrap();
        let first = harness.seed_tenant(TenantSeed::default()).await.unwrap();
        let second = harness
            .seed_tenant(TenantSeed {
                used: 7,
                ..TenantSeed::default()
            })
            .await
            .unwrap();

        assert_eq!(first.connection_id, Some(1));
        assert_eq!(second.platform_user_id, "biz-2");
        assert_eq!(harness.replies_used(2).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn unsigned_delivery_is_forbidden() {
        let harness = TestHarness::builder().build().await.unwrap();
        let body = delivery_json("page-1", vec![text_event("s1", "biz-1", "m1", "hi", 1)]);
        let (status, _) = harness
            .post_webhook(serde_json::to_vec(&body).unwrap(), None)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn handshake_echoes_challenge() {
        let harness = TestHarness::builder().build().await.unwrap();
        let (status, body) = harness
            .get(&format!(
                "/webhook?hub.mode=subscribe&hub.verify_token={VERIFY_TOKEN}&hub.challenge=42"
            ))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "42");
    }
}
