// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixture and stubs for the pipeline unit tests.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dmpilot_config::DmpilotConfig;
use dmpilot_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, QuotaWarning,
    TenantConnection, TokenUsage,
};
use dmpilot_core::{
    ChannelAdapter, DmpilotError, ManualClock, PluginAdapter, ProviderAdapter, QuotaNotifier,
    StorageAdapter,
};
use dmpilot_cost::{BudgetGuard, BudgetLedger};
use dmpilot_resilience::{CircuitBreaker, CounterStore, MemoryCounterStore};
use dmpilot_storage::{Database, SqliteStorage};

use crate::admission::AdmissionPolicy;
use crate::generator::ReplyGenerator;
use crate::processor::{self, BatchProcessor, PipelineDeps};
use crate::settings::SettingsCache;

macro_rules! stub_plugin {
    ($ty:ty, $name:literal, $kind:expr) => {
        #[async_trait]
        impl PluginAdapter for $ty {
            fn name(&self) -> &str {
                $name
            }
            fn version(&self) -> semver::Version {
                semver::Version::new(0, 0, 0)
            }
            fn adapter_type(&self) -> AdapterType {
                $kind
            }
            async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
                Ok(HealthStatus::Healthy)
            }
            async fn shutdown(&self) -> Result<(), DmpilotError> {
                Ok(())
            }
        }
    };
}

/// Temp database plus in-memory counters and a manual clock.
pub struct Fixture {
    _dir: tempfile::TempDir,
    pub storage: Arc<SqliteStorage>,
    pub clock: Arc<ManualClock>,
    pub counters: Arc<MemoryCounterStore>,
    pub config: DmpilotConfig,
    next_tenant: AtomicI64,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(DmpilotConfig::default()).await
    }

    pub async fn with_budget(daily_cap_usd: f64) -> Self {
        let mut config = DmpilotConfig::default();
        config.cost.daily_budget_usd = daily_cap_usd;
        Self::with_config(config).await
    }

    pub async fn with_config(config: DmpilotConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("pipeline.db")).await.unwrap();
        let storage = Arc::new(SqliteStorage::from_database(config.storage.clone(), db));
        Self {
            _dir: dir,
            storage,
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            counters: Arc::new(MemoryCounterStore::new()),
            config,
            next_tenant: AtomicI64::new(0),
        }
    }

    fn db(&self) -> &Database {
        self.storage.database().unwrap()
    }

    pub async fn sql(&self, sql: &str) {
        let sql = sql.to_string();
        self.db()
            .connection()
            .call(move |conn| conn.execute_batch(&sql))
            .await
            .unwrap();
    }

    /// First column of the first row, as text.
    pub async fn scalar(&self, sql: &str) -> String {
        let sql = sql.to_string();
        self.db()
            .connection()
            .call(move |conn| conn.query_row(&sql, [], |row| row.get::<_, String>(0)))
            .await
            .unwrap()
    }

    /// Seed an owner and an active connection; ids are 1, 2, 3...
    pub async fn tenant(&self, used: i64, limit: i64, paused: bool) -> TenantConnection {
        let n = self.next_tenant.fetch_add(1, Ordering::SeqCst) + 1;
        self.sql(&format!(
            "INSERT INTO users (id, email, replies_sent_monthly, replies_limit_monthly, bot_paused)
             VALUES ({n}, 'owner{n}@example.com', {used}, {limit}, {paused});
             INSERT INTO instagram_connections
                 (id, user_id, instagram_user_id, instagram_page_id, page_access_token)
             VALUES ({n}, {n}, 'biz-{n}', 'page-{n}', 'token-{n}');",
            paused = i64::from(paused),
        ))
        .await;
        self.storage.connection_by_id(n).await.unwrap().unwrap()
    }

    pub async fn persona(&self, connection: &TenantConnection, json: &str) {
        let id = connection.connection_id.unwrap();
        self.sql(&format!(
            "INSERT OR REPLACE INTO client_settings (connection_id, settings_json) VALUES ({id}, '{}')",
            json.replace('\'', "''")
        ))
        .await;
    }

    pub fn ledger(&self) -> BudgetLedger {
        BudgetLedger::new(self.db().connection().clone())
    }

    pub fn budget(&self) -> BudgetGuard {
        BudgetGuard::new(self.ledger(), &self.config.cost, self.clock.clone())
    }

    pub fn breaker(&self) -> CircuitBreaker {
        processor::ai_breaker(&self.config, self.counters.clone(), self.clock.clone())
    }

    pub fn deps(&self, provider: Arc<StubProvider>, channel: Arc<StubChannel>) -> PipelineDeps {
        self.deps_with_notifier(provider, channel, Arc::new(RecordingNotifier::default()))
    }

    pub fn deps_with_notifier(
        &self,
        provider: Arc<StubProvider>,
        channel: Arc<StubChannel>,
        notifier: Arc<RecordingNotifier>,
    ) -> PipelineDeps {
        let counters: Arc<dyn CounterStore> = self.counters.clone();
        PipelineDeps {
            storage: self.storage.clone(),
            provider,
            channel,
            notifier,
            counters,
            clock: self.clock.clone(),
            budget: self.ledger(),
        }
    }

    pub fn policy(&self, channel: StubChannel) -> AdmissionPolicy {
        let deps = self.deps(Arc::new(StubProvider::replying("ok")), Arc::new(channel));
        let settings = Arc::new(SettingsCache::new(
            deps.storage.clone(),
            Duration::from_secs(self.config.pipeline.settings_cache_ttl_secs),
            deps.clock.clone(),
        ));
        processor::admission_policy(&self.config, &deps, settings)
    }

    pub fn generator(&self, provider: Arc<StubProvider>) -> ReplyGenerator {
        ReplyGenerator::new(
            provider,
            self.breaker(),
            self.budget(),
            self.config.openai.model.clone(),
        )
    }

    pub fn processor(&self, provider: Arc<StubProvider>, channel: Arc<StubChannel>) -> BatchProcessor {
        BatchProcessor::new(&self.config, self.deps(provider, channel))
    }
}

/// Channel that records sends and answers lookups from a fixed username.
#[derive(Default)]
pub struct StubChannel {
    username: Option<String>,
    lookup_fails: bool,
    send_fails: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
    lookups: AtomicUsize,
}

impl StubChannel {
    pub fn with_username(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_lookup() -> Self {
        Self {
            lookup_fails: true,
            ..Self::default()
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.send_fails.store(fail, Ordering::SeqCst);
    }

    /// `(recipient_id, text)` of every successful send.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

stub_plugin!(StubChannel, "stub-channel", AdapterType::Channel);

#[async_trait]
impl ChannelAdapter for StubChannel {
    async fn send_text(
        &self,
        _connection: &TenantConnection,
        recipient_id: &str,
        text: &str,
    ) -> Result<(), DmpilotError> {
        if self.send_fails.load(Ordering::SeqCst) {
            return Err(DmpilotError::Channel {
                message: "send returned 500".into(),
                source: None,
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn fetch_username(
        &self,
        _connection: &TenantConnection,
        _sender_id: &str,
    ) -> Result<Option<String>, DmpilotError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.lookup_fails {
            return Err(DmpilotError::Timeout {
                duration: Duration::from_secs(5),
            });
        }
        Ok(self.username.clone())
    }
}

/// Provider that returns a fixed reply (or always fails) and counts calls.
pub struct StubProvider {
    reply: Option<String>,
    usage: Option<TokenUsage>,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl StubProvider {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            usage: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::replying("")
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

stub_plugin!(StubProvider, "stub-provider", AdapterType::Provider);

#[async_trait]
impl ProviderAdapter for StubProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, DmpilotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model.clone();
        *self.last_request.lock().unwrap() = Some(request);
        match &self.reply {
            Some(text) => Ok(CompletionResponse {
                content: Some(text.clone()),
                model,
                usage: self.usage,
            }),
            None => Err(DmpilotError::Provider {
                message: "upstream returned 500".into(),
                source: None,
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    warnings: Mutex<Vec<QuotaWarning>>,
}

impl RecordingNotifier {
    pub fn warnings(&self) -> Vec<QuotaWarning> {
        self.warnings.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuotaNotifier for RecordingNotifier {
    async fn quota_warning(&self, warning: &QuotaWarning) -> Result<(), DmpilotError> {
        self.warnings.lock().unwrap().push(warning.clone());
        Ok(())
    }
}
