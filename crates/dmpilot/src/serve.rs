// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dmpilot serve` command implementation.
//!
//! Opens SQLite storage, builds the OpenAI provider and the Graph API
//! channel, starts the worker pool, and serves the webhook gateway until a
//! shutdown signal. On shutdown the gateway stops accepting requests, the
//! queued batches are drained, and the database is checkpointed.

use std::sync::Arc;

use dmpilot_config::DmpilotConfig;
use dmpilot_core::{DmpilotError, LogNotifier, StorageAdapter, SystemClock};
use dmpilot_cost::BudgetLedger;
use dmpilot_gateway::{start_server, GatewayState, HealthState, WebhookSecrets};
use dmpilot_instagram::GraphChannel;
use dmpilot_openai::OpenAiProvider;
use dmpilot_pipeline::{install_signal_handler, BatchProcessor, PipelineDeps, WorkerPool};
use dmpilot_resilience::MemoryCounterStore;
use dmpilot_storage::SqliteStorage;
use tracing::{debug, error, info, warn};

type RenderFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Runs the `dmpilot serve` command.
pub async fn run_serve(config: DmpilotConfig) -> Result<(), DmpilotError> {
    init_tracing(&config.agent.log_level);

    info!(agent = %config.agent.name, "starting dmpilot serve");
    for warning in startup_warnings(&config) {
        warn!("{warning}");
    }

    let storage = {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        Arc::new(storage)
    };
    // The budget ledger shares the storage connection so reservations and
    // message writes are serialized through one writer.
    let budget = BudgetLedger::new(storage.database()?.connection().clone());

    let provider = OpenAiProvider::new(&config.openai).map_err(|e| {
        error!(error = %e, "failed to initialize OpenAI provider");
        eprintln!("error: OpenAI API key required. Set openai.api_key or OPENAI_API_KEY.");
        e
    })?;
    let channel = GraphChannel::new(&config.instagram)?;

    let prometheus_render = prometheus_render(&config);

    let deps = PipelineDeps {
        storage: storage.clone(),
        provider: Arc::new(provider),
        channel: Arc::new(channel),
        notifier: Arc::new(LogNotifier),
        counters: Arc::new(MemoryCounterStore::new()),
        clock: Arc::new(SystemClock),
        budget,
    };
    let processor = Arc::new(BatchProcessor::new(&config, deps));

    let cancel = install_signal_handler();
    let (queue, pool) = WorkerPool::spawn(
        processor,
        storage.clone(),
        &config.pipeline,
        cancel.clone(),
    );
    info!(
        workers = config.pipeline.worker_concurrency,
        queue_capacity = config.pipeline.queue_capacity,
        manual_review = config.pipeline.manual_review,
        "worker pool started"
    );

    let state = GatewayState {
        secrets: Arc::new(WebhookSecrets::from_config(&config.instagram)),
        queue,
        storage: storage.clone(),
        health: HealthState::new(prometheus_render),
    };

    let served = start_server(&config.server, state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped with an error");
    }
    // A bind failure returns before any signal; stop the workers too.
    cancel.cancel();

    pool.join().await;
    if let Err(e) = storage.close().await {
        error!(error = %e, "failed to checkpoint database on shutdown");
    }
    info!("dmpilot stopped");
    served
}

#[cfg(feature = "prometheus")]
fn prometheus_render(config: &DmpilotConfig) -> Option<RenderFn> {
    if !config.prometheus.enabled {
        debug!("prometheus metrics disabled by configuration");
        return None;
    }
    match dmpilot_prometheus::PrometheusAdapter::new() {
        Ok(adapter) => {
            info!("prometheus metrics enabled");
            let handle = adapter.handle().clone();
            Some(Arc::new(move || handle.render()) as RenderFn)
        }
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn prometheus_render(_config: &DmpilotConfig) -> Option<RenderFn> {
    debug!("prometheus metrics not compiled in");
    None
}

/// Misconfigurations that still let the service start.
pub fn startup_warnings(config: &DmpilotConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.instagram.signing_secret().is_none() {
        warnings.push("no instagram app secret configured; every webhook delivery will be rejected");
    }
    if config
        .instagram
        .verify_token
        .as_deref()
        .is_none_or(str::is_empty)
    {
        warnings.push("no instagram verify token configured; subscription handshakes will fail");
    }
    if config
        .instagram
        .fallback_user_id
        .as_deref()
        .is_some_and(|id| !id.is_empty())
        && config
            .instagram
            .access_token
            .as_deref()
            .is_none_or(str::is_empty)
    {
        warnings.push("legacy account configured without an access token; its replies cannot be sent");
    }
    if config.pipeline.manual_review {
        warnings.push("manual review is on; replies are stored but not sent");
    }
    warnings
}

/// Human-readable summary for `dmpilot check-config`.
pub fn config_summary(config: &DmpilotConfig) -> Vec<String> {
    let legacy = config
        .instagram
        .fallback_user_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or("none");
    vec![
        "config OK".to_string(),
        format!("  listen:        {}:{}", config.server.host, config.server.port),
        format!("  database:      {}", config.storage.database_path),
        format!("  model:         {}", config.openai.model),
        format!("  legacy:        {legacy}"),
        format!("  workers:       {}", config.pipeline.worker_concurrency),
        format!("  queue:         {}", config.pipeline.queue_capacity),
        format!("  daily budget:  ${:.2}", config.cost.daily_budget_usd),
        format!("  manual review: {}", config.pipeline.manual_review),
        format!("  metrics:       {}", config.prometheus.enabled),
    ]
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dmpilot={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_warns_about_missing_secrets() {
        let warnings = startup_warnings(&DmpilotConfig::default());
        assert!(warnings.iter().any(|w| w.contains("app secret")));
        assert!(warnings.iter().any(|w| w.contains("verify token")));
        assert!(!warnings.iter().any(|w| w.contains("legacy")));
    }

    #[test]
    fn fully_configured_instagram_has_no_warnings() {
        let mut config = DmpilotConfig::default();
        config.instagram.app_secret = Some("secret".into());
        config.instagram.verify_token = Some("token".into());
        config.instagram.fallback_user_id = Some("1789".into());
        config.instagram.access_token = Some("page-token".into());
        assert!(startup_warnings(&config).is_empty());
    }

    #[test]
    fn legacy_account_without_token_is_flagged() {
        let mut config = DmpilotConfig::default();
        config.instagram.fallback_user_id = Some("1789".into());
        let warnings = startup_warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("legacy")));
    }

    #[test]
    fn summary_lists_listen_address_and_legacy() {
        let mut config = DmpilotConfig::default();
        config.instagram.fallback_user_id = Some("1789".into());
        let summary = config_summary(&config).join("\n");
        assert!(summary.contains(&format!(
            "{}:{}",
            config.server.host, config.server.port
        )));
        assert!(summary.contains("legacy:        1789"));
    }
}
