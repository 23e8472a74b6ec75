// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the dmpilot reply pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level dmpilot configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DmpilotConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP listener for the webhook gateway.
    #[serde(default)]
    pub server: ServerConfig,

    /// Instagram webhook and Graph API settings.
    #[serde(default)]
    pub instagram: InstagramConfig,

    /// AI completion provider settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Per-tenant daily AI budget and pricing.
    #[serde(default)]
    pub cost: CostConfig,

    /// Sliding-window rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// AI provider circuit breaker.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Worker pool and processing behavior.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Reply plan allotments and quota warnings.
    #[serde(default)]
    pub plans: PlansConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "dmpilot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Instagram platform configuration.
///
/// `access_token` and `fallback_user_id` describe the legacy default
/// account used when a delivery matches no registered connection.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstagramConfig {
    /// Token echoed back during the subscription handshake.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// App secret used to sign webhook deliveries.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Secondary app secret, consulted when `app_secret` is unset.
    #[serde(default)]
    pub fallback_app_secret: Option<String>,

    /// Send credential for the legacy default account.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Platform user id of the legacy default account.
    #[serde(default)]
    pub fallback_user_id: Option<String>,

    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,
}

impl InstagramConfig {
    /// The secret that signs webhook deliveries, if any is configured.
    pub fn signing_secret(&self) -> Option<&str> {
        self.app_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.fallback_app_secret.as_deref().filter(|s| !s.is_empty()))
    }
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            app_secret: None,
            fallback_app_secret: None,
            access_token: None,
            fallback_user_id: None,
            graph_base_url: default_graph_base_url(),
            api_version: default_api_version(),
            send_timeout_secs: default_send_timeout_secs(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
        }
    }
}

impl fmt::Debug for InstagramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstagramConfig")
            .field("verify_token", &redact(&self.verify_token))
            .field("app_secret", &redact(&self.app_secret))
            .field("fallback_app_secret", &redact(&self.fallback_app_secret))
            .field("access_token", &redact(&self.access_token))
            .field("fallback_user_id", &self.fallback_user_id)
            .field("graph_base_url", &self.graph_base_url)
            .field("api_version", &self.api_version)
            .field("send_timeout_secs", &self.send_timeout_secs)
            .field("lookup_timeout_secs", &self.lookup_timeout_secs)
            .finish()
    }
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_lookup_timeout_secs() -> u64 {
    5
}

/// AI completion provider configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. Falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Hard per-request timeout.
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts including the first, for transient failures only.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Output token cap when the persona does not set one.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature when the persona does not set one.
    /// Ignored for reasoning models, which only accept their default.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_openai_model(),
            base_url: default_openai_base_url(),
            timeout_secs: default_openai_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter_ms: default_jitter_ms(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_initial_ms", &self.backoff_initial_ms)
            .field("backoff_max_ms", &self.backoff_max_ms)
            .field("jitter_ms", &self.jitter_ms)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

fn default_openai_model() -> String {
    "gpt-5-nano".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

fn default_jitter_ms() -> u64 {
    2_000
}

fn default_max_output_tokens() -> u32 {
    3000
}

fn default_temperature() -> f32 {
    0.7
}

/// Cost tracking and budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Per-tenant daily AI spend cap in USD.
    #[serde(default = "default_daily_budget_usd")]
    pub daily_budget_usd: f64,

    #[serde(default = "default_prompt_cost_per_1k")]
    pub prompt_cost_per_1k: f64,

    #[serde(default = "default_completion_cost_per_1k")]
    pub completion_cost_per_1k: f64,

    /// Prompt tokens reserved per call before the real usage is known.
    #[serde(default = "default_estimated_prompt_tokens")]
    pub estimated_prompt_tokens: u32,

    #[serde(default = "default_estimated_completion_tokens")]
    pub estimated_completion_tokens: u32,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            daily_budget_usd: default_daily_budget_usd(),
            prompt_cost_per_1k: default_prompt_cost_per_1k(),
            completion_cost_per_1k: default_completion_cost_per_1k(),
            estimated_prompt_tokens: default_estimated_prompt_tokens(),
            estimated_completion_tokens: default_estimated_completion_tokens(),
        }
    }
}

fn default_daily_budget_usd() -> f64 {
    1.0
}

fn default_prompt_cost_per_1k() -> f64 {
    0.00015
}

fn default_completion_cost_per_1k() -> f64 {
    0.0006
}

fn default_estimated_prompt_tokens() -> u32 {
    500
}

fn default_estimated_completion_tokens() -> u32 {
    300
}

/// Sliding-window rate limit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Inbound events allowed per sender per window.
    #[serde(default = "default_sender_limit")]
    pub sender_limit: u64,

    #[serde(default = "default_window_secs")]
    pub sender_window_secs: u64,

    /// AI invocations allowed per tenant per window.
    #[serde(default = "default_tenant_ai_limit")]
    pub tenant_ai_limit: u64,

    #[serde(default = "default_window_secs")]
    pub tenant_ai_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sender_limit: default_sender_limit(),
            sender_window_secs: default_window_secs(),
            tenant_ai_limit: default_tenant_ai_limit(),
            tenant_ai_window_secs: default_window_secs(),
        }
    }
}

fn default_sender_limit() -> u64 {
    30
}

fn default_tenant_ai_limit() -> u64 {
    60
}

fn default_window_secs() -> u64 {
    60
}

/// Circuit breaker configuration for the AI provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,

    #[serde(default = "default_breaker_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_open_secs")]
    pub open_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_breaker_window_secs(),
            open_secs: default_open_secs(),
        }
    }
}

fn default_failure_threshold() -> u64 {
    8
}

fn default_breaker_window_secs() -> u64 {
    120
}

fn default_open_secs() -> u64 {
    60
}

/// Worker pool and processing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Maximum batches processed concurrently.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Batches waiting for a worker before deliveries are shed.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Persist generated replies without sending them.
    #[serde(default)]
    pub manual_review: bool,

    /// Conversation turns (inbound plus reply) included in the prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    #[serde(default = "default_settings_cache_ttl_secs")]
    pub settings_cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            queue_capacity: default_queue_capacity(),
            manual_review: false,
            history_turns: default_history_turns(),
            settings_cache_ttl_secs: default_settings_cache_ttl_secs(),
        }
    }
}

fn default_worker_concurrency() -> usize {
    20
}

fn default_queue_capacity() -> usize {
    256
}

fn default_history_turns() -> usize {
    10
}

fn default_settings_cache_ttl_secs() -> u64 {
    30
}

/// Reply plan configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlansConfig {
    /// Monthly allotment restored on rollover for non-standard paid plans.
    #[serde(default = "default_starter_monthly_replies")]
    pub starter_monthly_replies: i64,

    #[serde(default = "default_standard_monthly_replies")]
    pub standard_monthly_replies: i64,

    /// Remaining-reply level at or below which a quota warning is due.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: i64,
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            starter_monthly_replies: default_starter_monthly_replies(),
            standard_monthly_replies: default_standard_monthly_replies(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

fn default_starter_monthly_replies() -> i64 {
    150
}

fn default_standard_monthly_replies() -> i64 {
    1500
}

fn default_warning_threshold() -> i64 {
    50
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("dmpilot").join("dmpilot.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("dmpilot.db"))
        .display()
        .to_string()
}

fn default_true() -> bool {
    true
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn redact(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "[redacted]",
        None => "None",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DmpilotConfig::default();
        assert_eq!(config.openai.timeout_secs, 60);
        assert_eq!(config.openai.max_attempts, 3);
        assert_eq!(config.rate_limit.sender_limit, 30);
        assert_eq!(config.rate_limit.tenant_ai_limit, 60);
        assert_eq!(config.circuit_breaker.failure_threshold, 8);
        assert_eq!(config.circuit_breaker.window_secs, 120);
        assert_eq!(config.circuit_breaker.open_secs, 60);
        assert_eq!(config.pipeline.worker_concurrency, 20);
        assert_eq!(config.pipeline.history_turns, 10);
        assert!(!config.pipeline.manual_review);
        assert!((config.cost.daily_budget_usd - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let instagram = InstagramConfig {
            app_secret: Some("shh-app".into()),
            access_token: Some("shh-token".into()),
            ..Default::default()
        };
        let openai = OpenAiConfig {
            api_key: Some("sk-shh".into()),
            ..Default::default()
        };
        let rendered = format!("{instagram:?} {openai:?}");
        assert!(!rendered.contains("shh"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn signing_secret_falls_back() {
        let mut instagram = InstagramConfig {
            fallback_app_secret: Some("second".into()),
            ..Default::default()
        };
        assert_eq!(instagram.signing_secret(), Some("second"));

        instagram.app_secret = Some(String::new());
        assert_eq!(instagram.signing_secret(), Some("second"));

        instagram.app_secret = Some("first".into());
        assert_eq!(instagram.signing_secret(), Some("first"));

        instagram.fallback_app_secret = None;
        instagram.app_secret = None;
        assert_eq!(instagram.signing_secret(), None);
    }
}
