// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express,
//! such as non-empty hosts, non-negative costs, and non-zero windows.

use crate::diagnostic::ConfigError;
use crate::model::DmpilotConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &DmpilotConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(invalid("server.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(invalid(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(invalid("storage.database_path must not be empty"));
    }

    non_negative(&mut errors, "cost.daily_budget_usd", config.cost.daily_budget_usd);
    non_negative(&mut errors, "cost.prompt_cost_per_1k", config.cost.prompt_cost_per_1k);
    non_negative(
        &mut errors,
        "cost.completion_cost_per_1k",
        config.cost.completion_cost_per_1k,
    );

    non_zero(&mut errors, "rate_limit.sender_limit", config.rate_limit.sender_limit);
    non_zero(
        &mut errors,
        "rate_limit.sender_window_secs",
        config.rate_limit.sender_window_secs,
    );
    non_zero(
        &mut errors,
        "rate_limit.tenant_ai_limit",
        config.rate_limit.tenant_ai_limit,
    );
    non_zero(
        &mut errors,
        "rate_limit.tenant_ai_window_secs",
        config.rate_limit.tenant_ai_window_secs,
    );
    non_zero(
        &mut errors,
        "circuit_breaker.failure_threshold",
        config.circuit_breaker.failure_threshold,
    );
    non_zero(
        &mut errors,
        "circuit_breaker.window_secs",
        config.circuit_breaker.window_secs,
    );
    non_zero(
        &mut errors,
        "circuit_breaker.open_secs",
        config.circuit_breaker.open_secs,
    );
    non_zero(
        &mut errors,
        "pipeline.worker_concurrency",
        config.pipeline.worker_concurrency as u64,
    );
    non_zero(
        &mut errors,
        "pipeline.queue_capacity",
        config.pipeline.queue_capacity as u64,
    );
    non_zero(
        &mut errors,
        "openai.max_attempts",
        u64::from(config.openai.max_attempts),
    );
    non_zero(&mut errors, "openai.timeout_secs", config.openai.timeout_secs);

    if !(0.0..=2.0).contains(&config.openai.temperature) {
        errors.push(invalid(format!(
            "openai.temperature must be between 0.0 and 2.0, got {}",
            config.openai.temperature
        )));
    }

    if config.openai.backoff_max_ms < config.openai.backoff_initial_ms {
        errors.push(invalid(format!(
            "openai.backoff_max_ms ({}) must not be below openai.backoff_initial_ms ({})",
            config.openai.backoff_max_ms, config.openai.backoff_initial_ms
        )));
    }

    if config.plans.warning_threshold < 0 {
        errors.push(invalid(format!(
            "plans.warning_threshold must be non-negative, got {}",
            config.plans.warning_threshold
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn non_negative(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if value < 0.0 || value.is_nan() {
        errors.push(invalid(format!("{key} must be non-negative, got {value}")));
    }
}

fn non_zero(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value == 0 {
        errors.push(invalid(format!("{key} must be greater than zero")));
    }
}
