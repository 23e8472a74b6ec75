// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the dmpilot configuration system.

use dmpilot_config::diagnostic::ConfigError;
use dmpilot_config::model::DmpilotConfig;
use dmpilot_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use serial_test::serial;

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[agent]
name = "dm-test"
log_level = "debug"

[server]
host = "127.0.0.1"
port = 9090

[instagram]
verify_token = "hub-token"
app_secret = "app-secret"
fallback_user_id = "17841400000000000"
graph_base_url = "http://localhost:1234"

[openai]
api_key = "sk-test"
model = "gpt-4o-mini"
timeout_secs = 30
max_attempts = 2

[cost]
daily_budget_usd = 2.5

[rate_limit]
sender_limit = 5
sender_window_secs = 10

[circuit_breaker]
failure_threshold = 3

[pipeline]
worker_concurrency = 4
manual_review = true
history_turns = 6

[plans]
warning_threshold = 25

[storage]
database_path = "/tmp/dmpilot-test.db"
wal_mode = false

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "dm-test");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.instagram.verify_token.as_deref(), Some("hub-token"));
    assert_eq!(config.instagram.signing_secret(), Some("app-secret"));
    assert_eq!(config.instagram.graph_base_url, "http://localhost:1234");
    assert_eq!(config.openai.model, "gpt-4o-mini");
    assert_eq!(config.openai.max_attempts, 2);
    assert!((config.cost.daily_budget_usd - 2.5).abs() < 1e-10);
    assert_eq!(config.rate_limit.sender_limit, 5);
    assert_eq!(config.rate_limit.tenant_ai_limit, 60);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.open_secs, 60);
    assert!(config.pipeline.manual_review);
    assert_eq!(config.pipeline.history_turns, 6);
    assert_eq!(config.plans.warning_threshold, 25);
    assert!(!config.storage.wal_mode);
    assert!(!config.prometheus.enabled);
}

/// Missing sections fall back to compiled defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should deserialize");
    assert_eq!(config.agent.name, "dmpilot");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.instagram.api_version, "v18.0");
    assert_eq!(config.instagram.send_timeout_secs, 30);
    assert_eq!(config.instagram.lookup_timeout_secs, 5);
    assert_eq!(config.openai.model, "gpt-5-nano");
    assert_eq!(config.pipeline.queue_capacity, 256);
    assert_eq!(config.pipeline.settings_cache_ttl_secs, 30);
}

/// Unknown keys inside a section are rejected with a suggestion.
#[test]
fn unknown_key_in_section_suggests_correction() {
    let toml = r#"
[instagram]
verify_tokn = "abc"
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "verify_tokn"
                && suggestion.as_deref() == Some("verify_token")
                && valid_keys.contains("app_secret")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey error for 'verify_tokn', got: {errors:?}"
    );
}

/// Unknown top-level sections are rejected too.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[telegram]
bot_token = "nope"
"#;

    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    assert!(format!("{err}").contains("telegram"));
}

/// A string where a number belongs is a type error.
#[test]
fn invalid_type_is_reported() {
    let toml = r#"
[pipeline]
worker_concurrency = "many"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))),
        "got: {errors:?}"
    );
}

/// Validation errors surface through the high-level loader.
#[test]
fn validation_catches_negative_budget_and_zero_window() {
    let toml = r#"
[cost]
daily_budget_usd = -5.0

[circuit_breaker]
window_secs = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert!(messages.iter().any(|m| m.contains("daily_budget_usd")));
    assert!(messages.iter().any(|m| m.contains("circuit_breaker.window_secs")));
}

/// ConfigError renders through miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "modle".to_string(),
        suggestion: Some("model".to_string()),
        valid_keys: "api_key, model, base_url".to_string(),
        span: None,
        src: None,
    };

    let help = error.help().expect("should have help text").to_string();
    assert!(help.contains("did you mean `model`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("modle"));
}

/// `DMPILOT_*` variables override file values, section names with underscores included.
#[test]
#[serial]
fn env_vars_override_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dmpilot.toml");
    std::fs::write(
        &path,
        "[rate_limit]\nsender_limit = 5\n\n[instagram]\napp_secret = \"from-file\"\n",
    )
    .unwrap();

    // SAFETY: serialized with every other env-mutating test.
    unsafe {
        std::env::set_var("DMPILOT_RATE_LIMIT_SENDER_LIMIT", "11");
        std::env::set_var("DMPILOT_INSTAGRAM_APP_SECRET", "from-env");
    }
    let result = load_and_validate_path(&path);
    unsafe {
        std::env::remove_var("DMPILOT_RATE_LIMIT_SENDER_LIMIT");
        std::env::remove_var("DMPILOT_INSTAGRAM_APP_SECRET");
    }

    let config: DmpilotConfig = result.expect("config should load");
    assert_eq!(config.rate_limit.sender_limit, 11);
    assert_eq!(config.instagram.app_secret.as_deref(), Some("from-env"));
}

/// A typo in an explicit config file is reported with a suggestion.
#[test]
#[serial]
fn file_typo_is_reported_with_suggestion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dmpilot.toml");
    std::fs::write(&path, "[server]\nhots = \"127.0.0.1\"\n").unwrap();

    let errors = load_and_validate_path(&path).expect_err("typo should fail");
    let reported = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, .. }
            if key == "hots" && suggestion.as_deref() == Some("host"))
    });
    assert!(reported, "got: {errors:?}");
}

/// A misspelled variable is reported by its name, with the closest real one.
#[test]
#[serial]
fn unknown_env_var_is_reported_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dmpilot.toml");
    std::fs::write(&path, "").unwrap();

    // SAFETY: serialized with every other env-mutating test.
    unsafe {
        std::env::set_var("DMPILOT_INSTAGRAM_APP_SECRT", "typo");
    }
    let result = load_and_validate_path(&path);
    unsafe {
        std::env::remove_var("DMPILOT_INSTAGRAM_APP_SECRT");
    }

    let errors = result.expect_err("unknown variable should fail");
    let reported = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownEnvVar { var, suggestion }
            if var == "DMPILOT_INSTAGRAM_APP_SECRT"
                && suggestion.as_deref() == Some("DMPILOT_INSTAGRAM_APP_SECRET"))
    });
    assert!(reported, "got: {errors:?}");
}
