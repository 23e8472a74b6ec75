// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./dmpilot.toml` > `~/.config/dmpilot/dmpilot.toml` > `/etc/dmpilot/dmpilot.toml`
//! with environment variable overrides via `DMPILOT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::DmpilotConfig;

/// Top-level sections reachable through `DMPILOT_<SECTION>_<KEY>` variables.
///
/// Ordered so that no entry is a prefix of a later one.
const ENV_SECTIONS: &[&str] = &[
    "circuit_breaker",
    "rate_limit",
    "instagram",
    "prometheus",
    "pipeline",
    "storage",
    "server",
    "openai",
    "plans",
    "agent",
    "cost",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/dmpilot/dmpilot.toml` (system-wide)
/// 3. `~/.config/dmpilot/dmpilot.toml` (user XDG config)
/// 4. `./dmpilot.toml` (local directory)
/// 5. `DMPILOT_*` environment variables
pub fn load_config() -> Result<DmpilotConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config file specification.
pub fn load_config_from_str(toml_content: &str) -> Result<DmpilotConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DmpilotConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DmpilotConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DmpilotConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DmpilotConfig::default()))
        .merge(Toml::file("/etc/dmpilot/dmpilot.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("dmpilot/dmpilot.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("dmpilot.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section-to-dot mapping.
///
/// Uses `Env::map()` instead of `Env::split("_")` because both section and
/// key names contain underscores: `DMPILOT_RATE_LIMIT_SENDER_LIMIT` must map
/// to `rate_limit.sender_limit`.
fn env_provider() -> Env {
    Env::prefixed("DMPILOT_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a prefix-stripped env key onto its dotted config path.
///
/// Figment keeps the variable's original case, so the key is lowercased here.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
            && !rest.is_empty()
        {
            return format!("{section}.{rest}");
        }
    }
    key
}

/// Recover the `DMPILOT_*` variable name for an unmapped env key.
pub(crate) fn env_var_name(key: &str) -> String {
    format!("DMPILOT_{}", key.to_ascii_uppercase())
}
