// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction errors into miette diagnostics.
//!
//! A bad key in a TOML file is reported with a span pointing at the key.
//! A bad key that came from a `DMPILOT_*` variable is reported by the
//! variable's name, since that is what the operator actually typed.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader::env_var_name;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A config file names a key the section does not have.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(dmpilot::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys the section accepts.
        valid_keys: String,
        #[label("not a dmpilot setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A `DMPILOT_*` variable does not map onto any setting.
    #[error("environment variable `{var}` is not a dmpilot setting")]
    #[diagnostic(
        code(dmpilot::config::unknown_env_var),
        help("{}", unknown_env_help(suggestion.as_deref()))
    )]
    UnknownEnvVar {
        var: String,
        /// Closest valid variable name.
        suggestion: Option<String>,
    },

    #[error("invalid type for `{key}`: {detail}")]
    #[diagnostic(code(dmpilot::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path, or the variable name when the value came from the environment.
        key: String,
        detail: String,
        expected: String,
    },

    #[error("validation error: {message}")]
    #[diagnostic(code(dmpilot::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(dmpilot::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

fn unknown_env_help(suggestion: Option<&str>) -> String {
    let form = "variables take the form DMPILOT_<SECTION>_<KEY>, e.g. DMPILOT_INSTAGRAM_APP_SECRET";
    match suggestion {
        Some(s) => format!("did you mean `{s}`? {form}"),
        None => form.to_string(),
    }
}

/// Convert every error folded into `err` into a [`ConfigError`].
///
/// `toml_sources` holds `(path, content)` pairs for the files that were
/// merged, so unknown file keys can be given a source span.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, toml_sources))
        .collect()
}

fn convert(error: &figment::Error, toml_sources: &[(String, String)]) -> ConfigError {
    let section: Vec<String> = error.path.iter().map(ToString::to_string).collect();
    let from_env = came_from_env(error);

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let suggestion = suggest_key(field, expected);
            if from_env {
                return ConfigError::UnknownEnvVar {
                    var: env_var_for(&section, field),
                    suggestion: suggestion.map(|s| env_var_for(&section, &s)),
                };
            }
            let (span, src) = locate_in_sources(error, &section, field, toml_sources);
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion,
                valid_keys: expected.join(", "),
                span,
                src,
            }
        }
        Kind::InvalidType(actual, expected) => {
            let key = match section.split_last() {
                Some((field, parents)) if from_env => env_var_for(parents, field),
                _ => section.join("."),
            };
            ConfigError::InvalidType {
                key,
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.clone(),
            }
        }
        Kind::MissingField(field) => ConfigError::Other(format!("missing required key `{field}`")),
        _ => ConfigError::Other(error.to_string()),
    }
}

fn came_from_env(error: &figment::Error) -> bool {
    error
        .metadata
        .as_ref()
        .is_some_and(|md| md.name.contains("environment variable"))
}

fn env_var_for(section: &[String], field: &str) -> String {
    let mut parts: Vec<&str> = section.iter().map(String::as_str).collect();
    parts.push(field);
    env_var_name(&parts.join("_"))
}

fn locate_in_sources(
    error: &figment::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(figment::Source::File(origin)) =
        error.metadata.as_ref().and_then(|md| md.source.as_ref())
    else {
        return (None, None);
    };
    let origin = origin.display().to_string();
    let Some((path, content)) = toml_sources.iter().find(|(p, _)| *p == origin) else {
        return (None, None);
    };

    match find_key_offset(content, section.first().map(String::as_str), field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside `[section]` (or the top level).
pub fn find_key_offset(content: &str, section: Option<&str>, field: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut line_start = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            current = header.split(']').next().map(str::trim);
        } else if current == section
            && let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(line_start + (line.len() - trimmed.len()));
        }
        line_start += line.len();
    }
    None
}

/// Closest valid key by Jaro-Winkler similarity, if any is close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each error to stderr through miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, error) {
            Ok(()) => eprint!("{rendered}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
