// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the dmpilot reply pipeline.

use thiserror::Error;

/// The primary error type used across all dmpilot adapter traits and pipeline stages.
#[derive(Debug, Error)]
pub enum DmpilotError {
    /// Configuration errors (invalid TOML, missing credentials, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging platform errors (send rejected, profile lookup failed).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AI provider errors (API failure, malformed response, retries exhausted).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A tenant's daily AI budget is spent.
    #[error("budget exhausted: {message}")]
    BudgetExhausted { message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DmpilotError {
    /// Wraps any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }
}
