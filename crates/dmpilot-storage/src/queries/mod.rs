// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Every function takes `&Database` and runs one
//! closure on the connection thread.

pub mod connections;
pub mod dead_letters;
pub mod idempotency;
pub mod messages;
pub mod quota;
pub mod senders;
pub mod settings;

/// Current UTC time in the format every timestamp column uses.
pub(crate) fn now_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

pub(crate) fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
