// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the dmpilot reply pipeline.
//!
//! Verifies and acknowledges Instagram webhook deliveries, hands the
//! normalized sender batches to the worker queue, and serves the billing
//! webhook, health, and metrics endpoints.

pub mod billing;
pub mod handlers;
pub mod server;
pub mod webhook;

pub use server::{router, start_server, GatewayState, HealthState, WebhookSecrets};
