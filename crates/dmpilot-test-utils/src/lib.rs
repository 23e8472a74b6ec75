// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for dmpilot integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - scripted AI provider with a call counter
//! - [`MockChannel`] - captures outbound sends, answers username lookups
//! - [`CountingStorage`] - storage wrapper counting every store call
//! - [`TestHarness`] - gateway, pipeline, and temp database wired together

pub mod counting_storage;
pub mod harness;
pub mod mock_channel;
pub mod mock_provider;

pub use counting_storage::CountingStorage;
pub use harness::{
    delivery_json, text_event, TenantSeed, TestHarness, TestHarnessBuilder, APP_SECRET,
    VERIFY_TOKEN,
};
pub use mock_channel::{MockChannel, SentMessage};
pub use mock_provider::{MockProvider, MockReply};
