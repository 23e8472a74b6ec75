// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the dmpilot Instagram DM reply pipeline.
//!
//! This crate provides the error type, the canonical data types, and the
//! adapter traits through which the pipeline reaches storage, the AI
//! provider, and the messaging platform.

pub mod clock;
pub mod error;
pub mod persona;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DmpilotError;
pub use persona::PersonaSettings;
pub use types::{AdapterType, HealthStatus, InboundEvent, SenderBatch, TenantConnection};

pub use traits::{
    ChannelAdapter, LogNotifier, PluginAdapter, ProviderAdapter, QuotaNotifier, StorageAdapter,
};
