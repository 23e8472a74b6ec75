// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types live in `dmpilot-core::types` so they can cross the
//! adapter trait boundary. This module re-exports them for convenience.

pub use dmpilot_core::types::{
    DeadLetter, QuotaState, ReplyCountUpdate, StoredMessage, TenantConnection,
};
