// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI spend control for the dmpilot reply pipeline.
//!
//! This crate provides:
//! - **Pricing**: per-1K-token cost calculation
//! - **Budget ledger**: per-tenant, per-day accumulated spend in SQLite
//! - **Budget guard**: reserve-before-call and reconcile-after-call enforcement

pub mod budget;
pub mod ledger;
pub mod pricing;

pub use budget::{BudgetGuard, Reservation};
pub use ledger::BudgetLedger;
pub use pricing::Pricing;
