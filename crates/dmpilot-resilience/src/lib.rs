// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for the dmpilot reply pipeline.
//!
//! Rate limiters and the circuit breaker keep all of their state in a
//! [`CounterStore`], so they behave the same in one process or many, and
//! they fail open when that store is unavailable.

pub mod breaker;
pub mod cache;
pub mod counter;
pub mod rate_limit;

pub use breaker::{BreakerSettings, CircuitBreaker};
pub use cache::TtlCache;
pub use counter::{CounterStore, MemoryCounterStore};
pub use rate_limit::RateLimiter;
