// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use dmpilot_core::Clock;
use tracing::warn;

use crate::counter::CounterStore;

/// Allows at most `limit` events per key within any trailing `window`.
///
/// Every check records an event, including throttled ones, so a sender
/// who keeps hammering stays throttled until they slow down.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    namespace: &'static str,
    limit: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        namespace: &'static str,
        limit: u64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            namespace,
            limit,
            window,
        }
    }

    /// Record one event for `key` and report whether it is within the limit.
    ///
    /// Fails open: if the counter store errors, the event is allowed.
    pub async fn allow(&self, key: &str) -> bool {
        let store_key = format!("rl:{}:{key}", self.namespace);
        match self
            .store
            .record_and_count(&store_key, self.clock.now_millis(), self.window)
            .await
        {
            Ok(count) => count <= self.limit,
            Err(e) => {
                warn!(namespace = self.namespace, error = %e, "rate limit store unavailable, allowing");
                true
            }
        }
    }
}
