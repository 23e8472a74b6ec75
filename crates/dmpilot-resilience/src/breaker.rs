// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker guarding the AI provider.
//!
//! CLOSED until `threshold` failures land inside the trailing window, then
//! OPEN for a fixed cool-down. There is no explicit half-open state: once
//! the cool-down elapses the next call simply goes through and its outcome
//! is recorded like any other.

use std::sync::Arc;
use std::time::Duration;

use dmpilot_core::Clock;
use tracing::warn;

use crate::counter::CounterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u64,
    pub window: Duration,
    pub open_for: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 8,
            window: Duration::from_secs(120),
            open_for: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    name: &'static str,
    settings: BreakerSettings,
}

impl CircuitBreaker {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        name: &'static str,
        settings: BreakerSettings,
    ) -> Self {
        Self {
            store,
            clock,
            name,
            settings,
        }
    }

    fn failures_key(&self) -> String {
        format!("cb:{}", self.name)
    }

    fn open_key(&self) -> String {
        format!("cb:{}:open", self.name)
    }

    /// Whether calls are currently blocked. Store errors read as closed.
    pub async fn is_open(&self) -> bool {
        match self
            .store
            .flag_active(&self.open_key(), self.clock.now_millis())
            .await
        {
            Ok(open) => open,
            Err(e) => {
                warn!(breaker = self.name, error = %e, "breaker store unavailable, treating as closed");
                false
            }
        }
    }

    /// A successful call clears the failure window.
    pub async fn record_success(&self) {
        if let Err(e) = self.store.clear(&self.failures_key()).await {
            warn!(breaker = self.name, error = %e, "failed to clear breaker failures");
        }
    }

    /// Record one failure; opens the breaker when the window reaches the threshold.
    pub async fn record_failure(&self) {
        let now = self.clock.now_millis();
        let count = match self
            .store
            .record_and_count(&self.failures_key(), now, self.settings.window)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(breaker = self.name, error = %e, "failed to record breaker failure");
                return;
            }
        };

        if count >= self.settings.failure_threshold {
            let open_ms = u64::try_from(self.settings.open_for.as_millis()).unwrap_or(u64::MAX);
            match self
                .store
                .set_flag(&self.open_key(), now.saturating_add(open_ms))
                .await
            {
                Ok(()) => warn!(
                    breaker = self.name,
                    failures = count,
                    open_secs = self.settings.open_for.as_secs(),
                    "circuit breaker OPEN"
                ),
                Err(e) => warn!(breaker = self.name, error = %e, "failed to open breaker"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MemoryCounterStore;
    use crate::testing::FailingStore;
    use dmpilot_core::ManualClock;

    fn breaker(clock: Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::new(
            Arc::new(MemoryCounterStore::new()),
            clock,
            "openai",
            BreakerSettings::default(),
        )
    }

    #[tokio::test]
    async fn opens_after_threshold_and_closes_after_cooldown() {
        let clock = Arc::new(ManualClock::new(10_000));
        let breaker = breaker(clock.clone());

        for _ in 0..7 {
            breaker.record_failure().await;
            clock.advance(Duration::from_secs(1));
        }
        assert!(!breaker.is_open().await);

        breaker.record_failure().await;
        assert!(breaker.is_open().await);

        clock.advance(Duration::from_secs(59));
        assert!(breaker.is_open().await);

        clock.advance(Duration::from_secs(1));
        assert!(!breaker.is_open().await);
    }

    #[tokio::test]
    async fn failures_outside_window_do_not_count() {
        let clock = Arc::new(ManualClock::new(0));
        let breaker = breaker(clock.clone());
        for _ in 0..8 {
            breaker.record_failure().await;
            clock.advance(Duration::from_secs(20));
        }
        assert!(!breaker.is_open().await, "8 failures spread over 160s never fill a 120s window");
    }

    #[tokio::test]
    async fn success_resets_failure_window() {
        let clock = Arc::new(ManualClock::new(0));
        let breaker = breaker(clock.clone());
        for _ in 0..7 {
            breaker.record_failure().await;
        }
        breaker.record_success().await;
        breaker.record_failure().await;
        assert!(!breaker.is_open().await);
    }

    #[tokio::test]
    async fn store_failure_reads_as_closed() {
        let breaker = CircuitBreaker::new(
            Arc::new(FailingStore),
            Arc::new(ManualClock::new(0)),
            "openai",
            BreakerSettings::default(),
        );
        breaker.record_failure().await;
        breaker.record_success().await;
        assert!(!breaker.is_open().await);
    }
}
