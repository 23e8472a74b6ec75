// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared counter store backing the rate limiters and the circuit breaker.
//!
//! The store is the only state the limiters keep, so pointing every replica
//! at one store gives consistent limits across processes. Callers treat any
//! store error as "allowed".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dmpilot_core::DmpilotError;

/// Low-latency store of sliding-window event logs and expiring flags.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Drop events older than `window`, record one at `now_millis`, and
    /// return how many events remain in the window (including this one).
    async fn record_and_count(
        &self,
        key: &str,
        now_millis: u64,
        window: Duration,
    ) -> Result<u64, DmpilotError>;

    /// Forget every event recorded under `key`.
    async fn clear(&self, key: &str) -> Result<(), DmpilotError>;

    /// Raise a flag that expires at `until_millis`.
    async fn set_flag(&self, key: &str, until_millis: u64) -> Result<(), DmpilotError>;

    /// Whether the flag is raised and not yet expired at `now_millis`.
    async fn flag_active(&self, key: &str, now_millis: u64) -> Result<bool, DmpilotError>;
}

/// How often stale keys are swept out of a [`MemoryCounterStore`].
const SWEEP_INTERVAL_MS: u64 = 60_000;

/// In-process [`CounterStore`] for single-replica deployments and tests.
///
/// Keys are sender and tenant ids from inbound traffic, so windows whose
/// events have all expired are dropped on a periodic sweep.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, EventWindow>,
    flags: DashMap<String, u64>,
    last_sweep: AtomicU64,
}

#[derive(Debug, Default)]
struct EventWindow {
    span_ms: u64,
    events: VecDeque<u64>,
}

impl EventWindow {
    fn stale_at(&self, now_millis: u64) -> bool {
        self.events
            .back()
            .is_none_or(|&newest| newest.saturating_add(self.span_ms) <= now_millis)
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding window or flag state.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len() + self.flags.len()
    }

    fn sweep_if_due(&self, now_millis: u64) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now_millis.saturating_sub(last) < SWEEP_INTERVAL_MS {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now_millis, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let before = self.tracked_keys();
        self.windows.retain(|_, window| !window.stale_at(now_millis));
        self.flags.retain(|_, until| now_millis < *until);
        let dropped = before.saturating_sub(self.tracked_keys());
        if dropped > 0 {
            tracing::debug!(dropped, "swept expired counter keys");
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn record_and_count(
        &self,
        key: &str,
        now_millis: u64,
        window: Duration,
    ) -> Result<u64, DmpilotError> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let cutoff = now_millis.saturating_sub(window_ms);
        self.sweep_if_due(now_millis);

        let mut window = self.windows.entry(key.to_string()).or_default();
        window.span_ms = window.span_ms.max(window_ms);
        while window.events.front().is_some_and(|&at| at <= cutoff) {
            window.events.pop_front();
        }
        window.events.push_back(now_millis);
        Ok(window.events.len() as u64)
    }

    async fn clear(&self, key: &str) -> Result<(), DmpilotError> {
        self.windows.remove(key);
        Ok(())
    }

    async fn set_flag(&self, key: &str, until_millis: u64) -> Result<(), DmpilotError> {
        self.flags.insert(key.to_string(), until_millis);
        Ok(())
    }

    async fn flag_active(&self, key: &str, now_millis: u64) -> Result<bool, DmpilotError> {
        let active = self
            .flags
            .get(key)
            .is_some_and(|until| now_millis < *until);
        if !active {
            self.flags.remove_if(key, |_, until| now_millis >= *until);
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_drops_expired_events() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);
        assert_eq!(store.record_and_count("k", 0, window).await.unwrap(), 1);
        assert_eq!(store.record_and_count("k", 30_000, window).await.unwrap(), 2);
        // The event at t=0 is exactly one window old and leaves.
        assert_eq!(store.record_and_count("k", 60_000, window).await.unwrap(), 2);
        assert_eq!(store.record_and_count("other", 60_000, window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn flags_expire() {
        let store = MemoryCounterStore::new();
        store.set_flag("open", 1_000).await.unwrap();
        assert!(store.flag_active("open", 999).await.unwrap());
        assert!(!store.flag_active("open", 1_000).await.unwrap());
        assert!(!store.flag_active("missing", 0).await.unwrap());
    }

    #[tokio::test]
    async fn clear_resets_window() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);
        store.record_and_count("k", 1, window).await.unwrap();
        store.clear("k").await.unwrap();
        assert_eq!(store.record_and_count("k", 2, window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_sender_keys_are_swept() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);
        for i in 0..10_000 {
            let key = format!("sender:{i}");
            store.record_and_count(&key, 1_000, window).await.unwrap();
        }
        store.set_flag("open", 2_000).await.unwrap();
        assert_eq!(store.tracked_keys(), 10_001);

        let next_day = 86_400_000;
        store.record_and_count("sender:new", next_day, window).await.unwrap();
        assert_eq!(store.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn sweep_keeps_keys_still_inside_their_window() {
        let store = MemoryCounterStore::new();
        let t0 = 10_000_000;
        let hour = Duration::from_secs(3_600);
        let minute = Duration::from_secs(60);
        store.record_and_count("tenant:1", t0, hour).await.unwrap();
        store.record_and_count("sender:1", t0, minute).await.unwrap();

        store
            .record_and_count("sender:2", t0 + 120_000, minute)
            .await
            .unwrap();
        assert!(store.windows.contains_key("tenant:1"));
        assert!(!store.windows.contains_key("sender:1"));
        assert_eq!(
            store
                .record_and_count("tenant:1", t0 + 120_000, hour)
                .await
                .unwrap(),
            2
        );
    }
}
