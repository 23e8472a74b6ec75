// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-bounded read-through cache keyed by `(tenant, resource)`.
//!
//! Per process only. Nothing may depend on a hit for correctness: an entry
//! past its TTL is treated exactly like a miss.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dmpilot_core::Clock;

pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, u64)>,
    clock: Arc<dyn Clock>,
    ttl_millis: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            ttl_millis: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The cached value, if present and fresh.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        let hit = self
            .entries
            .get(key)
            .filter(|entry| now < entry.1)
            .map(|entry| entry.0.clone());
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| now >= entry.1);
        }
        hit
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = self.clock.now_millis().saturating_add(self.ttl_millis);
        self.entries.insert(key, (value, expires_at));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Return the fresh cached value or load, cache, and return a new one.
    ///
    /// Load errors are returned as-is and nothing is cached.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}
