// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-through cache of per-connection persona settings.

use std::sync::Arc;
use std::time::Duration;

use dmpilot_core::persona::PersonaSettings;
use dmpilot_core::{Clock, DmpilotError, StorageAdapter};
use dmpilot_resilience::TtlCache;

/// Cached resource kinds. Block lists live inside the persona document,
/// so one cached read serves both the block-list gate and the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsResource {
    Persona,
}

pub struct SettingsCache {
    storage: Arc<dyn StorageAdapter>,
    cache: TtlCache<(i64, SettingsResource), Arc<PersonaSettings>>,
}

impl SettingsCache {
    pub fn new(storage: Arc<dyn StorageAdapter>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Persona for a connection; [`PersonaSettings::fallback`] when none is stored.
    pub async fn persona(&self, connection_id: i64) -> Result<Arc<PersonaSettings>, DmpilotError> {
        let storage = &self.storage;
        self.cache
            .get_or_try_load((connection_id, SettingsResource::Persona), || async move {
                let settings = storage
                    .persona_settings(connection_id)
                    .await?
                    .unwrap_or_else(PersonaSettings::fallback);
                Ok(Arc::new(settings))
            })
            .await
    }

    pub fn invalidate(&self, connection_id: i64) {
        self.cache
            .invalidate(&(connection_id, SettingsResource::Persona));
    }
}
