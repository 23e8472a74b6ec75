// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-sender batch processing.
//!
//! One [`SenderBatch`] goes through, in order: message-id deduplication,
//! tenant resolution, inbound persistence, admission gates 1-4, history,
//! gates 5-7, reply generation, outbound persistence, and dispatch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dmpilot_config::model::InstagramConfig;
use dmpilot_config::DmpilotConfig;
use dmpilot_core::persona::PersonaSettings;
use dmpilot_core::types::{InboundEvent, PlanAllotments, TenantConnection};
use dmpilot_core::{
    ChannelAdapter, Clock, DmpilotError, ProviderAdapter, QuotaNotifier, SenderBatch,
    StorageAdapter,
};
use dmpilot_cost::{BudgetGuard, BudgetLedger};
use dmpilot_resilience::{BreakerSettings, CircuitBreaker, CounterStore, RateLimiter};
use strum::IntoStaticStr;
use tracing::{debug, info, warn};

use crate::admission::{AdmissionPolicy, Denial};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::generator::ReplyGenerator;
use crate::manual::ManualSender;
use crate::metrics;
use crate::settings::SettingsCache;

/// Everything the pipeline reaches outside itself.
#[derive(Clone)]
pub struct PipelineDeps {
    pub storage: Arc<dyn StorageAdapter>,
    pub provider: Arc<dyn ProviderAdapter>,
    pub channel: Arc<dyn ChannelAdapter>,
    pub notifier: Arc<dyn QuotaNotifier>,
    /// Rate-limit and breaker counters, shared by every worker.
    pub counters: Arc<dyn CounterStore>,
    pub clock: Arc<dyn Clock>,
    pub budget: BudgetLedger,
}

#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BatchOutcome {
    /// Every message id in the batch had been processed before.
    Duplicate,
    /// No connection and no legacy account matched the delivery.
    Unroutable,
    MissingCredential,
    Denied(Denial),
    /// The AI call failed or produced nothing.
    NoReply,
    /// Manual review mode: the reply is stored, not sent.
    Withheld { message_id: i64 },
    Sent { message_id: i64 },
    /// The reply is stored but the platform rejected the send.
    SendFailed { message_id: i64 },
}

/// The legacy default account, configured rather than stored.
#[derive(Debug, Clone)]
pub(crate) struct LegacyAccount {
    platform_user_id: String,
    access_token: String,
}

impl LegacyAccount {
    pub(crate) fn from_config(config: &InstagramConfig) -> Option<Self> {
        let platform_user_id = config.fallback_user_id.clone().filter(|id| !id.is_empty())?;
        Some(Self {
            platform_user_id,
            access_token: config.access_token.clone().unwrap_or_default(),
        })
    }

    fn matches(&self, recipient_id: &str) -> bool {
        self.platform_user_id == recipient_id
    }

    pub(crate) fn connection(&self) -> TenantConnection {
        TenantConnection::legacy(&self.platform_user_id, &self.access_token)
    }
}

/// The AI provider's circuit breaker, built on the shared counters.
pub(crate) fn ai_breaker(
    config: &DmpilotConfig,
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
) -> CircuitBreaker {
    let cb = &config.circuit_breaker;
    CircuitBreaker::new(
        counters,
        clock,
        "openai",
        BreakerSettings {
            failure_threshold: cb.failure_threshold,
            window: Duration::from_secs(cb.window_secs),
            open_for: Duration::from_secs(cb.open_secs),
        },
    )
}

pub(crate) fn admission_policy(
    config: &DmpilotConfig,
    deps: &PipelineDeps,
    settings: Arc<SettingsCache>,
) -> AdmissionPolicy {
    let rl = &config.rate_limit;
    AdmissionPolicy::new(
        deps.storage.clone(),
        deps.channel.clone(),
        settings,
        RateLimiter::new(
            deps.counters.clone(),
            deps.clock.clone(),
            "sender",
            rl.sender_limit,
            Duration::from_secs(rl.sender_window_secs),
        ),
        RateLimiter::new(
            deps.counters.clone(),
            deps.clock.clone(),
            "tenant_ai",
            rl.tenant_ai_limit,
            Duration::from_secs(rl.tenant_ai_window_secs),
        ),
        ai_breaker(config, deps.counters.clone(), deps.clock.clone()),
        BudgetGuard::new(deps.budget.clone(), &config.cost, deps.clock.clone()),
        PlanAllotments {
            starter_monthly: config.plans.starter_monthly_replies,
            standard_monthly: config.plans.standard_monthly_replies,
        },
    )
}

pub struct BatchProcessor {
    storage: Arc<dyn StorageAdapter>,
    settings: Arc<SettingsCache>,
    policy: AdmissionPolicy,
    generator: ReplyGenerator,
    dispatcher: Arc<Dispatcher>,
    legacy: Option<LegacyAccount>,
    manual_review: bool,
    history_turns: usize,
}

impl BatchProcessor {
    pub fn new(config: &DmpilotConfig, deps: PipelineDeps) -> Self {
        let settings = Arc::new(SettingsCache::new(
            deps.storage.clone(),
            Duration::from_secs(config.pipeline.settings_cache_ttl_secs),
            deps.clock.clone(),
        ));
        let policy = admission_policy(config, &deps, settings.clone());
        let generator = ReplyGenerator::new(
            deps.provider.clone(),
            policy.breaker().clone(),
            policy.budget().clone(),
            config.openai.model.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            deps.channel.clone(),
            deps.storage.clone(),
            deps.notifier.clone(),
            config.plans.warning_threshold,
        ));

        Self {
            storage: deps.storage,
            settings,
            policy,
            generator,
            dispatcher,
            legacy: LegacyAccount::from_config(&config.instagram),
            manual_review: config.pipeline.manual_review,
            history_turns: config.pipeline.history_turns,
        }
    }

    /// Sender for replies withheld in manual review mode, sharing this
    /// processor's dispatcher.
    pub fn manual_sender(&self) -> ManualSender {
        ManualSender::new(
            self.storage.clone(),
            self.dispatcher.clone(),
            self.legacy.clone(),
        )
    }

    pub fn settings(&self) -> &SettingsCache {
        &self.settings
    }

    /// Process one sender's batch to a terminal outcome.
    ///
    /// Denials and AI failures are outcomes. `Err` means storage failed and
    /// the batch should be dead-lettered.
    pub async fn process(&self, batch: SenderBatch) -> Result<BatchOutcome, DmpilotError> {
        let sender_id = batch.sender_id.clone();
        let outcome = self.run(batch).await?;
        let label: &'static str = (&outcome).into();
        metrics::batch(label);
        debug!(sender_id = %sender_id, outcome = label, "batch processed");
        Ok(outcome)
    }

    async fn run(&self, mut batch: SenderBatch) -> Result<BatchOutcome, DmpilotError> {
        let fresh = self.claim_message_ids(&batch).await?;
        batch.retain(|event| {
            event
                .message_id
                .as_ref()
                .is_none_or(|mid| fresh.contains(mid))
        });
        let Some(routing) = batch.routing_event().cloned() else {
            info!(sender_id = %batch.sender_id, "batch already processed");
            return Ok(BatchOutcome::Duplicate);
        };

        let Some(connection) = self.resolve(&routing).await? else {
            info!(
                recipient_id = %routing.recipient_id,
                page_id = %routing.page_id,
                "no connection for delivery, dropping"
            );
            return Ok(BatchOutcome::Unroutable);
        };
        if connection.send_credential.is_empty() {
            warn!(connection_id = ?connection.connection_id, "connection has no access token");
            return Ok(BatchOutcome::MissingCredential);
        }

        let sender_id = batch.sender_id.as_str();
        for event in batch.events() {
            self.storage
                .save_inbound(sender_id, &event.text, connection.connection_id)
                .await?;
        }
        info!(
            sender_id,
            connection_id = ?connection.connection_id,
            events = batch.len(),
            "inbound batch stored"
        );

        if let Err(denial) = self.policy.admit_batch(&connection, sender_id).await? {
            return Ok(BatchOutcome::Denied(denial));
        }

        let history = self
            .storage
            .history(sender_id, self.history_turns * 2, connection.connection_id)
            .await?;
        let persona = match connection.connection_id {
            Some(connection_id) => self.settings.persona(connection_id).await?,
            None => Arc::new(PersonaSettings::fallback()),
        };

        let reservation = match self.policy.admit_ai_call(&connection, sender_id).await? {
            Ok(reservation) => reservation,
            Err(denial) => return Ok(BatchOutcome::Denied(denial)),
        };

        let Some(reply) = self
            .generator
            .generate(&persona, history, reservation.as_ref())
            .await
        else {
            return Ok(BatchOutcome::NoReply);
        };

        let message_id = self
            .storage
            .save_outbound(sender_id, &reply, connection.connection_id, false)
            .await?;
        if self.manual_review {
            info!(message_id, sender_id, "reply withheld for manual review");
            return Ok(BatchOutcome::Withheld { message_id });
        }

        match self
            .dispatcher
            .dispatch(&connection, sender_id, &reply, message_id)
            .await?
        {
            DispatchOutcome::Sent | DispatchOutcome::AlreadyDispatched => {
                Ok(BatchOutcome::Sent { message_id })
            }
            DispatchOutcome::SendFailed => Ok(BatchOutcome::SendFailed { message_id }),
        }
    }

    /// Claim each message id; returns the ids claimed by this call.
    async fn claim_message_ids(&self, batch: &SenderBatch) -> Result<HashSet<String>, DmpilotError> {
        let mut fresh = HashSet::new();
        for mid in batch.events().iter().filter_map(|e| e.message_id.as_deref()) {
            if self.storage.claim_message_id(mid).await? {
                fresh.insert(mid.to_string());
            } else {
                debug!(message_id = mid, "duplicate message id skipped");
            }
        }
        Ok(fresh)
    }

    /// Recipient account first, then page, then the legacy account.
    async fn resolve(&self, event: &InboundEvent) -> Result<Option<TenantConnection>, DmpilotError> {
        if !event.recipient_id.is_empty()
            && let Some(conn) = self
                .storage
                .connection_by_platform_user_id(&event.recipient_id)
                .await?
        {
            return Ok(Some(conn));
        }
        if !event.page_id.is_empty()
            && let Some(conn) = self.storage.connection_by_page_id(&event.page_id).await?
        {
            return Ok(Some(conn));
        }
        Ok(self
            .legacy
            .as_ref()
            .filter(|legacy| legacy.matches(&event.recipient_id))
            .map(LegacyAccount::connection))
    }
}
