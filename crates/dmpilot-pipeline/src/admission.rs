// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission policy: the ordered gates a batch passes before a reply is
//! generated.
//!
//! Gates run in a fixed order and stop at the first denial:
//!
//! 1. paused
//! 2. quota
//! 3. sender block list
//! 4. per-sender inbound rate
//! 5. per-tenant AI rate
//! 6. AI circuit breaker
//! 7. AI daily budget
//!
//! Gates 1-4 run before history is read ([`AdmissionPolicy::admit_batch`]),
//! gates 5-7 immediately before the provider call
//! ([`AdmissionPolicy::admit_ai_call`]). A denial is a normal outcome, not
//! an error; errors are reserved for storage failures.

use std::sync::Arc;

use dmpilot_core::types::{PlanAllotments, TenantConnection};
use dmpilot_core::{ChannelAdapter, DmpilotError, StorageAdapter};
use dmpilot_cost::{BudgetGuard, Reservation};
use dmpilot_resilience::{CircuitBreaker, RateLimiter};
use strum::{Display, IntoStaticStr};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::settings::SettingsCache;

/// Why a batch got no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Denial {
    Paused,
    QuotaExhausted,
    BlockedSender,
    SenderRateLimited,
    TenantAiRateLimited,
    CircuitOpen,
    BudgetExhausted,
}

/// Outcome of a group of gates: `Ok` carries what the caller needs next.
pub type Admission<T> = Result<T, Denial>;

pub struct AdmissionPolicy {
    storage: Arc<dyn StorageAdapter>,
    channel: Arc<dyn ChannelAdapter>,
    settings: Arc<SettingsCache>,
    sender_limiter: RateLimiter,
    tenant_ai_limiter: RateLimiter,
    breaker: CircuitBreaker,
    budget: BudgetGuard,
    allotments: PlanAllotments,
}

impl AdmissionPolicy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        settings: Arc<SettingsCache>,
        sender_limiter: RateLimiter,
        tenant_ai_limiter: RateLimiter,
        breaker: CircuitBreaker,
        budget: BudgetGuard,
        allotments: PlanAllotments,
    ) -> Self {
        Self {
            storage,
            channel,
            settings,
            sender_limiter,
            tenant_ai_limiter,
            breaker,
            budget,
            allotments,
        }
    }

    /// Gates 1-4.
    pub async fn admit_batch(
        &self,
        connection: &TenantConnection,
        sender_id: &str,
    ) -> Result<Admission<()>, DmpilotError> {
        if let Some(user_id) = connection.owner_user_id {
            match self.storage.quota_state(user_id, &self.allotments).await? {
                Some(quota) if quota.paused => return Ok(deny(Denial::Paused, connection, sender_id)),
                Some(quota) if quota.remaining() == 0 => {
                    return Ok(deny(Denial::QuotaExhausted, connection, sender_id));
                }
                Some(quota) => debug!(user_id, remaining = quota.remaining(), "quota available"),
                None => {
                    warn!(user_id, "connection owner has no account row");
                    return Ok(deny(Denial::QuotaExhausted, connection, sender_id));
                }
            }
        }

        if let Some(connection_id) = connection.connection_id
            && self.sender_is_blocked(connection, connection_id, sender_id).await?
        {
            return Ok(deny(Denial::BlockedSender, connection, sender_id));
        }

        if !self.sender_limiter.allow(sender_id).await {
            return Ok(deny(Denial::SenderRateLimited, connection, sender_id));
        }

        Ok(Ok(()))
    }

    /// Resolve the sender's username and check it against the block list.
    ///
    /// The lookup is best-effort: if it fails the sender is treated as not
    /// blocked. A resolved username is recorded in the sender directory.
    async fn sender_is_blocked(
        &self,
        connection: &TenantConnection,
        connection_id: i64,
        sender_id: &str,
    ) -> Result<bool, DmpilotError> {
        let persona = self.settings.persona(connection_id).await?;

        let username = match self.channel.fetch_username(connection, sender_id).await {
            Ok(Some(username)) => username,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(sender_id, connection_id, error = %e, "sender username lookup failed");
                return Ok(false);
            }
        };

        if let Err(e) = self
            .storage
            .record_sender(connection_id, sender_id, &username)
            .await
        {
            warn!(sender_id, connection_id, error = %e, "failed to record sender username");
        }

        Ok(persona.is_blocked(&username))
    }

    /// Gates 5-7. On admission, returns the budget reservation made for
    /// the call (`None` for the legacy account, which has no budget).
    pub async fn admit_ai_call(
        &self,
        connection: &TenantConnection,
        sender_id: &str,
    ) -> Result<Admission<Option<Reservation>>, DmpilotError> {
        if !self.tenant_ai_limiter.allow(&connection.tenant_key()).await {
            return Ok(deny(Denial::TenantAiRateLimited, connection, sender_id));
        }

        if self.breaker.is_open().await {
            return Ok(deny(Denial::CircuitOpen, connection, sender_id));
        }

        let Some(user_id) = connection.owner_user_id else {
            return Ok(Ok(None));
        };
        match self.budget.reserve(&user_id.to_string()).await {
            Ok(reservation) => Ok(Ok(Some(reservation))),
            Err(DmpilotError::BudgetExhausted { message }) => {
                info!(user_id, %message, "AI budget exhausted");
                Ok(deny(Denial::BudgetExhausted, connection, sender_id))
            }
            Err(e) => Err(e),
        }
    }

    pub fn budget(&self) -> &BudgetGuard {
        &self.budget
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

fn deny<T>(denial: Denial, connection: &TenantConnection, sender_id: &str) -> Admission<T> {
    info!(
        sender_id,
        connection_id = ?connection.connection_id,
        reason = %denial,
        "admission denied"
    );
    metrics::denial(denial.into());
    Err(denial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, StubChannel};

    #[test]
    fn denial_displays_snake_case() {
        assert_eq!(Denial::QuotaExhausted.to_string(), "quota_exhausted");
        assert_eq!(Denial::CircuitOpen.to_string(), "circuit_open");
        let gate: &'static str = Denial::TenantAiRateLimited.into();
        assert_eq!(gate, "tenant_ai_rate_limited");
    }

    #[tokio::test]
    async fn paused_tenant_is_denied_before_quota() {
        let fx = Fixture::new().await;
        let conn = fx.tenant(0, 150, false).await;
        fx.sql("UPDATE users SET bot_paused = 1").await;

        let verdict = fx.policy(StubChannel::default()).admit_batch(&conn, "s1").await.unwrap();
        assert_eq!(verdict, Err(Denial::Paused));
    }

    #[tokio::test]
    async fn exhausted_quota_is_denied() {
        let fx = Fixture::new().await;
        let conn = fx.tenant(150, 150, false).await;
        let verdict = fx.policy(StubChannel::default()).admit_batch(&conn, "s1").await.unwrap();
        assert_eq!(verdict, Err(Denial::QuotaExhausted));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn denial_is_logged_with_its_reason() {
        let fx = Fixture::new().await;
        let conn = fx.tenant(150, 150, false).await;
        fx.policy(StubChannel::default()).admit_batch(&conn, "s1").await.unwrap().unwrap_err();
        assert!(logs_contain("admission denied"));
        assert!(logs_contain("reason=quota_exhausted"));
    }

    #[tokio::test]
    async fn blocked_username_is_denied_and_recorded() {
        let fx = Fixture::new().await;
        let conn = fx.tenant(0, 150, false).await;
        fx.persona(&conn, r#"{"blocked_users": ["@Spammer"]}"#).await;

        let channel = StubChannel::with_username("spammer");
        let verdict = fx.policy(channel).admit_batch(&conn, "s1").await.unwrap();
        assert_eq!(verdict, Err(Denial::BlockedSender));
        assert_eq!(
            fx.scalar("SELECT username FROM conversation_senders WHERE sender_id = 's1'")
                .await,
            "spammer"
        );
    }

    #[tokio::test]
    async fn username_lookup_failure_does_not_block() {
        let fx = Fixture::new().await;
        let conn = fx.tenant(0, 150, false).await;
        fx.persona(&conn, r#"{"blocked_users": ["spammer"]}"#).await;

        let channel = StubChannel::failing_lookup();
        let verdict = fx.policy(channel).admit_batch(&conn, "s1").await.unwrap();
        assert_eq!(verdict, Ok(()));
    }

    #[tokio::test]
    async fn sender_rate_limit_applies_after_thirty_events() {
        let fx = Fixture::new().await;
        let conn = fx.tenant(0, 150, false).await;
        let policy = fx.policy(StubChannel::default());
        for _ in 0..30 {
            assert_eq!(policy.admit_batch(&conn, "s1").await.unwrap(), Ok(()));
        }
        assert_eq!(
            policy.admit_batch(&conn, "s1").await.unwrap(),
            Err(Denial::SenderRateLimited)
        );
    }

    #[tokio::test]
    async fn legacy_account_skips_quota_and_budget() {
        let fx = Fixture::new().await;
        let legacy = TenantConnection::legacy("1789", "token");
        let policy = fx.policy(StubChannel::default());
        assert_eq!(policy.admit_batch(&legacy, "s1").await.unwrap(), Ok(()));
        assert_eq!(policy.admit_ai_call(&legacy, "s1").await.unwrap(), Ok(None));
    }

    #[tokio::test]
    async fn open_breaker_denies_ai_call() {
        let fx = Fixture::new().await;
        let conn = fx.tenant(0, 150, false).await;
        let policy = fx.policy(StubChannel::default());
        for _ in 0..8 {
            policy.breaker().record_failure().await;
        }
        assert_eq!(
            policy.admit_ai_call(&conn, "s1").await.unwrap(),
            Err(Denial::CircuitOpen)
        );
    }

    #[tokio::test]
    async fn budget_reservation_is_returned_then_exhausted() {
        let fx = Fixture::with_budget(0.0006).await;
        let conn = fx.tenant(0, 150, false).await;
        let policy = fx.policy(StubChannel::default());

        // Each reservation is 0.000255 USD against a 0.0006 cap.
        let first = policy.admit_ai_call(&conn, "s1").await.unwrap().unwrap();
        assert!(first.is_some());
        assert!(policy.admit_ai_call(&conn, "s1").await.unwrap().is_ok());
        assert_eq!(
            policy.admit_ai_call(&conn, "s1").await.unwrap(),
            Err(Denial::BudgetExhausted)
        );
    }
}
