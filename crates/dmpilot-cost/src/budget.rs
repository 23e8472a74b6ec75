// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily AI budget enforcement per tenant.
//!
//! Before each AI call the guard reserves an estimated cost in the ledger
//! and denies the call if the day's total now exceeds the cap. Because the
//! reservation and the total come from one statement, concurrent calls
//! from any number of workers are capped together. After the call, the
//! actual cost (when the provider reports usage) is reconciled upward.

use std::sync::Arc;

use chrono::DateTime;
use dmpilot_config::model::CostConfig;
use dmpilot_core::types::TokenUsage;
use dmpilot_core::{Clock, DmpilotError};
use tracing::{debug, warn};

use crate::ledger::BudgetLedger;
use crate::pricing::Pricing;

/// A cost reserved for one pending AI call.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub tenant_key: String,
    pub day: String,
    pub reserved_usd: f64,
    /// Day total including this reservation.
    pub day_total_usd: f64,
}

/// Reserves and reconciles per-tenant daily AI spend.
#[derive(Clone)]
pub struct BudgetGuard {
    ledger: BudgetLedger,
    clock: Arc<dyn Clock>,
    pricing: Pricing,
    daily_cap_usd: f64,
    estimated_prompt_tokens: u32,
    estimated_completion_tokens: u32,
}

impl BudgetGuard {
    pub fn new(ledger: BudgetLedger, config: &CostConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            pricing: Pricing::from_config(config),
            daily_cap_usd: config.daily_budget_usd,
            estimated_prompt_tokens: config.estimated_prompt_tokens,
            estimated_completion_tokens: config.estimated_completion_tokens,
        }
    }

    /// Cost reserved for every call before its usage is known.
    pub fn estimated_cost_usd(&self) -> f64 {
        self.pricing
            .cost_usd(self.estimated_prompt_tokens, self.estimated_completion_tokens)
    }

    /// Reserve the estimate against today's (UTC) budget.
    pub async fn reserve(&self, tenant_key: &str) -> Result<Reservation, DmpilotError> {
        let day = utc_day(self.clock.now_millis());
        self.reserve_on(tenant_key, &day).await
    }

    /// Reserve the estimate against a specific day's budget.
    ///
    /// Returns `BudgetExhausted` when the total after reserving exceeds the
    /// cap. A denied reservation stays in the ledger.
    pub async fn reserve_on(&self, tenant_key: &str, day: &str) -> Result<Reservation, DmpilotError> {
        let estimate = self.estimated_cost_usd();
        let total = self.ledger.reserve(tenant_key, day, estimate).await?;

        if total > self.daily_cap_usd {
            return Err(DmpilotError::BudgetExhausted {
                message: format!(
                    "tenant {tenant_key} daily AI budget exceeded (${total:.4} > ${:.2})",
                    self.daily_cap_usd
                ),
            });
        }
        if total >= self.daily_cap_usd * 0.8 {
            warn!(
                tenant_key,
                daily_total = total,
                daily_cap = self.daily_cap_usd,
                "approaching daily AI budget cap (80%+)"
            );
        }

        Ok(Reservation {
            tenant_key: tenant_key.to_string(),
            day: day.to_string(),
            reserved_usd: estimate,
            day_total_usd: total,
        })
    }

    /// Add the amount by which the real cost exceeded the reservation.
    ///
    /// Returns the added delta (0.0 when the estimate covered the call).
    pub async fn reconcile(
        &self,
        reservation: &Reservation,
        usage: &TokenUsage,
    ) -> Result<f64, DmpilotError> {
        let actual = self.pricing.usage_cost_usd(usage);
        let delta = actual - reservation.reserved_usd;
        if delta <= 0.0 {
            return Ok(0.0);
        }
        self.ledger
            .add(&reservation.tenant_key, &reservation.day, delta)
            .await?;
        debug!(
            tenant_key = %reservation.tenant_key,
            actual_usd = actual,
            delta_usd = delta,
            "budget reconciled above estimate"
        );
        Ok(delta)
    }
}

/// `YYYY-MM-DD` of the UTC day containing `millis`.
fn utc_day(millis: u64) -> String {
    let millis = i64::try_from(millis).unwrap_or(i64::MAX);
    DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}
