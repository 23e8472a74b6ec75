// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply generation around the AI provider.
//!
//! Retrying transient failures is the provider's job. This layer feeds the
//! outcome into the circuit breaker, reconciles the budget reservation
//! against real usage, and reduces every failure to "no reply".

use std::sync::Arc;
use std::time::Instant;

use dmpilot_core::persona::PersonaSettings;
use dmpilot_core::types::{ChatMessage, CompletionRequest};
use dmpilot_core::ProviderAdapter;
use dmpilot_cost::{BudgetGuard, Reservation};
use dmpilot_resilience::CircuitBreaker;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::prompt;

pub struct ReplyGenerator {
    provider: Arc<dyn ProviderAdapter>,
    breaker: CircuitBreaker,
    budget: BudgetGuard,
    model: String,
}

impl ReplyGenerator {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        breaker: CircuitBreaker,
        budget: BudgetGuard,
        model: String,
    ) -> Self {
        Self {
            provider,
            breaker,
            budget,
            model,
        }
    }

    /// Generate a reply, or `None` when the provider failed or said nothing.
    ///
    /// A provider error counts as a breaker failure. An empty completion is
    /// a successful call that yields no reply and is not retried.
    pub async fn generate(
        &self,
        persona: &PersonaSettings,
        history: Vec<ChatMessage>,
        reservation: Option<&Reservation>,
    ) -> Option<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: prompt::build_messages(persona, history),
            temperature: persona.temperature,
            max_output_tokens: persona.max_tokens,
        };
        debug!(
            turns = request.messages.len() - 1,
            prompt_chars = request.messages[0].content.len(),
            "requesting completion"
        );

        let started = Instant::now();
        let result = self.provider.complete(request).await;
        let elapsed = started.elapsed().as_secs_f64();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, elapsed_secs = elapsed, "AI completion failed");
                metrics::ai_call("error", elapsed);
                self.breaker.record_failure().await;
                return None;
            }
        };
        self.breaker.record_success().await;

        if let (Some(reservation), Some(usage)) = (reservation, &response.usage)
            && let Err(e) = self.budget.reconcile(reservation, usage).await
        {
            warn!(error = %e, tenant_key = %reservation.tenant_key, "budget reconciliation failed");
        }

        let reply = response
            .content
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        match &reply {
            Some(text) => {
                metrics::ai_call("ok", elapsed);
                info!(
                    model = %response.model,
                    elapsed_secs = elapsed,
                    reply_chars = text.len(),
                    "AI reply generated"
                );
            }
            None => {
                metrics::ai_call("empty", elapsed);
                warn!(model = %response.model, "AI returned an empty completion");
            }
        }
        reply
    }
}
