// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token pricing for the completion model.

use dmpilot_config::model::CostConfig;
use dmpilot_core::types::TokenUsage;

/// Per-1K-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl Pricing {
    pub fn from_config(config: &CostConfig) -> Self {
        Self {
            prompt_per_1k: config.prompt_cost_per_1k,
            completion_per_1k: config.completion_cost_per_1k,
        }
    }

    /// Cost in USD of the given token counts.
    pub fn cost_usd(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (f64::from(prompt_tokens) / 1000.0) * self.prompt_per_1k
            + (f64::from(completion_tokens) / 1000.0) * self.completion_per_1k
    }

    pub fn usage_cost_usd(&self, usage: &TokenUsage) -> f64 {
        self.cost_usd(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_estimate_cost() {
        let pricing = Pricing::from_config(&CostConfig::default());
        // 500 prompt + 300 completion tokens at the default prices.
        let cost = pricing.cost_usd(500, 300);
        assert!((cost - 0.000255).abs() < 1e-10, "got {cost}");
    }

    #[test]
    fn usage_cost_matches_token_cost() {
        let pricing = Pricing {
            prompt_per_1k: 1.0,
            completion_per_1k: 2.0,
        };
        let usage = TokenUsage {
            prompt_tokens: 1500,
            completion_tokens: 250,
        };
        assert!((pricing.usage_cost_usd(&usage) - 2.0).abs() < 1e-10);
    }
}
