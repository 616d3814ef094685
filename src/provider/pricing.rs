//! Cost estimation for provider calls.
//!
//! Prices are USD per 1K tokens and must be updated by hand when vendors
//! change their rates. Providers often answer with a dated model name
//! ("gpt-4o-mini-2024-07-18"); lookups fall back to the longest known prefix.

use std::collections::HashMap;
use std::sync::Arc;

/// Pricing for a specific model (input and output rates).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Input (prompt) cost in USD per 1K tokens.
    pub input_price_per_1k: f64,

    /// Output (completion) cost in USD per 1K tokens.
    pub output_price_per_1k: f64,
}

const DEFAULT_PRICES: &[(&str, f64, f64)] = &[
    // OpenAI
    ("gpt-4o", 0.0025, 0.01),
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
    ("gpt-3.5-turbo", 0.0005, 0.0015),
    // Anthropic
    ("claude-3-5-sonnet", 0.003, 0.015),
    ("claude-3-5-haiku", 0.0008, 0.004),
    ("claude-3-opus", 0.015, 0.075),
    ("claude-3-haiku", 0.00025, 0.00125),
    // Mistral
    ("mistral-large", 0.002, 0.006),
    ("mistral-small", 0.0002, 0.0006),
];

/// Pricing table shared by the orchestrator.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: Arc<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with the built-in rates.
    pub fn new() -> Self {
        let prices = DEFAULT_PRICES
            .iter()
            .map(|(model, input, output)| {
                (
                    model.to_string(),
                    ModelPricing {
                        input_price_per_1k: *input,
                        output_price_per_1k: *output,
                    },
                )
            })
            .collect();

        Self {
            prices: Arc::new(prices),
        }
    }

    /// Get pricing for a model, by exact name or longest known prefix.
    pub fn get_pricing(&self, model: &str) -> Option<ModelPricing> {
        if let Some(pricing) = self.prices.get(model) {
            return Some(*pricing);
        }
        self.prices
            .iter()
            .filter(|(known, _)| model.starts_with(known.as_str()))
            .max_by_key(|(known, _)| known.len())
            .map(|(_, pricing)| *pricing)
    }

    /// Estimate cost in USD, or `None` if model pricing is unknown.
    pub fn estimate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> Option<f64> {
        self.get_pricing(model).map(|pricing| {
            let input_cost = (input_tokens as f64 / 1000.0) * pricing.input_price_per_1k;
            let output_cost = (output_tokens as f64 / 1000.0) * pricing.output_price_per_1k;
            input_cost + output_cost
        })
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}
