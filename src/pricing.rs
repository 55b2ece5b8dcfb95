//! Token pricing
//!
//! A caller-owned registry of per-model prices, quoted in currency units per
//! million tokens. The engine ships no price table; load one with
//! [`PricingRegistry::load_json`] or [`PricingRegistry::set`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::LlmError;
use crate::types::Usage;

const PER_MILLION: f64 = 1_000_000.0;

/// Prices for one model, per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(alias = "input_per_million")]
    pub input: f64,
    #[serde(alias = "output_per_million")]
    pub output: f64,
    /// Rate for prompt tokens served from cache. Defaults to `input`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input: Option<f64>,
}

impl ModelPricing {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            cached_input: None,
        }
    }

    pub fn with_cached_input(mut self, rate: f64) -> Self {
        self.cached_input = Some(rate);
        self
    }

    /// Cost of `usage` at these rates.
    pub fn cost(&self, usage: &Usage) -> f64 {
        let cached = usage.cached_tokens.unwrap_or(0).min(usage.prompt_tokens);
        let uncached = usage.prompt_tokens - cached;
        let cached_rate = self.cached_input.unwrap_or(self.input);
        (f64::from(uncached) * self.input
            + f64::from(cached) * cached_rate
            + f64::from(usage.completion_tokens) * self.output)
            / PER_MILLION
    }

    fn validate(&self, model: &str) -> Result<(), LlmError> {
        let rates = [Some(self.input), Some(self.output), self.cached_input];
        if rates.into_iter().flatten().any(|r| !r.is_finite() || r < 0.0) {
            return Err(LlmError::ConfigurationError(format!(
                "pricing for `{model}` must be finite and non-negative"
            )));
        }
        Ok(())
    }
}

/// Per-model price table.
///
/// Lookups try the exact model first, then the longest registered prefix, so
/// a `gpt-4o` entry also prices `gpt-4o-2024-08-06`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingRegistry {
    prices: HashMap<String, ModelPricing>,
}

impl PricingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge entries from a JSON object of `model → pricing`.
    ///
    /// Existing entries for the same model are replaced. Returns the number of
    /// entries loaded.
    pub fn load_json(&mut self, json: &str) -> Result<usize, LlmError> {
        let entries: HashMap<String, ModelPricing> = serde_json::from_str(json)
            .map_err(|e| LlmError::ConfigurationError(format!("invalid pricing table: {e}")))?;
        for (model, pricing) in &entries {
            pricing.validate(model)?;
        }
        let count = entries.len();
        self.prices.extend(entries);
        tracing::debug!(count, total = self.prices.len(), "pricing table loaded");
        Ok(count)
    }

    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) -> Result<(), LlmError> {
        let model = model.into();
        pricing.validate(&model)?;
        self.prices.insert(model, pricing);
        Ok(())
    }

    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        if let Some(pricing) = self.prices.get(model) {
            return Some(pricing);
        }
        self.prices
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| pricing)
    }

    pub fn remove(&mut self, model: &str) -> Option<ModelPricing> {
        self.prices.remove(model)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Estimated cost of `usage` on `model`, or `None` when unpriced.
    pub fn estimate_cost(&self, model: &str, usage: &Usage) -> Option<f64> {
        self.get(model).map(|pricing| pricing.cost(usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn estimate_uses_per_million_rates_and_cached_discount() {
        let mut registry = PricingRegistry::new();
        registry
            .set("gpt-4o", ModelPricing::new(2.5, 10.0).with_cached_input(1.25))
            .unwrap();

        let usage = Usage {
            cached_tokens: Some(200_000),
            ..Usage::new(1_000_000, 100_000)
        };
        // 800k * 2.5 + 200k * 1.25 + 100k * 10 (per million)
        let cost = registry.estimate_cost("gpt-4o", &usage).unwrap();
        assert!(approx(cost, 2.0 + 0.25 + 1.0), "{cost}");
        assert_eq!(registry.estimate_cost("claude-3", &usage), None);
    }

    #[test]
    fn longest_prefix_prices_dated_models() {
        let mut registry = PricingRegistry::new();
        registry
            .load_json(
                r#"{
                    "gpt-4o": {"input": 2.5, "output": 10.0},
                    "gpt-4o-mini": {"input_per_million": 0.15, "output_per_million": 0.6}
                }"#,
            )
            .unwrap();
        assert_eq!(registry.get("gpt-4o-mini-2024-07-18").unwrap().input, 0.15);
        assert_eq!(registry.get("gpt-4o-2024-08-06").unwrap().input, 2.5);
        assert!(registry.get("gpt-4").is_none());

        assert!(registry.remove("gpt-4o-mini").is_some());
        assert_eq!(registry.get("gpt-4o-mini").unwrap().input, 2.5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        let mut registry = PricingRegistry::new();
        assert!(matches!(
            registry.load_json("[1, 2]"),
            Err(LlmError::ConfigurationError(_))
        ));
        assert!(registry.load_json(r#"{"m": {"input": -1.0, "output": 1.0}}"#).is_err());
        assert!(registry.set("m", ModelPricing::new(f64::NAN, 1.0)).is_err());
        assert!(registry.is_empty());
    }
}
