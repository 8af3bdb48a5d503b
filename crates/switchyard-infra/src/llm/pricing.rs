//! Default pricing for known models.
//!
//! Metrics and the lowest-cost policy need a price for every provider. When
//! `[providers.model] cost_per_million_tokens` is omitted the price comes
//! from this table, matched by model-name prefix. Local Ollama models are
//! free. Prices are approximate and expressed in USD per million tokens.

use switchyard_types::llm::{ModelConfig, ProviderType};

struct PricingEntry {
    model_pattern: &'static str,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

impl PricingEntry {
    /// Single rate used by the metrics store; input and output weighted equally.
    fn blended(&self) -> f64 {
        (self.input_cost_per_million + self.output_cost_per_million) / 2.0
    }
}

/// Used for hosted models that match no table entry.
const FALLBACK_COST_PER_MILLION: f64 = 10.0;

// More specific prefixes first: "gpt-4o-mini" must win over "gpt-4o".
const DEFAULT_PRICING: &[PricingEntry] = &[
    PricingEntry {
        model_pattern: "gpt-4o-mini",
        input_cost_per_million: 0.15,
        output_cost_per_million: 0.60,
    },
    PricingEntry {
        model_pattern: "gpt-4o",
        input_cost_per_million: 2.50,
        output_cost_per_million: 10.0,
    },
    PricingEntry {
        model_pattern: "gpt-4.1-mini",
        input_cost_per_million: 0.40,
        output_cost_per_million: 1.60,
    },
    PricingEntry {
        model_pattern: "gpt-4.1",
        input_cost_per_million: 2.0,
        output_cost_per_million: 8.0,
    },
    PricingEntry {
        model_pattern: "gpt-3.5-turbo",
        input_cost_per_million: 0.50,
        output_cost_per_million: 1.50,
    },
    PricingEntry {
        model_pattern: "gemini-2",
        input_cost_per_million: 1.25,
        output_cost_per_million: 10.0,
    },
    PricingEntry {
        model_pattern: "mistral-large",
        input_cost_per_million: 2.0,
        output_cost_per_million: 6.0,
    },
    PricingEntry {
        model_pattern: "mistral-small",
        input_cost_per_million: 0.2,
        output_cost_per_million: 0.6,
    },
    PricingEntry {
        model_pattern: "deepseek-chat",
        input_cost_per_million: 0.27,
        output_cost_per_million: 1.10,
    },
];

fn matches_pattern(model: &str, pattern: &str) -> bool {
    model.starts_with(pattern)
}

/// Default USD-per-million-token price for a model.
///
/// Lookup order:
/// 1. Ollama runs locally and is always free
/// 2. Prefix match in the default table
/// 3. Conservative fallback
pub fn default_cost_per_million(provider_type: ProviderType, model: &str) -> f64 {
    if provider_type == ProviderType::Ollama {
        return 0.0;
    }
    DEFAULT_PRICING
        .iter()
        .find(|entry| matches_pattern(model, entry.model_pattern))
        .map_or(FALLBACK_COST_PER_MILLION, PricingEntry::blended)
}

/// Fill in `cost_per_million_tokens` when the config leaves it unset.
pub fn apply_default_pricing(model: &mut ModelConfig, provider_type: ProviderType) {
    if model.cost_per_million_tokens.is_none() {
        model.cost_per_million_tokens = Some(default_cost_per_million(provider_type, &model.model));
    }
}

/// Format a cost as a human-readable string.
///
/// Always prefixed with `~` to indicate the value is an estimate.
/// - Costs below $0.01 use 4 decimal places: `~$0.0012`
/// - Costs $0.01 and above use 2 decimal places: `~$0.12`
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("~${cost:.4}")
    } else {
        format!("~${cost:.2}")
    }
}
