// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model price table and per-request cost calculation.
//!
//! Built-in rates (USD per million tokens):
//!
//! Claude 4 Sonnet:   input=$3.00/MTok, output=$15.00/MTok
//! Claude 3.5 Haiku:  input=$0.80/MTok, output=$4.00/MTok
//!
//! Unknown models are charged at the default entry (Claude 4 Sonnet unless
//! configured otherwise) so cost tracking never silently drops records.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_config::model::PricingConfig;
use tally_core::TallyError;
use tracing::debug;

const TOKENS_PER_MTOK: Decimal = dec!(1_000_000);

/// Built-in default model identifier.
pub const DEFAULT_MODEL: &str = "claude-4-sonnet";

const CLAUDE_4_SONNET: PriceEntry = PriceEntry::new(dec!(3.00), dec!(15.00));
const CLAUDE_3_5_HAIKU: PriceEntry = PriceEntry::new(dec!(0.80), dec!(4.00));

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceEntry {
    /// Cost per million input tokens.
    pub input_per_mtok: Decimal,
    /// Cost per million output tokens.
    pub output_per_mtok: Decimal,
}

impl PriceEntry {
    pub const fn new(input_per_mtok: Decimal, output_per_mtok: Decimal) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    /// Calculate the cost of one request.
    ///
    /// Formula: `input / 1_000_000 * input_rate + output / 1_000_000 * output_rate`.
    /// Returns `None` when the result does not fit in a `Decimal`.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Option<Decimal> {
        let input = per_token_cost(input_tokens, self.input_per_mtok)?;
        let output = per_token_cost(output_tokens, self.output_per_mtok)?;
        Some(input.checked_add(output)?.normalize())
    }
}

fn per_token_cost(tokens: u64, rate_per_mtok: Decimal) -> Option<Decimal> {
    Decimal::from(tokens)
        .checked_div(TOKENS_PER_MTOK)?
        .checked_mul(rate_per_mtok)
}

/// Immutable mapping from model identifier to [`PriceEntry`], with a default.
#[derive(Debug, Clone)]
pub struct PriceTable {
    entries: BTreeMap<String, PriceEntry>,
    default_model: String,
    default_entry: PriceEntry,
}

impl PriceTable {
    /// The built-in price list with `claude-4-sonnet` as the fallback.
    pub fn builtin() -> Self {
        Self {
            entries: builtin_entries(),
            default_model: DEFAULT_MODEL.to_string(),
            default_entry: CLAUDE_4_SONNET,
        }
    }

    /// Build a table from explicit entries.
    ///
    /// Fails with [`TallyError::Config`] if `default_model` has no entry.
    pub fn new(
        entries: BTreeMap<String, PriceEntry>,
        default_model: impl Into<String>,
    ) -> Result<Self, TallyError> {
        let default_model = default_model.into();
        let default_entry = *entries.get(&default_model).ok_or_else(|| {
            TallyError::Config(format!(
                "pricing.default_model `{default_model}` has no price entry"
            ))
        })?;
        Ok(Self {
            entries,
            default_model,
            default_entry,
        })
    }

    /// Merge configured overrides over the built-in list.
    pub fn from_config(config: &PricingConfig) -> Result<Self, TallyError> {
        let mut entries = builtin_entries();
        for (model, price) in &config.models {
            entries.insert(
                model.clone(),
                PriceEntry::new(price.input_per_mtok, price.output_per_mtok),
            );
        }
        Self::new(entries, config.default_model.clone())
    }

    /// Look up the rates for `model_id`, falling back to the default entry.
    ///
    /// A `provider/` prefix is ignored, so `anthropic/claude-3.5-haiku`
    /// resolves like `claude-3.5-haiku`. Never fails.
    pub fn rate_for(&self, model_id: &str) -> PriceEntry {
        if let Some(entry) = self.entries.get(model_id) {
            return *entry;
        }
        let name = model_id
            .rsplit_once('/')
            .map(|(_, m)| m)
            .unwrap_or(model_id);
        match self.entries.get(name) {
            Some(entry) => *entry,
            None => {
                debug!(
                    model = %model_id,
                    default_model = %self.default_model,
                    "unknown model, using default pricing"
                );
                self.default_entry
            }
        }
    }

    /// Whether `model_id` has its own entry (ignoring any provider prefix).
    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id)
            || model_id
                .rsplit_once('/')
                .is_some_and(|(_, m)| self.entries.contains_key(m))
    }

    /// Identifier whose rates apply to unknown models.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_entries() -> BTreeMap<String, PriceEntry> {
    BTreeMap::from([
        (DEFAULT_MODEL.to_string(), CLAUDE_4_SONNET),
        ("claude-3.5-haiku".to_string(), CLAUDE_3_5_HAIKU),
    ])
}
