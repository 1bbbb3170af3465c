// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tally usage meter.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tally_core::BudgetLimits;

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Usage store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Daily and monthly spending limits.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Model price table overrides.
    #[serde(default)]
    pub pricing: PricingConfig,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            store: StoreConfig::default(),
            budget: BudgetConfig::default(),
            pricing: PricingConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Usage store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the JSON file holding the aggregated usage counters.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tally").join("cost_tracking.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("cost_tracking.json"))
        .to_string_lossy()
        .into_owned()
}

/// Budget limit configuration.
///
/// `daily_limit` and `monthly_limit` can also be set through the unprefixed
/// `DAILY_BUDGET_LIMIT` / `MONTHLY_BUDGET_LIMIT` environment variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Daily spending ceiling in USD.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: Decimal,

    /// Monthly spending ceiling in USD.
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit: Decimal,

    /// Fraction of a limit above which recording logs an approaching-limit warning.
    #[serde(default = "default_warn_ratio")]
    pub warn_ratio: Decimal,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            monthly_limit: default_monthly_limit(),
            warn_ratio: default_warn_ratio(),
        }
    }
}

impl BudgetConfig {
    /// The configured ceilings as a [`BudgetLimits`] value.
    pub fn limits(&self) -> BudgetLimits {
        BudgetLimits::new(self.daily_limit, self.monthly_limit)
    }
}

fn default_daily_limit() -> Decimal {
    dec!(1.00)
}

fn default_monthly_limit() -> Decimal {
    dec!(10.00)
}

fn default_warn_ratio() -> Decimal {
    dec!(0.8)
}

/// Price table configuration.
///
/// Entries under `models` are merged over the built-in table; an entry with
/// the same identifier replaces the built-in rate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Model whose rates apply to unknown model identifiers.
    #[serde(default = "default_pricing_model")]
    pub default_model: String,

    /// Per-model rate overrides, keyed by model identifier.
    #[serde(default)]
    pub models: BTreeMap<String, ModelPriceConfig>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_model: default_pricing_model(),
            models: BTreeMap::new(),
        }
    }
}

fn default_pricing_model() -> String {
    "claude-4-sonnet".to_string()
}

/// Rates for one model in USD per million tokens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPriceConfig {
    pub input_per_mtok: Decimal,
    pub output_per_mtok: Decimal,
}
