// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-negative budgets, a warning ratio inside (0, 1], and non-negative rates.

use rust_decimal::Decimal;

use crate::diagnostic::ConfigError;
use crate::model::TallyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.store.path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "store.path must not be empty".to_string(),
        });
    }

    if config.budget.daily_limit.is_sign_negative() {
        errors.push(ConfigError::Validation {
            message: format!(
                "budget.daily_limit must be non-negative, got {}",
                config.budget.daily_limit
            ),
        });
    }

    if config.budget.monthly_limit.is_sign_negative() {
        errors.push(ConfigError::Validation {
            message: format!(
                "budget.monthly_limit must be non-negative, got {}",
                config.budget.monthly_limit
            ),
        });
    }

    let ratio = config.budget.warn_ratio;
    if ratio <= Decimal::ZERO || ratio > Decimal::ONE {
        errors.push(ConfigError::Validation {
            message: format!("budget.warn_ratio must be in (0, 1], got {ratio}"),
        });
    }

    if config.pricing.default_model.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "pricing.default_model must not be empty".to_string(),
        });
    }

    for (model, price) in &config.pricing.models {
        if model.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "pricing.models keys must not be empty".to_string(),
            });
        }
        if price.input_per_mtok.is_sign_negative() || price.output_per_mtok.is_sign_negative() {
            errors.push(ConfigError::Validation {
                message: format!("pricing.models.{model} rates must be non-negative"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
