// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Tally usage meter.
//!
//! Settings come from `tally.toml` files and the environment (see
//! [`loader`]). Unknown keys are rejected, values are checked by
//! [`validation`], and every failure is reported as a [`ConfigError`]
//! naming the dotted key and how to fix it.
//!
//! # Usage
//!
//! ```no_run
//! use tally_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("daily limit: {}", config.budget.daily_limit);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TallyConfig;

/// Name under which inline TOML appears in diagnostics.
const INLINE_SOURCE: &str = "<inline>";

/// Load configuration from the XDG hierarchy and validate it.
///
/// Malformed budget variables are reported here, never replaced by defaults.
pub fn load_and_validate() -> Result<TallyConfig, Vec<ConfigError>> {
    finish(loader::load_config(), || {
        loader::search_paths()
            .iter()
            .filter_map(|path| read_source(path))
            .collect()
    })
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<TallyConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<TallyConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![(INLINE_SOURCE.to_string(), toml_content.to_string())]
    })
}

/// Validate a loaded config, or turn the figment error into diagnostics.
///
/// `sources` is only read on the error path, to attach source spans.
fn finish(
    loaded: Result<TallyConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<TallyConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::from_figment(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    Some((path.display().to_string(), content))
}
