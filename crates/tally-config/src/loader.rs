// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tally.toml` > `~/.config/tally/tally.toml` > `/etc/tally/tally.toml`
//! with environment variable overrides via `TALLY_` prefix, and the bare
//! `DAILY_BUDGET_LIMIT` / `MONTHLY_BUDGET_LIMIT` variables on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TallyConfig;

/// Environment variables read without the `TALLY_` prefix, and the keys they set.
pub const BARE_ENV_VARS: [(&str, &str); 2] = [
    ("DAILY_BUDGET_LIMIT", "budget.daily_limit"),
    ("MONTHLY_BUDGET_LIMIT", "budget.monthly_limit"),
];

const ENV_PREFIX: &str = "TALLY_";
const FILE_NAME: &str = "tally.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tally/tally.toml` (system-wide)
/// 3. `~/.config/tally/tally.toml` (user XDG config)
/// 4. `./tally.toml` (local directory)
/// 5. `TALLY_*` environment variables
/// 6. `DAILY_BUDGET_LIMIT` / `MONTHLY_BUDGET_LIMIT`
pub fn load_config() -> Result<TallyConfig, figment::Error> {
    let files = search_paths()
        .into_iter()
        .fold(defaults(), |figment, path| figment.merge(Toml::file(path)));
    with_env(files).extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TallyConfig, figment::Error> {
    defaults().merge(Toml::string(toml_content)).extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TallyConfig, figment::Error> {
    with_env(defaults().merge(Toml::file(path))).extract()
}

/// Config files consulted by [`load_config`], lowest precedence first.
///
/// The local file is resolved against the current directory so error
/// reports can match it against figment's source metadata.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/tally").join(FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("tally").join(FILE_NAME));
    }
    paths.push(
        std::env::current_dir()
            .map(|d| d.join(FILE_NAME))
            .unwrap_or_else(|_| PathBuf::from(FILE_NAME)),
    );
    paths
}

/// Environment variables that can set the dotted `key`, highest precedence first.
pub fn env_vars_for(key: &str) -> Vec<String> {
    BARE_ENV_VARS
        .iter()
        .filter(|(_, k)| *k == key)
        .map(|(var, _)| var.to_string())
        .chain(std::iter::once(format!(
            "{ENV_PREFIX}{}",
            key.replace('.', "_").to_uppercase()
        )))
        .collect()
}

fn defaults() -> Figment {
    Figment::new().merge(Serialized::defaults(TallyConfig::default()))
}

fn with_env(figment: Figment) -> Figment {
    figment.merge(prefixed_env()).merge(bare_env())
}

/// `TALLY_BUDGET_DAILY_LIMIT` -> `budget.daily_limit`.
///
/// Only the first underscore after a section name becomes a dot, since
/// key names contain underscores themselves. The mapper sees keys before
/// figment lowercases them.
fn prefixed_env() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        ["store", "budget", "pricing"]
            .iter()
            .find_map(|section| {
                key.strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or(key)
            .into()
    })
}

fn bare_env() -> Env {
    let vars: Vec<&str> = BARE_ENV_VARS.iter().map(|(var, _)| *var).collect();
    Env::raw().only(&vars).map(|var| {
        BARE_ENV_VARS
            .iter()
            .find(|(name, _)| var.as_str().eq_ignore_ascii_case(name))
            .map(|(_, key)| (*key).to_string())
            .unwrap_or_else(|| var.as_str().to_string())
            .into()
    })
}
