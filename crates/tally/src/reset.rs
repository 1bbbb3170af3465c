// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally reset` command implementation.

use tally_config::TallyConfig;
use tally_core::TallyError;
use tally_cost::UsageStore;
use tracing::info;

/// Delete the backing store. Refuses without `--yes`.
///
/// Does not open the store first, so a corrupt file can still be reset.
pub async fn run_reset(config: &TallyConfig, yes: bool) -> Result<bool, TallyError> {
    if !yes {
        eprintln!("tally: refusing to delete {} without --yes", config.store.path);
        return Ok(false);
    }
    UsageStore::destroy(&config.store.path).await?;
    info!(path = %config.store.path, "usage data reset");
    println!("  usage data at {} deleted", config.store.path);
    Ok(true)
}
