// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-day tool invocation counts. No cost is attached to tool calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tally_core::TallyError;
use tracing::debug;

use crate::store::{UsageStore, day_key, today};

/// Counts tool invocations in the shared [`UsageStore`].
#[derive(Debug, Clone)]
pub struct ToolUsageLedger {
    store: Arc<UsageStore>,
}

impl ToolUsageLedger {
    pub fn new(store: Arc<UsageStore>) -> Self {
        Self { store }
    }

    /// Count one invocation of `tool_name` today.
    pub async fn record_use(&self, tool_name: &str) -> Result<(), TallyError> {
        self.record_use_at(tool_name, today()).await
    }

    /// Count one invocation of `tool_name` on `date`.
    ///
    /// Surrounding whitespace is ignored; a blank name is an
    /// [`TallyError::InvalidEvent`].
    pub async fn record_use_at(&self, tool_name: &str, date: NaiveDate) -> Result<(), TallyError> {
        let name = tool_name.trim();
        if name.is_empty() {
            return Err(TallyError::invalid_event("tool name must not be empty"));
        }
        let count = self.store.record_tool_use(&day_key(date), name).await?;
        debug!(tool = name, count, "tool use recorded");
        Ok(())
    }

    /// Invocation counts for `date`, empty if nothing was recorded.
    pub fn summary(&self, date: NaiveDate) -> BTreeMap<String, u64> {
        self.store.tool_usage(&day_key(date))
    }
}
