// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally usage meter.
//!
//! This crate provides the error taxonomy and the plain value types passed
//! between the metering engine, the budget policy, and their callers.

pub mod error;
pub mod estimate;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TallyError;
pub use estimate::estimate_tokens;
pub use types::{
    BudgetLimits, BudgetStatus, CostBreakdown, SummaryRow, UsageEvent, UsagePeriod,
    WindowAggregate, normalize_session_id,
};
