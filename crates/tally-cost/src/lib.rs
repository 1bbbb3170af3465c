// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage metering, budget enforcement, and pricing for the Tally usage meter.
//!
//! This crate provides:
//! - **Pricing**: per-model rates with a default fallback for unknown models
//! - **Usage store**: durable day/month/session aggregates in one JSON file
//! - **Metering engine**: prices events and accumulates them atomically
//! - **Budget policy**: advisory daily/monthly admission checks
//! - **Tool ledger**: per-day tool invocation counts

pub mod budget;
pub mod engine;
mod lock;
pub mod pricing;
pub mod store;
pub mod tools;

pub use budget::BudgetPolicy;
pub use engine::MeteringEngine;
pub use pricing::{PriceEntry, PriceTable};
pub use store::{BucketKeys, UsageSnapshot, UsageStore};
pub use tools::ToolUsageLedger;
