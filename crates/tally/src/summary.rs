// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally summary` and `tally tools` command implementations.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tally_config::TallyConfig;
use tally_core::{SummaryRow, TallyError};
use tally_cost::ToolUsageLedger;

/// Structured output of `tally tools --json`.
#[derive(Debug, Serialize)]
struct ToolsResponse {
    date: String,
    tools: BTreeMap<String, u64>,
}

/// Print usage rows for today and this month, and optionally one session.
pub async fn run_summary(
    config: &TallyConfig,
    json: bool,
    session: Option<&str>,
    color: bool,
) -> Result<(), TallyError> {
    let engine = crate::engine(config).await?;
    let mut rows = engine.summary();
    if let Some(id) = session {
        rows.push(engine.session_summary(id));
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
        );
    } else {
        print_rows(&rows, color);
    }
    Ok(())
}

/// Print tool invocation counts for `date` (today if absent).
pub async fn run_tools(
    config: &TallyConfig,
    date: Option<NaiveDate>,
    json: bool,
    color: bool,
) -> Result<(), TallyError> {
    let date = date.unwrap_or_else(tally_cost::store::today);
    let ledger = ToolUsageLedger::new(crate::open_store(config).await?);
    let tools = ledger.summary(date);

    if json {
        let response = ToolsResponse {
            date: tally_cost::store::day_key(date),
            tools,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    println!();
    println!("  tool usage {date}");
    println!("  {}", "-".repeat(35));
    if tools.is_empty() {
        println!("    (none)");
    }
    for (name, count) in &tools {
        if color {
            use colored::Colorize;
            println!("    {:<24} {}", name.cyan(), count);
        } else {
            println!("    {name:<24} {count}");
        }
    }
    println!();
    Ok(())
}

fn print_rows(rows: &[SummaryRow], color: bool) {
    let header = format!(
        "  {:<18} {:>10} {:>12} {:>12} {:>9}",
        "Period", "Cost", "Input", "Output", "Requests"
    );
    println!();
    if color {
        use colored::Colorize;
        println!("{}", header.bold());
    } else {
        println!("{header}");
    }
    println!("  {}", "-".repeat(65));
    for row in rows {
        println!(
            "  {:<18} {:>10} {:>12} {:>12} {:>9}",
            row.period,
            format!("${:.4}", row.cost),
            row.input_tokens,
            row.output_tokens,
            row.requests
        );
    }
    println!();
}
