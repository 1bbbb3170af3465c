// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally check` command implementation.
//!
//! Reads today's and this month's totals and compares them against the
//! configured limits. The process exits with status 2 when either budget is
//! exhausted, so shell scripts can gate the next API call on it.

use tally_config::TallyConfig;
use tally_core::{BudgetStatus, TallyError};
use tally_cost::BudgetPolicy;
use tracing::warn;

/// Run the budget check. Returns whether another call is admitted.
pub async fn run_check(
    config: &TallyConfig,
    json: bool,
    color: bool,
) -> Result<bool, TallyError> {
    let store = crate::open_store(config).await?;
    let status = BudgetPolicy::check(&store, &config.budget.limits());

    if let Some(period) = status.exhausted_period() {
        warn!(
            %period,
            daily_used_usd = %status.daily_used,
            monthly_used_usd = %status.monthly_used,
            "budget exhausted"
        );
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_status(&status, color);
    }
    Ok(status.is_ok())
}

fn print_status(status: &BudgetStatus, color: bool) {
    println!();
    println!("  tally budget");
    println!("  {}", "-".repeat(35));
    print_line("Daily", status.daily_ok, &status.daily_used, &status.daily_limit, color);
    print_line(
        "Monthly",
        status.monthly_ok,
        &status.monthly_used,
        &status.monthly_limit,
        color,
    );
    println!();
}

fn print_line(
    label: &str,
    ok: bool,
    used: &rust_decimal::Decimal,
    limit: &rust_decimal::Decimal,
    color: bool,
) {
    let amounts = format!("${used:.4} / ${limit:.2}");
    if color {
        use colored::Colorize;
        let symbol = if ok { "✓".green() } else { "✗".red() };
        println!("    {label:<9} {symbol} {amounts}");
    } else {
        let tag = if ok { "[OK]" } else { "[OVER]" };
        println!("    {label:<9} {tag} {amounts}");
    }
}
