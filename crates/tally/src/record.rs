// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally record` and `tally tool` command implementations.

use tally_config::TallyConfig;
use tally_core::{CostBreakdown, TallyError, UsageEvent};
use tally_cost::ToolUsageLedger;

/// Arguments of one `tally record` invocation.
#[derive(Debug)]
pub struct RecordArgs {
    pub model: Option<String>,
    pub input: i64,
    pub output: i64,
    pub session: Option<String>,
}

impl RecordArgs {
    fn into_event(self, default_model: &str) -> UsageEvent {
        let event = UsageEvent::new(
            self.model.unwrap_or_else(|| default_model.to_string()),
            self.input,
            self.output,
        );
        match self.session {
            Some(session) => event.with_session(session),
            None => event,
        }
    }
}

/// Meter one call and print the resulting cost breakdown.
pub async fn run_record(
    config: &TallyConfig,
    args: RecordArgs,
    json: bool,
    color: bool,
) -> Result<(), TallyError> {
    let engine = crate::engine(config).await?;
    let event = args.into_event(engine.prices().default_model());
    let breakdown = engine.record(&event).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&breakdown).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_breakdown(&event, &breakdown, color);
    }
    Ok(())
}

/// Count one invocation of `name` today.
pub async fn run_tool(config: &TallyConfig, name: &str) -> Result<(), TallyError> {
    let ledger = ToolUsageLedger::new(crate::open_store(config).await?);
    ledger.record_use(name).await
}

fn print_breakdown(event: &UsageEvent, breakdown: &CostBreakdown, color: bool) {
    let cost = format!("${:.4}", breakdown.request_cost);
    if color {
        use colored::Colorize;
        println!(
            "  {} {} ({} in / {} out): {}",
            "✓".green(),
            event.model_id.bold(),
            event.input_tokens,
            event.output_tokens,
            cost.green()
        );
    } else {
        println!(
            "  [OK] {} ({} in / {} out): {cost}",
            event.model_id, event.input_tokens, event.output_tokens
        );
    }
    println!("    Today:       ${:.4}", breakdown.updated_daily_total);
    println!("    This month:  ${:.4}", breakdown.updated_monthly_total);
}
