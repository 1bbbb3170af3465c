// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally - token usage metering and budget enforcement.
//!
//! This is the binary entry point for the `tally` command.

mod record;
mod reset;
mod status;
mod summary;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tally_config::TallyConfig;
use tally_core::TallyError;
use tally_cost::{MeteringEngine, PriceTable, UsageStore};
use tracing::error;

/// Tally - token usage metering and budget enforcement.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    /// Load this config file instead of the standard search path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Meter one API call and print its cost.
    Record {
        /// Model identifier (defaults to `pricing.default_model`).
        #[arg(long)]
        model: Option<String>,
        /// Input tokens.
        #[arg(long, allow_negative_numbers = true)]
        input: i64,
        /// Output tokens.
        #[arg(long, allow_negative_numbers = true)]
        output: i64,
        /// Attribute the call to this session.
        #[arg(long)]
        session: Option<String>,
        /// Print the cost breakdown as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Count one invocation of a tool.
    Tool {
        /// Tool name.
        name: String,
    },
    /// Check usage against the budget (exit status 2 when over).
    Check {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show today's and this month's usage.
    Summary {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Also show one session's usage.
        #[arg(long)]
        session: Option<String>,
    },
    /// Show tool invocation counts for a day.
    Tools {
        /// Day to show (YYYY-MM-DD, defaults to today).
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Estimate the token count of a text.
    Estimate {
        /// Text to estimate.
        text: String,
    },
    /// Delete all recorded usage.
    Reset {
        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tally_config::load_and_validate_path(path),
        None => tally_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tally_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log_level);

    match run(cli, &config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("tally: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &TallyConfig) -> Result<ExitCode, TallyError> {
    let color = use_color(cli.plain);
    match cli.command {
        Commands::Record {
            model,
            input,
            output,
            session,
            json,
        } => {
            let args = record::RecordArgs {
                model,
                input,
                output,
                session,
            };
            record::run_record(config, args, json, color).await?;
        }
        Commands::Tool { name } => record::run_tool(config, &name).await?,
        Commands::Check { json } => {
            if !status::run_check(config, json, color).await? {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Summary { json, session } => {
            summary::run_summary(config, json, session.as_deref(), color).await?;
        }
        Commands::Tools { date, json } => summary::run_tools(config, date, json, color).await?,
        Commands::Estimate { text } => println!("{}", tally_core::estimate_tokens(&text)),
        Commands::Reset { yes } => {
            if !reset::run_reset(config, yes).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Open the configured store.
pub(crate) async fn open_store(config: &TallyConfig) -> Result<Arc<UsageStore>, TallyError> {
    Ok(Arc::new(UsageStore::open(&config.store.path).await?))
}

/// Build a metering engine over the configured store and price table.
pub(crate) async fn engine(config: &TallyConfig) -> Result<MeteringEngine, TallyError> {
    let prices = PriceTable::from_config(&config.pricing)?;
    Ok(MeteringEngine::new(open_store(config).await?, prices)
        .with_limits(config.budget.limits(), config.budget.warn_ratio))
}

fn use_color(plain: bool) -> bool {
    !plain && std::io::stdout().is_terminal()
}

/// Initialize the tracing subscriber. Logs go to stderr so stdout stays
/// clean for `--json` output.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("tally={log_level},tally_cost={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
