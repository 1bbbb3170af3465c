// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value types shared by the metering engine, the budget policy, and callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TallyError;

/// Aggregation scope for usage and budget reporting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    Session,
    Day,
    Month,
}

/// A single metered API call, as reported by the caller.
///
/// Token counts are caller-supplied estimates or provider-reported usage.
/// They are signed so that upstream arithmetic bugs surface as
/// [`TallyError::InvalidEvent`] instead of wrapping around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Model identifier used for price lookup (e.g. "claude-3.5-haiku").
    pub model_id: String,
    /// Number of input/prompt tokens.
    pub input_tokens: i64,
    /// Number of output/completion tokens.
    pub output_tokens: i64,
    /// Optional session key for per-session aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl UsageEvent {
    /// Create an event with no session attribution.
    pub fn new(model_id: impl Into<String>, input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            model_id: model_id.into(),
            input_tokens,
            output_tokens,
            session_id: None,
        }
    }

    /// Attribute this event to a session bucket.
    ///
    /// Surrounding whitespace is dropped. A blank id leaves the event
    /// unattributed rather than creating an empty-named bucket.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = normalize_session_id(Some(session_id.into()));
        self
    }

    /// Validate token counts and return them as unsigned values.
    pub fn token_counts(&self) -> Result<(u64, u64), TallyError> {
        let input = u64::try_from(self.input_tokens).map_err(|_| {
            TallyError::invalid_event(format!(
                "input_tokens must be non-negative, got {}",
                self.input_tokens
            ))
        })?;
        let output = u64::try_from(self.output_tokens).map_err(|_| {
            TallyError::invalid_event(format!(
                "output_tokens must be non-negative, got {}",
                self.output_tokens
            ))
        })?;
        Ok((input, output))
    }
}

/// Trim a session id, mapping blank ids to `None`.
pub fn normalize_session_id(session_id: Option<String>) -> Option<String> {
    let id = session_id?;
    let trimmed = id.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == id.len() {
        Some(id)
    } else {
        Some(trimmed.to_string())
    }
}

/// Accumulated usage for one bucket (a day, a month, or a session).
///
/// All counters only grow. The store never exposes a mutable aggregate;
/// use [`WindowAggregate::add`] on a private copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowAggregate {
    /// Total estimated cost in USD.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub cost: Decimal,
    /// Total input tokens.
    pub input_tokens: u64,
    /// Total output tokens.
    pub output_tokens: u64,
    /// Number of recorded requests.
    pub requests: u64,
    /// When the bucket was first written. Only session buckets carry this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
}

impl WindowAggregate {
    /// Add one request's cost and tokens to this bucket.
    ///
    /// Fails with [`TallyError::InvalidEvent`] if the cost total would leave
    /// the `Decimal` range. The bucket is unchanged in that case.
    pub fn add(
        &mut self,
        cost: Decimal,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), TallyError> {
        let total = self.cost.checked_add(cost).ok_or_else(|| {
            TallyError::invalid_event(format!(
                "cost {cost} would overflow the running total {}",
                self.cost
            ))
        })?;
        self.cost = total.normalize();
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
        self.requests = self.requests.saturating_add(1);
        Ok(())
    }

    /// Total tokens (input + output).
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Result of metering one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    /// Cost of this request alone.
    pub request_cost: Decimal,
    /// Today's total after this request.
    pub updated_daily_total: Decimal,
    /// This month's total after this request.
    pub updated_monthly_total: Decimal,
}

/// Daily and monthly spending ceilings in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub daily_limit: Decimal,
    pub monthly_limit: Decimal,
}

impl BudgetLimits {
    pub fn new(daily_limit: Decimal, monthly_limit: Decimal) -> Self {
        Self {
            daily_limit,
            monthly_limit,
        }
    }
}

/// Admission decision from a budget check.
///
/// A period is `ok` only while usage is strictly below its limit: reaching
/// the limit exactly already counts as exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    pub daily_ok: bool,
    pub monthly_ok: bool,
    pub daily_used: Decimal,
    pub daily_limit: Decimal,
    pub monthly_used: Decimal,
    pub monthly_limit: Decimal,
}

impl BudgetStatus {
    /// Both daily and monthly budgets admit another call.
    pub fn is_ok(&self) -> bool {
        self.daily_ok && self.monthly_ok
    }

    /// The first exhausted period, daily before monthly.
    pub fn exhausted_period(&self) -> Option<UsagePeriod> {
        if !self.daily_ok {
            Some(UsagePeriod::Day)
        } else if !self.monthly_ok {
            Some(UsagePeriod::Month)
        } else {
            None
        }
    }
}

/// One row of tabular usage data for a presentation layer to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    /// Human label for the period (e.g. "Today", "This Month").
    pub period: String,
    pub cost: Decimal,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

impl SummaryRow {
    pub fn from_aggregate(period: impl Into<String>, aggregate: &WindowAggregate) -> Self {
        Self {
            period: period.into(),
            cost: aggregate.cost,
            input_tokens: aggregate.input_tokens,
            output_tokens: aggregate.output_tokens,
            requests: aggregate.requests,
        }
    }
}
