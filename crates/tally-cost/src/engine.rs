// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metering engine: turns usage events into cost and updates the store.
//!
//! Each recorded event is priced once, then added to today's bucket, this
//! month's bucket, and (if present) its session bucket in a single durable
//! store write. Day and month are derived from one captured date.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_core::{BudgetLimits, CostBreakdown, SummaryRow, TallyError, UsageEvent};
use tracing::{info, warn};

use crate::pricing::PriceTable;
use crate::store::{BucketKeys, UsageStore, day_key, month_key, today};

/// Default fraction of a limit above which recording warns.
pub const DEFAULT_WARN_RATIO: Decimal = dec!(0.8);

/// Prices usage events and accumulates them into a [`UsageStore`].
#[derive(Debug, Clone)]
pub struct MeteringEngine {
    store: Arc<UsageStore>,
    prices: PriceTable,
    /// When set, recording warns as totals approach these limits.
    limits: Option<BudgetLimits>,
    warn_ratio: Decimal,
}

impl MeteringEngine {
    pub fn new(store: Arc<UsageStore>, prices: PriceTable) -> Self {
        Self {
            store,
            prices,
            limits: None,
            warn_ratio: DEFAULT_WARN_RATIO,
        }
    }

    /// Warn once a recorded total exceeds `warn_ratio` of a limit.
    pub fn with_limits(mut self, limits: BudgetLimits, warn_ratio: Decimal) -> Self {
        self.limits = Some(limits);
        self.warn_ratio = warn_ratio;
        self
    }

    pub fn store(&self) -> &Arc<UsageStore> {
        &self.store
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Meter one event against today's local date.
    pub async fn record(&self, event: &UsageEvent) -> Result<CostBreakdown, TallyError> {
        self.record_at(event, today()).await
    }

    /// Meter one event into the buckets for `date`.
    ///
    /// Negative token counts, and costs that do not fit in a `Decimal`, fail
    /// with [`TallyError::InvalidEvent`] before the store is touched. Store
    /// errors propagate unchanged; in that case no bucket was updated. A blank
    /// session id is treated as no session.
    pub async fn record_at(
        &self,
        event: &UsageEvent,
        date: NaiveDate,
    ) -> Result<CostBreakdown, TallyError> {
        let (input_tokens, output_tokens) = event.token_counts()?;
        let request_cost = self
            .prices
            .rate_for(&event.model_id)
            .cost(input_tokens, output_tokens)
            .ok_or_else(|| {
                TallyError::invalid_event(format!(
                    "cost of {input_tokens}+{output_tokens} tokens for `{}` is out of range",
                    event.model_id
                ))
            })?;

        let keys = BucketKeys::for_date(date, event.session_id.clone());
        let session = keys.session.clone();
        let totals = self
            .store
            .apply(keys, request_cost, input_tokens, output_tokens)
            .await?;

        info!(
            model = %event.model_id,
            session_id = session.as_deref().unwrap_or("-"),
            input_tokens,
            output_tokens,
            cost_usd = %request_cost,
            daily_total_usd = %totals.day.cost,
            monthly_total_usd = %totals.month.cost,
            "usage recorded"
        );

        let breakdown = CostBreakdown {
            request_cost,
            updated_daily_total: totals.day.cost,
            updated_monthly_total: totals.month.cost,
        };
        self.warn_if_approaching(&breakdown);
        Ok(breakdown)
    }

    fn warn_if_approaching(&self, breakdown: &CostBreakdown) {
        let Some(limits) = self.limits else {
            return;
        };
        let daily_threshold = limits.daily_limit * self.warn_ratio;
        if breakdown.updated_daily_total > daily_threshold {
            warn!(
                daily_total_usd = %breakdown.updated_daily_total,
                daily_limit_usd = %limits.daily_limit,
                "approaching daily budget limit"
            );
        }
        let monthly_threshold = limits.monthly_limit * self.warn_ratio;
        if breakdown.updated_monthly_total > monthly_threshold {
            warn!(
                monthly_total_usd = %breakdown.updated_monthly_total,
                monthly_limit_usd = %limits.monthly_limit,
                "approaching monthly budget limit"
            );
        }
    }

    /// "Today" and "This Month" rows for the current local date.
    pub fn summary(&self) -> Vec<SummaryRow> {
        self.summary_at(today())
    }

    pub fn summary_at(&self, date: NaiveDate) -> Vec<SummaryRow> {
        vec![
            SummaryRow::from_aggregate("Today", &self.store.get_day(&day_key(date))),
            SummaryRow::from_aggregate("This Month", &self.store.get_month(&month_key(date))),
        ]
    }

    /// Accumulated usage of one session.
    pub fn session_summary(&self, session_id: &str) -> SummaryRow {
        SummaryRow::from_aggregate(
            format!("Session {session_id}"),
            &self.store.get_session(session_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::WindowAggregate;

    async fn engine_in(dir: &tempfile::TempDir) -> MeteringEngine {
        let store = UsageStore::open(dir.path().join("usage.json")).await.unwrap();
        MeteringEngine::new(Arc::new(store), PriceTable::builtin())
    }

    fn oct16() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[tokio::test]
    async fn haiku_request_is_priced_and_aggregated() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;

        let event = UsageEvent::new("claude-3.5-haiku", 1000, 500);
        let breakdown = engine.record_at(&event, oct16()).await.unwrap();
        assert_eq!(breakdown.request_cost, dec!(0.0028));
        assert_eq!(breakdown.updated_daily_total, dec!(0.0028));
        assert_eq!(breakdown.updated_monthly_total, dec!(0.0028));

        let breakdown = engine.record_at(&event, oct16()).await.unwrap();
        assert_eq!(breakdown.updated_daily_total, dec!(0.0056));

        let day = engine.store().get_day("2026-10-16");
        assert_eq!(day.requests, 2);
        assert_eq!(day.input_tokens, 2000);
        assert_eq!(day.output_tokens, 1000);
    }

    #[tokio::test]
    async fn zero_token_event_counts_a_request() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;

        let breakdown = engine
            .record_at(&UsageEvent::new("claude-4-sonnet", 0, 0), oct16())
            .await
            .unwrap();
        assert_eq!(breakdown.request_cost, Decimal::ZERO);
        assert_eq!(engine.store().get_day("2026-10-16").requests, 1);
    }

    #[tokio::test]
    async fn negative_tokens_leave_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;

        let err = engine
            .record_at(&UsageEvent::new("claude-3.5-haiku", -5, 10), oct16())
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::InvalidEvent { .. }));
        assert_eq!(engine.store().get_day("2026-10-16"), WindowAggregate::default());
        assert!(!engine.store().path().exists());
    }

    #[tokio::test]
    async fn out_of_range_cost_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path().join("usage.json")).await.unwrap();
        let prices = PriceTable::new(
            std::collections::BTreeMap::from([(
                "pricey".to_string(),
                crate::pricing::PriceEntry::new(dec!(100_000_000_000_000_000), dec!(1)),
            )]),
            "pricey",
        )
        .unwrap();
        let engine = MeteringEngine::new(Arc::new(store), prices);

        let err = engine
            .record_at(&UsageEvent::new("pricey", i64::MAX, 0), oct16())
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::InvalidEvent { .. }), "got: {err}");
        assert!(err.to_string().contains("out of range"));
        assert_eq!(engine.store().get_day("2026-10-16"), WindowAggregate::default());
        assert!(!engine.store().path().exists());
    }

    #[tokio::test]
    async fn blank_session_creates_no_session_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;

        // The field is public, so callers can bypass `with_session`.
        let mut event = UsageEvent::new("claude-3.5-haiku", 1000, 500);
        event.session_id = Some(String::new());
        engine.record_at(&event, oct16()).await.unwrap();
        engine
            .record_at(&event.clone().with_session("  "), oct16())
            .await
            .unwrap();

        assert!(engine.store().snapshot().sessions.is_empty());
        assert_eq!(engine.store().get_day("2026-10-16").requests, 2);
    }

    #[tokio::test]
    async fn unknown_model_uses_default_rates() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;

        let unknown = engine
            .record_at(&UsageEvent::new("mystery-model", 1_000_000, 0), oct16())
            .await
            .unwrap();
        assert_eq!(unknown.request_cost, dec!(3));
    }

    #[tokio::test]
    async fn session_buckets_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;

        let a = UsageEvent::new("claude-3.5-haiku", 1000, 500).with_session("a");
        let b = UsageEvent::new("claude-3.5-haiku", 2000, 0).with_session("b");
        engine.record_at(&a, oct16()).await.unwrap();
        engine.record_at(&b, oct16()).await.unwrap();

        let row_a = engine.session_summary("a");
        assert_eq!(row_a.cost, dec!(0.0028));
        assert_eq!(row_a.requests, 1);
        assert_eq!(engine.session_summary("b").input_tokens, 2000);
        assert_eq!(engine.session_summary("c").requests, 0);
        // Both sessions land in the shared day bucket.
        assert_eq!(engine.store().get_day("2026-10-16").requests, 2);
    }

    #[tokio::test]
    async fn month_boundary_splits_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;
        let event = UsageEvent::new("claude-3.5-haiku", 1000, 500);

        engine
            .record_at(&event, NaiveDate::from_ymd_opt(2026, 9, 30).unwrap())
            .await
            .unwrap();
        let breakdown = engine
            .record_at(&event, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(breakdown.updated_daily_total, dec!(0.0028));
        assert_eq!(breakdown.updated_monthly_total, dec!(0.0028));
        assert_eq!(engine.store().get_month("2026-09").requests, 1);
        assert_eq!(engine.store().get_month("2026-10").requests, 1);
    }

    #[tokio::test]
    async fn summary_rows_for_today_and_month() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir).await;
        let event = UsageEvent::new("claude-3.5-haiku", 1000, 500);
        engine
            .record_at(&event, NaiveDate::from_ymd_opt(2026, 10, 15).unwrap())
            .await
            .unwrap();
        engine.record_at(&event, oct16()).await.unwrap();

        let rows = engine.summary_at(oct16());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period, "Today");
        assert_eq!(rows[0].requests, 1);
        assert_eq!(rows[1].period, "This Month");
        assert_eq!(rows[1].cost, dec!(0.0056));
    }

    #[tokio::test]
    async fn concurrent_records_are_all_counted() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine_in(&dir).await);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .record_at(&UsageEvent::new("claude-3.5-haiku", 1000, 500), oct16())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let day = engine.store().get_day("2026-10-16");
        assert_eq!(day.requests, 16);
        assert_eq!(day.cost, dec!(0.0448));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn warns_when_approaching_limit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir)
            .await
            .with_limits(BudgetLimits::new(dec!(0.01), dec!(10)), dec!(0.5));

        // 0.0028 is below half of the daily limit.
        let event = UsageEvent::new("claude-3.5-haiku", 1000, 500);
        engine.record_at(&event, oct16()).await.unwrap();
        assert!(!logs_contain("approaching daily budget limit"));

        engine.record_at(&event, oct16()).await.unwrap();
        engine.record_at(&event, oct16()).await.unwrap();
        assert!(logs_contain("approaching daily budget limit"));
        assert!(!logs_contain("approaching monthly budget limit"));
    }
}
