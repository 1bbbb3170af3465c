// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget admission checks with daily and monthly limits.
//!
//! The check is a pure read of today's and this month's aggregates from the
//! store's current snapshot. It never blocks on a writer and never mutates.
//! A period is admitted only while its usage is strictly below the limit.
//!
//! The check is advisory: a concurrent `record()` may push usage past a
//! limit right after a check admitted the call.

use chrono::NaiveDate;
use tally_core::{BudgetLimits, BudgetStatus};

use crate::store::{UsageStore, day_key, month_key, today};

/// Stateless budget policy over a [`UsageStore`].
pub struct BudgetPolicy;

impl BudgetPolicy {
    /// Check today's and this month's usage against `limits`.
    pub fn check(store: &UsageStore, limits: &BudgetLimits) -> BudgetStatus {
        Self::check_at(store, limits, today())
    }

    /// Check the day and month containing `date` against `limits`.
    pub fn check_at(store: &UsageStore, limits: &BudgetLimits, date: NaiveDate) -> BudgetStatus {
        let daily_used = store.get_day(&day_key(date)).cost;
        let monthly_used = store.get_month(&month_key(date)).cost;
        BudgetStatus {
            daily_ok: daily_used < limits.daily_limit,
            monthly_ok: monthly_used < limits.monthly_limit,
            daily_used,
            daily_limit: limits.daily_limit,
            monthly_used,
            monthly_limit: limits.monthly_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BucketKeys;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tally_core::UsagePeriod;

    fn oct16() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    async fn store_with(cost: Decimal) -> (tempfile::TempDir, UsageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path().join("usage.json")).await.unwrap();
        if cost > Decimal::ZERO {
            store
                .apply(BucketKeys::for_date(oct16(), None), cost, 0, 0)
                .await
                .unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn under_both_limits_is_ok() {
        let (_dir, store) = store_with(dec!(0.50)).await;
        let limits = BudgetLimits::new(dec!(1), dec!(10));
        let status = BudgetPolicy::check_at(&store, &limits, oct16());
        assert!(status.daily_ok);
        assert!(status.monthly_ok);
        assert!(status.is_ok());
        assert_eq!(status.daily_used, dec!(0.50));
        assert_eq!(status.monthly_limit, dec!(10));
        assert_eq!(status.exhausted_period(), None);
    }

    #[tokio::test]
    async fn usage_equal_to_limit_is_exhausted() {
        let (_dir, store) = store_with(dec!(1.00)).await;
        let limits = BudgetLimits::new(dec!(1.00), dec!(10));
        let status = BudgetPolicy::check_at(&store, &limits, oct16());
        assert!(!status.daily_ok);
        assert!(status.monthly_ok);
        assert_eq!(status.exhausted_period(), Some(UsagePeriod::Day));
    }

    #[tokio::test]
    async fn monthly_limit_checked_independently() {
        let (_dir, store) = store_with(dec!(5)).await;
        let limits = BudgetLimits::new(dec!(100), dec!(4));
        let status = BudgetPolicy::check_at(&store, &limits, oct16());
        assert!(status.daily_ok);
        assert!(!status.monthly_ok);
        assert_eq!(status.exhausted_period(), Some(UsagePeriod::Month));
    }

    #[tokio::test]
    async fn fresh_day_in_same_month_keeps_monthly_usage() {
        let (_dir, store) = store_with(dec!(0.75)).await;
        let next_day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let limits = BudgetLimits::new(dec!(1), dec!(10));
        let status = BudgetPolicy::check_at(&store, &limits, next_day);
        assert_eq!(status.daily_used, Decimal::ZERO);
        assert_eq!(status.monthly_used, dec!(0.75));
    }

    #[tokio::test]
    async fn zero_limit_rejects_even_without_usage() {
        let (_dir, store) = store_with(Decimal::ZERO).await;
        let limits = BudgetLimits::new(Decimal::ZERO, dec!(10));
        let status = BudgetPolicy::check_at(&store, &limits, oct16());
        assert!(!status.daily_ok);
    }
}
