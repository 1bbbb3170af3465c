// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store of aggregated usage counters.
//!
//! The store is a single JSON document with four sections:
//!
//! ```json
//! {
//!   "sessions":   { "<session_id>": { "cost": 0.0028, "input_tokens": 1000, ... } },
//!   "daily":      { "2026-10-16":   { ... } },
//!   "monthly":    { "2026-10":      { ... } },
//!   "tool_usage": { "2026-10-16":   { "calculator": 3 } }
//! }
//! ```
//!
//! Readers see an immutable [`UsageSnapshot`] through an [`ArcSwap`] and never
//! block. Writers are serialized by an in-process mutex and, across processes,
//! by an exclusive lock on `<path>.lock`. Every write reloads the file under
//! that lock, applies its delta to a copy, and commits the copy through a
//! temp file in the same directory followed by a rename. The in-memory
//! snapshot is swapped only after the rename succeeded.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::{TallyError, WindowAggregate, normalize_session_id};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::lock::{FileLock, lock_path_for};

/// Day bucket key, `YYYY-MM-DD`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Month bucket key, `YYYY-MM`.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// The current local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Full persisted state of the store. Missing sections read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    #[serde(default)]
    pub sessions: BTreeMap<String, WindowAggregate>,
    #[serde(default)]
    pub daily: BTreeMap<String, WindowAggregate>,
    #[serde(default)]
    pub monthly: BTreeMap<String, WindowAggregate>,
    #[serde(default)]
    pub tool_usage: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Buckets touched by one metered request.
///
/// Day and month are both derived from the same date so a request made
/// across midnight cannot land in mismatched buckets. Blank session ids
/// are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKeys {
    pub day: String,
    pub month: String,
    pub session: Option<String>,
}

impl BucketKeys {
    pub fn for_date(date: NaiveDate, session: Option<String>) -> Self {
        Self {
            day: day_key(date),
            month: month_key(date),
            session: normalize_session_id(session),
        }
    }
}

/// Bucket totals right after an [`UsageStore::apply`] committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTotals {
    pub day: WindowAggregate,
    pub month: WindowAggregate,
    pub session: Option<WindowAggregate>,
}

/// Persistent usage counters keyed by session, day, and month.
pub struct UsageStore {
    path: PathBuf,
    lock_path: PathBuf,
    snapshot: ArcSwap<UsageSnapshot>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for UsageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl UsageStore {
    /// Open the store backed by `path`.
    ///
    /// A missing file yields an empty store; nothing is written until the
    /// first mutation. A file that exists but does not parse fails with
    /// [`TallyError::CorruptStore`].
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TallyError> {
        let path = path.into();
        let read_path = path.clone();
        let snapshot = run_blocking(move || read_snapshot(&read_path)).await?;
        debug!(
            path = %path.display(),
            days = snapshot.daily.len(),
            sessions = snapshot.sessions.len(),
            "usage store opened"
        );
        Ok(Self {
            lock_path: lock_path_for(&path),
            path,
            snapshot: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
        })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current immutable snapshot.
    pub fn snapshot(&self) -> Arc<UsageSnapshot> {
        self.snapshot.load_full()
    }

    /// Totals for the `YYYY-MM-DD` bucket, zero if absent.
    pub fn get_day(&self, day: &str) -> WindowAggregate {
        self.snapshot.load().daily.get(day).cloned().unwrap_or_default()
    }

    /// Totals for the `YYYY-MM` bucket, zero if absent.
    pub fn get_month(&self, month: &str) -> WindowAggregate {
        self.snapshot
            .load()
            .monthly
            .get(month)
            .cloned()
            .unwrap_or_default()
    }

    /// Totals for one session, zero if absent.
    pub fn get_session(&self, session_id: &str) -> WindowAggregate {
        self.snapshot
            .load()
            .sessions
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Tool invocation counts for the `YYYY-MM-DD` bucket.
    pub fn tool_usage(&self, day: &str) -> BTreeMap<String, u64> {
        self.snapshot
            .load()
            .tool_usage
            .get(day)
            .cloned()
            .unwrap_or_default()
    }

    /// Add one request to the day, month, and (optionally) session buckets.
    ///
    /// All touched buckets are updated in one durable write. On error
    /// neither the file nor the in-memory snapshot changed, so the call can
    /// be retried without double counting.
    pub async fn apply(
        &self,
        keys: BucketKeys,
        cost: Decimal,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<AppliedTotals, TallyError> {
        let snapshot = self
            .mutate({
                let keys = keys.clone();
                move |s| {
                    s.daily
                        .entry(keys.day)
                        .or_default()
                        .add(cost, input_tokens, output_tokens)?;
                    s.monthly
                        .entry(keys.month)
                        .or_default()
                        .add(cost, input_tokens, output_tokens)?;
                    if let Some(session) = keys.session {
                        s.sessions
                            .entry(session)
                            .or_insert_with(|| WindowAggregate {
                                started: Some(Utc::now()),
                                ..WindowAggregate::default()
                            })
                            .add(cost, input_tokens, output_tokens)?;
                    }
                    Ok(())
                }
            })
            .await?;

        Ok(AppliedTotals {
            day: snapshot.daily.get(&keys.day).cloned().unwrap_or_default(),
            month: snapshot
                .monthly
                .get(&keys.month)
                .cloned()
                .unwrap_or_default(),
            session: keys
                .session
                .as_ref()
                .and_then(|id| snapshot.sessions.get(id).cloned()),
        })
    }

    /// Increment the counter for `tool_name` in the `day` bucket.
    pub async fn record_tool_use(&self, day: &str, tool_name: &str) -> Result<u64, TallyError> {
        let day = day.to_string();
        let tool = tool_name.to_string();
        let snapshot = self
            .mutate({
                let (day, tool) = (day.clone(), tool.clone());
                move |s| {
                    let count = s.tool_usage.entry(day).or_default().entry(tool).or_insert(0);
                    *count = count.saturating_add(1);
                    Ok(())
                }
            })
            .await?;
        Ok(snapshot
            .tool_usage
            .get(&day)
            .and_then(|tools| tools.get(&tool))
            .copied()
            .unwrap_or(0))
    }

    /// Reload the snapshot from disk to pick up writes from other processes.
    pub async fn refresh(&self) -> Result<(), TallyError> {
        let _guard = self.writer.lock().await;
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        let snapshot = run_blocking(move || {
            let _lock = FileLock::acquire(&lock_path)?;
            read_snapshot(&path)
        })
        .await?;
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Delete the backing file at `path`. A missing file is not an error.
    ///
    /// Runs under the store lock so it cannot interleave with a writer in
    /// another process. The lock file itself is left in place.
    pub async fn destroy(path: impl Into<PathBuf>) -> Result<(), TallyError> {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        run_blocking(move || {
            let _lock = FileLock::acquire(&lock_path)?;
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "usage store destroyed");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(TallyError::persistence(&path, e)),
            }
        })
        .await
    }

    /// Reload, apply `f` to a private copy, persist it, then publish it.
    ///
    /// If `f` fails the copy is discarded and nothing is written.
    async fn mutate<F>(&self, f: F) -> Result<Arc<UsageSnapshot>, TallyError>
    where
        F: FnOnce(&mut UsageSnapshot) -> Result<(), TallyError> + Send + 'static,
    {
        let _guard = self.writer.lock().await;
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        let next = run_blocking(move || {
            let _lock = FileLock::acquire(&lock_path)?;
            let mut snapshot = read_snapshot(&path)?;
            f(&mut snapshot)?;
            write_snapshot(&path, &snapshot)?;
            Ok(snapshot)
        })
        .await?;

        let next = Arc::new(next);
        self.snapshot.store(Arc::clone(&next));
        Ok(next)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, TallyError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TallyError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TallyError::Internal(format!("usage store task failed: {e}")))?
}

fn read_snapshot(path: &Path) -> Result<UsageSnapshot, TallyError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(UsageSnapshot::default());
        }
        Err(e) => return Err(TallyError::persistence(path, e)),
    };
    serde_json::from_slice(&bytes).map_err(|e| TallyError::corrupt(path, e))
}

fn write_snapshot(path: &Path, snapshot: &UsageSnapshot) -> Result<(), TallyError> {
    let mut bytes =
        serde_json::to_vec_pretty(snapshot).map_err(|e| TallyError::persistence(path, e))?;
    bytes.push(b'\n');

    // Refuse to commit anything that would not read back identically.
    let check: UsageSnapshot =
        serde_json::from_slice(&bytes).map_err(|e| TallyError::persistence(path, e))?;
    if check != *snapshot {
        return Err(TallyError::persistence(
            path,
            "serialized snapshot does not read back identically",
        ));
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| TallyError::persistence(path, e))?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| TallyError::persistence(path, e))?;
    tmp.write_all(&bytes)
        .map_err(|e| TallyError::persistence(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| TallyError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| TallyError::persistence(path, e.error))?;

    #[cfg(unix)]
    std::fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| TallyError::persistence(path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn keys(day: &str, month: &str, session: Option<&str>) -> BucketKeys {
        BucketKeys {
            day: day.to_string(),
            month: month.to_string(),
            session: session.map(str::to_string),
        }
    }

    #[test]
    fn bucket_keys_share_one_date() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let k = BucketKeys::for_date(date, Some("s".into()));
        assert_eq!(k.day, "2026-01-31");
        assert_eq!(k.month, "2026-01");
        assert_eq!(k.session.as_deref(), Some("s"));
    }

    #[test]
    fn bucket_keys_drop_blank_session() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(BucketKeys::for_date(date, Some(String::new())).session, None);
        assert_eq!(BucketKeys::for_date(date, Some(" \t".into())).session, None);
    }

    #[tokio::test]
    async fn missing_file_opens_empty_and_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let store = UsageStore::open(&path).await.unwrap();
        assert_eq!(*store.snapshot(), UsageSnapshot::default());
        assert_eq!(store.get_day("2026-10-16"), WindowAggregate::default());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn apply_updates_all_buckets_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let store = UsageStore::open(&path).await.unwrap();

        let totals = store
            .apply(keys("2026-10-16", "2026-10", Some("s1")), dec!(0.0028), 1000, 500)
            .await
            .unwrap();
        assert_eq!(totals.day.cost, dec!(0.0028));
        assert_eq!(totals.month.requests, 1);
        let session = totals.session.unwrap();
        assert_eq!(session.input_tokens, 1000);
        assert!(session.started.is_some());

        // Day and month buckets carry no start timestamp.
        assert!(store.get_day("2026-10-16").started.is_none());

        let reopened = UsageStore::open(&path).await.unwrap();
        assert_eq!(*reopened.snapshot(), *store.snapshot());
    }

    #[tokio::test]
    async fn persisted_file_uses_json_numbers_for_cost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let store = UsageStore::open(&path).await.unwrap();
        store
            .apply(keys("2026-10-16", "2026-10", None), dec!(0.0028), 1000, 500)
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["daily"]["2026-10-16"]["cost"].is_number());
        assert_eq!(raw["monthly"]["2026-10"]["requests"], 1);
        assert!(raw["sessions"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_sections_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(
            &path,
            r#"{"daily": {"2026-10-16": {"cost": 0.5, "input_tokens": 1, "output_tokens": 2, "requests": 1}}}"#,
        )
        .unwrap();

        let store = UsageStore::open(&path).await.unwrap();
        assert_eq!(store.get_day("2026-10-16").cost, dec!(0.5));
        assert!(store.snapshot().monthly.is_empty());
        assert!(store.tool_usage("2026-10-16").is_empty());
    }

    #[tokio::test]
    async fn unparseable_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = UsageStore::open(&path).await.unwrap_err();
        assert!(matches!(err, TallyError::CorruptStore { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn wrong_schema_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, r#"{"daily": {"2026-10-16": {"cost": "lots"}}}"#).unwrap();

        let err = UsageStore::open(&path).await.unwrap_err();
        assert!(matches!(err, TallyError::CorruptStore { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn failed_persist_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let path = data_dir.join("usage.json");
        let store = UsageStore::open(&path).await.unwrap();

        // A regular file where the data directory should be makes every write fail.
        std::fs::write(&data_dir, b"not a directory").unwrap();
        let err = store
            .apply(keys("2026-10-16", "2026-10", Some("s1")), dec!(1), 10, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Persistence { .. }), "got: {err}");
        assert_eq!(store.get_day("2026-10-16"), WindowAggregate::default());
        assert_eq!(store.get_session("s1"), WindowAggregate::default());

        // Retry after the fault clears counts the request exactly once.
        std::fs::remove_file(&data_dir).unwrap();
        store
            .apply(keys("2026-10-16", "2026-10", Some("s1")), dec!(1), 10, 10)
            .await
            .unwrap();
        assert_eq!(store.get_day("2026-10-16").requests, 1);
        assert_eq!(store.get_month("2026-10").cost, dec!(1));
    }

    #[tokio::test]
    async fn overflowing_total_is_rejected_and_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let store = UsageStore::open(&path).await.unwrap();
        store
            .apply(keys("2026-10-16", "2026-10", None), Decimal::MAX, 1, 1)
            .await
            .unwrap();
        let on_disk = std::fs::read_to_string(&path).unwrap();

        let err = store
            .apply(keys("2026-10-16", "2026-10", None), Decimal::MAX, 1, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::InvalidEvent { .. }), "got: {err}");
        assert_eq!(store.get_day("2026-10-16").requests, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), on_disk);
    }

    #[tokio::test]
    async fn tool_use_counts_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path().join("usage.json")).await.unwrap();

        assert_eq!(store.record_tool_use("2026-10-16", "calculator").await.unwrap(), 1);
        assert_eq!(store.record_tool_use("2026-10-16", "calculator").await.unwrap(), 2);
        store.record_tool_use("2026-10-17", "calculator").await.unwrap();

        assert_eq!(store.tool_usage("2026-10-16")["calculator"], 2);
        assert_eq!(store.tool_usage("2026-10-17")["calculator"], 1);
        assert!(store.tool_usage("2026-10-18").is_empty());
    }

    #[tokio::test]
    async fn writes_from_another_handle_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let a = UsageStore::open(&path).await.unwrap();
        let b = UsageStore::open(&path).await.unwrap();

        a.apply(keys("2026-10-16", "2026-10", None), dec!(0.25), 1, 1)
            .await
            .unwrap();
        // `b` has a stale snapshot but reloads under the lock before writing.
        let totals = b
            .apply(keys("2026-10-16", "2026-10", None), dec!(0.25), 1, 1)
            .await
            .unwrap();
        assert_eq!(totals.day.cost, dec!(0.5));
        assert_eq!(totals.day.requests, 2);

        a.refresh().await.unwrap();
        assert_eq!(a.get_day("2026-10-16").requests, 2);
    }

    #[tokio::test]
    async fn destroy_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let store = UsageStore::open(&path).await.unwrap();
        store
            .apply(keys("2026-10-16", "2026-10", None), dec!(0.1), 1, 1)
            .await
            .unwrap();
        assert!(path.exists());

        UsageStore::destroy(&path).await.unwrap();
        assert!(!path.exists());
        UsageStore::destroy(&path).await.unwrap();

        let reopened = UsageStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_day("2026-10-16"), WindowAggregate::default());
    }
}
