//! Daily freshness pass over the id cache.
//!
//! Titles that have not aired yet are always re-fetched. Airing titles are
//! re-fetched once their next episode date or end date has passed. Finished
//! titles never change. The pass runs at most once per calendar day.

use crate::cache::AnimeCache;
use crate::error::Result;
use crate::models::{AiringStatus, CatalogEntry};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Fetches a fresh copy of a title, bypassing the cache
#[async_trait]
pub trait RefreshSource: Send + Sync {
    async fn refresh(&self, anime_id: &str, today: NaiveDate) -> Result<Option<CatalogEntry>>;
}

/// What a reconciliation call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing cached yet
    EmptyCache,
    /// Already checked today
    AlreadyChecked,
    /// First run: the date was recorded without a pass
    Stamped,
    /// A pass ran over `checked` entries
    Reconciled { checked: usize, refreshed: usize },
}

/// Whether a cached entry must be re-fetched on `today`
pub fn needs_refresh(entry: &CatalogEntry, today: NaiveDate) -> bool {
    match entry.airing_status {
        AiringStatus::NotYetReleased => true,
        AiringStatus::Releasing => {
            let Some(release_date) = entry.release_date else {
                return false;
            };
            if entry.end_date.is_some_and(|end| today > end) {
                return true;
            }
            match next_episode_date(release_date, entry.upcoming_episode_number) {
                Some(next) => today > next,
                // Schedule unknown
                None => true,
            }
        }
        AiringStatus::Finished => false,
    }
}

/// `release_date + 7 days * upcoming_episode_number`
fn next_episode_date(release_date: NaiveDate, upcoming: Option<u32>) -> Option<NaiveDate> {
    let weeks = i64::from(upcoming?);
    release_date.checked_add_signed(Duration::try_days(weeks.checked_mul(7)?)?)
}

/// Ids to re-fetch, in key order
pub fn stale_ids(entries: &BTreeMap<String, CatalogEntry>, today: NaiveDate) -> Vec<String> {
    entries
        .iter()
        .filter(|(_, entry)| needs_refresh(entry, today))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Run the daily pass if it has not run today.
///
/// Updates are collected over a snapshot of the cache and merged in one
/// write at the end; a failed or empty re-fetch keeps the old entry.
pub async fn reconcile(
    cache: &AnimeCache,
    source: &dyn RefreshSource,
    today: NaiveDate,
) -> Result<ReconcileOutcome> {
    if cache.is_empty()? {
        return Ok(ReconcileOutcome::EmptyCache);
    }

    let Some(checked_date) = cache.checked_date()? else {
        cache.set_checked_date(today)?;
        debug!(date = %today, "Recorded first cache check");
        return Ok(ReconcileOutcome::Stamped);
    };
    if checked_date >= today {
        return Ok(ReconcileOutcome::AlreadyChecked);
    }

    let snapshot = cache.snapshot()?;
    let mut stale = stale_ids(&snapshot.entries, today);
    stale.extend(snapshot.unreadable.iter().cloned());
    info!(
        cached = snapshot.entries.len() + snapshot.unreadable.len(),
        stale = stale.len(),
        last_checked = %checked_date,
        "Reconciling cache"
    );

    let mut updates = BTreeMap::new();
    for anime_id in &stale {
        match source.refresh(anime_id, today).await {
            Ok(Some(entry)) => {
                updates.insert(anime_id.clone(), entry);
            }
            Ok(None) => warn!(anime_id = %anime_id, "Stale entry not found upstream, keeping it"),
            Err(e) => warn!(anime_id = %anime_id, error = %e, "Failed to refresh stale entry"),
        }
    }

    let refreshed = updates.len();
    cache.put_all(&updates)?;
    cache.set_checked_date(today)?;
    info!(refreshed = refreshed, "Cache reconciled");

    Ok(ReconcileOutcome::Reconciled {
        checked: snapshot.entries.len() + snapshot.unreadable.len(),
        refreshed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::entry;
    use crate::error::MalError;
    use crate::store::{DocumentStore, ID_CACHE};
    use serde_json::json;
    use shared::DataPaths;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn airing(release: &str, upcoming: Option<u32>) -> CatalogEntry {
        CatalogEntry {
            airing_status: AiringStatus::Releasing,
            release_date: Some(date(release)),
            end_date: None,
            upcoming_episode_number: upcoming,
            ..entry("Airing")
        }
    }

    fn upcoming() -> CatalogEntry {
        CatalogEntry {
            airing_status: AiringStatus::NotYetReleased,
            release_date: None,
            end_date: None,
            ..entry("Upcoming")
        }
    }

    #[test]
    fn test_finished_never_refreshes() {
        assert!(!needs_refresh(&entry("Done"), date("2030-01-01")));
    }

    #[test]
    fn test_not_yet_released_always_refreshes() {
        assert!(needs_refresh(&upcoming(), date("2024-01-01")));
    }

    #[test]
    fn test_airing_refreshes_after_next_episode_date() {
        // Next episode on 2024-01-15
        let entry = airing("2024-01-01", Some(2));
        assert!(!needs_refresh(&entry, date("2024-01-15")));
        assert!(needs_refresh(&entry, date("2024-01-16")));
    }

    #[test]
    fn test_airing_refreshes_after_end_date() {
        let mut entry = airing("2024-01-01", Some(50));
        entry.end_date = Some(date("2024-03-01"));
        assert!(!needs_refresh(&entry, date("2024-03-01")));
        assert!(needs_refresh(&entry, date("2024-03-02")));
    }

    #[test]
    fn test_airing_without_schedule() {
        assert!(needs_refresh(&airing("2024-01-01", None), date("2024-01-02")));

        let mut no_release = airing("2024-01-01", Some(1));
        no_release.release_date = None;
        assert!(!needs_refresh(&no_release, date("2030-01-01")));
    }

    /// Serves fixed replies and counts calls
    struct FakeSource {
        replies: BTreeMap<String, Option<CatalogEntry>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(replies: BTreeMap<String, Option<CatalogEntry>>) -> Self {
            Self {
                replies,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RefreshSource for FakeSource {
        async fn refresh(&self, anime_id: &str, _today: NaiveDate) -> Result<Option<CatalogEntry>> {
            self.calls.lock().unwrap().push(anime_id.to_string());
            match self.replies.get(anime_id) {
                Some(reply) => Ok(reply.clone()),
                None => Err(MalError::Transport("offline".to_string())),
            }
        }
    }

    fn cache(temp_dir: &TempDir) -> (Arc<DocumentStore>, AnimeCache) {
        let store = Arc::new(DocumentStore::new(DataPaths::new(temp_dir.path())).unwrap());
        (store.clone(), AnimeCache::new(store))
    }

    #[tokio::test]
    async fn test_empty_cache_is_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let (_, cache) = cache(&temp_dir);
        let source = FakeSource::new(BTreeMap::new());

        let outcome = reconcile(&cache, &source, date("2024-01-01")).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::EmptyCache);
        assert_eq!(cache.checked_date().unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_run_only_stamps_date() {
        let temp_dir = TempDir::new().unwrap();
        let (_, cache) = cache(&temp_dir);
        cache.put("1", &upcoming()).unwrap();
        let source = FakeSource::new(BTreeMap::new());

        let outcome = reconcile(&cache, &source, date("2024-01-01")).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Stamped);
        assert_eq!(cache.checked_date().unwrap(), Some(date("2024-01-01")));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pass_refreshes_stale_entries_once_per_day() {
        let temp_dir = TempDir::new().unwrap();
        let (_, cache) = cache(&temp_dir);
        cache.put("1", &entry("Finished")).unwrap();
        cache.put("2", &upcoming()).unwrap();
        cache.put("3", &airing("2024-01-01", Some(1))).unwrap();
        cache.put("4", &airing("2024-01-01", Some(3))).unwrap();
        cache.set_checked_date(date("2024-01-09")).unwrap();

        let mut released = airing("2024-01-01", Some(2));
        released.main_title = "Now airing".to_string();
        let source = FakeSource::new(BTreeMap::from([
            ("2".to_string(), Some(released.clone())),
            ("3".to_string(), None),
        ]));

        let today = date("2024-01-10");
        let outcome = reconcile(&cache, &source, today).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Reconciled {
                checked: 4,
                refreshed: 1
            }
        );
        assert_eq!(source.calls(), vec!["2".to_string(), "3".to_string()]);

        let snapshot = cache.snapshot().unwrap();
        assert_eq!(snapshot.entries["2"], released);
        // Not found upstream: the old entry stays
        assert_eq!(snapshot.entries["3"].main_title, "Airing");
        assert_eq!(cache.checked_date().unwrap(), Some(today));

        let again = reconcile(&cache, &source, today).await.unwrap();
        assert_eq!(again, ReconcileOutcome::AlreadyChecked);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_entry_and_advances_date() {
        let temp_dir = TempDir::new().unwrap();
        let (_, cache) = cache(&temp_dir);
        cache.put("2", &upcoming()).unwrap();
        cache.set_checked_date(date("2024-01-01")).unwrap();
        let source = FakeSource::new(BTreeMap::new());

        let today = date("2024-01-02");
        reconcile(&cache, &source, today).await.unwrap();

        let snapshot = cache.snapshot().unwrap();
        assert_eq!(snapshot.entries["2"], upcoming());
        assert_eq!(cache.checked_date().unwrap(), Some(today));
    }

    #[tokio::test]
    async fn test_unreadable_entries_are_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let (store, cache) = cache(&temp_dir);
        store
            .write(ID_CACHE, &json!({"9": {"status": "RELEASING"}}), false)
            .unwrap();
        cache.set_checked_date(date("2024-01-01")).unwrap();

        let fresh = entry("Repaired");
        let source = FakeSource::new(BTreeMap::from([("9".to_string(), Some(fresh.clone()))]));

        reconcile(&cache, &source, date("2024-01-02")).await.unwrap();
        assert_eq!(cache.snapshot().unwrap().entries["9"], fresh);
    }
}
