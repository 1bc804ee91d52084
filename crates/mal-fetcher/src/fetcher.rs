//! Query operations over the MyAnimeList API and the local cache.
//!
//! [`MalFetcher`] composes the request executor, the entry normalizer and
//! the cache. Every cache read goes through the daily reconciliation pass.

use crate::api::types::{
    NodeWrapper, PagedResponse, RawAnime, SearchHit, UserProfile, ANIME_FIELDS,
};
use crate::api::{AniListResolver, AuthMode, HttpMethod, MalClient, Payload};
use crate::cache::AnimeCache;
use crate::error::{MalError, Result};
use crate::models::{AiringStatus, CatalogEntry, WatchingStatus};
use crate::normalize::EntryNormalizer;
use crate::reconcile::{self, RefreshSource};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Status selector for user list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(WatchingStatus),
    /// Rewatching; never queried
    Repeating,
}

impl FromStr for StatusFilter {
    type Err = MalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "CURRENT" => Ok(Self::Only(WatchingStatus::Current)),
            "COMPLETED" => Ok(Self::Only(WatchingStatus::Completed)),
            "PAUSED" => Ok(Self::Only(WatchingStatus::Paused)),
            "DROPPED" => Ok(Self::Only(WatchingStatus::Dropped)),
            "PLANNING" => Ok(Self::Only(WatchingStatus::Planning)),
            "REPEATING" => Ok(Self::Repeating),
            _ => Err(MalError::InvalidStatus(s.to_string())),
        }
    }
}

/// List status written by [`MalFetcher::update_progress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub status: WatchingStatus,
    /// Omitted when moving the title back to planning
    pub watched_episodes: Option<u32>,
}

impl ProgressUpdate {
    /// Completed at the last episode, planning at zero, watching otherwise
    pub fn derive(progress: u32, total_episodes: Option<u32>) -> Self {
        if Some(progress) == total_episodes {
            Self {
                status: WatchingStatus::Completed,
                watched_episodes: Some(progress),
            }
        } else if progress == 0 {
            Self {
                status: WatchingStatus::Planning,
                watched_episodes: None,
            }
        } else {
            Self {
                status: WatchingStatus::Current,
                watched_episodes: Some(progress),
            }
        }
    }

    fn form(&self) -> Payload {
        let mut params = vec![("status".to_string(), self.status.as_mal().to_string())];
        if let Some(watched) = self.watched_episodes {
            params.push(("num_watched_episodes".to_string(), watched.to_string()));
        }
        Payload::Params(params)
    }
}

type Clock = Box<dyn Fn() -> NaiveDate + Send + Sync>;

/// Entry point for all fetch operations
pub struct MalFetcher {
    client: Arc<MalClient>,
    normalizer: EntryNormalizer,
    cache: AnimeCache,
    clock: Clock,
    list_page_size: u32,
}

impl MalFetcher {
    /// Create a fetcher over an existing client and cache
    pub fn new(client: Arc<MalClient>, cache: AnimeCache, anilist: AniListResolver) -> Self {
        Self {
            normalizer: EntryNormalizer::new(client.clone(), anilist, cache.clone()),
            client,
            cache,
            clock: Box::new(|| Local::now().date_naive()),
            list_page_size: 100,
        }
    }

    /// Replace the source of "today" used for airing computations
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Number of entries requested per list page
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.list_page_size = size.max(1);
        self
    }

    pub fn cache(&self) -> &AnimeCache {
        &self.cache
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Reconcile the cache, then return its entries
    pub async fn load_cache(&self) -> Result<BTreeMap<String, CatalogEntry>> {
        let outcome = reconcile::reconcile(&self.cache, self, self.today()).await?;
        debug!(outcome = ?outcome, "Cache reconciliation");
        Ok(self.cache.snapshot()?.entries)
    }

    /// Remove all cached entries and searches
    pub fn clear_cache(&self) -> Result<()> {
        Ok(self.cache.clear()?)
    }

    /// Profile of the authenticated user
    pub async fn fetch_user_profile(&self) -> Result<Option<UserProfile>> {
        self.get_as("users/@me", Payload::none(), AuthMode::User).await
    }

    /// Most recently started title on a user's list.
    ///
    /// Without `username` the authenticated user's list is read with the
    /// user token; with one, the public list is read with the client id.
    pub async fn fetch_latest_for_user(
        &self,
        status: StatusFilter,
        username: Option<&str>,
    ) -> Result<Option<(String, CatalogEntry)>> {
        if status == StatusFilter::Repeating {
            return Ok(None);
        }
        let (username, auth) = self.list_owner(username).await?;

        let page: Option<PagedResponse<RawAnime>> = self
            .list_page(&username, status, 1, auth)
            .await?;
        let Some(raw) = page.and_then(|p| p.data.into_iter().next()).map(|n| n.node) else {
            info!(username = %username, status = ?status, "No entries found on list");
            return Ok(None);
        };

        let entry = self.user_entry(&raw).await?;
        Ok(Some((raw.id.to_string(), entry)))
    }

    /// Every title on a user's list under the given statuses.
    ///
    /// Statuses are fetched in order and merged by title id; a title seen
    /// under a later status replaces the earlier one.
    pub async fn fetch_all_for_user(
        &self,
        statuses: &[StatusFilter],
        username: Option<&str>,
    ) -> Result<BTreeMap<String, CatalogEntry>> {
        let mut merged = BTreeMap::new();
        if statuses.iter().all(|s| *s == StatusFilter::Repeating) {
            return Ok(merged);
        }
        let (username, auth) = self.list_owner(username).await?;

        for status in statuses {
            if *status == StatusFilter::Repeating {
                continue;
            }
            let entries = self.full_list(&username, *status, auth).await?;
            info!(
                username = %username,
                status = ?status,
                count = entries.len(),
                "Fetched list"
            );
            merged.extend(entries);
        }

        Ok(merged)
    }

    /// A title as it appears on the authenticated user's list, `None` if
    /// the title is not on any list
    pub async fn fetch_single_entry(&self, anime_id: &str) -> Result<Option<CatalogEntry>> {
        let endpoint = format!("anime/{anime_id}");
        let raw: Option<RawAnime> = self
            .get_as(&endpoint, Payload::params([("fields", ANIME_FIELDS)]), AuthMode::User)
            .await?;

        match raw {
            Some(raw) if raw.my_list_status.is_some() => Ok(Some(self.user_entry(&raw).await?)),
            _ => Ok(None),
        }
    }

    /// Cached entry for a title, fetched when missing or when forced
    pub async fn fetch_title_info(
        &self,
        anime_id: &str,
        force_update: bool,
    ) -> Result<Option<CatalogEntry>> {
        if !force_update {
            if let Some(entry) = self.load_cache().await?.remove(anime_id) {
                debug!(anime_id = %anime_id, "Returning cached result");
                return Ok(Some(entry));
            }
        }
        self.fetch_fresh(anime_id, self.today()).await
    }

    /// Title id for a free-text query; titles that have not aired yet are
    /// treated as unresolved
    pub async fn resolve_id_by_name(&self, name: &str) -> Result<Option<String>> {
        if let Some(anime_id) = self.cache.search(name)? {
            debug!(query = %name, "Returning cached search result");
            return Ok(Some(anime_id));
        }

        let hits: Option<Vec<NodeWrapper<SearchHit>>> = self
            .get_as(
                "anime",
                Payload::params([("q", name.to_string()), ("limit", "1".to_string())]),
                AuthMode::App,
            )
            .await?;
        let Some(hit) = hits.and_then(|h| h.into_iter().next()) else {
            info!(query = %name, "No search results");
            return Ok(None);
        };

        let anime_id = hit.node.id.to_string();
        let Some(entry) = self.fetch_title_info(&anime_id, false).await? else {
            return Ok(None);
        };
        if entry.airing_status == AiringStatus::NotYetReleased {
            info!(query = %name, anime_id = %anime_id, "Search hit has not aired yet");
            return Ok(None);
        }

        self.cache.put_search(name, &anime_id)?;
        Ok(Some(anime_id))
    }

    /// Set the watched episode count of a title on the user's list
    pub async fn update_progress(&self, anime_id: &str, progress: u32) -> Result<ProgressUpdate> {
        let entry = self
            .fetch_title_info(anime_id, false)
            .await?
            .ok_or_else(|| MalError::NotFound(anime_id.to_string()))?;

        let update = ProgressUpdate::derive(progress, entry.total_episodes);
        let endpoint = format!("anime/{anime_id}/my_list_status");
        self.client
            .execute(HttpMethod::Put, &endpoint, update.form(), AuthMode::User)
            .await?
            .ok_or_else(|| MalError::NotFound(anime_id.to_string()))?;

        info!(
            anime_id = %anime_id,
            status = %update.status,
            watched = ?update.watched_episodes,
            "Progress updated"
        );
        Ok(update)
    }

    /// Fetch and normalize a title, bypassing the cache
    async fn fetch_fresh(&self, anime_id: &str, today: NaiveDate) -> Result<Option<CatalogEntry>> {
        let endpoint = format!("anime/{anime_id}");
        let raw: Option<RawAnime> = self
            .get_as(&endpoint, Payload::params([("fields", ANIME_FIELDS)]), AuthMode::App)
            .await?;

        match raw {
            Some(raw) => Ok(Some(self.normalizer.normalize(&raw, today).await?)),
            None => Ok(None),
        }
    }

    /// Normalize a list record and attach the user's list state
    async fn user_entry(&self, raw: &RawAnime) -> Result<CatalogEntry> {
        let mut entry = self.normalizer.normalize(raw, self.today()).await?;
        if let Some(list_status) = &raw.my_list_status {
            if let Some(status) = WatchingStatus::from_mal(&list_status.status) {
                entry.watched_episodes = Some(list_status.num_episodes_watched);
                entry.watching_status = Some(status);
            }
        }
        Ok(entry)
    }

    /// Username whose list to read and the auth mode to read it with
    async fn list_owner(&self, username: Option<&str>) -> Result<(String, AuthMode)> {
        match username {
            Some(name) => Ok((name.to_string(), AuthMode::App)),
            None => {
                let profile = self
                    .fetch_user_profile()
                    .await?
                    .ok_or_else(|| MalError::NotFound("user profile".to_string()))?;
                Ok((profile.name, AuthMode::User))
            }
        }
    }

    async fn list_page(
        &self,
        username: &str,
        status: StatusFilter,
        limit: u32,
        auth: AuthMode,
    ) -> Result<Option<PagedResponse<RawAnime>>> {
        let mut params = vec![
            ("sort".to_string(), "anime_start_date".to_string()),
            ("fields".to_string(), ANIME_FIELDS.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let StatusFilter::Only(status) = status {
            params.push(("status".to_string(), status.as_mal().to_string()));
        }

        let endpoint = format!("users/{username}/animelist");
        self.get_raw_as(&endpoint, Payload::Params(params), auth).await
    }

    async fn full_list(
        &self,
        username: &str,
        status: StatusFilter,
        auth: AuthMode,
    ) -> Result<BTreeMap<String, CatalogEntry>> {
        let mut entries = BTreeMap::new();
        let mut page = self
            .list_page(username, status, self.list_page_size, auth)
            .await?;

        while let Some(current) = page {
            for node in current.data {
                let raw = node.node;
                let entry = self.user_entry(&raw).await?;
                entries.insert(raw.id.to_string(), entry);
            }

            page = match current.paging.next {
                Some(next) => self.get_raw_as(&next, Payload::none(), auth).await?,
                None => None,
            };
        }

        Ok(entries)
    }

    /// GET with the `data` envelope removed, decoded into `T`
    async fn get_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: Payload,
        auth: AuthMode,
    ) -> Result<Option<T>> {
        let data = self
            .client
            .execute(HttpMethod::Get, endpoint, payload, auth)
            .await?;
        decode(endpoint, data)
    }

    /// GET returning the whole body, decoded into `T`
    async fn get_raw_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: Payload,
        auth: AuthMode,
    ) -> Result<Option<T>> {
        let body = self
            .client
            .execute_raw(HttpMethod::Get, endpoint, payload, auth)
            .await?;
        decode(endpoint, body)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Option<Value>) -> Result<Option<T>> {
    value
        .filter(|v| !v.is_null())
        .map(|v| serde_json::from_value(v).map_err(|e| MalError::decode(endpoint, e)))
        .transpose()
}

#[async_trait]
impl RefreshSource for MalFetcher {
    async fn refresh(&self, anime_id: &str, today: NaiveDate) -> Result<Option<CatalogEntry>> {
        self.fetch_fresh(anime_id, today).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::ClientSettings;
    use crate::api::credentials::testing::StaticCredentials;
    use crate::api::transport::testing::{Reply, ScriptedTransport};
    use crate::api::transport::RequestBody;
    use crate::store::DocumentStore;
    use serde_json::json;
    use shared::DataPaths;
    use std::time::Duration;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 20).unwrap()
    }

    fn anime(id: u64, status: &str, extra: Value) -> Value {
        let mut record = json!({
            "id": id,
            "title": format!("Anime {id}"),
            "alternative_titles": {"synonyms": [], "en": null, "ja": null},
            "start_date": "2024-04-06",
            "nsfw": "white",
            "media_type": "tv",
            "status": status,
            "genres": [],
            "num_episodes": 12,
            "related_anime": []
        });
        if let (Value::Object(record), Value::Object(extra)) = (&mut record, extra) {
            record.extend(extra);
        }
        record
    }

    struct Harness {
        _temp_dir: TempDir,
        transport: Arc<ScriptedTransport>,
        fetcher: MalFetcher,
    }

    fn harness(transport: ScriptedTransport) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let transport = Arc::new(
            transport.route("anilist.co", vec![Reply::json(200, json!({"data": {"Media": {"id": 7}}}))]),
        );
        let store = Arc::new(DocumentStore::new(DataPaths::new(temp_dir.path())).unwrap());
        let client = MalClient::new(
            transport.clone(),
            Arc::new(StaticCredentials::new(Some("client"), Some("user-token"))),
            ClientSettings {
                base_url: "https://api.myanimelist.net/v2".to_string(),
                token_env_var: "MAL_FETCHER_TEST_TOKEN_UNSET".to_string(),
                max_attempts: 5,
                default_retry_after: Duration::from_secs(1),
            },
        );
        let fetcher = MalFetcher::new(
            Arc::new(client),
            AnimeCache::new(store),
            AniListResolver::new("https://graphql.anilist.co"),
        )
        .with_clock(today);

        Harness {
            _temp_dir: temp_dir,
            transport,
            fetcher,
        }
    }

    #[test]
    fn test_status_filter_parsing() {
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "Paused".parse::<StatusFilter>().unwrap(),
            StatusFilter::Only(WatchingStatus::Paused)
        );
        assert_eq!("REPEATING".parse::<StatusFilter>().unwrap(), StatusFilter::Repeating);
        assert!(matches!(
            "watching".parse::<StatusFilter>(),
            Err(MalError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_progress_update_derivation() {
        assert_eq!(
            ProgressUpdate::derive(12, Some(12)),
            ProgressUpdate {
                status: WatchingStatus::Completed,
                watched_episodes: Some(12)
            }
        );
        assert_eq!(
            ProgressUpdate::derive(0, Some(12)),
            ProgressUpdate {
                status: WatchingStatus::Planning,
                watched_episodes: None
            }
        );
        assert_eq!(
            ProgressUpdate::derive(5, Some(12)),
            ProgressUpdate {
                status: WatchingStatus::Current,
                watched_episodes: Some(5)
            }
        );
        assert_eq!(
            ProgressUpdate::derive(5, None).status,
            WatchingStatus::Current
        );
    }

    #[tokio::test]
    async fn test_title_info_is_served_from_cache() {
        let h = harness(ScriptedTransport::new().route(
            "/anime/1",
            vec![Reply::json(200, anime(1, "finished_airing", json!({})))],
        ));

        let first = h.fetcher.fetch_title_info("1", false).await.unwrap().unwrap();
        assert_eq!(first.main_title, "Anime 1");
        assert_eq!(first.cross_catalog_id, Some(7));
        assert_eq!(h.transport.count("/anime/1"), 1);

        let second = h.fetcher.fetch_title_info("1", false).await.unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(h.transport.count("/anime/1"), 1);

        h.fetcher.fetch_title_info("1", true).await.unwrap();
        assert_eq!(h.transport.count("/anime/1"), 2);
    }

    #[tokio::test]
    async fn test_title_info_not_found() {
        let h = harness(ScriptedTransport::new());
        assert_eq!(h.fetcher.fetch_title_info("404", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upcoming_episode_only_on_airing_entries() {
        let h = harness(
            ScriptedTransport::new()
                .route("/anime/1", vec![Reply::json(200, anime(1, "finished_airing", json!({})))])
                .route("/anime/2", vec![Reply::json(200, anime(2, "currently_airing", json!({})))])
                .route(
                    "/anime/3",
                    vec![Reply::json(200, anime(3, "not_yet_aired", json!({"start_date": "2025"})))],
                ),
        );

        for id in ["1", "2", "3"] {
            h.fetcher.fetch_title_info(id, false).await.unwrap();
        }

        let cached = h.fetcher.load_cache().await.unwrap();
        assert_eq!(cached.len(), 3);
        for entry in cached.values() {
            assert_eq!(
                entry.upcoming_episode_number.is_some(),
                entry.airing_status == AiringStatus::Releasing
            );
        }
        // 14 days after 2024-04-06
        assert_eq!(cached["2"].upcoming_episode_number, Some(3));
    }

    #[tokio::test]
    async fn test_resolve_id_by_name_caches_result() {
        let h = harness(
            ScriptedTransport::new()
                .route("/anime", vec![Reply::json(200, json!({"data": [{"node": {"id": 1}}]}))])
                .route("/anime/1", vec![Reply::json(200, anime(1, "finished_airing", json!({})))]),
        );

        let id = h.fetcher.resolve_id_by_name("cowboy bebop").await.unwrap();
        assert_eq!(id.as_deref(), Some("1"));
        let search = &h.transport.requests()[0];
        assert!(search.query.contains(&("limit".to_string(), "1".to_string())));

        let again = h.fetcher.resolve_id_by_name("cowboy bebop").await.unwrap();
        assert_eq!(again.as_deref(), Some("1"));
        assert_eq!(h.transport.count("/anime"), 1);
    }

    #[tokio::test]
    async fn test_resolve_id_by_name_rejects_unaired() {
        let h = harness(
            ScriptedTransport::new()
                .route("/anime", vec![Reply::json(200, json!({"data": [{"node": {"id": 3}}]}))])
                .route("/anime/3", vec![Reply::json(200, anime(3, "not_yet_aired", json!({})))]),
        );

        assert_eq!(h.fetcher.resolve_id_by_name("sequel").await.unwrap(), None);
        assert_eq!(h.fetcher.cache().search("sequel").unwrap(), None);

        // Not cached, so the search runs again
        h.fetcher.resolve_id_by_name("sequel").await.unwrap();
        assert_eq!(h.transport.count("/anime"), 2);
    }

    #[tokio::test]
    async fn test_resolve_id_by_name_without_hits() {
        let h = harness(
            ScriptedTransport::new().route("/anime", vec![Reply::json(200, json!({"data": []}))]),
        );
        assert_eq!(h.fetcher.resolve_id_by_name("nothing").await.unwrap(), None);
    }

    async fn progress_body(progress: u32) -> (ProgressUpdate, Vec<(String, String)>) {
        let h = harness(
            ScriptedTransport::new()
                .route("/anime/1", vec![Reply::json(200, anime(1, "finished_airing", json!({})))])
                .route(
                    "/anime/1/my_list_status",
                    vec![Reply::json(200, json!({"status": "watching"}))],
                ),
        );

        let update = h.fetcher.update_progress("1", progress).await.unwrap();
        let put = h
            .transport
            .requests()
            .into_iter()
            .find(|r| r.method == HttpMethod::Put)
            .unwrap();
        assert_eq!(put.header("authorization"), Some("Bearer user-token"));
        let RequestBody::Form(fields) = put.body else {
            panic!("expected a form body");
        };
        (update, fields)
    }

    #[tokio::test]
    async fn test_update_progress_writes_list_status() {
        let (update, fields) = progress_body(12).await;
        assert_eq!(update.status, WatchingStatus::Completed);
        assert!(fields.contains(&("status".to_string(), "completed".to_string())));
        assert!(fields.contains(&("num_watched_episodes".to_string(), "12".to_string())));

        let (update, fields) = progress_body(0).await;
        assert_eq!(update.status, WatchingStatus::Planning);
        assert_eq!(fields, vec![("status".to_string(), "plan_to_watch".to_string())]);

        let (update, fields) = progress_body(4).await;
        assert_eq!(update.status, WatchingStatus::Current);
        assert!(fields.contains(&("status".to_string(), "watching".to_string())));
        assert!(fields.contains(&("num_watched_episodes".to_string(), "4".to_string())));
    }

    #[tokio::test]
    async fn test_update_progress_unknown_title() {
        let h = harness(ScriptedTransport::new());
        let result = h.fetcher.update_progress("404", 1).await;
        assert!(matches!(result, Err(MalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_latest_for_named_user() {
        let h = harness(ScriptedTransport::new().route(
            "/users/spike/animelist",
            vec![Reply::json(200, json!({
                "data": [{"node": anime(1, "finished_airing", json!({
                    "my_list_status": {"status": "on_hold", "num_episodes_watched": 4}
                }))}],
                "paging": {}
            }))],
        ));

        let (id, entry) = h
            .fetcher
            .fetch_latest_for_user(StatusFilter::Only(WatchingStatus::Paused), Some("spike"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, "1");
        assert_eq!(entry.watched_episodes, Some(4));
        assert_eq!(entry.watching_status, Some(WatchingStatus::Paused));

        let request = &h.transport.requests()[0];
        assert_eq!(request.header("x-mal-client-id"), Some("client"));
        assert!(request.query.contains(&("status".to_string(), "on_hold".to_string())));
        assert!(request.query.contains(&("limit".to_string(), "1".to_string())));

        // The cached copy carries no list state
        let cached = h.fetcher.cache().snapshot().unwrap();
        assert_eq!(cached.entries["1"].watching_status, None);
    }

    #[tokio::test]
    async fn test_latest_skips_repeating() {
        let h = harness(ScriptedTransport::new());
        let result = h
            .fetcher
            .fetch_latest_for_user(StatusFilter::Repeating, None)
            .await
            .unwrap();
        assert_eq!(result, None);
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_latest_on_empty_list() {
        let h = harness(ScriptedTransport::new().route(
            "/users/spike/animelist",
            vec![Reply::json(200, json!({"data": [], "paging": {}}))],
        ));
        let result = h
            .fetcher
            .fetch_latest_for_user(StatusFilter::All, Some("spike"))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_all_for_authenticated_user_merges_statuses() {
        let watching = json!({"my_list_status": {"status": "watching", "num_episodes_watched": 3}});
        let completed = json!({"my_list_status": {"status": "completed", "num_episodes_watched": 12}});
        let h = harness(
            ScriptedTransport::new()
                .route("/users/@me", vec![Reply::json(200, json!({"name": "spike", "picture": null}))])
                .route(
                    "/users/spike/animelist",
                    vec![
                        Reply::json(200, json!({
                            "data": [
                                {"node": anime(1, "currently_airing", watching.clone())},
                                {"node": anime(2, "finished_airing", watching)}
                            ],
                            "paging": {"next": "https://api.myanimelist.net/v2/users/spike/animelist?offset=2"}
                        })),
                        Reply::json(200, json!({
                            "data": [{"node": anime(2, "finished_airing", completed)}],
                            "paging": {}
                        })),
                    ],
                )
                .route(
                    "animelist?offset=2",
                    vec![Reply::json(200, json!({
                        "data": [{"node": anime(3, "finished_airing", json!({
                            "my_list_status": {"status": "watching", "num_episodes_watched": 1}
                        }))}],
                        "paging": {}
                    }))],
                ),
        );

        let entries = h
            .fetcher
            .fetch_all_for_user(
                &[
                    StatusFilter::Only(WatchingStatus::Current),
                    StatusFilter::Repeating,
                    StatusFilter::Only(WatchingStatus::Completed),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries["1"].watching_status, Some(WatchingStatus::Current));
        assert_eq!(entries["2"].watching_status, Some(WatchingStatus::Completed));
        assert_eq!(entries["2"].watched_episodes, Some(12));
        assert_eq!(entries["3"].watched_episodes, Some(1));

        let list_requests: Vec<_> = h
            .transport
            .requests()
            .into_iter()
            .filter(|r| r.url.contains("/animelist"))
            .collect();
        assert_eq!(list_requests.len(), 3);
        for request in &list_requests {
            assert_eq!(request.header("authorization"), Some("Bearer user-token"));
        }
    }

    #[tokio::test]
    async fn test_single_entry_requires_list_status() {
        let h = harness(
            ScriptedTransport::new()
                .route(
                    "/anime/1",
                    vec![Reply::json(200, anime(1, "finished_airing", json!({
                        "my_list_status": {"status": "completed", "num_episodes_watched": 12}
                    })))],
                )
                .route("/anime/2", vec![Reply::json(200, anime(2, "finished_airing", json!({})))]),
        );

        let entry = h.fetcher.fetch_single_entry("1").await.unwrap().unwrap();
        assert_eq!(entry.watching_status, Some(WatchingStatus::Completed));
        assert_eq!(
            h.transport.requests()[0].header("authorization"),
            Some("Bearer user-token")
        );

        assert_eq!(h.fetcher.fetch_single_entry("2").await.unwrap(), None);
        assert_eq!(h.fetcher.fetch_single_entry("3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_read_reconciles_stale_entries() {
        let h = harness(ScriptedTransport::new().route(
            "/anime/3",
            vec![
                Reply::json(200, anime(3, "not_yet_aired", json!({}))),
                Reply::json(200, anime(3, "currently_airing", json!({}))),
            ],
        ));

        h.fetcher.fetch_title_info("3", false).await.unwrap();
        h.fetcher
            .cache()
            .set_checked_date(NaiveDate::from_ymd_opt(2024, 4, 19).unwrap())
            .unwrap();

        let entry = h.fetcher.fetch_title_info("3", false).await.unwrap().unwrap();
        assert_eq!(entry.airing_status, AiringStatus::Releasing);
        assert_eq!(h.transport.count("/anime/3"), 2);
        assert_eq!(h.fetcher.cache().checked_date().unwrap(), Some(today()));

        // Same day: no further fetches
        h.fetcher.load_cache().await.unwrap();
        assert_eq!(h.transport.count("/anime/3"), 2);
    }
}
