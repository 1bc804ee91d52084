//! Conversion of raw MyAnimeList records into cached entries.
//!
//! Besides field mapping this resolves the AniList id and the airing status
//! of every prequel and sequel, one request at a time.

use crate::api::types::{
    AlternativeTitles, Genre, RawAnime, RelatedEdge, StatusAndRelations, RELATION_FIELDS,
};
use crate::api::{AniListResolver, AuthMode, HttpMethod, MalClient, Payload};
use crate::cache::AnimeCache;
use crate::error::{MalError, Result};
use crate::models::{AiringStatus, CatalogEntry, RelatedEntry, RelationType};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Genres that mark a title as adult regardless of its rating
pub const ADULT_GENRES: [&str; 3] = ["Hentai", "Ecchi", "Erotica"];

/// The `nsfw` rating of work-safe titles
const SAFE_RATING: &str = "white";

/// Builds [`CatalogEntry`] values and stores them in the cache
pub struct EntryNormalizer {
    client: Arc<MalClient>,
    anilist: AniListResolver,
    cache: AnimeCache,
}

impl EntryNormalizer {
    pub fn new(client: Arc<MalClient>, anilist: AniListResolver, cache: AnimeCache) -> Self {
        Self {
            client,
            anilist,
            cache,
        }
    }

    /// Normalize `raw` as of `today` and write the result to the id cache
    pub async fn normalize(&self, raw: &RawAnime, today: NaiveDate) -> Result<CatalogEntry> {
        let anime_id = raw.id.to_string();

        let status = raw.status.as_deref().unwrap_or_default();
        let airing_status = AiringStatus::from_mal(status).ok_or_else(|| {
            MalError::decode(
                format!("anime {anime_id}"),
                serde::de::Error::custom(format!("unknown airing status {status:?}")),
            )
        })?;

        let release_date = raw.start_date.as_deref().and_then(normalize_date);
        let end_date = raw.end_date.as_deref().and_then(normalize_date);
        let upcoming_episode_number = (airing_status == AiringStatus::Releasing)
            .then(|| upcoming_episode(release_date, today));

        let entry = CatalogEntry {
            cross_catalog_id: self.cross_catalog_id(raw.id).await,
            total_episodes: raw.num_episodes,
            is_adult_content: is_adult(raw.nsfw.as_deref(), &raw.genres),
            main_title: raw.title.clone(),
            synonyms: synonyms(raw.alternative_titles.as_ref()),
            airing_status,
            release_date,
            end_date,
            upcoming_episode_number,
            format: raw.media_type.as_deref().unwrap_or_default().to_uppercase(),
            related: self.related(raw).await,
            watched_episodes: None,
            watching_status: None,
        };

        self.cache.put(&anime_id, &entry)?;
        debug!(anime_id = %anime_id, title = %entry.main_title, "Normalized entry");

        Ok(entry)
    }

    async fn cross_catalog_id(&self, mal_id: u64) -> Option<i64> {
        match self.anilist.resolve(&self.client, mal_id).await {
            Ok(id) => id,
            Err(e) => {
                warn!(mal_id = mal_id, error = %e, "AniList lookup failed");
                None
            }
        }
    }

    /// Prequels and sequels with their current airing status
    async fn related(&self, raw: &RawAnime) -> Option<BTreeMap<String, RelatedEntry>> {
        let fetched;
        let edges = match &raw.related_anime {
            Some(edges) => edges,
            None => {
                fetched = self.status_and_relations(raw.id).await?.related_anime;
                &fetched
            }
        };

        let mut relations = BTreeMap::new();
        for (relation_type, edge) in qualifying_relations(edges) {
            let related_id = edge.node.id;
            let status = self
                .status_and_relations(related_id)
                .await
                .and_then(|info| info.status)
                .and_then(|s| AiringStatus::from_mal(&s));

            let Some(airing_status) = status else {
                warn!(anime_id = raw.id, related_id = related_id, "No status for related anime");
                continue;
            };

            relations.insert(
                related_id.to_string(),
                RelatedEntry {
                    main_title: edge.node.title.clone(),
                    airing_status,
                    relation_type,
                },
            );
        }

        (!relations.is_empty()).then_some(relations)
    }

    async fn status_and_relations(&self, anime_id: u64) -> Option<StatusAndRelations> {
        let endpoint = format!("anime/{anime_id}");
        let data = self
            .client
            .execute(
                HttpMethod::Get,
                &endpoint,
                Payload::params([("fields", RELATION_FIELDS)]),
                AuthMode::App,
            )
            .await;

        match data {
            Ok(Some(data)) => match serde_json::from_value(data) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(anime_id = anime_id, error = %e, "Malformed relation data");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(anime_id = anime_id, error = %e, "Failed to fetch relation data");
                None
            }
        }
    }
}

/// Adult if the rating is not work-safe or any genre is an adult genre
pub fn is_adult(nsfw: Option<&str>, genres: &[Genre]) -> bool {
    nsfw != Some(SAFE_RATING)
        || genres
            .iter()
            .any(|g| ADULT_GENRES.contains(&g.name.as_str()))
}

/// Parse `YYYY-MM-DD`, or `YYYY-MM` as the first of that month
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    let (year, month) = raw.split_once('-')?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

/// `ceil(days since release / 7) + 1`, clamped to at least 1.
///
/// A release date more than a week in the future would give 0 or less;
/// those cases return 1, as does an unknown release date.
pub fn upcoming_episode(release_date: Option<NaiveDate>, today: NaiveDate) -> u32 {
    let Some(release_date) = release_date else {
        return 1;
    };
    let days = (today - release_date).num_days();
    // Integer division truncates toward zero, which is the ceiling for
    // negative values
    let weeks = if days > 0 { (days + 6) / 7 } else { days / 7 };
    u32::try_from(weeks + 1).unwrap_or(0).max(1)
}

/// Japanese title, English title, then the synonyms, skipping nulls
pub fn synonyms(titles: Option<&AlternativeTitles>) -> Vec<String> {
    let Some(titles) = titles else {
        return Vec::new();
    };
    [titles.ja.clone(), titles.en.clone()]
        .into_iter()
        .chain(titles.synonyms.iter().cloned())
        .flatten()
        .collect()
}

/// Prequel and sequel edges, in their original order
pub fn qualifying_relations(edges: &[RelatedEdge]) -> Vec<(RelationType, &RelatedEdge)> {
    edges
        .iter()
        .filter_map(|edge| RelationType::parse(&edge.relation_type).map(|t| (t, edge)))
        .collect()
}
