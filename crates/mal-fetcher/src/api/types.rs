//! MyAnimeList API v2 response types.
//!
//! These types represent the JSON bodies returned by the MAL API after the
//! `data` envelope has been removed.

use serde::{Deserialize, Serialize};

/// Fields requested on every title and list call
pub const ANIME_FIELDS: &str = "id,title,alternative_titles,start_date,end_date,nsfw,media_type,status,genres,my_list_status,num_episodes,related_anime";

/// Fields requested when only the status and relations are needed
pub const RELATION_FIELDS: &str = "status,related_anime";

/// List and search results: `[{ "node": {...} }, ...]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeWrapper<T> {
    pub node: T,
}

/// Paged response as returned before envelope removal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    pub data: Vec<NodeWrapper<T>>,
    #[serde(default)]
    pub paging: Paging,
}

/// Paging links of a list response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Full anime record as requested with [`ANIME_FIELDS`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAnime {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub alternative_titles: Option<AlternativeTitles>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub nsfw: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub my_list_status: Option<MyListStatus>,
    #[serde(default)]
    pub num_episodes: Option<u32>,
    /// `None` when the field was not part of the response
    #[serde(default)]
    pub related_anime: Option<Vec<RelatedEdge>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlternativeTitles {
    #[serde(default)]
    pub synonyms: Vec<Option<String>>,
    #[serde(default)]
    pub en: Option<String>,
    #[serde(default)]
    pub ja: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    #[serde(default)]
    pub id: Option<u32>,
    pub name: String,
}

/// The authenticated user's list state for a title
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyListStatus {
    pub status: String,
    #[serde(default)]
    pub num_episodes_watched: u32,
}

/// One edge of the relation graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedEdge {
    pub node: RelatedNode,
    pub relation_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedNode {
    pub id: u64,
    pub title: String,
}

/// Response of the `fields=status,related_anime` lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusAndRelations {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub related_anime: Vec<RelatedEdge>,
}

/// Search hit; only the id is used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: u64,
}

/// Authenticated user profile from `users/@me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// OAuth token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// AniList `Media(idMal: ...)` lookup after envelope removal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AniListMediaData {
    #[serde(rename = "Media")]
    pub media: Option<AniListMedia>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AniListMedia {
    pub id: i64,
}
