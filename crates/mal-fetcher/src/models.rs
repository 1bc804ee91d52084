//! Canonical entry schema stored in the cache.
//!
//! Field names are the persisted document keys; the status enums serialize
//! to the uppercase vocabulary (FINISHED, RELEASING, CURRENT, ...).

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Normalized anime entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// AniList id for the same title
    #[serde(rename = "al_id")]
    pub cross_catalog_id: Option<i64>,

    #[serde(rename = "total_eps")]
    pub total_episodes: Option<u32>,

    #[serde(rename = "is_sus")]
    pub is_adult_content: bool,

    pub main_title: String,

    #[serde(default)]
    pub synonyms: Vec<String>,

    #[serde(rename = "status")]
    pub airing_status: AiringStatus,

    #[serde(default, deserialize_with = "lenient_date")]
    pub release_date: Option<NaiveDate>,

    #[serde(default, deserialize_with = "lenient_date")]
    pub end_date: Option<NaiveDate>,

    /// Next episode number; only set while the title is airing
    #[serde(rename = "upcoming_ep", default)]
    pub upcoming_episode_number: Option<u32>,

    pub format: String,

    #[serde(default)]
    pub related: Option<BTreeMap<String, RelatedEntry>>,

    /// Only present when fetched from a user's list
    #[serde(rename = "watched_ep", default, skip_serializing_if = "Option::is_none")]
    pub watched_episodes: Option<u32>,

    /// Only present when fetched from a user's list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watching_status: Option<WatchingStatus>,
}

/// A prequel or sequel of a cached title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntry {
    pub main_title: String,
    #[serde(rename = "status")]
    pub airing_status: AiringStatus,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
}

/// Broadcast lifecycle of a title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiringStatus {
    Finished,
    Releasing,
    NotYetReleased,
}

impl AiringStatus {
    /// Parse the MyAnimeList airing status vocabulary
    pub fn from_mal(status: &str) -> Option<Self> {
        match status {
            "finished_airing" => Some(Self::Finished),
            "currently_airing" => Some(Self::Releasing),
            "not_yet_aired" => Some(Self::NotYetReleased),
            _ => None,
        }
    }

    pub fn as_mal(&self) -> &'static str {
        match self {
            Self::Finished => "finished_airing",
            Self::Releasing => "currently_airing",
            Self::NotYetReleased => "not_yet_aired",
        }
    }
}

/// A user's list categorization for a title
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchingStatus {
    Current,
    Completed,
    Paused,
    Dropped,
    Planning,
}

impl WatchingStatus {
    /// Parse the MyAnimeList list status vocabulary
    pub fn from_mal(status: &str) -> Option<Self> {
        match status {
            "watching" => Some(Self::Current),
            "completed" => Some(Self::Completed),
            "on_hold" => Some(Self::Paused),
            "dropped" => Some(Self::Dropped),
            "plan_to_watch" => Some(Self::Planning),
            _ => None,
        }
    }

    pub fn as_mal(&self) -> &'static str {
        match self {
            Self::Current => "watching",
            Self::Completed => "completed",
            Self::Paused => "on_hold",
            Self::Dropped => "dropped",
            Self::Planning => "plan_to_watch",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "CURRENT",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
            Self::Dropped => "DROPPED",
            Self::Planning => "PLANNING",
        }
    }
}

impl std::fmt::Display for WatchingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation kinds kept on an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationType {
    Prequel,
    Sequel,
}

impl RelationType {
    /// Case-insensitive parse; every other relation kind is `None`
    pub fn parse(relation: &str) -> Option<Self> {
        match relation.to_ascii_uppercase().as_str() {
            "PREQUEL" => Some(Self::Prequel),
            "SEQUEL" => Some(Self::Sequel),
            _ => None,
        }
    }
}

/// Read an optional `YYYY-MM-DD` date; anything unparsable becomes `None`.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
}
