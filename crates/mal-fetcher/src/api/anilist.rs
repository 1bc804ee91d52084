//! AniList id lookup for MyAnimeList titles.

use super::client::{AuthMode, MalClient, Payload};
use super::transport::HttpMethod;
use super::types::AniListMediaData;
use crate::error::{MalError, Result};
use serde_json::json;
use tracing::debug;

const MEDIA_BY_MAL_ID: &str = r#"
query ($malId: Int) {
    Media(idMal: $malId, type: ANIME) {
        id
    }
}
"#;

/// Resolves MyAnimeList ids to AniList ids
pub struct AniListResolver {
    url: String,
}

impl AniListResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// AniList id of the title, `None` if AniList has no mapping
    pub async fn resolve(&self, client: &MalClient, mal_id: u64) -> Result<Option<i64>> {
        let body = json!({
            "query": MEDIA_BY_MAL_ID,
            "variables": { "malId": mal_id },
        });

        let Some(data) = client
            .execute(HttpMethod::Post, &self.url, Payload::Json(body), AuthMode::Anonymous)
            .await?
        else {
            debug!(mal_id = mal_id, "No AniList mapping");
            return Ok(None);
        };

        if data.is_null() {
            return Ok(None);
        }
        let data: AniListMediaData =
            serde_json::from_value(data).map_err(|e| MalError::decode("AniList lookup", e))?;

        Ok(data.media.map(|m| m.id))
    }
}
