//! Error types for the fetcher library.

use thiserror::Error;

/// Terminal failures surfaced by the request layer and the operations
/// built on it.
///
/// "Nothing found" is never an error: operations report it as `Ok(None)`
/// or an empty map.
#[derive(Debug, Error)]
pub enum MalError {
    /// The server rejected the credentials (401 without a refreshable
    /// token) or answered with a status the client does not handle.
    #[error("request to {url} rejected with status {status}")]
    Rejected { url: String, status: u16 },

    /// Every attempt hit a transient failure.
    #[error("request to {url} failed after {attempts} attempts")]
    RetryBudgetExceeded { url: String, attempts: u32 },

    /// No client id is configured for app-level requests.
    #[error("no MyAnimeList client id configured; run `mal-fetcher configure --client-id <ID>`")]
    MissingClientId,

    /// No user token is available for user-level requests.
    #[error("no MyAnimeList user token available; set {env_var} or run `mal-fetcher configure --access-token <TOKEN>`")]
    MissingToken { env_var: String },

    /// A refresh was needed but no refresh token is stored.
    #[error("no refresh token stored; cannot regenerate the access token")]
    MissingRefreshToken,

    /// A list status string outside the known vocabulary.
    #[error("invalid status option {0:?}; allowed options are ALL, CURRENT, PLANNING, COMPLETED, DROPPED, PAUSED, REPEATING")]
    InvalidStatus(String),

    /// A title needed by the operation could not be found.
    #[error("anime {0} not found")]
    NotFound(String),

    /// The HTTP layer failed before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response body did not have the expected shape.
    #[error("failed to decode response from {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing a persisted document failed.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl MalError {
    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, MalError>;
