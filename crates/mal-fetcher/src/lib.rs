//! MAL Fetcher library for MyAnimeList metadata and list status.
//!
//! Raw API records are normalized into [`CatalogEntry`] values, cached on
//! disk and kept fresh by a daily reconciliation pass.

pub mod api;
pub mod cache;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod store;

pub use api::{AniListResolver, AuthMode, MalClient, ReqwestTransport, StoredCredentials};
pub use cache::AnimeCache;
pub use error::{MalError, Result};
pub use fetcher::{MalFetcher, ProgressUpdate, StatusFilter};
pub use models::{AiringStatus, CatalogEntry, RelatedEntry, RelationType, WatchingStatus};
pub use reconcile::{ReconcileOutcome, RefreshSource};
pub use store::DocumentStore;
