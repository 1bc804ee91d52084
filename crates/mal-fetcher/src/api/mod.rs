//! MyAnimeList API v2 client implementation.
//!
//! This module provides the request executor (auth selection, retry and
//! token refresh), the transport seam it sends through, credentials, the
//! AniList id resolver and the raw response types.

pub mod anilist;
pub mod client;
pub mod credentials;
pub mod transport;
pub mod types;

pub use anilist::AniListResolver;
pub use client::{AuthMode, ClientSettings, MalClient, Payload};
pub use credentials::{CredentialProvider, StoredCredentials};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::*;
