//! Credential provider backed by the `config` document.
//!
//! Holds the app client id and the user's OAuth tokens. Regenerating the
//! access token exchanges the stored refresh token at the OAuth endpoint
//! and persists the result.

use super::transport::{HttpMethod, HttpRequest, HttpTransport, RequestBody};
use super::types::TokenResponse;
use crate::error::{MalError, Result};
use crate::store::{DocumentStore, CONFIG};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const CLIENT_ID_KEY: &str = "myanimelist_client_id";
pub const USER_TOKEN_KEY: &str = "myanimelist_user_token";
pub const REFRESH_TOKEN_KEY: &str = "myanimelist_refresh_token";

/// Supplies credentials to the request executor
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Client id sent with app-level requests
    fn client_id(&self) -> Result<String>;

    /// The locally persisted user token
    fn persisted_token(&self) -> Result<String>;

    /// Obtain and persist a fresh user token
    async fn regenerate_token(&self) -> Result<String>;
}

/// Credentials stored in the `config` document
pub struct StoredCredentials {
    store: Arc<DocumentStore>,
    transport: Arc<dyn HttpTransport>,
    oauth_url: String,
    env_var: String,
}

impl StoredCredentials {
    pub fn new(
        store: Arc<DocumentStore>,
        transport: Arc<dyn HttpTransport>,
        oauth_url: impl Into<String>,
        env_var: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            oauth_url: oauth_url.into(),
            env_var: env_var.into(),
        }
    }

    /// Store any of the given values, keeping the rest of the document
    pub fn configure(
        &self,
        client_id: Option<&str>,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        let mut update = serde_json::Map::new();
        if let Some(id) = client_id {
            update.insert(CLIENT_ID_KEY.to_string(), json!(id));
        }
        if let Some(token) = access_token {
            update.insert(USER_TOKEN_KEY.to_string(), json!(token));
        }
        if let Some(token) = refresh_token {
            update.insert(REFRESH_TOKEN_KEY.to_string(), json!(token));
        }
        if update.is_empty() {
            return Ok(());
        }

        self.store.write(CONFIG, &Value::Object(update), true)?;
        info!("Credentials updated");
        Ok(())
    }

    fn stored(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .read_object(CONFIG)?
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }
}

#[async_trait]
impl CredentialProvider for StoredCredentials {
    fn client_id(&self) -> Result<String> {
        self.stored(CLIENT_ID_KEY)?.ok_or(MalError::MissingClientId)
    }

    fn persisted_token(&self) -> Result<String> {
        self.stored(USER_TOKEN_KEY)?.ok_or_else(|| MalError::MissingToken {
            env_var: self.env_var.clone(),
        })
    }

    async fn regenerate_token(&self) -> Result<String> {
        let refresh_token = self
            .stored(REFRESH_TOKEN_KEY)?
            .ok_or(MalError::MissingRefreshToken)?;
        let client_id = self.client_id()?;

        info!("Regenerating MyAnimeList access token");
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.oauth_url.clone(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Form(vec![
                ("client_id".to_string(), client_id),
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("refresh_token".to_string(), refresh_token),
            ]),
        };

        let response = self.transport.send(&request).await?;
        if response.status != 200 {
            warn!(status = response.status, "Token refresh rejected");
            return Err(MalError::Rejected {
                url: self.oauth_url.clone(),
                status: response.status,
            });
        }

        let tokens: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| MalError::decode("token refresh", e))?;

        self.configure(
            None,
            Some(&tokens.access_token),
            tokens.refresh_token.as_deref(),
        )?;
        info!(expires_in = ?tokens.expires_in, "Access token regenerated");

        Ok(tokens.access_token)
    }
}
