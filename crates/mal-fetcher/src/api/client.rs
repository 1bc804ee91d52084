//! MyAnimeList API client with auth selection, retry and token refresh.

use super::credentials::CredentialProvider;
use super::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody};
use crate::error::{MalError, Result};
use serde_json::Value;
use shared::config::MalConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Which credential a request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `X-MAL-CLIENT-ID` header, for catalog-wide lookups
    App,
    /// Bearer token, for anything touching a user's list or profile
    User,
    /// No credential (secondary catalog)
    Anonymous,
}

/// Where a user token came from. Only persisted tokens are refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSource {
    Explicit,
    Environment,
    Persisted,
}

/// Request parameters: query string for GET, form body otherwise
#[derive(Debug, Clone)]
pub enum Payload {
    Params(Vec<(String, String)>),
    Json(Value),
}

impl Payload {
    pub fn params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Payload::Params(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn none() -> Self {
        Payload::Params(Vec::new())
    }
}

/// Retry and endpoint settings for [`MalClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub token_env_var: String,
    pub max_attempts: u32,
    pub default_retry_after: Duration,
}

impl From<&MalConfig> for ClientSettings {
    fn from(config: &MalConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token_env_var: config.token_env_var.clone(),
            max_attempts: config.max_attempts.max(1),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
        }
    }
}

/// Request executor for the MyAnimeList API v2
pub struct MalClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    settings: ClientSettings,
    explicit_token: Option<String>,
    /// One token regeneration at a time
    refresh_lock: Mutex<()>,
}

impl MalClient {
    /// Create a new client
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            transport,
            credentials,
            settings,
            explicit_token: None,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Use this bearer token for user-level requests
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.explicit_token = Some(token.into());
        self
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    /// Execute a request and unwrap the `data` envelope of the response.
    ///
    /// `Ok(None)` means the server answered 404.
    pub async fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: Payload,
        auth: AuthMode,
    ) -> Result<Option<Value>> {
        Ok(self
            .execute_raw(method, endpoint, payload, auth)
            .await?
            .map(unwrap_data))
    }

    /// Execute a request and return the whole response body
    pub async fn execute_raw(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: Payload,
        auth: AuthMode,
    ) -> Result<Option<Value>> {
        let url = self.url(endpoint);
        let mut user_token = match auth {
            AuthMode::User => Some(self.resolve_user_token()?),
            _ => None,
        };

        let mut attempts = 0;
        loop {
            let headers = self.auth_headers(auth, user_token.as_ref().map(|(t, _)| t.as_str()))?;
            let request = build_request(method, &url, &payload, headers);

            attempts += 1;
            debug!(method = method.as_str(), url = %url, attempt = attempts, "Making API request");

            match self.transport.send(&request).await {
                Ok(response) => match response.status {
                    200 => return parse_body(&url, &response).map(Some),
                    404 => {
                        info!(url = %url, "Not found");
                        return Ok(None);
                    }
                    429 => {
                        let delay = response
                            .retry_after
                            .map(Duration::from_secs)
                            .unwrap_or(self.settings.default_retry_after);
                        warn!(
                            url = %url,
                            delay_ms = delay.as_millis() as u64,
                            body = %response.body,
                            "Rate limit exceeded, waiting before retrying"
                        );
                        sleep(delay).await;
                    }
                    400 | 500 => {
                        warn!(
                            url = %url,
                            status = response.status,
                            body = %response.body,
                            "Request failed, retrying"
                        );
                    }
                    401 if matches!(user_token, Some((_, TokenSource::Persisted))) => {
                        info!(url = %url, "Access token expired, refreshing");
                        let token = self.regenerate().await?;
                        user_token = Some((token, TokenSource::Persisted));
                    }
                    status => {
                        warn!(url = %url, status = status, body = %response.body, "Request rejected");
                        return Err(MalError::Rejected { url, status });
                    }
                },
                Err(MalError::Transport(e)) => {
                    warn!(url = %url, error = %e, "Request error, retrying");
                }
                Err(e) => return Err(e),
            }

            if attempts >= self.settings.max_attempts {
                warn!(url = %url, attempts = attempts, "Maximum retries reached");
                return Err(MalError::RetryBudgetExceeded { url, attempts });
            }
            debug!(url = %url, attempt = attempts, "Retrying");
        }
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.settings.base_url,
                endpoint.trim_start_matches('/')
            )
        }
    }

    /// Explicit token, then the environment, then the persisted token
    fn resolve_user_token(&self) -> Result<(String, TokenSource)> {
        if let Some(token) = &self.explicit_token {
            return Ok((token.clone(), TokenSource::Explicit));
        }
        if let Ok(token) = std::env::var(&self.settings.token_env_var) {
            if !token.is_empty() {
                return Ok((token, TokenSource::Environment));
            }
        }
        Ok((self.credentials.persisted_token()?, TokenSource::Persisted))
    }

    async fn regenerate(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.credentials.regenerate_token().await
    }

    fn auth_headers(&self, auth: AuthMode, token: Option<&str>) -> Result<Vec<(String, String)>> {
        Ok(match (auth, token) {
            (AuthMode::User, Some(token)) => {
                vec![("Authorization".to_string(), format!("Bearer {token}"))]
            }
            (AuthMode::App, _) => {
                vec![("X-MAL-CLIENT-ID".to_string(), self.credentials.client_id()?)]
            }
            _ => Vec::new(),
        })
    }
}

fn build_request(
    method: HttpMethod,
    url: &str,
    payload: &Payload,
    headers: Vec<(String, String)>,
) -> HttpRequest {
    let (query, body) = match (method, payload) {
        (HttpMethod::Get, Payload::Params(params)) => (params.clone(), RequestBody::Empty),
        (_, Payload::Params(params)) if params.is_empty() => (Vec::new(), RequestBody::Empty),
        (_, Payload::Params(params)) => (Vec::new(), RequestBody::Form(params.clone())),
        (_, Payload::Json(value)) => (Vec::new(), RequestBody::Json(value.clone())),
    };

    HttpRequest {
        method,
        url: url.to_string(),
        query,
        headers,
        body,
    }
}

fn parse_body(url: &str, response: &HttpResponse) -> Result<Value> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| MalError::decode(url, e))
}

/// Return the `data` member of an object body, or the body itself
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
