//! HTTP transport seam.
//!
//! The request executor builds [`HttpRequest`]s and classifies the
//! [`HttpResponse`]s; the transport only moves bytes. Tests swap in a
//! scripted transport.

use crate::error::{MalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// HTTP verbs the client issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
        }
    }
}

/// Request body variants
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// A fully built request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The parts of a response the executor looks at
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `retry-after` header, in seconds
    pub retry_after: Option<u64>,
    pub body: String,
}

/// Sends requests over the wire
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mal-fetcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MalError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Json(value) => builder.json(value),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| MalError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| MalError::Transport(e.to_string()))?;

        debug!(
            method = request.method.as_str(),
            url = %request.url,
            status = status,
            "Received response"
        );

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for exercising the executor without a network.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One scripted reply
    pub struct Reply {
        pub status: u16,
        pub retry_after: Option<u64>,
        pub body: String,
    }

    impl Reply {
        pub fn json(status: u16, body: serde_json::Value) -> Self {
            Self {
                status,
                retry_after: None,
                body: body.to_string(),
            }
        }

        pub fn status(status: u16) -> Self {
            Self {
                status,
                retry_after: None,
                body: "{}".to_string(),
            }
        }

        pub fn rate_limited(retry_after: Option<u64>) -> Self {
            Self {
                status: 429,
                retry_after,
                body: r#"{"error":"too_many_requests"}"#.to_string(),
            }
        }
    }

    type Route = (String, VecDeque<Reply>);

    /// Answers requests from per-URL queues and records every request.
    ///
    /// Routes match when the request URL ends with the route suffix; the
    /// longest matching suffix wins. A route with one reply left keeps
    /// answering with it.
    #[derive(Default)]
    pub struct ScriptedTransport {
        routes: Mutex<Vec<Route>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(self, suffix: &str, replies: Vec<Reply>) -> Self {
            self.routes
                .lock()
                .unwrap()
                .push((suffix.to_string(), replies.into()));
            self
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn count(&self, suffix: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.ends_with(suffix))
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());

            let mut routes = self.routes.lock().unwrap();
            let route = routes
                .iter_mut()
                .filter(|(suffix, _)| request.url.ends_with(suffix.as_str()))
                .max_by_key(|(suffix, _)| suffix.len());

            let Some((_, replies)) = route else {
                return Ok(HttpResponse {
                    status: 404,
                    retry_after: None,
                    body: "{}".to_string(),
                });
            };

            let reply = if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().map(|r| Reply {
                    status: r.status,
                    retry_after: r.retry_after,
                    body: r.body.clone(),
                })
            };

            match reply {
                Some(reply) => Ok(HttpResponse {
                    status: reply.status,
                    retry_after: reply.retry_after,
                    body: reply.body,
                }),
                None => Err(MalError::Transport("connection refused".to_string())),
            }
        }
    }
}
