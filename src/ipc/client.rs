use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::decision::{Interaction, Outcome};
use crate::error::{RelayError, Result};
use crate::session::SessionRecord;

use super::{BindRequest, BindResponse, ErrorBody, LifecycleEvent, LivenessResponse};

/// HTTP client for the daemon's loopback API.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Build a URL from path segments. Segments are percent-encoded, so a
    /// target such as `%3` survives the trip.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| RelayError::Ipc {
            reason: format!("invalid daemon url {}: {}", self.base_url, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| RelayError::Ipc {
                reason: format!("daemon url {} cannot take a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<B, T>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(segments)?;
        let mut request = self.http.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                RelayError::DaemonUnavailable {
                    url: self.base_url.clone(),
                }
            } else if e.is_timeout() {
                RelayError::Ipc {
                    reason: format!("request to {url} timed out"),
                }
            } else {
                RelayError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let error = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_else(|_| status.to_string());
        if status == StatusCode::NOT_FOUND {
            if let ["api", "pending", id, ..] = segments {
                return Err(RelayError::RequestNotFound { id: id.to_string() });
            }
        }
        Err(RelayError::Ipc {
            reason: format!("{status}: {error}"),
        })
    }

    pub async fn health(&self) -> Result<()> {
        self.call::<(), serde_json::Value>(Method::GET, &["health"], None)
            .await
            .map(|_| ())
    }

    /// Signal that a new pending request exists.
    pub async fn process(&self, id: &str) -> Result<()> {
        self.call::<(), serde_json::Value>(Method::POST, &["api", "pending", id, "process"], None)
            .await
            .map(|_| ())
    }

    pub async fn resolve(&self, id: &str, interaction: &Interaction) -> Result<Outcome> {
        self.call(
            Method::POST,
            &["api", "pending", id, "resolve"],
            Some(interaction),
        )
        .await
    }

    pub async fn post_event(&self, event: &LifecycleEvent) -> Result<()> {
        self.call::<_, serde_json::Value>(Method::POST, &["api", "events"], Some(event))
            .await
            .map(|_| ())
    }

    pub async fn bind(&self, request: &BindRequest) -> Result<BindResponse> {
        self.call(Method::POST, &["api", "bindings"], Some(request))
            .await
    }

    pub async fn unbind(&self, target: &str) -> Result<()> {
        self.call::<(), serde_json::Value>(Method::DELETE, &["api", "bindings", target], None)
            .await
            .map(|_| ())
    }

    pub async fn sessions(&self) -> Result<Vec<SessionRecord>> {
        self.call::<(), _>(Method::GET, &["api", "sessions"], None)
            .await
    }

    pub async fn alive(&self, session_id: &str) -> Result<LivenessResponse> {
        self.call::<(), _>(Method::GET, &["api", "sessions", session_id, "alive"], None)
            .await
    }
}
