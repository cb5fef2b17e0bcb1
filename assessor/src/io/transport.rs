//! Transport abstraction for the assessment backend.
//!
//! The [`Transport`] trait decouples session orchestration from HTTP. It
//! covers the three primitives the backend contract needs: fetching the
//! quality model, the one-shot start call, and opening a push subscription.
//! Tests use a scripted transport that feeds frames from in-memory queues.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::types::{StartRequest, StartResponse};
use crate::error::TransportError;
use crate::io::sse::message_stream;

/// Raw `message` payloads of one push subscription, in arrival order.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Abstraction over the backend's request/response and server-push primitives.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetch the raw quality model document.
    async fn fetch_quality_model(&self) -> Result<Value, TransportError>;

    /// Issue the start call.
    async fn start_assessment(
        &self,
        request: &StartRequest,
    ) -> Result<StartResponse, TransportError>;

    /// Open a push subscription. Dropping the stream releases the subscription.
    async fn subscribe(&self, endpoint: &str) -> Result<FrameStream, TransportError>;
}

/// Transport speaking JSON over HTTP and `text/event-stream` for channels.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|_| TransportError::InvalidUrl(base_url.to_string()))?;
        // No overall request timeout: channel bodies stay open indefinitely.
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `endpoint` against the base URL.
    pub fn resolve(&self, endpoint: &str) -> Result<Url, TransportError> {
        resolve_endpoint(&self.base_url, endpoint)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_quality_model(&self) -> Result<Value, TransportError> {
        let url = self.resolve("quality-model")?;
        debug!(url = %url, "fetching quality model");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    #[instrument(skip_all, fields(goals = request.selected_goals.len()))]
    async fn start_assessment(
        &self,
        request: &StartRequest,
    ) -> Result<StartResponse, TransportError> {
        let url = self.resolve("assessments")?;
        info!(url = %url, "posting start request");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<StartResponse>().await?)
    }

    async fn subscribe(&self, endpoint: &str) -> Result<FrameStream, TransportError> {
        let url = self.resolve(endpoint)?;
        debug!(url = %url, "opening event stream");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;
        Ok(message_stream(response.bytes_stream()).boxed())
    }
}

/// Resolve an endpoint from a start response or a default path.
///
/// Absolute URLs are taken as-is, `/`-rooted paths resolve against the base
/// origin, and anything else is appended below the base path.
pub fn resolve_endpoint(base: &Url, endpoint: &str) -> Result<Url, TransportError> {
    let invalid = || TransportError::InvalidUrl(endpoint.to_string());
    if let Ok(url) = Url::parse(endpoint) {
        return Ok(url);
    }
    if endpoint.starts_with('/') {
        return base.join(endpoint).map_err(|_| invalid());
    }
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let path = format!("{}/", dir.path());
        dir.set_path(&path);
    }
    dir.join(endpoint).map_err(|_| invalid())
}
