//! Image retrieval
//!
//! Images reach the model as `data:` URLs. Retrieval tries, in order: decode
//! an inline source, fetch same-origin directly, fetch cross-origin through
//! the fetch proxy.

use async_trait::async_trait;
use pageguard_core::{DataUrl, Error, ImageInfo, PageLocation, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Budget for a single image download
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(4);

/// Direct resource retrieval
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<DataUrl>;
}

/// Cross-origin retrieval through a privileged broker
#[async_trait]
pub trait FetchProxy: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<DataUrl>;
}

/// Download `url` and wrap the body as a data URL
pub async fn fetch_as_data_url(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<DataUrl> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::network(format!(
            "fetch of {} failed with status {}",
            url,
            response.status()
        )));
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::network(e.to_string()))?;

    Ok(DataUrl::new(mime, bytes.to_vec()))
}

/// Plain HTTP GET
#[derive(Clone)]
pub struct HttpResourceFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpResourceFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ResourceFetcher for HttpResourceFetcher {
    async fn fetch(&self, url: &Url) -> Result<DataUrl> {
        fetch_as_data_url(&self.client, url.as_str(), self.timeout).await
    }
}

/// Fixed set of resources, with an optional fetcher for everything else
#[derive(Default)]
pub struct StaticResources {
    resources: HashMap<String, DataUrl>,
    fallback: Option<Arc<dyn ResourceFetcher>>,
}

impl StaticResources {
    pub fn new(resources: HashMap<String, DataUrl>) -> Self {
        Self {
            resources,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ResourceFetcher>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl ResourceFetcher for StaticResources {
    async fn fetch(&self, url: &Url) -> Result<DataUrl> {
        if let Some(data) = self.resources.get(url.as_str()) {
            return Ok(data.clone());
        }
        match &self.fallback {
            Some(fallback) => fallback.fetch(url).await,
            None => Err(Error::network(format!("no resource recorded for {}", url))),
        }
    }
}

/// Fetch-proxy request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchImageRequest {
    pub url: String,
}

/// Fetch-proxy response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchImageResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchImageResponse {
    pub fn ok(data: &DataUrl) -> Self {
        Self {
            success: true,
            data_url: Some(data.encode()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data_url: None,
            error: Some(error.into()),
        }
    }

    /// Decode into image bytes or a network failure
    pub fn into_data_url(self) -> Result<DataUrl> {
        match (self.success, self.data_url) {
            (true, Some(data)) => DataUrl::parse(&data),
            (true, None) => Err(Error::network("fetch proxy returned no data")),
            (false, _) => Err(Error::network(
                self.error.unwrap_or_else(|| "fetch proxy failed".to_string()),
            )),
        }
    }
}

/// Client for the broker's `POST /fetch-image`
#[derive(Clone)]
pub struct HttpFetchProxy {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFetchProxy {
    /// `base_url` is the broker root, e.g. `http://127.0.0.1:7878`
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/fetch-image", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl FetchProxy for HttpFetchProxy {
    async fn fetch_image(&self, url: &str) -> Result<DataUrl> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&FetchImageRequest { url: url.to_string() })
            .send()
            .await
            .map_err(|e| Error::network(format!("fetch proxy unreachable: {}", e)))?;

        let body: FetchImageResponse = response
            .json()
            .await
            .map_err(|e| Error::network(format!("malformed fetch proxy response: {}", e)))?;

        body.into_data_url()
    }
}

/// Retrieval strategy chain for images
pub struct ImageLoader {
    direct: Arc<dyn ResourceFetcher>,
    proxy: Option<Arc<dyn FetchProxy>>,
}

impl ImageLoader {
    pub fn new(direct: Arc<dyn ResourceFetcher>) -> Self {
        Self { direct, proxy: None }
    }

    pub fn with_proxy(mut self, proxy: Arc<dyn FetchProxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Retrieve the image bytes for `info` on the page at `location`.
    ///
    /// Fails with [`Error::NetworkFailure`] when every strategy fails or
    /// the payload is not an image.
    pub async fn load(&self, location: &PageLocation, info: &ImageInfo) -> Result<DataUrl> {
        let source = info
            .resolved_source()
            .ok_or_else(|| Error::network("image has no source"))?;

        let data = if info.is_inline() {
            DataUrl::parse(source)?
        } else {
            self.fetch_remote(location, source).await?
        };

        if !data.is_image() {
            return Err(Error::network(format!("{} is not an image ({})", source, data.mime)));
        }
        Ok(data)
    }

    async fn fetch_remote(&self, location: &PageLocation, source: &str) -> Result<DataUrl> {
        let url = location
            .resolve(source)
            .map_err(|e| Error::network(format!("unresolvable image source {}: {}", source, e)))?;

        let same_origin = location.is_same_origin(url.as_str());
        if same_origin || self.proxy.is_none() {
            match self.direct.fetch(&url).await {
                Ok(data) => return Ok(data),
                Err(e) => debug!(%url, same_origin, "Direct image fetch failed: {}", e),
            }
        }

        match &self.proxy {
            Some(proxy) => proxy.fetch_image(url.as_str()).await,
            None => Err(Error::network(format!("all retrieval strategies failed for {}", url))),
        }
    }
}
