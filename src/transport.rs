// Transport seam between the search client and upstream providers.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::{ClientConfig, ProviderConfig},
    error::SearchError,
};

const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Places,
    Business,
    Menu,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Places => "places",
            ProviderKind::Business => "business",
            ProviderKind::Menu => "menu",
        };
        f.write_str(name)
    }
}

// A single GET against a provider. `path` is relative to the provider base url.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub provider: ProviderKind,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ProviderRequest {
    pub fn new(provider: ProviderKind, path: impl Into<String>) -> Self {
        Self {
            provider,
            path: path.into(),
            query: vec![],
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// Never prints the api key.
impl fmt::Display for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.provider, self.path)?;
        let params: Vec<String> = self
            .query
            .iter()
            .filter(|(k, _)| k != "key")
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if !params.is_empty() {
            write!(f, "?{}", params.join("&"))?;
        }
        Ok(())
    }
}

// Image bytes relayed from the places provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoData {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get_json(&self, request: &ProviderRequest) -> Result<Value, SearchError>;

    // The places key stays on the server, callers only ever see the reference.
    async fn get_photo(&self, reference: &str, max_width: u32) -> Result<PhotoData, SearchError>;
}

pub fn photo_request(reference: &str, max_width: u32) -> ProviderRequest {
    ProviderRequest::new(ProviderKind::Places, "photo")
        .param("maxwidth", max_width)
        .param("photo_reference", reference)
}

pub struct HttpTransport {
    client: reqwest::Client,
    places: ProviderConfig,
    business: ProviderConfig,
    menu: ProviderConfig,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("restaurant-search/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .timeout(config.timeout())
            .build()
            .map_err(|e| SearchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            places: config.places.clone(),
            business: config.business.clone(),
            menu: config.menu.clone(),
            timeout: config.timeout(),
        })
    }

    fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Places => &self.places,
            ProviderKind::Business => &self.business,
            ProviderKind::Menu => &self.menu,
        }
    }
}

impl HttpTransport {
    // Sends the request with credentials attached and maps non-2xx to ApiError.
    async fn send(&self, request: &ProviderRequest) -> Result<reqwest::Response, SearchError> {
        let provider = self.provider(request.provider);
        if !provider.is_configured() {
            return Err(SearchError::NotConfigured(request.provider.to_string()));
        }

        let url = format!("{}/{}", provider.base_url, request.path.trim_start_matches('/'));
        debug!("GET {request}");

        // places takes the key as a query parameter, the others as a bearer token
        let builder = self.client.get(&url).query(&request.query);
        let builder = match request.provider {
            ProviderKind::Places => builder.query(&[("key", provider.api_key.as_str())]),
            ProviderKind::Business | ProviderKind::Menu => builder.bearer_auth(&provider.api_key),
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| self.transport_error(request, e, SearchError::Network))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let end = body
                .char_indices()
                .nth(MAX_ERROR_BODY)
                .map(|(i, _)| i)
                .unwrap_or(body.len());
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message: body[..end].to_string(),
            });
        }
        Ok(resp)
    }

    fn transport_error(
        &self,
        request: &ProviderRequest,
        e: reqwest::Error,
        otherwise: fn(String) -> SearchError,
    ) -> SearchError {
        if e.is_timeout() {
            SearchError::Timeout(self.timeout.as_millis() as u64)
        } else {
            otherwise(format!("{request}: {e}"))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, request: &ProviderRequest) -> Result<Value, SearchError> {
        let resp = self.send(request).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| self.transport_error(request, e, SearchError::Decode))
    }

    async fn get_photo(&self, reference: &str, max_width: u32) -> Result<PhotoData, SearchError> {
        let request = photo_request(reference, max_width);
        let resp = self.send(&request).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error(&request, e, SearchError::Network))?;

        Ok(PhotoData {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
