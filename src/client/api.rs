use crate::cache::{CacheKey, Envelope, FetchResult, Fetcher};
use crate::error::TrawlError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the trawl API.
///
/// Requests carry the bearer session token when one is configured. Nothing is
/// retried here; retries belong to the cache triggers.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, TrawlError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrawlError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> FetchResult {
        self.send(Method::GET, path, None).await
    }

    /// Issue one request and decode the reply envelope into a bare value.
    #[instrument(skip(self, body))]
    pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> FetchResult {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request failed"
                );
                return Err(e.into());
            }
        };

        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        debug!(
            status = status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        trace!(response_bytes = bytes.len(), "Response body received");

        Envelope::decode(status, &bytes)?.into_result()
    }
}

#[async_trait]
impl Fetcher for ApiClient {
    async fn fetch(&self, key: &CacheKey) -> FetchResult {
        self.get(key.as_str()).await
    }
}
