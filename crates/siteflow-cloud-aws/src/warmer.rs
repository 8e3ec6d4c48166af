//! HTTP cache warmer

use async_trait::async_trait;
use siteflow_cloud::provider::CacheWarmer;
use siteflow_cloud::{CloudError, Result};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches pages through the CDN so edge caches are populated
pub struct HttpWarmer {
    client: reqwest::Client,
}

impl HttpWarmer {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("siteflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CloudError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CacheWarmer for HttpWarmer {
    async fn warm(&self, url: &str) -> Result<u16> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                CloudError::Transient(format!("GET {}: {}", url, e))
            } else {
                CloudError::ApiError(format!("GET {}: {}", url, e))
            }
        })?;
        Ok(response.status().as_u16())
    }
}
