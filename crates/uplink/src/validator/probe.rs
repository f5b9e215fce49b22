//! Outbound HTTP probing.

use anyhow::{anyhow, Result};
use std::time::Duration;

/// Performs a single request against a target
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Issue one GET to `url` and return the response status code.
    ///
    /// Transport failures (DNS, refused, timeout, TLS) are errors.
    async fn fetch(&self, url: &str) -> Result<u16>;
}

/// reqwest-backed prober. No retries, redirects are followed.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // Probes measure direct reachability of the target
            .no_proxy()
            .user_agent(concat!("uplink-validator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn fetch(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        Ok(response.status().as_u16())
    }
}
