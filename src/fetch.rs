use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION};
use tracing::{debug, warn};

use crate::config::Config;

/// Availability probe seam: a lightweight existence check for a computed
/// artifact URL. Split out of `Fetcher` so the assembler can be tested
/// without the network.
pub trait ArtifactProber {
    fn artifact_exists(&self, url: &str) -> impl std::future::Future<Output = bool> + Send;
}

/// HTTP front door for the whole pipeline: one client, browser-like
/// headers, bounded retries with exponential backoff.
pub struct Fetcher {
    client: reqwest::Client,
    retry_attempts: u32,
    retry_backoff: Duration,
    request_delay: Duration,
    errors: AtomicUsize,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Fetcher {
            client,
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            request_delay: Duration::from_millis(config.request_delay_ms),
            errors: AtomicUsize::new(0),
        })
    }

    /// Pages that stayed unreachable after all retries.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Fetch a page body. Retries transient failures with exponential
    /// backoff; exhausted retries surface as `None` ("page unavailable"),
    /// never as an error that could abort a conference loop.
    pub async fn fetch_page(&self, url: &str) -> Option<String> {
        for attempt in 0..self.retry_attempts {
            match self.try_get(url).await {
                Ok(body) => return Some(body),
                Err(e) => {
                    warn!(
                        "Fetch failed (attempt {}/{}) {}: {}",
                        attempt + 1,
                        self.retry_attempts,
                        url,
                        e
                    );
                    if attempt + 1 < self.retry_attempts {
                        tokio::time::sleep(self.retry_backoff * 2u32.pow(attempt)).await;
                    }
                }
            }
        }
        self.errors.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn try_get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Politeness pause between page fetches.
    pub async fn pause(&self) {
        tokio::time::sleep(self.request_delay).await;
    }

    /// Longer pause between conferences.
    pub async fn pause_for(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl ArtifactProber for Fetcher {
    /// HEAD probe: the artifact counts as real only on a 200 with a PDF
    /// content-type. Any failure (timeout, reset, 404) means unavailable.
    async fn artifact_exists(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                let is_pdf = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_lowercase().contains("pdf"))
                    .unwrap_or(false);
                response.status() == reqwest::StatusCode::OK && is_pdf
            }
            Err(e) => {
                debug!("Probe failed for {}: {}", url, e);
                false
            }
        }
    }
}
