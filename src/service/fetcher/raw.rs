//! Raw fetcher - server-delivered HTML without JavaScript execution.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Instant;
use url::Url;

use super::Fetcher;
use crate::domain::models::{FetchResult, HttpErrorPolicy, JobSettings};
use crate::error::{AppError, Result};
use crate::service::http::create_client;

/// Fetches URLs with a plain HTTP request.
///
/// Follows redirects, records the final URL and status code and returns the
/// response body verbatim. Represents what non-JS crawlers and AI tools see.
pub struct RawHtmlFetcher {
    client: Client,
    timeout_secs: u64,
    http_error_policy: HttpErrorPolicy,
}

impl RawHtmlFetcher {
    pub fn new(settings: &JobSettings) -> Result<Self> {
        let client = create_client(settings.effective_user_agent(), settings.timeout())?;
        Ok(Self {
            client,
            timeout_secs: settings.timeout_secs,
            http_error_policy: settings.http_error_policy,
        })
    }
}

#[async_trait]
impl Fetcher for RawHtmlFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResult> {
        log::debug!("[RAW] Fetching {}", url);
        let start = Instant::now();

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::transport(format!("Timeout after {}s", self.timeout_secs))
            } else if e.is_connect() {
                AppError::transport(format!("Connection failed: {e}"))
            } else {
                AppError::transport(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if self.http_error_policy == HttpErrorPolicy::Fail && status >= 400 {
            return Err(AppError::transport(format!(
                "HTTP status {status} for {final_url}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::transport(format!("Failed to read response body: {e}")))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        log::debug!(
            "[RAW] {} -> {} ({} bytes in {}ms)",
            url,
            status,
            body.len(),
            elapsed_ms
        );

        Ok(FetchResult {
            final_url,
            status: Some(status),
            body,
            elapsed_ms,
        })
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}
