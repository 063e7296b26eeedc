//! Job orchestration: fetch both variants, extract, diff, aggregate.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use url::Url;

use crate::domain::models::{JobResult, JobSettings, UrlAnalysis};
use crate::error::{AppError, Result};
use crate::extractor::ContentExtractor;
use crate::service::differ::ContentDiffer;
use crate::service::fetcher::{Fetcher, RawHtmlFetcher, RenderedFetcher};

/// Per-URL pipeline states, used for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlStage {
    Pending,
    Fetching,
    Extracting,
    Diffing,
    Succeeded,
    Failed,
}

impl UrlStage {
    fn as_str(&self) -> &'static str {
        match self {
            UrlStage::Pending => "pending",
            UrlStage::Fetching => "fetching",
            UrlStage::Extracting => "extracting",
            UrlStage::Diffing => "diffing",
            UrlStage::Succeeded => "succeeded",
            UrlStage::Failed => "failed",
        }
    }
}

/// Orchestrates the full pipeline for a batch of URLs.
///
/// Concurrency is bounded by a semaphore; the two fetches of one URL run
/// concurrently with each other. Any per-URL error becomes a failed
/// [`UrlAnalysis`] and never aborts the job. A single attempt per URL per
/// variant; retries are a caller-level concern.
#[derive(Clone)]
pub struct JobRunner {
    raw_fetcher: Arc<dyn Fetcher>,
    rendered_fetcher: Arc<dyn Fetcher>,
    extractor: ContentExtractor,
    differ: ContentDiffer,
    settings: JobSettings,
}

impl JobRunner {
    /// Build a runner with the real fetchers. Launching the rendering
    /// backend can fail; that failure is fatal and surfaces here, before
    /// any URL is processed.
    pub fn new(settings: JobSettings) -> Result<Self> {
        let raw = RawHtmlFetcher::new(&settings)?;
        let rendered = RenderedFetcher::launch(&settings)?;
        Ok(Self::with_fetchers(
            Arc::new(raw),
            Arc::new(rendered),
            settings,
        ))
    }

    /// Build a runner over arbitrary fetch capabilities. Tests use this to
    /// substitute mock transports.
    pub fn with_fetchers(
        raw_fetcher: Arc<dyn Fetcher>,
        rendered_fetcher: Arc<dyn Fetcher>,
        settings: JobSettings,
    ) -> Self {
        Self {
            raw_fetcher,
            rendered_fetcher,
            extractor: ContentExtractor::new(settings.strip_consent_banners),
            differ: ContentDiffer::new(),
            settings,
        }
    }

    /// Process every URL to a terminal state and aggregate the job report.
    ///
    /// Input is trimmed and deduplicated; results keep input order. The
    /// cancel flag stops URLs that have not started yet; in-flight URLs
    /// run to completion.
    pub async fn run(&self, urls: &[String], cancel: Arc<AtomicBool>) -> JobResult {
        let started_at = Utc::now();

        let mut seen = HashSet::new();
        let mut queue: Vec<String> = Vec::new();
        for url in urls {
            let trimmed = url.trim();
            if !trimmed.is_empty() && seen.insert(trimmed.to_string()) {
                queue.push(trimmed.to_string());
            }
        }

        log::info!(
            "[JOB] Starting job: {} URLs ({} after dedup), concurrency {}, timeout {}s, wait strategy {}",
            urls.len(),
            queue.len(),
            self.settings.max_concurrency,
            self.settings.timeout_secs,
            self.settings.wait_strategy.as_str()
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(queue.len());
        for url in &queue {
            let runner = self.clone();
            let url = url.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                log::trace!("[JOB] {} {}", url, UrlStage::Pending.as_str());
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("job semaphore is never closed");
                if cancel.load(Ordering::Relaxed) {
                    log::warn!("[JOB] {} skipped: job cancelled", url);
                    return UrlAnalysis::failed(url, "Job cancelled before processing started");
                }
                runner.process_url(url).await
            }));
        }

        let joined = futures::future::join_all(handles).await;
        let mut results = Vec::with_capacity(queue.len());
        for (url, outcome) in queue.iter().zip(joined) {
            match outcome {
                Ok(analysis) => results.push(analysis),
                Err(e) => {
                    log::error!("[JOB] {} worker task died: {}", url, e);
                    results.push(UrlAnalysis::failed(
                        url.clone(),
                        format!("Unexpected task failure: {e}"),
                    ));
                }
            }
        }

        let urls_succeeded = results.iter().filter(|a| a.success).count();
        let urls_processed = results.len();
        let result = JobResult {
            started_at,
            finished_at: Utc::now(),
            urls_processed,
            urls_succeeded,
            urls_failed: urls_processed - urls_succeeded,
            results,
        };

        log::info!(
            "[JOB] Job complete: {}/{} succeeded ({}%) in {:.1}s",
            result.urls_succeeded,
            result.urls_processed,
            result.success_rate(),
            result.duration_secs()
        );

        result
    }

    /// Run one URL through fetch -> extract -> diff, isolating failures.
    async fn process_url(&self, url: String) -> UrlAnalysis {
        let parsed = match validate_url(&url) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("[JOB] {} {}: {}", url, UrlStage::Failed.as_str(), e);
                return UrlAnalysis::failed(url, e.to_string());
            }
        };

        log::debug!("[JOB] {} {}", url, UrlStage::Fetching.as_str());
        let (raw_result, rendered_result) = tokio::join!(
            self.raw_fetcher.fetch(&parsed),
            self.rendered_fetcher.fetch(&parsed)
        );

        match (raw_result, rendered_result) {
            (Ok(raw_fetch), Ok(rendered_fetch)) => {
                log::debug!("[JOB] {} {}", url, UrlStage::Extracting.as_str());
                let raw_base = Url::parse(&raw_fetch.final_url).unwrap_or_else(|_| parsed.clone());
                let rendered_base =
                    Url::parse(&rendered_fetch.final_url).unwrap_or_else(|_| parsed.clone());
                let raw_content = self.extractor.extract(&raw_fetch.body, &raw_base);
                let rendered_content = self.extractor.extract(&rendered_fetch.body, &rendered_base);

                log::debug!("[JOB] {} {}", url, UrlStage::Diffing.as_str());
                let differences = self.differ.compare(&raw_content, &rendered_content);

                log::info!(
                    "[JOB] {} {} (raw {} words, rendered {} words, delta {:+})",
                    url,
                    UrlStage::Succeeded.as_str(),
                    raw_content.word_count,
                    rendered_content.word_count,
                    differences.word_count_delta()
                );
                UrlAnalysis::succeeded(
                    url,
                    raw_fetch,
                    rendered_fetch,
                    raw_content,
                    rendered_content,
                    differences,
                )
            }
            (Err(raw_err), Ok(rendered_fetch)) => {
                log::warn!("[JOB] {} {}: {}", url, UrlStage::Failed.as_str(), raw_err);
                let mut analysis = UrlAnalysis::failed(url, raw_err.to_string());
                analysis.rendered_fetch = Some(rendered_fetch);
                analysis
            }
            (Ok(raw_fetch), Err(rendered_err)) => {
                log::warn!(
                    "[JOB] {} {}: {}",
                    url,
                    UrlStage::Failed.as_str(),
                    rendered_err
                );
                let mut analysis = UrlAnalysis::failed(url, rendered_err.to_string());
                analysis.final_url = raw_fetch.final_url.clone();
                analysis.http_status = raw_fetch.status.unwrap_or(0);
                analysis.raw_fetch = Some(raw_fetch);
                analysis
            }
            (Err(raw_err), Err(rendered_err)) => {
                log::warn!(
                    "[JOB] {} {}: {}; {}",
                    url,
                    UrlStage::Failed.as_str(),
                    raw_err,
                    rendered_err
                );
                UrlAnalysis::failed(url, format!("{raw_err}; {rendered_err}"))
            }
        }
    }
}

/// Syntax check before anything touches the network.
fn validate_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{url} ({e})")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(AppError::InvalidUrl(format!(
            "{url} (unsupported scheme {other:?})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::FetchResult;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Transport double: serves a fixed body, optionally failing or
    /// stalling for URLs matching a marker.
    struct StubFetcher {
        body: String,
        kind: &'static str,
        fail_marker: Option<&'static str>,
        error: fn(String) -> AppError,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl StubFetcher {
        fn serving(kind: &'static str, body: &str) -> Self {
            Self {
                body: body.to_string(),
                kind,
                fail_marker: None,
                error: AppError::Transport,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_on(mut self, marker: &'static str, error: fn(String) -> AppError) -> Self {
            self.fail_marker = Some(marker);
            self.error = error;
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> crate::error::Result<FetchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(marker) = self.fail_marker {
                if url.as_str().contains(marker) {
                    return Err((self.error)("simulated failure".into()));
                }
            }
            Ok(FetchResult {
                final_url: url.to_string(),
                status: Some(200),
                body: self.body.clone(),
                elapsed_ms: self.delay.as_millis() as u64,
            })
        }

        fn name(&self) -> &'static str {
            self.kind
        }
    }

    fn runner_with(raw: StubFetcher, rendered: StubFetcher, settings: JobSettings) -> JobRunner {
        JobRunner::with_fetchers(Arc::new(raw), Arc::new(rendered), settings)
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[tokio::test]
    async fn end_to_end_diff_for_js_injected_content() {
        let raw = StubFetcher::serving("raw", "<html><body><p>Hello</p></body></html>");
        let rendered = StubFetcher::serving(
            "rendered",
            "<html><body><p>Hello</p><p>World</p></body></html>",
        );
        let runner = runner_with(raw, rendered, JobSettings::default());

        let result = runner
            .run(&["https://example.com/".to_string()], no_cancel())
            .await;

        assert_eq!(result.urls_processed, 1);
        assert_eq!(result.urls_succeeded, 1);
        let analysis = &result.results[0];
        assert!(analysis.success);
        let diff = analysis.differences.as_ref().unwrap();
        assert_eq!(diff.raw_word_count, 1);
        assert_eq!(diff.rendered_word_count, 2);
        assert_eq!(diff.word_count_delta(), 1);
        assert_eq!(diff.content_invisible_without_js_percentage(), 50.0);
        assert_eq!(diff.text_only_with_js, vec!["World"]);
    }

    #[tokio::test]
    async fn invalid_url_fails_without_touching_the_network() {
        let raw = StubFetcher::serving("raw", "<p>x</p>");
        let raw_calls = raw.calls.clone();
        let rendered = StubFetcher::serving("rendered", "<p>x</p>");
        let rendered_calls = rendered.calls.clone();
        let runner = runner_with(raw, rendered, JobSettings::default());

        let result = runner
            .run(
                &["not a url".to_string(), "ftp://example.com/x".to_string()],
                no_cancel(),
            )
            .await;

        assert_eq!(result.urls_processed, 2);
        assert_eq!(result.urls_failed, 2);
        for analysis in &result.results {
            assert!(!analysis.success);
            assert!(analysis.error.as_ref().unwrap().contains("Invalid URL"));
            assert!(analysis.differences.is_none());
        }
        assert_eq!(raw_calls.load(Ordering::SeqCst), 0);
        assert_eq!(rendered_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_transport_failure_does_not_abort_the_job() {
        let raw = StubFetcher::serving("raw", "<p>same</p>").failing_on("bad", AppError::Transport);
        let rendered = StubFetcher::serving("rendered", "<p>same</p>");
        let settings = JobSettings {
            max_concurrency: 2,
            ..Default::default()
        };
        let runner = runner_with(raw, rendered, settings);

        let urls = vec![
            "https://ok-one.test/".to_string(),
            "https://bad.test/".to_string(),
            "https://ok-two.test/".to_string(),
        ];
        let result = runner.run(&urls, no_cancel()).await;

        assert_eq!(result.urls_processed, 3);
        assert_eq!(result.urls_succeeded, 2);
        assert_eq!(result.urls_failed, 1);
        assert_eq!(result.success_rate(), 66.67);

        let failed = &result.results[1];
        assert!(!failed.success);
        assert!(failed
            .error
            .as_ref()
            .unwrap()
            .contains("Transport error"));
        assert!(failed.differences.is_none());
    }

    #[tokio::test]
    async fn rendered_timeout_keeps_raw_observation_and_other_urls_finish() {
        let raw = StubFetcher::serving("raw", "<p>content</p>");
        let rendered = StubFetcher::serving("rendered", "<p>content</p>")
            .failing_on("slow", |_| AppError::render("Render timeout after 30s"));
        let runner = runner_with(raw, rendered, JobSettings::default());

        let urls = vec![
            "https://slow.test/".to_string(),
            "https://fine.test/".to_string(),
        ];
        let result = runner.run(&urls, no_cancel()).await;

        let timed_out = &result.results[0];
        assert!(!timed_out.success);
        assert!(timed_out.differences.is_none());
        assert!(timed_out.error.as_ref().unwrap().contains("Render timeout"));
        // the raw observation survives for diagnostics
        assert!(timed_out.raw_fetch.is_some());
        assert_eq!(timed_out.http_status, 200);

        assert!(result.results[1].success);
        assert_eq!(result.urls_succeeded, 1);
    }

    #[tokio::test]
    async fn input_is_trimmed_deduplicated_and_kept_in_order() {
        let raw = StubFetcher::serving("raw", "<p>x</p>");
        let rendered = StubFetcher::serving("rendered", "<p>x</p>");
        let runner = runner_with(raw, rendered, JobSettings::default());

        let urls = vec![
            "https://a.test/".to_string(),
            "  https://b.test/  ".to_string(),
            "https://a.test/".to_string(),
            "".to_string(),
        ];
        let result = runner.run(&urls, no_cancel()).await;

        assert_eq!(result.urls_processed, 2);
        assert_eq!(result.results[0].url, "https://a.test/");
        assert_eq!(result.results[1].url, "https://b.test/");
    }

    #[tokio::test]
    async fn concurrency_limit_bounds_in_flight_urls() {
        let raw =
            StubFetcher::serving("raw", "<p>x</p>").with_delay(Duration::from_millis(50));
        let rendered =
            StubFetcher::serving("rendered", "<p>x</p>").with_delay(Duration::from_millis(50));
        let settings = JobSettings {
            max_concurrency: 1,
            ..Default::default()
        };
        let runner = runner_with(raw, rendered, settings);

        let urls = vec![
            "https://a.test/".to_string(),
            "https://b.test/".to_string(),
            "https://c.test/".to_string(),
        ];
        let started = std::time::Instant::now();
        let result = runner.run(&urls, no_cancel()).await;

        assert_eq!(result.urls_succeeded, 3);
        // serialized: three URLs of ~50ms each cannot finish in one slot
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn cancel_flag_marks_unstarted_urls_failed() {
        let raw = StubFetcher::serving("raw", "<p>x</p>");
        let rendered = StubFetcher::serving("rendered", "<p>x</p>");
        let runner = runner_with(raw, rendered, JobSettings::default());

        let cancel = Arc::new(AtomicBool::new(true));
        let result = runner
            .run(&["https://a.test/".to_string()], cancel)
            .await;

        assert_eq!(result.urls_failed, 1);
        assert!(result.results[0]
            .error
            .as_ref()
            .unwrap()
            .contains("cancelled"));
    }

    #[test]
    fn validate_url_accepts_http_and_https_only() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com/path?q=1").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(AppError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("example.com"),
            Err(AppError::InvalidUrl(_))
        ));
        assert!(matches!(validate_url(""), Err(AppError::InvalidUrl(_))));
    }
}
