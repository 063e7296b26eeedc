//! Domain entities for the render-diff engine.

use chrono::{DateTime, Utc};
use clap::ValueEnum;

use crate::extractor::ExtractionResult;
use crate::service::differ::DiffReport;

/// Default User-Agent, applied to both fetch variants when no override is given.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; rendergap/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

// ====== Enums ======

/// How long the rendered fetch waits before serializing the live DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WaitStrategy {
    /// Reach `load`, then require the page's network activity to stay quiet
    /// for a quiescence window
    NetworkIdle,
    /// Wait for the `load` event
    Load,
    /// Wait for the initial DOM parse only
    DomContentLoaded,
}

impl WaitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitStrategy::NetworkIdle => "network_idle",
            WaitStrategy::Load => "load",
            WaitStrategy::DomContentLoaded => "domcontentloaded",
        }
    }
}

/// Policy for 4xx/5xx raw responses: an observed result carrying its status
/// and body, or a hard transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorPolicy {
    Observe,
    Fail,
}

// ====== Settings ======

/// Configuration surface consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Maximum number of URLs in flight simultaneously
    pub max_concurrency: usize,
    /// Budget for each fetch operation, raw and rendered independently
    pub timeout_secs: u64,
    pub wait_strategy: WaitStrategy,
    /// Optional User-Agent override, else [`DEFAULT_USER_AGENT`]
    pub user_agent: Option<String>,
    pub http_error_policy: HttpErrorPolicy,
    /// Drop cookie/consent banners before extracting content
    pub strip_consent_banners: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            timeout_secs: 30,
            wait_strategy: WaitStrategy::NetworkIdle,
            user_agent: None,
            http_error_policy: HttpErrorPolicy::Observe,
            strip_consent_banners: true,
        }
    }
}

impl JobSettings {
    pub fn effective_user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

// ====== Fetch outcome ======

/// Outcome of retrieving one variant of a page. Fetchers return
/// `Result<FetchResult>`, so a value of this type always carries a body;
/// the failure arm lives in [`crate::error::AppError`].
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code; `None` for the rendered variant, where DOM
    /// serialization does not surface one
    pub status: Option<u16>,
    /// Document body, verbatim
    pub body: String,
    pub elapsed_ms: u64,
}

// ====== Per-URL analysis ======

/// Complete analysis for a single URL.
///
/// Either fully successful (both fetches, both extractions and the
/// difference report present) or failed (`success == false`, `differences`
/// absent, `error` populated), never partially populated. Built through
/// [`UrlAnalysis::succeeded`] and [`UrlAnalysis::failed`].
#[derive(Debug)]
pub struct UrlAnalysis {
    /// URL as requested
    pub url: String,
    /// Final URL after redirects (from the raw fetch)
    pub final_url: String,
    /// HTTP status of the raw fetch, 0 when none was observed
    pub http_status: u16,
    pub raw_fetch: Option<FetchResult>,
    pub rendered_fetch: Option<FetchResult>,
    pub raw_content: Option<ExtractionResult>,
    pub rendered_content: Option<ExtractionResult>,
    pub differences: Option<DiffReport>,
    pub success: bool,
    pub error: Option<String>,
}

impl UrlAnalysis {
    pub fn succeeded(
        url: impl Into<String>,
        raw_fetch: FetchResult,
        rendered_fetch: FetchResult,
        raw_content: ExtractionResult,
        rendered_content: ExtractionResult,
        differences: DiffReport,
    ) -> Self {
        Self {
            url: url.into(),
            final_url: raw_fetch.final_url.clone(),
            http_status: raw_fetch.status.unwrap_or(0),
            raw_fetch: Some(raw_fetch),
            rendered_fetch: Some(rendered_fetch),
            raw_content: Some(raw_content),
            rendered_content: Some(rendered_content),
            differences: Some(differences),
            success: true,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            http_status: 0,
            raw_fetch: None,
            rendered_fetch: None,
            raw_content: None,
            rendered_content: None,
            differences: None,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Whether any category of content differs between the two variants.
    pub fn has_differences(&self) -> bool {
        self.differences
            .as_ref()
            .is_some_and(|d| d.has_differences())
    }
}

// ====== Job-level aggregate ======

/// The run-level aggregate, owned by the job runner; collaborators only
/// read it. Results appear in input order.
#[derive(Debug)]
pub struct JobResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub urls_processed: usize,
    pub urls_succeeded: usize,
    pub urls_failed: usize,
    pub results: Vec<UrlAnalysis>,
}

impl JobResult {
    /// Percentage of URLs processed successfully, 0.0 when nothing was
    /// processed. Two-decimal precision.
    pub fn success_rate(&self) -> f64 {
        if self.urls_processed == 0 {
            return 0.0;
        }
        (self.urls_succeeded as f64 / self.urls_processed as f64 * 10000.0).round() / 100.0
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn failed_analyses(&self) -> Vec<&UrlAnalysis> {
        self.results.iter().filter(|a| !a.success).collect()
    }

    pub fn analyses_with_differences(&self) -> Vec<&UrlAnalysis> {
        self.results.iter().filter(|a| a.has_differences()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_job(processed: usize, succeeded: usize) -> JobResult {
        let now = Utc::now();
        JobResult {
            started_at: now,
            finished_at: now,
            urls_processed: processed,
            urls_succeeded: succeeded,
            urls_failed: processed - succeeded,
            results: Vec::new(),
        }
    }

    #[test]
    fn success_rate_has_two_decimal_precision() {
        assert_eq!(empty_job(3, 2).success_rate(), 66.67);
        assert_eq!(empty_job(3, 3).success_rate(), 100.0);
        assert_eq!(empty_job(3, 0).success_rate(), 0.0);
    }

    #[test]
    fn success_rate_is_zero_for_empty_job() {
        assert_eq!(empty_job(0, 0).success_rate(), 0.0);
    }

    #[test]
    fn failed_analysis_is_never_partially_populated() {
        let analysis = UrlAnalysis::failed("https://example.com", "Transport error: boom");

        assert!(!analysis.success);
        assert!(analysis.differences.is_none());
        assert!(analysis.raw_content.is_none());
        assert!(analysis.rendered_content.is_none());
        assert_eq!(analysis.error.as_deref(), Some("Transport error: boom"));
        assert_eq!(analysis.http_status, 0);
    }

    #[test]
    fn wait_strategy_labels() {
        assert_eq!(WaitStrategy::NetworkIdle.as_str(), "network_idle");
        assert_eq!(WaitStrategy::Load.as_str(), "load");
        assert_eq!(WaitStrategy::DomContentLoaded.as_str(), "domcontentloaded");
    }

    #[test]
    fn default_settings_match_documented_defaults() {
        let settings = JobSettings::default();
        assert_eq!(settings.max_concurrency, 3);
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.wait_strategy, WaitStrategy::NetworkIdle);
        assert_eq!(settings.http_error_policy, HttpErrorPolicy::Observe);
        assert!(settings.effective_user_agent().contains("rendergap"));
    }
}
