//! Fetch strategies for the two page variants.
//!
//! This module provides two fetch capabilities:
//! - **Raw**: a single HTTP request, what non-JS crawlers see
//! - **Rendered**: a headless browser session, what users see after
//!   JavaScript ran
//!
//! Both implement the `Fetcher` trait so the job runner stays agnostic to
//! transport mechanics and tests can substitute a mock transport.

mod raw;
mod rendered;

pub use raw::RawHtmlFetcher;
pub use rendered::RenderedFetcher;

use async_trait::async_trait;
use url::Url;

use crate::domain::models::FetchResult;
use crate::error::Result;

/// Capability trait for retrieving one variant of a page within the
/// configured timeout budget.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a single URL and return its body plus fetch metadata.
    async fn fetch(&self, url: &Url) -> Result<FetchResult>;

    /// Human-readable name for this fetcher.
    fn name(&self) -> &'static str;
}
