//! Rendered fetcher - DOM serialization after JavaScript execution.

use async_trait::async_trait;
use headless_chrome::browser::default_executable;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use url::Url;

use super::Fetcher;
use crate::domain::models::{FetchResult, JobSettings, WaitStrategy};
use crate::error::{AppError, Result};

/// Poll interval for readiness checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// A page counts as network-idle once its resource count held steady this long.
const QUIESCENCE_WINDOW: Duration = Duration::from_millis(500);
const QUIESCENCE_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Fetches URLs through a headless browser session.
///
/// One shared browser per job; each fetch gets its own incognito context
/// and tab so in-flight URLs cannot contaminate each other's cookies or
/// state. The tab is closed on success and failure alike. Represents what
/// users and JS-capable crawlers see.
pub struct RenderedFetcher {
    browser: Arc<Browser>,
    user_agent: String,
    wait_strategy: WaitStrategy,
    timeout: Duration,
}

impl RenderedFetcher {
    /// Launch the rendering backend. Failure here is fatal for the whole
    /// job and must surface before any URL is processed.
    pub fn launch(settings: &JobSettings) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .path(Some(default_executable().map_err(AppError::Render)?))
            .headless(true)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::render(format!("Invalid browser launch options: {e}")))?;

        let browser = Browser::new(options)
            .map_err(|e| AppError::render(format!("Failed to launch rendering backend: {e}")))?;
        log::info!(
            "[RENDER] Rendering backend ready (wait strategy: {})",
            settings.wait_strategy.as_str()
        );

        Ok(Self {
            browser: Arc::new(browser),
            user_agent: settings.effective_user_agent().to_string(),
            wait_strategy: settings.wait_strategy,
            timeout: settings.timeout(),
        })
    }
}

#[async_trait]
impl Fetcher for RenderedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResult> {
        log::debug!("[RENDER] Rendering {}", url);
        let start = Instant::now();

        let browser = self.browser.clone();
        let target = url.to_string();
        let user_agent = self.user_agent.clone();
        let strategy = self.wait_strategy;
        let budget = self.timeout;

        let render =
            task::spawn_blocking(move || render_page(&browser, &target, &user_agent, strategy, budget));

        // The blocking task cannot be aborted mid-CDP-call; on expiry it
        // finishes against its own deadline and closes the tab there.
        let (final_url, body) = match tokio::time::timeout(budget, render).await {
            Err(_) => {
                return Err(AppError::render(format!(
                    "Render timeout after {}s",
                    budget.as_secs()
                )))
            }
            Ok(Err(join_err)) => {
                return Err(AppError::render(format!("Render task failed: {join_err}")))
            }
            Ok(Ok(outcome)) => outcome?,
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        log::debug!(
            "[RENDER] {} -> {} bytes in {}ms",
            url,
            body.len(),
            elapsed_ms
        );

        Ok(FetchResult {
            final_url,
            status: None,
            body,
            elapsed_ms,
        })
    }

    fn name(&self) -> &'static str {
        "rendered"
    }
}

/// Drive one navigation in a fresh incognito context and serialize the
/// live DOM. Runs on the blocking pool; every wait respects `budget`.
fn render_page(
    browser: &Browser,
    url: &str,
    user_agent: &str,
    strategy: WaitStrategy,
    budget: Duration,
) -> Result<(String, String)> {
    let deadline = Instant::now() + budget;

    let context = browser
        .new_context()
        .map_err(|e| AppError::render(format!("Could not create browser context: {e}")))?;
    let tab = context
        .new_tab()
        .map_err(|e| AppError::render(format!("Could not open tab: {e}")))?;

    let outcome = (|| -> Result<(String, String)> {
        tab.set_default_timeout(budget);
        tab.set_user_agent(user_agent, None, None)
            .map_err(|e| AppError::render(format!("Could not set user agent: {e}")))?;

        tab.navigate_to(url)
            .map_err(|e| AppError::render(format!("Navigation failed: {e}")))?;

        if strategy != WaitStrategy::DomContentLoaded {
            tab.wait_until_navigated()
                .map_err(|e| AppError::render(format!("Navigation timeout: {e}")))?;
        }
        wait_for_ready(&tab, strategy, deadline)?;

        let body = tab
            .get_content()
            .map_err(|e| AppError::render(format!("Could not serialize DOM: {e}")))?;
        let final_url = tab.get_url();
        Ok((final_url, body))
    })();

    if let Err(e) = tab.close(true) {
        log::warn!("[RENDER] Could not close tab for {}: {}", url, e);
    }

    outcome
}

fn wait_for_ready(tab: &Arc<Tab>, strategy: WaitStrategy, deadline: Instant) -> Result<()> {
    match strategy {
        WaitStrategy::DomContentLoaded => {
            poll_ready_state(tab, deadline, |state| state != "loading")
        }
        WaitStrategy::Load => poll_ready_state(tab, deadline, |state| state == "complete"),
        WaitStrategy::NetworkIdle => {
            poll_ready_state(tab, deadline, |state| state == "complete")?;
            wait_for_network_quiescence(tab, deadline);
            Ok(())
        }
    }
}

fn poll_ready_state(
    tab: &Arc<Tab>,
    deadline: Instant,
    is_ready: impl Fn(&str) -> bool,
) -> Result<()> {
    loop {
        let state = tab
            .evaluate("document.readyState", false)
            .ok()
            .and_then(|obj| obj.value)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        if is_ready(&state) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AppError::render(format!(
                "Timed out waiting for readyState (last: {state:?})"
            )));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Best-effort quiescence: the resource-entry count must hold steady for
/// the full window. Gives up at the deadline rather than failing, since a
/// long-polling page would otherwise never settle.
fn wait_for_network_quiescence(tab: &Arc<Tab>, deadline: Instant) {
    let mut last = resource_count(tab);
    let mut stable_since = Instant::now();
    loop {
        if Instant::now() >= deadline {
            log::warn!("[RENDER] Network never went idle for {}, proceeding", tab.get_url());
            return;
        }
        std::thread::sleep(QUIESCENCE_SAMPLE_INTERVAL);
        let current = resource_count(tab);
        if current != last {
            last = current;
            stable_since = Instant::now();
        } else if stable_since.elapsed() >= QUIESCENCE_WINDOW {
            return;
        }
    }
}

fn resource_count(tab: &Arc<Tab>) -> u64 {
    tab.evaluate("performance.getEntriesByType('resource').length", false)
        .ok()
        .and_then(|obj| obj.value)
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}
