use anyhow::{Context, Result};
use reqwest::{redirect, Client};
use std::time::Duration;

/// Factory for the HTTP client used by the raw fetcher: follows redirects,
/// enforces the per-fetch timeout and presents the configured User-Agent.
pub fn create_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(redirect::Policy::limited(10))
        .build()
        .context("Failed to build HTTP client")
}
