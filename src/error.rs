//! Error types for the render-diff engine.
//!
//! This module provides structured error handling with:
//! - `AppError`: domain-specific errors for pipeline operations
//! - `Result<T>`: type alias for Results using AppError

use thiserror::Error;

/// Domain-specific errors for pipeline operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or malformed input URL, rejected before any network attempt
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Raw fetch failed (network, DNS, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Rendered fetch failed (browser session, navigation, timeout)
    #[error("Render error: {0}")]
    Render(String),

    /// HTML could not be turned into content units
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Persisting a job report failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a render error
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create an extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
