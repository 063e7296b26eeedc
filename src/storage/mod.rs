//! Persistence seam for job reports.
//!
//! The pipeline never depends on a concrete sink; anything that can take a
//! [`JobResult`] and produce a side effect (a file today, a database
//! tomorrow) implements [`Storage`].

mod file;

pub use file::FileStorage;

use clap::ValueEnum;
use std::path::{Path, PathBuf};

use crate::domain::models::JobResult;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Swappable storage backend for job reports.
pub trait Storage {
    /// Persist a job report. When `output_path` is `None` a timestamped
    /// filename is generated. Returns the location written to.
    fn save(
        &self,
        result: &JobResult,
        format: OutputFormat,
        output_path: Option<&Path>,
    ) -> Result<PathBuf>;
}
