//! File-based storage: CSV for spreadsheets, JSON for programmatic use.

use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{OutputFormat, Storage};
use crate::domain::models::{JobResult, UrlAnalysis};
use crate::error::{AppError, Result};

const CSV_HEADERS: [&str; 11] = [
    "URL",
    "Final URL",
    "HTTP Status",
    "Raw Word Count",
    "Rendered Word Count",
    "Word Count Delta",
    "Content Invisible Without JS (%)",
    "Headings Missing Without JS",
    "Internal Links Missing Count",
    "Success",
    "Error",
];

pub struct FileStorage {
    output_dir: PathBuf,
}

impl FileStorage {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn resolve_path(
        &self,
        result: &JobResult,
        format: OutputFormat,
        output_path: Option<&Path>,
    ) -> PathBuf {
        match output_path {
            Some(path) => self.output_dir.join(path),
            None => self.output_dir.join(format!(
                "rendergap_results_{}.{}",
                result.started_at.format("%Y%m%d_%H%M%S"),
                format.extension()
            )),
        }
    }

    fn save_csv(&self, result: &JobResult, path: &Path) -> Result<()> {
        let mut file = File::create(path)
            .map_err(|e| AppError::storage(format!("Could not create {}: {e}", path.display())))?;

        // summary preamble, then one row per URL
        writeln!(file, "# Render Gap Report")
            .and_then(|_| writeln!(file, "# Generated: {}", result.finished_at.to_rfc3339()))
            .and_then(|_| writeln!(file, "# URLs Processed: {}", result.urls_processed))
            .and_then(|_| writeln!(file, "# URLs Succeeded: {}", result.urls_succeeded))
            .and_then(|_| writeln!(file, "# URLs Failed: {}", result.urls_failed))
            .and_then(|_| writeln!(file, "# Success Rate: {}%", result.success_rate()))
            .map_err(|e| AppError::storage(format!("Could not write summary: {e}")))?;

        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(CSV_HEADERS)
            .map_err(|e| AppError::storage(format!("Could not write CSV header: {e}")))?;

        for analysis in &result.results {
            writer
                .write_record(Self::csv_row(analysis))
                .map_err(|e| AppError::storage(format!("Could not write CSV row: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| AppError::storage(format!("Could not flush CSV: {e}")))?;
        Ok(())
    }

    fn csv_row(analysis: &UrlAnalysis) -> Vec<String> {
        let diff = analysis.differences.as_ref();
        vec![
            analysis.url.clone(),
            analysis.final_url.clone(),
            analysis.http_status.to_string(),
            diff.map_or(0, |d| d.raw_word_count).to_string(),
            diff.map_or(0, |d| d.rendered_word_count).to_string(),
            diff.map_or(0, |d| d.word_count_delta()).to_string(),
            diff.map_or(0.0, |d| d.content_invisible_without_js_percentage())
                .to_string(),
            diff.map_or(String::new(), |d| d.headings_missing_without_js.join(", ")),
            diff.map_or(0, |d| d.internal_links_missing_without_js.len())
                .to_string(),
            if analysis.success { "Yes" } else { "No" }.to_string(),
            analysis.error.clone().unwrap_or_default(),
        ]
    }

    fn save_json(&self, result: &JobResult, path: &Path) -> Result<()> {
        let results: Vec<_> = result.results.iter().map(Self::analysis_json).collect();
        let data = json!({
            "metadata": {
                "started_at": result.started_at,
                "finished_at": result.finished_at,
                "urls_processed": result.urls_processed,
                "urls_succeeded": result.urls_succeeded,
                "urls_failed": result.urls_failed,
                "success_rate": result.success_rate(),
            },
            "results": results,
        });

        let file = File::create(path)
            .map_err(|e| AppError::storage(format!("Could not create {}: {e}", path.display())))?;
        serde_json::to_writer_pretty(file, &data)
            .map_err(|e| AppError::storage(format!("Could not write JSON: {e}")))
    }

    fn analysis_json(analysis: &UrlAnalysis) -> serde_json::Value {
        let diff = analysis.differences.as_ref();
        let mut value = json!({
            "url": analysis.url,
            "final_url": analysis.final_url,
            "http_status": analysis.http_status,
            "raw_word_count": diff.map_or(0, |d| d.raw_word_count),
            "rendered_word_count": diff.map_or(0, |d| d.rendered_word_count),
            "word_count_delta": diff.map_or(0, |d| d.word_count_delta()),
            "content_invisible_without_js_percentage":
                diff.map_or(0.0, |d| d.content_invisible_without_js_percentage()),
            "success": analysis.success,
            "error": analysis.error,
        });

        if let Some(diff) = diff {
            value["differences"] = json!(diff);
        }
        value
    }
}

impl Storage for FileStorage {
    fn save(
        &self,
        result: &JobResult,
        format: OutputFormat,
        output_path: Option<&Path>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            AppError::storage(format!(
                "Could not create output directory {}: {e}",
                self.output_dir.display()
            ))
        })?;
        let path = self.resolve_path(result, format, output_path);

        match format {
            OutputFormat::Csv => self.save_csv(result, &path)?,
            OutputFormat::Json => self.save_json(result, &path)?,
        }

        log::info!("[STORE] Wrote {} report to {}", format.extension(), path.display());
        Ok(path)
    }
}
