//! Content comparison between the raw and rendered variants of a page.
//!
//! Pure and deterministic: identical extraction pairs always yield
//! identical reports, with no network or I/O dependency.

use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;

use crate::extractor::{ExtractionResult, InternalLink};

/// Categorized differences between raw and rendered content, plus the
/// scalar metrics the report layer needs.
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    /// Text blocks only present with JavaScript
    pub text_only_with_js: Vec<String>,
    /// Text blocks only present without JavaScript
    pub text_only_without_js: Vec<String>,
    /// Headings that disappear without JavaScript
    pub headings_missing_without_js: Vec<String>,
    /// Headings that only appear without JavaScript
    pub headings_extra_without_js: Vec<String>,
    pub internal_links_missing_without_js: Vec<InternalLink>,
    pub internal_links_extra_without_js: Vec<InternalLink>,

    // Metrics
    pub raw_word_count: usize,
    pub rendered_word_count: usize,
    pub raw_heading_count: usize,
    pub rendered_heading_count: usize,
    pub raw_internal_link_count: usize,
    pub rendered_internal_link_count: usize,
}

impl DiffReport {
    /// Word count difference, rendered minus raw. Negative when rendering
    /// removes content.
    pub fn word_count_delta(&self) -> i64 {
        self.rendered_word_count as i64 - self.raw_word_count as i64
    }

    /// Percentage change in word count relative to the raw variant, 0.0
    /// when the raw variant has no words. Two-decimal precision.
    pub fn word_count_percentage_change(&self) -> f64 {
        if self.raw_word_count == 0 {
            return 0.0;
        }
        (self.word_count_delta() as f64 / self.raw_word_count as f64 * 10000.0).round() / 100.0
    }

    /// Share of the rendered word count attributable to text blocks absent
    /// from the raw variant, clamped to [0, 100]. Defined as 0.0 when the
    /// rendered variant has no words, as an explicit division-by-zero
    /// policy.
    pub fn content_invisible_without_js_percentage(&self) -> f64 {
        if self.rendered_word_count == 0 {
            return 0.0;
        }
        let rendered_only_words: usize = self
            .text_only_with_js
            .iter()
            .map(|b| b.split_whitespace().count())
            .sum();
        let pct = (rendered_only_words as f64 / self.rendered_word_count as f64 * 10000.0).round()
            / 100.0;
        pct.clamp(0.0, 100.0)
    }

    pub fn has_differences(&self) -> bool {
        !self.text_only_with_js.is_empty()
            || !self.text_only_without_js.is_empty()
            || !self.headings_missing_without_js.is_empty()
            || !self.headings_extra_without_js.is_empty()
            || !self.internal_links_missing_without_js.is_empty()
            || !self.internal_links_extra_without_js.is_empty()
    }
}

/// Compares content between the two variants of a page.
#[derive(Debug, Clone, Default)]
pub struct ContentDiffer;

impl ContentDiffer {
    pub fn new() -> Self {
        Self
    }

    /// Compare raw and rendered content. Each category is treated as a set
    /// under content-equality; differences are computed in both directions.
    pub fn compare(&self, raw: &ExtractionResult, rendered: &ExtractionResult) -> DiffReport {
        let report = DiffReport {
            text_only_with_js: source_order_difference(&rendered.text_blocks, &raw.text_blocks),
            text_only_without_js: source_order_difference(&raw.text_blocks, &rendered.text_blocks),
            headings_missing_without_js: source_order_difference(&rendered.headings, &raw.headings),
            headings_extra_without_js: source_order_difference(&raw.headings, &rendered.headings),
            internal_links_missing_without_js: source_order_difference(
                &rendered.internal_links,
                &raw.internal_links,
            ),
            internal_links_extra_without_js: source_order_difference(
                &raw.internal_links,
                &rendered.internal_links,
            ),
            raw_word_count: raw.word_count,
            rendered_word_count: rendered.word_count,
            raw_heading_count: raw.heading_count(),
            rendered_heading_count: rendered.heading_count(),
            raw_internal_link_count: raw.internal_link_count(),
            rendered_internal_link_count: rendered.internal_link_count(),
        };

        log::debug!(
            "[DIFF] delta {:+}, invisible {:.2}%, {} missing headings, {} missing links",
            report.word_count_delta(),
            report.content_invisible_without_js_percentage(),
            report.headings_missing_without_js.len(),
            report.internal_links_missing_without_js.len()
        );

        report
    }
}

/// Elements of `source` absent from `other`, deduplicated, in order of
/// first occurrence in `source`. Never diff-algorithm or hash order.
fn source_order_difference<T: Eq + Hash + Clone>(source: &[T], other: &[T]) -> Vec<T> {
    let other_set: HashSet<&T> = other.iter().collect();
    let mut seen: HashSet<&T> = HashSet::new();
    let mut out = Vec::new();
    for item in source {
        if !other_set.contains(item) && seen.insert(item) {
            out.push(item.clone());
        }
    }
    out
}
