//! In-memory data model flowing between pipeline stages.
//!
//! The page ordinal (`page.index`, 1-based) is stored explicitly on every
//! record from the moment the page is rasterised. Concurrent stages complete
//! in arbitrary order, so nothing downstream may infer a page number from a
//! position in a `Vec`.

use crate::error::PageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One rasterised page of the source PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page ordinal.
    pub index: usize,
    /// Screenshot written by the rasteriser.
    pub image_path: PathBuf,
}

/// Result of one model call, tagged with the page it belongs to.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub page_index: usize,
    pub outcome: ReplyOutcome,
}

/// What came back from the model endpoint for one page.
#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    /// The endpoint answered with a 2xx status.
    ///
    /// `raw_text` is `content[0].text` from the reply body (empty when the
    /// body had no text block); `body` is the full reply kept for the manifest.
    Success {
        raw_text: String,
        body: serde_json::Value,
    },
    /// Timeout, network error, non-2xx status or unreadable screenshot.
    TransportFailure { error: PageError },
}

impl ModelReply {
    pub fn success(page_index: usize, raw_text: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            page_index,
            outcome: ReplyOutcome::Success {
                raw_text: raw_text.into(),
                body,
            },
        }
    }

    pub fn failure(page_index: usize, error: PageError) -> Self {
        Self {
            page_index,
            outcome: ReplyOutcome::TransportFailure { error },
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ReplyOutcome::Success { .. })
    }

    /// The reply text, only for successful calls.
    pub fn raw_text(&self) -> Option<&str> {
        match &self.outcome {
            ReplyOutcome::Success { raw_text, .. } => Some(raw_text),
            ReplyOutcome::TransportFailure { .. } => None,
        }
    }

    /// The full reply body, only for successful calls.
    pub fn body(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            ReplyOutcome::Success { body, .. } => Some(body),
            ReplyOutcome::TransportFailure { .. } => None,
        }
    }

    pub fn transport_error(&self) -> Option<&PageError> {
        match &self.outcome {
            ReplyOutcome::Success { .. } => None,
            ReplyOutcome::TransportFailure { error } => Some(error),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.transport_error().map(|e| e.to_string())
    }
}

/// HTML recovered from a reply. `html: None` means "no HTML recoverable",
/// which is a different condition from a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub page_index: usize,
    pub html: Option<String>,
}

/// Everything known about one page after the pipeline has run.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub page: Page,
    pub reply: ModelReply,
    pub extracted: ExtractedDocument,
    /// When the model call settled.
    pub timestamp: DateTime<Utc>,
    /// Set by the persist stage when HTML was written.
    pub html_path: Option<PathBuf>,
    /// Set by the render stage when a single-page PDF was written.
    pub pdf_path: Option<PathBuf>,
    /// Set by the render stage when HTML → PDF failed for this page.
    pub render_error: Option<PageError>,
}

impl PageRecord {
    pub fn new(page: Page, reply: ModelReply, extracted: ExtractedDocument) -> Self {
        Self {
            page,
            reply,
            extracted,
            timestamp: Utc::now(),
            html_path: None,
            pdf_path: None,
            render_error: None,
        }
    }

    pub fn index(&self) -> usize {
        self.page.index
    }

    pub fn html(&self) -> Option<&str> {
        self.extracted.html.as_deref()
    }

    /// The first error that affected this page, if any.
    ///
    /// Transport failures take precedence over extraction failures, which
    /// take precedence over rendering failures.
    pub fn error(&self) -> Option<PageError> {
        if let Some(e) = self.reply.transport_error() {
            return Some(e.clone());
        }
        if self.extracted.html.is_none() {
            return Some(PageError::NoHtml {
                page: self.page.index,
            });
        }
        self.render_error.clone()
    }

    /// Whether the model step produced usable HTML for this page.
    pub fn has_html(&self) -> bool {
        self.reply.succeeded() && self.extracted.html.is_some()
    }
}

/// Statistics for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    pub total_pages: usize,
    /// Pages with recovered HTML.
    pub succeeded_pages: usize,
    pub transport_failures: usize,
    pub extraction_failures: usize,
    pub render_failures: usize,
    pub raster_duration_ms: u64,
    pub model_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    pub fn failed_pages(&self) -> usize {
        self.transport_failures + self.extraction_failures
    }

    /// Count outcomes over a finished, ordinal-sorted record list.
    pub fn tally(records: &[PageRecord]) -> Self {
        let mut stats = ConversionStats {
            total_pages: records.len(),
            ..Default::default()
        };
        for r in records {
            if !r.reply.succeeded() {
                stats.transport_failures += 1;
            } else if r.extracted.html.is_none() {
                stats.extraction_failures += 1;
            } else {
                stats.succeeded_pages += 1;
            }
            if r.render_error.is_some() {
                stats.render_failures += 1;
            }
        }
        stats
    }
}

/// Outcome of a complete pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub source_pdf: PathBuf,
    /// Filesystem-safe identity derived from the source filename.
    pub slug: String,
    /// One record per page, sorted ascending by ordinal.
    pub pages: Vec<PageRecord>,
    pub screenshot_paths: Vec<PathBuf>,
    /// Every file written under the output directory, in write order.
    pub generated_paths: Vec<PathBuf>,
    pub summary_path: PathBuf,
    pub combined_pdf: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: ConversionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize) -> Page {
        Page {
            index: n,
            image_path: PathBuf::from(format!("page.{n}.png")),
        }
    }

    #[test]
    fn error_precedence_transport_over_extraction() {
        let reply = ModelReply::failure(1, PageError::Timeout { page: 1, ms: 60_000 });
        let rec = PageRecord::new(
            page(1),
            reply,
            ExtractedDocument {
                page_index: 1,
                html: None,
            },
        );
        assert_eq!(rec.error(), Some(PageError::Timeout { page: 1, ms: 60_000 }));
        assert!(!rec.has_html());
    }

    #[test]
    fn success_without_html_is_extraction_failure() {
        let reply = ModelReply::success(2, "no markup here", serde_json::json!({}));
        let rec = PageRecord::new(
            page(2),
            reply,
            ExtractedDocument {
                page_index: 2,
                html: None,
            },
        );
        assert_eq!(rec.error(), Some(PageError::NoHtml { page: 2 }));
    }

    #[test]
    fn tally_counts_each_outcome_once() {
        let ok = PageRecord::new(
            page(1),
            ModelReply::success(1, "<html></html>", serde_json::json!({})),
            ExtractedDocument {
                page_index: 1,
                html: Some("<html></html>".into()),
            },
        );
        let failed = PageRecord::new(
            page(2),
            ModelReply::failure(2, PageError::Timeout { page: 2, ms: 1000 }),
            ExtractedDocument {
                page_index: 2,
                html: None,
            },
        );
        let empty = PageRecord::new(
            page(3),
            ModelReply::success(3, "", serde_json::json!({})),
            ExtractedDocument {
                page_index: 3,
                html: None,
            },
        );
        let stats = ConversionStats::tally(&[ok, failed, empty]);
        assert_eq!(stats.total_pages, 3);
        assert_eq!(stats.succeeded_pages, 1);
        assert_eq!(stats.transport_failures, 1);
        assert_eq!(stats.extraction_failures, 1);
        assert_eq!(stats.failed_pages(), 2);
    }
}
