//! Output layout: file naming, slug derivation and the JSON manifests.
//!
//! A run writes, under the output directory:
//!
//! | File | Content |
//! |------|---------|
//! | `model_output_page_<N>.json` | [`PageManifest`] for page `N` |
//! | `html_output_page_<N>.html` | extracted HTML, only when recovered |
//! | `html_output_page_<N>.pdf` | single-page PDF, only in render mode |
//! | `<slug>-combined.pdf` | merged PDF, only in render mode |
//! | `processing_summary.json` | [`RunSummary`], written once at the end |
//!
//! Every name derives from the page ordinal, never from completion order.
//! Write failures here are fatal for the run.

use crate::error::Pdf2HtmlError;
use crate::output::{ConversionStats, PageRecord};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SUMMARY_FILE: &str = "processing_summary.json";
pub const EXTRACTED_DIR: &str = "extracted-html";

static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static MANIFEST_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^model_output_page_(\d+)\.json$").unwrap());

// ── File naming ──────────────────────────────────────────────────────────

pub fn manifest_file_name(page: usize) -> String {
    format!("model_output_page_{}.json", page)
}

pub fn html_file_name(page: usize) -> String {
    format!("html_output_page_{}.html", page)
}

pub fn pdf_file_name(page: usize) -> String {
    format!("html_output_page_{}.pdf", page)
}

pub fn extracted_file_name(page: usize) -> String {
    format!("page_{}_extracted.html", page)
}

pub fn combined_pdf_name(slug: &str) -> String {
    format!("{}-combined.pdf", slug)
}

/// Page ordinal encoded in a manifest file name.
pub fn manifest_ordinal(file_name: &str) -> Option<usize> {
    MANIFEST_NAME
        .captures(file_name)
        .and_then(|c| c[1].parse().ok())
}

/// Filesystem-safe identity for a source file: lowercased stem with runs of
/// anything outside `[a-z0-9]` collapsed to `-`.
///
/// `Sample Deck_2.pdf` → `sample-deck-2`. Falls back to `document`.
pub fn slugify(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let slug = SLUG_SEPARATORS.replace_all(&stem, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug.to_string()
    }
}

// ── Manifest shapes ──────────────────────────────────────────────────────

/// Outcome of one page, as recorded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Ok,
    ModelCallFailed,
    NoHtml,
    /// HTML was recovered but printing it to PDF failed.
    RenderFailed,
}

impl PageStatus {
    pub fn of(record: &PageRecord) -> Self {
        if !record.reply.succeeded() {
            PageStatus::ModelCallFailed
        } else if record.extracted.html.is_none() {
            PageStatus::NoHtml
        } else if record.render_error.is_some() {
            PageStatus::RenderFailed
        } else {
            PageStatus::Ok
        }
    }
}

/// One page's manifest, `model_output_page_<N>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageManifest {
    pub page: usize,
    pub screenshot_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub status: PageStatus,
    pub error: Option<String>,
    /// Raw reply body; `null` when the call failed.
    pub model_response: Option<serde_json::Value>,
    pub html_path: Option<PathBuf>,
    /// Side-data file contents, or `""`.
    pub side_data: String,
}

impl PageManifest {
    pub fn from_record(record: &PageRecord, side_data: &str) -> Self {
        Self {
            page: record.index(),
            screenshot_path: record.page.image_path.clone(),
            timestamp: record.timestamp,
            status: PageStatus::of(record),
            error: record.error().map(|e| e.to_string()),
            model_response: record.reply.body().cloned(),
            html_path: record.html_path.clone(),
            side_data: side_data.to_string(),
        }
    }
}

/// Per-page line in the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub page: usize,
    pub status: PageStatus,
    pub error: Option<String>,
    pub html_path: Option<PathBuf>,
    pub pdf_path: Option<PathBuf>,
}

impl From<&PageRecord> for PageSummary {
    fn from(record: &PageRecord) -> Self {
        Self {
            page: record.index(),
            status: PageStatus::of(record),
            error: record.error().map(|e| e.to_string()),
            html_path: record.html_path.clone(),
            pdf_path: record.pdf_path.clone(),
        }
    }
}

/// `processing_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub processed_at: DateTime<Utc>,
    pub source_pdf_path: PathBuf,
    pub side_data_path: Option<PathBuf>,
    pub slug: String,
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub output_files: Vec<PathBuf>,
    pub screenshot_paths: Vec<PathBuf>,
    pub combined_pdf_path: Option<PathBuf>,
    pub pages: Vec<PageSummary>,
    pub stats: ConversionStats,
}

// ── Writers ──────────────────────────────────────────────────────────────

pub async fn ensure_dir(path: &Path) -> Result<(), Pdf2HtmlError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| Pdf2HtmlError::CreateDirFailed {
            path: path.to_path_buf(),
            source,
        })
}

pub async fn write_file(path: &Path, bytes: impl AsRef<[u8]>) -> Result<(), Pdf2HtmlError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| Pdf2HtmlError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Pretty-printed JSON.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Pdf2HtmlError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| Pdf2HtmlError::ManifestInvalid {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    write_file(path, json).await
}

/// Write every page's manifest, plus its HTML file when HTML was recovered.
///
/// `records` must already be sorted by ordinal. Sets `html_path` on each
/// record that got an HTML file and returns every written path in order.
pub async fn persist_pages(
    records: &mut [PageRecord],
    output_dir: &Path,
    side_data: &str,
) -> Result<Vec<PathBuf>, Pdf2HtmlError> {
    let mut written = Vec::with_capacity(records.len() * 2);

    for record in records.iter_mut() {
        let index = record.index();

        if let Some(html) = record.extracted.html.as_deref() {
            let html_path = output_dir.join(html_file_name(index));
            write_file(&html_path, html).await?;
            record.html_path = Some(html_path);
        }

        let manifest_path = output_dir.join(manifest_file_name(index));
        write_json(&manifest_path, &PageManifest::from_record(record, side_data)).await?;

        written.push(manifest_path);
        if let Some(ref p) = record.html_path {
            written.push(p.clone());
        }
    }

    Ok(written)
}

/// Per-page manifests in `dir`, sorted by ordinal.
pub async fn list_manifests(dir: &Path) -> Result<Vec<(usize, PathBuf)>, Pdf2HtmlError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|_| Pdf2HtmlError::NoManifests {
            path: dir.to_path_buf(),
        })?;

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Pdf2HtmlError::Internal(format!("{}: {}", dir.display(), e)))?
    {
        let name = entry.file_name();
        if let Some(page) = manifest_ordinal(&name.to_string_lossy()) {
            found.push((page, entry.path()));
        }
    }

    found.sort_by_key(|(page, _)| *page);
    Ok(found)
}
