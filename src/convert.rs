//! Run orchestration: rasterise → model → persist → (render → merge).
//!
//! [`Pipeline`] owns the three external collaborators (rasteriser, model
//! client, HTML renderer) behind traits and sequences the stages as a
//! linear state machine:
//!
//! ```text
//! Idle → Rasterizing → ModelProcessing → Persisting → [Rendering → Merging] → Done
//!                                  any fatal error ──▶ Failed
//! ```
//!
//! Per-page failures never leave [`crate::pipeline::process`] or the
//! rendering stage; only input, rasterisation and write errors abort a run.
//! [`convert`] is the one-call entry point; [`reextract`] re-runs HTML
//! extraction over manifests from an earlier run.

use crate::config::ConversionConfig;
use crate::error::{PageError, Pdf2HtmlError};
use crate::output::{ConversionStats, PageRecord, PipelineResult};
use crate::pipeline::client::{AnthropicClient, ModelClient};
use crate::pipeline::html_render::{ChromiumRenderer, HtmlRenderer};
use crate::pipeline::rasterize::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::{extract, input, merge, persist, process};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Rasterizing,
    ModelProcessing,
    Persisting,
    Rendering,
    Merging,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Rasterizing => "rasterizing",
            PipelineStage::ModelProcessing => "model processing",
            PipelineStage::Persisting => "persisting",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Merging => "merging",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A configured run with its collaborators.
pub struct Pipeline {
    config: ConversionConfig,
    rasterizer: Arc<dyn PageRasterizer>,
    client: Arc<dyn ModelClient>,
    /// When `None`, render mode launches a headless Chromium per run.
    html_renderer: Option<Arc<dyn HtmlRenderer>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("client", &self.client.name())
            .field("html_renderer", &self.html_renderer.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Pipeline with the default collaborators: pdfium, the Messages API
    /// and headless Chromium.
    ///
    /// Fails with [`Pdf2HtmlError::MissingApiKey`] before any work is done.
    pub fn new(config: ConversionConfig) -> Result<Self, Pdf2HtmlError> {
        let client = AnthropicClient::from_config(&config)?;
        Ok(Self::with_components(
            config,
            Arc::new(PdfiumRasterizer::new()),
            Arc::new(client),
            None,
        ))
    }

    /// Pipeline with caller-supplied collaborators.
    pub fn with_components(
        config: ConversionConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        client: Arc<dyn ModelClient>,
        html_renderer: Option<Arc<dyn HtmlRenderer>>,
    ) -> Self {
        Self {
            config,
            rasterizer,
            client,
            html_renderer,
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Run every stage for one PDF.
    ///
    /// Returns `Ok` even when some pages failed; check
    /// [`PipelineResult::stats`]. `Err` means the run was aborted.
    pub async fn run(&self, input: impl AsRef<Path>) -> Result<PipelineResult, Pdf2HtmlError> {
        match self.run_stages(input.as_ref()).await {
            Ok(result) => {
                self.enter(PipelineStage::Done);
                Ok(result)
            }
            Err(e) => {
                error!("Run aborted: {}", e);
                self.enter(PipelineStage::Failed);
                Err(e)
            }
        }
    }

    fn enter(&self, stage: PipelineStage) {
        info!("Stage: {}", stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_change(stage);
        }
    }

    async fn run_stages(&self, input: &Path) -> Result<PipelineResult, Pdf2HtmlError> {
        let config = &self.config;
        let started_at = Utc::now();
        let total_start = Instant::now();

        let pdf_path = input::validate_pdf(input)?;
        let side_data = input::read_side_data(config.side_data_path.as_deref()).await?;
        let slug = persist::slugify(&pdf_path);
        let output_dir = config.output_dir.clone();
        let screenshot_dir = config.screenshot_dir();
        persist::ensure_dir(&output_dir).await?;
        persist::ensure_dir(&screenshot_dir).await?;
        info!("Converting {} as '{}'", pdf_path.display(), slug);

        // ── Rasterizing ──────────────────────────────────────────────────
        self.enter(PipelineStage::Rasterizing);
        let raster_start = Instant::now();
        let pages = self
            .rasterizer
            .rasterize(&pdf_path, &screenshot_dir, &config.raster)
            .await?;
        if pages.is_empty() {
            return Err(Pdf2HtmlError::NoPages { path: pdf_path });
        }
        let raster_duration_ms = raster_start.elapsed().as_millis() as u64;
        info!("Rasterised {} pages in {}ms", pages.len(), raster_duration_ms);

        let total = pages.len();
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_start(total);
        }

        // ── ModelProcessing ──────────────────────────────────────────────
        self.enter(PipelineStage::ModelProcessing);
        let model_start = Instant::now();
        let mut records = process::process_all(&pages, self.client.as_ref(), config).await;
        let model_duration_ms = model_start.elapsed().as_millis() as u64;

        // ── Persisting ───────────────────────────────────────────────────
        self.enter(PipelineStage::Persisting);
        let mut generated_paths =
            persist::persist_pages(&mut records, &output_dir, &side_data).await?;

        // ── Rendering / Merging ──────────────────────────────────────────
        let mut combined_pdf = None;
        if config.render_pdf {
            self.enter(PipelineStage::Rendering);
            let page_pdfs = self.render_stage(&mut records, &output_dir).await?;
            generated_paths.extend(page_pdfs.iter().map(|(_, path, _)| path.clone()));

            self.enter(PipelineStage::Merging);
            if page_pdfs.is_empty() {
                warn!("No page rendered to PDF; skipping merge");
            } else {
                let inputs: Vec<Vec<u8>> = page_pdfs.into_iter().map(|(_, _, bytes)| bytes).collect();
                let merged = tokio::task::spawn_blocking(move || merge::merge_pdfs(&inputs))
                    .await
                    .map_err(|e| Pdf2HtmlError::Internal(format!("Merge task panicked: {}", e)))??;
                let path = output_dir.join(persist::combined_pdf_name(&slug));
                persist::write_file(&path, &merged).await?;
                info!("Combined PDF: {}", path.display());
                generated_paths.push(path.clone());
                combined_pdf = Some(path);
            }
        }

        // ── Summary ──────────────────────────────────────────────────────
        let mut stats = ConversionStats::tally(&records);
        stats.raster_duration_ms = raster_duration_ms;
        stats.model_duration_ms = model_duration_ms;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        let screenshot_paths: Vec<PathBuf> =
            pages.iter().map(|p| p.image_path.clone()).collect();
        let finished_at = Utc::now();
        let summary = persist::RunSummary {
            processed_at: finished_at,
            source_pdf_path: pdf_path.clone(),
            side_data_path: config.side_data_path.clone(),
            slug: slug.clone(),
            total_pages: total,
            succeeded_pages: stats.succeeded_pages,
            failed_pages: stats.failed_pages(),
            output_files: generated_paths.clone(),
            screenshot_paths: screenshot_paths.clone(),
            combined_pdf_path: combined_pdf.clone(),
            pages: records.iter().map(persist::PageSummary::from).collect(),
            stats: stats.clone(),
        };
        let summary_path = output_dir.join(persist::SUMMARY_FILE);
        persist::write_json(&summary_path, &summary).await?;
        generated_paths.push(summary_path.clone());

        info!(
            "Conversion complete: {}/{} pages with HTML, {}ms total",
            stats.succeeded_pages, total, stats.total_duration_ms
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_complete(total, stats.succeeded_pages);
        }

        Ok(PipelineResult {
            source_pdf: pdf_path,
            slug,
            pages: records,
            screenshot_paths,
            generated_paths,
            summary_path,
            combined_pdf,
            started_at,
            finished_at,
            stats,
        })
    }

    /// Print every page that has an HTML file to its own PDF.
    ///
    /// Returns `(page, path, bytes)` for each page written, in ordinal
    /// order. A page that fails to render gets `render_error` and is left
    /// out; only launch and write failures are fatal.
    async fn render_stage(
        &self,
        records: &mut [PageRecord],
        output_dir: &Path,
    ) -> Result<Vec<(usize, PathBuf, Vec<u8>)>, Pdf2HtmlError> {
        let config = &self.config;
        let jobs: Vec<(usize, PathBuf)> = records
            .iter()
            .filter_map(|r| r.html_path.clone().map(|p| (r.index(), p)))
            .collect();

        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let (renderer, launched): (Arc<dyn HtmlRenderer>, bool) = match self.html_renderer {
            Some(ref r) => (Arc::clone(r), false),
            None => (
                Arc::new(ChromiumRenderer::launch(config.chrome_path.as_deref()).await?)
                    as Arc<dyn HtmlRenderer>,
                true,
            ),
        };

        let mut outcomes: Vec<(usize, Result<Vec<u8>, PageError>)> =
            stream::iter(jobs.into_iter().map(|(index, html_path)| {
                let renderer = Arc::clone(&renderer);
                async move {
                    let result = renderer.render_page(index, &html_path).await;
                    (index, result)
                }
            }))
            .buffer_unordered(config.concurrency)
            .collect()
            .await;

        if launched {
            renderer.close().await;
        }

        outcomes.sort_by_key(|(index, _)| *index);

        let mut written = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes {
            let Some(record) = records.iter_mut().find(|r| r.index() == index) else {
                continue;
            };
            match outcome {
                Ok(bytes) => {
                    let path = output_dir.join(persist::pdf_file_name(index));
                    persist::write_file(&path, &bytes).await?;
                    record.pdf_path = Some(path.clone());
                    written.push((index, path, bytes));
                }
                Err(e) => {
                    warn!("{}", e);
                    record.render_error = Some(e);
                }
            }
        }

        debug!("Rendered {} page PDFs", written.len());
        Ok(written)
    }
}

/// Convert a slide-deck PDF to per-page HTML (and optionally a re-rendered PDF).
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err(Pdf2HtmlError)` only for fatal errors:
/// - missing or placeholder API key
/// - file not found / not a PDF / unreadable side data
/// - zero pages rasterised
/// - output directory or file not writable
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<PipelineResult, Pdf2HtmlError> {
    Pipeline::new(config.clone())?.run(input).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<PipelineResult, Pdf2HtmlError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2HtmlError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Re-run HTML extraction over the page manifests in `output_dir`.
///
/// Reads `modelResponse.content[0].text` from every
/// `model_output_page_<N>.json` and writes the recovered document to
/// `extracted-html/page_<N>_extracted.html`. Unreadable manifests and
/// replies without HTML are skipped with a warning.
///
/// Returns the written paths in ordinal order. No model calls are made.
pub async fn reextract(output_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, Pdf2HtmlError> {
    let dir = output_dir.as_ref();
    if !dir.is_dir() {
        return Err(Pdf2HtmlError::NoManifests {
            path: dir.to_path_buf(),
        });
    }

    let manifests = persist::list_manifests(dir).await?;
    if manifests.is_empty() {
        return Err(Pdf2HtmlError::NoManifests {
            path: dir.to_path_buf(),
        });
    }
    info!("Re-extracting {} manifests in {}", manifests.len(), dir.display());

    let target = dir.join(persist::EXTRACTED_DIR);
    persist::ensure_dir(&target).await?;

    let mut written = Vec::new();
    for (page, path) in manifests {
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let manifest: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping {}: invalid JSON: {}", path.display(), e);
                continue;
            }
        };

        let html = manifest
            .get("modelResponse")
            .and_then(extract::reply_text)
            .and_then(extract::extract_html);

        match html {
            Some(html) => {
                let out = target.join(persist::extracted_file_name(page));
                persist::write_file(&out, &html).await?;
                info!("Page {}: wrote {}", page, out.display());
                written.push(out);
            }
            None => warn!("Page {}: no HTML recoverable from saved reply", page),
        }
    }

    Ok(written)
}
