//! # edgequake-pdf2html
//!
//! Recreate slide-deck PDF pages as standalone HTML using a Vision Language
//! Model, and optionally print the HTML back into a single PDF.
//!
//! ## Why this crate?
//!
//! Slide decks exported to PDF lose everything that made them editable:
//! text is positioned glyph by glyph, charts are flattened, layout is
//! absolute. Instead of reverse-engineering the PDF drawing operators, this
//! crate rasterises each page and asks a VLM to rebuild it as a Tailwind
//! HTML document, one independent page at a time.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate the file, load optional side data
//!  ├─ 2. Rasterise  one screenshot per page via pdfium (spawn_blocking)
//!  ├─ 3. Process    concurrent model calls, HTML extraction, order restored
//!  ├─ 4. Persist    per-page JSON manifests + HTML files
//!  ├─ 5. Render     optional: HTML → single-page PDFs via headless Chromium
//!  ├─ 6. Merge      optional: concatenate page PDFs in page order
//!  └─ 7. Summary    processing_summary.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2html::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .api_key(std::env::var("CLAUDE_API_KEY")?)
//!         .output_dir("./output")
//!         .build()?;
//!     let result = convert("deck.pdf", &config).await?;
//!     eprintln!(
//!         "{}/{} pages recreated",
//!         result.stats.succeeded_pages, result.stats.total_pages
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2html` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2html = { version = "0.1", default-features = false }
//! ```
//!
//! ## External engines
//!
//! | Engine | Used for | Located via |
//! |--------|----------|-------------|
//! | pdfium | rasterisation | `PDFIUM_LIB_PATH`, else system library path |
//! | Chrome / Chromium | HTML → PDF (render mode only) | `--chrome-path`, else auto-detect |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageFormat, RasterOptions};
pub use convert::{convert, convert_sync, reextract, Pipeline, PipelineStage};
pub use error::{PageError, Pdf2HtmlError};
pub use output::{
    ConversionStats, ExtractedDocument, ModelReply, Page, PageRecord, PipelineResult, ReplyOutcome,
};
pub use pipeline::client::{ClientError, ModelClient, ModelResponse};
pub use pipeline::html_render::HtmlRenderer;
pub use pipeline::rasterize::PageRasterizer;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
